use thiserror::Error;

/// Failure of a whole sampling pass.
#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("process enumeration is not supported on this platform")]
    Unsupported,
    #[error("process table is empty")]
    EmptyProcessTable,
    #[error("no process stats could be read ({attempted} pids tried)")]
    NoStats { attempted: usize },
}

/// Failure of a single process; the sampler skips the pid and moves on.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("process {0} exited before it could be read")]
    Exited(u32),
    #[error("stat query failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("query timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Outcome of a failed realtime push.
#[derive(Debug, Error)]
pub enum PushError {
    /// Peer went away. Terminal, not reported as an error.
    #[error("connection closed")]
    Closed,
    #[error("push failed: {0}")]
    Other(String),
}
