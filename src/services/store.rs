use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, Sqlite};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use crate::error::StorageError;
use crate::models::{Process, ProcessUserReport};
use crate::services::query::ProcessQuery;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS processes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        pid INTEGER NOT NULL UNIQUE,
        user TEXT NOT NULL,
        cpuUsage REAL NOT NULL,
        memoryUsage REAL NOT NULL,
        residentMemorySize INTEGER NOT NULL,
        virtualMemorySize INTEGER NOT NULL,
        state TEXT NOT NULL,
        totalTime TEXT NOT NULL,
        cpuTime TEXT NOT NULL,
        command TEXT NOT NULL,
        priority TEXT NOT NULL,
        createdAt TEXT NOT NULL,
        updatedAt TEXT NOT NULL
     );
     CREATE INDEX IF NOT EXISTS idx_processes_user ON processes(user);
     CREATE INDEX IF NOT EXISTS idx_processes_state ON processes(state);";

/// Rows per INSERT statement. 13 binds each keeps a statement well under
/// SQLite's bind variable limit.
const UPSERT_CHUNK: usize = 500;

/// Owns the connection pool. Cloning shares the pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl Store {
    /// Opens (and creates when missing) the database at `url`.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        query_timeout: Duration,
    ) -> Result<Self, StorageError> {
        // pragmas here apply to every connection the pool opens
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        Ok(Self { pool, query_timeout })
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Inserts or merges `batch` by pid in a single transaction.
    pub async fn upsert(&self, batch: &[Process]) -> Result<(), StorageError> {
        self.upsert_at(batch, Utc::now()).await
    }

    /// Like [`Store::upsert`] with an explicit clock. `now` becomes
    /// `updatedAt` for every row and `createdAt` for rows not seen before;
    /// an existing row keeps its `createdAt`.
    pub async fn upsert_at(&self, batch: &[Process], now: DateTime<Utc>) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut transaction = self.pool.begin().await?;

        for chunk in batch.chunks(UPSERT_CHUNK) {
            let mut builder = sqlx::QueryBuilder::<Sqlite>::new(
                "INSERT INTO processes (pid, user, cpuUsage, memoryUsage, residentMemorySize, \
                 virtualMemorySize, state, totalTime, cpuTime, command, priority, createdAt, updatedAt) ",
            );
            builder.push_values(chunk, |mut row, p| {
                row.push_bind(p.pid)
                    .push_bind(p.user.as_str())
                    .push_bind(p.cpu_usage)
                    .push_bind(p.memory_usage)
                    .push_bind(p.resident_memory_size)
                    .push_bind(p.virtual_memory_size)
                    .push_bind(p.state.as_str())
                    .push_bind(p.total_time.as_str())
                    .push_bind(p.cpu_time.as_str())
                    .push_bind(p.command.as_str())
                    .push_bind(p.priority.as_str())
                    .push_bind(now)
                    .push_bind(now);
            });
            builder.push(
                " ON CONFLICT(pid) DO UPDATE SET
                    user = excluded.user,
                    cpuUsage = excluded.cpuUsage,
                    memoryUsage = excluded.memoryUsage,
                    residentMemorySize = excluded.residentMemorySize,
                    virtualMemorySize = excluded.virtualMemorySize,
                    state = excluded.state,
                    totalTime = excluded.totalTime,
                    cpuTime = excluded.cpuTime,
                    command = excluded.command,
                    priority = excluded.priority,
                    updatedAt = excluded.updatedAt",
            );

            builder.build().execute(&mut *transaction).await?;
        }

        transaction.commit().await?;
        Ok(())
    }

    pub async fn query(&self, query: &ProcessQuery) -> Result<Vec<Process>, StorageError> {
        let mut statement = sqlx::query(&query.sql);
        for param in &query.params {
            statement = statement.bind(param.as_str());
        }
        statement = statement.bind(query.limit).bind(query.offset);

        let rows = self.with_deadline(statement.fetch_all(&self.pool)).await?;
        rows.iter()
            .map(map_process)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::from)
    }

    /// Per-user totals, busiest users first.
    pub async fn aggregate_by_user(&self) -> Result<Vec<ProcessUserReport>, StorageError> {
        let rows: Vec<(String, f64, f64, i64)> = self
            .with_deadline(
                sqlx::query_as(
                    "SELECT user, ROUND(SUM(cpuUsage), 2), ROUND(SUM(memoryUsage), 2), COUNT(pid)
                     FROM processes
                     GROUP BY user
                     ORDER BY COUNT(pid) DESC, user ASC",
                )
                .fetch_all(&self.pool),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|(user, total_cpu_usage, total_memory_usage, total_processes)| ProcessUserReport {
                user,
                total_cpu_usage,
                total_memory_usage,
                total_processes,
            })
            .collect())
    }

    pub async fn distinct_users(&self) -> Result<Vec<String>, StorageError> {
        self.with_deadline(
            sqlx::query_scalar("SELECT DISTINCT user FROM processes ORDER BY user")
                .fetch_all(&self.pool),
        )
        .await
    }

    pub async fn count(&self) -> Result<i64, StorageError> {
        self.with_deadline(sqlx::query_scalar("SELECT COUNT(*) FROM processes").fetch_one(&self.pool))
            .await
    }

    /// Number of distinct users.
    pub async fn user_count(&self) -> Result<i64, StorageError> {
        self.with_deadline(
            sqlx::query_scalar("SELECT COUNT(DISTINCT user) FROM processes").fetch_one(&self.pool),
        )
        .await
    }

    async fn with_deadline<T, F>(&self, fut: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StorageError::Timeout(self.query_timeout)),
        }
    }

    /// Private in-memory database with the schema applied.
    #[cfg(test)]
    pub(crate) async fn in_memory() -> Self {
        // every connection to :memory: is its own database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Self {
            pool,
            query_timeout: Duration::from_secs(5),
        };
        store.migrate().await.unwrap();
        store
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn map_process(row: &SqliteRow) -> Result<Process, sqlx::Error> {
    let state: String = row.try_get("state")?;
    let priority: String = row.try_get("priority")?;

    Ok(Process {
        pid: row.try_get("pid")?,
        user: row.try_get("user")?,
        cpu_usage: row.try_get("cpuUsage")?,
        memory_usage: row.try_get("memoryUsage")?,
        resident_memory_size: row.try_get("residentMemorySize")?,
        virtual_memory_size: row.try_get("virtualMemorySize")?,
        state: state.parse().unwrap_or(crate::models::ProcessState::Unknown),
        total_time: row.try_get("totalTime")?,
        cpu_time: row.try_get("cpuTime")?,
        command: row.try_get("command")?,
        priority: priority.parse().unwrap_or(crate::models::Priority::Normal),
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}
