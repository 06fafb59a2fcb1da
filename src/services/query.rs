use crate::models::ProcessFilter;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const DEFAULT_MAX_PAGE_SIZE: i64 = 100;

pub(crate) const PROCESS_COLUMNS: &str = "pid, user, cpuUsage, memoryUsage, residentMemorySize, virtualMemorySize, \
     state, totalTime, cpuTime, command, priority, createdAt, updatedAt";

/// A read query over `processes`, ready to be bound and executed.
///
/// `sql` only ever contains placeholders; filter values travel in `params`,
/// followed by `limit` and `offset` which are bound last.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessQuery {
    pub sql: String,
    pub params: Vec<String>,
    pub limit: i64,
    pub page: i64,
    pub offset: i64,
}

/// Translates a [`ProcessFilter`] into a bounded [`ProcessQuery`].
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder {
    max_page_size: i64,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAGE_SIZE)
    }
}

impl QueryBuilder {
    pub fn new(max_page_size: i64) -> Self {
        Self {
            max_page_size: max_page_size.max(1),
        }
    }

    pub fn build(&self, filter: &ProcessFilter) -> ProcessQuery {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params = Vec::new();

        if let Some(state) = filter.state() {
            clauses.push("state = ?");
            params.push(state.to_string());
        }

        if let Some(user) = filter.user() {
            clauses.push("user = ?");
            params.push(user.to_string());
        }

        // instr() matches literally, so `%` and `_` in the input mean nothing
        if let Some(search) = filter.search() {
            clauses.push("(instr(user, ?) > 0 OR instr(command, ?) > 0)");
            params.push(search.to_string());
            params.push(search.to_string());
        }

        let mut sql = format!("SELECT {} FROM processes", PROCESS_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY pid LIMIT ? OFFSET ?");

        let page = positive_or(filter.page.as_deref(), DEFAULT_PAGE);
        let limit = positive_or(filter.limit.as_deref(), DEFAULT_LIMIT).min(self.max_page_size);
        let offset = (page - 1).saturating_mul(limit);

        ProcessQuery {
            sql,
            params,
            limit,
            page,
            offset,
        }
    }
}

/// Parses a positive integer, falling back to `default` for anything else.
fn positive_or(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}
