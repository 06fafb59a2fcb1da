use serde::{Deserialize, Serialize};

use crate::models::Process;

/// Per-user totals, ordered by process count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessUserReport {
    pub user: String,
    /// Sum of cpu usage, rounded to 2 decimals
    pub total_cpu_usage: f64,
    /// Sum of memory usage, rounded to 2 decimals
    pub total_memory_usage: f64,
    pub total_processes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessList {
    pub processes: Vec<Process>,
    pub limit: i64,
    pub page: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessCounts {
    pub process_count: i64,
    pub users_count: i64,
}

/// Message pushed over the realtime feed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RealtimeSnapshot {
    pub processes: Vec<Process>,
    pub reports: Vec<ProcessUserReport>,
}
