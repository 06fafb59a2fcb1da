use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One observed OS process, keyed by `pid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    /// Process ID (natural key)
    pub pid: i64,
    /// Owner of the process
    pub user: String,
    /// CPU usage (percent)
    pub cpu_usage: f64,
    /// Memory usage (percent of physical memory)
    #[serde(alias = "memoryPercentageUsage")]
    pub memory_usage: f64,
    /// Resident set size (MB)
    pub resident_memory_size: i64,
    /// Virtual memory size (MB)
    pub virtual_memory_size: i64,
    /// Decoded run state
    pub state: ProcessState,
    /// Elapsed wall time since start, as formatted by the OS
    pub total_time: String,
    /// Accumulated CPU time, as formatted by the OS
    pub cpu_time: String,
    /// Command name
    pub command: String,
    /// Decoded niceness
    pub priority: Priority,
    /// First time this pid was stored
    pub created_at: DateTime<Utc>,
    /// Last time this pid was stored
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Running,
    Sleeping,
    Idle,
    Uninterruptible,
    Stopped,
    Traced,
    Zombie,
    Dead,
    Unknown,
}

impl ProcessState {
    /// Decodes a `ps` state code. Only the first character carries the state,
    /// the rest are BSD modifiers (`s`, `+`, `<`, `N`, ...).
    pub fn from_code(code: &str) -> Self {
        match code.chars().next() {
            Some('R') => Self::Running,
            Some('S') => Self::Sleeping,
            Some('I') => Self::Idle,
            Some('D') | Some('U') => Self::Uninterruptible,
            Some('T') => Self::Stopped,
            Some('t') => Self::Traced,
            Some('Z') => Self::Zombie,
            Some('X') => Self::Dead,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Sleeping => "sleeping",
            Self::Idle => "idle",
            Self::Uninterruptible => "uninterruptible",
            Self::Stopped => "stopped",
            Self::Traced => "traced",
            Self::Zombie => "zombie",
            Self::Dead => "dead",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "running" => Self::Running,
            "sleeping" => Self::Sleeping,
            "idle" => Self::Idle,
            "uninterruptible" => Self::Uninterruptible,
            "stopped" => Self::Stopped,
            "traced" => Self::Traced,
            "zombie" => Self::Zombie,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
    Idle,
}

impl Priority {
    /// Maps a niceness value to a label. Values outside -20..=19 clamp to the
    /// nearest band instead of failing.
    pub fn from_niceness(nice: i64) -> Self {
        match nice.clamp(-20, 19) {
            n if n < 0 => Self::High,
            0 => Self::Normal,
            19 => Self::Idle,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "high" => Self::High,
            "low" => Self::Low,
            "idle" => Self::Idle,
            _ => Self::Normal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_code_ignores_modifiers() {
        assert_eq!(ProcessState::from_code("Ss+"), ProcessState::Sleeping);
        assert_eq!(ProcessState::from_code("R<"), ProcessState::Running);
        assert_eq!(ProcessState::from_code("Z"), ProcessState::Zombie);
        assert_eq!(ProcessState::from_code("T"), ProcessState::Stopped);
        assert_eq!(ProcessState::from_code("t"), ProcessState::Traced);
        assert_eq!(ProcessState::from_code(""), ProcessState::Unknown);
        assert_eq!(ProcessState::from_code("?"), ProcessState::Unknown);
    }

    #[test]
    fn niceness_maps_to_bounded_labels() {
        assert_eq!(Priority::from_niceness(-20), Priority::High);
        assert_eq!(Priority::from_niceness(-5), Priority::High);
        assert_eq!(Priority::from_niceness(0), Priority::Normal);
        assert_eq!(Priority::from_niceness(10), Priority::Low);
        assert_eq!(Priority::from_niceness(19), Priority::Idle);
        // out of band
        assert_eq!(Priority::from_niceness(-99), Priority::High);
        assert_eq!(Priority::from_niceness(40), Priority::Idle);
    }

    #[test]
    fn labels_survive_storage_text() {
        for state in [ProcessState::Running, ProcessState::Zombie, ProcessState::Uninterruptible] {
            assert_eq!(state.as_str().parse::<ProcessState>().unwrap(), state);
        }
        for priority in [Priority::High, Priority::Normal, Priority::Low, Priority::Idle] {
            assert_eq!(priority.as_str().parse::<Priority>().unwrap(), priority);
        }
    }

    #[test]
    fn serializes_camel_case() {
        let now = Utc::now();
        let p = Process {
            pid: 1,
            user: "root".into(),
            cpu_usage: 0.5,
            memory_usage: 0.1,
            resident_memory_size: 12,
            virtual_memory_size: 160,
            state: ProcessState::Sleeping,
            total_time: "01:00".into(),
            cpu_time: "00:00:01".into(),
            command: "init".into(),
            priority: Priority::Normal,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["cpuUsage"], 0.5);
        assert_eq!(json["residentMemorySize"], 12);
        assert_eq!(json["state"], "sleeping");
        assert_eq!(json["priority"], "normal");
        assert!(json.get("createdAt").is_some());
    }
}
