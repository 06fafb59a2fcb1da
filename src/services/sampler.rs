use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Mutex;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, ThreadKind};
use tokio::process::Command;

use crate::error::{ParseError, SamplingError};
use crate::metrics::METRICS;
use crate::models::{Priority, Process, ProcessState};

/// Columns asked from `ps`, in the order `parse_stat_line` expects them.
/// The trailing `=` suppresses the header line.
pub const STAT_COLUMNS: &str = "user=,pcpu=,pmem=,rss=,vsz=,state=,etime=,time=,comm=,nice=";

const FIELDS: [&str; 10] = [
    "user", "cpu", "mem", "rss", "vsz", "state", "etime", "time", "command", "nice",
];

lazy_static! {
    // command sits between cpu-time and niceness and may contain spaces
    static ref STAT_LINE: Regex = Regex::new(
        r"^\s*(?P<user>\S+)\s+(?P<cpu>\S+)\s+(?P<mem>\S+)\s+(?P<rss>\S+)\s+(?P<vsz>\S+)\s+(?P<state>\S+)\s+(?P<etime>\S+)\s+(?P<time>\S+)\s+(?P<command>.+?)\s+(?P<nice>\S+)\s*$"
    ).unwrap();
}

/// Where the sampler gets its raw data from.
#[async_trait]
pub trait StatSource: Send + Sync {
    /// All pids currently in the process table.
    fn list_pids(&self) -> Result<Vec<u32>, SamplingError>;

    /// One stat line for `pid`, columns as in [`STAT_COLUMNS`].
    async fn stat_line(&self, pid: u32) -> Result<String, ParseError>;
}

/// Enumerates pids through sysinfo and reads per-process stats with `ps`.
pub struct PsStatSource {
    system: Mutex<System>,
}

impl PsStatSource {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for PsStatSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatSource for PsStatSource {
    fn list_pids(&self) -> Result<Vec<u32>, SamplingError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(SamplingError::Unsupported);
        }

        let mut sys = self.system.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::nothing());

        let mut pids: Vec<u32> = sys
            .processes()
            .iter()
            .filter(|(_, process)| is_listed(process.thread_kind()))
            .map(|(pid, _)| pid.as_u32())
            .collect();

        if pids.is_empty() {
            return Err(SamplingError::EmptyProcessTable);
        }
        pids.sort_unstable();
        Ok(pids)
    }

    async fn stat_line(&self, pid: u32) -> Result<String, ParseError> {
        let output = Command::new("ps")
            .args(["-o", STAT_COLUMNS, "-p", &pid.to_string()])
            .output()
            .await?;

        // ps exits non-zero when the pid is gone
        if !output.status.success() {
            return Err(ParseError::Exited(pid));
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .find(|line| !line.trim().is_empty())
            .map(str::to_string)
            .ok_or(ParseError::Exited(pid))
    }
}

/// Userland tasks are threads of another process and have no row of their
/// own. Kernel threads are listed like any process.
fn is_listed(kind: Option<ThreadKind>) -> bool {
    !matches!(kind, Some(ThreadKind::Userland))
}

/// Turns the process table into normalized [`Process`] records.
pub struct Sampler<S = PsStatSource> {
    source: S,
}

impl<S: StatSource> Sampler<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Samples every pid. Pids whose stats cannot be read or parsed are
    /// skipped; only a failed enumeration, or a pass where nothing could be
    /// read at all, fails the call.
    pub async fn sample(&self) -> Result<Vec<Process>, SamplingError> {
        let pids = self.source.list_pids()?;
        let observed_at = Utc::now();

        let mut processes = Vec::with_capacity(pids.len());
        for &pid in &pids {
            let parsed = self
                .source
                .stat_line(pid)
                .await
                .and_then(|line| parse_stat_line(pid, &line, observed_at));

            match parsed {
                Ok(process) => processes.push(process),
                Err(ParseError::Exited(_)) => {
                    log::debug!("pid {} exited during sampling", pid);
                }
                Err(e) => {
                    log::debug!("Skipping pid {}: {}", pid, e);
                }
            }
        }

        let skipped = pids.len() - processes.len();
        METRICS.sampled_processes.set(processes.len() as f64);
        METRICS.skipped_processes.set(skipped as f64);

        if processes.is_empty() {
            return Err(SamplingError::NoStats { attempted: pids.len() });
        }
        if skipped > 0 {
            log::debug!("Sampled {} processes, skipped {}", processes.len(), skipped);
        }

        Ok(processes)
    }
}

/// Parses one `ps` line (see [`STAT_COLUMNS`]) into a [`Process`].
///
/// Memory sizes arrive in KB and are stored in MB (divided by 1000, rounded
/// down). A `-` in place of a memory size, as zombies report, counts as zero.
/// A `-` niceness marks a real-time scheduled process and decodes to
/// [`Priority::High`].
pub fn parse_stat_line(
    pid: u32,
    line: &str,
    observed_at: DateTime<Utc>,
) -> Result<Process, ParseError> {
    let caps = match STAT_LINE.captures(line) {
        Some(caps) => caps,
        None => {
            let found = line.split_whitespace().count();
            return Err(ParseError::MissingField(FIELDS[found.min(FIELDS.len() - 1)]));
        }
    };

    let cpu_usage = parse_float(&caps["cpu"], "cpu")?;
    let memory_usage = parse_float(&caps["mem"], "mem")?;
    let resident_kb = parse_size(&caps["rss"], "rss")?;
    let virtual_kb = parse_size(&caps["vsz"], "vsz")?;
    let priority = parse_priority(&caps["nice"])?;

    Ok(Process {
        pid: pid as i64,
        user: caps["user"].to_string(),
        cpu_usage,
        memory_usage,
        resident_memory_size: (resident_kb / 1000) as i64,
        virtual_memory_size: (virtual_kb / 1000) as i64,
        state: ProcessState::from_code(&caps["state"]),
        total_time: caps["etime"].to_string(),
        cpu_time: caps["time"].to_string(),
        command: caps["command"].to_string(),
        priority,
        created_at: observed_at,
        updated_at: observed_at,
    })
}

fn parse_float(value: &str, field: &'static str) -> Result<f64, ParseError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(field, value))
}

fn parse_size(value: &str, field: &'static str) -> Result<u64, ParseError> {
    if value == "-" {
        return Ok(0);
    }
    value.parse::<u64>().map_err(|_| invalid(field, value))
}

fn parse_priority(value: &str) -> Result<Priority, ParseError> {
    if value == "-" {
        return Ok(Priority::High);
    }
    value
        .parse::<i64>()
        .map(Priority::from_niceness)
        .map_err(|_| invalid("nice", value))
}

fn invalid(field: &'static str, value: &str) -> ParseError {
    ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedSource {
        pids: Vec<u32>,
        lines: HashMap<u32, String>,
    }

    #[async_trait]
    impl StatSource for FixedSource {
        fn list_pids(&self) -> Result<Vec<u32>, SamplingError> {
            if self.pids.is_empty() {
                return Err(SamplingError::EmptyProcessTable);
            }
            Ok(self.pids.clone())
        }

        async fn stat_line(&self, pid: u32) -> Result<String, ParseError> {
            self.lines.get(&pid).cloned().ok_or(ParseError::Exited(pid))
        }
    }

    fn source(entries: &[(u32, &str)], extra_pids: &[u32]) -> FixedSource {
        let mut pids: Vec<u32> = entries.iter().map(|(pid, _)| *pid).collect();
        pids.extend_from_slice(extra_pids);
        FixedSource {
            pids,
            lines: entries.iter().map(|(pid, line)| (*pid, line.to_string())).collect(),
        }
    }

    #[test]
    fn parses_linux_line() {
        let now = Utc::now();
        let line = "alice     12.5  3.1 204800 1048576 R    01:02:03 00:10:00 chrome   0";
        let p = parse_stat_line(4242, line, now).unwrap();

        assert_eq!(p.pid, 4242);
        assert_eq!(p.user, "alice");
        assert_eq!(p.cpu_usage, 12.5);
        assert_eq!(p.memory_usage, 3.1);
        assert_eq!(p.resident_memory_size, 204);
        assert_eq!(p.virtual_memory_size, 1048);
        assert_eq!(p.state, ProcessState::Running);
        assert_eq!(p.total_time, "01:02:03");
        assert_eq!(p.cpu_time, "00:10:00");
        assert_eq!(p.command, "chrome");
        assert_eq!(p.priority, Priority::Normal);
        assert_eq!(p.created_at, now);
        assert_eq!(p.updated_at, now);
    }

    #[test]
    fn parsing_is_deterministic() {
        let now = Utc::now();
        let line = "root 0.0 0.1 11999 169999 Ss 10-04:00:00 0:01.20 /sbin/launchd -5";
        assert_eq!(
            parse_stat_line(1, line, now).unwrap(),
            parse_stat_line(1, line, now).unwrap()
        );
    }

    #[test]
    fn sizes_round_down_to_whole_megabytes() {
        let p = parse_stat_line(1, "u 0 0 1999 999 S 00:01 00:00:00 sh 0", Utc::now()).unwrap();
        assert_eq!(p.resident_memory_size, 1);
        assert_eq!(p.virtual_memory_size, 0);
    }

    #[test]
    fn keeps_spaces_in_command() {
        let p = parse_stat_line(7, "bob 1.0 0.5 1000 2000 S 05:00 00:00:01 Google Chrome Helper 10", Utc::now())
            .unwrap();
        assert_eq!(p.command, "Google Chrome Helper");
        assert_eq!(p.priority, Priority::Low);
    }

    #[test]
    fn zombie_without_sizes_counts_as_zero() {
        let p = parse_stat_line(9, "bob 0.0 0.0 - - Z 00:05 00:00:00 <defunct> 0", Utc::now()).unwrap();
        assert_eq!(p.state, ProcessState::Zombie);
        assert_eq!(p.resident_memory_size, 0);
        assert_eq!(p.virtual_memory_size, 0);
    }

    #[test]
    fn out_of_band_niceness_is_clamped() {
        let p = parse_stat_line(3, "root 0 0 0 0 S 00:01 00:00:00 kworker -40", Utc::now()).unwrap();
        assert_eq!(p.priority, Priority::High);
    }

    #[test]
    fn realtime_scheduled_process_is_high_priority() {
        let line = "root 0.0 0.3 27000 289000 SLsl 3-01:00:00 00:01:10 multipathd -";
        let p = parse_stat_line(812, line, Utc::now()).unwrap();
        assert_eq!(p.command, "multipathd");
        assert_eq!(p.priority, Priority::High);
        assert_eq!(p.resident_memory_size, 27);
    }

    #[test]
    fn lists_kernel_threads_but_not_tasks() {
        assert!(is_listed(None));
        assert!(is_listed(Some(ThreadKind::Kernel)));
        assert!(!is_listed(Some(ThreadKind::Userland)));
    }

    #[test]
    fn rejects_malformed_lines() {
        let now = Utc::now();
        assert!(matches!(
            parse_stat_line(1, "root 0.0 0.1", now),
            Err(ParseError::MissingField("rss"))
        ));
        assert!(matches!(
            parse_stat_line(1, "root abc 0.1 10 10 S 00:01 00:00:00 sh 0", now),
            Err(ParseError::InvalidNumber { field: "cpu", .. })
        ));
        assert!(matches!(
            parse_stat_line(1, "root 0.0 0.1 10 10 S 00:01 00:00:00 sh low", now),
            Err(ParseError::InvalidNumber { field: "nice", .. })
        ));
        assert!(parse_stat_line(1, "", now).is_err());
    }

    #[tokio::test]
    async fn skips_unparseable_pids_without_failing_the_batch() {
        let sampler = Sampler::new(source(
            &[
                (1, "root 0.0 0.1 1000 2000 S 01:00 00:00:01 init 0"),
                (2, "root garbage"),
                (3, "alice 5.0 1.0 3000 4000 R 00:10 00:00:02 vim 0"),
            ],
            &[4], // exits before ps runs
        ));

        let processes = sampler.sample().await.unwrap();
        let pids: Vec<i64> = processes.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![1, 3]);
    }

    #[tokio::test]
    async fn enumeration_failure_fails_the_call() {
        let sampler = Sampler::new(source(&[], &[]));
        assert!(matches!(
            sampler.sample().await,
            Err(SamplingError::EmptyProcessTable)
        ));
    }

    #[tokio::test]
    async fn nothing_readable_fails_the_call() {
        let sampler = Sampler::new(source(&[(1, "broken")], &[2]));
        assert!(matches!(
            sampler.sample().await,
            Err(SamplingError::NoStats { attempted: 2 })
        ));
    }

    #[test]
    fn test_list_current_pids() {
        let pids = PsStatSource::new().list_pids().unwrap();
        assert!(pids.contains(&std::process::id()));
    }
}
