use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::metrics::METRICS;
use crate::services::sampler::{PsStatSource, Sampler, StatSource};
use crate::services::store::Store;

/// One sample-and-persist cycle, triggered from outside.
///
/// Runs are independent of each other. Because the upsert is keyed by pid a
/// repeated or overlapping run cannot duplicate rows; on top of that a run
/// that starts while another is still in progress is skipped.
pub struct Collector<S = PsStatSource> {
    sampler: Sampler<S>,
    store: Store,
    running: AtomicBool,
    idle: Notify,
}

/// Clears the running flag when a run ends, even if its future is dropped.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    idle: &'a Notify,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

impl<S: StatSource> Collector<S> {
    pub fn new(sampler: Sampler<S>, store: Store) -> Self {
        Self {
            sampler,
            store,
            running: AtomicBool::new(false),
            idle: Notify::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Resolves once no run is in progress. Used at shutdown so the store is
    /// not closed under an in-flight upsert.
    pub async fn wait_idle(&self) {
        loop {
            // registered before the check, so a run ending in between still wakes us
            let notified = self.idle.notified();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }

    /// Samples the process table and upserts the result. Failures are logged,
    /// never returned.
    pub async fn run_once(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("Previous collector run still in progress, skipping");
            METRICS.record_cycle("skipped");
            return;
        }
        let _guard = RunGuard {
            running: &self.running,
            idle: &self.idle,
        };
        let started = Instant::now();

        let outcome = match self.sampler.sample().await {
            Err(e) => {
                log::error!("Failed to sample processes: {}", e);
                "sampling_error"
            }
            Ok(processes) => match self.store.upsert(&processes).await {
                Ok(()) => {
                    log::info!(
                        "Stored {} processes in {:.2?}",
                        processes.len(),
                        started.elapsed()
                    );
                    METRICS
                        .last_collect_timestamp
                        .set(chrono::Utc::now().timestamp() as f64);
                    "ok"
                }
                Err(e) => {
                    log::error!("Failed to store processes: {}", e);
                    "storage_error"
                }
            },
        };

        METRICS.record_cycle(outcome);
        METRICS
            .last_collect_duration
            .set(started.elapsed().as_secs_f64());
    }
}

/// Calls [`Collector::run_once`] every `every`, fire-and-forget. Ticks missed
/// while the runtime was busy are skipped, not replayed.
pub fn spawn_schedule<S>(collector: Arc<Collector<S>>, every: Duration) -> JoinHandle<()>
where
    S: StatSource + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let collector = collector.clone();
            tokio::spawn(async move { collector.run_once().await });
        }
    })
}
