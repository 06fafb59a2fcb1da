use prometheus::{
    Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
    register_gauge_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry,
};
use lazy_static::lazy_static;
use std::sync::Arc;

/// Health of the pipeline itself, exposed at `/metrics`.
pub struct MetricsRegistry {
    registry: Registry,

    // Collector
    pub collect_cycles: IntCounterVec,
    pub sampled_processes: Gauge,
    pub skipped_processes: Gauge,
    pub last_collect_duration: Gauge,
    pub last_collect_timestamp: Gauge,

    // Realtime feed
    pub realtime_connections: IntGauge,
    pub realtime_pushes: IntCounter,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let collect_cycles = register_int_counter_vec_with_registry!(
            Opts::new("procwatch_collect_cycles_total", "Collector runs by outcome"),
            &["outcome"],
            registry
        ).unwrap();

        let sampled_processes = register_gauge_with_registry!(
            Opts::new("procwatch_sampled_processes", "Processes normalized in the last sample"),
            registry
        ).unwrap();

        let skipped_processes = register_gauge_with_registry!(
            Opts::new("procwatch_skipped_processes", "Processes skipped in the last sample"),
            registry
        ).unwrap();

        let last_collect_duration = register_gauge_with_registry!(
            Opts::new("procwatch_last_collect_duration_seconds", "Duration of the last collector run"),
            registry
        ).unwrap();

        let last_collect_timestamp = register_gauge_with_registry!(
            Opts::new("procwatch_last_collect_timestamp_seconds", "Unix timestamp of the last successful collector run"),
            registry
        ).unwrap();

        let realtime_connections = register_int_gauge_with_registry!(
            Opts::new("procwatch_realtime_connections", "Open realtime feed connections"),
            registry
        ).unwrap();

        let realtime_pushes = register_int_counter_with_registry!(
            Opts::new("procwatch_realtime_pushes_total", "Snapshots pushed to realtime clients"),
            registry
        ).unwrap();

        Self {
            registry,
            collect_cycles,
            sampled_processes,
            skipped_processes,
            last_collect_duration,
            last_collect_timestamp,
            realtime_connections,
            realtime_pushes,
        }
    }

    pub fn render(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn record_cycle(&self, outcome: &str) {
        self.collect_cycles.with_label_values(&[outcome]).inc();
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    pub static ref METRICS: Arc<MetricsRegistry> = Arc::new(MetricsRegistry::new());
}
