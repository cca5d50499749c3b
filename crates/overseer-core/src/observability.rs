//! Observability infrastructure for the overseer runtime
//!
//! Provides:
//! - Prometheus metrics (event flow, task outcomes, pool gauges, actions)
//! - Plain atomic counters the monitor samples for throughput
//! - Structured JSON logging helpers for lifecycle events

use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, Gauge, Histogram, IntCounter, IntCounterVec, IntGaugeVec,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing::info;

/// Histogram buckets for task execution time (in seconds)
const TASK_DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<CoreMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct CoreMetricsInner {
    events_published: IntCounterVec,
    events_rejected: IntCounterVec,
    events_dispatched: IntCounterVec,
    handler_errors: IntCounterVec,
    channel_depth: IntGaugeVec,
    channel_dropped: IntGaugeVec,
    tasks_submitted: IntCounter,
    tasks_succeeded: IntCounter,
    tasks_failed: IntCounter,
    tasks_rejected: IntCounter,
    task_duration_seconds: Histogram,
    pool_utilization: Gauge,
    pool_mean_quality: Gauge,
    mitigation_actions: IntCounterVec,
    sink_failures: IntCounter,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
}

impl CoreMetricsInner {
    fn new() -> Self {
        Self {
            events_published: register_int_counter_vec!(
                "overseer_events_published_total",
                "Events accepted onto a channel",
                &["topic"]
            )
            .expect("Failed to register events_published"),

            events_rejected: register_int_counter_vec!(
                "overseer_events_rejected_total",
                "Events refused by a channel at its shed threshold or capacity",
                &["topic"]
            )
            .expect("Failed to register events_rejected"),

            events_dispatched: register_int_counter_vec!(
                "overseer_events_dispatched_total",
                "Events dequeued by the stream loops",
                &["topic"]
            )
            .expect("Failed to register events_dispatched"),

            handler_errors: register_int_counter_vec!(
                "overseer_handler_errors_total",
                "Event handler failures, isolated per topic",
                &["topic"]
            )
            .expect("Failed to register handler_errors"),

            channel_depth: register_int_gauge_vec!(
                "overseer_channel_depth",
                "Current queued events per channel",
                &["topic"]
            )
            .expect("Failed to register channel_depth"),

            channel_dropped: register_int_gauge_vec!(
                "overseer_channel_dropped_events",
                "Events shed per channel, mirrored from the channel counters",
                &["topic"]
            )
            .expect("Failed to register channel_dropped"),

            tasks_submitted: register_int_counter!(
                "overseer_tasks_submitted_total",
                "Tasks admitted onto a resource unit"
            )
            .expect("Failed to register tasks_submitted"),

            tasks_succeeded: register_int_counter!(
                "overseer_tasks_succeeded_total",
                "Tasks completed successfully"
            )
            .expect("Failed to register tasks_succeeded"),

            tasks_failed: register_int_counter!(
                "overseer_tasks_failed_total",
                "Tasks that failed, timed out, or had no handler"
            )
            .expect("Failed to register tasks_failed"),

            tasks_rejected: register_int_counter!(
                "overseer_tasks_rejected_total",
                "Submissions refused because no unit had spare capacity"
            )
            .expect("Failed to register tasks_rejected"),

            task_duration_seconds: register_histogram!(
                "overseer_task_duration_seconds",
                "Wall-clock task execution time",
                TASK_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register task_duration_seconds"),

            pool_utilization: register_gauge!(
                "overseer_pool_utilization",
                "Active slots over total capacity"
            )
            .expect("Failed to register pool_utilization"),

            pool_mean_quality: register_gauge!(
                "overseer_pool_mean_quality",
                "Mean quality across resource units"
            )
            .expect("Failed to register pool_mean_quality"),

            mitigation_actions: register_int_counter_vec!(
                "overseer_mitigation_actions_total",
                "Corrective actions issued by the adaptive controller",
                &["kind"]
            )
            .expect("Failed to register mitigation_actions"),

            sink_failures: register_int_counter!(
                "overseer_sink_failures_total",
                "Snapshot publications that failed or timed out"
            )
            .expect("Failed to register sink_failures"),

            cache_hits: register_int_counter!(
                "overseer_cache_hits_total",
                "Task submissions served from the result cache"
            )
            .expect("Failed to register cache_hits"),

            cache_misses: register_int_counter!(
                "overseer_cache_misses_total",
                "Cacheable submissions that missed the result cache"
            )
            .expect("Failed to register cache_misses"),
        }
    }
}

/// Core metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct CoreMetrics {
    _private: (),
}

impl Default for CoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(CoreMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &CoreMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn inc_event_published(&self, topic: &str) {
        self.inner().events_published.with_label_values(&[topic]).inc();
    }

    pub fn inc_event_rejected(&self, topic: &str) {
        self.inner().events_rejected.with_label_values(&[topic]).inc();
    }

    pub fn inc_event_dispatched(&self, topic: &str) {
        self.inner().events_dispatched.with_label_values(&[topic]).inc();
    }

    pub fn inc_handler_error(&self, topic: &str) {
        self.inner().handler_errors.with_label_values(&[topic]).inc();
    }

    pub fn set_channel_depth(&self, topic: &str, depth: i64) {
        self.inner().channel_depth.with_label_values(&[topic]).set(depth);
    }

    pub fn set_channel_dropped(&self, topic: &str, dropped: i64) {
        self.inner()
            .channel_dropped
            .with_label_values(&[topic])
            .set(dropped);
    }

    pub fn inc_task_submitted(&self) {
        self.inner().tasks_submitted.inc();
    }

    pub fn inc_task_succeeded(&self) {
        self.inner().tasks_succeeded.inc();
    }

    pub fn inc_task_failed(&self) {
        self.inner().tasks_failed.inc();
    }

    pub fn inc_task_rejected(&self) {
        self.inner().tasks_rejected.inc();
    }

    pub fn observe_task_duration(&self, duration_secs: f64) {
        self.inner().task_duration_seconds.observe(duration_secs);
    }

    pub fn set_pool_utilization(&self, value: f64) {
        self.inner().pool_utilization.set(value);
    }

    pub fn set_mean_quality(&self, value: f64) {
        self.inner().pool_mean_quality.set(value);
    }

    pub fn inc_action(&self, kind: &str) {
        self.inner().mitigation_actions.with_label_values(&[kind]).inc();
    }

    pub fn inc_sink_failure(&self) {
        self.inner().sink_failures.inc();
    }

    pub fn inc_cache_hit(&self) {
        self.inner().cache_hits.inc();
    }

    pub fn inc_cache_miss(&self) {
        self.inner().cache_misses.inc();
    }
}

/// Plain counters sampled by the performance monitor for throughput rates.
///
/// Prometheus counters cover exposition; these cover the monitor's
/// delta-per-tick arithmetic without touching the global registry.
#[derive(Debug, Default)]
pub struct RuntimeCounters {
    pub events_published: AtomicU64,
    pub events_dispatched: AtomicU64,
    pub tasks_succeeded: AtomicU64,
    pub tasks_failed: AtomicU64,
}

impl RuntimeCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    pub fn dispatched(&self) -> u64 {
        self.events_dispatched.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.tasks_succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.tasks_failed.load(Ordering::Relaxed)
    }
}

/// Structured logger for lifecycle events
///
/// Provides consistent JSON-formatted logging for startup, readiness,
/// and shutdown of an overseer instance.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log instance startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "overseer_started",
            instance = %self.instance,
            version = %version,
            "Overseer starting"
        );
    }

    /// Log the wired topology once the orchestrator is running
    pub fn log_ready(&self, topics: usize, units: usize) {
        info!(
            event = "overseer_ready",
            instance = %self.instance,
            topics = topics,
            units = units,
            "Overseer ready"
        );
    }

    /// Log instance shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "overseer_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Overseer shutting down"
        );
    }
}
