//! Periodic performance monitoring
//!
//! Captures a `MetricsSnapshot` on a fixed cadence:
//! - pool utilization and mean unit quality
//! - per-topic queue saturation
//! - event and task throughput from counter deltas
//!
//! Every snapshot is stored for `report()` consumers before it is offered to
//! the configured sink, so a slow or failing sink never hides the latest
//! numbers. Sink publishes run under a hard timeout and a failure only marks
//! the monitor degraded; the capture loop itself keeps ticking.

use crate::channel::ChannelSet;
use crate::health::{components, HealthRegistry};
use crate::models::MetricsSnapshot;
use crate::observability::{CoreMetrics, RuntimeCounters};
use crate::pool::ResourcePool;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const DEFAULT_MONITOR_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(2);

/// Rates below this capture interval are reported as zero.
const MIN_RATE_WINDOW_SECS: f64 = 0.001;

/// Destination for periodic snapshots
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn publish(&self, snapshot: &MetricsSnapshot) -> anyhow::Result<()>;
}

/// Default sink: one structured log line per snapshot.
pub struct LoggingSink;

#[async_trait]
impl MetricsSink for LoggingSink {
    async fn publish(&self, snapshot: &MetricsSnapshot) -> anyhow::Result<()> {
        info!(
            event = "metrics_snapshot",
            pool_utilization = snapshot.pool_utilization,
            mean_quality = snapshot.mean_quality,
            max_queue_saturation = snapshot.max_saturation(),
            events_per_sec = snapshot.events_per_sec,
            tasks_per_sec = snapshot.tasks_per_sec,
            events_dropped = snapshot.events_dropped,
            "Periodic performance snapshot"
        );
        Ok(())
    }
}

/// Monitor tuning
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between captures.
    pub period: Duration,
    /// Budget for a single sink publish.
    pub sink_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_MONITOR_PERIOD,
            sink_timeout: DEFAULT_SINK_TIMEOUT,
        }
    }
}

/// Samples runtime state on a fixed cadence.
pub struct PerformanceMonitor {
    channels: Arc<ChannelSet>,
    pool: Arc<ResourcePool>,
    counters: Arc<RuntimeCounters>,
    sink: Arc<dyn MetricsSink>,
    latest: Arc<RwLock<Option<MetricsSnapshot>>>,
    health: HealthRegistry,
    config: MonitorConfig,
    metrics: CoreMetrics,
    last_dispatched: u64,
    last_tasks_done: u64,
    last_capture: Instant,
}

impl PerformanceMonitor {
    pub fn new(
        channels: Arc<ChannelSet>,
        pool: Arc<ResourcePool>,
        counters: Arc<RuntimeCounters>,
        sink: Arc<dyn MetricsSink>,
        latest: Arc<RwLock<Option<MetricsSnapshot>>>,
        health: HealthRegistry,
        config: MonitorConfig,
    ) -> Self {
        Self {
            channels,
            pool,
            counters,
            sink,
            latest,
            health,
            config,
            metrics: CoreMetrics::new(),
            last_dispatched: 0,
            last_tasks_done: 0,
            last_capture: Instant::now(),
        }
    }

    /// Run the capture loop until the shutdown signal arrives.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("Performance monitor stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&mut self) {
        let snapshot = self.capture();

        // Store first: report() must see the newest capture even when the
        // sink is slow or broken.
        {
            let mut latest = self.latest.write().unwrap();
            *latest = Some(snapshot.clone());
        }

        if snapshot.pool_utilization >= 1.0 {
            self.health
                .set_degraded(components::POOL, "All unit slots are busy")
                .await;
        } else {
            self.health.set_healthy(components::POOL).await;
        }

        match tokio::time::timeout(self.config.sink_timeout, self.sink.publish(&snapshot)).await {
            Ok(Ok(())) => {
                self.health.set_healthy(components::MONITOR).await;
            }
            Ok(Err(err)) => {
                self.metrics.inc_sink_failure();
                warn!(error = %format!("{:#}", err), "Metrics sink publish failed");
                self.health
                    .set_degraded(components::MONITOR, "Sink publish failed")
                    .await;
            }
            Err(_) => {
                self.metrics.inc_sink_failure();
                warn!(
                    timeout_ms = self.config.sink_timeout.as_millis() as u64,
                    "Metrics sink publish timed out"
                );
                self.health
                    .set_degraded(components::MONITOR, "Sink publish timed out")
                    .await;
            }
        }
    }

    fn capture(&mut self) -> MetricsSnapshot {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_capture).as_secs_f64();

        let dispatched = self.counters.events_dispatched.load(Ordering::Relaxed);
        let tasks_succeeded = self.counters.tasks_succeeded.load(Ordering::Relaxed);
        let tasks_failed = self.counters.tasks_failed.load(Ordering::Relaxed);
        let tasks_done = tasks_succeeded + tasks_failed;

        let (events_per_sec, tasks_per_sec) = if elapsed >= MIN_RATE_WINDOW_SECS {
            (
                (dispatched - self.last_dispatched) as f64 / elapsed,
                (tasks_done - self.last_tasks_done) as f64 / elapsed,
            )
        } else {
            (0.0, 0.0)
        };
        self.last_dispatched = dispatched;
        self.last_tasks_done = tasks_done;
        self.last_capture = now;

        let mut queue_saturation = BTreeMap::new();
        for (topic, channel) in self.channels.iter() {
            queue_saturation.insert(topic.clone(), channel.saturation());
            self.metrics.set_channel_depth(topic, channel.depth() as i64);
            self.metrics
                .set_channel_dropped(topic, channel.dropped() as i64);
        }

        let pool_utilization = self.pool.utilization();
        let mean_quality = self.pool.mean_quality();
        self.metrics.set_pool_utilization(pool_utilization);
        self.metrics.set_mean_quality(mean_quality);

        MetricsSnapshot {
            captured_at: Utc::now(),
            pool_utilization,
            mean_quality,
            queue_saturation,
            events_per_sec,
            tasks_per_sec,
            events_published: self.counters.events_published.load(Ordering::Relaxed),
            events_dropped: self.channels.total_dropped(),
            tasks_succeeded,
            tasks_failed,
            units: self.pool.unit_snapshots(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelConfig, ChannelSet};
    use crate::health::ComponentStatus;
    use crate::models::Event;
    use crate::pool::{PoolConfig, UnitSpec};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct RecordingSink {
        published: Mutex<Vec<MetricsSnapshot>>,
    }

    #[async_trait]
    impl MetricsSink for RecordingSink {
        async fn publish(&self, snapshot: &MetricsSnapshot) -> anyhow::Result<()> {
            self.published.lock().unwrap().push(snapshot.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl MetricsSink for FailingSink {
        async fn publish(&self, _snapshot: &MetricsSnapshot) -> anyhow::Result<()> {
            anyhow::bail!("sink unavailable")
        }
    }

    struct HangingSink {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl MetricsSink for HangingSink {
        async fn publish(&self, _snapshot: &MetricsSnapshot) -> anyhow::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    struct TestFixture {
        channels: Arc<ChannelSet>,
        pool: Arc<ResourcePool>,
        counters: Arc<RuntimeCounters>,
        latest: Arc<RwLock<Option<MetricsSnapshot>>>,
        health: HealthRegistry,
    }

    fn create_fixture() -> TestFixture {
        TestFixture {
            channels: Arc::new(ChannelSet::new(vec![(
                "telemetry".to_string(),
                ChannelConfig::with_capacity(10),
            )])),
            pool: Arc::new(ResourcePool::new(PoolConfig {
                units: vec![UnitSpec::new("unit-0", 2, 1.0)],
                decay_factor: 0.99,
            })),
            counters: Arc::new(RuntimeCounters::new()),
            latest: Arc::new(RwLock::new(None)),
            health: HealthRegistry::new(),
        }
    }

    fn create_monitor(fixture: &TestFixture, sink: Arc<dyn MetricsSink>) -> PerformanceMonitor {
        PerformanceMonitor::new(
            Arc::clone(&fixture.channels),
            Arc::clone(&fixture.pool),
            Arc::clone(&fixture.counters),
            sink,
            Arc::clone(&fixture.latest),
            fixture.health.clone(),
            MonitorConfig {
                period: Duration::from_millis(20),
                sink_timeout: Duration::from_millis(25),
            },
        )
    }

    #[tokio::test]
    async fn test_snapshot_reflects_queue_and_pool_state() {
        let fixture = create_fixture();
        let channel = fixture.channels.get("telemetry").unwrap();
        for i in 0..5 {
            assert!(channel.enqueue(Event::new("telemetry", json!({"i": i}))));
            fixture
                .counters
                .events_published
                .fetch_add(1, Ordering::Relaxed);
        }

        let sink = Arc::new(RecordingSink {
            published: Mutex::new(Vec::new()),
        });
        let monitor = create_monitor(&fixture, Arc::clone(&sink) as Arc<dyn MetricsSink>);

        let (shutdown_tx, _) = broadcast::channel(1);
        let task = tokio::spawn(monitor.run(shutdown_tx.subscribe()));
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();

        let snapshot = fixture.latest.read().unwrap().clone().unwrap();
        assert_eq!(snapshot.queue_saturation["telemetry"], 0.5);
        assert_eq!(snapshot.events_published, 5);
        assert_eq!(snapshot.pool_utilization, 0.0);
        assert_eq!(snapshot.mean_quality, 1.0);
        assert!(!sink.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_still_stores_snapshot() {
        let fixture = create_fixture();
        let monitor = create_monitor(&fixture, Arc::new(FailingSink));

        let (shutdown_tx, _) = broadcast::channel(1);
        let task = tokio::spawn(monitor.run(shutdown_tx.subscribe()));
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();

        assert!(fixture.latest.read().unwrap().is_some());
        let health = fixture.health.health().await;
        assert_eq!(
            health.components[components::MONITOR].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_hung_sink_does_not_stall_capture_loop() {
        let fixture = create_fixture();
        let sink = Arc::new(HangingSink {
            attempts: AtomicUsize::new(0),
        });
        let monitor = create_monitor(&fixture, Arc::clone(&sink) as Arc<dyn MetricsSink>);

        let (shutdown_tx, _) = broadcast::channel(1);
        let task = tokio::spawn(monitor.run(shutdown_tx.subscribe()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();

        // Each 25ms publish attempt is cut off and the loop ticks again.
        assert!(sink.attempts.load(Ordering::SeqCst) >= 2);
        assert!(fixture.latest.read().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_throughput_rates_derive_from_counter_deltas() {
        let fixture = create_fixture();
        let mut monitor = create_monitor(&fixture, Arc::new(LoggingSink));

        let baseline = monitor.capture();
        assert_eq!(baseline.events_per_sec, 0.0);

        fixture
            .counters
            .events_dispatched
            .fetch_add(50, Ordering::Relaxed);
        fixture
            .counters
            .tasks_succeeded
            .fetch_add(3, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let next = monitor.capture();
        assert!(next.events_per_sec > 0.0);
        assert!(next.tasks_per_sec > 0.0);

        // Rates are per-interval deltas, so an idle follow-up window drops
        // back to zero while cumulative totals persist.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let idle = monitor.capture();
        assert_eq!(idle.events_per_sec, 0.0);
        assert_eq!(idle.tasks_succeeded, 3);
    }

    #[tokio::test]
    async fn test_full_pool_marks_pool_degraded() {
        let fixture = create_fixture();
        let guard_a = fixture.pool.admit("task-a").unwrap();
        let guard_b = fixture.pool.admit("task-b").unwrap();

        let monitor = create_monitor(&fixture, Arc::new(LoggingSink));
        let (shutdown_tx, _) = broadcast::channel(1);
        let task = tokio::spawn(monitor.run(shutdown_tx.subscribe()));
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();

        let health = fixture.health.health().await;
        assert_eq!(
            health.components[components::POOL].status,
            ComponentStatus::Degraded
        );
        drop(guard_a);
        drop(guard_b);
    }
}
