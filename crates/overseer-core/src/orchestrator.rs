//! Runtime orchestration
//!
//! The orchestrator owns every runtime component and ties their lifecycles
//! together:
//! - one bounded channel and stream loop per configured topic
//! - the resource pool and task executor
//! - the performance monitor and adaptive controller
//!
//! `start` spawns the background loops; `stop` broadcasts shutdown, stops
//! admitting work immediately and joins each loop under a shared deadline.
//! Queued events are deliberately not drained on shutdown.

use crate::cache::{ResultCache, DEFAULT_MAX_ENTRIES};
use crate::channel::{ChannelConfig, ChannelSet};
use crate::controller::{ActionLog, AdaptiveController, ControllerConfig};
use crate::error::SubmitError;
use crate::handlers::{EventHandler, EventHandlerRegistry, TaskHandler, TaskHandlerRegistry};
use crate::health::{components, HealthRegistry};
use crate::models::{Event, MetricsSnapshot, MitigationAction, TaskSpec};
use crate::monitor::{LoggingSink, MetricsSink, MonitorConfig, PerformanceMonitor};
use crate::observability::{CoreMetrics, RuntimeCounters};
use crate::pool::{ExecutorConfig, PoolConfig, ResourcePool, TaskExecutor, TaskHandle};
use crate::report::SystemReport;
use crate::streams::{StreamConfig, StreamProcessor};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// One topic and the capacity of its queue
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub topic: String,
    pub capacity: usize,
}

impl ChannelSpec {
    pub fn new(topic: impl Into<String>, capacity: usize) -> Self {
        Self {
            topic: topic.into(),
            capacity,
        }
    }
}

/// Top-level runtime configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub channels: Vec<ChannelSpec>,
    pub pool: PoolConfig,
    pub executor: ExecutorConfig,
    pub streams: StreamConfig,
    pub monitor: MonitorConfig,
    pub controller: ControllerConfig,
    /// Entry bound for the task result cache.
    pub cache_capacity: usize,
    /// Shared deadline for joining the background loops on stop.
    pub shutdown_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            pool: PoolConfig::default(),
            executor: ExecutorConfig::default(),
            streams: StreamConfig::default(),
            monitor: MonitorConfig::default(),
            controller: ControllerConfig::default(),
            cache_capacity: DEFAULT_MAX_ENTRIES,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

fn default_channels() -> Vec<ChannelSpec> {
    vec![
        ChannelSpec::new("telemetry", 1000),
        ChannelSpec::new("operations", 1000),
        ChannelSpec::new("analytics", 1000),
        ChannelSpec::new("security", 1000),
        ChannelSpec::new("compute", 500),
        ChannelSpec::new("decision", 500),
    ]
}

/// Owns the channels, pool and background loops.
pub struct Orchestrator {
    config: OrchestratorConfig,
    channels: Arc<ChannelSet>,
    pool: Arc<ResourcePool>,
    executor: Arc<TaskExecutor>,
    event_handlers: Arc<EventHandlerRegistry>,
    task_handlers: Arc<TaskHandlerRegistry>,
    counters: Arc<RuntimeCounters>,
    latest: Arc<RwLock<Option<MetricsSnapshot>>>,
    actions: Arc<ActionLog>,
    health: HealthRegistry,
    sink: Arc<dyn MetricsSink>,
    shutdown_tx: broadcast::Sender<()>,
    started: AtomicBool,
    stopping: AtomicBool,
    loops: Mutex<Vec<JoinHandle<()>>>,
    started_at: Instant,
    metrics: CoreMetrics,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_sink(config, Arc::new(LoggingSink))
    }

    /// Build with a custom metrics sink instead of the logging default.
    pub fn with_sink(config: OrchestratorConfig, sink: Arc<dyn MetricsSink>) -> Self {
        let channels = Arc::new(ChannelSet::new(config.channels.iter().map(|spec| {
            (
                spec.topic.clone(),
                ChannelConfig::with_capacity(spec.capacity),
            )
        })));
        let pool = Arc::new(ResourcePool::new(config.pool.clone()));
        let task_handlers = Arc::new(TaskHandlerRegistry::new());
        let counters = Arc::new(RuntimeCounters::new());
        let executor = Arc::new(TaskExecutor::new(
            Arc::clone(&pool),
            Arc::clone(&task_handlers),
            Arc::new(ResultCache::new(config.cache_capacity)),
            Arc::clone(&counters),
            config.executor.clone(),
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            actions: Arc::new(ActionLog::new(config.controller.action_log_capacity)),
            config,
            channels,
            pool,
            executor,
            event_handlers: Arc::new(EventHandlerRegistry::new()),
            task_handlers,
            counters,
            latest: Arc::new(RwLock::new(None)),
            health: HealthRegistry::new(),
            sink,
            shutdown_tx,
            started: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            loops: Mutex::new(Vec::new()),
            started_at: Instant::now(),
            metrics: CoreMetrics::new(),
        }
    }

    /// Attach a handler to a topic's stream.
    pub fn register_event_handler(&self, topic: &str, handler: Arc<dyn EventHandler>) {
        if !self.channels.contains(topic) {
            warn!(topic = %topic, "Registering event handler for a topic with no channel");
        }
        self.event_handlers.register(topic, handler);
    }

    /// Register a handler for a task kind.
    pub fn register_task_handler(&self, kind: &str, handler: Arc<dyn TaskHandler>) {
        self.task_handlers.register(kind, handler);
    }

    /// Register a handler whose successful results are cached for `ttl`.
    pub fn register_cached_task_handler(
        &self,
        kind: &str,
        handler: Arc<dyn TaskHandler>,
        ttl: Duration,
    ) {
        self.task_handlers.register_cached(kind, handler, ttl);
    }

    /// Spawn the stream loops, monitor and controller.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already started");
            return;
        }

        for name in [
            components::ORCHESTRATOR,
            components::STREAMS,
            components::MONITOR,
            components::CONTROLLER,
            components::POOL,
        ] {
            self.health.register(name).await;
        }

        let mut loops = self.loops.lock().unwrap();
        for (_, channel) in self.channels.iter() {
            let processor = StreamProcessor::new(
                Arc::clone(channel),
                Arc::clone(&self.event_handlers),
                Arc::clone(&self.counters),
                self.config.streams.clone(),
            );
            loops.push(tokio::spawn(processor.run(self.shutdown_tx.subscribe())));
        }

        let monitor = PerformanceMonitor::new(
            Arc::clone(&self.channels),
            Arc::clone(&self.pool),
            Arc::clone(&self.counters),
            Arc::clone(&self.sink),
            Arc::clone(&self.latest),
            self.health.clone(),
            self.config.monitor.clone(),
        );
        loops.push(tokio::spawn(monitor.run(self.shutdown_tx.subscribe())));

        let controller = AdaptiveController::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.channels),
            Arc::clone(&self.latest),
            Arc::clone(&self.actions),
            self.health.clone(),
            self.config.controller.clone(),
        );
        loops.push(tokio::spawn(controller.run(self.shutdown_tx.subscribe())));
        drop(loops);

        self.health.set_ready(true).await;
        info!(
            topics = self.channels.len(),
            units = self.pool.unit_count(),
            "Orchestrator started"
        );
    }

    /// Offer an event to a topic's channel.
    ///
    /// Returns false when the channel refuses the event (shed threshold or
    /// capacity), when the topic is unknown, or after stop has begun. Never
    /// blocks the caller.
    pub fn publish(&self, topic: &str, payload: Value) -> bool {
        if self.stopping.load(Ordering::SeqCst) {
            debug!(topic = %topic, "Event refused, orchestrator is stopping");
            return false;
        }
        let channel = match self.channels.get(topic) {
            Some(channel) => channel,
            None => {
                warn!(topic = %topic, "Event published to unknown topic");
                return false;
            }
        };

        let accepted = channel.enqueue(Event::new(topic, payload));
        if accepted {
            self.counters
                .events_published
                .fetch_add(1, Ordering::Relaxed);
            self.metrics.inc_event_published(topic);
        } else {
            self.metrics.inc_event_rejected(topic);
        }
        accepted
    }

    /// Admit and launch a task on the pool.
    pub fn submit(&self, spec: TaskSpec) -> Result<TaskHandle, SubmitError> {
        if self.stopping.load(Ordering::SeqCst) {
            return Err(SubmitError::ShuttingDown);
        }
        self.executor.submit(spec)
    }

    /// Latest aggregated report, if the monitor has captured a snapshot yet.
    pub fn report(&self) -> Option<SystemReport> {
        self.latest
            .read()
            .unwrap()
            .clone()
            .map(|snapshot| SystemReport::from_snapshot(snapshot, self.started_at.elapsed()))
    }

    /// Latest raw snapshot, if any.
    pub fn snapshot(&self) -> Option<MetricsSnapshot> {
        self.latest.read().unwrap().clone()
    }

    /// Most recent mitigation decisions, newest first.
    pub fn recent_actions(&self, limit: usize) -> Vec<MitigationAction> {
        self.actions.recent(limit)
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.channels.contains(topic)
    }

    pub fn unit_count(&self) -> usize {
        self.pool.unit_count()
    }

    pub fn topics(&self) -> Vec<String> {
        self.channels.topics()
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Stop admitting work and shut the background loops down.
    ///
    /// Idempotent; a second call returns immediately. Each loop is joined
    /// under the shared shutdown deadline and aborted if it overruns. Events
    /// still queued at this point are dropped with the process.
    pub async fn stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            debug!("Orchestrator stop already in progress");
            return;
        }
        info!("Orchestrator stopping");

        self.health.set_ready(false).await;
        // No receivers is fine: stop before start still succeeds.
        let _ = self.shutdown_tx.send(());

        let handles: Vec<JoinHandle<()>> = {
            let mut loops = self.loops.lock().unwrap();
            loops.drain(..).collect()
        };
        let deadline = Instant::now() + self.config.shutdown_timeout;
        for mut handle in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "Background loop ended abnormally"),
                Err(_) => {
                    warn!("Background loop missed the shutdown deadline, aborting");
                    handle.abort();
                }
            }
        }

        info!(
            uptime_secs = self.started_at.elapsed().as_secs(),
            "Orchestrator stopped"
        );
    }
}
