//! Task execution on admitted pool slots
//!
//! The executor dispatches each task to its kind's registered handler under a
//! per-task timeout, converts handler errors into failed results, and relies
//! on `SlotGuard` scope exit for exactly-once release and quality decay.

use super::{ResourcePool, SlotGuard};
use crate::cache::ResultCache;
use crate::error::SubmitError;
use crate::handlers::TaskHandlerRegistry;
use crate::models::{next_task_id, TaskResult, TaskSpec, TaskStatus};
use crate::observability::{CoreMetrics, RuntimeCounters};
use chrono::{DateTime, Utc};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// Executor tuning
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Budget for a single handler invocation.
    pub task_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }
}

/// Resolves to the task's result; drop it for fire-and-forget.
pub struct TaskHandle {
    task_id: String,
    kind: String,
    unit_id: Option<String>,
    rx: oneshot::Receiver<TaskResult>,
}

impl TaskHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Unit the task was admitted onto; `None` for cache hits.
    pub fn unit_id(&self) -> Option<&str> {
        self.unit_id.as_deref()
    }

    /// Await the task's completion.
    pub async fn wait(self) -> TaskResult {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => TaskResult {
                task_id: self.task_id,
                kind: self.kind,
                unit_id: self.unit_id,
                status: TaskStatus::Failed,
                output: None,
                error: Some("executor dropped before producing a result".to_string()),
                created_at: Utc::now(),
                completed_at: Utc::now(),
                duration_ms: 0.0,
                from_cache: false,
            },
        }
    }
}

/// Runs tasks on the resource pool.
pub struct TaskExecutor {
    pool: Arc<ResourcePool>,
    handlers: Arc<TaskHandlerRegistry>,
    cache: Arc<ResultCache>,
    counters: Arc<RuntimeCounters>,
    config: ExecutorConfig,
    metrics: CoreMetrics,
}

impl TaskExecutor {
    pub fn new(
        pool: Arc<ResourcePool>,
        handlers: Arc<TaskHandlerRegistry>,
        cache: Arc<ResultCache>,
        counters: Arc<RuntimeCounters>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            pool,
            handlers,
            cache,
            counters,
            config,
            metrics: CoreMetrics::new(),
        }
    }

    /// Admit and launch a task.
    ///
    /// A cacheable kind is first checked against the result cache; a hit
    /// short-circuits admission entirely (no slot held, no decay applied).
    /// Otherwise admission is atomic and `ResourceExhausted` is returned when
    /// no unit has a spare slot. Execution itself runs on a spawned task.
    pub fn submit(self: &Arc<Self>, spec: TaskSpec) -> Result<TaskHandle, SubmitError> {
        let created_at = Utc::now();
        let cache_ttl = self.handlers.cache_ttl(&spec.kind);

        if cache_ttl.is_some() {
            let key = ResultCache::signature(&spec.kind, &spec.params);
            if let Some(value) = self.cache.get(&key) {
                self.metrics.inc_cache_hit();
                return Ok(Self::resolved_handle(&spec.kind, value, created_at));
            }
            self.metrics.inc_cache_miss();
        }

        let task_id = next_task_id();
        let guard = self.pool.admit(&task_id).map_err(|err| {
            self.metrics.inc_task_rejected();
            err
        })?;
        self.metrics.inc_task_submitted();
        debug!(
            task_id = %task_id,
            kind = %spec.kind,
            unit = %guard.unit_id(),
            status = %TaskStatus::Pending,
            "Task admitted"
        );

        let (tx, rx) = oneshot::channel();
        let handle = TaskHandle {
            task_id: task_id.clone(),
            kind: spec.kind.clone(),
            unit_id: Some(guard.unit_id().to_string()),
            rx,
        };

        let executor = Arc::clone(self);
        tokio::spawn(async move {
            let result = executor.execute(spec, task_id, created_at, guard, cache_ttl).await;
            let _ = tx.send(result);
        });

        Ok(handle)
    }

    /// Handle already completed (cache hit): the receiver resolves at once.
    fn resolved_handle(kind: &str, value: serde_json::Value, created_at: DateTime<Utc>) -> TaskHandle {
        let task_id = next_task_id();
        let result = TaskResult {
            task_id: task_id.clone(),
            kind: kind.to_string(),
            unit_id: None,
            status: TaskStatus::Succeeded,
            output: Some(value),
            error: None,
            created_at,
            completed_at: Utc::now(),
            duration_ms: 0.0,
            from_cache: true,
        };
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        TaskHandle {
            task_id,
            kind: kind.to_string(),
            unit_id: None,
            rx,
        }
    }

    async fn execute(
        &self,
        spec: TaskSpec,
        task_id: String,
        created_at: DateTime<Utc>,
        guard: SlotGuard,
        cache_ttl: Option<Duration>,
    ) -> TaskResult {
        let unit_id = guard.unit_id().to_string();
        let started = Instant::now();

        let outcome: Result<serde_json::Value, String> = match self.handlers.get(&spec.kind) {
            Some((handler, _)) => {
                match tokio::time::timeout(self.config.task_timeout, handler.run(&spec.params))
                    .await
                {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(format!("{:#}", err)),
                    Err(_) => Err(format!(
                        "handler exceeded {}ms execution timeout",
                        self.config.task_timeout.as_millis()
                    )),
                }
            }
            None => Err(format!("no handler registered for task kind '{}'", spec.kind)),
        };

        // Slot release and quality decay happen here, exactly once, before
        // the result is shaped or cached.
        drop(guard);

        let duration = started.elapsed();
        self.metrics.observe_task_duration(duration.as_secs_f64());
        let duration_ms = duration.as_secs_f64() * 1000.0;

        match outcome {
            Ok(value) => {
                if let Some(ttl) = cache_ttl {
                    let key = ResultCache::signature(&spec.kind, &spec.params);
                    self.cache.insert(key, value.clone(), ttl);
                }
                self.counters.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_task_succeeded();
                debug!(
                    task_id = %task_id,
                    kind = %spec.kind,
                    unit = %unit_id,
                    duration_ms = duration_ms,
                    "Task succeeded"
                );
                TaskResult {
                    task_id,
                    kind: spec.kind,
                    unit_id: Some(unit_id),
                    status: TaskStatus::Succeeded,
                    output: Some(value),
                    error: None,
                    created_at,
                    completed_at: Utc::now(),
                    duration_ms,
                    from_cache: false,
                }
            }
            Err(error) => {
                self.counters.tasks_failed.fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_task_failed();
                warn!(
                    task_id = %task_id,
                    kind = %spec.kind,
                    unit = %unit_id,
                    duration_ms = duration_ms,
                    error = %error,
                    "Task failed"
                );
                TaskResult {
                    task_id,
                    kind: spec.kind,
                    unit_id: Some(unit_id),
                    status: TaskStatus::Failed,
                    output: None,
                    error: Some(error),
                    created_at,
                    completed_at: Utc::now(),
                    duration_ms,
                    from_cache: false,
                }
            }
        }
    }
}
