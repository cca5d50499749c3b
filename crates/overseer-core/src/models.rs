//! Core data models for the overseer runtime

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_TASK_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-unique event id.
pub fn next_event_id() -> u64 {
    NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Process-unique task id, generated at submission.
pub fn next_task_id() -> String {
    format!("task-{:06}", NEXT_TASK_SEQ.fetch_add(1, Ordering::Relaxed))
}

/// A telemetry event flowing through a named channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub topic: String,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: next_event_id(),
            topic: topic.into(),
            payload,
            enqueued_at: Utc::now(),
        }
    }
}

/// Work submitted to the resource pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub kind: String,
    pub params: serde_json::Value,
}

impl TaskSpec {
    pub fn new(kind: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Succeeded,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one task execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub kind: String,
    /// Unit that ran the task; `None` for results served from the cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: f64,
    pub from_cache: bool,
}

/// Point-in-time view of one resource unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub id: String,
    pub capacity: usize,
    pub active: usize,
    pub quality: f64,
}

/// Immutable sample of system performance, captured by the monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub captured_at: DateTime<Utc>,
    /// Sum of active slots over sum of capacities, 0.0 for an empty pool.
    pub pool_utilization: f64,
    /// Arithmetic mean of unit qualities, 1.0 for an empty pool.
    pub mean_quality: f64,
    /// depth / capacity per topic.
    pub queue_saturation: BTreeMap<String, f64>,
    pub events_per_sec: f64,
    pub tasks_per_sec: f64,
    pub events_published: u64,
    pub events_dropped: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub units: Vec<UnitSnapshot>,
}

impl MetricsSnapshot {
    /// Highest per-topic saturation, 0.0 when no channels exist.
    pub fn max_saturation(&self) -> f64 {
        self.queue_saturation
            .values()
            .copied()
            .fold(0.0_f64, f64::max)
    }
}

/// Corrective action kinds issued by the adaptive controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    RecalibrateUnit,
    ShedChannel,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::RecalibrateUnit => write!(f, "recalibrate_unit"),
            ActionKind::ShedChannel => write!(f, "shed_channel"),
        }
    }
}

/// Whether an issued action changed anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionOutcome {
    Applied,
    Skipped,
}

/// One entry in the mitigation action log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationAction {
    pub kind: ActionKind,
    pub target: String,
    pub issued_at: DateTime<Utc>,
    pub outcome: ActionOutcome,
    pub detail: String,
}

impl MitigationAction {
    pub fn applied(kind: ActionKind, target: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            issued_at: Utc::now(),
            outcome: ActionOutcome::Applied,
            detail: detail.into(),
        }
    }

    pub fn skipped(kind: ActionKind, target: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            issued_at: Utc::now(),
            outcome: ActionOutcome::Skipped,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_are_unique() {
        let a = next_task_id();
        let b = next_task_id();
        assert_ne!(a, b);
        assert!(a.starts_with("task-"));
    }

    #[test]
    fn test_event_carries_topic_and_payload() {
        let event = Event::new("telemetry", serde_json::json!({"reading": 42}));
        assert_eq!(event.topic, "telemetry");
        assert_eq!(event.payload["reading"], 42);
        assert!(event.id > 0);
    }

    #[test]
    fn test_max_saturation_empty_is_zero() {
        let snapshot = MetricsSnapshot {
            captured_at: Utc::now(),
            pool_utilization: 0.0,
            mean_quality: 1.0,
            queue_saturation: BTreeMap::new(),
            events_per_sec: 0.0,
            tasks_per_sec: 0.0,
            events_published: 0,
            events_dropped: 0,
            tasks_succeeded: 0,
            tasks_failed: 0,
            units: Vec::new(),
        };
        assert_eq!(snapshot.max_saturation(), 0.0);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Succeeded).unwrap();
        assert_eq!(json, "\"succeeded\"");
    }
}
