//! Operator-facing system report
//!
//! Folds the latest performance snapshot into a single weighted health score
//! with a coarse status band and a list of concrete issues worth acting on.

use crate::models::MetricsSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Coarse health classification derived from the weighted score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthBand {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl fmt::Display for HealthBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthBand::Excellent => write!(f, "excellent"),
            HealthBand::Good => write!(f, "good"),
            HealthBand::Fair => write!(f, "fair"),
            HealthBand::Poor => write!(f, "poor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    High,
    Medium,
}

/// A condition that needs operator attention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalIssue {
    pub severity: IssueSeverity,
    pub component: String,
    pub message: String,
    pub recommendation: String,
}

/// Aggregated view of system health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemReport {
    pub generated_at: DateTime<Utc>,
    pub uptime_secs: u64,
    /// Weighted score in [0, 1].
    pub health_score: f64,
    pub status: HealthBand,
    pub task_success_rate: f64,
    pub delivery_rate: f64,
    /// 1 minus the worst queue saturation.
    pub queue_headroom: f64,
    pub issues: Vec<CriticalIssue>,
    pub snapshot: MetricsSnapshot,
}

// Score weights. Delivery dominates: a system that sheds telemetry is
// failing at its primary job even when the pool looks healthy.
const WEIGHT_TASK_SUCCESS: f64 = 0.25;
const WEIGHT_DELIVERY: f64 = 0.35;
const WEIGHT_QUALITY: f64 = 0.20;
const WEIGHT_HEADROOM: f64 = 0.20;

impl SystemReport {
    /// Build a report from the latest snapshot.
    pub fn from_snapshot(snapshot: MetricsSnapshot, uptime: Duration) -> Self {
        let tasks_total = snapshot.tasks_succeeded + snapshot.tasks_failed;
        let task_success_rate = if tasks_total == 0 {
            1.0
        } else {
            snapshot.tasks_succeeded as f64 / tasks_total as f64
        };

        let delivery_rate = if snapshot.events_published == 0 {
            1.0
        } else {
            let delivered = snapshot
                .events_published
                .saturating_sub(snapshot.events_dropped);
            delivered as f64 / snapshot.events_published as f64
        };

        let queue_headroom = (1.0 - snapshot.max_saturation()).clamp(0.0, 1.0);

        let health_score = WEIGHT_TASK_SUCCESS * task_success_rate
            + WEIGHT_DELIVERY * delivery_rate
            + WEIGHT_QUALITY * snapshot.mean_quality
            + WEIGHT_HEADROOM * queue_headroom;

        let status = if health_score > 0.9 {
            HealthBand::Excellent
        } else if health_score > 0.8 {
            HealthBand::Good
        } else if health_score > 0.6 {
            HealthBand::Fair
        } else {
            HealthBand::Poor
        };

        let issues = Self::collect_issues(&snapshot, task_success_rate, tasks_total);

        Self {
            generated_at: Utc::now(),
            uptime_secs: uptime.as_secs(),
            health_score,
            status,
            task_success_rate,
            delivery_rate,
            queue_headroom,
            issues,
            snapshot,
        }
    }

    fn collect_issues(
        snapshot: &MetricsSnapshot,
        task_success_rate: f64,
        tasks_total: u64,
    ) -> Vec<CriticalIssue> {
        let mut issues = Vec::new();

        for unit in &snapshot.units {
            if unit.quality < 0.5 {
                issues.push(CriticalIssue {
                    severity: IssueSeverity::High,
                    component: "pool".to_string(),
                    message: format!(
                        "Unit {} quality degraded to {:.2}",
                        unit.id, unit.quality
                    ),
                    recommendation: "Reduce task load or wait for recalibration to lift it"
                        .to_string(),
                });
            }
        }

        for (topic, saturation) in &snapshot.queue_saturation {
            if *saturation > 0.9 {
                issues.push(CriticalIssue {
                    severity: IssueSeverity::High,
                    component: "streams".to_string(),
                    message: format!("Queue '{}' is {:.0}% full", topic, saturation * 100.0),
                    recommendation: "Raise the channel capacity or slow the publishers"
                        .to_string(),
                });
            }
        }

        if tasks_total > 0 && task_success_rate < 0.5 {
            issues.push(CriticalIssue {
                severity: IssueSeverity::Medium,
                component: "executor".to_string(),
                message: format!(
                    "Task success rate is {:.0}%",
                    task_success_rate * 100.0
                ),
                recommendation: "Inspect handler errors in the logs for the failing kinds"
                    .to_string(),
            });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitSnapshot;
    use std::collections::BTreeMap;

    fn snapshot(
        mean_quality: f64,
        saturation: &[(&str, f64)],
        published: u64,
        dropped: u64,
        succeeded: u64,
        failed: u64,
    ) -> MetricsSnapshot {
        MetricsSnapshot {
            captured_at: Utc::now(),
            pool_utilization: 0.0,
            mean_quality,
            queue_saturation: saturation
                .iter()
                .map(|(topic, value)| (topic.to_string(), *value))
                .collect::<BTreeMap<_, _>>(),
            events_per_sec: 0.0,
            tasks_per_sec: 0.0,
            events_published: published,
            events_dropped: dropped,
            tasks_succeeded: succeeded,
            tasks_failed: failed,
            units: Vec::new(),
        }
    }

    #[test]
    fn test_idle_system_scores_perfect() {
        let report =
            SystemReport::from_snapshot(snapshot(1.0, &[], 0, 0, 0, 0), Duration::from_secs(30));

        assert!((report.health_score - 1.0).abs() < 1e-9);
        assert_eq!(report.status, HealthBand::Excellent);
        assert_eq!(report.task_success_rate, 1.0);
        assert_eq!(report.delivery_rate, 1.0);
        assert_eq!(report.queue_headroom, 1.0);
        assert!(report.issues.is_empty());
        assert_eq!(report.uptime_secs, 30);
    }

    #[test]
    fn test_weighted_score_composition() {
        // success 0.6, delivery 0.9, quality 0.8, headroom 0.5
        let report = SystemReport::from_snapshot(
            snapshot(0.8, &[("telemetry", 0.5)], 100, 10, 60, 40),
            Duration::from_secs(0),
        );

        let expected = 0.25 * 0.6 + 0.35 * 0.9 + 0.20 * 0.8 + 0.20 * 0.5;
        assert!((report.health_score - expected).abs() < 1e-9);
        assert_eq!(report.status, HealthBand::Fair);
    }

    #[test]
    fn test_status_bands_are_strict_thresholds() {
        let banded = |dropped: u64, quality: f64| {
            SystemReport::from_snapshot(
                snapshot(quality, &[], 1000, dropped, 0, 0),
                Duration::from_secs(0),
            )
            .status
        };

        assert_eq!(banded(0, 1.0), HealthBand::Excellent); // score 1.0
        assert_eq!(banded(400, 1.0), HealthBand::Good); // score 0.86
        assert_eq!(banded(800, 1.0), HealthBand::Fair); // score 0.72
        assert_eq!(banded(1000, 0.5), HealthBand::Poor); // score 0.55
    }

    #[test]
    fn test_degraded_unit_and_saturated_queue_raise_issues() {
        let mut snap = snapshot(0.45, &[("operations", 0.95)], 10, 0, 1, 3);
        snap.units = vec![
            UnitSnapshot {
                id: "unit-0".to_string(),
                capacity: 2,
                active: 0,
                quality: 0.45,
            },
            UnitSnapshot {
                id: "unit-1".to_string(),
                capacity: 2,
                active: 1,
                quality: 0.9,
            },
        ];

        let report = SystemReport::from_snapshot(snap, Duration::from_secs(0));
        assert_eq!(report.issues.len(), 3);
        assert!(matches!(report.issues[0].severity, IssueSeverity::High));
        assert!(report.issues[0].message.contains("unit-0"));
        assert!(report.issues[1].message.contains("operations"));
        assert!(report.issues[2].message.contains("success rate"));
        assert_eq!(report.status, HealthBand::Poor);
    }

    #[test]
    fn test_dropped_events_lower_delivery_rate() {
        let report = SystemReport::from_snapshot(
            snapshot(1.0, &[], 84, 10, 0, 0),
            Duration::from_secs(0),
        );
        assert!((report.delivery_rate - 74.0 / 84.0).abs() < 1e-9);
    }
}
