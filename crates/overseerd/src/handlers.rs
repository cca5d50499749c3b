//! Built-in event and task handlers
//!
//! The daemon wires a tracing event handler onto every topic and registers
//! four task kinds: `optimization`, `pattern_analysis`, `prediction` (cached)
//! and a `generic` passthrough. Parameter validation errors surface as failed
//! task results through the executor boundary.

use anyhow::{ensure, Context};
use async_trait::async_trait;
use overseer_core::models::Event;
use overseer_core::{EventHandler, Orchestrator, TaskHandler};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const PREDICTION_CACHE_TTL: Duration = Duration::from_secs(60);

/// Register the built-in handlers on a freshly constructed orchestrator.
pub fn register_builtin(orchestrator: &Orchestrator) {
    for topic in orchestrator.topics() {
        orchestrator.register_event_handler(&topic, Arc::new(TraceEventHandler));
    }
    orchestrator.register_task_handler("optimization", Arc::new(OptimizationHandler));
    orchestrator.register_task_handler("pattern_analysis", Arc::new(PatternAnalysisHandler));
    orchestrator.register_cached_task_handler(
        "prediction",
        Arc::new(PredictionHandler),
        PREDICTION_CACHE_TTL,
    );
    orchestrator.register_task_handler("generic", Arc::new(GenericHandler));
}

/// Logs every dispatched event at debug level.
pub struct TraceEventHandler;

#[async_trait]
impl EventHandler for TraceEventHandler {
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        debug!(topic = %event.topic, event_id = event.id, "Event traced");
        Ok(())
    }
}

/// Iteratively closes the gap between a numeric target and 85% of it.
pub struct OptimizationHandler;

#[async_trait]
impl TaskHandler for OptimizationHandler {
    async fn run(&self, params: &Value) -> anyhow::Result<Value> {
        let target = params
            .get("target")
            .and_then(Value::as_f64)
            .context("optimization requires a numeric 'target' parameter")?;
        let iterations = params
            .get("iterations")
            .and_then(Value::as_u64)
            .unwrap_or(10);

        let goal = target * 0.85;
        let mut value = target;
        for _ in 0..iterations {
            value -= (value - goal) * 0.5;
        }

        let improvement = if target != 0.0 {
            (target - value) / target
        } else {
            0.0
        };
        Ok(json!({
            "optimal_value": value,
            "improvement": improvement,
            "iterations": iterations,
        }))
    }
}

/// Frequency scan over a sample array.
pub struct PatternAnalysisHandler;

#[async_trait]
impl TaskHandler for PatternAnalysisHandler {
    async fn run(&self, params: &Value) -> anyhow::Result<Value> {
        let samples = params
            .get("samples")
            .and_then(Value::as_array)
            .context("pattern_analysis requires a 'samples' array parameter")?;
        ensure!(!samples.is_empty(), "pattern_analysis requires at least one sample");

        let mut counts: HashMap<String, usize> = HashMap::new();
        for sample in samples {
            let key = match sample {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            *counts.entry(key).or_insert(0) += 1;
        }

        // Ties break toward the lexicographically smallest sample.
        let (dominant, occurrences) = counts
            .iter()
            .max_by(|(ka, ca), (kb, cb)| ca.cmp(cb).then_with(|| kb.cmp(ka)))
            .map(|(key, count)| (key.clone(), *count))
            .context("sample counts cannot be empty")?;

        Ok(json!({
            "dominant": dominant,
            "occurrences": occurrences,
            "frequency": occurrences as f64 / samples.len() as f64,
            "unique_values": counts.len(),
            "sample_count": samples.len(),
        }))
    }
}

/// Least-squares extrapolation of the next point in a numeric series.
pub struct PredictionHandler;

#[async_trait]
impl TaskHandler for PredictionHandler {
    async fn run(&self, params: &Value) -> anyhow::Result<Value> {
        let series = params
            .get("series")
            .and_then(Value::as_array)
            .context("prediction requires a 'series' array parameter")?;
        let values: Vec<f64> = series.iter().filter_map(Value::as_f64).collect();
        ensure!(
            values.len() >= 2,
            "prediction requires at least two numeric points"
        );

        let n = values.len() as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = values.iter().sum::<f64>() / n;
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (i, y) in values.iter().enumerate() {
            let dx = i as f64 - mean_x;
            numerator += dx * (y - mean_y);
            denominator += dx * dx;
        }
        let slope = if denominator == 0.0 {
            0.0
        } else {
            numerator / denominator
        };
        let intercept = mean_y - slope * mean_x;
        let predicted = intercept + slope * n;

        Ok(json!({
            "predicted": predicted,
            "slope": slope,
            "points": values.len(),
        }))
    }
}

/// Echoes its parameters back; useful for smoke tests and plumbing checks.
pub struct GenericHandler;

#[async_trait]
impl TaskHandler for GenericHandler {
    async fn run(&self, params: &Value) -> anyhow::Result<Value> {
        Ok(json!({
            "processed": true,
            "params": params,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_optimization_converges_to_85_percent() {
        let output = OptimizationHandler
            .run(&json!({"target": 100.0, "iterations": 32}))
            .await
            .unwrap();

        let optimal = output["optimal_value"].as_f64().unwrap();
        let improvement = output["improvement"].as_f64().unwrap();
        assert!((optimal - 85.0).abs() < 1e-6);
        assert!((improvement - 0.15).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_optimization_rejects_missing_target() {
        let err = OptimizationHandler
            .run(&json!({"iterations": 5}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("target"));
    }

    #[tokio::test]
    async fn test_pattern_analysis_finds_dominant_sample() {
        let output = PatternAnalysisHandler
            .run(&json!({"samples": ["a", "b", "a", "c", "a"]}))
            .await
            .unwrap();

        assert_eq!(output["dominant"], "a");
        assert_eq!(output["occurrences"], 3);
        assert_eq!(output["unique_values"], 3);
        assert!((output["frequency"].as_f64().unwrap() - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_pattern_analysis_breaks_ties_deterministically() {
        let output = PatternAnalysisHandler
            .run(&json!({"samples": ["b", "a", "b", "a"]}))
            .await
            .unwrap();
        assert_eq!(output["dominant"], "a");
    }

    #[tokio::test]
    async fn test_prediction_extrapolates_linear_series() {
        let output = PredictionHandler
            .run(&json!({"series": [1.0, 2.0, 3.0, 4.0]}))
            .await
            .unwrap();

        assert!((output["predicted"].as_f64().unwrap() - 5.0).abs() < 1e-9);
        assert!((output["slope"].as_f64().unwrap() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_prediction_handles_flat_series() {
        let output = PredictionHandler
            .run(&json!({"series": [7.0, 7.0, 7.0]}))
            .await
            .unwrap();
        assert!((output["predicted"].as_f64().unwrap() - 7.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_prediction_requires_two_points() {
        let err = PredictionHandler
            .run(&json!({"series": [1.0]}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("two numeric points"));
    }

    #[tokio::test]
    async fn test_generic_echoes_params() {
        let output = GenericHandler.run(&json!({"k": "v"})).await.unwrap();
        assert_eq!(output["processed"], true);
        assert_eq!(output["params"]["k"], "v");
    }
}
