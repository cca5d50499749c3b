//! Resource pool and admission control
//!
//! A fixed set of units, each with a slot capacity and a quality score in
//! [0, 1]. Admission selects the highest-quality unit with spare capacity
//! (lowest id wins ties) and inserts into its active set inside one critical
//! section, so concurrent over-submission can never exceed capacity. Slot
//! release and quality decay are tied to `SlotGuard` scope exit, which makes
//! them exactly-once even when a handler fails.

mod executor;

pub use executor::{ExecutorConfig, TaskExecutor, TaskHandle, DEFAULT_TASK_TIMEOUT};

use crate::error::SubmitError;
use crate::models::UnitSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::info;

pub const DEFAULT_DECAY_FACTOR: f64 = 0.99;
pub const DEFAULT_UNIT_CAPACITY: usize = 2;

/// Static description of one resource unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSpec {
    pub id: String,
    pub capacity: usize,
    pub initial_quality: f64,
}

impl UnitSpec {
    pub fn new(id: impl Into<String>, capacity: usize, initial_quality: f64) -> Self {
        Self {
            id: id.into(),
            capacity,
            initial_quality,
        }
    }
}

/// Pool construction parameters
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub units: Vec<UnitSpec>,
    /// Multiplied into a unit's quality once per completed task.
    pub decay_factor: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            units: vec![
                UnitSpec::new("unit-0", DEFAULT_UNIT_CAPACITY, 1.0),
                UnitSpec::new("unit-1", DEFAULT_UNIT_CAPACITY, 0.95),
                UnitSpec::new("unit-2", DEFAULT_UNIT_CAPACITY, 0.98),
            ],
            decay_factor: DEFAULT_DECAY_FACTOR,
        }
    }
}

struct UnitState {
    spec: UnitSpec,
    active: HashSet<String>,
    quality: f64,
}

/// Fixed pool of capacity-bounded units.
pub struct ResourcePool {
    units: Mutex<Vec<UnitState>>,
    decay_factor: f64,
}

impl ResourcePool {
    pub fn new(config: PoolConfig) -> Self {
        let mut specs = config.units;
        specs.sort_by(|a, b| a.id.cmp(&b.id));
        let units = specs
            .into_iter()
            .map(|spec| UnitState {
                quality: spec.initial_quality.clamp(0.0, 1.0),
                active: HashSet::new(),
                spec,
            })
            .collect();
        Self {
            units: Mutex::new(units),
            decay_factor: config.decay_factor,
        }
    }

    /// Admit `task_id` onto the best available unit.
    ///
    /// Scans units in id order and picks the highest quality among those with
    /// spare capacity; the strict comparison makes the lowest id win ties.
    /// Selection and insertion happen under one lock.
    pub fn admit(self: &Arc<Self>, task_id: &str) -> Result<SlotGuard, SubmitError> {
        let mut units = self.units.lock().unwrap();

        let mut best: Option<(usize, f64)> = None;
        for index in 0..units.len() {
            let unit = &units[index];
            if unit.active.len() < unit.spec.capacity {
                let better = match best {
                    None => true,
                    Some((_, quality)) => unit.quality > quality,
                };
                if better {
                    best = Some((index, unit.quality));
                }
            }
        }

        let (index, _) = best.ok_or(SubmitError::ResourceExhausted)?;
        let unit = &mut units[index];
        unit.active.insert(task_id.to_string());
        debug_assert!(unit.active.len() <= unit.spec.capacity);
        let unit_id = unit.spec.id.clone();
        drop(units);

        Ok(SlotGuard {
            pool: Arc::clone(self),
            unit_index: index,
            unit_id,
            task_id: task_id.to_string(),
        })
    }

    /// Remove a task from its unit and apply quality decay.
    ///
    /// Called from `SlotGuard::drop`, so it runs exactly once per admitted
    /// task, success or failure.
    fn complete(&self, unit_index: usize, task_id: &str) {
        let mut units = self.units.lock().unwrap();
        let unit = &mut units[unit_index];
        let removed = unit.active.remove(task_id);
        debug_assert!(removed, "task released twice or never admitted");
        unit.quality = (unit.quality * self.decay_factor).clamp(0.0, 1.0);
    }

    /// Raise every unit below `threshold` by `step`, capped at 1.0.
    ///
    /// Returns (unit id, quality before, quality after) per adjusted unit.
    /// Shares the admission lock, so recalibration never interleaves with a
    /// check-and-insert.
    pub fn recalibrate_below(&self, threshold: f64, step: f64) -> Vec<(String, f64, f64)> {
        let mut units = self.units.lock().unwrap();
        let mut adjusted = Vec::new();
        for unit in units.iter_mut() {
            if unit.quality < threshold {
                let before = unit.quality;
                unit.quality = (unit.quality + step).min(1.0);
                info!(
                    unit = %unit.spec.id,
                    before = before,
                    after = unit.quality,
                    "Recalibrated unit quality"
                );
                adjusted.push((unit.spec.id.clone(), before, unit.quality));
            }
        }
        adjusted
    }

    /// Sum of active slots over sum of capacities, 0.0 for an empty pool.
    pub fn utilization(&self) -> f64 {
        let units = self.units.lock().unwrap();
        let capacity: usize = units.iter().map(|u| u.spec.capacity).sum();
        if capacity == 0 {
            return 0.0;
        }
        let active: usize = units.iter().map(|u| u.active.len()).sum();
        active as f64 / capacity as f64
    }

    /// Arithmetic mean of unit qualities, 1.0 for an empty pool.
    pub fn mean_quality(&self) -> f64 {
        let units = self.units.lock().unwrap();
        if units.is_empty() {
            return 1.0;
        }
        units.iter().map(|u| u.quality).sum::<f64>() / units.len() as f64
    }

    pub fn total_active(&self) -> usize {
        self.units.lock().unwrap().iter().map(|u| u.active.len()).sum()
    }

    pub fn total_capacity(&self) -> usize {
        self.units
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.spec.capacity)
            .sum()
    }

    pub fn unit_count(&self) -> usize {
        self.units.lock().unwrap().len()
    }

    pub fn unit_snapshots(&self) -> Vec<UnitSnapshot> {
        self.units
            .lock()
            .unwrap()
            .iter()
            .map(|u| UnitSnapshot {
                id: u.spec.id.clone(),
                capacity: u.spec.capacity,
                active: u.active.len(),
                quality: u.quality,
            })
            .collect()
    }
}

/// Holds one admitted slot; dropping it releases the slot and applies decay.
pub struct SlotGuard {
    pool: Arc<ResourcePool>,
    unit_index: usize,
    unit_id: String,
    task_id: String,
}

impl SlotGuard {
    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.pool.complete(self.unit_index, &self.task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_pool(units: Vec<UnitSpec>) -> Arc<ResourcePool> {
        Arc::new(ResourcePool::new(PoolConfig {
            units,
            decay_factor: DEFAULT_DECAY_FACTOR,
        }))
    }

    #[test]
    fn test_admission_prefers_highest_quality() {
        let pool = create_test_pool(vec![
            UnitSpec::new("unit-0", 2, 0.9),
            UnitSpec::new("unit-1", 2, 0.95),
        ]);

        let guard = pool.admit("t1").unwrap();
        assert_eq!(guard.unit_id(), "unit-1");
    }

    #[test]
    fn test_admission_tie_breaks_on_lowest_id() {
        let pool = create_test_pool(vec![
            UnitSpec::new("unit-1", 2, 0.9),
            UnitSpec::new("unit-0", 2, 0.9),
        ]);

        let guard = pool.admit("t1").unwrap();
        assert_eq!(guard.unit_id(), "unit-0");
    }

    #[test]
    fn test_admission_exhausts_at_capacity() {
        let pool = create_test_pool(vec![
            UnitSpec::new("unit-0", 2, 1.0),
            UnitSpec::new("unit-1", 2, 0.98),
        ]);

        let guards: Vec<_> = (0..4)
            .map(|n| pool.admit(&format!("t{}", n)).unwrap())
            .collect();
        assert_eq!(pool.total_active(), 4);

        assert_eq!(
            pool.admit("t4").unwrap_err(),
            SubmitError::ResourceExhausted
        );

        drop(guards);
        assert_eq!(pool.total_active(), 0);
        assert!(pool.admit("t5").is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admission_never_exceeds_capacity() {
        let pool = create_test_pool(vec![
            UnitSpec::new("unit-0", 2, 1.0),
            UnitSpec::new("unit-1", 2, 0.98),
        ]);

        let mut attempts = Vec::new();
        for n in 0..32 {
            let pool = Arc::clone(&pool);
            attempts.push(tokio::spawn(async move {
                pool.admit(&format!("t{}", n)).ok()
            }));
        }

        let mut guards = Vec::new();
        for attempt in attempts {
            if let Some(guard) = attempt.await.unwrap() {
                guards.push(guard);
            }
        }

        assert_eq!(guards.len(), 4);
        assert_eq!(pool.total_active(), 4);

        drop(guards);
        assert_eq!(pool.total_active(), 0);
    }

    #[test]
    fn test_release_applies_decay_once() {
        let pool = create_test_pool(vec![UnitSpec::new("unit-0", 2, 1.0)]);

        let guard = pool.admit("t1").unwrap();
        assert!((pool.mean_quality() - 1.0).abs() < f64::EPSILON);
        drop(guard);

        assert!((pool.mean_quality() - 0.99).abs() < 1e-12);
        assert_eq!(pool.total_active(), 0);
    }

    #[test]
    fn test_fifty_completions_decay_to_expected_quality() {
        let pool = create_test_pool(vec![UnitSpec::new("unit-0", 1, 1.0)]);

        for n in 0..50 {
            let guard = pool.admit(&format!("t{}", n)).unwrap();
            drop(guard);
        }

        let expected = 0.99_f64.powi(50);
        assert!((pool.mean_quality() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_recalibration_caps_at_one() {
        let pool = create_test_pool(vec![
            UnitSpec::new("unit-0", 1, 0.62),
            UnitSpec::new("unit-1", 1, 0.97),
        ]);

        let adjusted = pool.recalibrate_below(0.7, 0.1);
        assert_eq!(adjusted.len(), 1);
        assert_eq!(adjusted[0].0, "unit-0");
        assert!((adjusted[0].2 - 0.72).abs() < 1e-12);

        // Already above threshold: nothing to do.
        assert!(pool.recalibrate_below(0.7, 0.1).is_empty());

        // Step overshooting 1.0 is capped.
        let adjusted = pool.recalibrate_below(0.99, 0.5);
        let snapshots = pool.unit_snapshots();
        assert!(!adjusted.is_empty());
        for unit in snapshots {
            assert!(unit.quality <= 1.0);
            assert!(unit.quality >= 0.0);
        }
    }

    #[test]
    fn test_initial_quality_clamped() {
        let pool = create_test_pool(vec![
            UnitSpec::new("unit-0", 1, 1.7),
            UnitSpec::new("unit-1", 1, -0.3),
        ]);
        let snapshots = pool.unit_snapshots();
        assert_eq!(snapshots[0].quality, 1.0);
        assert_eq!(snapshots[1].quality, 0.0);
    }

    #[test]
    fn test_utilization_math() {
        let pool = create_test_pool(vec![
            UnitSpec::new("unit-0", 2, 1.0),
            UnitSpec::new("unit-1", 2, 1.0),
        ]);
        assert_eq!(pool.utilization(), 0.0);

        let _g1 = pool.admit("t1").unwrap();
        let _g2 = pool.admit("t2").unwrap();
        assert!((pool.utilization() - 0.5).abs() < f64::EPSILON);
    }
}
