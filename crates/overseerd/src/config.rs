//! Daemon configuration

use anyhow::Result;
use overseer_core::controller::{ControllerConfig, ThresholdConfig};
use overseer_core::monitor::MonitorConfig;
use overseer_core::orchestrator::{ChannelSpec, OrchestratorConfig};
use overseer_core::pool::{ExecutorConfig, PoolConfig, UnitSpec};
use serde::Deserialize;
use std::time::Duration;

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Instance name used in structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for health/metrics/operations
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Performance capture interval in seconds
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    /// Adaptive control interval in seconds
    #[serde(default = "default_control_interval")]
    pub control_interval_secs: u64,

    /// Per-task execution timeout in seconds
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,

    /// Budget for joining background loops on shutdown, in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Capacity for the four ingest topics
    #[serde(default = "default_ingest_capacity")]
    pub ingest_channel_capacity: usize,

    /// Capacity for the compute and decision topics
    #[serde(default = "default_work_capacity")]
    pub work_channel_capacity: usize,

    /// Override the pool shape: this many uniform units at full quality.
    /// Unset keeps the library's default unit set.
    #[serde(default)]
    pub unit_count: Option<usize>,

    /// Slot capacity per unit when `unit_count` is set
    #[serde(default = "default_unit_capacity")]
    pub unit_capacity: usize,

    /// Mean quality below which the controller recalibrates
    #[serde(default = "default_min_mean_quality")]
    pub min_mean_quality: f64,

    /// Queue saturation above which the controller sheds
    #[serde(default = "default_max_queue_saturation")]
    pub max_queue_saturation: f64,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "overseer".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_monitor_interval() -> u64 {
    5
}

fn default_control_interval() -> u64 {
    60
}

fn default_task_timeout() -> u64 {
    30
}

fn default_shutdown_timeout() -> u64 {
    5
}

fn default_ingest_capacity() -> usize {
    1000
}

fn default_work_capacity() -> usize {
    500
}

fn default_unit_capacity() -> usize {
    2
}

fn default_min_mean_quality() -> f64 {
    0.7
}

fn default_max_queue_saturation() -> f64 {
    0.8
}

impl DaemonConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("OVERSEER"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|_| DaemonConfig {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            monitor_interval_secs: default_monitor_interval(),
            control_interval_secs: default_control_interval(),
            task_timeout_secs: default_task_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            ingest_channel_capacity: default_ingest_capacity(),
            work_channel_capacity: default_work_capacity(),
            unit_count: None,
            unit_capacity: default_unit_capacity(),
            min_mean_quality: default_min_mean_quality(),
            max_queue_saturation: default_max_queue_saturation(),
        }))
    }

    /// Translate the flat daemon settings into the runtime configuration.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let pool = match self.unit_count {
            Some(count) => PoolConfig {
                units: (0..count)
                    .map(|i| UnitSpec::new(format!("unit-{}", i), self.unit_capacity, 1.0))
                    .collect(),
                ..PoolConfig::default()
            },
            None => PoolConfig::default(),
        };

        OrchestratorConfig {
            channels: vec![
                ChannelSpec::new("telemetry", self.ingest_channel_capacity),
                ChannelSpec::new("operations", self.ingest_channel_capacity),
                ChannelSpec::new("analytics", self.ingest_channel_capacity),
                ChannelSpec::new("security", self.ingest_channel_capacity),
                ChannelSpec::new("compute", self.work_channel_capacity),
                ChannelSpec::new("decision", self.work_channel_capacity),
            ],
            pool,
            executor: ExecutorConfig {
                task_timeout: Duration::from_secs(self.task_timeout_secs),
            },
            monitor: MonitorConfig {
                period: Duration::from_secs(self.monitor_interval_secs),
                ..MonitorConfig::default()
            },
            controller: ControllerConfig {
                period: Duration::from_secs(self.control_interval_secs),
                thresholds: ThresholdConfig {
                    min_mean_quality: self.min_mean_quality,
                    max_queue_saturation: self.max_queue_saturation,
                },
                ..ControllerConfig::default()
            },
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            ..OrchestratorConfig::default()
        }
    }
}
