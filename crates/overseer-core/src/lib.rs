//! Core library for telemetry ingestion and adaptive resource scheduling
//!
//! This crate provides the runtime building blocks:
//! - Bounded event channels with load shedding
//! - A resource pool with quality-aware admission
//! - Task execution with result caching
//! - Performance monitoring and adaptive control
//! - Health checks and observability

pub mod cache;
pub mod channel;
pub mod controller;
pub mod error;
pub mod handlers;
pub mod health;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod orchestrator;
pub mod pool;
pub mod report;
pub mod streams;

pub use channel::{BoundedChannel, ChannelConfig, ChannelSet, ChannelStats};
pub use error::SubmitError;
pub use handlers::{EventHandler, TaskHandler};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use monitor::{LoggingSink, MetricsSink};
pub use observability::{CoreMetrics, StructuredLogger};
pub use orchestrator::{ChannelSpec, Orchestrator, OrchestratorConfig};
pub use pool::{PoolConfig, ResourcePool, TaskExecutor, TaskHandle, UnitSpec};
pub use report::{CriticalIssue, HealthBand, SystemReport};
