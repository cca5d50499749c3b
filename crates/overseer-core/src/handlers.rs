//! Handler contracts for event dispatch and task execution
//!
//! Both traits are in-process seams: embedders register implementations at
//! runtime and the core stays agnostic to what they compute.

use crate::models::Event;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Consumes events dispatched from one topic's stream loop.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

/// Runs one task kind; errors are converted to failed results at the
/// executor boundary.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, params: &Value) -> anyhow::Result<Value>;
}

/// Topic -> event handler, registered at runtime.
#[derive(Default)]
pub struct EventHandlerRegistry {
    handlers: DashMap<String, Arc<dyn EventHandler>>,
}

impl EventHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, topic: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(topic.into(), handler);
    }

    pub fn get(&self, topic: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(topic).map(|entry| Arc::clone(&entry))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[derive(Clone)]
struct TaskRegistration {
    handler: Arc<dyn TaskHandler>,
    cache_ttl: Option<Duration>,
}

/// Task kind -> task handler, with optional per-kind result caching.
#[derive(Default)]
pub struct TaskHandlerRegistry {
    handlers: DashMap<String, TaskRegistration>,
}

impl TaskHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(
            kind.into(),
            TaskRegistration {
                handler,
                cache_ttl: None,
            },
        );
    }

    /// Register a handler whose results are cached for `ttl` per call
    /// signature.
    pub fn register_cached(
        &self,
        kind: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
        ttl: Duration,
    ) {
        self.handlers.insert(
            kind.into(),
            TaskRegistration {
                handler,
                cache_ttl: Some(ttl),
            },
        );
    }

    pub fn get(&self, kind: &str) -> Option<(Arc<dyn TaskHandler>, Option<Duration>)> {
        self.handlers
            .get(kind)
            .map(|entry| (Arc::clone(&entry.handler), entry.cache_ttl))
    }

    pub fn cache_ttl(&self, kind: &str) -> Option<Duration> {
        self.handlers.get(kind).and_then(|entry| entry.cache_ttl)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEventHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for CountingEventHandler {
        async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct EchoTaskHandler;

    #[async_trait]
    impl TaskHandler for EchoTaskHandler {
        async fn run(&self, params: &Value) -> anyhow::Result<Value> {
            Ok(params.clone())
        }
    }

    #[tokio::test]
    async fn test_event_registry_dispatch() {
        let registry = EventHandlerRegistry::new();
        let handler = Arc::new(CountingEventHandler {
            calls: AtomicUsize::new(0),
        });
        registry.register("telemetry", handler.clone());

        let found = registry.get("telemetry").unwrap();
        let event = Event::new("telemetry", json!({}));
        found.handle(&event).await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert!(registry.get("unknown").is_none());
    }

    #[tokio::test]
    async fn test_task_registry_cache_ttl() {
        let registry = TaskHandlerRegistry::new();
        registry.register("plain", Arc::new(EchoTaskHandler));
        registry.register_cached("cached", Arc::new(EchoTaskHandler), Duration::from_secs(60));

        let (_, plain_ttl) = registry.get("plain").unwrap();
        assert!(plain_ttl.is_none());

        let (handler, cached_ttl) = registry.get("cached").unwrap();
        assert_eq!(cached_ttl, Some(Duration::from_secs(60)));

        let out = handler.run(&json!({"x": 1})).await.unwrap();
        assert_eq!(out["x"], 1);
    }
}
