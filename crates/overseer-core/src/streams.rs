//! Per-topic stream processing
//!
//! Each topic gets one `StreamProcessor` loop that drains its bounded channel
//! and dispatches events to the topic's registered handler. Handler failures
//! are logged and counted but never terminate the loop, so a misbehaving
//! topic cannot stall the others.

use crate::channel::BoundedChannel;
use crate::handlers::EventHandlerRegistry;
use crate::models::Event;
use crate::observability::{CoreMetrics, RuntimeCounters};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Stream loop tuning
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Upper bound on a single blocking dequeue, and therefore on how long
    /// a stop signal can go unobserved.
    pub poll_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Drains one topic's channel and feeds its handler.
pub struct StreamProcessor {
    channel: Arc<BoundedChannel>,
    handlers: Arc<EventHandlerRegistry>,
    counters: Arc<RuntimeCounters>,
    config: StreamConfig,
    metrics: CoreMetrics,
}

impl StreamProcessor {
    pub fn new(
        channel: Arc<BoundedChannel>,
        handlers: Arc<EventHandlerRegistry>,
        counters: Arc<RuntimeCounters>,
        config: StreamConfig,
    ) -> Self {
        Self {
            channel,
            handlers,
            counters,
            config,
            metrics: CoreMetrics::new(),
        }
    }

    /// Run the dispatch loop until the shutdown signal arrives.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        debug!(topic = %self.channel.topic(), "Stream processor started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!(topic = %self.channel.topic(), "Stream processor stopping");
                    break;
                }
                dequeued = self.channel.dequeue(self.config.poll_timeout) => {
                    if let Some(event) = dequeued {
                        self.dispatch(event).await;
                    }
                }
            }
        }
    }

    async fn dispatch(&self, event: Event) {
        self.counters.events_dispatched.fetch_add(1, Ordering::Relaxed);
        self.metrics.inc_event_dispatched(&event.topic);

        match self.handlers.get(&event.topic) {
            Some(handler) => {
                if let Err(err) = handler.handle(&event).await {
                    self.metrics.inc_handler_error(&event.topic);
                    warn!(
                        topic = %event.topic,
                        event_id = event.id,
                        error = %format!("{:#}", err),
                        "Event handler failed"
                    );
                }
            }
            None => {
                debug!(
                    topic = %event.topic,
                    event_id = event.id,
                    "No handler registered for topic, discarding event"
                );
            }
        }
    }
}
