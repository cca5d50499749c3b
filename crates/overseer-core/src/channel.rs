//! Bounded FIFO event channels with proactive load shedding
//!
//! Each named channel:
//! - preserves strict FIFO order per topic
//! - never blocks a producer: `enqueue` returns `false` instead of waiting
//! - sheds its oldest entries once depth reaches the shed threshold,
//!   counting every discarded event in a per-channel dropped counter
//! - supports consumer polling via `dequeue` with a timeout

use crate::models::Event;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 1000;
const DEFAULT_SHED_THRESHOLD: f64 = 0.8;
const DEFAULT_SHED_FRACTION: f64 = 0.1;

/// Per-channel tuning
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Hard bound on queued events.
    pub capacity: usize,
    /// Fraction of capacity at which shedding kicks in.
    pub shed_threshold: f64,
    /// Fraction of capacity discarded (oldest first) per shed.
    pub shed_fraction: f64,
    /// When false the channel only refuses at full capacity and never sheds.
    pub shedding_enabled: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            shed_threshold: DEFAULT_SHED_THRESHOLD,
            shed_fraction: DEFAULT_SHED_FRACTION,
            shedding_enabled: true,
        }
    }
}

impl ChannelConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }
}

/// Observable state of one channel
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    pub topic: String,
    pub depth: usize,
    pub capacity: usize,
    pub dropped: u64,
    pub saturation: f64,
}

/// A named, capacity-bounded FIFO queue of events.
pub struct BoundedChannel {
    topic: String,
    config: ChannelConfig,
    queue: Mutex<VecDeque<Event>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl BoundedChannel {
    pub fn new(topic: impl Into<String>, config: ChannelConfig) -> Self {
        Self {
            topic: topic.into(),
            queue: Mutex::new(VecDeque::with_capacity(config.capacity.min(1024))),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            config,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Depth at which shedding triggers, at least 1.
    fn shed_threshold_depth(&self) -> usize {
        let depth = (self.config.capacity as f64 * self.config.shed_threshold).floor() as usize;
        depth.max(1)
    }

    /// Events removed per shed, at least 1.
    fn shed_batch_size(&self) -> usize {
        let batch = (self.config.capacity as f64 * self.config.shed_fraction).floor() as usize;
        batch.max(1)
    }

    /// Attempt to add an event without blocking.
    ///
    /// Returns `false` when the channel is at the shed threshold (shedding
    /// the oldest batch to recover headroom) or at full capacity. The refused
    /// event never entered the queue and is not counted as dropped.
    pub fn enqueue(&self, event: Event) -> bool {
        let mut queue = self.queue.lock().unwrap();

        if self.config.shedding_enabled && queue.len() >= self.shed_threshold_depth() {
            let batch = self.shed_batch_size().min(queue.len());
            queue.drain(..batch);
            drop(queue);
            self.dropped.fetch_add(batch as u64, Ordering::Relaxed);
            warn!(
                topic = %self.topic,
                shed = batch,
                "Channel reached shed threshold, dropped oldest events and refused enqueue"
            );
            return false;
        }

        if queue.len() >= self.config.capacity {
            drop(queue);
            debug!(topic = %self.topic, "Channel full, refusing event");
            return false;
        }

        queue.push_back(event);
        debug_assert!(queue.len() <= self.config.capacity);
        drop(queue);
        self.notify.notify_one();
        true
    }

    /// Wait up to `timeout` for the next event; `None` on expiry.
    ///
    /// An empty cycle is the normal idle case, not an error.
    pub async fn dequeue(&self, timeout: Duration) -> Option<Event> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(event) = self.queue.lock().unwrap().pop_front() {
                return Some(event);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return None;
            }
            if tokio::time::timeout(deadline - now, notified).await.is_err() {
                // Timed out waiting; one final poll covers a late enqueue.
                return self.queue.lock().unwrap().pop_front();
            }
        }
    }

    /// Discard the shed batch (oldest first) regardless of depth.
    ///
    /// Used by the adaptive controller; returns how many events were removed.
    pub fn shed_oldest(&self) -> usize {
        let mut queue = self.queue.lock().unwrap();
        let batch = self.shed_batch_size().min(queue.len());
        queue.drain(..batch);
        drop(queue);
        if batch > 0 {
            self.dropped.fetch_add(batch as u64, Ordering::Relaxed);
            warn!(topic = %self.topic, shed = batch, "Channel shed by controller");
        }
        batch
    }

    pub fn depth(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// depth / capacity, in [0, 1].
    pub fn saturation(&self) -> f64 {
        if self.config.capacity == 0 {
            return 0.0;
        }
        self.depth() as f64 / self.config.capacity as f64
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            topic: self.topic.clone(),
            depth: self.depth(),
            capacity: self.config.capacity,
            dropped: self.dropped(),
            saturation: self.saturation(),
        }
    }
}

/// The fixed set of channels, keyed by topic, built once at startup.
#[derive(Default)]
pub struct ChannelSet {
    channels: BTreeMap<String, Arc<BoundedChannel>>,
}

impl ChannelSet {
    pub fn new(specs: impl IntoIterator<Item = (String, ChannelConfig)>) -> Self {
        let channels = specs
            .into_iter()
            .map(|(topic, config)| {
                let channel = Arc::new(BoundedChannel::new(topic.clone(), config));
                (topic, channel)
            })
            .collect();
        Self { channels }
    }

    pub fn get(&self, topic: &str) -> Option<Arc<BoundedChannel>> {
        self.channels.get(topic).cloned()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.channels.contains_key(topic)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<BoundedChannel>)> {
        self.channels.iter()
    }

    pub fn topics(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Sum of per-channel dropped counters.
    pub fn total_dropped(&self) -> u64 {
        self.channels.values().map(|c| c.dropped()).sum()
    }
}
