//! Actor metrics and mailbox monitoring.
//!
//! Mailbox depth thresholds:
//!
//! | Actor Type | Normal | Warning | Critical |
//! |------------|--------|---------|----------|
//! | Registry   | < 200  | 200-800 | > 800    |
//! | Endpoint   | < 20   | 20-50   | > 50     |
//!
//! All values are plain atomics read by the status endpoint; there is no
//! exporter. Threshold crossings are reported through `tracing`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mailbox depth thresholds for the registry actor.
pub const REGISTRY_MAILBOX_NORMAL: usize = 200;
pub const REGISTRY_MAILBOX_WARNING: usize = 800;

/// Mailbox depth thresholds for endpoint notice mailboxes.
pub const ENDPOINT_MAILBOX_NORMAL: usize = 20;
pub const ENDPOINT_MAILBOX_WARNING: usize = 50;

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// The registry actor (singleton).
    Registry,
    /// An endpoint connection task (one per client).
    Endpoint,
}

impl ActorType {
    /// Returns the actor type as a string for log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Registry => "registry",
            ActorType::Endpoint => "endpoint",
        }
    }

    /// Returns the warning threshold for this actor type.
    #[must_use]
    pub const fn warning_threshold(&self) -> usize {
        match self {
            ActorType::Registry => REGISTRY_MAILBOX_WARNING,
            ActorType::Endpoint => ENDPOINT_MAILBOX_WARNING,
        }
    }

    /// Returns the normal threshold for this actor type.
    #[must_use]
    pub const fn normal_threshold(&self) -> usize {
        match self {
            ActorType::Registry => REGISTRY_MAILBOX_NORMAL,
            ActorType::Endpoint => ENDPOINT_MAILBOX_NORMAL,
        }
    }
}

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// Below normal threshold.
    Normal,
    /// Between normal and warning thresholds.
    Warning,
    /// Above warning threshold.
    Critical,
}

/// Mailbox monitor for tracking queue depth.
#[derive(Debug)]
pub struct MailboxMonitor {
    /// Actor type for labeling.
    actor_type: ActorType,
    /// Actor identifier (instance id, nick, etc.).
    actor_id: String,
    /// Current mailbox depth.
    depth: AtomicUsize,
    /// Peak mailbox depth since last reset.
    peak_depth: AtomicUsize,
    /// Total messages processed.
    messages_processed: AtomicU64,
    /// Messages dropped due to a full mailbox.
    messages_dropped: AtomicU64,
}

impl MailboxMonitor {
    /// Create a new mailbox monitor for the given actor.
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    /// Record a message being added to the mailbox.
    pub fn record_enqueue(&self) {
        let new_depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;

        let mut current_peak = self.peak_depth.load(Ordering::Relaxed);
        while new_depth > current_peak {
            match self.peak_depth.compare_exchange_weak(
                current_peak,
                new_depth,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current_peak = actual,
            }
        }

        let level = self.level_for_depth(new_depth);
        if level == MailboxLevel::Critical {
            warn!(
                target: "sb.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = new_depth,
                threshold = self.actor_type.warning_threshold(),
                "Mailbox depth critical"
            );
        } else if level == MailboxLevel::Warning && new_depth == self.actor_type.normal_threshold()
        {
            // Log once when crossing the warning threshold
            debug!(
                target: "sb.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = new_depth,
                "Mailbox depth elevated"
            );
        }
    }

    /// Record a message being removed from the mailbox (processed).
    pub fn record_dequeue(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message being dropped because the mailbox was full.
    pub fn record_drop(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
        warn!(
            target: "sb.actor.mailbox",
            actor_type = self.actor_type.as_str(),
            actor_id = %self.actor_id,
            dropped = self.messages_dropped.load(Ordering::Relaxed),
            "Message dropped due to full mailbox"
        );
    }

    /// Get the current mailbox depth.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Get the peak mailbox depth.
    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    /// Get total messages processed.
    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    /// Get total messages dropped.
    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    /// Get the current mailbox level.
    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.actor_type.warning_threshold() {
            MailboxLevel::Critical
        } else if depth > self.actor_type.normal_threshold() {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Aggregated counters for the registry.
///
/// Shared between the registry actor (which updates values) and the status
/// query path (which reads them). All fields are atomic for lock-free
/// concurrent access.
#[derive(Debug, Default)]
pub struct RegistryMetrics {
    /// Endpoints currently registered in the online directory.
    online_endpoints: AtomicUsize,
    /// Active 1:1 conversations.
    active_conversations: AtomicUsize,
    /// Active channels.
    active_channels: AtomicUsize,
    /// Total signaling frames routed to a peer mailbox.
    signals_routed: AtomicU64,
    /// Signaling frames dropped because the recipient mailbox was full
    /// or the recipient was unknown.
    signals_dropped: AtomicU64,
}

impl RegistryMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Increment the registered-endpoint count.
    pub fn endpoint_registered(&self) {
        self.online_endpoints.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement the registered-endpoint count.
    pub fn endpoint_unregistered(&self) {
        self.online_endpoints.fetch_sub(1, Ordering::Relaxed);
    }

    /// Increment the active conversation count.
    pub fn conversation_created(&self) {
        self.active_conversations.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement the active conversation count.
    pub fn conversation_destroyed(&self) {
        self.active_conversations.fetch_sub(1, Ordering::Relaxed);
    }

    /// Increment the active channel count.
    pub fn channel_created(&self) {
        self.active_channels.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement the active channel count.
    pub fn channel_destroyed(&self) {
        self.active_channels.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a signaling frame delivered to a peer mailbox.
    pub fn record_signal_routed(&self) {
        self.signals_routed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a signaling frame that could not be delivered.
    pub fn record_signal_dropped(&self) {
        self.signals_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the registered-endpoint count.
    #[must_use]
    pub fn online_endpoints(&self) -> usize {
        self.online_endpoints.load(Ordering::Relaxed)
    }

    /// Get the active conversation count.
    #[must_use]
    pub fn conversations(&self) -> usize {
        self.active_conversations.load(Ordering::Relaxed)
    }

    /// Get the active channel count.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.active_channels.load(Ordering::Relaxed)
    }

    /// Get the total routed-signal count.
    #[must_use]
    pub fn signals_routed(&self) -> u64 {
        self.signals_routed.load(Ordering::Relaxed)
    }

    /// Get the total dropped-signal count.
    #[must_use]
    pub fn signals_dropped(&self) -> u64 {
        self.signals_dropped.load(Ordering::Relaxed)
    }
}
