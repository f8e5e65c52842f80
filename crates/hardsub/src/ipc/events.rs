//! Queue Event Module
//!
//! Events the queue publishes for the UI, and the sinks that carry them.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use crate::core::ffmpeg::{BurnProgress, LogCategory};
use crate::core::queue::QueueItem;
use crate::core::JobId;

// =============================================================================
// Event Types
// =============================================================================

/// Event names used for frontend communication
pub mod event_names {
    /// Full queue snapshot
    pub const QUEUE_UPDATED: &str = "queue:updated";
    /// Single job changed
    pub const ITEM_UPDATED: &str = "queue:item-updated";
    /// Job progress
    pub const ITEM_PROGRESS: &str = "queue:item-progress";
    /// Job log line
    pub const ITEM_LOG: &str = "queue:item-log";
    /// Job finished successfully
    pub const ITEM_COMPLETED: &str = "queue:item-completed";
    /// Job failed
    pub const ITEM_ERROR: &str = "queue:item-error";
    /// No pending jobs left
    pub const QUEUE_COMPLETED: &str = "queue:completed";

    /// Single-burn progress
    pub const FFMPEG_PROGRESS: &str = "ffmpeg:progress";
    /// Single-burn log line
    pub const FFMPEG_LOG: &str = "ffmpeg:log";
    /// Single-burn completion
    pub const FFMPEG_COMPLETE: &str = "ffmpeg:complete";
    /// Single-burn failure
    pub const FFMPEG_ERROR: &str = "ffmpeg:error";
}

/// Event published by the queue processor
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum QueueEvent {
    QueueUpdated {
        items: Vec<QueueItem>,
    },
    ItemUpdated {
        item: QueueItem,
    },
    #[serde(rename_all = "camelCase")]
    ItemProgress {
        job_id: JobId,
        progress: BurnProgress,
    },
    #[serde(rename_all = "camelCase")]
    ItemLog {
        job_id: JobId,
        line: String,
        category: LogCategory,
    },
    #[serde(rename_all = "camelCase")]
    ItemCompleted {
        job_id: JobId,
        output_path: PathBuf,
    },
    #[serde(rename_all = "camelCase")]
    ItemError {
        job_id: JobId,
        message: String,
    },
    QueueCompleted,
}

impl QueueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::QueueUpdated { .. } => event_names::QUEUE_UPDATED,
            Self::ItemUpdated { .. } => event_names::ITEM_UPDATED,
            Self::ItemProgress { .. } => event_names::ITEM_PROGRESS,
            Self::ItemLog { .. } => event_names::ITEM_LOG,
            Self::ItemCompleted { .. } => event_names::ITEM_COMPLETED,
            Self::ItemError { .. } => event_names::ITEM_ERROR,
            Self::QueueCompleted => event_names::QUEUE_COMPLETED,
        }
    }
}

// =============================================================================
// Event Sinks
// =============================================================================

/// Destination for queue events.
///
/// `emit` is called from the processor's task and must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: QueueEvent);
}

/// Fans events out to any number of subscribers. Slow subscribers lag and
/// lose the oldest events rather than stalling the queue.
pub struct BroadcastEventSink {
    tx: broadcast::Sender<QueueEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: QueueEvent) {
        trace!(event = event.name(), "Broadcasting queue event");
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

/// Delivers every event, in order, to a single consumer
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<QueueEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QueueEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: QueueEvent) {
        let _ = self.tx.send(event);
    }
}

/// Discards events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: QueueEvent) {}
}
