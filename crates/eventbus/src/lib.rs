//! Broadcast event bus for execution and node lifecycle events.
//!
//! Uses [`tokio::sync::broadcast`] for fan-out delivery to multiple
//! subscribers. Events are fire-and-forget projections of engine state, not
//! the source of truth — subscribers may observe but never mutate engine
//! state through them, and a subscriber with no listener attached simply
//! drops what it emits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use nebula_core::id::{ExecutionId, NodeId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Severity of a [`Event::Feedback`] message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackKind {
    Info,
    Warning,
    Error,
}

/// An event emitted by the engine as an execution progresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// An execution has started.
    ExecutionStarted { execution_id: ExecutionId },
    /// An execution has completed successfully.
    ExecutionCompleted {
        execution_id: ExecutionId,
        duration: Duration,
    },
    /// An execution failed.
    ExecutionFailed {
        execution_id: ExecutionId,
        error: String,
    },
    /// An execution was cancelled.
    ExecutionCancelled { execution_id: ExecutionId },
    /// A node body started running.
    NodeStarted {
        execution_id: ExecutionId,
        node_id: NodeId,
        generation: u64,
    },
    /// A node body completed successfully.
    NodeCompleted {
        execution_id: ExecutionId,
        node_id: NodeId,
        duration: Duration,
    },
    /// A node body failed.
    NodeFailed {
        execution_id: ExecutionId,
        node_id: NodeId,
        error: String,
    },
    /// A node body streamed one item on a data output.
    Streamed {
        execution_id: ExecutionId,
        node_id: NodeId,
        socket: String,
    },
    /// Observational feedback from a node body, via `ExecContext::emit_feedback`.
    /// Errors surfaced during a run are additionally published here as
    /// `Feedback { kind: Error, .. }`, alongside the run's return value.
    Feedback {
        execution_id: ExecutionId,
        node_id: NodeId,
        kind: FeedbackKind,
        message: String,
    },
}

/// Broadcast-based event bus.
///
/// Delivers events to every active subscriber. With no subscribers
/// listening, events are silently dropped.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    emitted: AtomicU64,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity. When the
    /// channel is full the oldest events are dropped; a lagging subscriber
    /// sees its next `recv` skip ahead.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            emitted: AtomicU64::new(0),
        }
    }

    /// Publish an event to all subscribers.
    pub fn emit(&self, event: Event) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(event);
    }

    /// Subscribe to future events.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Total number of events emitted since creation.
    #[must_use]
    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Number of currently active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// A subscription handle returned by [`EventBus::subscribe`]. Dropping it
/// unsubscribes.
pub struct EventSubscriber {
    receiver: broadcast::Receiver<Event>,
}

impl EventSubscriber {
    /// Wait for the next event. Returns `None` once the bus has been
    /// dropped. Skips past lag gaps rather than surfacing them.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive; `None` if nothing is queued right now.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
