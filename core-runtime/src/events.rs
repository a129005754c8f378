//! # Event Bus System
//!
//! Broadcasts typed core events over `tokio::sync::broadcast` so host UI
//! layers (offline banner, "pending uploads" badge) and diagnostics can react
//! without holding a reference to the component that produced them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   emit    ┌───────────┐   subscribe   ┌────────────┐
//! │ ConnectivityMon. ├──────────>│           ├──────────────>│ UI banner  │
//! └──────────────────┘           │ EventBus  │               └────────────┘
//! ┌──────────────────┐   emit    │ (broadcast│   subscribe   ┌────────────┐
//! │ OfflineWrapper   ├──────────>│  channel) ├──────────────>│ Telemetry  │
//! └──────────────────┘           └───────────┘               └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, NetworkEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus.emit(CoreEvent::Network(NetworkEvent::WentOffline)).ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event, CoreEvent::Network(NetworkEvent::WentOffline));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell behind by `n` events.
//!   Non-fatal; keep receiving.
//! - **`RecvError::Closed`**: all senders dropped. Treat as shutdown.
//!
//! Emitting with no subscribers returns an error; producers ignore it with
//! `.ok()` since nobody listening is a normal state.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Connectivity transitions
    Network(NetworkEvent),
    /// Offline queue lifecycle
    Queue(QueueEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Network(e) => e.description(),
            CoreEvent::Queue(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Queue(QueueEvent::OperationDeadLettered { .. }) => EventSeverity::Error,
            CoreEvent::Queue(QueueEvent::OperationDropped { .. }) => EventSeverity::Warning,
            CoreEvent::Network(NetworkEvent::WentOffline) => EventSeverity::Warning,
            CoreEvent::Network(NetworkEvent::WentOnline) => EventSeverity::Info,
            CoreEvent::Queue(QueueEvent::DrainFinished { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Network Events
// ============================================================================

/// Connectivity transitions observed by the connectivity monitor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum NetworkEvent {
    /// The device regained connectivity.
    WentOnline,
    /// The device lost connectivity.
    WentOffline,
}

impl NetworkEvent {
    fn description(&self) -> &str {
        match self {
            NetworkEvent::WentOnline => "Connectivity restored",
            NetworkEvent::WentOffline => "Connectivity lost",
        }
    }
}

// ============================================================================
// Queue Events
// ============================================================================

/// Events emitted by the offline operation queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    /// An operation was deferred.
    OperationQueued {
        /// Caller-supplied de-duplication key.
        key: String,
        /// Whether the operation must eventually succeed.
        required: bool,
        /// Whether an older operation with the same key was replaced.
        replaced: bool,
        /// Queue length after the insert.
        pending: usize,
    },
    /// A queued operation succeeded during a drain.
    OperationCompleted {
        key: String,
    },
    /// An optional operation failed during a drain and was discarded.
    OperationDropped {
        key: String,
        /// Failure message from the operation.
        message: String,
    },
    /// A required operation ran out of attempts and was discarded.
    OperationDeadLettered {
        key: String,
        /// Failed attempts made.
        attempts: u32,
        /// Failure message from the last attempt.
        message: String,
    },
    /// A drain pass started.
    DrainStarted {
        pending: usize,
    },
    /// A drain pass finished (queue empty or connectivity lost).
    DrainFinished {
        /// Operations still queued.
        remaining: usize,
        /// Operations that succeeded during this pass.
        completed: usize,
    },
    /// The queue was cleared by the host.
    QueueCleared {
        removed: usize,
    },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::OperationQueued { .. } => "Operation queued for later",
            QueueEvent::OperationCompleted { .. } => "Queued operation completed",
            QueueEvent::OperationDropped { .. } => "Optional operation dropped",
            QueueEvent::OperationDeadLettered { .. } => "Required operation gave up",
            QueueEvent::DrainStarted { .. } => "Draining pending operations",
            QueueEvent::DrainFinished { .. } => "Drain finished",
            QueueEvent::QueueCleared { .. } => "Pending operations cleared",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for core events.
///
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers that fall behind by more than `capacity` events receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let queue_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Queue(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
