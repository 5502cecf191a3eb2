//! Per-category event buses observed by front-ends.
//!
//! Each bus is a `tokio::sync::broadcast` channel. Subscribing returns a
//! receiver; dropping the receiver unsubscribes. A slow subscriber that
//! falls more than `capacity` events behind gets `RecvError::Lagged` and
//! should resync from the latest [`ChatSnapshot`](super::ChatSnapshot).

use tokio::sync::broadcast;

use huddle_proto::message::ChatMessage;

use super::delivery::DeliveryUpdate;
use super::presence::Participant;
use super::session::ConnectionState;

/// Default capacity of every bus.
pub const DEFAULT_CAPACITY: usize = 256;

/// Thin wrapper around a `broadcast::Sender<T>`.
#[derive(Debug, Clone)]
pub struct EventBus<T> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone> EventBus<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Returns the number of active receivers.
    pub fn publish(&self, event: T) -> usize {
        // Err only means nobody is listening.
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// All buses a chat client publishes on.
#[derive(Debug, Clone)]
pub struct ChatEvents {
    /// Connection state after every change.
    pub connection: EventBus<ConnectionState>,
    /// Every message appended to the stream, in arrival order.
    pub messages: EventBus<ChatMessage>,
    /// Full participant list after every registry change.
    pub presence: EventBus<Vec<Participant>>,
    /// Delivery status changes of own messages.
    pub delivery: EventBus<DeliveryUpdate>,
    /// Local typing indicator turning on or off.
    pub typing: EventBus<bool>,
}

impl ChatEvents {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            connection: EventBus::new(capacity),
            messages: EventBus::new(capacity),
            presence: EventBus::new(capacity),
            delivery: EventBus::new(capacity),
            typing: EventBus::new(capacity),
        }
    }
}

impl Default for ChatEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
