//! Ordered message log plus local delivery status of self-authored lines.

use std::collections::HashMap;

use huddle_proto::message::{ChatMessage, Timestamp};

/// Local delivery status of a self-authored message.
///
/// Ordered so that a status can only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Seen,
}

impl DeliveryStatus {
    /// Marker shown next to own messages.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Sending => "…",
            Self::Sent => "✓",
            Self::Seen => "✓✓",
        }
    }
}

/// Append-only projection of the broadcast topic for this session.
///
/// Messages are kept in arrival order with no reordering and no
/// deduplication: a repeated delivery shows up twice.
#[derive(Debug, Clone, Default)]
pub struct MessageStream {
    messages: Vec<ChatMessage>,
    statuses: HashMap<Timestamp, DeliveryStatus>,
}

impl MessageStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Starts tracking `timestamp` as `Sending`. Returns `false` if it was
    /// already tracked.
    pub fn mark_sending(&mut self, timestamp: &Timestamp) -> bool {
        if self.statuses.contains_key(timestamp) {
            return false;
        }
        self.statuses.insert(timestamp.clone(), DeliveryStatus::Sending);
        true
    }

    pub fn mark_sent(&mut self, timestamp: &Timestamp) -> bool {
        self.advance(timestamp, DeliveryStatus::Sent)
    }

    pub fn mark_seen(&mut self, timestamp: &Timestamp) -> bool {
        self.advance(timestamp, DeliveryStatus::Seen)
    }

    /// Moves a tracked entry forward to `status`. Untracked timestamps and
    /// backward moves are ignored, so a timer that outlives a reset is
    /// harmless.
    fn advance(&mut self, timestamp: &Timestamp, status: DeliveryStatus) -> bool {
        match self.statuses.get_mut(timestamp) {
            Some(current) if *current < status => {
                *current = status;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn status(&self, timestamp: &Timestamp) -> Option<DeliveryStatus> {
        self.statuses.get(timestamp).copied()
    }

    /// Empties both the log and the status table.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.statuses.clear();
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages paired with their delivery status, in log order.
    pub fn entries(&self) -> impl Iterator<Item = (&ChatMessage, Option<DeliveryStatus>)> {
        self.messages
            .iter()
            .map(|m| (m, self.statuses.get(&m.timestamp).copied()))
    }
}
