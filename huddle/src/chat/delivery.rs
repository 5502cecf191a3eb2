//! Delivery tracking for self-authored messages.
//!
//! The broker gives no acknowledgement, so [`SimulatedReceipts`] fakes one:
//! a message is reported `Sent` a fixed delay after it shows up in the
//! stream and `Seen` a further fixed delay later. A real acknowledgement
//! protocol can replace it by implementing [`DeliveryTracker`].

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use huddle_proto::message::Timestamp;

use super::stream::DeliveryStatus;

/// A status change reported by a tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryUpdate {
    pub timestamp: Timestamp,
    pub status: DeliveryStatus,
}

/// Produces delivery updates for messages the local user authored.
pub trait DeliveryTracker: Send + 'static {
    /// Starts tracking the message with `timestamp`. Updates are sent to
    /// `updates` as they happen.
    fn track(&mut self, timestamp: &Timestamp, updates: &mpsc::UnboundedSender<DeliveryUpdate>);

    /// Stops reporting on everything tracked so far.
    fn reset(&mut self);
}

/// Default delay before a message is reported `Sent`.
pub const DEFAULT_SENT_AFTER: Duration = Duration::from_millis(500);

/// Default delay between `Sent` and `Seen`.
pub const DEFAULT_SEEN_AFTER: Duration = Duration::from_millis(1500);

/// Timer-driven stand-in for read receipts.
#[derive(Debug)]
pub struct SimulatedReceipts {
    sent_after: Duration,
    seen_after: Duration,
    timers: Vec<JoinHandle<()>>,
}

impl SimulatedReceipts {
    #[must_use]
    pub const fn new(sent_after: Duration, seen_after: Duration) -> Self {
        Self {
            sent_after,
            seen_after,
            timers: Vec::new(),
        }
    }

    /// Number of timers that have not finished yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.timers.iter().filter(|t| !t.is_finished()).count()
    }
}

impl Default for SimulatedReceipts {
    fn default() -> Self {
        Self::new(DEFAULT_SENT_AFTER, DEFAULT_SEEN_AFTER)
    }
}

impl DeliveryTracker for SimulatedReceipts {
    fn track(&mut self, timestamp: &Timestamp, updates: &mpsc::UnboundedSender<DeliveryUpdate>) {
        self.timers.retain(|t| !t.is_finished());

        let timestamp = timestamp.clone();
        let updates = updates.clone();
        let (sent_after, seen_after) = (self.sent_after, self.seen_after);
        self.timers.push(tokio::spawn(async move {
            tokio::time::sleep(sent_after).await;
            let sent = DeliveryUpdate {
                timestamp: timestamp.clone(),
                status: DeliveryStatus::Sent,
            };
            if updates.send(sent).is_err() {
                return;
            }
            tokio::time::sleep(seen_after).await;
            let _ = updates.send(DeliveryUpdate {
                timestamp,
                status: DeliveryStatus::Seen,
            });
        }));
    }

    fn reset(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}

impl Drop for SimulatedReceipts {
    fn drop(&mut self) {
        self.reset();
    }
}
