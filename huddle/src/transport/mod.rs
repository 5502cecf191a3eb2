//! Transport layer abstraction for `Huddle`.
//!
//! Defines the [`Transport`] trait that every publish/subscribe connection
//! must satisfy. Concrete implementations:
//! - [`stomp::StompTransport`] STOMP over WebSocket with fixed-delay reconnect
//! - [`loopback::LoopbackTransport`] in-process scripted transport for testing
//!
//! A transport never returns errors to its caller. Everything it has to say
//! arrives as [`TransportEvent`]s on the channel it was created with, in the
//! order the underlying connection produced them.

pub mod loopback;
pub mod stomp;

use tokio::sync::mpsc;

/// Events emitted by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection state changed.
    ///
    /// `false` covers handshake failures, unexpected drops and explicit
    /// disconnects alike; callers never need to tell them apart.
    Connection(bool),
    /// Body of one frame delivered on the broadcast topic.
    Broadcast(String),
}

/// Sending half of the transport event channel.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving half of the transport event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Creates the channel a transport reports through.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// A single publish/subscribe connection.
///
/// All methods return immediately; completion is observed through the
/// event channel.
///
/// # Invariant
///
/// At most one underlying connection exists at a time. Calling
/// [`Transport::connect`] while connecting or connected does nothing.
pub trait Transport: Send + 'static {
    /// Starts connecting, then subscribes to the broadcast topic once the
    /// handshake succeeds. Reconnects after a fixed delay if the
    /// connection later drops.
    fn connect(&self);

    /// Tears the connection down, cancels any pending retry and reports
    /// `Connection(false)` exactly once, ahead of any event from a later
    /// `connect`.
    fn disconnect(&self);

    /// Publishes `payload` to `destination`.
    ///
    /// Fire-and-forget: silently dropped while not connected, never queued.
    fn publish(&self, destination: &str, payload: &str);

    /// Whether the handshake has completed and the connection is up.
    fn is_connected(&self) -> bool;
}
