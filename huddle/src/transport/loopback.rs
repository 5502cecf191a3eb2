//! Loopback transport for testing.
//!
//! [`LoopbackTransport`] never touches the network. Its paired
//! [`LoopbackController`] plays the broker: it decides when a connection
//! attempt succeeds, drops live connections, injects broadcast frames and
//! records everything the client published.

use std::sync::Arc;

use parking_lot::Mutex;

use huddle_proto::codec;
use huddle_proto::message::ChatMessage;

use super::{EventSender, Transport, TransportEvent};

#[derive(Debug)]
struct LoopbackState {
    events: EventSender,
    auto_connect: bool,
    connecting: bool,
    connected: bool,
    published: Vec<(String, String)>,
    dropped_publishes: usize,
    connect_calls: usize,
    disconnect_calls: usize,
}

impl LoopbackState {
    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }
}

/// In-process transport driven by a [`LoopbackController`].
#[derive(Debug)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
}

/// Scripting handle for a [`LoopbackTransport`].
#[derive(Debug, Clone)]
pub struct LoopbackController {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    /// Creates a transport that completes every connection attempt
    /// immediately, plus its controller.
    #[must_use]
    pub fn new(events: EventSender) -> (Self, LoopbackController) {
        let state = Arc::new(Mutex::new(LoopbackState {
            events,
            auto_connect: true,
            connecting: false,
            connected: false,
            published: Vec::new(),
            dropped_publishes: 0,
            connect_calls: 0,
            disconnect_calls: 0,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            LoopbackController { state },
        )
    }

    /// Creates a transport whose connection attempts stay pending until
    /// [`LoopbackController::accept`] is called.
    #[must_use]
    pub fn manual(events: EventSender) -> (Self, LoopbackController) {
        let (transport, controller) = Self::new(events);
        controller.set_auto_connect(false);
        (transport, controller)
    }
}

impl Transport for LoopbackTransport {
    fn connect(&self) {
        let mut state = self.state.lock();
        state.connect_calls += 1;
        if state.connected || state.connecting {
            return;
        }
        if state.auto_connect {
            state.connected = true;
            state.emit(TransportEvent::Connection(true));
        } else {
            state.connecting = true;
        }
    }

    fn disconnect(&self) {
        let mut state = self.state.lock();
        state.disconnect_calls += 1;
        state.connected = false;
        state.connecting = false;
        state.emit(TransportEvent::Connection(false));
    }

    fn publish(&self, destination: &str, payload: &str) {
        let mut state = self.state.lock();
        if state.connected {
            state
                .published
                .push((destination.to_string(), payload.to_string()));
        } else {
            state.dropped_publishes += 1;
        }
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }
}

impl LoopbackController {
    /// Whether new connection attempts complete on their own.
    pub fn set_auto_connect(&self, enabled: bool) {
        self.state.lock().auto_connect = enabled;
    }

    /// Completes a pending connection attempt. Returns `false` if none was
    /// pending.
    pub fn accept(&self) -> bool {
        let mut state = self.state.lock();
        if !state.connecting {
            return false;
        }
        state.connecting = false;
        state.connected = true;
        state.emit(TransportEvent::Connection(true));
        true
    }

    /// Simulates the broker dropping a live connection. The transport goes
    /// back to a pending attempt, as a real one would while waiting to retry.
    pub fn drop_connection(&self) -> bool {
        let mut state = self.state.lock();
        if !state.connected {
            return false;
        }
        state.connected = false;
        state.connecting = true;
        state.emit(TransportEvent::Connection(false));
        true
    }

    /// Delivers `message` on the broadcast topic.
    pub fn deliver(&self, message: &ChatMessage) {
        match codec::encode(message) {
            Ok(body) => self.deliver_raw(body),
            Err(e) => tracing::warn!(err = %e, "loopback could not encode message"),
        }
    }

    /// Delivers an arbitrary frame body on the broadcast topic.
    pub fn deliver_raw(&self, body: impl Into<String>) {
        self.state.lock().emit(TransportEvent::Broadcast(body.into()));
    }

    /// Everything published while connected, as `(destination, payload)`.
    #[must_use]
    pub fn published(&self) -> Vec<(String, String)> {
        self.state.lock().published.clone()
    }

    /// Decoded messages published to `destination`.
    #[must_use]
    pub fn published_to(&self, destination: &str) -> Vec<ChatMessage> {
        self.state
            .lock()
            .published
            .iter()
            .filter(|(dest, _)| dest == destination)
            .filter_map(|(_, body)| codec::decode(body).ok())
            .collect()
    }

    /// Forgets all recorded publishes.
    pub fn clear_published(&self) {
        self.state.lock().published.clear();
    }

    /// Publishes that arrived while not connected.
    #[must_use]
    pub fn dropped_publishes(&self) -> usize {
        self.state.lock().dropped_publishes
    }

    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.state.lock().connect_calls
    }

    #[must_use]
    pub fn disconnect_calls(&self) -> usize {
        self.state.lock().disconnect_calls
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }
}
