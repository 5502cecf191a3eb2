//! Chat application layer for Huddle.
//!
//! [`ChatCore`] owns the session, the presence registry and the message
//! stream, and is the only thing that mutates them. It is synchronous: the
//! [`client`] actor feeds it transport events, user commands and timer
//! events one at a time, which gives every mutation a single writer.
//!
//! Inbound flow: transport frame -> JSON decode -> stream / registry.
//! Outbound flow: user command -> session precondition -> JSON encode ->
//! transport publish.

pub mod client;
pub mod delivery;
pub mod events;
pub mod presence;
pub mod session;
pub mod stream;
pub mod typing;

use std::time::Duration;

use tokio::sync::mpsc;

use huddle_proto::codec;
use huddle_proto::destination::Destinations;
use huddle_proto::message::{ChatMessage, MessageKind};

use crate::transport::{Transport, TransportEvent};

use delivery::{DeliveryTracker, DeliveryUpdate, SimulatedReceipts};
use events::ChatEvents;
use presence::{Participant, PresenceRegistry};
use session::{ConnectionState, MembershipState, Refused, Session};
use stream::{DeliveryStatus, MessageStream};
use typing::{TypingExpired, TypingIndicator};

/// Tunables of the chat layer.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Where outbound frames are published and which topic is subscribed.
    pub destinations: Destinations,
    /// Idle period after which the typing indicator clears.
    pub typing_timeout: Duration,
    /// Capacity of each event bus.
    pub event_capacity: usize,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            destinations: Destinations::default(),
            typing_timeout: typing::DEFAULT_TYPING_TIMEOUT,
            event_capacity: events::DEFAULT_CAPACITY,
        }
    }
}

/// Receivers for the timers a [`ChatCore`] arms. Whoever drives the core
/// must route these back into it.
#[derive(Debug)]
pub struct TimerEvents {
    pub delivery: mpsc::UnboundedReceiver<DeliveryUpdate>,
    pub typing: mpsc::UnboundedReceiver<TypingExpired>,
}

/// Read model handed to front-ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSnapshot {
    pub connection: ConnectionState,
    pub membership: MembershipState,
    pub local_identity: String,
    pub participants: Vec<Participant>,
    /// Messages in arrival order with the delivery status of own lines.
    pub messages: Vec<(ChatMessage, Option<DeliveryStatus>)>,
    pub typing: bool,
}

impl ChatSnapshot {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.membership == MembershipState::Joined
    }
}

/// Single owner of all chat state.
pub struct ChatCore<T, D = SimulatedReceipts> {
    transport: T,
    tracker: D,
    destinations: Destinations,
    session: Session,
    presence: PresenceRegistry,
    stream: MessageStream,
    typing: TypingIndicator,
    events: ChatEvents,
    delivery_tx: mpsc::UnboundedSender<DeliveryUpdate>,
    typing_tx: mpsc::UnboundedSender<TypingExpired>,
    /// `Connection(false)` reports still queued for disconnects this core
    /// already applied.
    pending_disconnects: usize,
}

impl<T: Transport, D: DeliveryTracker> ChatCore<T, D> {
    /// Creates a core in (Disconnected, NotJoined). Nothing is started until
    /// [`ChatCore::connect`].
    #[must_use]
    pub fn new(transport: T, tracker: D, options: ChatOptions) -> (Self, TimerEvents) {
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let (typing_tx, typing_rx) = mpsc::unbounded_channel();
        let core = Self {
            transport,
            tracker,
            destinations: options.destinations,
            session: Session::new(),
            presence: PresenceRegistry::new(),
            stream: MessageStream::new(),
            typing: TypingIndicator::new(options.typing_timeout),
            events: ChatEvents::new(options.event_capacity),
            delivery_tx,
            typing_tx,
            pending_disconnects: 0,
        };
        let timers = TimerEvents {
            delivery: delivery_rx,
            typing: typing_rx,
        };
        (core, timers)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub const fn session(&self) -> &Session {
        &self.session
    }

    pub const fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub const fn stream(&self) -> &MessageStream {
        &self.stream
    }

    pub const fn events(&self) -> &ChatEvents {
        &self.events
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    #[must_use]
    pub const fn is_typing(&self) -> bool {
        self.typing.is_typing()
    }

    #[must_use]
    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            connection: self.session.connection(),
            membership: self.session.membership(),
            local_identity: self.session.local_identity().to_string(),
            participants: self.presence.iter().cloned().collect(),
            messages: self
                .stream
                .entries()
                .map(|(m, status)| (m.clone(), status))
                .collect(),
            typing: self.typing.is_typing(),
        }
    }

    // -----------------------------------------------------------------------
    // Connection
    // -----------------------------------------------------------------------

    /// Asks the transport to connect. Completion arrives as a transport event.
    pub fn connect(&mut self) {
        let before = self.session.connection();
        self.session.connecting();
        if self.session.connection() != before {
            self.events.connection.publish(self.session.connection());
        }
        self.transport.connect();
    }

    /// Asks the transport to disconnect. The session counts as disconnected
    /// right away, so a reconnect requested next starts from `Connecting`.
    pub fn disconnect(&mut self) {
        self.transport.disconnect();
        self.pending_disconnects += 1;
        self.on_connection(false);
    }

    /// Tears down on application exit. Only a joined session disconnects
    /// explicitly; the transport closes itself when dropped.
    pub fn shutdown(&mut self) {
        if self.session.is_joined() {
            tracing::info!(identity = self.session.local_identity(), "disconnecting on shutdown");
            self.transport.disconnect();
        }
        self.typing.stop();
        self.tracker.reset();
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Applies one transport event.
    pub fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connection(false) if self.pending_disconnects > 0 => {
                self.pending_disconnects -= 1;
                tracing::debug!("disconnect already applied");
            }
            TransportEvent::Connection(connected) => {
                if connected {
                    self.pending_disconnects = 0;
                }
                self.on_connection(connected);
            }
            TransportEvent::Broadcast(body) => match codec::decode(&body) {
                Ok(message) => self.apply(message),
                Err(e) => tracing::warn!(err = %e, "dropping undecodable broadcast frame"),
            },
        }
    }

    fn on_connection(&mut self, connected: bool) {
        let before = self.session.connection();
        self.session.connection_changed(connected);
        let now = self.session.connection();
        if now != before {
            tracing::info!(state = %now, joined = self.session.is_joined(), "connection state changed");
            self.events.connection.publish(now);
        }
        if !connected && !self.presence.is_empty() {
            self.presence.clear();
            self.publish_presence();
        }
    }

    /// Applies one decoded broadcast frame.
    pub fn apply(&mut self, message: ChatMessage) {
        tracing::debug!(kind = %message.kind, sender = %message.sender, "broadcast frame");
        match message.kind {
            MessageKind::Chat => {
                if message.is_from(self.session.local_identity())
                    && self.stream.mark_sending(&message.timestamp)
                {
                    self.tracker.track(&message.timestamp, &self.delivery_tx);
                    self.events.delivery.publish(DeliveryUpdate {
                        timestamp: message.timestamp.clone(),
                        status: DeliveryStatus::Sending,
                    });
                }
            }
            MessageKind::Join => {
                if self.presence.add(&message.sender) {
                    self.publish_presence();
                }
            }
            MessageKind::Leave => {
                if self.presence.remove(&message.sender) {
                    self.publish_presence();
                }
            }
            MessageKind::RosterSnapshot => {
                let roster = message.roster.unwrap_or_default();
                if self
                    .presence
                    .replace_from_snapshot(&roster, self.session.local_identity())
                {
                    self.publish_presence();
                }
                return;
            }
        }

        self.stream.append(message.clone());
        self.events.messages.publish(message);
    }

    // -----------------------------------------------------------------------
    // User actions
    // -----------------------------------------------------------------------

    /// Announces the local user as `identity`.
    pub fn join(&mut self, identity: &str) {
        let identity = match self.session.can_join(identity) {
            Ok(identity) => identity.to_string(),
            Err(reason) => return refuse("join", &reason),
        };

        self.session.joined(&identity);
        tracing::info!(identity = %identity, "joined chat");

        self.publish(&self.destinations.add_user, &ChatMessage::join(&identity));
        self.publish(
            &self.destinations.users,
            &ChatMessage::roster_request(&identity),
        );
        if self.presence.add(&identity) {
            self.publish_presence();
        }
    }

    /// Publishes a chat line. The content is sent as typed, untrimmed.
    pub fn send(&mut self, content: &str) {
        if let Err(reason) = self.session.can_send(content) {
            return refuse("send", &reason);
        }
        if self.typing.stop() {
            self.events.typing.publish(false);
        }
        let message = ChatMessage::chat(self.session.local_identity(), content);
        self.publish(&self.destinations.chat, &message);
    }

    /// Leaves the chat, discards history and cycles the connection.
    pub fn leave(&mut self) {
        let identity = match self.session.leave() {
            Ok(identity) => identity,
            Err(reason) => return refuse("leave", &reason),
        };
        tracing::info!(identity = %identity, "leaving chat");

        self.publish(&self.destinations.remove_user, &ChatMessage::leave(&identity));
        if self.presence.remove(&identity) {
            self.publish_presence();
        }
        self.stream.reset();
        self.tracker.reset();
        if self.typing.stop() {
            self.events.typing.publish(false);
        }

        self.disconnect();
        self.connect();
    }

    /// The local user pressed a key in the message input.
    pub fn keystroke(&mut self) {
        if !self.session.is_joined() {
            return refuse("keystroke", &Refused::NotJoined);
        }
        if self.typing.keystroke(&self.typing_tx) {
            self.events.typing.publish(true);
        }
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    pub fn on_delivery(&mut self, update: DeliveryUpdate) {
        let changed = match update.status {
            DeliveryStatus::Sending => false,
            DeliveryStatus::Sent => self.stream.mark_sent(&update.timestamp),
            DeliveryStatus::Seen => self.stream.mark_seen(&update.timestamp),
        };
        if changed {
            self.events.delivery.publish(update);
        }
    }

    pub fn on_typing_expired(&mut self, event: TypingExpired) {
        if self.typing.expire(event) {
            self.events.typing.publish(false);
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn publish(&self, destination: &str, message: &ChatMessage) {
        match codec::encode(message) {
            Ok(payload) => self.transport.publish(destination, &payload),
            Err(e) => tracing::warn!(err = %e, destination, "failed to encode outbound frame"),
        }
    }

    fn publish_presence(&self) {
        self.events
            .presence
            .publish(self.presence.iter().cloned().collect());
    }
}

fn refuse(action: &str, reason: &Refused) {
    tracing::debug!(action, %reason, "action refused");
}
