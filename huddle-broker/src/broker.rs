//! Broker core: shared state, WebSocket handler, session registry and
//! destination routing.
//!
//! Each WebSocket connection is one STOMP session. After the `CONNECT` /
//! `CONNECTED` handshake a session may subscribe to the broadcast topic and
//! `SEND` to the four application destinations:
//!
//! - chat lines are relayed to the topic as they are;
//! - add-user records the author in the roster and relays the `JOIN`;
//! - remove-user forgets the session's entry and relays the `LEAVE`;
//! - users broadcasts a `USERS_LIST` snapshot of the roster.
//!
//! A joined session whose socket closes without leaving is announced with a
//! `LEAVE` on its behalf.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use huddle_proto::codec::{self, CodecError};
use huddle_proto::destination::Destinations;
use huddle_proto::message::ChatMessage;
use huddle_proto::stomp::{self, Command, Frame, HeartBeat, StompError, VERSION};
use tokio::sync::{RwLock, mpsc};
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Default maximum WebSocket message size in bytes (64 KB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Default heartbeats advertised in `CONNECTED`.
pub const DEFAULT_HEART_BEAT: HeartBeat = HeartBeat {
    send_ms: 4000,
    receive_ms: 4000,
};

/// How long the writer may take to flush queued frames once the reader is done.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Tunables shared by every session.
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    /// Topic and application destinations.
    pub destinations: Destinations,
    /// Heartbeats advertised to clients.
    pub heart_beat: HeartBeat,
    /// Largest accepted WebSocket message, in bytes.
    pub max_frame_size: usize,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            destinations: Destinations::default(),
            heart_beat: DEFAULT_HEART_BEAT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// A client-side protocol violation. The session gets an `ERROR` frame and
/// is closed.
#[derive(Debug, thiserror::Error)]
pub enum Violation {
    /// The frame could not be decoded.
    #[error("malformed frame: {0}")]
    Malformed(#[from] StompError),
    /// The first frame was not `CONNECT` or `STOMP`.
    #[error("expected CONNECT, got {0}")]
    NotConnected(Command),
    /// The client does not speak STOMP 1.2.
    #[error("unsupported protocol versions: {0}")]
    UnsupportedVersion(String),
    /// A required header is absent.
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    /// A command the client must not send.
    #[error("unexpected {0} frame")]
    UnexpectedCommand(Command),
    /// A `SEND` body is not a chat message.
    #[error("invalid message body: {0}")]
    Body(#[from] CodecError),
}

/// A connected STOMP session.
struct Session {
    sender: mpsc::UnboundedSender<Message>,
    /// Subscription id to destination.
    subscriptions: HashMap<String, String>,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<String, Session>,
    /// Joined participants as `(session id, identity)`, in join order.
    roster: Vec<(String, String)>,
}

/// Shared broker state holding the session registry and the roster.
pub struct BrokerState {
    registry: RwLock<Registry>,
    options: BrokerOptions,
    next_message_id: AtomicU64,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerState {
    /// Creates a broker with the default destinations and limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(BrokerOptions::default())
    }

    /// Creates a broker with custom destinations and limits.
    #[must_use]
    pub fn with_options(options: BrokerOptions) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            options,
            next_message_id: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn options(&self) -> &BrokerOptions {
        &self.options
    }

    /// Number of sessions past the handshake.
    pub async fn session_count(&self) -> usize {
        self.registry.read().await.sessions.len()
    }

    /// Joined identities in join order, without duplicates.
    pub async fn roster(&self) -> Vec<String> {
        let registry = self.registry.read().await;
        let mut users: Vec<String> = Vec::with_capacity(registry.roster.len());
        for (_, identity) in &registry.roster {
            if !users.contains(identity) {
                users.push(identity.clone());
            }
        }
        users
    }

    /// Send a WebSocket Close frame to every session.
    ///
    /// Each session's writer forwards the close and stops, which the client
    /// sees as a dropped connection.
    pub async fn close_all_sessions(&self) {
        let registry = self.registry.read().await;
        for (session_id, session) in &registry.sessions {
            tracing::info!(session = %session_id, "closing session");
            let _ = session.sender.send(Message::Close(None));
        }
    }

    async fn register(&self, session_id: &str, sender: mpsc::UnboundedSender<Message>) {
        self.registry.write().await.sessions.insert(
            session_id.to_string(),
            Session {
                sender,
                subscriptions: HashMap::new(),
            },
        );
    }

    /// Removes a session, returning the identity it was still joined as.
    async fn unregister(&self, session_id: &str) -> Option<String> {
        let mut registry = self.registry.write().await;
        registry.sessions.remove(session_id);
        take_roster_entry(&mut registry.roster, session_id)
    }

    async fn subscribe(&self, session_id: &str, id: &str, destination: &str) {
        if let Some(session) = self.registry.write().await.sessions.get_mut(session_id) {
            session
                .subscriptions
                .insert(id.to_string(), destination.to_string());
        }
    }

    async fn unsubscribe(&self, session_id: &str, id: &str) {
        if let Some(session) = self.registry.write().await.sessions.get_mut(session_id) {
            session.subscriptions.remove(id);
        }
    }

    /// Records `identity` as the participant behind `session_id`.
    async fn join(&self, session_id: &str, identity: &str) {
        let mut registry = self.registry.write().await;
        take_roster_entry(&mut registry.roster, session_id);
        registry
            .roster
            .push((session_id.to_string(), identity.to_string()));
    }

    /// Forgets the participant behind `session_id`.
    async fn leave(&self, session_id: &str) -> Option<String> {
        take_roster_entry(&mut self.registry.write().await.roster, session_id)
    }

    /// Queues a frame for one session.
    async fn send_to(&self, session_id: &str, frame: &Frame) {
        if let Some(session) = self.registry.read().await.sessions.get(session_id) {
            let _ = session.sender.send(text(frame));
        }
    }

    async fn close(&self, session_id: &str) {
        if let Some(session) = self.registry.read().await.sessions.get(session_id) {
            let _ = session.sender.send(Message::Close(None));
        }
    }

    /// Delivers `message` to every subscription on the topic. Returns the
    /// number of subscriptions reached.
    async fn publish(&self, message: &ChatMessage) -> Result<usize, CodecError> {
        let body = codec::encode(message)?;
        let topic = &self.options.destinations.topic;
        let registry = self.registry.read().await;
        let mut delivered = 0;
        for session in registry.sessions.values() {
            for (subscription, destination) in &session.subscriptions {
                if destination != topic {
                    continue;
                }
                let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
                let frame = Frame::message(topic, subscription, &id.to_string(), &body);
                if session.sender.send(text(&frame)).is_ok() {
                    delivered += 1;
                }
            }
        }
        tracing::debug!(kind = %message.kind, sender = %message.sender, delivered, "broadcast");
        Ok(delivered)
    }
}

fn take_roster_entry(roster: &mut Vec<(String, String)>, session_id: &str) -> Option<String> {
    let index = roster.iter().position(|(id, _)| id == session_id)?;
    Some(roster.remove(index).1)
}

/// Outcome of processing one inbound frame.
enum Flow {
    Continue,
    /// The session is over; the client asked to disconnect or broke the
    /// protocol and has been sent an `ERROR`.
    Stop,
}

/// Outcome of the opening frame.
enum Handshake {
    Accepted(HeartBeat),
    Rejected(Violation),
    Closed,
}

/// Handles an upgraded WebSocket connection for a single STOMP session.
///
/// The connection lifecycle:
/// 1. Wait for `CONNECT` (or `STOMP`) and answer `CONNECTED`.
/// 2. Register the session.
/// 3. Run a writer (queued frames plus heartbeats) and a reader (inbound
///    frames, with a silence limit when the client promised heartbeats).
/// 4. On exit, unregister and announce a `LEAVE` if the session was joined.
pub async fn handle_socket(socket: WebSocket, state: Arc<BrokerState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let client_beat = match wait_for_connect(&mut ws_receiver).await {
        Handshake::Accepted(beat) => beat,
        Handshake::Rejected(violation) => {
            tracing::warn!(error = %violation, "handshake rejected");
            let error = Frame::error("handshake failed", violation.to_string());
            let _ = ws_sender.send(text(&error)).await;
            let _ = ws_sender.close().await;
            return;
        }
        Handshake::Closed => {
            tracing::warn!("connection closed before CONNECT");
            return;
        }
    };

    let advertised = state.options.heart_beat;
    let agreed = advertised.negotiate(client_beat);

    // Registered before CONNECTED goes out, so a client that has its reply
    // is already counted. No subscription exists yet, so nothing is routed.
    let session_id = uuid::Uuid::now_v7().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.register(&session_id, tx).await;

    if ws_sender
        .send(text(&Frame::connected(advertised)))
        .await
        .is_err()
    {
        tracing::warn!(session = %session_id, "failed to send CONNECTED");
        state.unregister(&session_id).await;
        return;
    }
    tracing::info!(
        session = %session_id,
        client_heart_beat = %client_beat,
        "session connected"
    );

    // Writer: queued frames, plus a bare EOL whenever the agreed interval passes.
    let writer_session = session_id.clone();
    let mut write_task = tokio::spawn(async move {
        let mut beat = agreed.outgoing.map(every);
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    let closing = matches!(msg, Message::Close(_));
                    if ws_sender.send(msg).await.is_err() {
                        tracing::warn!(session = %writer_session, "WebSocket write failed");
                        break;
                    }
                    if closing {
                        break;
                    }
                }
                () = tick(&mut beat) => {
                    if ws_sender.send(Message::Text(stomp::HEARTBEAT.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader: process inbound frames until the client leaves or goes quiet.
    let reader_session = session_id.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        let silence = agreed.incoming.map(|interval| interval * 2);
        loop {
            let next = match silence {
                Some(limit) => {
                    if let Ok(next) = tokio::time::timeout(limit, ws_receiver.next()).await {
                        next
                    } else {
                        tracing::warn!(session = %reader_session, "client heartbeat missed");
                        break;
                    }
                }
                None => ws_receiver.next().await,
            };
            let Some(Ok(msg)) = next else { break };
            match msg {
                Message::Text(data) => {
                    if let Flow::Stop =
                        handle_text(&reader_state, &reader_session, data.as_str()).await
                    {
                        break;
                    }
                }
                Message::Close(_) => {
                    tracing::info!(session = %reader_session, "received close frame");
                    break;
                }
                _ => {
                    // STOMP over WebSocket is text only; ignore binary, ping, pong.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            // Unregistering drops the last sender, so the writer drains
            // whatever is queued (a RECEIPT, an ERROR) and stops.
            finish_session(&state, &session_id).await;
            if tokio::time::timeout(FLUSH_TIMEOUT, &mut write_task).await.is_err() {
                write_task.abort();
            }
        }
        _ = &mut write_task => {
            read_task.abort();
            finish_session(&state, &session_id).await;
        }
    }
}

/// Unregisters the session and announces a departure it never sent.
async fn finish_session(state: &BrokerState, session_id: &str) {
    let identity = state.unregister(session_id).await;
    tracing::info!(session = %session_id, identity = ?identity, "session closed");
    if let Some(identity) = identity
        && let Err(e) = state.publish(&ChatMessage::leave(identity)).await
    {
        tracing::warn!(error = %e, "failed to announce departure");
    }
}

/// Reads until the first frame and checks it opens a session.
async fn wait_for_connect(
    receiver: &mut (impl futures_util::Stream<Item = Result<Message, axum::Error>> + Unpin),
) -> Handshake {
    while let Some(Ok(msg)) = receiver.next().await {
        let data = match msg {
            Message::Text(data) => data,
            Message::Close(_) => return Handshake::Closed,
            _ => continue,
        };
        let frame = match stomp::decode(data.as_str()) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => return Handshake::Rejected(e.into()),
        };
        return match accept(&frame) {
            Ok(beat) => Handshake::Accepted(beat),
            Err(violation) => Handshake::Rejected(violation),
        };
    }
    Handshake::Closed
}

/// Validates an opening frame and returns the client's heartbeats.
fn accept(frame: &Frame) -> Result<HeartBeat, Violation> {
    if !matches!(frame.command, Command::Connect | Command::Stomp) {
        return Err(Violation::NotConnected(frame.command));
    }
    if let Some(versions) = frame.get("accept-version")
        && !versions.split(',').any(|v| v.trim() == VERSION)
    {
        return Err(Violation::UnsupportedVersion(versions.to_string()));
    }
    match frame.get("heart-beat") {
        Some(value) => Ok(HeartBeat::parse(value)?),
        None => Ok(HeartBeat::default()),
    }
}

/// Processes one inbound text message.
async fn handle_text(state: &BrokerState, session_id: &str, data: &str) -> Flow {
    let frame = match stomp::decode(data) {
        Ok(Some(frame)) => frame,
        Ok(None) => return Flow::Continue,
        Err(e) => return reject(state, session_id, &e.into()).await,
    };
    tracing::debug!(session = %session_id, command = %frame.command, "frame received");

    let outcome = match frame.command {
        Command::Subscribe => on_subscribe(state, session_id, &frame).await,
        Command::Unsubscribe => match frame.get("id") {
            Some(id) => {
                state.unsubscribe(session_id, id).await;
                Ok(())
            }
            None => Err(Violation::MissingHeader("id")),
        },
        Command::Send => on_send(state, session_id, &frame).await,
        Command::Disconnect => {
            if let Some(receipt) = frame.get("receipt") {
                state.send_to(session_id, &Frame::receipt(receipt)).await;
            }
            state.close(session_id).await;
            return Flow::Stop;
        }
        other => Err(Violation::UnexpectedCommand(other)),
    };

    match outcome {
        Ok(()) => {
            if let Some(receipt) = frame.get("receipt") {
                state.send_to(session_id, &Frame::receipt(receipt)).await;
            }
            Flow::Continue
        }
        Err(violation) => reject(state, session_id, &violation).await,
    }
}

async fn on_subscribe(
    state: &BrokerState,
    session_id: &str,
    frame: &Frame,
) -> Result<(), Violation> {
    let id = frame.get("id").ok_or(Violation::MissingHeader("id"))?;
    let destination = frame
        .get("destination")
        .ok_or(Violation::MissingHeader("destination"))?;
    state.subscribe(session_id, id, destination).await;
    tracing::debug!(session = %session_id, id, destination, "subscribed");
    Ok(())
}

/// Routes a `SEND` to its application destination.
async fn on_send(state: &BrokerState, session_id: &str, frame: &Frame) -> Result<(), Violation> {
    let destination = frame
        .get("destination")
        .ok_or(Violation::MissingHeader("destination"))?;
    let message = codec::decode(&frame.body)?;
    let destinations = &state.options.destinations;

    if destination == destinations.chat || destination == destinations.topic {
        state.publish(&message).await?;
    } else if destination == destinations.add_user {
        if message.sender.is_empty() {
            tracing::warn!(session = %session_id, "join without a sender ignored");
            return Ok(());
        }
        state.join(session_id, &message.sender).await;
        tracing::info!(session = %session_id, identity = %message.sender, "participant joined");
        state.publish(&message).await?;
    } else if destination == destinations.remove_user {
        let identity = state.leave(session_id).await;
        tracing::info!(session = %session_id, identity = ?identity, "participant left");
        state.publish(&message).await?;
    } else if destination == destinations.users {
        let roster = ChatMessage::roster(message.sender, state.roster().await);
        state.publish(&roster).await?;
    } else {
        tracing::warn!(session = %session_id, destination, "send to unknown destination dropped");
    }
    Ok(())
}

/// Reports a violation and closes the session.
async fn reject(state: &BrokerState, session_id: &str, violation: &Violation) -> Flow {
    tracing::warn!(session = %session_id, error = %violation, "protocol violation");
    let error = Frame::error("protocol violation", violation.to_string());
    state.send_to(session_id, &error).await;
    state.close(session_id).await;
    Flow::Stop
}

fn text(frame: &Frame) -> Message {
    Message::Text(stomp::encode(frame).into())
}

/// Interval whose first tick is one full period away.
fn every(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Waits for the next tick, or forever when the interval is disabled.
async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Starts the broker on the given address and returns the bound address
/// and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(BrokerState::new())).await
}

/// Starts the broker with a pre-configured [`BrokerState`].
///
/// Use [`BrokerState::with_options`] to create a state with custom
/// destinations and limits from the resolved [`crate::config::BrokerConfig`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<BrokerState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "broker server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<BrokerState>>,
) -> impl axum::response::IntoResponse {
    ws.max_message_size(state.options.max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}
