//! STOMP over WebSocket transport.
//!
//! Implements the [`Transport`] trait over a single STOMP 1.2 session on a
//! WebSocket connection. A background supervisor task owns the socket:
//!
//! 1. Opens the WebSocket and sends `CONNECT` advertising our heartbeats
//! 2. Waits for `CONNECTED`, negotiates heartbeat intervals
//! 3. Subscribes to the broadcast topic and reports `Connection(true)`
//! 4. Pumps outbound `SEND` frames, heartbeats and inbound `MESSAGE` frames
//! 5. On a drop or failed handshake reports `Connection(false)`, waits a
//!    fixed delay and starts over
//!
//! Every supervisor runs under an epoch. [`Transport::disconnect`] bumps the
//! epoch, so a supervisor that is still winding down can never emit events
//! or accept publishes on behalf of a newer connection.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use huddle_proto::stomp::{self, Command, Frame, HeartBeat, Negotiated};

use super::{EventSender, Transport, TransportEvent};

/// Type alias for a client WebSocket connection.
type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<WsStream, Message>;

/// Type alias for the read half of a WebSocket connection.
type WsReader = futures_util::stream::SplitStream<WsStream>;

/// Subscription id used for the broadcast topic.
const SUBSCRIPTION_ID: &str = "sub-0";

/// The broker is considered gone after this many silent incoming intervals.
const MISSED_HEARTBEATS: u32 = 2;

/// Settings for a [`StompTransport`].
#[derive(Debug, Clone)]
pub struct StompConfig {
    /// WebSocket URL of the broker endpoint (ws:// or wss://).
    pub url: String,
    /// Broadcast topic to subscribe to after the handshake.
    pub topic: String,
    /// Heartbeats advertised in `CONNECT`.
    pub heart_beat: HeartBeat,
    /// Fixed wait between a drop and the next connection attempt.
    pub reconnect_delay: Duration,
    /// Upper bound on the WebSocket + STOMP handshake.
    pub connect_timeout: Duration,
}

impl StompConfig {
    /// Settings with the default heartbeat (4s both ways), a 5s reconnect
    /// delay and a 10s handshake timeout.
    #[must_use]
    pub fn new(url: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            topic: topic.into(),
            heart_beat: HeartBeat::new(Duration::from_secs(4), Duration::from_secs(4)),
            reconnect_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// How a single session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// `disconnect()` was called or the transport was dropped.
    Shutdown,
    /// The handshake failed or the connection dropped.
    Lost,
}

/// State shared between the transport handle and its supervisor task.
struct Link {
    events: EventSender,
    state: Mutex<LinkState>,
}

#[derive(Default)]
struct LinkState {
    /// Bumped by every `disconnect()`.
    epoch: u64,
    /// Outbound queue of the live session, `None` while not connected.
    outbound: Option<mpsc::UnboundedSender<String>>,
}

impl Link {
    fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Emits `event` unless `epoch` is stale. Returns whether it was emitted.
    fn emit(&self, epoch: u64, event: TransportEvent) -> bool {
        let state = self.state.lock();
        if state.epoch != epoch {
            return false;
        }
        let _ = self.events.send(event);
        true
    }

    /// Marks the session as connected and reports it.
    fn open(&self, epoch: u64, outbound: mpsc::UnboundedSender<String>) -> bool {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return false;
        }
        state.outbound = Some(outbound);
        let _ = self.events.send(TransportEvent::Connection(true));
        true
    }

    fn close(&self, epoch: u64) {
        let mut state = self.state.lock();
        if state.epoch == epoch {
            state.outbound = None;
        }
    }

    /// Invalidates the current epoch and reports `Connection(false)`.
    fn invalidate(&self) {
        let mut state = self.state.lock();
        state.epoch += 1;
        state.outbound = None;
        let _ = self.events.send(TransportEvent::Connection(false));
    }

    fn send(&self, text: String) -> bool {
        let state = self.state.lock();
        state
            .outbound
            .as_ref()
            .is_some_and(|tx| tx.send(text).is_ok())
    }

    fn is_open(&self) -> bool {
        self.state.lock().outbound.is_some()
    }
}

/// Handle on a running supervisor task.
struct Supervisor {
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

/// STOMP-over-WebSocket transport implementing the [`Transport`] trait.
///
/// Must be used from within a tokio runtime: [`Transport::connect`] spawns
/// the supervisor task.
pub struct StompTransport {
    config: Arc<StompConfig>,
    link: Arc<Link>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl StompTransport {
    /// Creates a disconnected transport reporting to `events`.
    #[must_use]
    pub fn new(config: StompConfig, events: EventSender) -> Self {
        Self {
            config: Arc::new(config),
            link: Arc::new(Link {
                events,
                state: Mutex::new(LinkState::default()),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// Return the settings this transport was created with.
    pub fn config(&self) -> &StompConfig {
        &self.config
    }
}

impl Transport for StompTransport {
    fn connect(&self) {
        let mut supervisor = self.supervisor.lock();
        if supervisor.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            tracing::debug!(url = %self.config.url, "connect ignored, connection already active");
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(supervise(
            Arc::clone(&self.link),
            self.link.epoch(),
            Arc::clone(&self.config),
            shutdown_rx,
        ));
        tracing::info!(url = %self.config.url, "connecting to STOMP broker");
        *supervisor = Some(Supervisor { shutdown, handle });
    }

    fn disconnect(&self) {
        let supervisor = self.supervisor.lock().take();
        self.link.invalidate();
        if let Some(supervisor) = supervisor {
            let _ = supervisor.shutdown.send(true);
            tracing::info!(url = %self.config.url, "disconnected from STOMP broker");
        }
    }

    fn publish(&self, destination: &str, payload: &str) {
        let frame = stomp::encode(&Frame::send(destination, payload));
        if !self.link.send(frame) {
            tracing::debug!(destination, "not connected, dropping publish");
        }
    }

    fn is_connected(&self) -> bool {
        self.link.is_open()
    }
}

impl Drop for StompTransport {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.get_mut().take() {
            let _ = supervisor.shutdown.send(true);
        }
    }
}

/// Background task: keep one session alive until shut down.
async fn supervise(
    link: Arc<Link>,
    epoch: u64,
    config: Arc<StompConfig>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        match run_session(&link, epoch, &config, &mut shutdown).await {
            SessionEnd::Shutdown => break,
            SessionEnd::Lost => {
                if !link.emit(epoch, TransportEvent::Connection(false)) {
                    break;
                }
            }
        }

        tracing::info!(
            url = %config.url,
            delay_ms = config.reconnect_delay.as_millis(),
            "retrying STOMP connection after fixed delay"
        );
        tokio::select! {
            () = tokio::time::sleep(config.reconnect_delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!(url = %config.url, "STOMP supervisor exiting");
}

/// Runs one session from handshake to teardown.
async fn run_session(
    link: &Link,
    epoch: u64,
    config: &StompConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let attempt = tokio::select! {
        _ = shutdown.changed() => return SessionEnd::Shutdown,
        result = tokio::time::timeout(config.connect_timeout, handshake(config)) => result,
    };

    let (sink, reader, agreed) = match attempt {
        Ok(Ok(parts)) => parts,
        Ok(Err(reason)) => {
            tracing::warn!(url = %config.url, %reason, "STOMP handshake failed");
            return SessionEnd::Lost;
        }
        Err(_) => {
            tracing::warn!(url = %config.url, "STOMP handshake timed out");
            return SessionEnd::Lost;
        }
    };

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    if !link.open(epoch, outbound_tx) {
        return SessionEnd::Shutdown;
    }
    tracing::info!(
        url = %config.url,
        outgoing = ?agreed.outgoing,
        incoming = ?agreed.incoming,
        "STOMP session established"
    );

    let pump = Pump {
        link,
        epoch,
        topic: &config.topic,
    };
    let end = pump.run(sink, reader, outbound_rx, agreed, shutdown).await;
    link.close(epoch);
    end
}

/// Opens the WebSocket, performs `CONNECT` / `CONNECTED` and subscribes.
async fn handshake(config: &StompConfig) -> Result<(WsSender, WsReader, Negotiated), String> {
    let (ws, _response) = connect_async(config.url.as_str())
        .await
        .map_err(|e| format!("websocket connect failed: {e}"))?;
    let (mut sink, mut reader) = ws.split();

    let connect = Frame::connect(&host_of(&config.url), config.heart_beat);
    sink.send(Message::text(stomp::encode(&connect)))
        .await
        .map_err(|e| format!("failed to send CONNECT: {e}"))?;

    let reply = next_frame(&mut reader).await?;
    match reply.command {
        Command::Connected => {
            let server = match reply.get("heart-beat") {
                Some(value) => HeartBeat::parse(value).map_err(|e| e.to_string())?,
                None => HeartBeat::default(),
            };
            let subscribe = Frame::subscribe(SUBSCRIPTION_ID, &config.topic);
            sink.send(Message::text(stomp::encode(&subscribe)))
                .await
                .map_err(|e| format!("failed to send SUBSCRIBE: {e}"))?;
            Ok((sink, reader, config.heart_beat.negotiate(server)))
        }
        Command::Error => Err(format!(
            "broker refused connection: {}",
            reply.get("message").unwrap_or("no reason given")
        )),
        other => Err(format!("expected CONNECTED, got {other}")),
    }
}

/// Reads until the first non-heartbeat frame.
async fn next_frame(reader: &mut WsReader) -> Result<Frame, String> {
    while let Some(msg) = reader.next().await {
        match msg {
            Ok(Message::Text(text)) => match stomp::decode(text.as_str()) {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => {}
                Err(e) => return Err(format!("malformed handshake frame: {e}")),
            },
            Ok(Message::Close(_)) => return Err("connection closed during handshake".into()),
            Ok(_) => {}
            Err(e) => return Err(format!("websocket error during handshake: {e}")),
        }
    }
    Err("stream ended during handshake".into())
}

/// The steady-state loop of one session.
struct Pump<'a> {
    link: &'a Link,
    epoch: u64,
    topic: &'a str,
}

impl Pump<'_> {
    async fn run(
        &self,
        mut sink: WsSender,
        mut reader: WsReader,
        mut outbound: mpsc::UnboundedReceiver<String>,
        agreed: Negotiated,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let mut send_beat = agreed.outgoing.map(every);
        let mut check_beat = agreed.incoming.map(every);
        let silence_limit = agreed.incoming.map(|period| period * MISSED_HEARTBEATS);
        let mut last_heard = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    // Frames published just before disconnect (a LEAVE) still go out.
                    while let Ok(text) = outbound.try_recv() {
                        if sink.send(Message::text(text)).await.is_err() {
                            break;
                        }
                    }
                    let goodbye = stomp::encode(&Frame::disconnect(None));
                    let _ = sink.send(Message::text(goodbye)).await;
                    let _ = sink.close().await;
                    return SessionEnd::Shutdown;
                }
                Some(text) = outbound.recv() => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        tracing::warn!(err = %e, "STOMP send failed");
                        return SessionEnd::Lost;
                    }
                }
                () = tick(&mut send_beat) => {
                    if let Err(e) = sink.send(Message::text(stomp::HEARTBEAT)).await {
                        tracing::warn!(err = %e, "STOMP heartbeat send failed");
                        return SessionEnd::Lost;
                    }
                }
                () = tick(&mut check_beat) => {
                    if silence_limit.is_some_and(|limit| last_heard.elapsed() > limit) {
                        tracing::warn!("no heartbeat from broker, dropping connection");
                        return SessionEnd::Lost;
                    }
                }
                msg = reader.next() => {
                    last_heard = Instant::now();
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(end) = self.on_text(text.as_str()) {
                                return end;
                            }
                        }
                        Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                            Ok(text) => {
                                if let Some(end) = self.on_text(text) {
                                    return end;
                                }
                            }
                            Err(_) => tracing::warn!("non UTF-8 binary frame, skipping"),
                        },
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("STOMP WebSocket closed by broker");
                            return SessionEnd::Lost;
                        }
                        Some(Ok(_)) => {
                            // Ping/pong are answered by tungstenite itself.
                        }
                        Some(Err(e)) => {
                            tracing::warn!(err = %e, "STOMP WebSocket read error");
                            return SessionEnd::Lost;
                        }
                        None => {
                            tracing::info!("STOMP WebSocket stream ended");
                            return SessionEnd::Lost;
                        }
                    }
                }
            }
        }
    }

    /// Handles one inbound text payload. Returns `Some` when the session ends.
    fn on_text(&self, text: &str) -> Option<SessionEnd> {
        let frame = match stomp::decode(text) {
            Ok(Some(frame)) => frame,
            Ok(None) => return None,
            Err(e) => {
                // Malformed frame: log and skip, don't disconnect.
                tracing::warn!(err = %e, "malformed STOMP frame, skipping");
                return None;
            }
        };

        match frame.command {
            Command::Message => {
                let ours = frame.get("subscription") == Some(SUBSCRIPTION_ID)
                    || frame.get("destination") == Some(self.topic);
                if !ours {
                    tracing::debug!(destination = ?frame.get("destination"), "ignoring foreign MESSAGE");
                    return None;
                }
                if self
                    .link
                    .emit(self.epoch, TransportEvent::Broadcast(frame.body))
                {
                    None
                } else {
                    Some(SessionEnd::Shutdown)
                }
            }
            Command::Error => {
                tracing::warn!(
                    message = frame.get("message").unwrap_or_default(),
                    "broker sent ERROR"
                );
                Some(SessionEnd::Lost)
            }
            Command::Receipt => {
                tracing::debug!(receipt = ?frame.get("receipt-id"), "receipt from broker");
                None
            }
            other => {
                tracing::debug!(command = %other, "unexpected frame from broker");
                None
            }
        }
    }
}

/// A ticking interval whose first tick is one full period away.
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

/// Host name sent in the `CONNECT` frame.
fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| "localhost".to_string())
}
