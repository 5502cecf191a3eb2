//! STOMP 1.2 frames over WebSocket text messages.
//!
//! Each WebSocket text message carries at most one frame. A message made only
//! of end-of-line characters is a heartbeat and decodes to `None`.
//!
//! Wire format:
//!
//! ```text
//! COMMAND\n
//! header:value\n
//! \n
//! body\0
//! ```

use std::fmt;
use std::time::Duration;

/// The heartbeat payload: a single end-of-line.
pub const HEARTBEAT: &str = "\n";

/// STOMP protocol version negotiated by both sides.
pub const VERSION: &str = "1.2";

/// Errors raised while decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StompError {
    /// The first line is not a STOMP command this codec understands.
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    /// A header line has no `:` separator.
    #[error("malformed header line: {0}")]
    MalformedHeader(String),
    /// A header contains an undefined escape sequence.
    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),
    /// The frame ends before its NUL terminator.
    #[error("frame is missing its NUL terminator")]
    MissingTerminator,
    /// The `content-length` header is not a valid length for this body.
    #[error("bad content-length: {0}")]
    BadContentLength(String),
    /// The `heart-beat` header is not `<send>,<receive>`.
    #[error("invalid heart-beat header: {0}")]
    InvalidHeartBeat(String),
}

/// Frame commands used by chat clients and the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client handshake.
    Connect,
    /// Client handshake (1.2 alias of `CONNECT`).
    Stomp,
    /// Server handshake reply.
    Connected,
    /// Client publish.
    Send,
    /// Client subscription.
    Subscribe,
    /// Client unsubscription.
    Unsubscribe,
    /// Client graceful shutdown.
    Disconnect,
    /// Server delivery on a subscription.
    Message,
    /// Server acknowledgment of a `receipt` header.
    Receipt,
    /// Server error report; the server closes the connection afterwards.
    Error,
}

impl Command {
    /// Wire spelling of the command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    fn parse(line: &str) -> Option<Self> {
        Some(match line {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            _ => return None,
        })
    }

    /// `CONNECT` and `CONNECTED` headers are never escaped.
    const fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order. Repeated names are kept; the first one wins.
    pub headers: Vec<(String, String)>,
    /// Frame body (UTF-8, since it travels in a text message).
    pub body: String,
}

impl Frame {
    /// Creates a frame with no headers and an empty body.
    #[must_use]
    pub const fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Looks up the first header named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Client handshake for `host` advertising `heart_beat`.
    #[must_use]
    pub fn connect(host: &str, heart_beat: HeartBeat) -> Self {
        Self::new(Command::Connect)
            .header("accept-version", VERSION)
            .header("host", host)
            .header("heart-beat", heart_beat.to_string())
    }

    /// Server handshake reply.
    #[must_use]
    pub fn connected(heart_beat: HeartBeat) -> Self {
        Self::new(Command::Connected)
            .header("version", VERSION)
            .header("heart-beat", heart_beat.to_string())
    }

    /// Subscription to `destination` under subscription `id`.
    #[must_use]
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    /// Publish of a JSON `body` to `destination`.
    #[must_use]
    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        Self::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .body(body)
    }

    /// Delivery of `body` on `subscription`.
    #[must_use]
    pub fn message(destination: &str, subscription: &str, message_id: &str, body: &str) -> Self {
        Self::new(Command::Message)
            .header("destination", destination)
            .header("subscription", subscription)
            .header("message-id", message_id)
            .header("content-type", "application/json")
            .body(body)
    }

    /// Graceful shutdown, optionally asking for a receipt.
    #[must_use]
    pub fn disconnect(receipt: Option<&str>) -> Self {
        let frame = Self::new(Command::Disconnect);
        match receipt {
            Some(id) => frame.header("receipt", id),
            None => frame,
        }
    }

    /// Acknowledgment of a `receipt` header.
    #[must_use]
    pub fn receipt(receipt_id: &str) -> Self {
        Self::new(Command::Receipt).header("receipt-id", receipt_id)
    }

    /// Error report with a short `message` header and a detail body.
    #[must_use]
    pub fn error(message: &str, detail: impl Into<String>) -> Self {
        Self::new(Command::Error)
            .header("message", message)
            .header("content-type", "text/plain")
            .body(detail)
    }
}

/// Heartbeat intervals as advertised in a `heart-beat` header, in milliseconds.
///
/// `send` is the smallest interval the sender can guarantee between its own
/// frames; `receive` is the interval it would like to receive frames at.
/// Zero means "cannot" / "does not want".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    /// Outgoing interval in milliseconds.
    pub send_ms: u64,
    /// Desired incoming interval in milliseconds.
    pub receive_ms: u64,
}

impl HeartBeat {
    /// Heartbeats from two durations.
    #[must_use]
    pub fn new(send: Duration, receive: Duration) -> Self {
        Self {
            send_ms: u64::try_from(send.as_millis()).unwrap_or(u64::MAX),
            receive_ms: u64::try_from(receive.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Parses a `heart-beat` header value such as `4000,4000`.
    ///
    /// # Errors
    ///
    /// Returns `StompError::InvalidHeartBeat` if the value is not two
    /// comma-separated integers.
    pub fn parse(value: &str) -> Result<Self, StompError> {
        let invalid = || StompError::InvalidHeartBeat(value.to_string());
        let (send, receive) = value.split_once(',').ok_or_else(invalid)?;
        Ok(Self {
            send_ms: send.trim().parse().map_err(|_| invalid())?,
            receive_ms: receive.trim().parse().map_err(|_| invalid())?,
        })
    }

    /// Agreed intervals for a side advertising `self` to a peer advertising
    /// `peer`.
    #[must_use]
    pub fn negotiate(self, peer: Self) -> Negotiated {
        let pick = |mine: u64, theirs: u64| {
            (mine != 0 && theirs != 0).then(|| Duration::from_millis(mine.max(theirs)))
        };
        Negotiated {
            outgoing: pick(self.send_ms, peer.receive_ms),
            incoming: pick(self.receive_ms, peer.send_ms),
        }
    }
}

impl fmt::Display for HeartBeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.send_ms, self.receive_ms)
    }
}

/// Result of heartbeat negotiation, from one side's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Negotiated {
    /// How often this side must send something, if at all.
    pub outgoing: Option<Duration>,
    /// How often this side expects to hear from the peer, if at all.
    pub incoming: Option<Duration>,
}

/// Encodes a frame as a WebSocket text payload.
///
/// A `content-length` header is added for non-empty bodies unless the frame
/// already carries one.
#[must_use]
pub fn encode(frame: &Frame) -> String {
    let mut out = String::with_capacity(64 + frame.body.len());
    out.push_str(frame.command.as_str());
    out.push('\n');
    let escape = frame.command.escapes_headers();
    for (name, value) in &frame.headers {
        if escape {
            push_escaped(&mut out, name);
            out.push(':');
            push_escaped(&mut out, value);
        } else {
            out.push_str(name);
            out.push(':');
            out.push_str(value);
        }
        out.push('\n');
    }
    if !frame.body.is_empty() && frame.get("content-length").is_none() {
        out.push_str("content-length:");
        out.push_str(&frame.body.len().to_string());
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&frame.body);
    out.push('\0');
    out
}

/// Decodes one frame from a WebSocket text payload.
///
/// Returns `Ok(None)` for a heartbeat (a payload made only of EOLs).
///
/// # Errors
///
/// Returns a [`StompError`] describing the first violation found.
pub fn decode(input: &str) -> Result<Option<Frame>, StompError> {
    let input = input.trim_start_matches(['\r', '\n']);
    if input.is_empty() {
        return Ok(None);
    }

    let mut pos = 0;
    let command_line = next_line(input, &mut pos).ok_or(StompError::MissingTerminator)?;
    let command = Command::parse(command_line)
        .ok_or_else(|| StompError::UnknownCommand(command_line.to_string()))?;

    let mut headers = Vec::new();
    loop {
        let line = next_line(input, &mut pos).ok_or(StompError::MissingTerminator)?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| StompError::MalformedHeader(line.to_string()))?;
        if command.escapes_headers() {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let rest = &input[pos..];
    let declared = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| v.clone());
    let body = if let Some(raw) = declared {
        let len: usize = raw
            .trim()
            .parse()
            .map_err(|_| StompError::BadContentLength(raw.clone()))?;
        let body = rest
            .get(..len)
            .ok_or_else(|| StompError::BadContentLength(raw.clone()))?;
        if rest.as_bytes().get(len) != Some(&0) {
            return Err(StompError::MissingTerminator);
        }
        body
    } else {
        let end = rest.find('\0').ok_or(StompError::MissingTerminator)?;
        &rest[..end]
    };

    Ok(Some(Frame {
        command,
        headers,
        body: body.to_string(),
    }))
}

/// Returns the line starting at `pos` without its EOL and advances `pos`.
fn next_line<'a>(input: &'a str, pos: &mut usize) -> Option<&'a str> {
    let rest = &input[*pos..];
    let end = rest.find('\n')?;
    *pos += end + 1;
    Some(rest[..end].strip_suffix('\r').unwrap_or(&rest[..end]))
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            _ => return Err(StompError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}
