//! Chat message types carried as JSON bodies inside STOMP frames.
//!
//! The same [`ChatMessage`] shape is used for every frame on the broadcast
//! topic: ordinary chat lines, presence announcements (`JOIN` / `LEAVE`) and
//! roster snapshots (`USERS_LIST`).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Kind of a chat frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// An ordinary chat line.
    #[serde(rename = "CHAT")]
    Chat,
    /// A participant announced itself.
    #[serde(rename = "JOIN")]
    Join,
    /// A participant left.
    #[serde(rename = "LEAVE")]
    Leave,
    /// Full participant list, as known by the broker at broadcast time.
    #[serde(rename = "USERS_LIST")]
    RosterSnapshot,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chat => write!(f, "CHAT"),
            Self::Join => write!(f, "JOIN"),
            Self::Leave => write!(f, "LEAVE"),
            Self::RosterSnapshot => write!(f, "USERS_LIST"),
        }
    }
}

/// ISO-8601 instant assigned by the sending client.
///
/// Kept as the exact string seen on the wire: it doubles as the correlation
/// key for local delivery status, so it must compare equal to what was sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    /// Current UTC time with millisecond precision, e.g. `2024-05-01T09:30:12.345Z`.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Formats a UTC instant the way [`Timestamp::now`] does.
    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Wraps a raw wire string without validating it.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw wire string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the instant, returning `None` for strings that are not RFC 3339.
    #[must_use]
    pub fn parse(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.0)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single chat frame body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Display identity of the author.
    pub sender: String,
    /// Freeform text. Brokers may send `null` for control frames; it decodes
    /// as an empty string.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    /// Frame kind (`type` on the wire).
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Creation instant, assigned by the author's client.
    pub timestamp: Timestamp,
    /// Participant list, present only on roster snapshots (`users` on the wire).
    #[serde(rename = "users", default, skip_serializing_if = "Option::is_none")]
    pub roster: Option<Vec<String>>,
}

impl ChatMessage {
    /// A chat line authored now.
    #[must_use]
    pub fn chat(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            kind: MessageKind::Chat,
            timestamp: Timestamp::now(),
            roster: None,
        }
    }

    /// A presence announcement for `sender`.
    #[must_use]
    pub fn join(sender: impl Into<String>) -> Self {
        let sender = sender.into();
        Self {
            content: format!("{sender} joined the chat"),
            sender,
            kind: MessageKind::Join,
            timestamp: Timestamp::now(),
            roster: None,
        }
    }

    /// A departure announcement for `sender`.
    #[must_use]
    pub fn leave(sender: impl Into<String>) -> Self {
        let sender = sender.into();
        Self {
            content: format!("{sender} left the chat"),
            sender,
            kind: MessageKind::Leave,
            timestamp: Timestamp::now(),
            roster: None,
        }
    }

    /// Request for a roster snapshot, sent to the roster-request destination.
    #[must_use]
    pub fn roster_request(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: String::new(),
            kind: MessageKind::RosterSnapshot,
            timestamp: Timestamp::now(),
            roster: None,
        }
    }

    /// A roster snapshot carrying `users`.
    #[must_use]
    pub fn roster(sender: impl Into<String>, users: Vec<String>) -> Self {
        Self {
            sender: sender.into(),
            content: String::new(),
            kind: MessageKind::RosterSnapshot,
            timestamp: Timestamp::now(),
            roster: Some(users),
        }
    }

    /// Whether this frame is a presence line (`JOIN` or `LEAVE`).
    #[must_use]
    pub const fn is_presence(&self) -> bool {
        matches!(self.kind, MessageKind::Join | MessageKind::Leave)
    }

    /// Whether `identity` authored this frame.
    #[must_use]
    pub fn is_from(&self, identity: &str) -> bool {
        !identity.is_empty() && self.sender == identity
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}
