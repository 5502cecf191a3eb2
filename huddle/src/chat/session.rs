//! Connection and membership state of the local chat session.
//!
//! The two axes are tracked independently: a client can be connected without
//! having announced itself, and a joined client stays joined across a
//! transport drop until it explicitly leaves.

/// Transport connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Whether the local user has announced presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MembershipState {
    #[default]
    NotJoined,
    Joined,
}

/// Why a user action was refused.
///
/// Never returned to callers of the public API; refusals are logged and
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Refused {
    #[error("identity is empty")]
    EmptyIdentity,

    #[error("not connected (state: {0})")]
    NotConnected(ConnectionState),

    #[error("already joined as {0:?}")]
    AlreadyJoined(String),

    #[error("not joined")]
    NotJoined,

    #[error("message is empty")]
    EmptyMessage,
}

/// The process-wide session record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    connection: ConnectionState,
    membership: MembershipState,
    local_identity: String,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn connection(&self) -> ConnectionState {
        self.connection
    }

    #[must_use]
    pub const fn membership(&self) -> MembershipState {
        self.membership
    }

    /// The identity chosen at join time, empty while not joined.
    #[must_use]
    pub fn local_identity(&self) -> &str {
        &self.local_identity
    }

    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.membership == MembershipState::Joined
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    /// A connection attempt was requested. Ignored unless disconnected.
    pub fn connecting(&mut self) {
        if self.connection == ConnectionState::Disconnected {
            self.connection = ConnectionState::Connecting;
        }
    }

    /// Applies a transport connection-state event.
    ///
    /// Membership is deliberately left alone on `false`.
    pub fn connection_changed(&mut self, connected: bool) {
        self.connection = if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
    }

    /// Checks the join preconditions and returns the trimmed identity.
    ///
    /// # Errors
    ///
    /// Refuses an identity that is blank after trimming, a session that is
    /// not connected, or one that has already joined.
    pub fn can_join<'a>(&self, identity: &'a str) -> Result<&'a str, Refused> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(Refused::EmptyIdentity);
        }
        if self.connection != ConnectionState::Connected {
            return Err(Refused::NotConnected(self.connection));
        }
        if self.is_joined() {
            return Err(Refused::AlreadyJoined(self.local_identity.clone()));
        }
        Ok(identity)
    }

    /// Moves to `Joined` as `identity` after a successful [`Session::can_join`].
    pub fn joined(&mut self, identity: &str) {
        self.membership = MembershipState::Joined;
        self.local_identity = identity.to_string();
    }

    /// Moves back to `NotJoined` and returns the identity that was in use.
    ///
    /// # Errors
    ///
    /// Refuses when not joined.
    pub fn leave(&mut self) -> Result<String, Refused> {
        if !self.is_joined() {
            return Err(Refused::NotJoined);
        }
        self.membership = MembershipState::NotJoined;
        Ok(std::mem::take(&mut self.local_identity))
    }

    /// Checks the send preconditions.
    ///
    /// # Errors
    ///
    /// Refuses when not joined or when `content` is blank.
    pub fn can_send(&self, content: &str) -> Result<(), Refused> {
        if !self.is_joined() {
            return Err(Refused::NotJoined);
        }
        if content.trim().is_empty() {
            return Err(Refused::EmptyMessage);
        }
        Ok(())
    }
}
