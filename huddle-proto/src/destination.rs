//! STOMP destination names shared by the client and the broker.

use serde::Deserialize;

/// Broadcast topic every client subscribes to.
pub const DEFAULT_TOPIC: &str = "/topic/public";

/// Destination for chat lines.
pub const DEFAULT_CHAT: &str = "/app/chat";

/// Destination announcing a participant.
pub const DEFAULT_ADD_USER: &str = "/app/chat/addUser";

/// Destination announcing a departure.
pub const DEFAULT_REMOVE_USER: &str = "/app/chat/removeUser";

/// Destination asking the broker for a roster snapshot.
pub const DEFAULT_USERS: &str = "/app/chat/users";

/// The set of destinations a chat session talks to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Destinations {
    /// Subscribe topic delivering all frame kinds.
    pub topic: String,
    /// Chat-send endpoint.
    pub chat: String,
    /// Add-participant endpoint.
    pub add_user: String,
    /// Remove-participant endpoint.
    pub remove_user: String,
    /// Roster-request endpoint.
    pub users: String,
}

impl Default for Destinations {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            chat: DEFAULT_CHAT.to_string(),
            add_user: DEFAULT_ADD_USER.to_string(),
            remove_user: DEFAULT_REMOVE_USER.to_string(),
            users: DEFAULT_USERS.to_string(),
        }
    }
}
