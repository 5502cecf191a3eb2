//! Front-end state and key handling.
//!
//! [`App`] holds only what the terminal needs on top of the chat state: the
//! input line, scroll position and the latest [`ChatSnapshot`]. Key presses
//! turn into [`AppAction`]s which the main loop forwards to the chat client.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use huddle_proto::message::{ChatMessage, Timestamp};

use crate::chat::ChatSnapshot;

/// Typed into the message input to leave the chat.
pub const LEAVE_COMMAND: &str = "/leave";

/// Something the main loop must do on behalf of the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    Join(String),
    Send(String),
    Leave,
    Keystroke,
    Quit,
}

/// Main application state.
pub struct App {
    /// Current text input (the name at the join prompt, the message after).
    pub input: String,
    /// Cursor position in input (character index).
    pub cursor_position: usize,
    /// Latest state published by the chat client.
    pub snapshot: ChatSnapshot,
    /// Number of lines scrolled up from the bottom of the message list.
    pub message_scroll: usize,
    /// One-line hint shown under the prompt, cleared on the next key press.
    pub notice: Option<String>,
    /// chrono format for message times.
    pub timestamp_format: String,
    /// Whether the app should quit.
    pub should_quit: bool,
}

impl App {
    /// Create the app at the join prompt, optionally pre-filled with a name.
    #[must_use]
    pub fn new(identity: Option<&str>, timestamp_format: impl Into<String>) -> Self {
        let input = identity.unwrap_or_default().to_string();
        Self {
            cursor_position: input.chars().count(),
            input,
            snapshot: ChatSnapshot::default(),
            message_scroll: 0,
            notice: None,
            timestamp_format: timestamp_format.into(),
            should_quit: false,
        }
    }

    /// Whether the chat view (rather than the join prompt) is showing.
    #[must_use]
    pub fn in_chat(&self) -> bool {
        self.snapshot.is_joined()
    }

    /// Replace the chat state with a newer snapshot.
    pub fn set_snapshot(&mut self, snapshot: ChatSnapshot) {
        if self.snapshot.messages.len() != snapshot.messages.len() {
            self.message_scroll = 0;
        }
        self.snapshot = snapshot;
    }

    /// Whether `message` was written by the local user.
    #[must_use]
    pub fn is_own(&self, message: &ChatMessage) -> bool {
        message.is_from(&self.snapshot.local_identity)
    }

    /// Format a wire timestamp for display in local time.
    #[must_use]
    pub fn format_time(&self, timestamp: &Timestamp) -> String {
        timestamp.parse().map_or_else(
            || "--:--".to_string(),
            |at| {
                at.with_timezone(&chrono::Local)
                    .format(&self.timestamp_format)
                    .to_string()
            },
        )
    }

    /// Handle a key event.
    pub fn handle_key_event(&mut self, key: KeyEvent) -> Option<AppAction> {
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Esc, _) => {
                self.should_quit = true;
                return Some(AppAction::Quit);
            }
            _ => {}
        }
        self.notice = None;

        match key.code {
            KeyCode::Enter => self.submit(),
            KeyCode::Char(c) => {
                self.enter_char(c);
                self.in_chat().then_some(AppAction::Keystroke)
            }
            KeyCode::Backspace => {
                self.delete_char();
                None
            }
            KeyCode::Left => {
                self.cursor_position = self.cursor_position.saturating_sub(1);
                None
            }
            KeyCode::Right => {
                self.cursor_position = (self.cursor_position + 1).min(self.input.chars().count());
                None
            }
            KeyCode::Home => {
                self.cursor_position = 0;
                None
            }
            KeyCode::End => {
                self.cursor_position = self.input.chars().count();
                None
            }
            KeyCode::Up => {
                self.message_scroll = (self.message_scroll + 1)
                    .min(self.snapshot.messages.len().saturating_sub(1));
                None
            }
            KeyCode::Down => {
                self.message_scroll = self.message_scroll.saturating_sub(1);
                None
            }
            _ => None,
        }
    }

    /// Turn the input line into a join, a leave or a chat line.
    fn submit(&mut self) -> Option<AppAction> {
        let trimmed = self.input.trim();
        if trimmed.is_empty() {
            return None;
        }

        let action = if !self.in_chat() {
            if !self.snapshot.is_connected() {
                self.notice = Some("Not connected yet, try again in a moment".to_string());
                return None;
            }
            AppAction::Join(trimmed.to_string())
        } else if trimmed == LEAVE_COMMAND {
            AppAction::Leave
        } else {
            AppAction::Send(self.input.clone())
        };

        self.input.clear();
        self.cursor_position = 0;
        Some(action)
    }

    /// Byte offset of the cursor within `input`.
    fn cursor_byte(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map_or(self.input.len(), |(i, _)| i)
    }

    /// Insert a character at the cursor position.
    fn enter_char(&mut self, c: char) {
        let at = self.cursor_byte();
        self.input.insert(at, c);
        self.cursor_position += 1;
    }

    /// Delete the character before the cursor.
    fn delete_char(&mut self) {
        if self.cursor_position == 0 {
            return;
        }
        self.cursor_position -= 1;
        let at = self.cursor_byte();
        self.input.remove(at);
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new(None, "%H:%M")
    }
}
