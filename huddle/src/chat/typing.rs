//! Local "is typing" indicator with an idle expiry timer.
//!
//! Every keystroke restarts the timer. Each restart bumps a generation
//! counter and the expiry event carries the generation it was armed with,
//! so an expiry from an older keystroke is ignored even if it was already
//! queued when the timer got replaced.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default idle period before the indicator clears.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_secs(3);

/// Expiry of the typing timer armed at the given generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingExpired(pub u64);

#[derive(Debug)]
pub struct TypingIndicator {
    timeout: Duration,
    generation: u64,
    typing: bool,
    timer: Option<JoinHandle<()>>,
}

impl TypingIndicator {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            generation: 0,
            typing: false,
            timer: None,
        }
    }

    #[must_use]
    pub const fn is_typing(&self) -> bool {
        self.typing
    }

    /// Marks the user as typing and restarts the expiry timer.
    ///
    /// Returns `true` if the indicator just turned on.
    pub fn keystroke(&mut self, expired: &mpsc::UnboundedSender<TypingExpired>) -> bool {
        self.cancel_timer();
        self.generation += 1;

        let generation = self.generation;
        let timeout = self.timeout;
        let expired = expired.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = expired.send(TypingExpired(generation));
        }));

        !std::mem::replace(&mut self.typing, true)
    }

    /// Handles a timer expiry. Returns `true` if the indicator turned off.
    pub fn expire(&mut self, event: TypingExpired) -> bool {
        if event.0 != self.generation || !self.typing {
            return false;
        }
        self.timer = None;
        self.typing = false;
        true
    }

    /// Turns the indicator off immediately. Returns `true` if it was on.
    pub fn stop(&mut self) -> bool {
        self.cancel_timer();
        self.generation += 1;
        std::mem::replace(&mut self.typing, false)
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Default for TypingIndicator {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_TIMEOUT)
    }
}

impl Drop for TypingIndicator {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
