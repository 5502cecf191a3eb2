//! Actor that owns a [`ChatCore`] and serializes everything that touches it.
//!
//! # Architecture
//!
//! ```text
//! front-end  ── ChatCommand ──▶  ChatClient task  ◀── TransportEvent ── transport
//!            ◀── ChatSnapshot (watch)     │       ◀── timer events ──── delivery / typing
//!            ◀── ChatEvents (broadcast) ──┘
//! ```
//!
//! Front-ends hold a cloneable [`ChatHandle`]. Commands are fire-and-forget,
//! matching the core: refused actions are logged, never reported back.

use tokio::sync::{mpsc, watch};

use crate::transport::{EventReceiver, Transport};

use super::delivery::DeliveryTracker;
use super::events::ChatEvents;
use super::{ChatCore, ChatOptions, ChatSnapshot, TimerEvents};

/// Commands accepted by the chat actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Connect,
    Disconnect,
    Join(String),
    Send(String),
    Leave,
    Keystroke,
    /// Disconnect if joined, then stop the actor.
    Shutdown,
}

/// Cloneable handle on a running [`ChatClient`].
#[derive(Debug, Clone)]
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<ChatCommand>,
    snapshot: watch::Receiver<ChatSnapshot>,
    events: ChatEvents,
}

impl ChatHandle {
    fn command(&self, command: ChatCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("chat client has stopped, command dropped");
        }
    }

    pub fn connect(&self) {
        self.command(ChatCommand::Connect);
    }

    pub fn disconnect(&self) {
        self.command(ChatCommand::Disconnect);
    }

    pub fn join(&self, identity: impl Into<String>) {
        self.command(ChatCommand::Join(identity.into()));
    }

    pub fn send(&self, content: impl Into<String>) {
        self.command(ChatCommand::Send(content.into()));
    }

    pub fn leave(&self) {
        self.command(ChatCommand::Leave);
    }

    pub fn keystroke(&self) {
        self.command(ChatCommand::Keystroke);
    }

    /// Stops the actor and waits until it has exited.
    pub async fn shutdown(&self) {
        self.command(ChatCommand::Shutdown);
        self.commands.closed().await;
    }

    /// The latest state.
    #[must_use]
    pub fn snapshot(&self) -> ChatSnapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver notified whenever the state changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot.clone()
    }

    pub const fn events(&self) -> &ChatEvents {
        &self.events
    }

    /// Whether the actor is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// The actor task state.
pub struct ChatClient<T, D> {
    core: ChatCore<T, D>,
    timers: TimerEvents,
    transport_events: EventReceiver,
    commands: mpsc::UnboundedReceiver<ChatCommand>,
    snapshot: watch::Sender<ChatSnapshot>,
}

impl<T: Transport, D: DeliveryTracker> ChatClient<T, D> {
    /// Spawns the actor on the current tokio runtime.
    ///
    /// `transport_events` must be the receiving half of the channel
    /// `transport` was created with.
    #[must_use]
    pub fn spawn(
        transport: T,
        transport_events: EventReceiver,
        tracker: D,
        options: ChatOptions,
    ) -> ChatHandle {
        let (core, timers) = ChatCore::new(transport, tracker, options);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(core.snapshot());
        let events = core.events().clone();

        let client = Self {
            core,
            timers,
            transport_events,
            commands: cmd_rx,
            snapshot: snapshot_tx,
        };
        tokio::spawn(client.run());

        ChatHandle {
            commands: cmd_tx,
            snapshot: snapshot_rx,
            events,
        }
    }

    async fn run(mut self) {
        tracing::debug!("chat client started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(ChatCommand::Shutdown) | None => {
                        self.core.shutdown();
                        break;
                    }
                    Some(command) => self.execute(command),
                },
                Some(event) = self.transport_events.recv() => self.core.handle_transport(event),
                Some(update) = self.timers.delivery.recv() => self.core.on_delivery(update),
                Some(expired) = self.timers.typing.recv() => self.core.on_typing_expired(expired),
            }
            self.publish_snapshot();
        }
        self.publish_snapshot();
        tracing::debug!("chat client stopped");
    }

    fn execute(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::Connect => self.core.connect(),
            ChatCommand::Disconnect => self.core.disconnect(),
            ChatCommand::Join(identity) => self.core.join(&identity),
            ChatCommand::Send(content) => self.core.send(&content),
            ChatCommand::Leave => self.core.leave(),
            ChatCommand::Keystroke => self.core.keystroke(),
            ChatCommand::Shutdown => {}
        }
    }

    fn publish_snapshot(&self) {
        let next = self.core.snapshot();
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
