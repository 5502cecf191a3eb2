// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! Integration tests for the chat session lifecycle over the loopback
//! transport.
//!
//! The loopback controller plays the broker, so every scenario is
//! deterministic. Time is paused; receipt and typing timers advance only when
//! the runtime is otherwise idle.
//!
//! These tests validate:
//! - joining announces the user and requests the roster
//! - roster snapshots, joins and leaves drive the participant list
//! - own chat lines go through sending, sent and seen
//! - an unexpected drop clears presence but keeps membership
//! - leaving discards history and cycles the connection
//! - the typing indicator clears after the idle timeout and on send

use std::time::Duration;

use huddle::chat::client::{ChatClient, ChatHandle};
use huddle::chat::delivery::SimulatedReceipts;
use huddle::chat::session::{ConnectionState, MembershipState};
use huddle::chat::stream::DeliveryStatus;
use huddle::chat::{ChatOptions, ChatSnapshot};
use huddle::transport::event_channel;
use huddle::transport::loopback::{LoopbackController, LoopbackTransport};
use huddle_proto::destination::{DEFAULT_ADD_USER, DEFAULT_CHAT, DEFAULT_REMOVE_USER, DEFAULT_USERS};
use huddle_proto::message::{ChatMessage, MessageKind};

fn start() -> (ChatHandle, LoopbackController) {
    let (tx, rx) = event_channel();
    let (transport, controller) = LoopbackTransport::new(tx);
    let options = ChatOptions {
        typing_timeout: Duration::from_secs(3),
        ..ChatOptions::default()
    };
    let handle = ChatClient::spawn(
        transport,
        rx,
        SimulatedReceipts::new(Duration::from_millis(500), Duration::from_millis(1500)),
        options,
    );
    (handle, controller)
}

async fn wait_for(handle: &ChatHandle, pred: impl Fn(&ChatSnapshot) -> bool) -> ChatSnapshot {
    let mut rx = handle.watch();
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            {
                let current = rx.borrow_and_update();
                if pred(&current) {
                    return current.clone();
                }
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("timed out waiting for snapshot")
}

/// Connects and joins as `identity`, returning the controller with its
/// publish log cleared.
async fn joined(identity: &str) -> (ChatHandle, LoopbackController) {
    let (handle, controller) = start();
    handle.connect();
    wait_for(&handle, ChatSnapshot::is_connected).await;
    handle.join(identity);
    wait_for(&handle, ChatSnapshot::is_joined).await;
    controller.clear_published();
    (handle, controller)
}

fn participants(snapshot: &ChatSnapshot) -> Vec<&str> {
    snapshot
        .participants
        .iter()
        .map(|p| p.identity.as_str())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn join_announces_and_requests_roster() {
    let (handle, controller) = start();
    handle.connect();
    wait_for(&handle, ChatSnapshot::is_connected).await;

    handle.join("  alice ");
    let snapshot = wait_for(&handle, ChatSnapshot::is_joined).await;
    assert_eq!(snapshot.local_identity, "alice");
    assert_eq!(participants(&snapshot), vec!["alice"]);

    let announced = controller.published_to(DEFAULT_ADD_USER);
    assert_eq!(announced.len(), 1);
    assert_eq!(announced[0].kind, MessageKind::Join);
    assert_eq!(announced[0].sender, "alice");

    let requested = controller.published_to(DEFAULT_USERS);
    assert_eq!(requested.len(), 1);
    assert_eq!(requested[0].kind, MessageKind::RosterSnapshot);
}

#[tokio::test(start_paused = true)]
async fn join_before_connected_is_ignored() {
    let (tx, rx) = event_channel();
    let (transport, controller) = LoopbackTransport::manual(tx);
    let handle = ChatClient::spawn(
        transport,
        rx,
        SimulatedReceipts::default(),
        ChatOptions::default(),
    );

    handle.connect();
    wait_for(&handle, |s| s.connection == ConnectionState::Connecting).await;
    handle.join("alice");
    handle.keystroke();

    // Let the actor drain its queue.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.membership, MembershipState::NotJoined);
    assert!(controller.published().is_empty());
    assert!(!snapshot.typing);

    assert!(controller.accept());
    wait_for(&handle, ChatSnapshot::is_connected).await;
}

#[tokio::test(start_paused = true)]
async fn roster_and_presence_frames_drive_participants() {
    let (handle, controller) = joined("bob").await;

    controller.deliver(&ChatMessage::join("bob"));
    controller.deliver(&ChatMessage::roster(
        "bob",
        vec!["alice".to_string(), "bob".to_string()],
    ));
    let snapshot = wait_for(&handle, |s| s.participants.len() == 2).await;
    assert_eq!(participants(&snapshot), vec!["bob", "alice"]);

    controller.deliver(&ChatMessage::join("carol"));
    let snapshot = wait_for(&handle, |s| s.participants.len() == 3).await;
    assert_eq!(participants(&snapshot), vec!["bob", "alice", "carol"]);

    controller.deliver(&ChatMessage::leave("alice"));
    let snapshot = wait_for(&handle, |s| s.participants.len() == 2).await;
    assert_eq!(participants(&snapshot), vec!["bob", "carol"]);

    // Presence lines are shown; the roster snapshot is not.
    let kinds: Vec<MessageKind> = snapshot.messages.iter().map(|(m, _)| m.kind).collect();
    assert_eq!(
        kinds,
        vec![MessageKind::Join, MessageKind::Join, MessageKind::Leave]
    );
}

#[tokio::test(start_paused = true)]
async fn own_message_moves_through_receipts() {
    let (handle, controller) = joined("alice").await;
    let mut delivery = handle.events().delivery.subscribe();

    handle.send(" hello ");
    let sent = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(msg) = controller.published_to(DEFAULT_CHAT).pop() {
                return msg;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(sent.content, " hello ");
    assert_eq!(sent.sender, "alice");

    // Nothing is shown until the broker echoes the line back.
    assert!(handle.snapshot().messages.is_empty());
    controller.deliver(&sent);

    let snapshot = wait_for(&handle, |s| s.messages.len() == 1).await;
    assert_eq!(snapshot.messages[0].0, sent);

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let update = delivery.recv().await.unwrap();
        assert_eq!(update.timestamp, sent.timestamp);
        statuses.push(update.status);
    }
    assert_eq!(
        statuses,
        vec![
            DeliveryStatus::Sending,
            DeliveryStatus::Sent,
            DeliveryStatus::Seen
        ]
    );

    let snapshot = wait_for(&handle, |s| {
        s.messages
            .first()
            .is_some_and(|(_, status)| *status == Some(DeliveryStatus::Seen))
    })
    .await;
    assert_eq!(snapshot.messages.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn other_users_messages_carry_no_status() {
    let (handle, controller) = joined("alice").await;

    controller.deliver(&ChatMessage::chat("bob", "hi alice"));
    let snapshot = wait_for(&handle, |s| s.messages.len() == 1).await;
    assert_eq!(snapshot.messages[0].1, None);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(handle.snapshot().messages[0].1, None);
}

#[tokio::test(start_paused = true)]
async fn drop_clears_presence_and_keeps_membership() {
    let (handle, controller) = joined("alice").await;
    controller.deliver(&ChatMessage::join("bob"));
    wait_for(&handle, |s| s.participants.len() == 2).await;

    assert!(controller.drop_connection());
    let snapshot = wait_for(&handle, |s| s.connection == ConnectionState::Disconnected).await;
    assert!(snapshot.participants.is_empty());
    assert_eq!(snapshot.membership, MembershipState::Joined);
    assert_eq!(snapshot.local_identity, "alice");

    assert!(controller.accept());
    let snapshot = wait_for(&handle, ChatSnapshot::is_connected).await;
    assert!(snapshot.is_joined());

    // Still joined, so sending works without joining again.
    handle.send("back");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(controller.published_to(DEFAULT_CHAT).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn leave_discards_history_and_reconnects() {
    let (handle, controller) = joined("alice").await;
    controller.deliver(&ChatMessage::chat("bob", "one"));
    controller.deliver(&ChatMessage::chat("bob", "two"));
    wait_for(&handle, |s| s.messages.len() == 2).await;

    handle.leave();
    let snapshot = wait_for(&handle, |s| {
        s.membership == MembershipState::NotJoined && s.is_connected()
    })
    .await;
    assert!(snapshot.messages.is_empty());
    assert!(snapshot.participants.is_empty());

    let departures = controller.published_to(DEFAULT_REMOVE_USER);
    assert_eq!(departures.len(), 1);
    assert_eq!(departures[0].kind, MessageKind::Leave);
    assert_eq!(controller.disconnect_calls(), 1);
    assert_eq!(controller.connect_calls(), 2);

    // The prompt works again after leaving.
    handle.join("alicia");
    let snapshot = wait_for(&handle, ChatSnapshot::is_joined).await;
    assert_eq!(snapshot.local_identity, "alicia");
}

#[tokio::test(start_paused = true)]
async fn undecodable_frames_are_skipped() {
    let (handle, controller) = joined("alice").await;

    controller.deliver_raw("not json");
    controller.deliver_raw(r#"{"sender":"bob","type":"SHOUT","timestamp":"x"}"#);
    controller.deliver(&ChatMessage::chat("bob", "still here"));

    let snapshot = wait_for(&handle, |s| !s.messages.is_empty()).await;
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].0.content, "still here");
}

#[tokio::test(start_paused = true)]
async fn typing_indicator_expires_and_clears_on_send() {
    let (handle, _controller) = joined("alice").await;

    handle.keystroke();
    wait_for(&handle, |s| s.typing).await;

    // Keystrokes keep it alive past a single timeout.
    tokio::time::sleep(Duration::from_secs(2)).await;
    handle.keystroke();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(handle.snapshot().typing);

    wait_for(&handle, |s| !s.typing).await;

    handle.keystroke();
    wait_for(&handle, |s| s.typing).await;
    handle.send("done");
    wait_for(&handle, |s| !s.typing).await;
}
