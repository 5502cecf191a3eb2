// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! Integration tests for two chat clients talking through the in-process
//! development broker over real WebSockets.
//!
//! These tests validate:
//! - both clients converge on the same participant list after joining
//! - a chat line reaches the other client and the author's own copy is
//!   marked seen
//! - leaving is announced and the leaver starts over at the prompt
//! - shutting down a joined client is announced to the others

use std::sync::Arc;
use std::time::Duration;

use huddle::chat::client::{ChatClient, ChatHandle};
use huddle::chat::delivery::SimulatedReceipts;
use huddle::chat::session::MembershipState;
use huddle::chat::stream::DeliveryStatus;
use huddle::chat::{ChatOptions, ChatSnapshot};
use huddle::transport::event_channel;
use huddle::transport::stomp::{StompConfig, StompTransport};
use huddle_broker::broker::{self, BrokerState};
use huddle_proto::destination::DEFAULT_TOPIC;
use huddle_proto::message::MessageKind;

/// Helper: start a broker and return its ws:// URL and shared state.
async fn start_broker() -> (String, Arc<BrokerState>) {
    let state = Arc::new(BrokerState::new());
    let (addr, _handle) = broker::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    (format!("ws://{addr}/ws"), state)
}

/// Helper: spawn a connected chat client against `url`.
async fn start_client(url: &str) -> ChatHandle {
    let mut config = StompConfig::new(url, DEFAULT_TOPIC);
    config.reconnect_delay = Duration::from_millis(100);
    config.connect_timeout = Duration::from_secs(2);

    let (tx, rx) = event_channel();
    let transport = StompTransport::new(config, tx);
    let receipts = SimulatedReceipts::new(Duration::from_millis(50), Duration::from_millis(150));
    let handle = ChatClient::spawn(transport, rx, receipts, ChatOptions::default());
    handle.connect();
    wait_for(&handle, ChatSnapshot::is_connected).await;
    handle
}

async fn wait_for(handle: &ChatHandle, pred: impl Fn(&ChatSnapshot) -> bool) -> ChatSnapshot {
    let mut rx = handle.watch();
    tokio::time::timeout(Duration::from_secs(5), async {
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

fn participants(snapshot: &ChatSnapshot) -> Vec<&str> {
    snapshot
        .participants
        .iter()
        .map(|p| p.identity.as_str())
        .collect()
}

fn has_line(snapshot: &ChatSnapshot, kind: MessageKind, sender: &str) -> bool {
    snapshot
        .messages
        .iter()
        .any(|(m, _)| m.kind == kind && m.sender == sender)
}

/// Bob joins first, then Alice. Both end up seeing each other.
async fn bob_then_alice(url: &str) -> (ChatHandle, ChatHandle) {
    let bob = start_client(url).await;
    bob.join("bob");
    wait_for(&bob, |s| has_line(s, MessageKind::Join, "bob")).await;

    let alice = start_client(url).await;
    alice.join("alice");
    wait_for(&alice, |s| s.participants.len() == 2).await;
    wait_for(&bob, |s| s.participants.len() == 2).await;
    (bob, alice)
}

#[tokio::test]
async fn participants_converge_after_join() {
    let (url, state) = start_broker().await;
    let (bob, alice) = bob_then_alice(&url).await;

    assert_eq!(participants(&alice.snapshot()), vec!["alice", "bob"]);
    assert_eq!(participants(&bob.snapshot()), vec!["bob", "alice"]);
    assert_eq!(state.roster().await, vec!["bob", "alice"]);

    // Bob saw Alice arrive; Alice only sees lines from after she joined.
    assert!(has_line(&bob.snapshot(), MessageKind::Join, "alice"));
    assert!(!has_line(&alice.snapshot(), MessageKind::Join, "bob"));
}

#[tokio::test]
async fn chat_line_reaches_peer_and_is_seen() {
    let (url, _state) = start_broker().await;
    let (bob, alice) = bob_then_alice(&url).await;

    alice.send("hello bob");

    let snapshot = wait_for(&bob, |s| {
        s.messages
            .iter()
            .any(|(m, _)| m.kind == MessageKind::Chat && m.content == "hello bob")
    })
    .await;
    let (line, status) = snapshot
        .messages
        .iter()
        .find(|(m, _)| m.kind == MessageKind::Chat)
        .unwrap();
    assert_eq!(line.sender, "alice");
    assert_eq!(*status, None);

    let snapshot = wait_for(&alice, |s| {
        s.messages
            .iter()
            .any(|(m, status)| m.content == "hello bob" && *status == Some(DeliveryStatus::Seen))
    })
    .await;
    let own = snapshot
        .messages
        .iter()
        .filter(|(m, _)| m.kind == MessageKind::Chat)
        .count();
    assert_eq!(own, 1);
}

#[tokio::test]
async fn leave_is_announced_and_leaver_starts_over() {
    let (url, state) = start_broker().await;
    let (bob, alice) = bob_then_alice(&url).await;

    alice.leave();

    let snapshot = wait_for(&bob, |s| s.participants.len() == 1).await;
    assert_eq!(participants(&snapshot), vec!["bob"]);
    assert!(has_line(&snapshot, MessageKind::Leave, "alice"));

    let snapshot = wait_for(&alice, |s| {
        s.membership == MembershipState::NotJoined && s.is_connected()
    })
    .await;
    assert!(snapshot.messages.is_empty());
    assert_eq!(state.roster().await, vec!["bob"]);

    // Alice can come back under a new name.
    alice.join("alicia");
    let snapshot = wait_for(&bob, |s| s.participants.len() == 2).await;
    assert_eq!(participants(&snapshot), vec!["bob", "alicia"]);
}

#[tokio::test]
async fn shutdown_of_joined_client_is_announced() {
    let (url, state) = start_broker().await;
    let (bob, alice) = bob_then_alice(&url).await;

    alice.shutdown().await;
    assert!(!alice.is_running());

    let snapshot = wait_for(&bob, |s| s.participants.len() == 1).await;
    assert!(has_line(&snapshot, MessageKind::Leave, "alice"));
    assert_eq!(state.roster().await, vec!["bob"]);
}
