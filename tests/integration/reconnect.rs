// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! Integration tests for fixed-delay reconnection against the development
//! broker.
//!
//! To simulate a drop the broker sends a WebSocket Close to every session
//! (`BrokerState::close_all_sessions`); aborting the server task alone would
//! leave established sockets running.
//!
//! These tests validate:
//! - a client started before the broker connects once the broker is up
//! - a dropped joined client comes back on its own and stays joined
//! - presence is cleared on the drop and the broker forgets the roster
//! - messages sent after the reconnect still reach other clients

use std::sync::Arc;
use std::time::{Duration, Instant};

use huddle::chat::client::{ChatClient, ChatHandle};
use huddle::chat::delivery::SimulatedReceipts;
use huddle::chat::session::{ConnectionState, MembershipState};
use huddle::chat::{ChatOptions, ChatSnapshot};
use huddle::transport::event_channel;
use huddle::transport::stomp::{StompConfig, StompTransport};
use huddle_broker::broker::{self, BrokerState};
use huddle_proto::destination::DEFAULT_TOPIC;
use huddle_proto::message::MessageKind;

const RECONNECT_DELAY: Duration = Duration::from_millis(200);

fn spawn_client(url: &str) -> ChatHandle {
    let mut config = StompConfig::new(url, DEFAULT_TOPIC);
    config.reconnect_delay = RECONNECT_DELAY;
    config.connect_timeout = Duration::from_secs(2);

    let (tx, rx) = event_channel();
    let transport = StompTransport::new(config, tx);
    ChatClient::spawn(
        transport,
        rx,
        SimulatedReceipts::default(),
        ChatOptions::default(),
    )
}

async fn wait_for(handle: &ChatHandle, pred: impl Fn(&ChatSnapshot) -> bool) -> ChatSnapshot {
    let mut rx = handle.watch();
    tokio::time::timeout(Duration::from_secs(10), async {
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

/// Reserve a free local port, then release it for the broker to bind later.
async fn free_addr() -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn connects_once_broker_comes_up() {
    let addr = free_addr().await;
    let url = format!("ws://{addr}/ws");

    let alice = spawn_client(&url);
    alice.connect();

    // The first attempt fails and the client waits to retry.
    wait_for(&alice, |s| s.connection == ConnectionState::Disconnected).await;

    let state = Arc::new(BrokerState::new());
    let (_bound, _handle) = broker::start_server_with_state(&addr.to_string(), state)
        .await
        .unwrap();

    wait_for(&alice, ChatSnapshot::is_connected).await;
}

#[tokio::test]
async fn dropped_client_reconnects_and_stays_joined() {
    let state = Arc::new(BrokerState::new());
    let (addr, _handle) = broker::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    let url = format!("ws://{addr}/ws");

    let alice = spawn_client(&url);
    alice.connect();
    wait_for(&alice, ChatSnapshot::is_connected).await;
    alice.join("alice");
    wait_for(&alice, |s| s.is_joined() && !s.messages.is_empty()).await;

    let dropped_at = Instant::now();
    state.close_all_sessions().await;

    let snapshot = wait_for(&alice, |s| s.connection != ConnectionState::Connected).await;
    assert_eq!(snapshot.membership, MembershipState::Joined);
    assert!(snapshot.participants.is_empty());

    let snapshot = wait_for(&alice, ChatSnapshot::is_connected).await;
    assert!(dropped_at.elapsed() >= RECONNECT_DELAY);
    assert_eq!(snapshot.local_identity, "alice");
    assert!(snapshot.is_joined());

    // History survives the drop.
    assert!(
        snapshot
            .messages
            .iter()
            .any(|(m, _)| m.kind == MessageKind::Join && m.sender == "alice")
    );
}

#[tokio::test]
async fn chat_resumes_after_everyone_drops() {
    let state = Arc::new(BrokerState::new());
    let (addr, _handle) = broker::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    let url = format!("ws://{addr}/ws");

    let bob = spawn_client(&url);
    bob.connect();
    wait_for(&bob, ChatSnapshot::is_connected).await;
    bob.join("bob");
    wait_for(&bob, |s| !s.messages.is_empty()).await;

    let alice = spawn_client(&url);
    alice.connect();
    wait_for(&alice, ChatSnapshot::is_connected).await;
    alice.join("alice");
    wait_for(&bob, |s| s.participants.len() == 2).await;

    state.close_all_sessions().await;

    // Both sockets are closed; each client reconnects on its own. Nobody
    // announces again, so presence stays empty afterwards.
    let back = |s: &ChatSnapshot| s.is_connected() && s.participants.is_empty();
    wait_for(&alice, back).await;
    wait_for(&bob, back).await;
    assert!(state.roster().await.is_empty());
    // Let the broker register Bob's new subscription.
    tokio::time::sleep(Duration::from_millis(100)).await;

    alice.send("still here");
    let snapshot = wait_for(&bob, |s| {
        s.messages.iter().any(|(m, _)| m.content == "still here")
    })
    .await;
    assert!(snapshot.is_joined());
}
