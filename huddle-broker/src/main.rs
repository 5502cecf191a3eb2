//! `Huddle` development broker: a small STOMP-over-WebSocket server.
//!
//! Speaks the subset of STOMP 1.2 the chat client uses and answers the chat
//! application destinations (chat, add-user, remove-user, users).
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:5057, endpoint /ws
//! cargo run --bin huddle-broker
//!
//! # Run on custom address
//! cargo run --bin huddle-broker -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! HUDDLE_BROKER_ADDR=127.0.0.1:8080 cargo run --bin huddle-broker
//! ```

use std::sync::Arc;

use clap::Parser;
use huddle_broker::broker::{self, BrokerState};
use huddle_broker::config::{BrokerCliArgs, BrokerConfig};

#[tokio::main]
async fn main() {
    let cli = BrokerCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match BrokerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        heart_beat = %config.heart_beat,
        topic = %config.destinations.topic,
        "starting huddle broker"
    );

    let state = Arc::new(BrokerState::with_options(config.options()));

    match broker::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "broker listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "broker server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start broker");
            std::process::exit(1);
        }
    }
}
