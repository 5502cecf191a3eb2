//! `Huddle` development broker library.
//!
//! Exposes the STOMP broker for use in tests and embedding. The broker
//! accepts WebSocket connections, tracks topic subscriptions and the joined
//! roster, and answers the chat application destinations.

pub mod broker;
pub mod config;
