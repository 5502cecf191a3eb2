//! `Huddle`: presence-aware real-time chat client library.

pub mod app;
pub mod chat;
pub mod config;
pub mod transport;
pub mod ui;
