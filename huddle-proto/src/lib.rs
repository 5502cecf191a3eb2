//! Shared protocol definitions for the `Huddle` wire format.

pub mod codec;
pub mod destination;
pub mod message;
pub mod stomp;
