//! Shared building blocks for Roomcast.
//!
//! Both the server and the client speak the same JSON wire protocol, log the
//! same way and stamp times the same way; those pieces live here.

pub mod logger;
pub mod protocol;
pub mod time;

pub use protocol::{Message, ProtocolError, close_code, kind};
