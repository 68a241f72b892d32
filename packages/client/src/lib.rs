//! Roomcast client.
//!
//! A reconnecting WebSocket client: [`manager::ConnectionManager`] is the
//! lifecycle state machine (connect, backoff, outbound queueing, teardown)
//! and [`runtime::Client`] drives it over real sockets and timers.

pub mod backoff;
pub mod config;
pub mod error;
pub mod input;
pub mod manager;
pub mod runtime;
pub mod state;
pub mod target;

pub use backoff::{Backoff, BackoffConfig};
pub use config::ClientConfig;
pub use error::ClientError;
pub use runtime::{Client, ClientEvent, ClientHandle};
pub use state::ConnectionState;
pub use target::ConnectTarget;
