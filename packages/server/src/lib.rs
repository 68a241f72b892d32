//! Roomcast broadcast server.
//!
//! Accepts authenticated WebSocket connections, groups them into rooms and
//! fans messages out to every member through bounded per-connection queues,
//! with optional batching of low-value traffic and an optional relay that
//! carries broadcasts to other server processes.

pub mod config;
pub mod domain;
pub mod error;
pub mod hub;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

// Re-export entry points
pub use config::ServerConfig;
pub use error::ServerError;
pub use ui::run as run_server;
