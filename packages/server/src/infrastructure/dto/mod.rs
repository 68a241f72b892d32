//! Data transfer objects for HTTP and WebSocket responses.

pub mod http;
pub mod websocket;
