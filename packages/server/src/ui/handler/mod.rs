//! Handler modules for HTTP and WebSocket endpoints.

pub mod http;
pub mod relay;
pub mod websocket;

pub use http::{health_check, list_rooms};
pub use relay::relay_handler;
pub use websocket::websocket_handler;
