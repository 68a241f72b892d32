//! UseCase 層
//!
//! WebSocket ハンドラから呼び出され、Hub を操作します。

pub mod connect;
pub mod disconnect;
pub mod error;
pub mod route_message;

pub use connect::ConnectUseCase;
pub use disconnect::DisconnectUseCase;
pub use error::RouteError;
pub use route_message::{RouteMessageUseCase, Routed};
