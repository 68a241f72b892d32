//! UseCase 層のエラー定義

use thiserror::Error;

use crate::domain::ValueObjectError;

/// Inbound message could not be routed. The connection stays open.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("switch_channel requires a channel_id")]
    MissingChannel,

    #[error("invalid channel: {0}")]
    InvalidChannel(#[from] ValueObjectError),

    #[error("message type '{0}' may not be sent by clients")]
    ReservedType(String),
}
