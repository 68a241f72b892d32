//! Client error definitions.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("server URL must use ws or wss, got '{0}'")]
    UnsupportedScheme(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("input error: {0}")]
    Input(#[from] rustyline::error::ReadlineError),

    /// The connection driver has shut down
    #[error("client is shut down")]
    Closed,
}
