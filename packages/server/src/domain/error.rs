//! Domain layer error definitions.

use thiserror::Error;

/// Errors related to Value Objects validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueObjectError {
    #[error("UserId cannot be empty")]
    UserIdEmpty,

    #[error("UserId cannot exceed {max} characters (got {actual})")]
    UserIdTooLong { max: usize, actual: usize },

    #[error("ProjectId cannot be empty")]
    ProjectIdEmpty,

    #[error("ChannelId cannot be empty")]
    ChannelIdEmpty,

    /// Identifier too long for a room key
    #[error("{field} cannot exceed {max} characters (got {actual})")]
    IdentifierTooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// Identifier contains the room key separator
    #[error("{field} cannot contain ':' (got: {value})")]
    IdentifierInvalidCharacter { field: &'static str, value: String },
}

/// Errors returned by a credential verifier
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing or unknown credential
    #[error("invalid or missing credential")]
    Unauthorized,

    /// Credential is valid but may not access the project
    #[error("access to project '{0}' is not allowed")]
    Forbidden(String),
}

/// Errors raised by a relay transport
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay publish failed: {0}")]
    Publish(String),

    #[error("relay subscribe failed: {0}")]
    Subscribe(String),

    #[error("relay frame could not be encoded or decoded: {0}")]
    Codec(#[from] serde_json::Error),
}
