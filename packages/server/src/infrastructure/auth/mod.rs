//! Credential verifiers.

pub mod static_token;

pub use static_token::{StaticTokenVerifier, TokenGrant};
