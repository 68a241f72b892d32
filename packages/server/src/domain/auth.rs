//! Credential verification boundary.

use async_trait::async_trait;

use super::{entity::Identity, error::AuthError, value_object::ProjectId};

/// Turns the access credential presented on the socket URL into an identity.
///
/// Token issuance and validation belong to an external service; the server
/// only consumes the verdict.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, token: &str, project: &ProjectId) -> Result<Identity, AuthError>;
}
