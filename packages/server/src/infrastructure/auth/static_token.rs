//! Verifier backed by a fixed token table.
//!
//! Stands in for the external token service: each configured token maps to
//! one identity, and an optional allow-list restricts which projects may be
//! opened.

use std::{collections::HashMap, collections::HashSet, str::FromStr};

use async_trait::async_trait;

use crate::domain::{AuthError, CredentialVerifier, Identity, ProjectId, UserId, ValueObjectError};

/// One `token=user_id[:display name]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub token: String,
    pub identity: Identity,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenGrantParseError {
    #[error("expected <token>=<user_id>[:<display name>], got '{0}'")]
    Format(String),

    #[error(transparent)]
    InvalidUser(#[from] ValueObjectError),
}

impl FromStr for TokenGrant {
    type Err = TokenGrantParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (token, user) = s
            .split_once('=')
            .filter(|(token, user)| !token.is_empty() && !user.is_empty())
            .ok_or_else(|| TokenGrantParseError::Format(s.to_string()))?;
        let (user_id, display_name) = match user.split_once(':') {
            Some((id, name)) if !name.is_empty() => (id, Some(name.to_string())),
            Some((id, _)) => (id, None),
            None => (user, None),
        };
        Ok(Self {
            token: token.to_string(),
            identity: Identity::new(UserId::new(user_id.to_string())?, display_name),
        })
    }
}

/// Token table verifier.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    grants: HashMap<String, Identity>,
    /// Empty means every project is allowed.
    allowed_projects: HashSet<String>,
}

impl StaticTokenVerifier {
    pub fn new(grants: impl IntoIterator<Item = TokenGrant>) -> Self {
        Self {
            grants: grants
                .into_iter()
                .map(|grant| (grant.token, grant.identity))
                .collect(),
            allowed_projects: HashSet::new(),
        }
    }

    pub fn with_allowed_projects(mut self, projects: impl IntoIterator<Item = String>) -> Self {
        self.allowed_projects = projects.into_iter().collect();
        self
    }
}

#[async_trait]
impl CredentialVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str, project: &ProjectId) -> Result<Identity, AuthError> {
        let identity = self.grants.get(token).ok_or(AuthError::Unauthorized)?;
        if !self.allowed_projects.is_empty() && !self.allowed_projects.contains(project.as_str()) {
            return Err(AuthError::Forbidden(project.to_string()));
        }
        Ok(identity.clone())
    }
}
