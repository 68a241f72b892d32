//! Server state and connection parameters.

use std::sync::Arc;

use serde::Deserialize;

use crate::{
    domain::CredentialVerifier,
    hub::{DeliveryConfig, Hub},
    infrastructure::relay::PeerRelay,
};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub project_id: Option<String>,
    pub token: Option<String>,
    pub channel_id: Option<String>,
}

/// Query parameters a relay peer attaches with
#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    pub secret: Option<String>,
}

/// Shared application state
pub struct AppState {
    /// Room registry and broadcast engine
    pub hub: Arc<Hub>,
    /// Resolves the socket credential into an identity
    pub verifier: Arc<dyn CredentialVerifier>,
    /// Per-connection delivery settings
    pub delivery: DeliveryConfig,
    /// Peer relay accepting frames on `/relay`; `None` when relaying is off
    pub peers: Option<Arc<PeerRelay>>,
}
