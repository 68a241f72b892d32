//! Server configuration from command-line flags and environment variables.

use std::{sync::Arc, time::Duration};

use clap::{Parser, ValueEnum};
use url::Url;

use crate::{
    domain::CredentialVerifier,
    hub::{BatchConfig, DeliveryConfig},
    infrastructure::{
        auth::{StaticTokenVerifier, TokenGrant},
        relay::PeerRelay,
    },
};

/// Cross-process relay transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RelayKind {
    /// Local delivery only
    #[default]
    None,
    /// WebSocket links to the other servers' /relay endpoints
    Peer,
}

/// Roomcast broadcast server
#[derive(Parser, Debug, Clone)]
#[command(name = "roomcast-server", version, about = "Roomcast room broadcast server")]
pub struct ServerConfig {
    /// Bind address
    #[arg(long, env = "ROOMCAST_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "ROOMCAST_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Per-connection outbound queue capacity; messages beyond it are dropped
    #[arg(long, env = "ROOMCAST_OUTBOUND_CAPACITY", default_value_t = 256)]
    pub outbound_capacity: usize,

    /// Buffered messages that trigger an immediate batch flush (0 disables batching)
    #[arg(long, env = "ROOMCAST_MAX_BATCH_SIZE", default_value_t = 10)]
    pub max_batch_size: usize,

    /// Time after the first buffered message that triggers a flush
    #[arg(long, env = "ROOMCAST_BATCH_INTERVAL_MS", default_value_t = 50)]
    pub batch_interval_ms: u64,

    /// Message types delivered through the batching buffer
    #[arg(
        long,
        env = "ROOMCAST_BATCHED_TYPES",
        value_delimiter = ',',
        default_value = "presence,typing"
    )]
    pub batched_types: Vec<String>,

    /// Accepted credential as <token>=<user_id>[:<display name>]
    #[arg(long = "token", env = "ROOMCAST_TOKENS", value_delimiter = ',')]
    pub tokens: Vec<TokenGrant>,

    /// Project that may be opened; when none are given every project is allowed
    #[arg(long = "allowed-project", env = "ROOMCAST_ALLOWED_PROJECTS", value_delimiter = ',')]
    pub allowed_projects: Vec<String>,

    /// Cross-process relay transport
    #[arg(long, env = "ROOMCAST_RELAY", value_enum, default_value_t = RelayKind::None)]
    pub relay: RelayKind,

    /// Relay endpoint of another server, e.g. ws://10.0.0.2:8080/relay
    #[arg(long = "relay-peer", env = "ROOMCAST_RELAY_PEERS", value_delimiter = ',')]
    pub relay_peers: Vec<Url>,

    /// Shared secret peers present when attaching to /relay
    #[arg(long, env = "ROOMCAST_RELAY_SECRET", hide_env_values = true)]
    pub relay_secret: Option<String>,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn delivery_config(&self) -> DeliveryConfig {
        let batching = (self.max_batch_size > 0).then(|| BatchConfig {
            max_batch_size: self.max_batch_size,
            interval: Duration::from_millis(self.batch_interval_ms),
        });
        DeliveryConfig {
            outbound_capacity: self.outbound_capacity.max(1),
            batching,
            batched_types: self
                .batched_types
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    pub fn verifier(&self) -> Arc<dyn CredentialVerifier> {
        Arc::new(
            StaticTokenVerifier::new(self.tokens.iter().cloned())
                .with_allowed_projects(self.allowed_projects.iter().cloned()),
        )
    }

    /// Start the peer relay when one is configured. Needs a Tokio runtime.
    pub fn peer_relay(&self) -> Option<Arc<PeerRelay>> {
        match self.relay {
            RelayKind::None => None,
            RelayKind::Peer => Some(Arc::new(PeerRelay::start(
                self.relay_peers.iter().cloned(),
                self.relay_secret.clone(),
            ))),
        }
    }
}
