//! Client configuration from command-line flags and environment variables.

use std::time::Duration;

use clap::Parser;

use crate::{backoff::BackoffConfig, error::ClientError, target::ConnectTarget};

/// Roomcast CLI chat client
#[derive(Parser, Debug, Clone)]
#[command(name = "roomcast-client", version, about = "Roomcast CLI chat client")]
pub struct ClientConfig {
    /// WebSocket endpoint of the server
    #[arg(long, env = "ROOMCAST_URL", default_value = "ws://127.0.0.1:8080/ws")]
    pub url: String,

    /// Project to join
    #[arg(long, env = "ROOMCAST_PROJECT_ID")]
    pub project_id: String,

    /// Credential sent as the `token` query parameter
    #[arg(long, env = "ROOMCAST_TOKEN")]
    pub token: String,

    /// Channel to join inside the project
    #[arg(long, env = "ROOMCAST_CHANNEL_ID")]
    pub channel_id: Option<String>,

    /// Delay before the first reconnect attempt
    #[arg(long, env = "ROOMCAST_INITIAL_DELAY_MS", default_value_t = 1000)]
    pub initial_delay_ms: u64,

    /// Growth factor of the reconnect delay per failed attempt
    #[arg(long, env = "ROOMCAST_DECAY", default_value_t = 1.5)]
    pub decay: f64,

    /// Upper bound of the reconnect delay before jitter
    #[arg(long, env = "ROOMCAST_MAX_DELAY_MS", default_value_t = 30_000)]
    pub max_delay_ms: u64,

    /// Jitter fraction applied to each reconnect delay
    #[arg(long, env = "ROOMCAST_JITTER", default_value_t = 0.2)]
    pub jitter: f64,
}

impl ClientConfig {
    pub fn target(&self) -> Result<ConnectTarget, ClientError> {
        ConnectTarget::new(
            &self.url,
            self.project_id.clone(),
            self.token.clone(),
            self.channel_id.clone(),
        )
    }

    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            decay: self.decay.max(1.0),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter.clamp(0.0, 1.0),
        }
    }
}
