//! Server startup and lifecycle.

use std::{future::Future, sync::Arc};

use tokio::net::TcpListener;

use super::{router, signal::shutdown_signal, state::AppState};
use crate::{
    config::ServerConfig,
    domain::Relay,
    error::ServerError,
    hub::{Hub, spawn_relay_subscriber},
    infrastructure::relay::NoopRelay,
};

/// Build the shared state described by `config`.
pub fn build_state(config: &ServerConfig) -> Arc<AppState> {
    let peers = config.peer_relay();
    let relay: Arc<dyn Relay> = match &peers {
        Some(peers) => peers.clone(),
        None => Arc::new(NoopRelay),
    };
    Arc::new(AppState {
        hub: Arc::new(Hub::new(relay)),
        verifier: config.verifier(),
        delivery: config.delivery_config(),
        peers,
    })
}

/// Bind the configured address and serve until Ctrl-C or SIGTERM.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let addr = config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!(
        relay = ?config.relay,
        peers = config.relay_peers.len(),
        tokens = config.tokens.len(),
        "Listening on ws://{}/ws",
        addr
    );

    serve(listener, build_state(&config), shutdown_signal()).await
}

/// Serve `state` on an already bound listener until `shutdown` resolves.
///
/// The relay subscriber lives exactly as long as the server.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let subscriber = spawn_relay_subscriber(state.hub.clone());
    let app = router(state);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerError::Serve);

    if let Some(handle) = subscriber {
        handle.abort();
    }
    tracing::info!("Server stopped");
    result
}
