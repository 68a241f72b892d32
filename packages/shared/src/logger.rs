//! Logger setup shared by the binaries.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `<crate>=<default_level>` is used for the
/// calling binary together with `tower_http=debug`.
pub fn setup_logger(bin_name: &str, default_level: &str) {
    let crate_name = bin_name.replace('-', "_");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("{crate_name}={default_level},roomcast_server={default_level},roomcast_client={default_level},tower_http=debug")
            .into()
    });

    // A second call (e.g. from several tests) must not panic.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
