//! Collaboration hub entry point
//!
//! Run with:
//! ```bash
//! cargo run -p collab-hub
//! ```
//!
//! Configuration is loaded from environment variables.

use collab_common::{try_init_tracing_with_config, AppConfig, TracingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Hub stopped with an error");
        eprintln!("collab-hub: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        name = %config.app.name,
        env = ?config.app.env,
        address = %config.server.address(),
        heartbeat_interval_ms = config.hub.heartbeat_interval_ms,
        idle_timeout_ms = config.hub.idle_timeout_ms,
        "Configuration loaded"
    );

    collab_hub::run(config).await?;

    Ok(())
}
