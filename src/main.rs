//! OVMS adapter — entry point.
//!
//! Reads configuration from environment variables (the `config` module docs
//! carry the full table) and starts the axum-based adapter service. Startup
//! resets the backend to an empty config baseline before the listener binds.

use ovms_adapter::config::AdapterConfig;
use ovms_adapter::server::AdapterServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("ovms_adapter=info".parse().unwrap()),
        )
        .init();

    let config = AdapterConfig::from_env();
    info!(
        adapter_port = config.adapter_port,
        runtime_port = config.runtime_port,
        model_config_file = %config.model_config_file.display(),
        root_model_dir = %config.root_model_dir.display(),
        capacity_bytes = config.capacity_bytes(),
        multiplier = config.model_size_multiplier,
        "OVMS adapter configuration loaded"
    );

    if config.model_size_multiplier <= 1.0 {
        tracing::warn!(
            multiplier = config.model_size_multiplier,
            "MODEL_SIZE_MULTIPLIER should exceed 1.0 — disk size understates runtime footprint"
        );
    }

    if let Err(e) = AdapterServer::new(config).start().await {
        eprintln!("Adapter error: {e}");
        std::process::exit(1);
    }
}
