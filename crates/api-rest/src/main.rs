//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's main `nwd-run` binary starts the same
//! router with the same environment.

use api_rest::{router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nwd_core::{
    constants::DEFAULT_DATA_DIR, store_kind_from_env_value, CertificationService, CoreConfig,
};

/// Main entry point for the NWD REST API server
///
/// # Environment Variables
/// - `NWD_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `NWD_DATA_DIR`: Record directory for the git store (default: "nwd_data")
/// - `NWD_LOCATION`: Location name stamped on new requests and commits
/// - `NWD_STORE`: `memory` (default) or `git`
/// - `API_KEY`: API key every protected route requires
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the store cannot be opened,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("nwd_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("NWD_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    tracing::info!("-- Starting NWD REST API on {}", addr);

    let data_dir = std::env::var("NWD_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into());
    let location = std::env::var("NWD_LOCATION")
        .map_err(|_| anyhow::anyhow!("NWD_LOCATION must be set"))?;
    let store_kind = store_kind_from_env_value(std::env::var("NWD_STORE").ok())?;
    let api_key = api_shared::auth::api_key_from_env()?;

    let cfg = Arc::new(CoreConfig::new(PathBuf::from(data_dir), &location)?);
    let service = CertificationService::open(cfg, store_kind)?;

    let app = router(AppState::new(service, api_key));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
