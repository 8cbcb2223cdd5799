use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use nwd_core::{
    CertificationService, CoreConfig, constants::DEFAULT_DATA_DIR, store_kind_from_env_value,
};

/// Main entry point for the NWD application
///
/// Resolves configuration from the environment once, opens the configured store and serves the
/// REST API until interrupted.
///
/// # Environment Variables
/// - `NWD_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `NWD_DATA_DIR`: Record directory for the git store (default: "nwd_data")
/// - `NWD_LOCATION`: Location name stamped on new requests and commits (required)
/// - `NWD_STORE`: `memory` (default) or `git`
/// - `API_KEY`: API key for every route except `/health` and the OpenAPI document
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, store startup or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nwd_run=info".parse()?)
                .add_directive("nwd_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("NWD_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let data_dir = std::env::var("NWD_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into());
    let location = std::env::var("NWD_LOCATION")
        .map_err(|_| anyhow::anyhow!("NWD_LOCATION must be set"))?;
    let store_kind = store_kind_from_env_value(std::env::var("NWD_STORE").ok())?;
    let api_key = api_shared::auth::api_key_from_env()?;

    let cfg = Arc::new(CoreConfig::new(PathBuf::from(&data_dir), &location)?);
    let service = CertificationService::open(cfg, store_kind)?;

    tracing::info!(
        "++ Starting NWD REST on {} ({:?} store, location {})",
        rest_addr,
        store_kind,
        location
    );

    let app = router(AppState::new(service, api_key));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("-- Shutting down NWD REST");
        })
        .await?;

    Ok(())
}
