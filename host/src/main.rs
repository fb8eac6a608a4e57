use anyhow::{Context, Result};
use smarthttp::config::{load_config, SmartHttpConfig};
use smarthttp::http::ReqwestCapability;
use smarthttp::retry::Timing;
use smarthttp::CredentialStore;
use smarthttp_host::api::{create_router, ApiState};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smarthttp=info,smarthttp_host=info".into()),
        )
        .init();

    info!("SmartHttp host starting...");

    // Read configuration from environment
    let encryption_key = std::env::var("SMARTHTTP_ENCRYPTION_KEY")
        .context("SMARTHTTP_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;

    let credentials_db = std::env::var("SMARTHTTP_CREDENTIALS_DB")
        .unwrap_or_else(|_| "credentials.db".to_string());

    let api_port: u16 = std::env::var("SMARTHTTP_API_PORT")
        .unwrap_or_else(|_| "3002".to_string())
        .parse()
        .context("SMARTHTTP_API_PORT must be a valid port number")?;

    let config = match std::env::var("SMARTHTTP_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading configuration file");
            load_config(&path)?.with_env_overrides()?
        }
        Err(_) => SmartHttpConfig::from_env()?,
    };

    info!(
        credentials_db = %credentials_db,
        api_port = api_port,
        credential_name = %config.node.credential_name,
        max_retries = config.retry.max_retries,
        continue_on_fail = config.node.continue_on_fail,
        "Configuration loaded"
    );

    let credential_store = Arc::new(
        CredentialStore::new(&credentials_db, &encryption_key)
            .context("Failed to initialize credential store")?,
    );
    info!("Credential store initialized");

    // Start HTTP API server
    let api_state = ApiState {
        credential_store,
        http: Arc::new(ReqwestCapability::new()),
        config: Arc::new(config),
        timing: Timing::system(),
    };
    let router = create_router(api_state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", api_port))
        .await
        .context("Failed to bind host API port")?;
    info!(port = api_port, "Host API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Host API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("SmartHttp host stopped");

    Ok(())
}
