mod config;

use std::sync::Arc;

use tracing::{error, info, warn};

use tavern_api::entitlement::EntitlementClient;
use tavern_api::validator::TokenValidator;
use tavern_api::{AppState, AppStateInner};
use tavern_completion::{CompletionClient, CompletionConfig};
use tavern_db::Database;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tavern=debug,tower_http=debug".into()),
        )
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let db = Arc::new(Database::open(&config.db_path)?);
    info!("Database ready at {}", config.db_path.display());

    let mut validator = TokenValidator::new(config.token_pepper.as_bytes().to_vec());
    if config.dev_tokens {
        warn!("Development tokens are enabled");
        validator = validator.with_dev_tokens();
    }
    if let Some(url) = &config.entitlement_url {
        info!("Entitlement authority: {}", url);
        validator = validator.with_entitlement(EntitlementClient::new(url.clone()));
    }

    if config.completion_api_key.is_none() {
        warn!("OPENROUTER_API_KEY is not set; chat turns will fail");
    }
    let completion = CompletionClient::new(CompletionConfig {
        endpoint: config.completion_url.clone(),
        api_key: config.completion_api_key.clone(),
        ..CompletionConfig::default()
    });

    let state: AppState = Arc::new(AppStateInner {
        db,
        validator,
        completion,
        expose_error_details: !config.production,
    });
    let app = tavern_api::router(state);

    info!(
        "Tavern server listening on {} ({})",
        config.addr,
        if config.production { "production" } else { "development" }
    );
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = ctrl_c.await;
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("Received Ctrl+C, shutting down...");
    }
}
