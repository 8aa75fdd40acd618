//! Exambase Platform Server
//!
//! Serves the principal provisioning APIs:
//! - `/api/principals` - create, bulk create, update, delete, consistency report
//! - `/health` - liveness
//!
//! Configuration is read from `config.toml` (or `EXAMBASE_CONFIG`) and
//! `EXAMBASE_*` environment variables, see the `eb-config` crate.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `EXAMBASE_HTTP_PORT` | `8080` | HTTP API port |
//! | `EXAMBASE_MONGODB_URI` | `mongodb://localhost:27017` | MongoDB connection URL |
//! | `EXAMBASE_IDENTITY_PROVIDER` | `keycloak` | `keycloak` or `memory` |
//! | `EXAMBASE_PROFILE_STORE` | `mongodb` | `mongodb` or `memory` |
//! | `LOG_FORMAT` | `text` | `json` for structured output |
//! | `RUST_LOG` | `info` | Log level |

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{http::HeaderValue, response::Json, routing::get, Router};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use eb_config::{AppConfig, ConfigLoader};
use eb_platform::{
    initialize_indexes, principals_router, IdentityDirectory, InMemoryDirectory, InMemoryProfileStore,
    KeycloakConfig, KeycloakDirectory, MongoProfileRepository, ProfileStore, ProvisioningService,
    ProvisioningSettings, ProvisioningState,
};

#[tokio::main]
async fn main() -> Result<()> {
    eb_common::logging::init_logging("eb-platform-server");

    info!("Starting Exambase Platform Server");

    let config = ConfigLoader::new().load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    if config.dev_mode {
        warn!("Development mode enabled");
    }

    let identity = build_identity_directory(&config)?;
    let profiles = build_profile_store(&config).await?;

    let service = Arc::new(ProvisioningService::new(
        identity,
        profiles,
        ProvisioningSettings {
            min_secret_length: config.provisioning.min_secret_length,
        },
    ));
    let state = ProvisioningState::new(service, config.provisioning.max_batch_size);

    let app = Router::new()
        .route("/health", get(health_handler))
        .nest("/api/principals", principals_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.http.cors_origins));

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("API server listening on http://{}", addr);
    info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Exambase Platform Server shutdown complete");
    Ok(())
}

fn build_identity_directory(config: &AppConfig) -> Result<Arc<dyn IdentityDirectory>> {
    match config.identity.provider.as_str() {
        "memory" => {
            warn!("Using in-memory identity directory, accounts are lost on restart");
            Ok(Arc::new(InMemoryDirectory::with_min_secret_length(
                config.provisioning.min_secret_length,
            )))
        }
        _ => {
            let kc = &config.identity.keycloak;
            info!(server_url = %kc.server_url, realm = %kc.realm, "Using Keycloak identity directory");
            let directory = KeycloakDirectory::new(
                KeycloakConfig::new(&kc.server_url, &kc.realm)
                    .with_client_credentials(&kc.client_id, &kc.client_secret)
                    .with_timeout_secs(kc.timeout_secs),
            )?;
            Ok(Arc::new(directory))
        }
    }
}

async fn build_profile_store(config: &AppConfig) -> Result<Arc<dyn ProfileStore>> {
    match config.profile_store.backend.as_str() {
        "memory" => {
            warn!("Using in-memory profile store, profiles are lost on restart");
            Ok(Arc::new(InMemoryProfileStore::new()))
        }
        _ => {
            info!("Connecting to MongoDB: {}/{}", config.mongodb.uri, config.mongodb.database);
            let client = mongodb::Client::with_uri_str(&config.mongodb.uri).await?;
            let db = client.database(&config.mongodb.database);

            if config.profile_store.ensure_indexes {
                initialize_indexes(&db).await.context("Failed to create indexes")?;
            }

            Ok(Arc::new(MongoProfileRepository::new(&db)))
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new().allow_origin(allowed).allow_methods(Any).allow_headers(Any)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received...");
}
