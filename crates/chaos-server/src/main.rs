//! Server binary for the Chaos game-state backend.
//!
//! Wires configuration, the entity store, the workflow services, and the
//! HTTP API together, then serves until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `chaos-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Open the configured entity store, running migrations for `PostgreSQL`
//! 4. Build the workflow services
//! 5. Seed demo data when enabled
//! 6. Serve the HTTP API

mod error;

use std::path::Path;
use std::sync::Arc;

use chaos_api::AppState;
use chaos_core::config::LoggingConfig;
use chaos_core::{Backend, ChaosConfig, StorageBackend};
use chaos_db::{MemoryStore, PostgresConfig, PostgresPool, Stores};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::ServerError;

const CONFIG_PATH: &str = "chaos-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any startup step fails or the server stops with a
/// fatal error.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    run().await?;
    Ok(())
}

async fn run() -> Result<(), ServerError> {
    // 1. Load configuration.
    let config = ChaosConfig::load_or_default(Path::new(CONFIG_PATH))?;
    config.validate()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!(
        host = config.server.host,
        port = config.server.port,
        storage = ?config.storage.backend,
        seed = config.seed.enabled,
        "chaos-server starting"
    );

    // 3. Open the entity store.
    let (stores, pool) = match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory store; state is lost on restart");
            (Stores::from_backend(Arc::new(MemoryStore::new())), None)
        }
        StorageBackend::Postgres => {
            let pool = PostgresPool::open(&PostgresConfig::new(
                &config.storage.postgres_url,
                config.storage.max_connections,
            ))
            .await?;
            (Stores::from_backend(Arc::new(pool.store())), Some(pool))
        }
    };

    // 4. Build the workflow services.
    let backend = Backend::from_auth_config(stores, &config.auth)?;

    // 5. Seed demo data.
    if config.seed.enabled {
        let summary = chaos_core::seed::seed(&backend).await?;
        info!(
            created_users = summary.created_users.len(),
            demo_data = summary.demo_data,
            "Seeding complete"
        );
    }

    // 6. Serve.
    let state = Arc::new(AppState::new(backend, config.pagination));
    let served = chaos_api::start_server(&config.server, state).await;

    if let Some(pool) = pool {
        pool.close().await;
    }
    served?;

    info!("chaos-server stopped");
    Ok(())
}

/// `RUST_LOG` wins over the configured level when set.
fn init_logging(logging: &LoggingConfig) -> Result<(), ServerError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level).map_err(|e| ServerError::Logging {
            message: format!("invalid level {:?}: {e}", logging.level),
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
