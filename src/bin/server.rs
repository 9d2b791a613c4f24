//! Shopkeep Table Server
//!
//! A small key-value table server that speaks the subset of the PostgREST
//! dialect Shopkeep clients use to mirror their slots.
//!
//! # Configuration
//!
//! Environment variables:
//! - `SHOPKEEP_SERVER_PORT`: Port to listen on (default: 8080)
//! - `SHOPKEEP_SERVER_DB`: SQLite database file (default: ~/.local/share/shopkeep-server/kv.db)
//! - `SHOPKEEP_SERVER_CONFIG`: Path to config file (default: ~/.config/shopkeep-server/config.yaml)
//! - `SHOPKEEP_SERVER_TABLE`: Table name to serve (default: kv_store)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     name: "front-till"
//! ```
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /rest/v1/{table}?select=value&key=eq.{key}`: Point select (auth required)
//! - `POST /rest/v1/{table}?on_conflict=key`: Upsert rows (auth required)

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shopkeep::server::{router, ApiKeyStore, AppState, KvStore, ServerConfig};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shopkeep=info,shopkeep_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = ServerConfig::from_env();

    tracing::info!("Database: {}", config.db_path.display());
    tracing::info!("Config file: {}", config.config_path.display());
    tracing::info!("Serving table: {}", config.table);

    let store = KvStore::open(&config.db_path).await?;
    tracing::info!("{} row(s) stored", store.count().await?);

    // Load API keys
    let api_keys = Arc::new(ApiKeyStore::load(&config.config_path));

    let state = AppState {
        store,
        api_keys,
        table: Arc::from(config.table.as_str()),
    };
    let app = router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
