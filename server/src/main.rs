use std::sync::Arc;

use tokio::net::TcpListener;

use staylink_chat::auth::jwt;
use staylink_chat::chat::store::SqliteMessageStore;
use staylink_chat::config::{generate_config_template, Config};
use staylink_chat::db;
use staylink_chat::routes;
use staylink_chat::state::AppState;
use staylink_chat::ws::registry::ConnectionRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "staylink_chat=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "staylink_chat=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("StayLink chat server v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite database
    let db = db::init_db(&config.data_dir)?;

    // Load or generate the JWT verification secret (256-bit random, stored
    // in data_dir, shared with the platform that issues tokens)
    let jwt_secret = jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    // Build application state
    let state = AppState {
        store: Arc::new(SqliteMessageStore::new(db)),
        jwt_secret,
        registry: ConnectionRegistry::new(),
        chat: config.chat.clone().unwrap_or_default(),
    };

    // Build router
    let app = routes::build_router(state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
