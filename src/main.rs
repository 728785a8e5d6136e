//! Notion MCP Agent - HTTP Server Entry Point
//!
//! Starts the HTTP server and, when configured, the public tunnel.

use std::sync::Arc;

use notion_mcp_agent::{api, config::Config, tunnel::Tunnel};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notion_mcp_agent=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    info!(
        "Loaded configuration: model={}, max_turns={}, bridge={}",
        config.default_model, config.max_turns, config.bridge.command
    );

    // Held for the life of the server; dropping it stops ngrok
    let _tunnel = if config.tunnel.enabled {
        match Tunnel::start(&config.tunnel, config.port).await {
            Ok(tunnel) => {
                println!("Public URL: {}", tunnel.public_url());
                Some(tunnel)
            }
            Err(e) => {
                warn!("Tunnel unavailable, serving locally only: {}", e);
                None
            }
        }
    } else {
        None
    };

    api::serve(config).await?;

    Ok(())
}
