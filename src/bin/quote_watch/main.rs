//! Quote watcher for the swap client.
//!
//! This binary loads the token registry from the backend and prints live
//! quotes for a token pair from cached oracle prices.

mod config;
mod error;
mod watcher;

use std::process::exit;

use clap::Parser;
use swap_client::{api::BackendClient, oracle::HttpOracle, price::PriceCache};
use tracing::error;

use config::CliConfig;
use error::Result;
use watcher::QuoteWatcher;

#[tokio::main]
async fn main() {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Failed to load .env file: {}", e);
    }

    // Set up logging
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli_config = CliConfig::parse();

    if let Err(e) = run(cli_config).await {
        error!(%e, "Quote watcher failed");
        exit(1);
    }
}

async fn run(cli_config: CliConfig) -> Result<()> {
    let settings = swap_client::config::EnvConfig::from_env()?.validate()?;
    let watch_config = cli_config.to_watch_config(settings.default_slippage)?;

    let backend = BackendClient::new(settings.network.api.clone())?;
    let registry = backend.token_registry().await?;

    // the backend registry is authoritative, configured feeds extend it
    let mut supported = registry.supported_feeds();
    supported.extend(settings.supported_feeds());

    let oracle = HttpOracle::new(settings.network.oracle.clone(), supported)?;
    let prices = PriceCache::new(oracle, settings.price_ttl);

    QuoteWatcher::try_new(prices, &registry, watch_config.intent, watch_config.interval)?
        .run()
        .await;
    Ok(())
}
