//! Example: Poll the oracle for a few well-known feeds and print the cache.
//!
//! Run with: cargo run --example print_prices

use std::time::Duration;

use swap_client::{
    config::DEFAULT_ORACLE_URL,
    oracle::HttpOracle,
    price::{self, PriceCache},
    testing,
};
use url::Url;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let tokens = testing::tokens();
    let oracle = HttpOracle::new(Url::parse(DEFAULT_ORACLE_URL)?, tokens.supported_feeds())?;
    let cache = PriceCache::new(oracle, Duration::from_secs(5));

    let feeds = tokens.tokens().map(|t| t.feed_id().clone()).collect::<Vec<_>>();
    let _poller = price::spawn_poller(cache.clone(), feeds, Duration::from_secs(1));

    println!("Polling {} feeds...\n", tokens.len());

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    for _ in 0..6 {
        ticker.tick().await;
        for token in tokens.tokens() {
            match cache.get_price(token.feed_id()) {
                Some(entry) => println!(
                    "  {:<6} {:>14} (published at {})",
                    token.symbol(),
                    format!("{}", entry.value()),
                    entry.published_at(),
                ),
                None => println!("  {:<6} {:>14}", token.symbol(), "n/a"),
            }
        }
        println!();
    }

    Ok(())
}
