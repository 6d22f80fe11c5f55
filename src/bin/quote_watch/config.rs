//! Configuration for the quote watcher.
//!
//! Configuration comes from two sources:
//! - Environment variables (via .env file or shell): endpoints, TTLs, default slippage
//! - CLI arguments: the swap to quote

use std::time::Duration;

use clap::{Parser, ValueEnum};
use fastnum::UD128;
use swap_client::{
    config,
    num::Converter,
    types::SwapIntent,
};

/// Side of the swap the amount is given for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Side {
    /// Amount to sell
    #[default]
    Sell,
    /// Amount to buy
    Buy,
}

/// CLI arguments of the quote watcher.
#[derive(Debug, Parser)]
#[command(name = "quote_watch")]
#[command(about = "Print live swap quotes from cached oracle prices")]
pub struct CliConfig {
    /// Token to sell (e.g., BTC)
    #[arg(long)]
    pub sell: String,

    /// Token to buy (e.g., USDC)
    #[arg(long)]
    pub buy: String,

    /// Amount of the token on the given side
    #[arg(long, default_value = "1")]
    pub amount: String,

    /// Side the amount is given for
    #[arg(long, value_enum, default_value = "sell")]
    pub side: Side,

    /// Slippage tolerance in percent; DEFAULT_SLIPPAGE if not specified
    #[arg(long)]
    pub slippage: Option<String>,

    /// Re-quote interval in seconds (0 = quote once)
    #[arg(long, default_value = "0")]
    pub interval_secs: u64,
}

/// What to quote and how often.
#[derive(Debug)]
pub struct WatchConfig {
    pub intent: SwapIntent,
    pub interval: Option<Duration>,
}

impl CliConfig {
    /// Builds the swap intent, falling back to `default_slippage`.
    pub fn to_watch_config(&self, default_slippage: UD128) -> Result<WatchConfig, ConfigError> {
        if self.sell == self.buy {
            return Err(ConfigError::SameToken(self.sell.clone()));
        }
        if Converter::parse(&self.amount).is_none() {
            return Err(ConfigError::InvalidAmount(self.amount.clone()));
        }
        let slippage = match &self.slippage {
            Some(s) => config::parse_slippage(s)?,
            None => default_slippage,
        };

        let mut intent = SwapIntent::new(&self.sell, &self.buy, slippage);
        match self.side {
            Side::Sell => intent.edit_sell(&self.amount),
            Side::Buy => intent.edit_buy(&self.amount),
        }

        Ok(WatchConfig {
            intent,
            interval: (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs)),
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot swap {0} for itself")]
    SameToken(String),

    #[error("Invalid amount: {0:?}")]
    InvalidAmount(String),

    #[error(transparent)]
    Client(#[from] swap_client::error::ConfigError),
}
