//! Client configuration.
//!
//! [`EnvConfig`] is read from the environment (and `.env`, when the binary
//! loads one) and checked once at startup by [`EnvConfig::validate`], which
//! produces the typed [`Settings`] the rest of the crate consumes.

use std::{
    collections::{BTreeMap, HashSet},
    time::Duration,
};

use fastnum::{UD128, decimal::Context, udec128};
use url::Url;

use crate::{
    error::ConfigError,
    types::{AssetId, FeedId},
};

/// Latest-price endpoint of the public oracle.
pub const DEFAULT_ORACLE_URL: &str = "https://hermes.pyth.network/v2/updates/price/latest";

/// Largest slippage a user may configure, in percent.
pub const MAX_SLIPPAGE: UD128 = udec128!(50);

/// Remote endpoints the client talks to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Network {
    /// Node RPC, used by the ledger SDK.
    pub rpc: Url,
    /// Remote prover, used by the ledger SDK.
    pub prover: Url,
    pub oracle: Url,
    pub api: Url,
}

/// Environment configuration.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct EnvConfig {
    pub rpc_url: String,

    pub prover_url: String,

    #[serde(default = "default_oracle_url")]
    pub oracle_url: String,

    /// TTL of cached prices (default: 3000s)
    #[serde(default = "default_oracle_cache_ttl_secs")]
    pub oracle_cache_ttl_secs: u64,

    /// TTL of cached balances (default: 10000ms)
    #[serde(default = "default_balance_cache_ttl_ms")]
    pub balance_cache_ttl_ms: u64,

    /// Backend API base URL
    pub api_base_url: String,

    /// Default slippage in percent (default: 0.5)
    #[serde(default = "default_slippage")]
    pub default_slippage: String,

    /// Oracle feed per token, e.g. "BTC:0xe62d...,ETH:0xff61..."
    #[serde(default)]
    pub oracle_ids: String,

    /// Faucet per token, e.g. "BTC:0xa1b2...,USDC:0xc3d4..."
    #[serde(default)]
    pub faucet_ids: String,

    /// Wait before re-syncing after a transaction (default: 15s)
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,
}

/// Validated configuration.
#[derive(Clone, derive_more::Debug)]
pub struct Settings {
    pub network: Network,
    pub price_ttl: Duration,
    pub balance_ttl: Duration,
    #[debug("{default_slippage}")]
    pub default_slippage: UD128,
    pub oracle_ids: BTreeMap<String, FeedId>,
    pub faucet_ids: BTreeMap<String, AssetId>,
    pub settle_delay: Duration,
}

impl Settings {
    /// Feeds the oracle gateway may query.
    pub fn supported_feeds(&self) -> HashSet<FeedId> {
        self.oracle_ids.values().cloned().collect()
    }
}

impl EnvConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let network = Network {
            rpc: parse_url("RPC_URL", &self.rpc_url)?,
            prover: parse_url("PROVER_URL", &self.prover_url)?,
            oracle: parse_url("ORACLE_URL", &self.oracle_url)?,
            api: parse_url("API_BASE_URL", &self.api_base_url)?,
        };

        let oracle_ids = parse_pairs(&self.oracle_ids)?
            .into_iter()
            .map(|(symbol, id)| FeedId::parse(&id).map(|feed| (symbol, feed)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        let faucet_ids = parse_pairs(&self.faucet_ids)?
            .into_iter()
            .map(|(symbol, id)| (symbol, AssetId::new(id)))
            .collect();

        Ok(Settings {
            network,
            price_ttl: Duration::from_secs(self.oracle_cache_ttl_secs),
            balance_ttl: Duration::from_millis(self.balance_cache_ttl_ms),
            default_slippage: parse_slippage(&self.default_slippage)?,
            oracle_ids,
            faucet_ids,
            settle_delay: Duration::from_secs(self.settle_delay_secs),
        })
    }
}

/// Parses a slippage percentage within `[0, MAX_SLIPPAGE]`.
pub fn parse_slippage(value: &str) -> Result<UD128, ConfigError> {
    let slippage = UD128::from_str(value.trim(), Context::default())
        .map_err(|_| ConfigError::InvalidSlippage(value.to_string()))?;
    if slippage > MAX_SLIPPAGE {
        return Err(ConfigError::SlippageOutOfRange(value.to_string()));
    }
    Ok(slippage)
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl { name, source })
}

/// Splits a comma separated `SYMBOL:id` list.
fn parse_pairs(value: &str) -> Result<Vec<(String, String)>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once(':') {
            Some((symbol, id)) if !symbol.trim().is_empty() && !id.trim().is_empty() => {
                Ok((symbol.trim().to_string(), id.trim().to_string()))
            }
            _ => Err(ConfigError::InvalidPair(pair.to_string())),
        })
        .collect()
}

fn default_oracle_url() -> String {
    DEFAULT_ORACLE_URL.to_string()
}

fn default_oracle_cache_ttl_secs() -> u64 {
    3000
}

fn default_balance_cache_ttl_ms() -> u64 {
    10_000
}

fn default_slippage() -> String {
    "0.5".to_string()
}

fn default_settle_delay_secs() -> u64 {
    15
}
