use std::collections::{BTreeMap, HashSet};

use tracing::warn;

use super::*;
use crate::num;

/// Largest number of decimals a token may declare; amounts are scaled
/// by `10^decimals` in 64-bit arithmetic.
const MAX_DECIMALS: u8 = 18;

/// Liquidity pool description as reported by the backend.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PoolInfo {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub faucet_id: String,
    pub oracle_id: String,
}

/// Tradable token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    symbol: String,
    name: String,
    decimals: u8,
    asset_id: AssetId,
    feed_id: FeedId,
}

impl Token {
    pub fn new(
        symbol: impl Into<String>,
        name: impl Into<String>,
        decimals: u8,
        asset_id: AssetId,
        feed_id: FeedId,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            decimals,
            asset_id,
            feed_id,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// On-chain faucet ID used for balances.
    pub fn asset_id(&self) -> &AssetId {
        &self.asset_id
    }

    /// Oracle feed ID used for prices.
    pub fn feed_id(&self) -> &FeedId {
        &self.feed_id
    }

    /// Converter between decimal amounts and base units of this token.
    pub fn converter(&self) -> num::Converter {
        num::Converter::new(self.decimals)
    }
}

/// Registry of supported tokens keyed by symbol.
#[derive(Clone, Debug, Default)]
pub struct TokenRegistry {
    tokens: BTreeMap<String, Token>,
}

impl TokenRegistry {
    pub fn new(tokens: impl IntoIterator<Item = Token>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| (t.symbol.clone(), t))
                .collect(),
        }
    }

    /// Builds the registry from backend pool descriptions, skipping
    /// pools with malformed oracle ids or unsupported precision.
    pub fn from_pools(pools: &[PoolInfo]) -> Self {
        let tokens = pools.iter().filter_map(|pool| {
            let feed_id = match FeedId::parse(&pool.oracle_id) {
                Ok(id) => id,
                Err(e) => {
                    warn!(symbol = %pool.symbol, %e, "Skipping pool with malformed oracle id");
                    return None;
                }
            };
            if pool.decimals > MAX_DECIMALS {
                warn!(symbol = %pool.symbol, decimals = pool.decimals, "Skipping pool with unsupported decimals");
                return None;
            }
            Some(Token::new(
                pool.symbol.clone(),
                pool.name.clone(),
                pool.decimals,
                AssetId::new(pool.faucet_id.clone()),
                feed_id,
            ))
        });
        Self::new(tokens)
    }

    pub fn get(&self, symbol: &str) -> Option<&Token> {
        self.tokens.get(symbol)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    pub fn by_asset(&self, asset: &AssetId) -> Option<&Token> {
        self.tokens.values().find(|t| &t.asset_id == asset)
    }

    /// Feed ids the oracle gateway is allowed to query.
    pub fn supported_feeds(&self) -> HashSet<FeedId> {
        self.tokens.values().map(|t| t.feed_id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }
}
