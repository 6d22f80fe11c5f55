mod swap;
mod token;

pub use swap::{EditedField, SwapIntent};
pub use token::{PoolInfo, Token, TokenRegistry};

use std::fmt;

use crate::error::ConfigError;

/// Account identifier understood by the ledger SDK and the wallet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-chain asset identifier (faucet account ID of the token).
///
/// Lives in a different namespace than [`FeedId`] and must never be
/// used to look up prices.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Price feed identifier of the oracle: 32 bytes, hex encoded.
///
/// Stored lowercase without the `0x` prefix, which is how the oracle
/// reports ids in its responses.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedId(String);

impl FeedId {
    pub const HEX_LEN: usize = 64;

    /// Parses a feed id, accepting an optional `0x` prefix and any case.
    pub fn parse(id: &str) -> Result<Self, ConfigError> {
        let trimmed = id.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if hex.len() != Self::HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConfigError::InvalidFeedId(id.to_string()));
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Hex digits without prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.0)
    }
}

impl std::str::FromStr for FeedId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Composite key of the balance cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BalanceKey {
    account: AccountId,
    asset: AssetId,
}

impl BalanceKey {
    pub fn new(account: AccountId, asset: AssetId) -> Self {
        Self { account, asset }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn asset(&self) -> &AssetId {
        &self.asset
    }
}

impl fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.asset)
    }
}

/// Kind of note forwarded to the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteKind {
    Order,
    Deposit,
    Withdraw,
}

impl NoteKind {
    /// Path segment of the backend submission endpoint.
    pub fn endpoint(&self) -> &'static str {
        match self {
            NoteKind::Order => "orders/submit",
            NoteKind::Deposit => "deposit/submit",
            NoteKind::Withdraw => "withdraw/submit",
        }
    }
}

/// Transaction ID returned by the wallet.
pub type TransactionId = String;

#[cfg(test)]
mod tests {
    use super::*;

    const BTC_FEED: &str = "0xE62DF6C8B4A85FE1A67DB44DC12DE5DB330F7AC66B72DC658AFEDF0F4A415B43";

    #[test]
    fn test_feed_id_parse_normalizes() {
        let id = FeedId::parse(BTC_FEED).unwrap();
        assert_eq!(
            id.as_str(),
            "e62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43"
        );
        assert_eq!(id, FeedId::parse(&BTC_FEED[2..]).unwrap());
        assert_eq!(id.to_string(), format!("0x{}", id.as_str()));
    }

    #[test]
    fn test_feed_id_parse_rejects_malformed() {
        assert!(FeedId::parse("0x1234").is_err());
        assert!(FeedId::parse(&BTC_FEED.replace('E', "g")).is_err());
        assert!(FeedId::parse("").is_err());
    }

    #[test]
    fn test_note_kind_endpoints() {
        assert_eq!(NoteKind::Order.endpoint(), "orders/submit");
        assert_eq!(NoteKind::Deposit.endpoint(), "deposit/submit");
        assert_eq!(NoteKind::Withdraw.endpoint(), "withdraw/submit");
    }
}
