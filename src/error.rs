use crate::types;

/// Known fragments of messages the ledger SDK produces when its local
/// persisted store is inconsistent with the node.
const STORE_CORRUPTION_MARKERS: &[&str] = &[
    "store is corrupted",
    "database disk image is malformed",
    "failed to apply state sync",
    "merkle root mismatch",
    "account data wasn't found",
];

/// Error returned by the external ledger SDK.
///
/// Cloneable since a single in-flight balance fetch result is handed
/// to every caller coalesced onto it.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("account not found: {0}")]
    AccountNotFound(types::AccountId),

    #[error("local store corrupted: {0}")]
    StoreCorrupted(String),

    #[error("ledger error: {0}")]
    Other(String),
}

impl LedgerError {
    /// Classifies a raw SDK error message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if STORE_CORRUPTION_MARKERS.iter().any(|m| lower.contains(m)) {
            Self::StoreCorrupted(message)
        } else {
            Self::Other(message)
        }
    }
}

/// Error returned by client operations touching the network, the wallet
/// or the ledger.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("wallet is not connected")]
    NotConnected,

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("unknown token: {0}")]
    UnknownToken(String),

    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL for {name}: {source}")]
    InvalidUrl {
        name: &'static str,
        source: url::ParseError,
    },

    #[error("invalid slippage value: {0:?}")]
    InvalidSlippage(String),

    #[error("slippage must be within [0, 50] percent, got {0}")]
    SlippageOutOfRange(String),

    #[error("invalid price feed id: {0:?}")]
    InvalidFeedId(String),

    #[error("expected SYMBOL:id pair, got {0:?}")]
    InvalidPair(String),
}
