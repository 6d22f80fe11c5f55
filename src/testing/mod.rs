//! In-memory test doubles and fixtures.
//!
//! [`MockOracle`], [`MockLedger`] and [`MockWallet`] stand in for the remote
//! oracle, the ledger SDK and the wallet extension. Each one records how it
//! was called, so tests can assert on coalescing and retry behaviour, and can
//! be slowed down with a delay to keep fetches in flight under paused time.
//!
//! Fixture helpers provide a small registry of well-known tokens.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, DashSet};
use fastnum::UD128;
use tokio::time::Instant;

use crate::{
    error::{ClientError, LedgerError},
    ledger::Ledger,
    oracle::PriceOracle,
    price::PriceEntry,
    session::Wallet,
    types::{AccountId, AssetId, BalanceKey, FeedId, PoolInfo, Token, TokenRegistry, TransactionId},
};

const BTC_FEED: &str = "e62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43";
const ETH_FEED: &str = "ff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace";
const USDC_FEED: &str = "eaa020c61cc479712813461ce153894a96a6c00b21ed0cfc2798d1f9a9e9c94a";

/// Publish time reported by [`MockOracle`] for every price.
pub const MOCK_PUBLISH_TIME: u64 = 1_717_000_000;

pub fn btc_feed() -> FeedId {
    FeedId::parse(BTC_FEED).unwrap()
}

pub fn eth_feed() -> FeedId {
    FeedId::parse(ETH_FEED).unwrap()
}

pub fn usdc_feed() -> FeedId {
    FeedId::parse(USDC_FEED).unwrap()
}

/// Pool descriptions as the backend would report them: BTC and ETH with
/// 8 decimals, USDC with 6.
pub fn pools() -> Vec<PoolInfo> {
    [
        ("BTC", "Bitcoin", 8, BTC_FEED),
        ("ETH", "Ether", 8, ETH_FEED),
        ("USDC", "USD Coin", 6, USDC_FEED),
    ]
    .into_iter()
    .map(|(symbol, name, decimals, oracle_id)| PoolInfo {
        symbol: symbol.to_string(),
        name: name.to_string(),
        decimals,
        faucet_id: format!("0xfaucet_{}", symbol.to_ascii_lowercase()),
        oracle_id: format!("0x{oracle_id}"),
    })
    .collect()
}

/// Registry built from [`pools`].
pub fn tokens() -> TokenRegistry {
    TokenRegistry::from_pools(&pools())
}

pub fn token(symbol: &str) -> Token {
    tokens().get(symbol).cloned().unwrap()
}

// ============================================================================
// ORACLE
// ============================================================================

/// Oracle serving fixed prices.
#[derive(Debug, Default)]
pub struct MockOracle {
    prices: DashMap<FeedId, UD128>,
    delay: Duration,
    failing: AtomicBool,
    calls: AtomicUsize,
    completed: AtomicUsize,
    requests: Mutex<Vec<Vec<FeedId>>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(self, feed_id: &FeedId, value: UD128) -> Self {
        self.prices.insert(feed_id.clone(), value);
        self
    }

    /// Delays every response by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_price(&self, feed_id: &FeedId, value: UD128) {
        self.prices.insert(feed_id.clone(), value);
    }

    pub fn remove_price(&self, feed_id: &FeedId) {
        self.prices.remove(feed_id);
    }

    /// A failing oracle answers with an empty map, like an unreachable one.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of requests started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of requests that delivered their response.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Feed ids of every request, in call order.
    pub fn requests(&self) -> Vec<Vec<FeedId>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl PriceOracle for MockOracle {
    fn fetch_prices(
        &self,
        feed_ids: &[FeedId],
    ) -> impl Future<Output = HashMap<FeedId, PriceEntry>> + Send {
        let feed_ids = feed_ids.to_vec();
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(feed_ids.clone());
        async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return HashMap::new();
            }
            let now = Instant::now();
            feed_ids
                .into_iter()
                .filter_map(|id| {
                    let value = *self.prices.get(&id)?;
                    Some((id.clone(), PriceEntry::new(id, value, MOCK_PUBLISH_TIME, now)))
                })
                .collect()
        }
    }
}

// ============================================================================
// LEDGER
// ============================================================================

/// In-memory ledger SDK.
///
/// Accounts become known either through [`MockLedger::set_balance`] or by
/// importing an account that has importable balances.
#[derive(Debug, Default)]
pub struct MockLedger {
    delay: Duration,
    known: DashSet<AccountId>,
    balances: DashMap<BalanceKey, u64>,
    importable: DashMap<BalanceKey, u64>,
    failing: DashSet<AccountId>,
    corrupted: AtomicUsize,
    balance_calls: DashMap<BalanceKey, usize>,
    imports: AtomicUsize,
    resets: AtomicUsize,
    syncs: AtomicUsize,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every balance read by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the balance of a locally known account.
    pub fn set_balance(&self, account: &AccountId, asset: &AssetId, balance: u64) {
        self.known.insert(account.clone());
        self.balances
            .insert(BalanceKey::new(account.clone(), asset.clone()), balance);
    }

    /// Sets a balance that becomes visible once the account is imported.
    pub fn set_importable_balance(&self, account: &AccountId, asset: &AssetId, balance: u64) {
        self.importable
            .insert(BalanceKey::new(account.clone(), asset.clone()), balance);
    }

    /// Makes every balance read of the account fail.
    pub fn fail_account(&self, account: &AccountId) {
        self.failing.insert(account.clone());
    }

    /// Makes the next `times` store operations report a corrupted store.
    pub fn corrupt_store(&self, times: usize) {
        self.corrupted.store(times, Ordering::SeqCst);
    }

    pub fn balance_calls(&self, account: &AccountId, asset: &AssetId) -> usize {
        self.balance_calls
            .get(&BalanceKey::new(account.clone(), asset.clone()))
            .map_or(0, |c| *c)
    }

    pub fn imports(&self) -> usize {
        self.imports.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn syncs(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }

    fn take_corruption(&self) -> Result<(), LedgerError> {
        match self
            .corrupted
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(_) => Err(LedgerError::from_message("store is corrupted")),
            Err(_) => Ok(()),
        }
    }
}

impl Ledger for MockLedger {
    fn sync_state(&self) -> impl Future<Output = Result<(), LedgerError>> + Send {
        async move {
            self.syncs.fetch_add(1, Ordering::SeqCst);
            self.take_corruption()
        }
    }

    fn account_balance(
        &self,
        account: &AccountId,
        asset: &AssetId,
    ) -> impl Future<Output = Result<Option<u64>, LedgerError>> + Send {
        let key = BalanceKey::new(account.clone(), asset.clone());
        *self.balance_calls.entry(key.clone()).or_default() += 1;
        async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.take_corruption()?;
            if self.failing.contains(key.account()) {
                return Err(LedgerError::Other(format!("failed to read vault of {}", key.account())));
            }
            if !self.known.contains(key.account()) {
                return Ok(None);
            }
            Ok(Some(self.balances.get(&key).map_or(0, |b| *b)))
        }
    }

    fn import_account(
        &self,
        account: &AccountId,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send {
        let account = account.clone();
        async move {
            self.imports.fetch_add(1, Ordering::SeqCst);
            let imported = self
                .importable
                .iter()
                .filter(|e| e.key().account() == &account)
                .map(|e| (e.key().clone(), *e.value()))
                .collect::<Vec<_>>();
            if imported.is_empty() {
                return Ok(());
            }
            self.known.insert(account);
            for (key, balance) in imported {
                self.importable.remove(&key);
                self.balances.insert(key, balance);
            }
            Ok(())
        }
    }

    fn reset_store(&self) -> impl Future<Output = Result<(), LedgerError>> + Send {
        async move {
            self.resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

// ============================================================================
// WALLET
// ============================================================================

/// Wallet extension that signs everything unless told to reject.
#[derive(Debug)]
pub struct MockWallet {
    account: AccountId,
    rejecting: AtomicBool,
    transactions: Mutex<Vec<Vec<u8>>>,
}

impl MockWallet {
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            rejecting: AtomicBool::new(false),
            transactions: Mutex::new(Vec::new()),
        }
    }

    /// Rejects every subsequent connection and signing request.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Payloads of the transactions signed so far.
    pub fn transactions(&self) -> Vec<Vec<u8>> {
        self.transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Wallet for MockWallet {
    fn connect(&self) -> impl Future<Output = Result<AccountId, ClientError>> + Send {
        async move {
            if self.rejecting.load(Ordering::SeqCst) {
                return Err(ClientError::Wallet("user rejected the connection".to_string()));
            }
            Ok(self.account.clone())
        }
    }

    fn request_transaction(
        &self,
        payload: &[u8],
    ) -> impl Future<Output = Result<TransactionId, ClientError>> + Send {
        let payload = payload.to_vec();
        async move {
            if self.rejecting.load(Ordering::SeqCst) {
                return Err(ClientError::Wallet("user rejected the request".to_string()));
            }
            let mut transactions = self.transactions.lock().unwrap_or_else(PoisonError::into_inner);
            transactions.push(payload);
            Ok(format!("0xtx{}", transactions.len()))
        }
    }
}
