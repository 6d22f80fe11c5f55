//! Balance cache with subscriptions.
//!
//! Holds the latest known balance per (account, asset) pair. Fetches are
//! coalesced per key: concurrent requests for the same pair share one
//! in-flight fetch, while different pairs are fetched independently.
//! Each fetch runs on its own task and completes even if every caller
//! awaiting it goes away.
//!
//! Subscribers registered with [`BalanceCache::subscribe`] are notified
//! synchronously, in registration order, every time a fetch writes a new
//! entry for their key.

mod subscription;

#[cfg(test)]
mod tests;

pub use subscription::{BalanceCallback, Subscription};

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    error::LedgerError,
    ledger::{self, Ledger},
    types::{AccountId, AssetId, BalanceKey},
};
use subscription::{Registry, SubscriptionId};

/// Default TTL of cached balances.
pub const DEFAULT_BALANCE_TTL: Duration = Duration::from_secs(10);

/// Balance of an account in a single asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceEntry {
    key: BalanceKey,
    balance: u64,
    last_updated: Instant,
}

impl BalanceEntry {
    pub fn new(key: BalanceKey, balance: u64, last_updated: Instant) -> Self {
        Self {
            key,
            balance,
            last_updated,
        }
    }

    pub fn key(&self) -> &BalanceKey {
        &self.key
    }

    /// Balance in base units.
    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn last_updated(&self) -> Instant {
        self.last_updated
    }

    pub fn is_stale(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_updated) >= ttl
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<BalanceEntry, LedgerError>>>;

struct InFlight {
    id: u64,
    fetch: SharedFetch,
}

/// Process-wide balance cache. Cheap to clone, clones share state.
pub struct BalanceCache<L> {
    inner: Arc<Inner<L>>,
}

struct Inner<L> {
    ledger: L,
    ttl: Duration,
    entries: DashMap<BalanceKey, BalanceEntry>,
    in_flight: DashMap<BalanceKey, InFlight>,
    registry: Mutex<Registry>,
    fetch_seq: AtomicU64,
}

impl<L> Clone for BalanceCache<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: Ledger> BalanceCache<L> {
    pub fn new(ledger: L, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger,
                ttl,
                entries: DashMap::new(),
                in_flight: DashMap::new(),
                registry: Mutex::new(Registry::default()),
                fetch_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.inner.ledger
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Cached entry of the pair, stale or not. Never fetches.
    pub fn get_cached(&self, account: &AccountId, asset: &AssetId) -> Option<BalanceEntry> {
        let key = BalanceKey::new(account.clone(), asset.clone());
        self.inner.entries.get(&key).map(|e| e.value().clone())
    }

    /// Returns the balance of the pair.
    ///
    /// With `use_cache`, a fresh cached entry is returned without fetching.
    /// Otherwise joins the in-flight fetch of the pair, or starts one.
    /// A failed fetch leaves any previously cached entry in place.
    pub async fn get_balance(
        &self,
        account: &AccountId,
        asset: &AssetId,
        use_cache: bool,
    ) -> Result<BalanceEntry, LedgerError> {
        let key = BalanceKey::new(account.clone(), asset.clone());
        if use_cache {
            let now = Instant::now();
            if let Some(entry) = self
                .inner
                .entries
                .get(&key)
                .filter(|e| !e.is_stale(self.inner.ttl, now))
            {
                return Ok(entry.clone());
            }
        }
        self.fetch(key).await
    }

    /// Fetches the balance of the pair bypassing the cache.
    pub async fn refresh_balance(
        &self,
        account: &AccountId,
        asset: &AssetId,
    ) -> Result<BalanceEntry, LedgerError> {
        self.get_balance(account, asset, false).await
    }

    /// Force-refreshes every cached pair concurrently.
    ///
    /// Failures are isolated per pair. Returns the number of pairs
    /// that failed to refresh.
    pub async fn refresh_all_balances(&self) -> usize {
        let keys = self
            .inner
            .entries
            .iter()
            .map(|e| e.key().clone())
            .collect::<Vec<_>>();
        let results = futures::future::join_all(keys.iter().map(|k| self.fetch(k.clone()))).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(total = keys.len(), failed, "Some balances failed to refresh");
        } else {
            debug!(total = keys.len(), "All balances refreshed");
        }
        failed
    }

    /// Wipes all cached balances and subscriptions.
    ///
    /// Fetches in flight still complete and write their result.
    pub fn clear_balance_caches(&self) {
        self.inner.entries.clear();
        self.inner.in_flight.clear();
        self.inner.registry().clear();
        info!("Balance caches cleared");
    }

    /// Registers `callback` for updates of the pair.
    ///
    /// The first subscriber of a pair triggers a background fetch bypassing
    /// the cache, so it must be called within a Tokio runtime.
    pub fn subscribe<F>(&self, account: &AccountId, asset: &AssetId, callback: F) -> Subscription<L>
    where
        F: Fn(&BalanceEntry) + Send + Sync + 'static,
    {
        let key = BalanceKey::new(account.clone(), asset.clone());
        let (id, first) = self.inner.registry().add(key.clone(), Arc::new(callback));
        if first {
            let cache = self.clone();
            let seed = key.clone();
            tokio::spawn(async move {
                if let Err(e) = cache.fetch(seed.clone()).await {
                    warn!(key = %seed, %e, "Initial balance fetch failed");
                }
            });
        }
        Subscription::new(self.clone(), key, id)
    }

    /// Number of subscribers of the pair.
    pub fn subscriber_count(&self, account: &AccountId, asset: &AssetId) -> usize {
        self.inner
            .registry()
            .count(&BalanceKey::new(account.clone(), asset.clone()))
    }

    async fn fetch(&self, key: BalanceKey) -> Result<BalanceEntry, LedgerError> {
        let fetch = match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(e) => {
                debug!(%key, "Balance fetch already in flight, attaching");
                e.get().fetch.clone()
            }
            Entry::Vacant(e) => {
                let id = self.inner.fetch_seq.fetch_add(1, Ordering::Relaxed);
                let inner = Arc::clone(&self.inner);
                // runs detached from its callers
                let fetch = tokio::spawn(async move { inner.fetch(key, id).await })
                    .map(|joined| {
                        joined.unwrap_or_else(|e| {
                            Err(LedgerError::Other(format!("balance fetch task: {e}")))
                        })
                    })
                    .boxed()
                    .shared();
                e.insert(InFlight {
                    id,
                    fetch: fetch.clone(),
                });
                fetch
            }
        };
        fetch.await
    }
}

impl<L: Ledger> Inner<L> {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch(&self, key: BalanceKey, id: u64) -> Result<BalanceEntry, LedgerError> {
        let result = ledger::with_store_recovery(&self.ledger, || {
            ledger::read_balance(&self.ledger, key.account(), key.asset())
        })
        .await
        .map(|balance| {
            let entry = BalanceEntry::new(key.clone(), balance, Instant::now());
            self.entries.insert(key.clone(), entry.clone());
            entry
        });
        self.in_flight.remove_if(&key, |_, f| f.id == id);

        match &result {
            Ok(entry) => {
                debug!(%key, balance = entry.balance, "Balance updated");
                self.notify(entry);
            }
            Err(e) => warn!(%key, %e, "Balance fetch failed"),
        }
        result
    }

    fn notify(&self, entry: &BalanceEntry) {
        let callbacks = self.registry().callbacks(&entry.key);
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(entry))).is_err() {
                warn!(key = %entry.key, "Balance subscriber panicked");
            }
        }
    }

    fn unsubscribe(&self, key: &BalanceKey, id: SubscriptionId) {
        let now_empty = self.registry().remove(key, id);
        if now_empty == Some(true) {
            self.entries.remove(key);
            debug!(%key, "Last subscriber gone, balance evicted");
        }
    }
}
