//! Price cache.
//!
//! Holds the latest known price per oracle feed. Refreshes go through a
//! [`PriceOracle`] and are serialized: while one oracle round trip is pending,
//! every other caller attaches to it instead of issuing its own.
//!
//! Entries older than the TTL are stale but still served; a failed refresh
//! leaves the cache untouched.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use dashmap::DashMap;
use fastnum::UD128;
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use itertools::Itertools;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{oracle::PriceOracle, types::FeedId};

/// Default TTL of the cached prices.
pub const DEFAULT_PRICE_TTL: Duration = Duration::from_secs(3000);

/// Price of a single feed.
#[derive(Clone, derive_more::Debug, PartialEq)]
pub struct PriceEntry {
    feed_id: FeedId,
    #[debug("{value}")]
    value: UD128,
    published_at: u64,
    fetched_at: Instant,
}

impl PriceEntry {
    pub fn new(feed_id: FeedId, value: UD128, published_at: u64, fetched_at: Instant) -> Self {
        Self {
            feed_id,
            value,
            published_at,
            fetched_at,
        }
    }

    pub fn feed_id(&self) -> &FeedId {
        &self.feed_id
    }

    /// Price in quote currency units, fixed-point exponent already applied.
    pub fn value(&self) -> UD128 {
        self.value
    }

    /// Oracle publish time, seconds since the epoch.
    pub fn published_at(&self) -> u64 {
        self.published_at
    }

    /// Local instant the entry was written at.
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    pub fn is_stale(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) > ttl
    }
}

type PendingRefresh = Shared<BoxFuture<'static, ()>>;

/// Process-wide price cache. Cheap to clone, clones share state.
pub struct PriceCache<O> {
    inner: Arc<Inner<O>>,
}

struct Inner<O> {
    oracle: O,
    ttl: Duration,
    entries: DashMap<FeedId, PriceEntry>,
    pending: Mutex<Option<PendingRefresh>>,
}

impl<O> Clone for PriceCache<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O: PriceOracle> PriceCache<O> {
    pub fn new(oracle: O, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                oracle,
                ttl,
                entries: DashMap::new(),
                pending: Mutex::new(None),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn oracle(&self) -> &O {
        &self.inner.oracle
    }

    /// Latest known price of the feed, stale or not.
    pub fn get_price(&self, feed_id: &FeedId) -> Option<PriceEntry> {
        self.inner.entries.get(feed_id).map(|e| e.value().clone())
    }

    /// Whether the feed has no entry or its entry outlived the TTL.
    pub fn needs_refresh(&self, feed_id: &FeedId) -> bool {
        let now = Instant::now();
        self.inner
            .entries
            .get(feed_id)
            .is_none_or(|e| e.is_stale(self.inner.ttl, now))
    }

    /// Refreshes feeds that are missing or stale, or all requested ones
    /// if `force` is set.
    ///
    /// At most one oracle request is outstanding at a time. If a refresh is
    /// already pending, this call waits for it to complete and returns
    /// without fetching the feeds it asked for.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn refresh_prices(&self, feed_ids: &[FeedId], force: bool) {
        let want = feed_ids
            .iter()
            .filter(|id| force || self.needs_refresh(id))
            .unique()
            .cloned()
            .collect::<Vec<_>>();
        if want.is_empty() {
            return;
        }

        let refresh = {
            let mut pending = self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match pending.as_ref() {
                Some(refresh) => {
                    debug!("Price refresh already in flight, attaching");
                    refresh.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let refresh = tokio::spawn(async move {
                        inner.fetch(want).await;
                        inner
                            .pending
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .take();
                    })
                    .map(|joined| {
                        if let Err(e) = joined {
                            warn!(%e, "Price refresh task failed");
                        }
                    })
                    .boxed()
                    .shared();
                    *pending = Some(refresh.clone());
                    refresh
                }
            }
        };
        refresh.await
    }

    /// Snapshot of all cached prices.
    pub fn prices(&self) -> HashMap<FeedId, PriceEntry> {
        self.inner
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

impl<O: PriceOracle> Inner<O> {
    async fn fetch(&self, want: Vec<FeedId>) {
        debug!(feeds = %want.iter().join(","), "Refreshing prices");
        let fetched = self.oracle.fetch_prices(&want).await;
        if fetched.is_empty() {
            warn!(requested = want.len(), "Oracle returned no prices, keeping cached values");
            return;
        }
        debug!(requested = want.len(), received = fetched.len(), "Prices refreshed");
        for (feed_id, entry) in fetched {
            self.entries.insert(feed_id, entry);
        }
    }
}

/// Spawns a task refreshing the given feeds every `every`.
///
/// Refreshes are not forced, so feeds fresher than the TTL are skipped.
pub fn spawn_poller<O: PriceOracle>(
    cache: PriceCache<O>,
    feed_ids: Vec<FeedId>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            cache.refresh_prices(&feed_ids, false).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fastnum::udec128;
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;
    use crate::testing::{self, MockOracle};

    fn cache(oracle: &Arc<MockOracle>, ttl: Duration) -> PriceCache<Arc<MockOracle>> {
        PriceCache::new(Arc::clone(oracle), ttl)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_is_not_refetched() {
        let btc = testing::btc_feed();
        let oracle = Arc::new(MockOracle::new().with_price(&btc, udec128!(65000)));
        let prices = cache(&oracle, Duration::from_secs(60));

        prices.refresh_prices(&[btc.clone()], false).await;
        assert_eq!(oracle.calls(), 1);
        assert_eq!(prices.get_price(&btc).unwrap().value(), udec128!(65000));

        tokio::time::advance(Duration::from_secs(59)).await;
        prices.refresh_prices(&[btc.clone()], false).await;
        assert_eq!(oracle.calls(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        prices.refresh_prices(&[btc.clone()], false).await;
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_bypasses_ttl() {
        let btc = testing::btc_feed();
        let oracle = Arc::new(MockOracle::new().with_price(&btc, udec128!(65000)));
        let prices = cache(&oracle, Duration::from_secs(60));

        prices.refresh_prices(&[btc.clone()], false).await;
        prices.refresh_prices(&[btc.clone()], true).await;
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_share_single_request() {
        let btc = testing::btc_feed();
        let eth = testing::eth_feed();
        let oracle = Arc::new(
            MockOracle::new()
                .with_price(&btc, udec128!(65000))
                .with_price(&eth, udec128!(3000))
                .with_delay(Duration::from_millis(500)),
        );
        let prices = cache(&oracle, Duration::from_secs(60));

        let first_ids = [btc.clone()];
        let second_ids = [btc.clone(), eth.clone()];
        let mut first = task::spawn(prices.refresh_prices(&first_ids, false));
        let mut second = task::spawn(prices.refresh_prices(&second_ids, false));
        assert_pending!(first.poll());
        assert_pending!(second.poll());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(oracle.calls(), 1);
        assert_eq!(oracle.completed(), 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_ready!(second.poll());
        assert_eq!(oracle.completed(), 1);
        assert_ready!(first.poll());
        assert_eq!(oracle.calls(), 1);

        // the attached call did not fetch its own feeds
        assert!(prices.get_price(&eth).is_none());
        assert_eq!(oracle.requests()[0], vec![btc.clone()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_does_not_cancel_refresh() {
        let btc = testing::btc_feed();
        let oracle = Arc::new(
            MockOracle::new()
                .with_price(&btc, udec128!(65000))
                .with_delay(Duration::from_millis(500)),
        );
        let prices = cache(&oracle, Duration::from_secs(60));

        let caller = tokio::spawn({
            let prices = prices.clone();
            let ids = vec![btc.clone()];
            async move { prices.refresh_prices(&ids, false).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(oracle.completed(), 1);
        assert_eq!(prices.get_price(&btc).unwrap().value(), udec128!(65000));
        assert!(prices.inner.pending.lock().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_stale_entries() {
        let btc = testing::btc_feed();
        let oracle = Arc::new(MockOracle::new().with_price(&btc, udec128!(65000)));
        let prices = cache(&oracle, Duration::from_secs(10));

        prices.refresh_prices(&[btc.clone()], false).await;
        let before = prices.get_price(&btc).unwrap();

        oracle.set_failing(true);
        tokio::time::advance(Duration::from_secs(11)).await;
        prices.refresh_prices(&[btc.clone()], false).await;

        assert_eq!(oracle.calls(), 2);
        assert_eq!(prices.get_price(&btc), Some(before));
        assert!(prices.needs_refresh(&btc));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_response_preserves_other_entries() {
        let btc = testing::btc_feed();
        let eth = testing::eth_feed();
        let oracle = Arc::new(
            MockOracle::new()
                .with_price(&btc, udec128!(65000))
                .with_price(&eth, udec128!(3000)),
        );
        let prices = cache(&oracle, Duration::from_secs(10));
        prices.refresh_prices(&[btc.clone(), eth.clone()], false).await;

        oracle.remove_price(&eth);
        prices.refresh_prices(&[btc.clone(), eth.clone()], true).await;

        assert_eq!(prices.get_price(&eth).unwrap().value(), udec128!(3000));
        assert_eq!(prices.prices().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_refreshes_stale_feeds() {
        let btc = testing::btc_feed();
        let oracle = Arc::new(MockOracle::new().with_price(&btc, udec128!(65000)));
        let prices = cache(&oracle, Duration::from_secs(4));

        let handle = spawn_poller(prices.clone(), vec![btc.clone()], Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(5500)).await;
        handle.abort();

        // initial fetch at 0s, the next one on the 5s tick
        assert_eq!(oracle.calls(), 2);
    }
}
