use std::{collections::HashMap, sync::Arc};

use super::*;

/// Observer of balance updates of a single key.
pub type BalanceCallback = Arc<dyn Fn(&BalanceEntry) + Send + Sync>;

/// Unique within a cache instance.
pub(super) type SubscriptionId = u64;

/// Subscribers per balance key, in registration order.
#[derive(Default)]
pub(super) struct Registry {
    next_id: SubscriptionId,
    subscribers: HashMap<BalanceKey, Vec<(SubscriptionId, BalanceCallback)>>,
}

impl Registry {
    /// Registers the callback, returning its ID and whether it is the first
    /// subscriber of the key.
    pub(super) fn add(&mut self, key: BalanceKey, callback: BalanceCallback) -> (SubscriptionId, bool) {
        let id = self.next_id;
        self.next_id += 1;
        let subscribers = self.subscribers.entry(key).or_default();
        subscribers.push((id, callback));
        (id, subscribers.len() == 1)
    }

    /// Removes the subscription. Returns `Some(true)` if the key has no
    /// subscribers left, `None` if the subscription was not registered.
    pub(super) fn remove(&mut self, key: &BalanceKey, id: SubscriptionId) -> Option<bool> {
        let subscribers = self.subscribers.get_mut(key)?;
        let pos = subscribers.iter().position(|(sid, _)| *sid == id)?;
        subscribers.remove(pos);
        if subscribers.is_empty() {
            self.subscribers.remove(key);
            Some(true)
        } else {
            Some(false)
        }
    }

    pub(super) fn callbacks(&self, key: &BalanceKey) -> Vec<BalanceCallback> {
        self.subscribers
            .get(key)
            .map(|s| s.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }

    pub(super) fn count(&self, key: &BalanceKey) -> usize {
        self.subscribers.get(key).map_or(0, Vec::len)
    }

    pub(super) fn clear(&mut self) {
        self.subscribers.clear();
    }
}

/// Handle of a balance subscription.
///
/// Dropping the handle unsubscribes; when the last subscriber of a key goes
/// away, the cached balance of that key is evicted.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription<L: Ledger> {
    cache: BalanceCache<L>,
    key: BalanceKey,
    id: SubscriptionId,
}

impl<L: Ledger> Subscription<L> {
    pub(super) fn new(cache: BalanceCache<L>, key: BalanceKey, id: SubscriptionId) -> Self {
        Self { cache, key, id }
    }

    pub fn key(&self) -> &BalanceKey {
        &self.key
    }

    /// Currently cached balance of the subscribed key, stale or not.
    pub fn current(&self) -> Option<BalanceEntry> {
        self.cache.get_cached(self.key.account(), self.key.asset())
    }

    /// Removes exactly this subscription.
    pub fn unsubscribe(self) {}
}

impl<L: Ledger> Drop for Subscription<L> {
    fn drop(&mut self) {
        self.cache.inner.unsubscribe(&self.key, self.id);
    }
}

impl<L: Ledger> std::fmt::Debug for Subscription<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
