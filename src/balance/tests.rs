//! Tests for the balance cache and subscriptions.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::*;
use crate::testing::MockLedger;

const TTL: Duration = Duration::from_secs(10);
const LEDGER_DELAY: Duration = Duration::from_millis(200);

fn ids() -> (AccountId, AssetId, AssetId) {
    (
        AccountId::new("0xalice"),
        AssetId::new("0xfaucet_btc"),
        AssetId::new("0xfaucet_usdc"),
    )
}

fn cache(ledger: &Arc<MockLedger>) -> BalanceCache<Arc<MockLedger>> {
    BalanceCache::new(Arc::clone(ledger), TTL)
}

/// Subscribes with a callback forwarding balances into a channel.
fn channel_subscriber(
    cache: &BalanceCache<Arc<MockLedger>>,
    account: &AccountId,
    asset: &AssetId,
) -> (Subscription<Arc<MockLedger>>, mpsc::UnboundedReceiver<u64>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = cache.subscribe(account, asset, move |e| {
        _ = tx.send(e.balance());
    });
    (sub, rx)
}

// ============================================================================
// CACHE
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cached_balance_served_within_ttl() {
    let (alice, btc, _) = ids();
    let ledger = Arc::new(MockLedger::new());
    ledger.set_balance(&alice, &btc, 100);
    let balances = cache(&ledger);

    let first = balances.get_balance(&alice, &btc, true).await.unwrap();
    assert_eq!(first.balance(), 100);

    ledger.set_balance(&alice, &btc, 200);
    tokio::time::advance(TTL - Duration::from_millis(1)).await;
    assert_eq!(balances.get_balance(&alice, &btc, true).await.unwrap(), first);
    assert_eq!(ledger.balance_calls(&alice, &btc), 1);

    tokio::time::advance(Duration::from_millis(1)).await;
    let refreshed = balances.get_balance(&alice, &btc, true).await.unwrap();
    assert_eq!(refreshed.balance(), 200);
    assert_eq!(ledger.balance_calls(&alice, &btc), 2);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_bypasses_cache() {
    let (alice, btc, _) = ids();
    let ledger = Arc::new(MockLedger::new());
    ledger.set_balance(&alice, &btc, 100);
    let balances = cache(&ledger);

    balances.get_balance(&alice, &btc, true).await.unwrap();
    ledger.set_balance(&alice, &btc, 150);
    let entry = balances.refresh_balance(&alice, &btc).await.unwrap();

    assert_eq!(entry.balance(), 150);
    assert_eq!(balances.get_cached(&alice, &btc), Some(entry));
    assert_eq!(ledger.balance_calls(&alice, &btc), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_fetches_coalesce_per_key() {
    let (alice, btc, usdc) = ids();
    let ledger = Arc::new(MockLedger::new().with_delay(LEDGER_DELAY));
    ledger.set_balance(&alice, &btc, 1);
    ledger.set_balance(&alice, &usdc, 2);
    let balances = cache(&ledger);

    let started = Instant::now();
    let (a, b, c) = tokio::join!(
        balances.get_balance(&alice, &btc, true),
        balances.get_balance(&alice, &btc, true),
        balances.get_balance(&alice, &usdc, true),
    );

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(c.unwrap().balance(), 2);
    assert_eq!(ledger.balance_calls(&alice, &btc), 1);
    assert_eq!(ledger.balance_calls(&alice, &usdc), 1);
    // different keys were fetched in parallel
    assert!(started.elapsed() < LEDGER_DELAY * 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_caller_does_not_abort_fetch() {
    let (alice, btc, _) = ids();
    let ledger = Arc::new(MockLedger::new().with_delay(LEDGER_DELAY));
    ledger.set_balance(&alice, &btc, 42);
    let balances = cache(&ledger);

    let caller = tokio::spawn({
        let balances = balances.clone();
        let (alice, btc) = (alice.clone(), btc.clone());
        async move { balances.get_balance(&alice, &btc, false).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    tokio::time::sleep(LEDGER_DELAY).await;
    assert_eq!(balances.get_cached(&alice, &btc).map(|e| e.balance()), Some(42));
    assert!(balances.inner.in_flight.is_empty());
    assert_eq!(ledger.balance_calls(&alice, &btc), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_account_is_imported_once() {
    let (alice, btc, _) = ids();
    let ledger = Arc::new(MockLedger::new());
    ledger.set_importable_balance(&alice, &btc, 5);
    let balances = cache(&ledger);

    assert_eq!(balances.get_balance(&alice, &btc, true).await.unwrap().balance(), 5);
    balances.refresh_balance(&alice, &btc).await.unwrap();
    assert_eq!(ledger.imports(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_keeps_previous_entry() {
    let (alice, btc, _) = ids();
    let ledger = Arc::new(MockLedger::new());
    ledger.set_balance(&alice, &btc, 100);
    let balances = cache(&ledger);

    let before = balances.get_balance(&alice, &btc, true).await.unwrap();
    ledger.fail_account(&alice);

    let err = balances.refresh_balance(&alice, &btc).await.unwrap_err();
    assert!(matches!(err, LedgerError::Other(_)));
    assert_eq!(balances.get_cached(&alice, &btc), Some(before));
}

#[tokio::test(start_paused = true)]
async fn test_unresolvable_account_propagates() {
    let (alice, btc, _) = ids();
    let ledger = Arc::new(MockLedger::new());
    let balances = cache(&ledger);

    assert_eq!(
        balances.get_balance(&alice, &btc, true).await,
        Err(LedgerError::AccountNotFound(alice.clone()))
    );
    assert!(balances.get_cached(&alice, &btc).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_corrupted_store_is_recreated() {
    let (alice, btc, _) = ids();
    let ledger = Arc::new(MockLedger::new());
    ledger.set_balance(&alice, &btc, 9);
    ledger.corrupt_store(1);
    let balances = cache(&ledger);

    assert_eq!(balances.get_balance(&alice, &btc, true).await.unwrap().balance(), 9);
    assert_eq!(ledger.resets(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_all_isolates_failures() {
    let (alice, btc, usdc) = ids();
    let bob = AccountId::new("0xbob");
    let ledger = Arc::new(MockLedger::new());
    ledger.set_balance(&alice, &btc, 1);
    ledger.set_balance(&alice, &usdc, 2);
    ledger.set_balance(&bob, &btc, 3);
    let balances = cache(&ledger);
    for (acc, asset) in [(&alice, &btc), (&alice, &usdc), (&bob, &btc)] {
        balances.get_balance(acc, asset, true).await.unwrap();
    }

    ledger.fail_account(&bob);
    ledger.set_balance(&alice, &btc, 10);
    ledger.set_balance(&alice, &usdc, 20);

    assert_eq!(balances.refresh_all_balances().await, 1);
    assert_eq!(balances.get_cached(&alice, &btc).unwrap().balance(), 10);
    assert_eq!(balances.get_cached(&alice, &usdc).unwrap().balance(), 20);
    assert_eq!(balances.get_cached(&bob, &btc).unwrap().balance(), 3);
}

// ============================================================================
// SUBSCRIPTIONS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_first_subscriber_seeds_balance() {
    let (alice, btc, _) = ids();
    let ledger = Arc::new(MockLedger::new());
    ledger.set_balance(&alice, &btc, 42);
    let balances = cache(&ledger);

    let (sub, mut rx) = channel_subscriber(&balances, &alice, &btc);
    assert_eq!(rx.recv().await, Some(42));
    assert_eq!(sub.current().map(|e| e.balance()), Some(42));

    // second subscriber does not trigger another fetch
    let _other = balances.subscribe(&alice, &btc, |_| {});
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(ledger.balance_calls(&alice, &btc), 1);
    assert_eq!(balances.subscriber_count(&alice, &btc), 2);
}

#[tokio::test(start_paused = true)]
async fn test_update_fans_out_in_registration_order() {
    let (alice, btc, usdc) = ids();
    let ledger = Arc::new(MockLedger::new().with_delay(LEDGER_DELAY));
    ledger.set_balance(&alice, &btc, 7);
    ledger.set_balance(&alice, &usdc, 8);
    let balances = cache(&ledger);

    let log = Arc::new(Mutex::new(Vec::new()));
    let subs = (0..3)
        .map(|n| {
            let log = Arc::clone(&log);
            balances.subscribe(&alice, &btc, move |e| {
                log.lock().unwrap().push((n, e.balance()));
            })
        })
        .collect::<Vec<_>>();
    let (_usdc_sub, _usdc_rx) = channel_subscriber(&balances, &alice, &usdc);

    // the seed fetch spawned by the first subscriber joins this one
    balances.refresh_balance(&alice, &btc).await.unwrap();
    tokio::time::sleep(LEDGER_DELAY).await;

    assert_eq!(*log.lock().unwrap(), vec![(0, 7), (1, 7), (2, 7)]);
    assert_eq!(ledger.balance_calls(&alice, &btc), 1);
    drop(subs);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_subscriber_does_not_block_others() {
    let (alice, btc, _) = ids();
    let ledger = Arc::new(MockLedger::new());
    ledger.set_balance(&alice, &btc, 3);
    let balances = cache(&ledger);

    let (_first, mut first_rx) = channel_subscriber(&balances, &alice, &btc);
    let _panicking = balances.subscribe(&alice, &btc, |_| panic!("subscriber failure"));
    let (_last, mut last_rx) = channel_subscriber(&balances, &alice, &btc);

    assert_eq!(first_rx.recv().await, Some(3));
    assert_eq!(last_rx.recv().await, Some(3));

    ledger.set_balance(&alice, &btc, 4);
    balances.refresh_balance(&alice, &btc).await.unwrap();
    assert_eq!(first_rx.recv().await, Some(4));
    assert_eq!(last_rx.recv().await, Some(4));
}

#[tokio::test(start_paused = true)]
async fn test_last_unsubscribe_evicts_entry() {
    let (alice, btc, _) = ids();
    let ledger = Arc::new(MockLedger::new());
    ledger.set_balance(&alice, &btc, 11);
    let balances = cache(&ledger);

    let (first, mut rx) = channel_subscriber(&balances, &alice, &btc);
    let second = balances.subscribe(&alice, &btc, |_| {});
    assert_eq!(rx.recv().await, Some(11));

    first.unsubscribe();
    assert!(balances.get_cached(&alice, &btc).is_some());
    drop(second);
    assert!(balances.get_cached(&alice, &btc).is_none());
    assert_eq!(balances.subscriber_count(&alice, &btc), 0);

    // a new subscriber gets a fresh fetch, not a stale value
    ledger.set_balance(&alice, &btc, 12);
    let (_again, mut rx) = channel_subscriber(&balances, &alice, &btc);
    assert_eq!(rx.recv().await, Some(12));
    assert_eq!(ledger.balance_calls(&alice, &btc), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clear_drops_entries_and_subscriptions() {
    let (alice, btc, usdc) = ids();
    let ledger = Arc::new(MockLedger::new());
    ledger.set_balance(&alice, &btc, 1);
    ledger.set_balance(&alice, &usdc, 2);
    let balances = cache(&ledger);

    let (stale_sub, mut rx) = channel_subscriber(&balances, &alice, &btc);
    assert_eq!(rx.recv().await, Some(1));
    balances.get_balance(&alice, &usdc, true).await.unwrap();

    balances.clear_balance_caches();
    assert!(balances.get_cached(&alice, &btc).is_none());
    assert!(balances.get_cached(&alice, &usdc).is_none());
    assert_eq!(balances.subscriber_count(&alice, &btc), 0);

    // handles from before the clear must not evict newer entries
    let (_fresh, mut fresh_rx) = channel_subscriber(&balances, &alice, &btc);
    assert_eq!(fresh_rx.recv().await, Some(1));
    drop(stale_sub);
    assert!(balances.get_cached(&alice, &btc).is_some());

    // the stale subscriber no longer receives updates
    balances.refresh_balance(&alice, &btc).await.unwrap();
    assert!(rx.try_recv().is_err());
}
