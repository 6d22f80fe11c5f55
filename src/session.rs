//! Wallet session.
//!
//! [`Session`] wires the caches, the backend and the wallet of one connected
//! user. Every fund-moving success schedules a reconciliation: after the
//! settle delay the ledger is synced and all cached balances are refreshed.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    api::BackendClient,
    balance::{BalanceCache, BalanceEntry, Subscription},
    error::{ClientError, LedgerError},
    ledger::{self, Ledger},
    oracle::PriceOracle,
    price::PriceCache,
    types::{AccountId, AssetId, NoteKind, TransactionId},
};

/// Default wait for external settlement before re-syncing.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(15);

/// Wallet extension capabilities.
pub trait Wallet: Send + Sync + 'static {
    /// Connects and returns the account of the wallet.
    fn connect(&self) -> impl Future<Output = Result<AccountId, ClientError>> + Send;

    /// Asks the user to sign and submit an opaque transaction payload.
    fn request_transaction(
        &self,
        payload: &[u8],
    ) -> impl Future<Output = Result<TransactionId, ClientError>> + Send;
}

impl<T: Wallet> Wallet for Arc<T> {
    fn connect(&self) -> impl Future<Output = Result<AccountId, ClientError>> + Send {
        (**self).connect()
    }

    fn request_transaction(
        &self,
        payload: &[u8],
    ) -> impl Future<Output = Result<TransactionId, ClientError>> + Send {
        (**self).request_transaction(payload)
    }
}

/// Syncs the ledger, then force-refreshes every cached balance.
///
/// Returns the number of balances that failed to refresh.
pub async fn reconcile<L: Ledger>(balances: &BalanceCache<L>) -> Result<usize, LedgerError> {
    let ledger = balances.ledger();
    ledger::with_store_recovery(ledger, || ledger.sync_state()).await?;
    Ok(balances.refresh_all_balances().await)
}

/// Caches, backend and wallet of one user session.
pub struct Session<O, L, W> {
    prices: PriceCache<O>,
    balances: BalanceCache<L>,
    backend: BackendClient,
    wallet: W,
    settle_delay: Duration,
    account: watch::Sender<Option<AccountId>>,
}

impl<O: PriceOracle, L: Ledger, W: Wallet> Session<O, L, W> {
    pub fn new(
        prices: PriceCache<O>,
        balances: BalanceCache<L>,
        backend: BackendClient,
        wallet: W,
    ) -> Self {
        Self {
            prices,
            balances,
            backend,
            wallet,
            settle_delay: DEFAULT_SETTLE_DELAY,
            account: watch::Sender::new(None),
        }
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn prices(&self) -> &PriceCache<O> {
        &self.prices
    }

    pub fn balances(&self) -> &BalanceCache<L> {
        &self.balances
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    /// Connected account, if any.
    pub fn account(&self) -> Option<AccountId> {
        self.account.borrow().clone()
    }

    /// Observes connection changes.
    pub fn watch_account(&self) -> watch::Receiver<Option<AccountId>> {
        self.account.subscribe()
    }

    pub async fn connect(&self) -> Result<AccountId, ClientError> {
        let account = self.wallet.connect().await?;
        info!(%account, "Wallet connected");
        self.account.send_replace(Some(account.clone()));
        Ok(account)
    }

    /// Forgets the account and wipes all balances and subscriptions.
    pub fn disconnect(&self) {
        if let Some(account) = self.account.send_replace(None) {
            info!(%account, "Wallet disconnected");
        }
        self.balances.clear_balance_caches();
    }

    /// Subscribes to a balance of the connected account.
    pub fn watch_balance<F>(&self, asset: &AssetId, callback: F) -> Result<Subscription<L>, ClientError>
    where
        F: Fn(&BalanceEntry) + Send + Sync + 'static,
    {
        let account = self.require_account()?;
        Ok(self.balances.subscribe(&account, asset, callback))
    }

    /// Signs and submits a transaction through the wallet.
    pub async fn request_transaction(&self, payload: &[u8]) -> Result<TransactionId, ClientError> {
        let account = self.require_account()?;
        match self.wallet.request_transaction(payload).await {
            Ok(tx) => {
                info!(%account, %tx, "Transaction submitted");
                self.schedule_reconcile();
                Ok(tx)
            }
            Err(e) => {
                warn!(%account, %e, "Transaction failed");
                Err(e)
            }
        }
    }

    /// Forwards a note to the backend.
    pub async fn submit_note(&self, kind: NoteKind, note: &[u8]) -> Result<Option<String>, ClientError> {
        self.require_account()?;
        let order_id = self.backend.submit_note(kind, note).await?;
        self.schedule_reconcile();
        Ok(order_id)
    }

    /// Requests test tokens of `faucet` for the connected account.
    pub async fn mint(&self, faucet: &AssetId) -> Result<Option<TransactionId>, ClientError> {
        let account = self.require_account()?;
        let tx = self.backend.mint(&account, faucet).await?;
        self.schedule_reconcile();
        Ok(tx)
    }

    /// Reconciles balances right away, without waiting for settlement.
    pub async fn reconcile(&self) -> Result<usize, ClientError> {
        Ok(reconcile(&self.balances).await?)
    }

    fn require_account(&self) -> Result<AccountId, ClientError> {
        self.account().ok_or(ClientError::NotConnected)
    }

    fn schedule_reconcile(&self) {
        let balances = self.balances.clone();
        let delay = self.settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match reconcile(&balances).await {
                Ok(0) => info!("Balances reconciled"),
                Ok(failed) => warn!(failed, "Balances partially reconciled"),
                Err(e) => warn!(%e, "Ledger sync failed, balances not reconciled"),
            }
        });
    }
}
