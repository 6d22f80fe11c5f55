//! Boundary of the external ledger SDK.
//!
//! The SDK keeps a local persisted copy of account state which it syncs with the
//! node. Its operations are consumed as opaque async capabilities.

use std::{future::Future, sync::Arc};

use tracing::{debug, warn};

use crate::{
    error::LedgerError,
    types::{AccountId, AssetId},
};

/// Ledger SDK capabilities used by the client.
pub trait Ledger: Send + Sync + 'static {
    /// Syncs the local store with the node.
    fn sync_state(&self) -> impl Future<Output = Result<(), LedgerError>> + Send;

    /// Vault balance of the account in base units, or `None` if the account
    /// is not known to the local store.
    fn account_balance(
        &self,
        account: &AccountId,
        asset: &AssetId,
    ) -> impl Future<Output = Result<Option<u64>, LedgerError>> + Send;

    /// Imports an account into the local store by its ID.
    fn import_account(&self, account: &AccountId)
    -> impl Future<Output = Result<(), LedgerError>> + Send;

    /// Wipes and recreates the local persisted store.
    fn reset_store(&self) -> impl Future<Output = Result<(), LedgerError>> + Send;
}

impl<T: Ledger> Ledger for Arc<T> {
    fn sync_state(&self) -> impl Future<Output = Result<(), LedgerError>> + Send {
        (**self).sync_state()
    }

    fn account_balance(
        &self,
        account: &AccountId,
        asset: &AssetId,
    ) -> impl Future<Output = Result<Option<u64>, LedgerError>> + Send {
        (**self).account_balance(account, asset)
    }

    fn import_account(
        &self,
        account: &AccountId,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send {
        (**self).import_account(account)
    }

    fn reset_store(&self) -> impl Future<Output = Result<(), LedgerError>> + Send {
        (**self).reset_store()
    }
}

/// Runs a ledger operation, recreating the local store and retrying once
/// if the store turns out to be corrupted.
pub async fn with_store_recovery<L, T, F, Fut>(ledger: &L, op: F) -> Result<T, LedgerError>
where
    L: Ledger,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    match op().await {
        Err(LedgerError::StoreCorrupted(reason)) => {
            warn!(%reason, "Local store corrupted, recreating it and retrying");
            ledger.reset_store().await?;
            op().await
        }
        result => result,
    }
}

/// Reads an account balance, importing the account into the local store
/// first if it is not known yet.
pub async fn read_balance<L: Ledger>(
    ledger: &L,
    account: &AccountId,
    asset: &AssetId,
) -> Result<u64, LedgerError> {
    if let Some(balance) = ledger.account_balance(account, asset).await? {
        return Ok(balance);
    }
    debug!(%account, "Account not in local store, importing");
    ledger.import_account(account).await?;
    ledger
        .account_balance(account, asset)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(account.clone()))
}
