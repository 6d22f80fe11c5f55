//! Backend HTTP client.
//!
//! Covers the pool registry, note submission and the faucet. Submissions move
//! funds, so nothing here is retried: a rejection is returned to the caller
//! with the server's message.

use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::ClientError,
    types::{AccountId, AssetId, NoteKind, PoolInfo, TokenRegistry, TransactionId},
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct PoolsInfoResponse {
    liquidity_pools: Vec<PoolInfo>,
}

#[derive(Debug, Serialize)]
struct SubmitNoteRequest {
    note_data: String,
}

#[derive(Debug, Deserialize)]
struct SubmitNoteResponse {
    success: bool,
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct MintRequest<'a> {
    account_id: &'a AccountId,
    faucet_id: &'a AssetId,
}

#[derive(Debug, Deserialize)]
struct MintResponse {
    success: bool,
    #[serde(default)]
    transaction_id: Option<TransactionId>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client of the exchange backend.
#[derive(Clone, Debug)]
pub struct BackendClient {
    client: reqwest::Client,
    base: Url,
}

impl BackendClient {
    pub fn new(base: Url) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self::with_client(client, base))
    }

    pub fn with_client(client: reqwest::Client, mut base: Url) -> Self {
        // endpoints are joined relative to the base path
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { client, base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Liquidity pools supported by the exchange.
    pub async fn pools_info(&self) -> Result<Vec<PoolInfo>, ClientError> {
        let resp = self
            .client
            .get(self.endpoint("pools/info")?)
            .send()
            .await?
            .error_for_status()?
            .json::<PoolsInfoResponse>()
            .await?;
        debug!(pools = resp.liquidity_pools.len(), "Pools info fetched");
        Ok(resp.liquidity_pools)
    }

    /// Token registry built from [`Self::pools_info`].
    pub async fn token_registry(&self) -> Result<TokenRegistry, ClientError> {
        Ok(TokenRegistry::from_pools(&self.pools_info().await?))
    }

    /// Forwards a serialized note. Returns the order ID assigned by the
    /// backend, if any.
    pub async fn submit_note(
        &self,
        kind: NoteKind,
        note: &[u8],
    ) -> Result<Option<String>, ClientError> {
        let req = SubmitNoteRequest {
            note_data: base64::engine::general_purpose::STANDARD.encode(note),
        };
        let resp: SubmitNoteResponse = self.post(kind.endpoint(), &req).await?;
        if !resp.success {
            let message = resp.message.unwrap_or_else(|| "note rejected".to_string());
            warn!(?kind, %message, "Backend rejected note");
            return Err(ClientError::Rejected(message));
        }
        info!(?kind, order_id = ?resp.order_id, "Note submitted");
        Ok(resp.order_id)
    }

    /// Requests test tokens from the faucet. Rate limiting is enforced by
    /// the backend and surfaces as a rejection.
    pub async fn mint(
        &self,
        account: &AccountId,
        faucet: &AssetId,
    ) -> Result<Option<TransactionId>, ClientError> {
        let req = MintRequest {
            account_id: account,
            faucet_id: faucet,
        };
        let resp: MintResponse = self.post("faucets/mint", &req).await?;
        if !resp.success {
            let message = resp
                .error
                .or(resp.message)
                .unwrap_or_else(|| "mint rejected".to_string());
            warn!(%account, %faucet, %message, "Faucet rejected mint");
            return Err(ClientError::Rejected(message));
        }
        info!(%account, %faucet, tx = ?resp.transaction_id, "Mint requested");
        Ok(resp.transaction_id)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path)
            .map_err(|e| ClientError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    /// Posts `body` and decodes the response even for error statuses, since
    /// the backend reports rejections in the body.
    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ClientError> {
        let resp = self
            .client
            .post(self.endpoint(path)?)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            if status.is_success() {
                ClientError::from(e)
            } else {
                ClientError::Transport(format!("HTTP {status}"))
            }
        })
    }
}
