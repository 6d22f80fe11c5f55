use std::{
    collections::{HashMap, HashSet},
    future::Future,
    time::Duration,
};

use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use super::{OracleResponse, PriceOracle};
use crate::{error::ClientError, price::PriceEntry, types::FeedId};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Oracle gateway over HTTP.
///
/// Issues `GET {base}?ids=<id>&ids=<id>...` for the supported subset of
/// requested feeds.
#[derive(Clone, Debug)]
pub struct HttpOracle {
    client: reqwest::Client,
    base: Url,
    supported: HashSet<FeedId>,
}

impl HttpOracle {
    pub fn new(base: Url, supported: HashSet<FeedId>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self::with_client(client, base, supported))
    }

    pub fn with_client(client: reqwest::Client, base: Url, supported: HashSet<FeedId>) -> Self {
        Self {
            client,
            base,
            supported,
        }
    }

    pub fn supported(&self) -> &HashSet<FeedId> {
        &self.supported
    }

    /// Requested feeds the gateway is allowed to query, in request order.
    fn filter_supported(&self, feed_ids: &[FeedId]) -> Vec<FeedId> {
        feed_ids
            .iter()
            .filter(|id| self.supported.contains(*id))
            .cloned()
            .collect()
    }

    async fn request(&self, feed_ids: &[FeedId]) -> Result<OracleResponse, ClientError> {
        let query = feed_ids
            .iter()
            .map(|id| ("ids", id.to_string()))
            .collect::<Vec<_>>();
        let resp = self
            .client
            .get(self.base.clone())
            .query(&query)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

impl PriceOracle for HttpOracle {
    fn fetch_prices(
        &self,
        feed_ids: &[FeedId],
    ) -> impl Future<Output = HashMap<FeedId, PriceEntry>> + Send {
        let wanted = self.filter_supported(feed_ids);
        async move {
            if wanted.is_empty() {
                return HashMap::new();
            }
            let resp = match self.request(&wanted).await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(%e, feeds = wanted.len(), "Oracle request failed");
                    return HashMap::new();
                }
            };
            let fetched_at = Instant::now();
            let prices = resp
                .parsed
                .iter()
                .filter_map(|p| p.to_entry(fetched_at))
                .filter(|e| wanted.contains(e.feed_id()))
                .map(|e| (e.feed_id().clone(), e))
                .collect::<HashMap<_, _>>();
            debug!(requested = wanted.len(), received = prices.len(), "Oracle prices fetched");
            prices
        }
    }
}
