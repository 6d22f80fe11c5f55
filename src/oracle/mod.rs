//! Price oracle gateway.
//!
//! [`PriceOracle`] is the seam between the [`crate::price::PriceCache`] and the
//! remote price service. Implementations batch all requested feeds into a single
//! round trip and absorb every failure: an unreachable oracle or a malformed
//! payload yields an empty map, never an error.

mod http;
mod types;

pub use http::HttpOracle;
pub use types::{BinaryUpdate, DEFAULT_EXPONENT, OracleResponse, ParsedPrice, PriceData};

use std::{collections::HashMap, future::Future, sync::Arc};

use crate::{price::PriceEntry, types::FeedId};

/// Source of price points.
pub trait PriceOracle: Send + Sync + 'static {
    /// Fetches the latest prices of the given feeds in one round trip.
    ///
    /// Feeds the oracle does not support, or does not return, are absent
    /// from the result.
    fn fetch_prices(
        &self,
        feed_ids: &[FeedId],
    ) -> impl Future<Output = HashMap<FeedId, PriceEntry>> + Send;
}

impl<T: PriceOracle> PriceOracle for Arc<T> {
    fn fetch_prices(
        &self,
        feed_ids: &[FeedId],
    ) -> impl Future<Output = HashMap<FeedId, PriceEntry>> + Send {
        (**self).fetch_prices(feed_ids)
    }
}
