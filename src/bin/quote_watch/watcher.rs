//! Quote loop.
//!
//! Refreshes the prices of both sides of the swap through the cache and
//! prints a quote, once or on a fixed interval.

use std::time::Duration;

use swap_client::{
    oracle::PriceOracle,
    price::PriceCache,
    swap::{PricePair, Quote},
    types::{SwapIntent, Token, TokenRegistry},
};
use tracing::{info, warn};

use crate::error::{Error, Result};

pub struct QuoteWatcher<O> {
    prices: PriceCache<O>,
    sell: Token,
    buy: Token,
    intent: SwapIntent,
    interval: Option<Duration>,
}

impl<O: PriceOracle> QuoteWatcher<O> {
    pub fn try_new(
        prices: PriceCache<O>,
        registry: &TokenRegistry,
        intent: SwapIntent,
        interval: Option<Duration>,
    ) -> Result<Self> {
        let token = |symbol: &str| {
            registry
                .get(symbol)
                .cloned()
                .ok_or_else(|| Error::UnknownToken(symbol.to_string()))
        };
        let (sell, buy) = (token(&intent.sell_symbol)?, token(&intent.buy_symbol)?);
        info!(
            sell = %sell.symbol(),
            buy = %buy.symbol(),
            slippage = %intent.slippage_pct,
            ?interval,
            "Initializing quote watcher"
        );
        Ok(Self {
            prices,
            sell,
            buy,
            intent,
            interval,
        })
    }

    pub async fn run(&self) {
        let feeds = [self.sell.feed_id().clone(), self.buy.feed_id().clone()];
        loop {
            self.prices.refresh_prices(&feeds, false).await;
            self.print_quote();

            let Some(interval) = self.interval else {
                break;
            };
            tokio::time::sleep(interval).await;
        }
    }

    fn print_quote(&self) {
        let pair = PricePair::from_cache(&self.prices, &self.sell, &self.buy);
        let Some(quote) = Quote::new(&self.intent, &pair, &self.sell, &self.buy) else {
            warn!(sell = ?pair.sell, buy = ?pair.buy, "Prices not available yet");
            return;
        };
        println!(
            "{} {} (${}) -> {} {} (${}), min received {} {} at {}% slippage",
            quote.sell_amount,
            self.sell.symbol(),
            quote.sell_usd,
            quote.buy_amount,
            self.buy.symbol(),
            quote.buy_usd,
            quote.min_amount_out,
            self.buy.symbol(),
            self.intent.slippage_pct,
        );
    }
}
