//! Swap calculator.
//!
//! Pure functions deriving the amounts displayed while a swap is composed.
//! Amounts are user-facing decimal strings; anything requiring exactness is
//! done on [`fastnum`] decimals and floored to the token's base units.
//!
//! Invalid input never errors: an empty string means "cannot compute" and an
//! empty [`AmountUpdate`] means "leave the amounts as they are".

use fastnum::{UD128, udec128};

use crate::{
    num::Converter,
    oracle::PriceOracle,
    price::PriceCache,
    types::{EditedField, SwapIntent, Token},
};

/// Decimal places of minimum-out amounts.
pub const MIN_OUT_DECIMALS: u8 = 8;

/// Decimal places of USD values.
pub const USD_DECIMALS: u8 = 2;

const HUNDRED: UD128 = udec128!(100);

/// Minimum amount to receive given the tolerated slippage:
/// `buy_amount * (1 - slippage_pct / 100)`, floored to 8 decimal places.
///
/// Returns an empty string if the amount is not a positive number or if
/// the slippage leaves nothing to receive.
pub fn calculate_min_amount_out(buy_amount: &str, slippage_pct: UD128) -> String {
    let Some(amount) = Converter::parse(buy_amount).filter(|a| !a.is_zero()) else {
        return String::new();
    };
    if slippage_pct >= HUNDRED {
        return String::new();
    }
    let min_out = amount * (HUNDRED - slippage_pct) / HUNDRED;
    let converter = Converter::new(MIN_OUT_DECIMALS);
    converter
        .to_units(min_out)
        .filter(|units| *units > 0)
        .map(|units| converter.format_fixed(units))
        .unwrap_or_default()
}

/// Current prices of the two sides of a swap.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PricePair {
    pub sell: Option<UD128>,
    pub buy: Option<UD128>,
}

impl PricePair {
    pub fn new(sell: UD128, buy: UD128) -> Self {
        Self {
            sell: Some(sell),
            buy: Some(buy),
        }
    }

    /// Reads both prices from the cache by the tokens' oracle feeds.
    pub fn from_cache<O: PriceOracle>(cache: &PriceCache<O>, sell: &Token, buy: &Token) -> Self {
        Self {
            sell: cache.get_price(sell.feed_id()).map(|e| e.value()),
            buy: cache.get_price(buy.feed_id()).map(|e| e.value()),
        }
    }

    /// Both prices, if present and strictly positive.
    pub fn loaded(&self) -> Option<(UD128, UD128)> {
        match (self.sell, self.buy) {
            (Some(sell), Some(buy)) if !sell.is_zero() && !buy.is_zero() => Some((sell, buy)),
            _ => None,
        }
    }
}

/// Amounts to write back into the [`SwapIntent`]. `None` fields are left
/// untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AmountUpdate {
    pub sell_amount: Option<String>,
    pub buy_amount: Option<String>,
}

impl AmountUpdate {
    pub fn is_empty(&self) -> bool {
        self.sell_amount.is_none() && self.buy_amount.is_none()
    }

    pub fn apply(self, intent: &mut SwapIntent) {
        if let Some(sell) = self.sell_amount {
            intent.sell_amount = sell;
        }
        if let Some(buy) = self.buy_amount {
            intent.buy_amount = buy;
        }
    }
}

/// Derives the counter-amount of the field the user edited last.
///
/// The conversion is slippage-free: the derived amount is the expected one,
/// slippage only enters through [`calculate_min_amount_out`]. The derived
/// amount is floored to the decimals of its token.
///
/// Returns an empty update unless both prices are present and positive.
/// An invalid or zero authoritative amount clears the counter-amount.
pub fn calculate_token_price(
    intent: &SwapIntent,
    prices: &PricePair,
    sell_decimals: u8,
    buy_decimals: u8,
) -> AmountUpdate {
    let Some((sell_price, buy_price)) = prices.loaded() else {
        return AmountUpdate::default();
    };

    match intent.last_edited {
        EditedField::Sell => AmountUpdate {
            sell_amount: None,
            buy_amount: Some(convert(
                &intent.sell_amount,
                sell_price,
                buy_price,
                buy_decimals,
            )),
        },
        EditedField::Buy => AmountUpdate {
            sell_amount: Some(convert(
                &intent.buy_amount,
                buy_price,
                sell_price,
                sell_decimals,
            )),
            buy_amount: None,
        },
    }
}

fn convert(amount: &str, from_price: UD128, to_price: UD128, to_decimals: u8) -> String {
    Converter::parse(amount)
        .filter(|a| !a.is_zero())
        .and_then(|a| Converter::new(to_decimals).format_decimal(a * from_price / to_price))
        .unwrap_or_default()
}

/// USD value of an amount, floored to cents. Empty if the amount is invalid.
pub fn usd_value(amount: &str, price: UD128) -> String {
    let converter = Converter::new(USD_DECIMALS);
    Converter::parse(amount)
        .and_then(|a| converter.to_units(a * price))
        .map(|cents| converter.format_fixed(cents))
        .unwrap_or_default()
}

/// Outcome of checking the sell amount against the wallet balance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BalanceValidation {
    pub has_insufficient_balance: bool,
    pub is_balance_loaded: bool,
}

/// Compares `floor(sell_amount * 10^decimals)` against `balance`.
///
/// An empty or invalid amount is never insufficient, and neither is any
/// amount while the balance has not been loaded yet. An amount too large
/// to express in base units always is.
pub fn get_balance_validation(
    sell_amount: &str,
    balance: Option<u64>,
    decimals: u8,
) -> BalanceValidation {
    let Some(balance) = balance else {
        return BalanceValidation {
            has_insufficient_balance: false,
            is_balance_loaded: false,
        };
    };
    let has_insufficient_balance = Converter::parse(sell_amount).is_some_and(|amount| {
        Converter::new(decimals)
            .to_units(amount)
            .is_none_or(|units| units > balance as u128)
    });
    BalanceValidation {
        has_insufficient_balance,
        is_balance_loaded: true,
    }
}

/// Everything [`can_perform_swap`] looks at.
#[derive(Clone, Copy, Debug)]
pub struct SwapReadiness<'a> {
    pub intent: &'a SwapIntent,
    pub prices: PricePair,
    /// Token registry has been loaded from the backend.
    pub tokens_loaded: bool,
    pub balance: BalanceValidation,
    /// A balance or quote fetch is in flight.
    pub fetching: bool,
}

/// Whether the swap can be submitted.
///
/// Stale balances do not block; only a balance known to be insufficient
/// does.
pub fn can_perform_swap(readiness: &SwapReadiness<'_>) -> bool {
    let positive = |amount: &str| Converter::parse(amount).is_some_and(|a| !a.is_zero());
    let intent = readiness.intent;

    positive(&intent.sell_amount)
        && positive(&intent.buy_amount)
        && readiness.prices.loaded().is_some()
        && intent.sell_symbol != intent.buy_symbol
        && readiness.tokens_loaded
        && !readiness.balance.has_insufficient_balance
        && !readiness.fetching
}

/// Display values of a swap being composed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Quote {
    pub sell_amount: String,
    pub buy_amount: String,
    pub min_amount_out: String,
    pub sell_usd: String,
    pub buy_usd: String,
}

impl Quote {
    /// Completes the intent's counter-amount and derives the display values.
    ///
    /// `None` unless both prices are loaded.
    pub fn new(intent: &SwapIntent, prices: &PricePair, sell: &Token, buy: &Token) -> Option<Self> {
        let (sell_price, buy_price) = prices.loaded()?;
        let mut intent = intent.clone();
        calculate_token_price(&intent, prices, sell.decimals(), buy.decimals()).apply(&mut intent);

        Some(Self {
            min_amount_out: calculate_min_amount_out(&intent.buy_amount, intent.slippage_pct),
            sell_usd: usd_value(&intent.sell_amount, sell_price),
            buy_usd: usd_value(&intent.buy_amount, buy_price),
            sell_amount: intent.sell_amount,
            buy_amount: intent.buy_amount,
        })
    }
}
