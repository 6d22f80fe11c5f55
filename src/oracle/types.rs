//! Oracle wire format.

use fastnum::UD128;
use serde::{Deserialize, Deserializer};
use tokio::time::Instant;

use crate::{num, price::PriceEntry, types::FeedId};

/// Exponent assumed when the oracle omits one: prices carry 8 implied decimals.
pub const DEFAULT_EXPONENT: i32 = -8;

/// Response of the latest-price endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct OracleResponse {
    #[serde(default)]
    pub binary: Option<BinaryUpdate>,
    #[serde(default)]
    pub parsed: Vec<ParsedPrice>,
}

/// Signed update payload; forwarded as is, never interpreted here.
#[derive(Clone, Debug, Deserialize)]
pub struct BinaryUpdate {
    pub encoding: String,
    pub data: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ParsedPrice {
    pub id: String,
    pub price: PriceData,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PriceData {
    /// Fixed-point price, scaled by `10^expo`.
    #[serde(deserialize_with = "int_or_string")]
    pub price: i64,
    #[serde(default = "default_exponent")]
    pub expo: i32,
    pub publish_time: u64,
}

impl ParsedPrice {
    /// Converts the wire price into a cache entry.
    ///
    /// Returns `None` for malformed ids and non-positive prices.
    pub fn to_entry(&self, fetched_at: Instant) -> Option<PriceEntry> {
        let feed_id = FeedId::parse(&self.id).ok()?;
        let value = self.price.value()?;
        Some(PriceEntry::new(
            feed_id,
            value,
            self.price.publish_time,
            fetched_at,
        ))
    }
}

impl PriceData {
    /// Decimal price, `None` unless strictly positive.
    pub fn value(&self) -> Option<UD128> {
        if self.price <= 0 {
            return None;
        }
        let units = self.price as u128;
        if self.expo <= 0 {
            let decimals = u8::try_from(-self.expo).ok()?;
            Some(num::Converter::new(decimals).from_units(units))
        } else {
            let scale = 10u64.checked_pow(self.expo as u32)?;
            Some(num::Converter::new(0).from_units(units) * UD128::from(scale))
        }
    }
}

fn default_exponent() -> i32 {
    DEFAULT_EXPONENT
}

fn int_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(v) => Ok(v),
        IntOrString::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
