use fastnum::{
    UD128, bint,
    decimal::{Context, RoundingMode},
};

/// Largest precision whose `10^decimals` still fits `u128`.
const MAX_UNIT_DECIMALS: u8 = 38;

/// Decimal to base-units converter for a fixed number of decimals.
///
/// Base units are the smallest indivisible integer amounts; conversion
/// from decimals always floors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Converter {
    decimals: u8,
}

impl Converter {
    pub fn new(decimals: u8) -> Self {
        Self { decimals }
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Parses a user-typed, non-negative decimal string.
    ///
    /// Only plain digit strings with at most one decimal point are accepted,
    /// which rules out signs, exponents and special values.
    pub fn parse(amount: &str) -> Option<UD128> {
        let amount = amount.trim();
        let mut dots = 0;
        let mut digits = 0;
        for c in amount.chars() {
            match c {
                '.' => dots += 1,
                '0'..='9' => digits += 1,
                _ => return None,
            }
        }
        if digits == 0 || dots > 1 {
            return None;
        }
        UD128::from_str(amount, floor_ctx()).ok()
    }

    /// Decimal value of the given base units.
    pub fn from_units(&self, units: u128) -> UD128 {
        let unscaled = bint::UInt::<2>::from_le_slice(&units.to_le_bytes())
            .expect("Converter: u128 -> UInt::<2>");
        UD128::from_parts(unscaled, -(self.decimals as i32), floor_ctx())
    }

    /// `floor(value * 10^decimals)`, or `None` if it does not fit `u128`.
    pub fn to_units(&self, value: UD128) -> Option<u128> {
        if self.decimals > MAX_UNIT_DECIMALS {
            return None;
        }
        let rescaled = value
            .with_rounding_mode(RoundingMode::Floor)
            .rescale(self.decimals as i16);
        let bytes = rescaled.digits().to_radix_le(256);
        if bytes.len() > 16 {
            return None;
        }
        Some(bytes.iter().rev().fold(0u128, |acc, b| (acc << 8) | *b as u128))
    }

    /// Base units of a user-typed amount, `None` if the amount is invalid.
    pub fn parse_units(&self, amount: &str) -> Option<u128> {
        Self::parse(amount).and_then(|v| self.to_units(v))
    }

    /// Human-readable amount without trailing fractional zeros.
    pub fn format(&self, units: u128) -> String {
        let (int, frac) = self.split(units);
        let frac = frac.trim_end_matches('0');
        if frac.is_empty() {
            int
        } else {
            format!("{int}.{frac}")
        }
    }

    /// Amount with exactly `decimals` fractional digits.
    pub fn format_fixed(&self, units: u128) -> String {
        let (int, frac) = self.split(units);
        if frac.is_empty() {
            int
        } else {
            format!("{int}.{frac}")
        }
    }

    /// Decimal value formatted with [`Self::format`], `None` if out of range.
    pub fn format_decimal(&self, value: UD128) -> Option<String> {
        self.to_units(value).map(|u| self.format(u))
    }

    fn split(&self, units: u128) -> (String, String) {
        let decimals = self.decimals as usize;
        if decimals == 0 {
            return (units.to_string(), String::new());
        }
        let padded = format!("{units:0width$}", width = decimals + 1);
        let (int, frac) = padded.split_at(padded.len() - decimals);
        (int.to_string(), frac.to_string())
    }
}

/// Formats base units of a token with the given decimals.
pub fn format_balance(units: u64, decimals: u8) -> String {
    Converter::new(decimals).format(units as u128)
}

fn floor_ctx() -> Context {
    Context::default().with_rounding_mode(RoundingMode::Floor)
}
