use candid::Nat;
use num_format::{Locale, ToFormattedString};
use num_traits::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::ConversionError;
use crate::tokens::token::Token;

// rust_decimal keeps at most 28 fractional digits.
const MAX_DECIMALS: u8 = 28;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAmount {
    pub token: Token,
    pub value: Nat, // smallest units (10^decimals)
}

/// Parses user input such as `"1.5"`, `".5"` or `"2"` into an exact decimal.
///
/// Signs, exponents and separators are rejected. Fraction digits beyond what a
/// decimal can hold are truncated, which is harmless because every token
/// quantizes to far fewer places.
pub fn parse_decimal(input: &str) -> Result<Decimal, ConversionError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ConversionError::Empty);
    }
    if trimmed.starts_with('-') {
        return Err(ConversionError::Negative);
    }

    let malformed = || ConversionError::Malformed {
        input: trimmed.to_string(),
    };

    let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(malformed());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed());
    }

    let whole = if whole.is_empty() { "0" } else { whole };
    let frac = &frac[..frac.len().min(MAX_DECIMALS as usize)];
    let normalized = if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{frac}")
    };

    Decimal::from_str_exact(&normalized).map_err(|_| ConversionError::Overflow)
}

/// Converts a decimal amount into an exact count of smallest units.
///
/// The amount is quantized to `decimals` places (truncating toward zero)
/// before it is scaled, so the result never carries binary-fraction drift and
/// never exceeds what the user asked for.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<Nat, ConversionError> {
    if decimals > MAX_DECIMALS {
        return Err(ConversionError::UnsupportedScale { decimals });
    }
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ConversionError::Negative);
    }

    let quantized = amount.round_dp_with_strategy(u32::from(decimals), RoundingStrategy::ToZero);
    let factor = Decimal::from_i128_with_scale(10i128.pow(u32::from(decimals)), 0);

    let units = quantized
        .checked_mul(factor)
        .ok_or(ConversionError::Overflow)?
        .trunc()
        .to_u128()
        .ok_or(ConversionError::Overflow)?;

    Ok(Nat::from(units))
}

/// Renders smallest units back into an exact decimal with `decimals` places.
pub fn from_base_units(units: &Nat, decimals: u8) -> Result<Decimal, ConversionError> {
    if decimals > MAX_DECIMALS {
        return Err(ConversionError::UnsupportedScale { decimals });
    }
    let raw = units.0.to_i128().ok_or(ConversionError::Overflow)?;
    Decimal::try_from_i128_with_scale(raw, u32::from(decimals)).map_err(|_| ConversionError::Overflow)
}

impl TokenAmount {
    pub fn zero(token: Token) -> Self {
        Self {
            token,
            value: Nat::from(0u8),
        }
    }

    pub fn from_units(token: Token, value: impl Into<Nat>) -> Self {
        Self {
            token,
            value: value.into(),
        }
    }

    pub fn from_decimal(token: Token, amount: Decimal) -> Result<Self, ConversionError> {
        let value = to_base_units(amount, token.decimals())?;
        Ok(Self { token, value })
    }

    pub fn parse(token: Token, input: &str) -> Result<Self, ConversionError> {
        Self::from_decimal(token, parse_decimal(input)?)
    }

    pub fn to_decimal(&self) -> Result<Decimal, ConversionError> {
        from_base_units(&self.value, self.token.decimals())
    }

    /// `max(self - other, 0)` in smallest units.
    pub fn saturating_sub(&self, other: &Nat) -> Self {
        let value = if self.value > *other {
            self.value.clone() - other.clone()
        } else {
            Nat::from(0u8)
        };
        Self {
            token: self.token,
            value,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.value == Nat::from(0u8)
    }

    /// `SYMBOL: 1,234.56780000`, always with the full token precision.
    pub fn formatted(&self) -> String {
        let Some((int_part, frac_part)) = self.split() else {
            return format!("{}: {} units", self.token.symbol(), self.value);
        };

        let decimals = self.token.decimals() as usize;
        if decimals > 0 {
            format!(
                "{}: {}.{:0>width$}",
                self.token.symbol(),
                int_part.to_formatted_string(&Locale::en),
                frac_part,
                width = decimals
            )
        } else {
            format!("{}: {}", self.token.symbol(), int_part.to_formatted_string(&Locale::en))
        }
    }

    /// Shortest exact decimal, e.g. `1.5` for 150_000_000 e8s.
    pub fn plain(&self) -> String {
        let Some((int_part, frac_part)) = self.split() else {
            return self.value.0.to_string();
        };

        let frac = format!("{:0>width$}", frac_part, width = self.token.decimals() as usize);
        let frac = frac.trim_end_matches('0');
        if frac.is_empty() {
            int_part.to_string()
        } else {
            format!("{int_part}.{frac}")
        }
    }

    fn split(&self) -> Option<(u128, u128)> {
        let raw = self.value.0.to_u128()?;
        let scale = 10u128.pow(u32::from(self.token.decimals()));
        Some((raw / scale, raw % scale))
    }
}
