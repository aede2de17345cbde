use alloy_primitives::U256;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

use crate::proto::v1::TokenAmount;

/// A human-readable stablecoin amount, such as `"0.10"`, `"$1,000"` or `"2.5 USDC"`.
///
/// Never goes through a float: parsing and scaling to the token's smallest unit are exact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoneyAmount(pub Decimal);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyAmountParseError {
    #[error("Invalid number format")]
    InvalidFormat,
    #[error(
        "Amount must be between {} and {}",
        money_amount::MIN_STR,
        money_amount::MAX_STR
    )]
    OutOfRange,
    #[error("Negative value is not allowed")]
    Negative,
    #[error("Too big of a precision: {money} vs {token} on token")]
    WrongPrecision { money: u32, token: u32 },
}

mod money_amount {
    use super::*;

    pub const MIN_STR: &str = "0.000001";
    pub const MAX_STR: &str = "999999999";

    pub const MIN: Decimal = Decimal::from_parts(1, 0, 0, false, 6);
    pub const MAX: Decimal = Decimal::from_parts(999_999_999, 0, 0, false, 0);

    /// Everything that is not part of a plain decimal number: currency signs, thousands
    /// separators, unit suffixes.
    pub static NOISE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[^\d\.\-]+").ok());
}

impl MoneyAmount {
    pub fn parse(input: &str) -> Result<Self, MoneyAmountParseError> {
        let noise = money_amount::NOISE
            .as_ref()
            .ok_or(MoneyAmountParseError::InvalidFormat)?;
        let cleaned = noise.replace_all(input, "");

        let parsed =
            Decimal::from_str(&cleaned).map_err(|_| MoneyAmountParseError::InvalidFormat)?;

        if parsed.is_sign_negative() {
            return Err(MoneyAmountParseError::Negative);
        }

        if parsed < money_amount::MIN || parsed > money_amount::MAX {
            return Err(MoneyAmountParseError::OutOfRange);
        }

        Ok(MoneyAmount(parsed))
    }

    /// Digits after the decimal point in the original input.
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    /// Scale to the smallest unit of a token with `decimals` decimals.
    ///
    /// Fails with [`MoneyAmountParseError::WrongPrecision`] when the amount has more
    /// fractional digits than the token can represent.
    pub fn to_token_amount(&self, decimals: u32) -> Result<TokenAmount, MoneyAmountParseError> {
        let normalized = self.0.normalize();
        let scale = normalized.scale();
        if scale > decimals {
            return Err(MoneyAmountParseError::WrongPrecision {
                money: scale,
                token: decimals,
            });
        }
        let mantissa = normalized.mantissa().unsigned_abs();
        let multiplier = U256::from(10u64).pow(U256::from(decimals - scale));
        Ok(TokenAmount(U256::from(mantissa) * multiplier))
    }

    /// Inverse of [`MoneyAmount::to_token_amount`], for display.
    ///
    /// Amounts that do not fit a [`Decimal`] (about 7.9e28 units) saturate at its maximum.
    pub fn from_token_amount(amount: TokenAmount, decimals: u32) -> Self {
        let units = u128::try_from(amount.0)
            .ok()
            .and_then(|units| i128::try_from(units).ok())
            .and_then(|units| Decimal::try_from_i128_with_scale(units, decimals).ok())
            .unwrap_or(Decimal::MAX);
        MoneyAmount(units)
    }

    /// Fixed-point rendering with exactly `places` fractional digits, e.g. `0.10`.
    pub fn to_fixed(&self, places: u32) -> String {
        format!("{:.*}", places as usize, self.0.round_dp(places))
    }
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoneyAmount::parse(s)
    }
}

impl Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_human_amounts() {
        assert_eq!(
            MoneyAmount::parse("0.10").unwrap().to_token_amount(6).unwrap(),
            TokenAmount::from(100_000u64)
        );
        assert_eq!(
            MoneyAmount::parse("$1,000").unwrap().to_token_amount(6).unwrap(),
            TokenAmount::from(1_000_000_000u64)
        );
        assert_eq!(
            MoneyAmount::parse("2.5 USDC").unwrap().to_token_amount(6).unwrap(),
            TokenAmount::from(2_500_000u64)
        );
    }

    #[test]
    fn trailing_zeros_do_not_count_as_precision() {
        let amount = MoneyAmount::parse("1.50000000").unwrap();
        assert_eq!(
            amount.to_token_amount(6).unwrap(),
            TokenAmount::from(1_500_000u64)
        );
    }

    #[test]
    fn rejects_excess_precision() {
        let amount = MoneyAmount::parse("0.0000011").unwrap();
        assert_eq!(
            amount.to_token_amount(6),
            Err(MoneyAmountParseError::WrongPrecision { money: 7, token: 6 })
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            MoneyAmount::parse("abc"),
            Err(MoneyAmountParseError::InvalidFormat)
        );
        assert_eq!(
            MoneyAmount::parse("-1"),
            Err(MoneyAmountParseError::Negative)
        );
        assert_eq!(
            MoneyAmount::parse("0"),
            Err(MoneyAmountParseError::OutOfRange)
        );
        assert_eq!(
            MoneyAmount::parse("1000000000"),
            Err(MoneyAmountParseError::OutOfRange)
        );
    }

    #[test]
    fn formats_smallest_units() {
        let amount = MoneyAmount::from_token_amount(TokenAmount::from(100_000u64), 6);
        assert_eq!(amount.to_fixed(2), "0.10");
        assert_eq!(amount.to_fixed(6), "0.100000");
        assert_eq!(amount.to_string(), "0.1");

        let odd = MoneyAmount::from_token_amount(TokenAmount::from(1_234_567u64), 6);
        assert_eq!(odd.to_fixed(6), "1.234567");
    }
}
