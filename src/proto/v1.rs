use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::timestamp::UnixTimestamp;

/// Version 1 of the x402 protocol.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct X402Version1;

impl X402Version1 {
    pub const VALUE: u8 = 1;
}

impl From<X402Version1> for u8 {
    fn from(_: X402Version1) -> Self {
        X402Version1::VALUE
    }
}

impl Serialize for X402Version1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version1 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        if num == Self::VALUE {
            Ok(X402Version1)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected version {}, got {}",
                Self::VALUE,
                num
            )))
        }
    }
}

impl Display for X402Version1 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::VALUE)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub enum ExactScheme {
    #[serde(rename = "exact")]
    Exact,
}

impl ExactScheme {
    pub const NAME: &'static str = "exact";
}

impl Display for ExactScheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(Self::NAME)
    }
}

/// Token amount in the smallest unit of the asset (USDC has 6 decimals).
///
/// Serialized as a decimal integer string so that values never pass through a float.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(pub U256);

impl TokenAmount {
    pub fn inner(&self) -> U256 {
        self.0
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        TokenAmount(U256::from(value))
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        TokenAmount(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid token amount {0:?}: expected a non-negative decimal integer")]
pub struct TokenAmountParseError(pub String);

impl FromStr for TokenAmount {
    type Err = TokenAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenAmountParseError(s.to_string()));
        }
        U256::from_str_radix(trimmed, 10)
            .map(TokenAmount)
            .map_err(|_| TokenAmountParseError(s.to_string()))
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The 32-byte EIP-3009 authorization nonce.
///
/// Clients produce it either as `0x`-prefixed hex (possibly shorter than 32 bytes) or as a
/// decimal integer. Both are normalized to the fixed-width big-endian value the contract expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuthorizationNonce(pub B256);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid authorization nonce {0:?}: expected up to 32 bytes of hex or a decimal integer")]
pub struct AuthorizationNonceParseError(pub String);

impl FromStr for AuthorizationNonce {
    type Err = AuthorizationNonceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || AuthorizationNonceParseError(s.to_string());
        let trimmed = s.trim();
        let value = if let Some(hex_digits) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            if hex_digits.is_empty() || hex_digits.len() > 64 {
                return Err(err());
            }
            U256::from_str_radix(hex_digits, 16).map_err(|_| err())?
        } else {
            if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err());
            }
            U256::from_str_radix(trimmed, 10).map_err(|_| err())?
        };
        Ok(AuthorizationNonce(B256::from(value)))
    }
}

impl Display for AuthorizationNonce {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for AuthorizationNonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for AuthorizationNonce {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// EIP-3009 `TransferWithAuthorization` intent signed off-chain by the payer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub from: Address,
    pub to: Address,
    pub value: TokenAmount,
    pub valid_after: UnixTimestamp,
    pub valid_before: UnixTimestamp,
    pub nonce: AuthorizationNonce,
}

/// Signature and authorization carried inside a payment payload.
///
/// Both fields are optional on the wire so that a structurally incomplete payload is
/// reported as such instead of as an opaque JSON error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<Authorization>,
}

/// Signed payment sent by the client in the `X-PAYMENT` header.
///
/// `x402_version` and `scheme` are kept raw: rejecting an unsupported version is a
/// settlement outcome, not a decoding failure. The version is any JSON number, so `300`
/// or `1.5` still decode and are refused later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: serde_json::Number,
    #[serde(default)]
    pub scheme: String,
    #[serde(default)]
    pub network: String,
    pub payload: ExactEvmPayload,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirementsExtra {
    pub name: String,
}

/// Terms a payment-gated resource declares in its 402 response.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub x402_version: X402Version1,
    pub scheme: ExactScheme,
    pub network: String,
    pub max_amount_required: TokenAmount,
    pub resource: String,
    pub description: String,
    pub mime_type: String,
    pub pay_to: Address,
    pub max_timeout_seconds: u64,
    pub asset: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<PaymentRequirementsExtra>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn token_amount_is_a_decimal_string() {
        let amount: TokenAmount = serde_json::from_str("\"100000\"").unwrap();
        assert_eq!(amount, TokenAmount::from(100_000u64));
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"100000\"");

        let huge = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        let amount: TokenAmount = huge.parse().unwrap();
        assert_eq!(amount.inner(), U256::MAX);
    }

    #[test]
    fn token_amount_rejects_non_integers() {
        assert!("0.1".parse::<TokenAmount>().is_err());
        assert!("-1".parse::<TokenAmount>().is_err());
        assert!("".parse::<TokenAmount>().is_err());
        assert!("1e6".parse::<TokenAmount>().is_err());
        assert!("0x10".parse::<TokenAmount>().is_err());
    }

    #[test]
    fn nonce_normalizes_to_32_bytes() {
        let full: AuthorizationNonce =
            "0x00000000000000000000000000000000000000000000000000000000000000ff"
                .parse()
                .unwrap();
        let short: AuthorizationNonce = "0xff".parse().unwrap();
        let decimal: AuthorizationNonce = "255".parse().unwrap();
        assert_eq!(full, short);
        assert_eq!(full, decimal);
        assert_eq!(
            full.to_string(),
            "0x00000000000000000000000000000000000000000000000000000000000000ff"
        );
    }

    #[test]
    fn nonce_rejects_oversized_and_garbage() {
        let too_long = format!("0x{}", "1".repeat(66));
        assert!(too_long.parse::<AuthorizationNonce>().is_err());
        assert!("0x".parse::<AuthorizationNonce>().is_err());
        assert!("0xzz".parse::<AuthorizationNonce>().is_err());
        assert!("nonce".parse::<AuthorizationNonce>().is_err());
    }

    #[test]
    fn requirements_wire_format() {
        let requirements = PaymentRequirements {
            x402_version: X402Version1,
            scheme: ExactScheme::Exact,
            network: "base".to_string(),
            max_amount_required: TokenAmount::from(100_000u64),
            resource: "/process".to_string(),
            description: "Chat".to_string(),
            mime_type: "application/json".to_string(),
            pay_to: address!("0x1111111111111111111111111111111111111111"),
            max_timeout_seconds: 3600,
            asset: address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            extra: None,
        };
        let json = serde_json::to_value(&requirements).unwrap();
        assert_eq!(json["x402Version"], 1);
        assert_eq!(json["scheme"], "exact");
        assert_eq!(json["maxAmountRequired"], "100000");
        assert_eq!(json["maxTimeoutSeconds"], 3600);
        assert!(json.get("extra").is_none());
    }
}
