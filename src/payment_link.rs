//! Shareable payment requests.
//!
//! A link is self-describing: the recipient, amount, network and description are packed
//! into the link id itself as URL-safe base64 of a compact JSON object, so nothing is stored
//! server-side. Executing a link settles a payment against the link's amount and recipient
//! exactly like a gated request does.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::networks::{NetworkRegistry, USDC_DECIMALS};
use crate::proto::v1::TokenAmount;
use crate::util::{Base64Bytes, MoneyAmount, MoneyAmountParseError};

pub const PAYMENT_LINK_VERSION: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PaymentLinkError {
    #[error("Invalid recipient address")]
    InvalidRecipient,
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] MoneyAmountParseError),
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),
    #[error("Invalid payment link")]
    InvalidLink,
    #[error("Failed to encode payment link: {0}")]
    Encode(#[from] serde_json::Error),
}

fn default_network() -> String {
    "base".to_string()
}

/// Decoded content of a link id. Field names are kept to one letter to keep links short.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLink {
    #[serde(rename = "v")]
    pub version: u8,
    #[serde(rename = "r")]
    pub recipient: Address,
    /// Smallest USDC unit.
    #[serde(rename = "a")]
    pub amount: TokenAmount,
    #[serde(rename = "n", default = "default_network")]
    pub network: String,
    #[serde(rename = "d", default)]
    pub description: String,
    /// Creation time, unix milliseconds.
    #[serde(rename = "t", default)]
    pub created_at: u64,
}

impl PaymentLink {
    /// Validate a request for a new link.
    ///
    /// `amount` is in whole USDC (`"0.10"`) and may have at most six fractional digits.
    /// `recipient` must be `0x` followed by exactly 40 hex digits.
    pub fn create(
        recipient: &str,
        amount: &str,
        network: &str,
        description: Option<&str>,
        networks: &NetworkRegistry,
        created_at: u64,
    ) -> Result<Self, PaymentLinkError> {
        let recipient = parse_recipient(recipient)?;
        let amount = MoneyAmount::parse(amount)?.to_token_amount(USDC_DECIMALS)?;
        if networks.by_key(network).is_none() {
            return Err(PaymentLinkError::UnsupportedNetwork(network.to_string()));
        }
        Ok(Self {
            version: PAYMENT_LINK_VERSION,
            recipient,
            amount,
            network: network.to_string(),
            description: description.unwrap_or_default().to_string(),
            created_at,
        })
    }

    /// The link id: URL-safe unpadded base64 of the JSON form.
    pub fn encode(&self) -> Result<String, PaymentLinkError> {
        let json = serde_json::to_vec(self)?;
        Ok(Base64Bytes::encode_url_safe(json).to_string())
    }

    pub fn decode(link_id: &str) -> Result<Self, PaymentLinkError> {
        let bytes = Base64Bytes::from(link_id)
            .decode_url_safe()
            .map_err(|_| PaymentLinkError::InvalidLink)?;
        let link: PaymentLink =
            serde_json::from_slice(&bytes).map_err(|_| PaymentLinkError::InvalidLink)?;
        if link.version != PAYMENT_LINK_VERSION {
            return Err(PaymentLinkError::InvalidLink);
        }
        Ok(link)
    }

    /// Amount in whole USDC with at least two decimals, e.g. `0.10`. Sub-cent digits are
    /// kept, so `5000` units render as `0.005`.
    pub fn display_amount(&self) -> String {
        let amount = MoneyAmount::from_token_amount(self.amount, USDC_DECIMALS);
        let places = amount.0.normalize().scale().max(2);
        amount.to_fixed(places)
    }
}

fn parse_recipient(recipient: &str) -> Result<Address, PaymentLinkError> {
    let well_formed = recipient
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()));
    if !well_formed {
        return Err(PaymentLinkError::InvalidRecipient);
    }
    Address::from_str(recipient).map_err(|_| PaymentLinkError::InvalidRecipient)
}
