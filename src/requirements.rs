//! Construction of the payment terms a priced resource declares in its 402 response.

use alloy_primitives::Address;

use crate::networks::{DEFAULT_USDC_ADDRESS, NetworkRegistry};
use crate::proto::v1::{
    ExactScheme, PaymentRequirements, PaymentRequirementsExtra, TokenAmount, X402Version1,
};

/// How long a client may take to present a payment for the declared terms.
pub const MAX_TIMEOUT_SECONDS: u64 = 3600;

pub const MIME_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported network: {0}")]
pub struct UnsupportedNetwork(pub String);

/// Builds [`PaymentRequirements`] for the resources served by this process.
#[derive(Debug, Clone)]
pub struct RequirementsBuilder {
    networks: NetworkRegistry,
    service_name: String,
}

impl RequirementsBuilder {
    pub fn new(networks: NetworkRegistry, service_name: impl Into<String>) -> Self {
        Self {
            networks,
            service_name: service_name.into(),
        }
    }

    /// Terms for `resource`. The asset falls back to Base USDC when `network` is unknown.
    pub fn build(
        &self,
        resource: &str,
        description: &str,
        amount: TokenAmount,
        pay_to: Address,
        network: &str,
    ) -> PaymentRequirements {
        let asset = self
            .networks
            .by_key(network)
            .map(|n| n.usdc_address)
            .unwrap_or(DEFAULT_USDC_ADDRESS);
        self.with_asset(resource, description, amount, pay_to, network, asset)
    }

    /// Like [`RequirementsBuilder::build`], but refuses networks missing from the registry.
    pub fn build_strict(
        &self,
        resource: &str,
        description: &str,
        amount: TokenAmount,
        pay_to: Address,
        network: &str,
    ) -> Result<PaymentRequirements, UnsupportedNetwork> {
        let asset = self
            .networks
            .by_key(network)
            .map(|n| n.usdc_address)
            .ok_or_else(|| UnsupportedNetwork(network.to_string()))?;
        Ok(self.with_asset(resource, description, amount, pay_to, network, asset))
    }

    fn with_asset(
        &self,
        resource: &str,
        description: &str,
        amount: TokenAmount,
        pay_to: Address,
        network: &str,
        asset: Address,
    ) -> PaymentRequirements {
        PaymentRequirements {
            x402_version: X402Version1,
            scheme: ExactScheme::Exact,
            network: network.to_string(),
            max_amount_required: amount,
            resource: resource.to_string(),
            description: description.to_string(),
            mime_type: MIME_TYPE.to_string(),
            pay_to,
            max_timeout_seconds: MAX_TIMEOUT_SECONDS,
            asset,
            extra: Some(PaymentRequirementsExtra {
                name: self.service_name.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const PAY_TO: Address = address!("0x2222222222222222222222222222222222222222");

    fn builder() -> RequirementsBuilder {
        RequirementsBuilder::new(NetworkRegistry::default(), "Push AI")
    }

    #[test]
    fn builds_terms_for_known_network() {
        let requirements = builder().build(
            "/process",
            "AI chat",
            TokenAmount::from(100_000u64),
            PAY_TO,
            "polygon",
        );
        assert_eq!(requirements.network, "polygon");
        assert_eq!(
            requirements.asset,
            address!("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359")
        );
        assert_eq!(requirements.max_timeout_seconds, 3600);
        assert_eq!(requirements.mime_type, "application/json");
        assert_eq!(requirements.extra.unwrap().name, "Push AI");
    }

    #[test]
    fn unknown_network_falls_back_to_base_usdc() {
        let requirements = builder().build(
            "/process",
            "AI chat",
            TokenAmount::from(1u64),
            PAY_TO,
            "atlantis",
        );
        assert_eq!(requirements.asset, DEFAULT_USDC_ADDRESS);
        assert_eq!(requirements.network, "atlantis");
    }

    #[test]
    fn strict_variant_refuses_unknown_network() {
        let err = builder()
            .build_strict(
                "/process",
                "AI chat",
                TokenAmount::from(1u64),
                PAY_TO,
                "atlantis",
            )
            .unwrap_err();
        assert_eq!(err, UnsupportedNetwork("atlantis".to_string()));
        assert!(
            builder()
                .build_strict("/process", "AI chat", TokenAmount::from(1u64), PAY_TO, "base")
                .is_ok()
        );
    }
}
