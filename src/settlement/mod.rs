//! Verification and on-chain settlement of x402 `exact` payments.
//!
//! [`SettlementEngine::verify_and_settle`] runs a fixed sequence of gates over a decoded
//! [`PaymentPayload`]. The first failing gate ends the attempt with a
//! [`SettlementResult::Rejected`]:
//!
//! 1. protocol version and scheme,
//! 2. presence of signature and authorization,
//! 3. recipient and amount against the declared terms,
//! 4. the authorization's validity window,
//! 5. the network key.
//!
//! These never touch the chain. In [`SettlementMode::Simulated`] the payment is then accepted
//! with a synthetic transaction id. In [`SettlementMode::Live`] the engine checks the nonce
//! against the contract's `authorizationState`, checks the payer's USDC balance, splits the
//! signature and submits `transferWithAuthorization`, waiting for one confirmation. The
//! on-chain part as a whole is bounded by the settlement timeout.
//!
//! The engine keeps no state between calls; concurrent settlements of the same nonce are
//! arbitrated by the token contract.

mod error;

pub use error::SettlementError;

use alloy_primitives::{Address, TxHash, U256};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::instrument;

use crate::chain::{LedgerRegistry, SignedTransfer, StablecoinLedger};
use crate::networks::{NetworkConfig, NetworkRegistry, USDC_DECIMALS};
use crate::proto::v1::{Authorization, ExactScheme, PaymentPayload, TokenAmount, X402Version1};
use crate::signature;
use crate::timestamp::UnixTimestamp;
use crate::util::MoneyAmount;

pub const DEMO_NOTE: &str = "Demo mode - signature verified but no on-chain transfer";

/// Whether payments are settled on-chain. Chosen once at startup.
#[derive(Clone)]
pub enum SettlementMode {
    /// Submit transfers through the ledgers of the registry.
    Live(Arc<dyn LedgerRegistry>),
    /// No merchant key configured: accept verified payments without touching the chain.
    Simulated,
}

impl SettlementMode {
    pub fn is_live(&self) -> bool {
        matches!(self, SettlementMode::Live(_))
    }
}

impl fmt::Debug for SettlementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementMode::Live(_) => f.write_str("Live"),
            SettlementMode::Simulated => f.write_str("Simulated"),
        }
    }
}

/// Outcome of one settlement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementResult {
    Settled {
        transaction: TxHash,
        network: String,
        block_number: Option<u64>,
        gas_used: Option<u64>,
    },
    Simulated {
        transaction: String,
        network: String,
    },
    Rejected {
        error: SettlementError,
        network: Option<String>,
    },
}

impl SettlementResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, SettlementResult::Rejected { .. })
    }

    /// Transaction hash, or synthetic id in demo mode. Also set for reverted transfers.
    pub fn transaction(&self) -> Option<String> {
        match self {
            SettlementResult::Settled { transaction, .. } => Some(transaction.to_string()),
            SettlementResult::Simulated { transaction, .. } => Some(transaction.clone()),
            SettlementResult::Rejected { error, .. } => error.transaction().map(|tx| tx.to_string()),
        }
    }

    pub fn network(&self) -> Option<&str> {
        match self {
            SettlementResult::Settled { network, .. } => Some(network),
            SettlementResult::Simulated { network, .. } => Some(network),
            SettlementResult::Rejected { network, .. } => network.as_deref(),
        }
    }

    pub fn error(&self) -> Option<&SettlementError> {
        match self {
            SettlementResult::Rejected { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SettlementResultWire<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    network: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gas_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
}

impl Serialize for SettlementResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (block_number, gas_used) = match self {
            SettlementResult::Settled {
                block_number,
                gas_used,
                ..
            } => (*block_number, *gas_used),
            _ => (None, None),
        };
        let wire = SettlementResultWire {
            success: self.is_success(),
            transaction: self.transaction(),
            network: self.network(),
            block_number,
            gas_used,
            note: matches!(self, SettlementResult::Simulated { .. }).then_some(DEMO_NOTE),
            error: self.error().map(|e| e.to_string()),
            error_kind: self.error().map(|e| e.kind()),
        };
        wire.serialize(serializer)
    }
}

/// Render smallest-unit USDC for humans, e.g. `50000` as `0.05`.
pub fn format_usdc(amount: U256) -> String {
    MoneyAmount::from_token_amount(TokenAmount(amount), USDC_DECIMALS).to_string()
}

/// `demo_` followed by the current time in hex milliseconds and 32 random bits.
fn demo_transaction_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("demo_{millis:x}{:08x}", rand::random::<u32>())
}

#[derive(Debug, Clone)]
pub struct SettlementEngine {
    networks: NetworkRegistry,
    mode: SettlementMode,
    settlement_timeout: Duration,
}

impl SettlementEngine {
    pub fn new(networks: NetworkRegistry, mode: SettlementMode, settlement_timeout: Duration) -> Self {
        Self {
            networks,
            mode,
            settlement_timeout,
        }
    }

    pub fn mode(&self) -> &SettlementMode {
        &self.mode
    }

    pub fn networks(&self) -> &NetworkRegistry {
        &self.networks
    }

    /// Verify `payment` against the declared terms and settle it.
    pub async fn verify_and_settle(
        &self,
        payment: &PaymentPayload,
        expected_amount: TokenAmount,
        expected_recipient: Address,
    ) -> SettlementResult {
        self.settle_at(payment, expected_amount, expected_recipient, UnixTimestamp::now())
            .await
    }

    /// [`SettlementEngine::verify_and_settle`] with an explicit clock.
    #[instrument(skip_all, fields(network = %payment.network))]
    pub async fn settle_at(
        &self,
        payment: &PaymentPayload,
        expected_amount: TokenAmount,
        expected_recipient: Address,
        now: UnixTimestamp,
    ) -> SettlementResult {
        match self
            .try_settle(payment, expected_amount, expected_recipient, now)
            .await
        {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!(kind = error.kind(), %error, "Payment rejected");
                let network = (!payment.network.is_empty()).then(|| payment.network.clone());
                SettlementResult::Rejected { error, network }
            }
        }
    }

    async fn try_settle(
        &self,
        payment: &PaymentPayload,
        expected_amount: TokenAmount,
        expected_recipient: Address,
        now: UnixTimestamp,
    ) -> Result<SettlementResult, SettlementError> {
        assert_protocol(payment)?;
        let (Some(signature), Some(authorization)) = (
            payment.payload.signature.as_deref(),
            payment.payload.authorization.as_ref(),
        ) else {
            return Err(SettlementError::MalformedPayload(
                "Missing payment signature or authorization".to_string(),
            ));
        };
        assert_terms(authorization, expected_amount, expected_recipient)?;
        assert_time(authorization, now)?;
        let network = self
            .networks
            .by_key(&payment.network)
            .ok_or_else(|| SettlementError::UnsupportedNetwork(payment.network.clone()))?;

        let registry = match &self.mode {
            SettlementMode::Simulated => {
                let transaction = demo_transaction_id();
                tracing::info!(tx = %transaction, network = network.key, "Payment accepted in demo mode, no on-chain transfer");
                return Ok(SettlementResult::Simulated {
                    transaction,
                    network: network.key.to_string(),
                });
            }
            SettlementMode::Live(registry) => registry,
        };
        let ledger = registry
            .ledger(network.key)
            .ok_or_else(|| SettlementError::UnsupportedNetwork(payment.network.clone()))?;

        tracing::debug!(network = network.name, "Settling on-chain");
        let settle = settle_on_chain(ledger.as_ref(), network, authorization, signature);
        match tokio::time::timeout(self.settlement_timeout, settle).await {
            Ok(result) => result,
            Err(_) => Err(SettlementError::Timeout {
                seconds: self.settlement_timeout.as_secs(),
                transaction: None,
            }),
        }
    }
}

fn assert_protocol(payment: &PaymentPayload) -> Result<(), SettlementError> {
    if payment.x402_version.as_u64() != Some(u64::from(X402Version1::VALUE)) {
        return Err(SettlementError::ProtocolMismatch(
            "Invalid x402 version".to_string(),
        ));
    }
    if payment.scheme != ExactScheme::NAME {
        return Err(SettlementError::ProtocolMismatch(format!(
            "Unsupported scheme: {}",
            payment.scheme
        )));
    }
    Ok(())
}

fn assert_terms(
    authorization: &Authorization,
    expected_amount: TokenAmount,
    expected_recipient: Address,
) -> Result<(), SettlementError> {
    if authorization.to != expected_recipient {
        return Err(SettlementError::TermsViolation(format!(
            "Invalid recipient. Expected {expected_recipient}, got {}",
            authorization.to
        )));
    }
    if authorization.value < expected_amount {
        return Err(SettlementError::TermsViolation(format!(
            "Insufficient amount. Expected {expected_amount}, got {}",
            authorization.value
        )));
    }
    Ok(())
}

/// `validAfter <= now <= validBefore`, both bounds inclusive.
fn assert_time(authorization: &Authorization, now: UnixTimestamp) -> Result<(), SettlementError> {
    if now > authorization.valid_before {
        return Err(SettlementError::TimingViolation(
            "Payment authorization expired".to_string(),
        ));
    }
    if now < authorization.valid_after {
        return Err(SettlementError::TimingViolation(
            "Payment authorization not yet valid".to_string(),
        ));
    }
    Ok(())
}

#[instrument(skip_all, err, fields(
    network = network.key,
    from = %authorization.from,
    to = %authorization.to,
    value = %authorization.value,
    nonce = %authorization.nonce,
))]
async fn settle_on_chain(
    ledger: &dyn StablecoinLedger,
    network: &NetworkConfig,
    authorization: &Authorization,
    signature: &str,
) -> Result<SettlementResult, SettlementError> {
    let nonce = authorization.nonce.0;
    match ledger.authorization_state(authorization.from, nonce).await {
        Ok(true) => {
            return Err(SettlementError::ReplayDetected(
                "Payment nonce already used (replay attack prevented)".to_string(),
            ));
        }
        Ok(false) => {}
        Err(error) => {
            tracing::warn!(%error, "Could not check nonce state, continuing");
        }
    }

    let balance = ledger.balance_of(authorization.from).await?;
    if balance < authorization.value.inner() {
        return Err(SettlementError::InsufficientFunds(format!(
            "Insufficient USDC balance. User has {} USDC",
            format_usdc(balance)
        )));
    }
    tracing::debug!(balance = %format_usdc(balance), "Payer balance is sufficient");

    let split = signature::parse(signature)
        .map_err(|e| SettlementError::MalformedPayload(e.to_string()))?;

    let transfer = SignedTransfer {
        from: authorization.from,
        to: authorization.to,
        value: authorization.value.inner(),
        valid_after: U256::from(authorization.valid_after.as_secs()),
        valid_before: U256::from(authorization.valid_before.as_secs()),
        nonce,
        v: split.v,
        r: split.r,
        s: split.s,
    };
    tracing::info!(amount = %format_usdc(transfer.value), "Submitting transferWithAuthorization");
    let receipt = ledger.transfer_with_authorization(&transfer).await?;
    if !receipt.success {
        tracing::warn!(tx = %receipt.tx_hash, "transferWithAuthorization reverted");
        return Err(SettlementError::Unconfirmed {
            transaction: receipt.tx_hash,
        });
    }

    let transaction = receipt.tx_hash;
    tracing::info!(
        tx = %transaction,
        block = ?receipt.block_number,
        gas_used = receipt.gas_used,
        explorer = %network.explorer_tx_url(&transaction.to_string()),
        "Payment settled"
    );
    Ok(SettlementResult::Settled {
        transaction,
        network: network.key.to_string(),
        block_number: receipt.block_number,
        gas_used: Some(receipt.gas_used),
    })
}
