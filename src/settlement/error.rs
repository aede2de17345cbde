use alloy_primitives::TxHash;

use crate::chain::LedgerError;

/// Why a payment was not settled.
///
/// Every variant carries a human-readable message; [`SettlementError::kind`] is the stable
/// machine-readable tag reported to callers as `errorKind`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    /// Unsupported protocol version or scheme.
    #[error("{0}")]
    ProtocolMismatch(String),
    #[error("{0}")]
    MalformedPayload(String),
    /// The authorization does not match the declared recipient or amount.
    #[error("{0}")]
    TermsViolation(String),
    /// `now` lies outside `[validAfter, validBefore]`.
    #[error("{0}")]
    TimingViolation(String),
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),
    #[error("{0}")]
    ReplayDetected(String),
    /// Either the payer lacks USDC or the settler lacks gas.
    #[error("{0}")]
    InsufficientFunds(String),
    #[error("{0}")]
    SubmissionRejected(String),
    /// Mined but reverted.
    #[error("Transaction reverted on-chain")]
    Unconfirmed { transaction: TxHash },
    /// No outcome in time. `transaction` is set when the transfer was already submitted.
    #[error(
        "Settlement did not complete within {seconds} seconds; the transfer may still be mined, check the payer's nonce before retrying"
    )]
    Timeout {
        seconds: u64,
        transaction: Option<TxHash>,
    },
    /// An on-chain failure that matches no known pattern. Carries the node's message.
    #[error("Settlement failed: {0}")]
    SettlementFailed(String),
}

impl SettlementError {
    pub fn kind(&self) -> &'static str {
        match self {
            SettlementError::ProtocolMismatch(_) => "protocol_mismatch",
            SettlementError::MalformedPayload(_) => "malformed_payload",
            SettlementError::TermsViolation(_) => "terms_violation",
            SettlementError::TimingViolation(_) => "timing_violation",
            SettlementError::UnsupportedNetwork(_) => "unsupported_network",
            SettlementError::ReplayDetected(_) => "replay_detected",
            SettlementError::InsufficientFunds(_) => "insufficient_funds",
            SettlementError::SubmissionRejected(_) => "submission_rejected",
            SettlementError::Unconfirmed { .. } => "unconfirmed",
            SettlementError::Timeout { .. } => "timeout",
            SettlementError::SettlementFailed(_) => "settlement_failed",
        }
    }

    /// Transaction submitted for this failed settlement, if any.
    pub fn transaction(&self) -> Option<TxHash> {
        match self {
            SettlementError::Unconfirmed { transaction } => Some(*transaction),
            SettlementError::Timeout { transaction, .. } => *transaction,
            _ => None,
        }
    }

    /// Only a timeout leaves the outcome open: the same authorization may be presented again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SettlementError::Timeout { .. })
    }

    /// Map a node or contract error message onto the taxonomy.
    pub fn classify(message: &str) -> Self {
        let lowercase = message.to_lowercase();
        if lowercase.contains("insufficient funds") {
            SettlementError::InsufficientFunds(
                "Merchant wallet has insufficient native currency for gas".to_string(),
            )
        } else if lowercase.contains("invalid signature") {
            SettlementError::SubmissionRejected("Invalid payment signature".to_string())
        } else if lowercase.contains("authorization is used") {
            SettlementError::ReplayDetected("Payment nonce already used".to_string())
        } else if lowercase.contains("not yet valid") {
            SettlementError::TimingViolation("Payment authorization not yet valid".to_string())
        } else if lowercase.contains("authorization is expired") {
            SettlementError::TimingViolation("Payment authorization expired".to_string())
        } else {
            SettlementError::SettlementFailed(message.to_string())
        }
    }
}

impl From<LedgerError> for SettlementError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::ReceiptTimeout { tx_hash, seconds } => SettlementError::Timeout {
                seconds,
                transaction: Some(tx_hash),
            },
            other => SettlementError::classify(&other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_node_errors() {
        let cases = [
            (
                "server returned an error response: error code -32000: insufficient funds for gas * price + value",
                "insufficient_funds",
            ),
            (
                "execution reverted: FiatTokenV2: invalid signature",
                "submission_rejected",
            ),
            (
                "execution reverted: FiatTokenV2: authorization is used or canceled",
                "replay_detected",
            ),
            (
                "execution reverted: FiatTokenV2: authorization is not yet valid",
                "timing_violation",
            ),
            (
                "execution reverted: FiatTokenV2: authorization is expired",
                "timing_violation",
            ),
            ("connection refused", "settlement_failed"),
        ];
        for (message, kind) in cases {
            assert_eq!(SettlementError::classify(message).kind(), kind, "{message}");
        }
    }

    #[test]
    fn unknown_errors_keep_the_original_message() {
        assert_eq!(
            SettlementError::classify("nonce too low"),
            SettlementError::SettlementFailed("nonce too low".to_string())
        );
        assert_eq!(
            SettlementError::classify("nonce too low").to_string(),
            "Settlement failed: nonce too low"
        );
    }

    #[test]
    fn contract_errors_are_classified() {
        let error: SettlementError =
            LedgerError::Contract("execution reverted: invalid signature".to_string()).into();
        assert_eq!(
            error,
            SettlementError::SubmissionRejected("Invalid payment signature".to_string())
        );
    }

    #[test]
    fn only_unconfirmed_carries_a_transaction() {
        let tx = TxHash::repeat_byte(9);
        let error = SettlementError::Unconfirmed { transaction: tx };
        assert_eq!(error.transaction(), Some(tx));
        assert_eq!(error.to_string(), "Transaction reverted on-chain");
        let timeout = SettlementError::Timeout {
            seconds: 60,
            transaction: None,
        };
        assert!(timeout.transaction().is_none());
        assert!(timeout.is_retryable());
        assert!(!error.is_retryable());
    }

    #[test]
    fn receipt_timeout_is_a_retryable_timeout_with_its_transaction() {
        let tx = TxHash::repeat_byte(4);
        let error: SettlementError = LedgerError::ReceiptTimeout {
            tx_hash: tx,
            seconds: 30,
        }
        .into();
        assert_eq!(error.kind(), "timeout");
        assert_eq!(error.transaction(), Some(tx));
        assert!(error.is_retryable());
        assert!(error.to_string().contains("may still be mined"));
    }
}
