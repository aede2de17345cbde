//! Codec for the `X-PAYMENT` request header.
//!
//! The header carries a base64-encoded JSON [`PaymentPayload`]. Decoding only checks the
//! envelope: it never looks at amounts, addresses or timing, which are the settlement
//! engine's business.

use crate::proto::v1::PaymentPayload;
use crate::util::Base64Bytes;

/// Request header carrying the signed payment.
pub const PAYMENT_HEADER: &str = "X-PAYMENT";
/// Response header carrying the base64 JSON settlement result.
pub const PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Payment header is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Payment header is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Payment payload is missing {0}")]
    MissingField(&'static str),
}

/// Decode an `X-PAYMENT` header value into a [`PaymentPayload`].
pub fn decode(header: &str) -> Result<PaymentPayload, DecodeError> {
    let bytes = Base64Bytes::from(header).decode()?;
    let payload: PaymentPayload = serde_json::from_slice(&bytes)?;
    if payload.payload.signature.is_none() {
        return Err(DecodeError::MissingField("signature"));
    }
    if payload.payload.authorization.is_none() {
        return Err(DecodeError::MissingField("authorization"));
    }
    Ok(payload)
}

/// Encode a [`PaymentPayload`] as an `X-PAYMENT` header value.
pub fn encode(payload: &PaymentPayload) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(payload)?;
    Ok(Base64Bytes::encode(json).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::v1::{Authorization, ExactEvmPayload};
    use alloy_primitives::address;
    use serde_json::json;

    fn header_for(value: serde_json::Value) -> String {
        Base64Bytes::encode(value.to_string()).to_string()
    }

    fn wire_payload() -> serde_json::Value {
        json!({
            "x402Version": 1,
            "scheme": "exact",
            "network": "base",
            "payload": {
                "signature": format!("0x{}", "ab".repeat(65)),
                "authorization": {
                    "from": "0x1111111111111111111111111111111111111111",
                    "to": "0x2222222222222222222222222222222222222222",
                    "value": "100000",
                    "validAfter": "0",
                    "validBefore": "1900000000",
                    "nonce": format!("0x{}", "07".repeat(32)),
                }
            }
        })
    }

    #[test]
    fn decodes_wire_payload() {
        let payload = decode(&header_for(wire_payload())).unwrap();
        assert_eq!(payload.x402_version.as_u64(), Some(1));
        assert_eq!(payload.network, "base");
        let authorization = payload.payload.authorization.unwrap();
        assert_eq!(
            authorization.to,
            address!("0x2222222222222222222222222222222222222222")
        );
        assert_eq!(authorization.value.to_string(), "100000");
    }

    #[test]
    fn encode_then_decode_preserves_payload() {
        let payload = decode(&header_for(wire_payload())).unwrap();
        let again = decode(&encode(&payload).unwrap()).unwrap();
        assert_eq!(payload, again);
    }

    #[test]
    fn malformed_base64_is_an_error() {
        assert!(matches!(decode("%%%"), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let header = Base64Bytes::encode("{not json").to_string();
        assert!(matches!(decode(&header), Err(DecodeError::Json(_))));
    }

    #[test]
    fn missing_signature_or_authorization_is_an_error() {
        let mut value = wire_payload();
        value["payload"]
            .as_object_mut()
            .unwrap()
            .remove("signature");
        assert!(matches!(
            decode(&header_for(value)),
            Err(DecodeError::MissingField("signature"))
        ));

        let mut value = wire_payload();
        value["payload"]
            .as_object_mut()
            .unwrap()
            .remove("authorization");
        assert!(matches!(
            decode(&header_for(value)),
            Err(DecodeError::MissingField("authorization"))
        ));
    }

    #[test]
    fn out_of_range_versions_still_decode() {
        for version in [json!(300), json!(1.5), json!(-1)] {
            let mut value = wire_payload();
            value["x402Version"] = version.clone();
            let payload = decode(&header_for(value)).unwrap();
            assert_eq!(json!(payload.x402_version), version);
        }
    }

    #[test]
    fn no_semantic_validation() {
        let mut value = wire_payload();
        value["x402Version"] = json!(7);
        value["network"] = json!("atlantis");
        let payload = decode(&header_for(value)).unwrap();
        assert_eq!(payload.x402_version.as_u64(), Some(7));
        assert_eq!(payload.network, "atlantis");
        assert!(matches!(
            payload.payload,
            ExactEvmPayload {
                authorization: Some(Authorization { .. }),
                ..
            }
        ));
    }
}
