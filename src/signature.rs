//! Splitting of 65-byte ECDSA signatures into the `(v, r, s)` triple taken by
//! the `transferWithAuthorization(..., uint8 v, bytes32 r, bytes32 s)` overload.

use alloy_primitives::B256;

/// Number of hex characters in a 65-byte signature, without the `0x` prefix.
const SIGNATURE_HEX_LEN: usize = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSignature {
    pub v: u8,
    pub r: B256,
    pub s: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Invalid signature length: expected 130 hex characters, got {0}")]
    InvalidLength(usize),
    #[error("Invalid signature: not a hex string")]
    InvalidHex,
}

/// Decompose a hex-encoded 65-byte signature.
///
/// Wallets that emit the raw recovery id (0 or 1) instead of 27/28 are normalized
/// by adding 27. Chain-qualified EIP-155 `v` values are passed through untouched.
pub fn parse(signature: &str) -> Result<SplitSignature, SignatureError> {
    let digits = signature
        .strip_prefix("0x")
        .or_else(|| signature.strip_prefix("0X"))
        .unwrap_or(signature);
    if digits.len() != SIGNATURE_HEX_LEN {
        return Err(SignatureError::InvalidLength(digits.len()));
    }
    let mut bytes = [0u8; 65];
    hex::decode_to_slice(digits, &mut bytes).map_err(|_| SignatureError::InvalidHex)?;

    let r = B256::from_slice(&bytes[0..32]);
    let s = B256::from_slice(&bytes[32..64]);
    let mut v = bytes[64];
    if v < 27 {
        v += 27;
    }
    Ok(SplitSignature { v, r, s })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature_with_v(v: u8) -> String {
        format!("0x{}{}{:02x}", "11".repeat(32), "22".repeat(32), v)
    }

    #[test]
    fn splits_r_s_v() {
        let split = parse(&signature_with_v(28)).unwrap();
        assert_eq!(split.r, B256::repeat_byte(0x11));
        assert_eq!(split.s, B256::repeat_byte(0x22));
        assert_eq!(split.v, 28);
    }

    #[test]
    fn normalizes_raw_recovery_id() {
        assert_eq!(parse(&signature_with_v(0)).unwrap().v, 27);
        assert_eq!(parse(&signature_with_v(1)).unwrap().v, 28);
        assert_eq!(parse(&signature_with_v(27)).unwrap().v, 27);
    }

    #[test]
    fn prefix_is_optional() {
        let with_prefix = signature_with_v(27);
        let without = with_prefix.trim_start_matches("0x");
        assert_eq!(parse(&with_prefix), parse(without));
    }

    #[test]
    fn rejects_wrong_length() {
        let short = format!("0x{}", "ab".repeat(64));
        assert_eq!(parse(&short), Err(SignatureError::InvalidLength(128)));
        let long = format!("0x{}", "ab".repeat(66));
        assert_eq!(parse(&long), Err(SignatureError::InvalidLength(132)));
        assert_eq!(parse(""), Err(SignatureError::InvalidLength(0)));
    }

    #[test]
    fn rejects_non_hex() {
        let bad = format!("0x{}", "zz".repeat(65));
        assert_eq!(parse(&bad), Err(SignatureError::InvalidHex));
    }
}
