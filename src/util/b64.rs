use base64::Engine;
use base64::engine::general_purpose::{STANDARD as b64, URL_SAFE_NO_PAD as b64url};
use std::borrow::Cow;
use std::fmt::Display;

/// Contains bytes of base64 encoded some other bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes<'a>(pub Cow<'a, [u8]>);

impl Base64Bytes<'_> {
    /// Decode base64 string bytes to raw binary payload.
    ///
    /// The standard alphabet is tried first. Browser clients sometimes send the
    /// URL-safe alphabet or drop the padding, so that is accepted as a fallback.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let trimmed = self.0.trim_ascii();
        b64.decode(trimmed).or_else(|e| {
            let unpadded = trimmed
                .iter()
                .rposition(|b| *b != b'=')
                .map(|end| &trimmed[..=end])
                .unwrap_or_default();
            b64url.decode(unpadded).map_err(|_| e)
        })
    }

    /// Decode URL-safe, unpadded base64 (the alphabet used by payment link tokens).
    pub fn decode_url_safe(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64url.decode(self.0.trim_ascii())
    }

    /// Encode raw binary input into base64 string bytes
    pub fn encode<T: AsRef<[u8]>>(input: T) -> Base64Bytes<'static> {
        let encoded = b64.encode(input.as_ref());
        Base64Bytes(Cow::Owned(encoded.into_bytes()))
    }

    /// Encode raw binary input into URL-safe, unpadded base64 string bytes.
    pub fn encode_url_safe<T: AsRef<[u8]>>(input: T) -> Base64Bytes<'static> {
        let encoded = b64url.encode(input.as_ref());
        Base64Bytes(Cow::Owned(encoded.into_bytes()))
    }
}

impl AsRef<[u8]> for Base64Bytes<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<'a> From<&'a [u8]> for Base64Bytes<'a> {
    fn from(slice: &'a [u8]) -> Self {
        Base64Bytes(Cow::Borrowed(slice))
    }
}

impl<'a> From<&'a str> for Base64Bytes<'a> {
    fn from(s: &'a str) -> Self {
        Base64Bytes(Cow::Borrowed(s.as_bytes()))
    }
}

impl Display for Base64Bytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.0.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_standard_and_url_safe() {
        let raw = b"{\"a\":\"??>>\"}";
        let standard = Base64Bytes::encode(raw);
        assert_eq!(standard.decode().unwrap(), raw);

        let url_safe = Base64Bytes::encode_url_safe(raw);
        assert_eq!(url_safe.decode().unwrap(), raw);
        assert_eq!(url_safe.decode_url_safe().unwrap(), raw);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Base64Bytes::from("not base64 at all!").decode().is_err());
    }
}
