use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Scheme prefix carried by every signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Error type for signature header parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Invalid signature header format: {0}")]
    InvalidFormat(String),

    #[error("Signature is not valid hex")]
    InvalidHex,
}

/// HMAC-SHA256 signer for webhook authentication
///
/// The MAC covers `"<timestamp>." + raw_body`, where `raw_body` is the exact
/// byte sequence that travels in the request body.
#[derive(Clone)]
pub struct HmacSigner {
    secret: Vec<u8>,
}

impl HmacSigner {
    /// New HMAC signer with the given secret
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Sign a body with a specific timestamp, returning the header value
    pub fn sign(&self, timestamp: i64, raw_body: &[u8]) -> String {
        format_signature_header(&hex::encode(self.mac(timestamp, raw_body)))
    }

    /// Verify a signature header value against the body and timestamp.
    ///
    /// The digest comparison runs in constant time.
    pub fn verify(&self, timestamp: i64, raw_body: &[u8], signature_header: &str) -> bool {
        let Ok(supplied) = decode_signature_header(signature_header) else {
            return false;
        };
        let expected = self.mac(timestamp, raw_body);
        supplied.as_slice().ct_eq(expected.as_slice()).into()
    }

    /// Compute HMAC-SHA256 over `"<timestamp>." + raw_body`
    fn mac(&self, timestamp: i64, raw_body: &[u8]) -> Vec<u8> {
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC key can be of any size, as per crate documentation"),
        };

        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(raw_body);

        mac.finalize().into_bytes().to_vec()
    }
}

impl fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacSigner")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Compute the signature header value for `raw_body` at `timestamp`.
pub fn sign(secret: &[u8], timestamp: i64, raw_body: &[u8]) -> String {
    HmacSigner::new(secret).sign(timestamp, raw_body)
}

/// Check a signature header value for `raw_body` at `timestamp`.
pub fn verify(secret: &[u8], timestamp: i64, raw_body: &[u8], signature_header: &str) -> bool {
    HmacSigner::new(secret).verify(timestamp, raw_body, signature_header)
}

/// Helper function to format signature for HTTP header
pub fn format_signature_header(signature: &str) -> String {
    format!("{SIGNATURE_PREFIX}{signature}")
}

/// Helper function to parse signature from HTTP header
pub fn parse_signature_header(header: &str) -> Result<&str, SignatureError> {
    header
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or_else(|| SignatureError::InvalidFormat(header.to_string()))
}

fn decode_signature_header(header: &str) -> Result<Vec<u8>, SignatureError> {
    let digest = parse_signature_header(header.trim())?;
    hex::decode(digest).map_err(|_| SignatureError::InvalidHex)
}
