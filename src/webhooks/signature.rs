//! GitHub webhook signature verification using HMAC-SHA256.
//!
//! GitHub signs each delivery's raw body with the shared secret and sends the
//! digest in `X-Hub-Signature-256` as `sha256=<hex>`. Verification happens
//! before the body is parsed.
//!
//! Without a configured secret nothing can be checked, so every delivery is
//! accepted and a warning is logged.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing X-Hub-Signature-256 header")]
    Missing,

    #[error("signature does not match payload")]
    Mismatch,
}

/// Parses `sha256=<hex>` into raw bytes. `None` if malformed.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    hex::decode(header.strip_prefix("sha256=")?).ok()
}

/// HMAC-SHA256 of `payload` under `secret`.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a signature the way GitHub sends it.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Checks `signature_header` against `payload` in constant time.
///
/// ```
/// use pr_watch::webhooks::{compute_signature, format_signature_header, verify_signature};
///
/// let header = format_signature_header(&compute_signature(b"{}", b"s3cret"));
/// assert!(verify_signature(b"{}", &header, b"s3cret"));
/// assert!(!verify_signature(b"{}", &header, b"other"));
/// ```
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Authenticates a delivery.
///
/// With no secret configured the check is skipped. With one, a missing or
/// non-matching header is rejected.
pub fn verify_request(
    payload: &[u8],
    signature_header: Option<&str>,
    secret: Option<&[u8]>,
) -> Result<(), SignatureError> {
    let Some(secret) = secret else {
        warn!("No webhook secret configured, accepting unsigned delivery");
        return Ok(());
    };
    let header = signature_header.ok_or(SignatureError::Missing)?;
    if verify_signature(payload, header, secret) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn signed(payload: &[u8], secret: &[u8]) -> String {
        format_signature_header(&compute_signature(payload, secret))
    }

    #[test]
    fn parses_only_sha256_hex() {
        assert_eq!(
            parse_signature_header("sha256=1234ABcd"),
            Some(vec![0x12, 0x34, 0xab, 0xcd])
        );
        assert_eq!(parse_signature_header("sha256="), Some(vec![]));
        assert_eq!(parse_signature_header("1234abcd"), None);
        assert_eq!(parse_signature_header("sha1=1234abcd"), None);
        assert_eq!(parse_signature_header("sha256=abc"), None);
        assert_eq!(parse_signature_header("sha256=xyz0"), None);
    }

    /// Test vector from GitHub's "Validating webhook deliveries" guide.
    #[test]
    fn github_documentation_vector() {
        let header = "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";
        assert!(verify_signature(
            b"Hello, World!",
            header,
            b"It's a Secret to Everybody"
        ));
    }

    #[test]
    fn rejects_tampering() {
        let header = signed(b"original", b"secret");
        assert!(verify_signature(b"original", &header, b"secret"));
        assert!(!verify_signature(b"modified", &header, b"secret"));
        assert!(!verify_signature(b"original", &header, b"other"));
        assert!(!verify_signature(b"original", "sha256=", b"secret"));
    }

    #[test]
    fn request_without_secret_is_accepted() {
        assert_eq!(verify_request(b"{}", None, None), Ok(()));
        assert_eq!(verify_request(b"{}", Some("sha256=00"), None), Ok(()));
    }

    #[test]
    fn request_with_secret_needs_a_valid_header() {
        let secret: &[u8] = b"secret";
        let header = signed(b"{}", secret);
        assert_eq!(verify_request(b"{}", Some(&header), Some(secret)), Ok(()));
        assert_eq!(
            verify_request(b"{}", None, Some(secret)),
            Err(SignatureError::Missing)
        );
        assert_eq!(
            verify_request(b"{ }", Some(&header), Some(secret)),
            Err(SignatureError::Mismatch)
        );
    }

    proptest! {
        #[test]
        fn sign_then_verify(payload: Vec<u8>, secret: Vec<u8>) {
            prop_assert!(verify_signature(&payload, &signed(&payload, &secret), &secret));
        }

        #[test]
        fn other_secret_fails(
            payload: Vec<u8>,
            a in prop::collection::vec(any::<u8>(), 1..80),
            at: usize,
            flip in 1u8..,
        ) {
            // HMAC zero-pads short keys, so only compare same-length secrets.
            let mut b = a.clone();
            let i = at % b.len();
            b[i] ^= flip;
            prop_assert!(!verify_signature(&payload, &signed(&payload, &a), &b));
        }

        #[test]
        fn arbitrary_headers_never_panic(header: String, payload: Vec<u8>, secret: Vec<u8>) {
            let _ = verify_request(&payload, Some(&header), Some(&secret));
        }
    }
}
