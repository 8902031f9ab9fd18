//! # Webhook Signature Verification
//!
//! This module provides signature verification for incoming deployment webhooks
//! using HMAC-SHA1 with constant-time comparison to prevent timing attacks.
//!
//! The sender computes the HMAC over the raw request body with a shared secret
//! and sends the lowercase hex digest in the `x-vercel-signature` header.

use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tracing::debug;

use crate::config::AppConfig;
use crate::error::ApiError;

type HmacSha1 = Hmac<Sha1>;

/// Header carrying the hex-encoded HMAC digest of the request body
pub const SIGNATURE_HEADER: &str = "x-vercel-signature";

/// Errors that can occur during webhook signature verification
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing signature")]
    MissingSignature,

    #[error("Invalid signature")]
    VerificationFailed,

    #[error("Webhook secret not configured")]
    NotConfigured,
}

impl VerificationError {
    /// Returns the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            VerificationError::MissingSignature => StatusCode::UNAUTHORIZED,
            VerificationError::VerificationFailed => StatusCode::UNAUTHORIZED,
            VerificationError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<VerificationError> for ApiError {
    fn from(error: VerificationError) -> Self {
        let code = match &error {
            VerificationError::NotConfigured => "INTERNAL_SERVER_ERROR",
            _ => "UNAUTHORIZED",
        };
        ApiError::new(error.status_code(), code, &error.to_string())
    }
}

/// Result type for webhook verification
pub type VerificationResult<T> = Result<T, VerificationError>;

/// Checks whether the provided hex digest matches the HMAC-SHA1 of the body.
///
/// Pure and side-effect free. Comparison runs in constant time over the
/// decoded digest bytes; a malformed hex digest can never match.
pub fn signature_matches(body: &[u8], provided_hex: &str, secret: &str) -> bool {
    let Ok(provided_bytes) = hex::decode(provided_hex) else {
        return false;
    };

    // HMAC accepts keys of any length, so new_from_slice cannot fail here
    let Ok(mut mac) = HmacSha1::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected_bytes = mac.finalize().into_bytes();

    // Compare signatures using constant-time comparison to prevent timing attacks
    let expected_bytes_array: &[u8] = expected_bytes.as_ref();
    subtle::ConstantTimeEq::ct_eq(expected_bytes_array, &provided_bytes[..]).into()
}

/// Verifies the webhook signature header against the configured secret.
///
/// The raw body bytes must be exactly what arrived on the wire; any
/// re-serialization of the JSON would change the digest.
pub fn verify_webhook_signature(
    body: &[u8],
    headers: &HeaderMap,
    config: &AppConfig,
) -> VerificationResult<()> {
    let secret = config
        .webhook_secret
        .as_ref()
        .ok_or(VerificationError::NotConfigured)?;

    let signature_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if signature_header.is_empty() {
        return Err(VerificationError::MissingSignature);
    }

    debug!(body_size = body.len(), "Starting signature verification");

    if signature_matches(body, signature_header, secret) {
        Ok(())
    } else {
        Err(VerificationError::VerificationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn config_with_secret(secret: Option<&str>) -> AppConfig {
        AppConfig {
            webhook_secret: secret.map(|s| s.to_string()),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_signature_matches_success() {
        let secret = "test_secret";
        let body = b"test payload";
        let signature = sign(body, secret);

        assert!(signature_matches(body, &signature, secret));
    }

    #[test]
    fn test_signature_matches_wrong_secret() {
        let body = b"test payload";
        let signature = sign(body, "test_secret");

        assert!(!signature_matches(body, &signature, "other_secret"));
    }

    #[test]
    fn test_signature_matches_tampered_body() {
        let secret = "test_secret";
        let signature = sign(b"test payload", secret);

        assert!(!signature_matches(b"test payload!", &signature, secret));
    }

    #[test]
    fn test_signature_matches_single_bit_flip() {
        let secret = "test_secret";
        let body = b"test payload";
        let signature = sign(body, secret);

        // Flip one bit in the hex digest
        let mut flipped = signature.into_bytes();
        flipped[0] = if flipped[0] == b'0' { b'1' } else { b'0' };
        let flipped = String::from_utf8(flipped).unwrap();

        assert!(!signature_matches(body, &flipped, secret));
    }

    #[test]
    fn test_signature_matches_invalid_hex() {
        let secret = "test_secret";
        let body = b"test payload";

        assert!(!signature_matches(body, "not-hex-at-all", secret));
        assert!(!signature_matches(body, "abc", secret)); // odd length
    }

    #[test]
    fn test_signature_matches_truncated_digest() {
        let secret = "test_secret";
        let body = b"test payload";
        let signature = sign(body, secret);

        // Valid hex, wrong length: must not match
        assert!(!signature_matches(body, &signature[..20], secret));
    }

    #[test]
    fn test_verify_webhook_signature_success() {
        let secret = "test_secret";
        let body = b"{\"id\":\"evt_1\"}";
        let config = config_with_secret(Some(secret));

        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, sign(body, secret).parse().unwrap());

        assert!(verify_webhook_signature(body, &headers, &config).is_ok());
    }

    #[test]
    fn test_verify_webhook_signature_missing_header() {
        let config = config_with_secret(Some("test_secret"));
        let headers = HeaderMap::new();

        let err = verify_webhook_signature(b"{}", &headers, &config).unwrap_err();
        assert!(matches!(err, VerificationError::MissingSignature));
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_verify_webhook_signature_empty_header() {
        let config = config_with_secret(Some("test_secret"));
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, "".parse().unwrap());

        let err = verify_webhook_signature(b"{}", &headers, &config).unwrap_err();
        assert!(matches!(err, VerificationError::MissingSignature));
    }

    #[test]
    fn test_verify_webhook_signature_invalid() {
        let config = config_with_secret(Some("test_secret"));
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, sign(b"{}", "wrong").parse().unwrap());

        let err = verify_webhook_signature(b"{}", &headers, &config).unwrap_err();
        assert!(matches!(err, VerificationError::VerificationFailed));
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_verify_webhook_signature_not_configured() {
        let config = config_with_secret(None);
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, sign(b"{}", "any").parse().unwrap());

        let err = verify_webhook_signature(b"{}", &headers, &config).unwrap_err();
        assert!(matches!(err, VerificationError::NotConfigured));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_verification_error_to_api_error() {
        let missing: ApiError = VerificationError::MissingSignature.into();
        assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
        assert_eq!(missing.message, Box::from("Missing signature"));

        let failed: ApiError = VerificationError::VerificationFailed.into();
        assert_eq!(failed.status, StatusCode::UNAUTHORIZED);
        assert_eq!(failed.message, Box::from("Invalid signature"));

        let not_configured: ApiError = VerificationError::NotConfigured.into();
        assert_eq!(not_configured.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            not_configured.message,
            Box::from("Webhook secret not configured")
        );
    }
}
