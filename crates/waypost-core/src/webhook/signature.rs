//! Webhook signature verification.
//!
//! Provides HMAC-SHA256 signature verification for provider webhooks using
//! constant-time comparison to prevent timing attacks.

use crate::webhook::{WebhookError, WebhookRequest};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// WebhookSecret
// ============================================================================

/// Shared secret used to verify webhook signatures.
///
/// The raw value is zeroized on drop and excluded from `Debug` output so it
/// cannot leak through logs or panic messages.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct WebhookSecret(String);

impl WebhookSecret {
    /// Wrap a raw secret value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the secret as bytes for HMAC key material
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WebhookSecret").field(&"<REDACTED>").finish()
    }
}

// ============================================================================
// SignatureVerifier
// ============================================================================

/// Interface for verifying that a webhook body originated from the provider.
pub trait SignatureVerifier: Send + Sync {
    /// Verify `signature_header` against the raw request body.
    ///
    /// The signature must be computed over the exact bytes received on the
    /// wire — parsing and re-serializing the body produces a different byte
    /// sequence and invalidates the HMAC.
    fn verify(&self, raw_body: &[u8], signature_header: &str) -> bool;

    /// Whether verification is enforced.
    ///
    /// Returns `false` only when an explicit non-production bypass is
    /// active; callers then skip the signature check entirely.
    fn verification_enabled(&self) -> bool {
        true
    }

    /// Check a complete webhook request, applying the bypass flag and the
    /// missing-header rule.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::MissingSignature`] when verification is
    /// enforced and no signature header was supplied, and
    /// [`WebhookError::InvalidSignature`] when the supplied value does not
    /// match the body.
    fn check(&self, request: &WebhookRequest) -> Result<(), WebhookError> {
        if !self.verification_enabled() {
            return Ok(());
        }

        match request.signature() {
            None => Err(WebhookError::MissingSignature),
            Some(signature) => {
                if self.verify(&request.body, signature) {
                    Ok(())
                } else {
                    Err(WebhookError::InvalidSignature)
                }
            }
        }
    }
}

/// [`SignatureVerifier`] backed by a locally configured shared secret.
///
/// Verifies HMAC-SHA256 signatures in `sha256=<hex-digest>` format; the
/// `sha256=` prefix is optional because the provider dropped it in newer
/// webhook versions.
///
/// # Security
///
/// - Uses constant-time comparison (via [`Mac::verify_slice`])
/// - Never logs secrets or signature values
/// - The verification bypass must be requested explicitly and defaults to
///   disabled; enabling it emits a `WARN` at construction
///
/// # Examples
///
/// ```rust
/// use waypost_core::webhook::{SharedSecretVerifier, SignatureVerifier, WebhookSecret};
///
/// let verifier = SharedSecretVerifier::new(WebhookSecret::new("secret"));
/// assert!(!verifier.verify(b"body", "sha256=deadbeef"));
/// ```
pub struct SharedSecretVerifier {
    secret: WebhookSecret,
    allow_unverified: bool,
}

impl SharedSecretVerifier {
    /// Construct a verifier that enforces signatures.
    pub fn new(secret: WebhookSecret) -> Self {
        Self {
            secret,
            allow_unverified: false,
        }
    }

    /// Construct a verifier with the non-production bypass enabled.
    ///
    /// Emits a `WARN` so operators notice an unverified intake path before
    /// it reaches production.
    pub fn unverified(secret: WebhookSecret) -> Self {
        warn!(
            "Webhook signature verification is BYPASSED — \
             all inbound payloads will be accepted without authentication. \
             Never enable this outside development."
        );
        Self {
            secret,
            allow_unverified: true,
        }
    }

    /// Decode the hex portion of a signature header.
    ///
    /// Returns `None` for malformed values; a signature that cannot be
    /// decoded can never match and is treated as invalid by the caller.
    fn decode_signature(signature: &str) -> Option<Vec<u8>> {
        let hex_part = signature.strip_prefix("sha256=").unwrap_or(signature);
        hex::decode(hex_part).ok()
    }
}

impl SignatureVerifier for SharedSecretVerifier {
    fn verify(&self, raw_body: &[u8], signature_header: &str) -> bool {
        let Some(sig_bytes) = Self::decode_signature(signature_header) else {
            return false;
        };

        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
            return false;
        };
        mac.update(raw_body);
        let expected = mac.finalize().into_bytes();

        constant_time_compare(&sig_bytes, &expected)
    }

    fn verification_enabled(&self) -> bool {
        !self.allow_unverified
    }
}

/// Constant-time comparison of digests.
///
/// The length check is safe in non-constant time; the digest bytes are not.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;

    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

impl std::fmt::Debug for SharedSecretVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecretVerifier")
            .field("secret", &"<REDACTED>")
            .field("allow_unverified", &self.allow_unverified)
            .finish()
    }
}

/// Compute the provider-format signature for a body.
///
/// Intended for tests and local tooling that need to produce valid
/// signatures; production traffic is signed by the provider.
pub fn sign(secret: &WebhookSecret, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
