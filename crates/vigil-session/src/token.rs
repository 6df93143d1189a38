//! Bearer token validation.
//!
//! The client never holds the signing key, so it can't verify a token's
//! signature: the server does that on every request. What the client CAN
//! do is read the claims and refuse to go online with a token that has
//! already expired. That check is all this module does: decode, then compare
//! `exp` with the clock. No network I/O.
//!
//! The rule is fail-closed: a token that doesn't decode, or that carries no
//! `exp` claim at all, is treated as expired.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::SessionError;

/// The claims the presence core reads from a token.
///
/// `exp`/`iat` are NumericDates: seconds since the epoch, possibly
/// fractional, hence `f64`. Everything else the issuer put in the token is
/// kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiry, in seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<f64>,

    /// Issued-at, in seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<f64>,

    /// Subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Any other claim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Result of validating a token: `valid` plus whatever claims decoded.
///
/// An expired token still carries its claims (useful for logging who it
/// belonged to); a malformed one carries none.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenValidation {
    pub valid: bool,
    pub claims: Option<Claims>,
}

impl TokenValidation {
    fn invalid(claims: Option<Claims>) -> Self {
        Self {
            valid: false,
            claims,
        }
    }
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Decodes the claims of `token` without verifying its signature.
///
/// # Errors
/// Returns [`SessionError::TokenDecode`] if the token isn't a well-formed
/// JWT or its claims aren't a JSON object.
pub fn decode_claims(token: &str) -> Result<Claims, SessionError> {
    // The key is never consulted once signature validation is off, but
    // `decode` still wants one.
    let key = DecodingKey::from_secret(&[]);

    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| SessionError::TokenDecode(e.to_string()))
}

/// Returns `true` if the claims are expired at `now_ms`.
///
/// `exp * 1000 < now_ms` means expired; a token expiring exactly now is
/// still valid. Missing `exp` is always expired.
pub fn is_expired(claims: &Claims, now_ms: u64) -> bool {
    match claims.exp {
        Some(exp) => exp * 1000.0 < now_ms as f64,
        None => true,
    }
}

/// Validates `token` against the current clock.
pub fn validate_token(token: &str) -> TokenValidation {
    validate_token_at(token, now_millis())
}

/// Validates `token` as of `now_ms`.
///
/// Never panics and never returns an error: decode failures are logged and
/// reported as `valid: false`.
pub fn validate_token_at(token: &str, now_ms: u64) -> TokenValidation {
    let claims = match decode_claims(token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(error = %e, "stored token is malformed, treating as signed out");
            return TokenValidation::invalid(None);
        }
    };

    if is_expired(&claims, now_ms) {
        tracing::info!(exp = ?claims.exp, "stored token has expired");
        return TokenValidation::invalid(Some(claims));
    }

    TokenValidation {
        valid: true,
        claims: Some(claims),
    }
}

// =========================================================================
// Tests
// =========================================================================
