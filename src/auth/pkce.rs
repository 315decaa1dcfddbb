//! PKCE S256 challenge generation and state-token encoding
//!
//! This module implements the Proof Key for Code Exchange (PKCE) extension
//! to OAuth 2.0 as defined in RFC 7636, using the `S256` challenge method,
//! plus the opaque `state` token that travels through the provider and back.
//!
//! # How PKCE works
//!
//! 1. The client generates a high-entropy random string called the `code_verifier`.
//! 2. The client computes a SHA-256 hash of the verifier and base64url-encodes
//!    it to produce the `code_challenge`.
//! 3. The authorization request includes `code_challenge` and
//!    `code_challenge_method=S256`.
//! 4. The code exchange includes the original `code_verifier`.
//!
//! # State tokens
//!
//! A state token is `base64url(JSON{"csrf": <nonce>, "returnUrl"?: <url>})`.
//! [`parse_state`] never fails: anything that does not decode to that
//! envelope is treated as a bare CSRF value.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The only challenge method produced by this module.
pub const CHALLENGE_METHOD: &str = "S256";

// ---------------------------------------------------------------------------
// PkceChallenge
// ---------------------------------------------------------------------------

/// A PKCE S256 challenge pair consisting of a verifier and its derived
/// challenge value.
///
/// # Examples
///
/// ```
/// use toolauth::auth::pkce::generate;
///
/// let pkce = generate();
/// assert_eq!(pkce.method, "S256");
/// assert_eq!(pkce.verifier.len(), 43);
/// assert_eq!(pkce.challenge.len(), 43);
/// ```
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Base64url (no padding) encoding of 32 random bytes; 43 characters.
    pub verifier: String,
    /// Base64url (no padding) SHA-256 digest of [`Self::verifier`].
    pub challenge: String,
    /// Always `"S256"`.
    pub method: String,
}

/// The decoded contents of a state token.
///
/// # Examples
///
/// ```
/// use toolauth::auth::pkce::{generate_state, parse_state};
///
/// let state = generate_state(Some("/settings?tab=tools"));
/// let payload = parse_state(&state);
/// assert_eq!(payload.return_url.as_deref(), Some("/settings?tab=tools"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePayload {
    /// Random CSRF nonce, or the raw input for legacy states.
    pub csrf: String,
    /// Where to send the user once the flow completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

fn random_token() -> String {
    let mut random_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut random_bytes);
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Generates a code verifier from 32 cryptographically random bytes.
///
/// The result is always 43 characters from `[A-Za-z0-9_-]`.
///
/// # Examples
///
/// ```
/// use toolauth::auth::pkce::generate_code_verifier;
///
/// let v = generate_code_verifier();
/// assert!(v.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
/// ```
pub fn generate_code_verifier() -> String {
    random_token()
}

/// Derives the S256 challenge for `verifier`.
///
/// RFC 7636 section 4.2: `BASE64URL(SHA256(ASCII(code_verifier)))`.
///
/// # Examples
///
/// ```
/// use toolauth::auth::pkce::generate_code_challenge;
///
/// assert_eq!(
///     generate_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
///     "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
/// );
/// ```
pub fn generate_code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest.as_slice())
}

/// Generates a fresh verifier/challenge pair.
pub fn generate() -> PkceChallenge {
    let verifier = generate_code_verifier();
    let challenge = generate_code_challenge(&verifier);
    PkceChallenge {
        verifier,
        challenge,
        method: CHALLENGE_METHOD.to_string(),
    }
}

/// Generates a state token carrying a fresh CSRF nonce and an optional
/// return URL.
///
/// Two calls with the same `return_url` never produce the same token.
pub fn generate_state(return_url: Option<&str>) -> String {
    let payload = StatePayload {
        csrf: random_token(),
        return_url: return_url.map(str::to_string),
    };
    // Serializing two plain strings cannot fail; fall back to the nonce alone.
    match serde_json::to_vec(&payload) {
        Ok(json) => URL_SAFE_NO_PAD.encode(json),
        Err(_) => payload.csrf,
    }
}

/// Decodes a state token produced by [`generate_state`].
///
/// Invalid base64, invalid JSON, or a missing `csrf` field all fall back to
/// `StatePayload { csrf: state, return_url: None }`.
///
/// # Examples
///
/// ```
/// use toolauth::auth::pkce::parse_state;
///
/// let payload = parse_state("not-valid-base64!!!");
/// assert_eq!(payload.csrf, "not-valid-base64!!!");
/// assert!(payload.return_url.is_none());
/// ```
pub fn parse_state(state: &str) -> StatePayload {
    URL_SAFE_NO_PAD
        .decode(state.as_bytes())
        .ok()
        .and_then(|bytes| serde_json::from_slice::<StatePayload>(&bytes).ok())
        .unwrap_or_else(|| StatePayload {
            csrf: state.to_string(),
            return_url: None,
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn is_base64url(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn test_generate_produces_correct_verifier_length() {
        let pkce = generate();
        assert_eq!(
            pkce.verifier.len(),
            43,
            "32 random bytes in base64url without padding produces 43 chars"
        );
    }

    #[test]
    fn test_challenge_matches_verifier() {
        let pkce = generate();
        assert_eq!(pkce.challenge, generate_code_challenge(&pkce.verifier));
        assert_eq!(pkce.method, "S256");
    }

    #[test]
    fn test_verifier_and_challenge_use_base64url_alphabet() {
        let pkce = generate();
        assert!(is_base64url(&pkce.verifier), "got: {}", pkce.verifier);
        assert!(is_base64url(&pkce.challenge), "got: {}", pkce.challenge);
    }

    #[test]
    fn test_challenge_is_deterministic() {
        let v = generate_code_verifier();
        assert_eq!(generate_code_challenge(&v), generate_code_challenge(&v));
    }

    #[test]
    fn test_state_nonce_differs_for_same_return_url() {
        let a = parse_state(&generate_state(Some("/home")));
        let b = parse_state(&generate_state(Some("/home")));
        assert_ne!(a.csrf, b.csrf);
        assert_eq!(a.return_url, b.return_url);
    }

    #[test]
    fn test_state_without_return_url_omits_key() {
        let state = generate_state(None);
        let json = URL_SAFE_NO_PAD.decode(state.as_bytes()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert!(value.get("returnUrl").is_none());
        assert!(value["csrf"].is_string());
    }

    #[test]
    fn test_parse_state_json_without_csrf_falls_back() {
        let state = URL_SAFE_NO_PAD.encode(br#"{"returnUrl":"/x"}"#);
        let payload = parse_state(&state);
        assert_eq!(payload.csrf, state);
        assert!(payload.return_url.is_none());
    }

    #[test]
    fn test_parse_state_base64_of_non_json_falls_back() {
        let state = URL_SAFE_NO_PAD.encode(b"plain text");
        assert_eq!(parse_state(&state).csrf, state);
    }

    #[test]
    fn test_parse_state_empty_string() {
        let payload = parse_state("");
        assert_eq!(payload.csrf, "");
        assert!(payload.return_url.is_none());
    }
}
