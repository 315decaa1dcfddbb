//! PKCE and state token tests
//!
//! - Verifiers are 43..=128 base64url characters.
//! - Challenges are deterministic 43-character base64url SHA-256 digests.
//! - RFC 7636 Appendix B known-answer vector.
//! - State tokens carry an optional return URL and degrade gracefully.

use std::collections::HashSet;

use toolauth::auth::pkce::{
    generate, generate_code_challenge, generate_code_verifier, generate_state, parse_state,
    CHALLENGE_METHOD,
};

fn is_base64url(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[test]
fn test_verifier_length_and_alphabet() {
    for _ in 0..50 {
        let verifier = generate_code_verifier();
        assert!((43..=128).contains(&verifier.len()), "len {}", verifier.len());
        assert!(is_base64url(&verifier), "unexpected characters in {verifier}");
    }
}

#[test]
fn test_verifiers_are_unique() {
    let verifiers: HashSet<String> = (0..100).map(|_| generate_code_verifier()).collect();
    assert_eq!(verifiers.len(), 100);
}

#[test]
fn test_challenge_is_deterministic_and_43_chars() {
    let verifier = generate_code_verifier();
    let a = generate_code_challenge(&verifier);
    let b = generate_code_challenge(&verifier);
    assert_eq!(a, b);
    assert_eq!(a.len(), 43);
    assert!(is_base64url(&a));
}

#[test]
fn test_distinct_verifiers_give_distinct_challenges() {
    let a = generate_code_challenge(&generate_code_verifier());
    let b = generate_code_challenge(&generate_code_verifier());
    assert_ne!(a, b);
}

/// RFC 7636 Appendix B.
#[test]
fn test_rfc7636_known_answer() {
    assert_eq!(
        generate_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
        "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
    );
}

#[test]
fn test_generate_pairs_verifier_and_challenge() {
    let pkce = generate();
    assert_eq!(pkce.method, CHALLENGE_METHOD);
    assert_eq!(pkce.challenge, generate_code_challenge(&pkce.verifier));
}

#[test]
fn test_state_round_trips_return_urls() {
    for url in [
        "/dashboard",
        "https://app.example.com/settings?tab=integrations&x=1#github",
        "/search?q=a%20b&page=2",
        "ünïcödé/path",
    ] {
        let state = generate_state(Some(url));
        assert!(is_base64url(&state));
        assert_eq!(parse_state(&state).return_url.as_deref(), Some(url));
    }
}

#[test]
fn test_state_without_return_url() {
    let payload = parse_state(&generate_state(None));
    assert!(payload.return_url.is_none());
    assert!(!payload.csrf.is_empty());
}

#[test]
fn test_states_are_unique() {
    assert_ne!(generate_state(None), generate_state(None));
}

#[test]
fn test_parse_state_falls_back_to_raw_csrf() {
    let payload = parse_state("not-valid-base64!!!");
    assert_eq!(payload.csrf, "not-valid-base64!!!");
    assert!(payload.return_url.is_none());
}
