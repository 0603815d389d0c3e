//! PKCE (Proof Key for Code Exchange) and the Nintendo Account authorize step
//!
//! Generates the code verifier, its S256 challenge and the anti-CSRF state,
//! then builds the authorize URL the operator opens in a browser. After login
//! the account site shows a "Select this account" button whose link is a
//! `npf71b963c1b7b6d119://auth#session_state=...&session_token_code=...&state=...`
//! redirect; [`extract_session_token_code`] pulls the code out of it.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use regex::Regex;
use sha2::{Digest, Sha256};
use url::form_urlencoded;

use crate::config::Endpoints;
use crate::constants::{NSO_CLIENT_ID, REDIRECT_URI, SCOPES};

/// Operator input meaning "skip login, enter tokens by hand".
pub const SKIP_SENTINEL: &str = "skip";

static SESSION_TOKEN_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"de=(.*)&st").expect("session token code pattern is valid"));

/// A PKCE verifier and the challenge derived from it.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// Everything needed to send the operator to the authorize page and later
/// redeem the code they paste back.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub state: String,
    pub pkce: PkcePair,
    pub url: String,
}

impl AuthorizationRequest {
    pub fn new(endpoints: &Endpoints) -> Self {
        let state = generate_state();
        let pkce = PkcePair::generate();
        let url = build_authorization_url(endpoints, &state, &pkce.challenge);
        Self { state, pkce, url }
    }
}

/// What the operator pasted at the redirect prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum RedirectInput {
    /// Fall back to manual token entry
    Skip,
    /// Session token code extracted from the redirect URL
    Code(String),
    /// Not a redirect URL; prompt again
    Malformed,
}

impl RedirectInput {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input == SKIP_SENTINEL {
            return RedirectInput::Skip;
        }
        match extract_session_token_code(input) {
            Some(code) => RedirectInput::Code(code),
            None => RedirectInput::Malformed,
        }
    }
}

/// Generate a PKCE code verifier: 32 random bytes, URL-safe base64, no padding.
pub fn generate_verifier() -> String {
    random_urlsafe::<32>()
}

/// Generate the `state` parameter: 36 random bytes, URL-safe base64.
pub fn generate_state() -> String {
    random_urlsafe::<36>()
}

fn random_urlsafe<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `challenge = BASE64URL(SHA256(verifier))` without padding.
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.trim_end_matches('=').as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Build the full authorize URL with all required parameters.
pub fn build_authorization_url(endpoints: &Endpoints, state: &str, challenge: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs([
            ("state", state),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", NSO_CLIENT_ID),
            ("scope", SCOPES),
            ("response_type", "session_token_code"),
            ("session_token_code_challenge", challenge),
            ("session_token_code_challenge_method", "S256"),
            ("theme", "login_form"),
        ])
        .finish();
    format!("{}?{query}", endpoints.authorize_url())
}

/// Pull the session token code out of a pasted redirect URL.
pub fn extract_session_token_code(redirect: &str) -> Option<String> {
    SESSION_TOKEN_CODE
        .captures(redirect)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|code| !code.is_empty())
}
