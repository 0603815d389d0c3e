//! Nintendo Switch Online token generation library
//!
//! Obtains the SplatNet 3 credentials (gtoken + bulletToken) the NSO app would
//! hold, without the app. This crate is a standalone library with no
//! dependency on the CLI binary; operator prompts live there.
//!
//! Token flow:
//! 1. `pkce::AuthorizationRequest::new()` builds the authorize URL
//! 2. Operator logs in and pastes the redirect; `pkce::RedirectInput::parse()`
//! 3. `session::SessionTokenExchanger::exchange()` → session token
//! 4. `exchange::CredentialExchanger::exchange()` → gtoken (web service token),
//!    signing each coral step through `attestation::AttestationClient`
//! 5. `bullet::BulletTokenFetcher::fetch()` → bulletToken
//!
//! `client::NsoClient` wires all of the above together. Version discovery
//! (`version::VersionResolver`) feeds the headers of every step.

pub mod attestation;
pub mod bullet;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod exchange;
pub mod manual;
pub mod pkce;
pub mod secret;
pub mod session;
pub mod version;

pub use client::{NsoClient, Tokens};
pub use config::{ClientConfig, Endpoints};
pub use constants::*;
pub use error::{Error, Result};
pub use manual::{normalize_bullet_token, validate_gtoken};
pub use pkce::{
    AuthorizationRequest, PkcePair, RedirectInput, compute_challenge, generate_verifier,
};
pub use secret::Secret;
pub use version::VersionResolver;
