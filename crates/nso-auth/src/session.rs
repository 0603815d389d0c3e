//! Session token exchange
//!
//! Redeems the session token code from the authorize redirect, together with
//! the PKCE verifier, for a long-lived Nintendo Account session token. The
//! request mimics the NSO app's account SDK, so the user agent embeds the
//! resolved app version.

use std::sync::Arc;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::constants::NSO_CLIENT_ID;
use crate::error::{Error, Result, render_payload};
use crate::secret::Secret;
use crate::version::VersionResolver;

const STEP: &str = "api/session_token";

#[derive(Debug, Deserialize)]
struct SessionTokenResponse {
    session_token: Option<String>,
}

/// Swaps an authorization code for a session token.
pub struct SessionTokenExchanger {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    versions: Arc<VersionResolver>,
}

impl SessionTokenExchanger {
    pub fn new(
        http: reqwest::Client,
        config: Arc<ClientConfig>,
        versions: Arc<VersionResolver>,
    ) -> Self {
        Self {
            http,
            config,
            versions,
        }
    }

    /// Exchange `code` + `verifier` for a session token.
    ///
    /// A response without `session_token` means the code expired or was
    /// already used; the operator has to log in again.
    pub async fn exchange(&self, code: &str, verifier: &str) -> Result<Secret> {
        let app_version = self.versions.resolve_app_version().await;
        let verifier = verifier.trim_end_matches('=');

        debug!(step = STEP, "exchanging session token code");
        let response = self
            .http
            .post(self.config.endpoints.session_token_url())
            .header(USER_AGENT, format!("OnlineLounge/{app_version} NASDKAPI Android"))
            .header(ACCEPT_LANGUAGE, "en-US")
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", NSO_CLIENT_ID),
                ("session_token_code", code),
                ("session_token_code_verifier", verifier),
            ])
            .send()
            .await
            .map_err(|e| Error::transport(STEP, e))?;

        let body = response
            .text()
            .await
            .map_err(|e| Error::transport(STEP, e))?;
        let parsed: SessionTokenResponse =
            serde_json::from_str(&body).map_err(|_| Error::protocol(STEP, body.clone()))?;

        match parsed.session_token {
            Some(token) if !token.is_empty() => {
                info!("obtained session token");
                Ok(Secret::new(token))
            }
            _ => Err(Error::CredentialRejected {
                step: STEP,
                detail: format!(
                    "the URL has expired; log out and back in to your Nintendo Account and retry\n{}",
                    render_payload(&body)
                ),
            }),
        }
    }
}
