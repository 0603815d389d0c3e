//! Pipeline wiring
//!
//! `NsoClient` builds one HTTP client, one `VersionResolver` and one instance
//! of each component, all sharing the same `ClientConfig`. The steps run
//! strictly in sequence: every call consumes the previous call's output.

use std::sync::Arc;

use tracing::info;

use crate::attestation::AttestationClient;
use crate::bullet::BulletTokenFetcher;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::exchange::CredentialExchanger;
use crate::pkce::AuthorizationRequest;
use crate::secret::Secret;
use crate::session::SessionTokenExchanger;
use crate::version::VersionResolver;

/// Tokens and account details produced by a full run.
#[derive(Debug, Clone)]
pub struct Tokens {
    pub gtoken: Secret,
    /// Empty when SplatNet answered with something other than JSON
    pub bullet_token: Secret,
    pub nickname: String,
    pub language: String,
    pub country: String,
}

/// Entry point for the whole token pipeline.
pub struct NsoClient {
    config: Arc<ClientConfig>,
    session: SessionTokenExchanger,
    exchanger: CredentialExchanger,
    bullet: BulletTokenFetcher,
}

impl NsoClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let config = Arc::new(config);
        let http = config
            .http_client()
            .map_err(|e| Error::transport("client setup", e))?;

        let versions = Arc::new(VersionResolver::new(http.clone(), config.clone()));
        let attestation = Arc::new(AttestationClient::new(
            http.clone(),
            config.clone(),
            versions.clone(),
        ));

        Ok(Self {
            session: SessionTokenExchanger::new(http.clone(), config.clone(), versions.clone()),
            exchanger: CredentialExchanger::new(
                http.clone(),
                config.clone(),
                versions.clone(),
                attestation,
            ),
            bullet: BulletTokenFetcher::new(http, config.clone(), versions),
            config,
        })
    }

    /// Start a login: fresh state, PKCE pair and authorize URL.
    pub fn authorization_request(&self) -> AuthorizationRequest {
        AuthorizationRequest::new(&self.config.endpoints)
    }

    /// Redeem the session token code pasted back by the operator.
    pub async fn redeem(&self, request: &AuthorizationRequest, code: &str) -> Result<Secret> {
        self.session.exchange(code, &request.pkce.verifier).await
    }

    /// Run session token → gtoken → bulletToken.
    pub async fn acquire_tokens(
        &self,
        session_token: &Secret,
        app_user_agent: &str,
    ) -> Result<Tokens> {
        let credentials = self.exchanger.exchange(session_token).await?;
        let bullet_token = self
            .bullet
            .fetch(
                &credentials.web_service_token,
                app_user_agent,
                &credentials.language,
                &credentials.country,
            )
            .await?;
        info!(
            nickname = credentials.nickname,
            gtoken = ?credentials.web_service_token,
            bullet_token = ?bullet_token,
            "token generation finished"
        );

        Ok(Tokens {
            gtoken: credentials.web_service_token,
            bullet_token,
            nickname: credentials.nickname,
            language: credentials.language,
            country: credentials.country,
        })
    }
}
