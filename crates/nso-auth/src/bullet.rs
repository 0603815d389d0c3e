//! bulletToken acquisition
//!
//! SplatNet 3 trades the gtoken (web service token, sent as the `_gtoken`
//! cookie) for a short-lived bulletToken used on its GraphQL API.

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE, ORIGIN, USER_AGENT};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::constants::WEB_VIEW_REQUESTED_WITH;
use crate::error::{Error, Result, render_payload};
use crate::secret::Secret;
use crate::version::VersionResolver;

const STEP: &str = "api/bullet_tokens";

/// Exchanges a web service token for a bulletToken.
pub struct BulletTokenFetcher {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    versions: Arc<VersionResolver>,
}

impl BulletTokenFetcher {
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

    /// Fetch a bulletToken.
    ///
    /// 401, 403 and 204 are fatal. A body that is not a JSON object is logged
    /// and yields an empty token so the caller can decide whether to retry;
    /// a JSON object without `bulletToken` is fatal.
    pub async fn fetch(
        &self,
        web_service_token: &Secret,
        app_user_agent: &str,
        language: &str,
        country: &str,
    ) -> Result<Secret> {
        let web_view_version = self.versions.resolve_web_view_version(None, None).await?;
        let splatnet = &self.config.endpoints.splatnet;

        debug!(step = STEP, web_view_version, "requesting bullet token");
        let response = self
            .http
            .post(self.config.endpoints.bullet_token_url())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT_LANGUAGE, language)
            .header(USER_AGENT, app_user_agent)
            .header("X-Web-View-Ver", web_view_version)
            .header("X-NACOUNTRY", country)
            .header(ACCEPT, "*/*")
            .header(ORIGIN, splatnet.as_str())
            .header("X-Requested-With", WEB_VIEW_REQUESTED_WITH)
            .header(
                COOKIE,
                format!("_gtoken={}; _dnt=1", web_service_token.expose()),
            )
            .send()
            .await
            .map_err(|e| Error::transport(STEP, e))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(Error::InvalidGameWebToken),
            StatusCode::FORBIDDEN => return Err(Error::ObsoleteVersion),
            StatusCode::NO_CONTENT => return Err(Error::NotRegistered),
            _ => {}
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::transport(STEP, e))?;
        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(map)) => match map.get("bulletToken").and_then(Value::as_str) {
                Some(token) => {
                    info!("obtained bullet token");
                    Ok(Secret::new(token))
                }
                None => Err(Error::protocol(STEP, render_payload(&body))),
            },
            _ => {
                warn!(step = STEP, body, "got non-JSON response for bullet token");
                Ok(Secret::new(String::new()))
            }
        }
    }
}
