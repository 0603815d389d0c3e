//! f token generation via an external attestation API (imink-compatible)
//!
//! Coral requires every login and web-service-token request to carry an `f`
//! signature bound to the token being submitted, a request id and a
//! timestamp. The signature can only be produced by the NSO app, so an
//! external service computes it. Each call yields a fresh [`Attestation`];
//! callers must never reuse one across steps or retries.
//!
//! Any failure here is fatal. Submitting a stale or made-up `f` only gets the
//! account's requests rejected, so there is no fallback.

use std::sync::Arc;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{Error, Result, render_payload};
use crate::version::VersionResolver;

/// Which token the f API signs. The two signatures are not interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMethod {
    /// Step 1: the Nintendo Account id token submitted to coral login
    CoralLogin,
    /// Step 2: the coral access token submitted for a web service token
    WebServiceToken,
}

impl HashMethod {
    pub fn as_u8(self) -> u8 {
        match self {
            HashMethod::CoralLogin => 1,
            HashMethod::WebServiceToken => 2,
        }
    }
}

/// One f API response: signature, request id and timestamp to echo to coral.
#[derive(Debug, Clone, Deserialize)]
pub struct Attestation {
    pub f: String,
    pub request_id: Uuid,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
struct AttestationRequest<'a> {
    token: &'a str,
    hash_method: u8,
    na_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    coral_user_id: Option<&'a str>,
}

/// Client for the configurable f generation endpoint.
pub struct AttestationClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    versions: Arc<VersionResolver>,
}

impl AttestationClient {
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

    /// Request a fresh signature for `token`.
    ///
    /// `coral_user_id` is only sent for [`HashMethod::WebServiceToken`].
    pub async fn call(
        &self,
        token: &str,
        method: HashMethod,
        na_id: &str,
        coral_user_id: Option<&str>,
    ) -> Result<Attestation> {
        let app_version = self.versions.resolve_app_version().await;
        let url = &self.config.f_gen_url;
        let request = AttestationRequest {
            token,
            hash_method: method.as_u8(),
            na_id,
            coral_user_id: match method {
                HashMethod::WebServiceToken => coral_user_id,
                HashMethod::CoralLogin => None,
            },
        };

        debug!(hash_method = request.hash_method, url, "requesting f token");
        let response = self
            .http
            .post(url)
            .header(USER_AGENT, &self.config.client_user_agent)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .header("X-znca-Platform", "Android")
            .header("X-znca-Version", app_version)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                Error::Attestation(format!(
                    "couldn't connect to f generation API ({url}): {e}. Please try again later."
                ))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            Error::Attestation(format!("reading f generation API response failed: {e}"))
        })?;

        serde_json::from_str::<Attestation>(&body).map_err(|_| {
            if body.trim().is_empty() {
                Error::Attestation(format!("Error {}.", status.as_u16()))
            } else {
                Error::Attestation(render_payload(&body))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoints;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(f_gen_url: String, endpoints: Endpoints) -> AttestationClient {
        let config = Arc::new(ClientConfig {
            endpoints,
            f_gen_url,
            client_user_agent: "nso-auth-test/0.0.0".into(),
            use_old_app_version: true,
            ..ClientConfig::default()
        });
        let http = reqwest::Client::new();
        let versions = Arc::new(VersionResolver::new(http.clone(), config.clone()));
        AttestationClient::new(http, config, versions)
    }

    fn for_server(server: &MockServer) -> AttestationClient {
        client_for(
            format!("{}/f", server.uri()),
            Endpoints::all_at(&server.uri()),
        )
    }

    #[tokio::test]
    async fn step_one_omits_coral_user_id() {
        let server = MockServer::start().await;
        let request_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path("/f"))
            .and(header("X-znca-Platform", "Android"))
            .and(header("X-znca-Version", "2.10.1"))
            .and(header("User-Agent", "nso-auth-test/0.0.0"))
            .and(body_json(json!({
                "token": "id_token",
                "hash_method": 1,
                "na_id": "na-123"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "f": "f-signature",
                "request_id": request_id,
                "timestamp": 1_700_000_000_000u64
            })))
            .expect(1)
            .mount(&server)
            .await;

        let attestation = for_server(&server)
            .call("id_token", HashMethod::CoralLogin, "na-123", Some("ignored"))
            .await
            .unwrap();
        assert_eq!(attestation.f, "f-signature");
        assert_eq!(attestation.request_id, request_id);
        assert_eq!(attestation.timestamp, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn step_two_sends_coral_user_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/f"))
            .and(body_json(json!({
                "token": "coral_access",
                "hash_method": 2,
                "na_id": "na-123",
                "coral_user_id": "5555"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "f": "f-two",
                "request_id": Uuid::new_v4(),
                "timestamp": 1_700_000_000_001u64
            })))
            .expect(1)
            .mount(&server)
            .await;

        let attestation = for_server(&server)
            .call("coral_access", HashMethod::WebServiceToken, "na-123", Some("5555"))
            .await
            .unwrap();
        assert_eq!(attestation.f, "f-two");
    }

    #[tokio::test]
    async fn error_body_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/f"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"error": "invalid_token"})),
            )
            .mount(&server)
            .await;

        let err = for_server(&server)
            .call("bad", HashMethod::CoralLogin, "na", None)
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("invalid_token"), "got: {msg}");
    }

    #[tokio::test]
    async fn empty_body_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/f"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = for_server(&server)
            .call("t", HashMethod::CoralLogin, "na", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Error 429"), "got: {err}");
    }

    #[tokio::test]
    async fn missing_field_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/f"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"f": "only-f"})))
            .mount(&server)
            .await;

        let result = for_server(&server)
            .call("t", HashMethod::CoralLogin, "na", None)
            .await;
        assert!(matches!(result, Err(Error::Attestation(_))), "got: {result:?}");
    }

    #[tokio::test]
    async fn unreachable_service_is_fatal() {
        let client = client_for(
            "http://127.0.0.1:1/f".into(),
            Endpoints::all_at("http://127.0.0.1:1"),
        );
        let err = client
            .call("t", HashMethod::CoralLogin, "na", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("couldn't connect"), "got: {err}");
    }

    #[test]
    fn hash_methods_are_distinct() {
        assert_eq!(HashMethod::CoralLogin.as_u8(), 1);
        assert_eq!(HashMethod::WebServiceToken.as_u8(), 2);
    }
}
