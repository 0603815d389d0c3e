//! Session token → web service token exchange
//!
//! The chain is: session token → Nintendo Account id/access tokens → user
//! profile → coral login (f step 1) → web service token (f step 2).
//!
//! The retry policy lives in a pure state machine: [`handle_event`] receives
//! the outcome of the last step and returns `(new_state, action)`;
//! [`CredentialExchanger::exchange`] executes the I/O each action implies.
//! Coral sometimes rejects a valid signature (errors 9403/9599), so each coral
//! stage gets exactly one retry with a freshly generated f token. A second
//! rejection at the same stage is final.

use std::sync::Arc;

use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::attestation::{Attestation, AttestationClient, HashMethod};
use crate::config::ClientConfig;
use crate::constants::{
    ANDROID_USER_AGENT, NSO_CLIENT_ID, SESSION_TOKEN_GRANT_TYPE, SPLATNET3_GAME_ID,
};
use crate::error::{Error, Result, render_payload};
use crate::secret::Secret;
use crate::version::VersionResolver;

const ID_TOKEN_STEP: &str = "api/token";
const USER_INFO_STEP: &str = "users/me";

/// Retries allowed per coral stage after the first attempt.
pub const MAX_RETRIES_PER_STAGE: u32 = 1;

/// A coral stage with a bounded retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CoralLogin,
    WebServiceToken,
}

impl Stage {
    /// Step name used in error reports.
    pub fn step(self) -> &'static str {
        match self {
            Stage::CoralLogin => "Account/Login",
            Stage::WebServiceToken => "Game/GetWebServiceToken",
        }
    }
}

/// Exchange states.
///
/// Fetching the profile moves straight into the first coral login attempt,
/// and an accepted login moves straight into the first web service token
/// attempt, so "user info fetched" and "coral login ok" have no state of
/// their own. `retries` counts retries already spent at the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Start,
    /// Id and access tokens obtained; profile not fetched yet
    IdentityObtained,
    CoralLoginAttempted { retries: u32 },
    WebServiceTokenAttempted { retries: u32 },
    /// Terminal: web service token obtained
    Done,
    /// Terminal: stage rejected after its retry
    Failed { stage: Stage },
}

/// Outcomes reported by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeEvent {
    IdentityReceived,
    UserInfoReceived,
    /// The current coral stage returned the expected credential
    Accepted,
    /// The current coral stage answered without the expected credential
    Rejected,
}

/// What the executor should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeAction {
    FetchUserInfo,
    /// Generate a fresh step-1 f token and submit the coral login
    SubmitCoralLogin { retry: bool },
    /// Generate a fresh step-2 f token and request the web service token
    SubmitWebServiceToken { retry: bool },
    Finish,
    Abort { stage: Stage },
    /// Event not valid in this state
    None,
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(state: ExchangeState, event: ExchangeEvent) -> (ExchangeState, ExchangeAction) {
    use ExchangeAction as A;
    use ExchangeEvent as E;
    use ExchangeState as S;

    match (state, event) {
        (S::Start, E::IdentityReceived) => (S::IdentityObtained, A::FetchUserInfo),

        (S::IdentityObtained, E::UserInfoReceived) => (
            S::CoralLoginAttempted { retries: 0 },
            A::SubmitCoralLogin { retry: false },
        ),

        // --- Coral login ---
        (S::CoralLoginAttempted { .. }, E::Accepted) => (
            S::WebServiceTokenAttempted { retries: 0 },
            A::SubmitWebServiceToken { retry: false },
        ),
        (S::CoralLoginAttempted { retries }, E::Rejected) if retries < MAX_RETRIES_PER_STAGE => (
            S::CoralLoginAttempted {
                retries: retries + 1,
            },
            A::SubmitCoralLogin { retry: true },
        ),
        (S::CoralLoginAttempted { .. }, E::Rejected) => (
            S::Failed {
                stage: Stage::CoralLogin,
            },
            A::Abort {
                stage: Stage::CoralLogin,
            },
        ),

        // --- Web service token ---
        (S::WebServiceTokenAttempted { .. }, E::Accepted) => (S::Done, A::Finish),
        (S::WebServiceTokenAttempted { retries }, E::Rejected)
            if retries < MAX_RETRIES_PER_STAGE =>
        {
            (
                S::WebServiceTokenAttempted {
                    retries: retries + 1,
                },
                A::SubmitWebServiceToken { retry: true },
            )
        }
        (S::WebServiceTokenAttempted { .. }, E::Rejected) => (
            S::Failed {
                stage: Stage::WebServiceToken,
            },
            A::Abort {
                stage: Stage::WebServiceToken,
            },
        ),

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => (state, A::None),
    }
}

/// Id and access tokens from the Nintendo Account token endpoint.
#[derive(Debug, Clone)]
pub struct IdentityTokens {
    pub access_token: String,
    pub id_token: String,
}

/// Nintendo Account profile (`users/me`).
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub nickname: String,
    pub language: String,
    pub country: String,
    pub id: String,
    pub birthday: String,
}

/// Everything coral login needs about the account.
#[derive(Debug, Clone)]
pub struct IdentityBundle {
    pub tokens: IdentityTokens,
    pub user: UserInfo,
}

/// Coral session from `Account/Login`.
#[derive(Debug, Clone)]
pub struct GameWebToken {
    pub access_token: String,
    pub coral_user_id: String,
}

/// Result of a full exchange.
#[derive(Debug, Clone)]
pub struct WebServiceCredentials {
    /// gtoken: the `_gtoken` cookie for SplatNet 3
    pub web_service_token: Secret,
    pub nickname: String,
    pub language: String,
    pub country: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CoralLoginParameter<'a> {
    f: &'a str,
    language: &'a str,
    na_birthday: &'a str,
    na_country: &'a str,
    na_id_token: &'a str,
    request_id: uuid::Uuid,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebServiceTokenParameter<'a> {
    f: &'a str,
    id: u64,
    registration_token: &'a str,
    request_id: uuid::Uuid,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct Envelope<P> {
    parameter: P,
}

/// Outcome of one coral stage attempt.
enum Attempt<T> {
    Accepted(T),
    /// Pretty-printed response for the error report
    Rejected(String),
}

/// Drives the exchange from session token to web service token.
pub struct CredentialExchanger {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    versions: Arc<VersionResolver>,
    attestation: Arc<AttestationClient>,
}

impl CredentialExchanger {
    pub fn new(
        http: reqwest::Client,
        config: Arc<ClientConfig>,
        versions: Arc<VersionResolver>,
        attestation: Arc<AttestationClient>,
    ) -> Self {
        Self {
            http,
            config,
            versions,
            attestation,
        }
    }

    /// Run the whole chain for `session_token`.
    pub async fn exchange(&self, session_token: &Secret) -> Result<WebServiceCredentials> {
        let app_version = self.versions.resolve_app_version().await;
        let tokens = self.request_identity_tokens(session_token).await?;
        let (mut state, mut action) =
            handle_event(ExchangeState::Start, ExchangeEvent::IdentityReceived);

        let mut identity: Option<IdentityBundle> = None;
        let mut coral: Option<GameWebToken> = None;
        let mut web_service_token: Option<String> = None;
        let mut last_rejection = String::new();

        loop {
            debug!(?state, ?action, "exchange transition");
            let event = match action {
                ExchangeAction::FetchUserInfo => {
                    let user = self.fetch_user_info(&tokens.access_token).await?;
                    identity = Some(IdentityBundle {
                        tokens: tokens.clone(),
                        user,
                    });
                    ExchangeEvent::UserInfoReceived
                }
                ExchangeAction::SubmitCoralLogin { retry } => {
                    let identity = identity.as_ref().ok_or_else(|| {
                        Error::UnexpectedTransition("coral login before user info".into())
                    })?;
                    if retry {
                        warn!("coral login rejected, retrying once with a fresh f token");
                    }
                    // Both attempts sign the id token; nothing from a failed attempt is reused.
                    let attestation = self
                        .attestation
                        .call(
                            &identity.tokens.id_token,
                            HashMethod::CoralLogin,
                            &identity.user.id,
                            None,
                        )
                        .await?;
                    match self.coral_login(identity, &attestation, &app_version).await? {
                        Attempt::Accepted(token) => {
                            info!(coral_user_id = %token.coral_user_id, "coral login succeeded");
                            coral = Some(token);
                            ExchangeEvent::Accepted
                        }
                        Attempt::Rejected(detail) => {
                            last_rejection = detail;
                            ExchangeEvent::Rejected
                        }
                    }
                }
                ExchangeAction::SubmitWebServiceToken { retry } => {
                    let (Some(identity), Some(coral)) = (identity.as_ref(), coral.as_ref()) else {
                        return Err(Error::UnexpectedTransition(
                            "web service token before coral login".into(),
                        ));
                    };
                    if retry {
                        warn!("web service token rejected, retrying once with a fresh f token");
                    }
                    let attestation = self
                        .attestation
                        .call(
                            &coral.access_token,
                            HashMethod::WebServiceToken,
                            &identity.user.id,
                            Some(&coral.coral_user_id),
                        )
                        .await?;
                    match self
                        .request_web_service_token(coral, &attestation, &app_version)
                        .await?
                    {
                        Attempt::Accepted(token) => {
                            info!("obtained web service token");
                            web_service_token = Some(token);
                            ExchangeEvent::Accepted
                        }
                        Attempt::Rejected(detail) => {
                            last_rejection = detail;
                            ExchangeEvent::Rejected
                        }
                    }
                }
                ExchangeAction::Abort { stage } => {
                    return Err(Error::CredentialRejected {
                        step: stage.step(),
                        detail: last_rejection,
                    });
                }
                ExchangeAction::Finish => {
                    let (Some(identity), Some(token)) = (identity, web_service_token) else {
                        return Err(Error::UnexpectedTransition(format!(
                            "finished in state {state:?} without a web service token"
                        )));
                    };
                    return Ok(WebServiceCredentials {
                        web_service_token: Secret::new(token),
                        nickname: identity.user.nickname,
                        language: identity.user.language,
                        country: identity.user.country,
                    });
                }
                ExchangeAction::None => {
                    return Err(Error::UnexpectedTransition(format!(
                        "no action in state {state:?}"
                    )));
                }
            };
            (state, action) = handle_event(state, event);
        }
    }

    async fn request_identity_tokens(&self, session_token: &Secret) -> Result<IdentityTokens> {
        debug!(step = ID_TOKEN_STEP, "requesting id token");
        let response = self
            .http
            .post(self.config.endpoints.id_token_url())
            .header(USER_AGENT, ANDROID_USER_AGENT)
            .header(ACCEPT, "application/json")
            .json(&serde_json::json!({
                "client_id": NSO_CLIENT_ID,
                "session_token": session_token.expose(),
                "grant_type": SESSION_TOKEN_GRANT_TYPE,
            }))
            .send()
            .await
            .map_err(|e| Error::transport(ID_TOKEN_STEP, e))?;
        let body = read_json(ID_TOKEN_STEP, response).await?;

        let field = |name: &str| body.get(name).and_then(Value::as_str).map(str::to_owned);
        match (field("access_token"), field("id_token")) {
            (Some(access_token), Some(id_token)) => Ok(IdentityTokens {
                access_token,
                id_token,
            }),
            _ => Err(Error::CredentialRejected {
                step: ID_TOKEN_STEP,
                detail: format!(
                    "not a valid authorization request; log in again to get a new session token\n{}",
                    pretty(&body)
                ),
            }),
        }
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo> {
        debug!(step = USER_INFO_STEP, "fetching user info");
        let response = self
            .http
            .get(self.config.endpoints.user_info_url())
            .header(USER_AGENT, "NASDKAPI; Android")
            .header(ACCEPT, "application/json")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::transport(USER_INFO_STEP, e))?;
        let body = read_json(USER_INFO_STEP, response).await?;
        serde_json::from_value(body.clone())
            .map_err(|_| Error::protocol(USER_INFO_STEP, pretty(&body)))
    }

    async fn coral_login(
        &self,
        identity: &IdentityBundle,
        attestation: &Attestation,
        app_version: &str,
    ) -> Result<Attempt<GameWebToken>> {
        let step = Stage::CoralLogin.step();
        let request = Envelope {
            parameter: CoralLoginParameter {
                f: &attestation.f,
                language: &identity.user.language,
                na_birthday: &identity.user.birthday,
                na_country: &identity.user.country,
                na_id_token: &identity.tokens.id_token,
                request_id: attestation.request_id,
                timestamp: attestation.timestamp,
            },
        };

        debug!(step, "submitting coral login");
        let response = self
            .coral_request(self.config.endpoints.coral_login_url(), app_version)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::transport(step, e))?;
        let body = read_json(step, response).await?;

        let access_token = body
            .pointer("/result/webApiServerCredential/accessToken")
            .and_then(Value::as_str);
        let coral_user_id = body.pointer("/result/user/id").and_then(id_string);
        Ok(match (access_token, coral_user_id) {
            (Some(access_token), Some(coral_user_id)) => Attempt::Accepted(GameWebToken {
                access_token: access_token.to_owned(),
                coral_user_id,
            }),
            _ => Attempt::Rejected(pretty(&body)),
        })
    }

    async fn request_web_service_token(
        &self,
        coral: &GameWebToken,
        attestation: &Attestation,
        app_version: &str,
    ) -> Result<Attempt<String>> {
        let step = Stage::WebServiceToken.step();
        let request = Envelope {
            parameter: WebServiceTokenParameter {
                f: &attestation.f,
                id: SPLATNET3_GAME_ID,
                registration_token: &coral.access_token,
                request_id: attestation.request_id,
                timestamp: attestation.timestamp,
            },
        };

        debug!(step, "requesting web service token");
        let response = self
            .coral_request(self.config.endpoints.web_service_token_url(), app_version)
            .bearer_auth(&coral.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::transport(step, e))?;
        let body = read_json(step, response).await?;

        Ok(
            match body.pointer("/result/accessToken").and_then(Value::as_str) {
                Some(token) => Attempt::Accepted(token.to_owned()),
                None => Attempt::Rejected(pretty(&body)),
            },
        )
    }

    /// POST with the headers the NSO app sends to coral.
    fn coral_request(&self, url: String, app_version: &str) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .header("X-Platform", "Android")
            .header("X-ProductVersion", app_version)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .header(USER_AGENT, format!("com.nintendo.znca/{app_version}(Android/14)"))
    }
}

/// Read a response body as JSON, or fail with the raw text.
async fn read_json(step: &'static str, response: reqwest::Response) -> Result<Value> {
    let text = response
        .text()
        .await
        .map_err(|e| Error::transport(step, e))?;
    serde_json::from_str(&text).map_err(|_| Error::protocol(step, render_payload(&text)))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Coral user ids arrive as JSON numbers; accept strings too.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
