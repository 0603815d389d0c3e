//! Client configuration threaded through every component
//!
//! Every component takes a shared `ClientConfig` at construction time instead
//! of reading process-wide state. `Default` points at the production hosts;
//! tests swap the endpoints for a mock server.

use std::time::Duration;

/// Base URLs of the hosts the pipeline talks to. No trailing slashes.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Nintendo Account site: authorize page and session/id token APIs
    pub accounts: String,
    /// Nintendo Account API: `users/me`
    pub accounts_api: String,
    /// Coral (NSO app backend): login and web service token
    pub coral: String,
    /// SplatNet 3 web portal
    pub splatnet: String,
    /// Public App Store listing of the NSO app, scraped for its version
    pub app_store: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            accounts: "https://accounts.nintendo.com".into(),
            accounts_api: "https://api.accounts.nintendo.com".into(),
            coral: "https://api-lp1.znc.srv.nintendo.net".into(),
            splatnet: "https://api.lp1.av5ja.srv.nintendo.net".into(),
            app_store: "https://apps.apple.com/us/app/nintendo-switch-online/id1234806557".into(),
        }
    }
}

impl Endpoints {
    /// Point every endpoint at one base URL (mock servers).
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            accounts: base.to_string(),
            accounts_api: base.to_string(),
            coral: base.to_string(),
            splatnet: base.to_string(),
            app_store: format!("{base}/app-store/nintendo-switch-online"),
        }
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/connect/1.0.0/authorize", self.accounts)
    }

    pub fn session_token_url(&self) -> String {
        format!("{}/connect/1.0.0/api/session_token", self.accounts)
    }

    pub fn id_token_url(&self) -> String {
        format!("{}/connect/1.0.0/api/token", self.accounts)
    }

    pub fn user_info_url(&self) -> String {
        format!("{}/2.0.0/users/me", self.accounts_api)
    }

    pub fn coral_login_url(&self) -> String {
        format!("{}/v3/Account/Login", self.coral)
    }

    pub fn web_service_token_url(&self) -> String {
        format!("{}/v2/Game/GetWebServiceToken", self.coral)
    }

    pub fn bullet_token_url(&self) -> String {
        format!("{}/api/bullet_tokens", self.splatnet)
    }
}

/// Configuration shared by all pipeline components.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoints: Endpoints,
    /// f generation API, e.g. `https://api.imink.app/f`
    pub f_gen_url: String,
    /// User agent identifying this tool to the f generation API
    pub client_user_agent: String,
    /// Skip version discovery and always report the fallback app version.
    /// Works around "9403: Invalid token" right after an app update.
    pub use_old_app_version: bool,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            f_gen_url: "https://api.imink.app/f".into(),
            client_user_agent: format!("nso-auth/{}", env!("CARGO_PKG_VERSION")),
            use_old_app_version: false,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// The `/config` sibling of the f generation URL, which reports `nso_version`.
    pub fn f_config_url(&self) -> String {
        let trimmed = self.f_gen_url.trim_end_matches('/');
        match trimmed.rsplit_once('/') {
            Some((dir, _)) if dir.contains("://") => format!("{dir}/config"),
            _ => format!("{trimmed}/config"),
        }
    }

    /// Build the HTTP client every component shares.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(std::cmp::min(self.timeout, Duration::from_secs(10)))
            .timeout(self.timeout)
            .build()
    }
}
