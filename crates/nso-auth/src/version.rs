//! App and web view version discovery
//!
//! Coral and SplatNet reject clients that report stale versions, so every
//! request header embeds the NSO app version and the SplatNet web view
//! version. Both are discovered once per `VersionResolver` and memoized in a
//! `OnceCell`: the first resolved value wins and later calls never hit the
//! network again, even if they run concurrently.
//!
//! Discovery is best effort. App version: f API `/config` → App Store listing
//! → static fallback. Web view version: portal home page → main script →
//! static fallback. The one hard failure is being unable to reach the portal
//! home page at all.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderValue, REFERER, USER_AGENT,
};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::constants::{
    APP_VERSION_FALLBACK, WEB_VIEW_REQUESTED_WITH, WEB_VIEW_VERSION_FALLBACK,
};
use crate::error::{Error, Result};

static APP_STORE_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)class="[^"]*whats-new__latest__version[^"]*"[^>]*>(.*?)</p>"#)
        .expect("app store version pattern is valid")
});

static MAIN_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<script[^>]*\bsrc=["']([^"']*static[^"']*)["']"#)
        .expect("main script pattern is valid")
});

static WEB_VIEW_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\b(?P<revision>[0-9a-f]{40})\b[\S]*?void 0[\S]*?"revision_info_not_set"\}`,.*?=`(?P<version>\d+\.\d+\.\d+)-"#,
    )
    .expect("web view version pattern is valid")
});

/// Resolves and memoizes the NSO app version and SplatNet web view version.
///
/// Share one instance (behind `Arc`) between all components of a login so
/// they report consistent versions.
pub struct VersionResolver {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    app_version: OnceCell<String>,
    web_view_version: OnceCell<String>,
}

impl VersionResolver {
    pub fn new(http: reqwest::Client, config: Arc<ClientConfig>) -> Self {
        Self {
            http,
            config,
            app_version: OnceCell::new(),
            web_view_version: OnceCell::new(),
        }
    }

    /// Current NSO app version. Never fails.
    pub async fn resolve_app_version(&self) -> String {
        if self.config.use_old_app_version {
            return APP_VERSION_FALLBACK.to_string();
        }
        self.app_version
            .get_or_init(|| self.discover_app_version())
            .await
            .clone()
    }

    /// Current SplatNet web view version (`{major.minor.patch}-{revision[..8]}`).
    ///
    /// `borrowed` lends `User-Agent` and `Accept-Language` from the caller's
    /// browser headers; `gtoken` is sent as the `_gtoken` cookie. Only a
    /// connection failure on the home page is an error; anything after that
    /// degrades to the fallback. Errors are not memoized.
    pub async fn resolve_web_view_version(
        &self,
        borrowed: Option<&HeaderMap>,
        gtoken: Option<&str>,
    ) -> Result<String> {
        self.web_view_version
            .get_or_try_init(|| self.discover_web_view_version(borrowed, gtoken))
            .await
            .cloned()
    }

    async fn discover_app_version(&self) -> String {
        if let Some(version) = self.app_version_from_f_api().await {
            info!(version, source = "f_api", "resolved NSO app version");
            return version;
        }
        if let Some(version) = self.app_version_from_app_store().await {
            info!(version, source = "app_store", "resolved NSO app version");
            return version;
        }
        warn!(
            version = APP_VERSION_FALLBACK,
            "could not discover NSO app version, using fallback"
        );
        APP_VERSION_FALLBACK.to_string()
    }

    async fn app_version_from_f_api(&self) -> Option<String> {
        let url = self.config.f_config_url();
        let response = self
            .http
            .get(&url)
            .header(USER_AGENT, &self.config.client_user_agent)
            .send()
            .await
            .inspect_err(|e| debug!(url, error = %e, "f API config request failed"))
            .ok()?;
        let body: serde_json::Value = response.json().await.ok()?;
        body.get("nso_version")?
            .as_str()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    }

    async fn app_version_from_app_store(&self) -> Option<String> {
        let response = self
            .http
            .get(&self.config.endpoints.app_store)
            .send()
            .await
            .inspect_err(|e| debug!(error = %e, "app store request failed"))
            .ok()?;
        let page = response.text().await.ok()?;
        parse_app_store_version(&page)
    }

    async fn discover_web_view_version(
        &self,
        borrowed: Option<&HeaderMap>,
        gtoken: Option<&str>,
    ) -> Result<String> {
        let base = &self.config.endpoints.splatnet;
        let cookies = match gtoken {
            Some(token) => format!("_dnt=1; _gtoken={token}"),
            None => "_dnt=1".to_string(),
        };

        let home = self
            .http
            .get(base)
            .headers(home_page_headers(borrowed))
            .header(COOKIE, &cookies)
            .send()
            .await
            .map_err(|e| Error::transport("SplatNet 3 home page", e))?;

        if home.status() != StatusCode::OK {
            warn!(
                status = %home.status(),
                "SplatNet 3 home page not available, using fallback web view version"
            );
            return Ok(WEB_VIEW_VERSION_FALLBACK.to_string());
        }

        let Some(src) = home.text().await.ok().and_then(|html| find_main_script(&html)) else {
            warn!("main.js not found on SplatNet 3 home page, using fallback web view version");
            return Ok(WEB_VIEW_VERSION_FALLBACK.to_string());
        };
        let script_url = if src.starts_with("http://") || src.starts_with("https://") {
            src
        } else {
            format!("{base}{src}")
        };

        let script = match self
            .http
            .get(&script_url)
            .headers(script_headers(borrowed))
            .header(REFERER, base.as_str())
            .header(COOKIE, &cookies)
            .send()
            .await
        {
            Ok(response) if response.status() == StatusCode::OK => response.text().await.ok(),
            Ok(response) => {
                debug!(status = %response.status(), url = script_url, "main.js request rejected");
                None
            }
            Err(e) => {
                debug!(error = %e, url = script_url, "main.js request failed");
                None
            }
        };

        match script.as_deref().and_then(parse_web_view_version) {
            Some(version) => {
                info!(version, "resolved SplatNet 3 web view version");
                Ok(version)
            }
            None => {
                warn!("could not parse web view version from main.js, using fallback");
                Ok(WEB_VIEW_VERSION_FALLBACK.to_string())
            }
        }
    }
}

/// Extract the version from the App Store "what's new" paragraph.
pub fn parse_app_store_version(page: &str) -> Option<String> {
    let text = APP_STORE_VERSION.captures(page)?.get(1)?.as_str();
    let version = text.trim().trim_start_matches("Version").trim();
    (!version.is_empty()).then(|| version.to_string())
}

/// Find the `src` of the first static script on the portal home page.
pub fn find_main_script(html: &str) -> Option<String> {
    MAIN_SCRIPT
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extract `{major.minor.patch}-{first 8 chars of the 40-char revision}` from main.js.
pub fn parse_web_view_version(script: &str) -> Option<String> {
    let captures = WEB_VIEW_TAG.captures(script)?;
    let version = captures.name("version")?.as_str();
    let revision = captures.name("revision")?.as_str();
    Some(format!("{version}-{}", &revision[..8]))
}

fn home_page_headers(borrowed: Option<&HeaderMap>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert("dnt", HeaderValue::from_static("1"));
    headers.insert("x-appcolorscheme", HeaderValue::from_static("DARK"));
    headers.insert(
        "x-requested-with",
        HeaderValue::from_static(WEB_VIEW_REQUESTED_WITH),
    );
    headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    copy_borrowed(&mut headers, borrowed);
    headers
}

fn script_headers(borrowed: Option<&HeaderMap>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(
        "x-requested-with",
        HeaderValue::from_static(WEB_VIEW_REQUESTED_WITH),
    );
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("no-cors"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("script"));
    copy_borrowed(&mut headers, borrowed);
    headers
}

/// Accept-Encoding is left to reqwest so responses stay decodable.
fn copy_borrowed(headers: &mut HeaderMap, borrowed: Option<&HeaderMap>) {
    let Some(borrowed) = borrowed else { return };
    for name in [USER_AGENT, ACCEPT_LANGUAGE] {
        if let Some(value) = borrowed.get(&name) {
            headers.insert(name, value.clone());
        }
    }
}
