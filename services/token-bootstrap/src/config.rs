//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. The file itself is
//! optional; only an explicitly requested path has to exist. The session
//! token is only ever read from `NSO_SESSION_TOKEN`, never from the TOML.

use nso_auth::{ClientConfig, Endpoints, Secret};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const DEFAULT_PATH: &str = "splatnet-token.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub attestation: AttestationConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub endpoints: EndpointOverrides,
    #[serde(skip)]
    pub session_token: Option<Secret>,
}

/// f generation API settings
#[derive(Debug, Deserialize)]
pub struct AttestationConfig {
    #[serde(default = "default_f_gen_url")]
    pub url: String,
}

/// How this tool presents itself to SplatNet
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Browser user agent sent with the bulletToken request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub use_old_app_version: bool,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Per-host base URL overrides; unset hosts keep the production value.
#[derive(Debug, Default, Deserialize)]
pub struct EndpointOverrides {
    pub accounts: Option<String>,
    pub accounts_api: Option<String>,
    pub coral: Option<String>,
    pub splatnet: Option<String>,
    pub app_store: Option<String>,
}

/// Where the config file comes from.
#[derive(Debug, PartialEq, Eq)]
pub struct ConfigPath {
    pub path: PathBuf,
    /// Given via `--config` or `CONFIG_PATH`, so it must exist
    pub explicit: bool,
}

fn default_f_gen_url() -> String {
    ClientConfig::default().f_gen_url
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Linux; Android 14; Pixel 7a) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.230 Mobile Safari/537.36".into()
}

fn default_timeout() -> u64 {
    30
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            url: default_f_gen_url(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            use_old_app_version: false,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// - `F_GEN_URL` replaces `[attestation] url`
    /// - `NSO_SESSION_TOKEN` supplies an existing session token
    pub fn load(source: &ConfigPath) -> Result<Self> {
        let mut config = if !source.explicit && !source.path.exists() {
            Config::default()
        } else {
            Self::parse_file(&source.path)?
        };

        if let Ok(url) = std::env::var("F_GEN_URL") {
            let url = url.trim();
            if !url.is_empty() {
                config.attestation.url = url.to_owned();
            }
        }
        if let Ok(token) = std::env::var("NSO_SESSION_TOKEN") {
            let token = token.trim();
            if !token.is_empty() {
                config.session_token = Some(Secret::new(token));
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    fn validate(&self) -> Result<()> {
        check_url("attestation.url", &self.attestation.url)?;
        let overrides = [
            ("endpoints.accounts", &self.endpoints.accounts),
            ("endpoints.accounts_api", &self.endpoints.accounts_api),
            ("endpoints.coral", &self.endpoints.coral),
            ("endpoints.splatnet", &self.endpoints.splatnet),
            ("endpoints.app_store", &self.endpoints.app_store),
        ];
        for (name, value) in overrides {
            if let Some(url) = value {
                check_url(name, url)?;
            }
        }

        if self.http.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be greater than 0".into()));
        }
        if self.app.user_agent.trim().is_empty() {
            return Err(Error::Config("app.user_agent must not be empty".into()));
        }
        Ok(())
    }

    /// Library configuration for the pipeline.
    pub fn client_config(&self) -> ClientConfig {
        let mut endpoints = Endpoints::default();
        let host = |value: &Option<String>, slot: &mut String| {
            if let Some(url) = value {
                *slot = url.trim_end_matches('/').to_owned();
            }
        };
        host(&self.endpoints.accounts, &mut endpoints.accounts);
        host(&self.endpoints.accounts_api, &mut endpoints.accounts_api);
        host(&self.endpoints.coral, &mut endpoints.coral);
        host(&self.endpoints.splatnet, &mut endpoints.splatnet);
        host(&self.endpoints.app_store, &mut endpoints.app_store);

        ClientConfig {
            endpoints,
            f_gen_url: self.attestation.url.clone(),
            client_user_agent: format!("splatnet-token/{}", env!("CARGO_PKG_VERSION")),
            use_old_app_version: self.app.use_old_app_version,
            timeout: Duration::from_secs(self.http.timeout_secs),
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> ConfigPath {
        if let Some(p) = cli_path {
            return ConfigPath {
                path: PathBuf::from(p),
                explicit: true,
            };
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return ConfigPath {
                path: PathBuf::from(p),
                explicit: true,
            };
        }
        ConfigPath {
            path: PathBuf::from(DEFAULT_PATH),
            explicit: false,
        }
    }
}

fn check_url(name: &str, url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{name} must start with http:// or https://, got: {url}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that touch process environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn clear_env() {
        unsafe {
            remove_env("F_GEN_URL");
            remove_env("NSO_SESSION_TOKEN");
            remove_env("CONFIG_PATH");
        }
    }

    fn explicit(path: &Path) -> ConfigPath {
        ConfigPath {
            path: path.to_path_buf(),
            explicit: true,
        }
    }

    fn valid_toml() -> &'static str {
        r#"
[attestation]
url = "https://nxapi-znca-api.fancy.org.uk/api/znca/f"

[app]
use_old_app_version = true

[http]
timeout_secs = 12

[endpoints]
splatnet = "http://127.0.0.1:9000/"
"#
    }

    #[test]
    fn test_load_valid_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("splatnet-token.toml");
        std::fs::write(&path, valid_toml()).unwrap();

        let config = Config::load(&explicit(&path)).unwrap();
        assert_eq!(
            config.attestation.url,
            "https://nxapi-znca-api.fancy.org.uk/api/znca/f"
        );
        assert!(config.app.use_old_app_version);
        assert_eq!(config.http.timeout_secs, 12);
        assert!(config.session_token.is_none());

        let client = config.client_config();
        assert_eq!(client.endpoints.splatnet, "http://127.0.0.1:9000");
        assert_eq!(client.endpoints.coral, Endpoints::default().coral);
        assert_eq!(client.timeout, Duration::from_secs(12));
        assert!(client.use_old_app_version);
    }

    #[test]
    fn test_missing_default_file_uses_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let source = ConfigPath {
            path: dir.path().join("splatnet-token.toml"),
            explicit: false,
        };

        let config = Config::load(&source).unwrap();
        assert_eq!(config.attestation.url, ClientConfig::default().f_gen_url);
        assert_eq!(config.http.timeout_secs, 30);
        assert!(!config.app.use_old_app_version);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let result = Config::load(&explicit(Path::new("/nonexistent/path/config.toml")));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid {{{{ toml").unwrap();

        let result = Config::load(&explicit(&path));
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_rejects_non_http_urls() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[endpoints]\ncoral = \"ftp://example.com\"\n").unwrap();

        let err = Config::load(&explicit(&path)).unwrap_err();
        assert!(err.to_string().contains("endpoints.coral"), "got: {err}");
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[http]\ntimeout_secs = 0\n").unwrap();

        let err = Config::load(&explicit(&path)).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"), "got: {err}");
    }

    #[test]
    fn test_env_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, valid_toml()).unwrap();

        unsafe {
            set_env("F_GEN_URL", "http://localhost:8081/f");
            set_env("NSO_SESSION_TOKEN", " eyJhbGciOiJIUzI1NiJ9.session \n");
        }
        let config = Config::load(&explicit(&path)).unwrap();
        clear_env();

        assert_eq!(config.attestation.url, "http://localhost:8081/f");
        assert_eq!(
            config.session_token.as_ref().unwrap().expose(),
            "eyJhbGciOiJIUzI1NiJ9.session"
        );
    }

    #[test]
    fn test_invalid_env_url_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let source = ConfigPath {
            path: dir.path().join("absent.toml"),
            explicit: false,
        };

        unsafe { set_env("F_GEN_URL", "imink.app/f") };
        let result = Config::load(&source);
        clear_env();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_resolve_path_precedence() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        assert_eq!(
            Config::resolve_path(None),
            ConfigPath {
                path: PathBuf::from("splatnet-token.toml"),
                explicit: false,
            }
        );

        unsafe { set_env("CONFIG_PATH", "/etc/splatnet-token.toml") };
        assert_eq!(
            Config::resolve_path(None).path,
            PathBuf::from("/etc/splatnet-token.toml")
        );
        let cli = Config::resolve_path(Some("/tmp/cli.toml"));
        clear_env();

        assert_eq!(cli.path, PathBuf::from("/tmp/cli.toml"));
        assert!(cli.explicit);
    }
}
