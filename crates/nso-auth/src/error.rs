//! Error types for the token exchange pipeline

/// Errors from the token exchange pipeline.
///
/// `step` names the remote call that failed (e.g. `api/session_token`,
/// `Account/Login`) so the operator can tell where the chain broke.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection refused, timeout, or similar. Retrying later may help.
    #[error("could not connect to Nintendo (in {step} step): {message}. Please try again.")]
    Transport { step: &'static str, message: String },

    /// Response was not JSON or did not match the expected schema.
    #[error("unexpected response from Nintendo (in {step} step):\n{body}")]
    Protocol { step: &'static str, body: String },

    /// An expected field was missing: expired code, rejected signature, etc.
    #[error("credentials rejected by Nintendo (in {step} step):\n{detail}")]
    CredentialRejected { step: &'static str, detail: String },

    #[error("error during f generation: {0}")]
    Attestation(String),

    #[error("unauthorized error (ERROR_INVALID_GAME_WEB_TOKEN); cannot fetch tokens at this time")]
    InvalidGameWebToken,

    #[error("forbidden error (ERROR_OBSOLETE_VERSION); cannot fetch tokens at this time")]
    ObsoleteVersion,

    #[error("cannot access SplatNet 3 without having played online")]
    NotRegistered,

    #[error("invalid input: {0}")]
    UserInput(String),

    #[error("unexpected exchange transition: {0}")]
    UnexpectedTransition(String),
}

impl Error {
    /// Classify a reqwest failure at `step` as a transport error.
    pub(crate) fn transport(step: &'static str, err: reqwest::Error) -> Self {
        Error::Transport {
            step,
            message: err.to_string(),
        }
    }

    /// Non-JSON body or schema mismatch at `step`, keeping the payload for diagnosis.
    pub(crate) fn protocol(step: &'static str, body: impl Into<String>) -> Self {
        Error::Protocol {
            step,
            body: body.into(),
        }
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pretty-print a JSON payload for error reports, falling back to the raw text.
pub(crate) fn render_payload(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| body.to_string())
}
