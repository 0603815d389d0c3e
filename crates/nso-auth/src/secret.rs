//! Redacted wrapper for tokens
//!
//! Session tokens, game web tokens and bullet tokens all grant account access.
//! They pass through `tracing` fields and error paths, so the wrapper never
//! prints its contents and wipes them on drop.

use std::fmt;

use zeroize::Zeroize;

/// A token value that is redacted in Debug/Display and zeroized on drop.
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw token (use sparingly)
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED; {} chars]", self.0.len())
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl Clone for Secret {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_are_redacted() {
        let token = Secret::new("eyJhbGciOi.session.token");
        let debug = format!("{token:?}");
        assert_eq!(debug, "[REDACTED; 24 chars]");
        assert_eq!(token.to_string(), "[REDACTED]");
        assert!(!debug.contains("session"));
    }

    #[test]
    fn expose_returns_raw_value() {
        let token = Secret::new(String::from("gtoken-value"));
        assert_eq!(token.expose(), "gtoken-value");
        assert_eq!(token.len(), 12);
        assert!(!token.is_empty());
        assert!(Secret::new("").is_empty());
    }
}
