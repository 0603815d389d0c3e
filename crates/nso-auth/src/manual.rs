//! Format checks for tokens entered by hand
//!
//! When the operator skips the login flow they paste a gtoken and a
//! bulletToken captured elsewhere (e.g. with mitmproxy). Only the lengths are
//! checked; the prompt loop re-asks on failure.

use crate::constants::{BULLET_TOKEN_LEN, GTOKEN_LEN};
use crate::error::{Error, Result};

/// Accept a gtoken of exactly [`GTOKEN_LEN`] characters.
pub fn validate_gtoken(input: &str) -> Result<String> {
    let token = input.trim();
    let len = token.chars().count();
    if len != GTOKEN_LEN {
        return Err(Error::UserInput(format!(
            "invalid token - length should be {GTOKEN_LEN} characters, got {len}"
        )));
    }
    Ok(token.to_string())
}

/// Accept a bulletToken of exactly [`BULLET_TOKEN_LEN`] characters.
///
/// Browsers often drop the trailing `=` when copying, so a value one short
/// that does not already end in `=` gets it appended.
pub fn normalize_bullet_token(input: &str) -> Result<String> {
    let token = input.trim();
    let len = token.chars().count();
    if len == BULLET_TOKEN_LEN {
        return Ok(token.to_string());
    }
    if len == BULLET_TOKEN_LEN - 1 && !token.ends_with('=') {
        return Ok(format!("{token}="));
    }
    Err(Error::UserInput(format!(
        "invalid token - length should be {BULLET_TOKEN_LEN} characters, got {len}"
    )))
}
