//! Nintendo Account / Coral constants
//!
//! Public client configuration matching the Nintendo Switch Online app. These
//! values identify the public client application and are not secrets. Base
//! URLs live in [`crate::config::Endpoints`] so they can be overridden.

/// Nintendo Account client ID of the NSO app
pub const NSO_CLIENT_ID: &str = "71b963c1b7b6d119";

/// Custom-scheme redirect URI the account site sends the user to after login
pub const REDIRECT_URI: &str = "npf71b963c1b7b6d119://auth";

/// Scopes requested during authorization.
pub const SCOPES: &str = "openid user user.birthday user.mii user.screenName";

/// Grant type for the session token → id token exchange
pub const SESSION_TOKEN_GRANT_TYPE: &str =
    "urn:ietf:params:oauth:grant-type:jwt-bearer-session-token";

/// Web service id of SplatNet 3 on the coral host
pub const SPLATNET3_GAME_ID: u64 = 4834290508791808;

/// App version used when neither the attestation service nor the app store
/// reports one.
pub const APP_VERSION_FALLBACK: &str = "2.10.1";

/// Web view version used when the portal's script cannot be parsed.
pub const WEB_VIEW_VERSION_FALLBACK: &str = "10.0.0-88706e32";

/// Android build string the companion app reports in its user agents
pub const ANDROID_USER_AGENT: &str =
    "Dalvik/2.1.0 (Linux; U; Android 14; Pixel 7a Build/UQ1A.240105.004)";

/// `X-Requested-With` value the companion app's web view sends
pub const WEB_VIEW_REQUESTED_WITH: &str = "com.nintendo.znca";

/// Required gtoken length for manual entry
pub const GTOKEN_LEN: usize = 926;

/// Required bulletToken length for manual entry
pub const BULLET_TOKEN_LEN: usize = 124;
