//! ecobee OAuth endpoints and timing constants

/// Default API host; endpoint paths below are relative to it.
pub const ECOBEE_API_HOST: &str = "https://api.ecobee.com";

/// Token endpoint for PIN exchange and token refresh
pub const TOKEN_PATH: &str = "/token";

/// Authorization endpoint used to start PIN registration
pub const AUTHORIZE_PATH: &str = "/authorize";

/// Scope requested during registration
pub const DEFAULT_SCOPE: &str = "smartWrite";

/// Subtracted from the server's `expires_in` when a credential is stored, to
/// absorb network and processing delay.
pub const VALIDITY_SAFETY_MARGIN_SECS: i64 = 15;

/// Remaining validity below which the transport refreshes before sending.
pub const REFRESH_LOW_WATER_MARK_SECS: i64 = 15;

/// Longest `expires_in` accepted from the token endpoint (ten years). Anything
/// larger is a malformed response, not a long-lived token.
pub const MAX_EXPIRES_IN_SECS: i64 = 10 * 365 * 24 * 60 * 60;
