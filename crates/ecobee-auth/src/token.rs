//! Token endpoint wire types and the refresh grant
//!
//! The token endpoint answers a 2xx with a `TokenRefreshResponse` and anything
//! else with an `AuthorizationErrorResponse`. A body that decodes as neither
//! is reported as `Error::Decode`, never as an authorization failure.

use std::fmt;

use chrono::TimeDelta;
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::MAX_EXPIRES_IN_SECS;
use crate::error::{Error, Result};

/// Error codes the ecobee token endpoint can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationError {
    AccessDenied,
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnauthorizedClient,
    UnsupportedGrantType,
    InvalidScope,
    NotSupported,
    AccountLocked,
    AccountDisabled,
    AuthorizationPending,
    AuthorizationExpired,
    SlowDown,
    #[serde(other)]
    Unknown,
}

impl AuthorizationError {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorizationError::AccessDenied => "access_denied",
            AuthorizationError::InvalidRequest => "invalid_request",
            AuthorizationError::InvalidClient => "invalid_client",
            AuthorizationError::InvalidGrant => "invalid_grant",
            AuthorizationError::UnauthorizedClient => "unauthorized_client",
            AuthorizationError::UnsupportedGrantType => "unsupported_grant_type",
            AuthorizationError::InvalidScope => "invalid_scope",
            AuthorizationError::NotSupported => "not_supported",
            AuthorizationError::AccountLocked => "account_locked",
            AuthorizationError::AccountDisabled => "account_disabled",
            AuthorizationError::AuthorizationPending => "authorization_pending",
            AuthorizationError::AuthorizationExpired => "authorization_expired",
            AuthorizationError::SlowDown => "slow_down",
            AuthorizationError::Unknown => "unknown",
        }
    }
}

/// Rejection payload from the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthorizationErrorResponse {
    pub error: AuthorizationError,
    #[serde(rename = "error_description", default)]
    pub description: Option<String>,
    #[serde(rename = "error_uri", default)]
    pub uri: Option<String>,
}

impl fmt::Display for AuthorizationErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description.as_deref() {
            Some(description) if !description.is_empty() => write!(
                f,
                "unable to re-authenticate: {}: {description}",
                self.error.as_str()
            ),
            _ => write!(f, "unable to re-authenticate for unknown reasons"),
        }
    }
}

/// Successful response from the token endpoint, for both PIN exchange and refresh.
#[derive(Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime of the access token, relative to the response.
    #[serde(deserialize_with = "deserialize_expires_in")]
    pub expires_in: TimeDelta,
    pub refresh_token: String,
    #[serde(default)]
    pub scope: Option<String>,
}

impl fmt::Debug for TokenRefreshResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRefreshResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &"[REDACTED]")
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawExpiresIn {
    Seconds(f64),
    Text(String),
}

/// `expires_in` arrives as a number of seconds, or as a string holding either
/// bare seconds or an `h`/`m`/`s` duration such as `"1h30m"`.
fn deserialize_expires_in<'de, D>(deserializer: D) -> std::result::Result<TimeDelta, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match RawExpiresIn::deserialize(deserializer)? {
        RawExpiresIn::Seconds(secs) => seconds(secs),
        RawExpiresIn::Text(text) => parse_duration(&text),
    };
    parsed.ok_or_else(|| serde::de::Error::custom("invalid duration"))
}

fn seconds(secs: f64) -> Option<TimeDelta> {
    if !secs.is_finite() || !(0.0..=MAX_EXPIRES_IN_SECS as f64).contains(&secs) {
        return None;
    }
    TimeDelta::try_milliseconds((secs * 1000.0).round() as i64)
}

fn parse_duration(text: &str) -> Option<TimeDelta> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(secs) = text.parse::<f64>() {
        return seconds(secs);
    }

    let mut total = TimeDelta::zero();
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            digits.push(ch);
            continue;
        }
        let value: f64 = digits.parse().ok()?;
        digits.clear();
        let unit = match ch {
            'h' => 3600.0,
            'm' => 60.0,
            's' => 1.0,
            _ => return None,
        };
        total = total.checked_add(&seconds(value * unit)?)?;
    }
    if !digits.is_empty() || total > TimeDelta::seconds(MAX_EXPIRES_IN_SECS) {
        return None;
    }
    Some(total)
}

/// Exchange a refresh token for a new credential.
///
/// Never retried here: a rejected refresh token cannot heal itself, so the
/// failure is returned to whoever needed the credential.
pub async fn refresh_token(
    client: &reqwest::Client,
    token_url: &str,
    refresh: &str,
    client_id: &str,
) -> Result<TokenRefreshResponse> {
    let response = client
        .post(token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", client_id),
        ])
        .send()
        .await
        .map_err(Error::Transport)?;

    decode_token_response(response).await
}

/// Split a token endpoint response into success, rejection, or malformed payload.
pub(crate) async fn decode_token_response(
    response: reqwest::Response,
) -> Result<TokenRefreshResponse> {
    let status = response.status();
    let body = response.bytes().await.map_err(Error::Transport)?;

    if !status.is_success() {
        let rejection: AuthorizationErrorResponse =
            serde_json::from_slice(&body).map_err(|e| {
                Error::Decode(format!(
                    "token endpoint returned {status} with an unreadable body: {e}"
                ))
            })?;
        return Err(Error::Authorization(rejection));
    }

    serde_json::from_slice(&body)
        .map_err(|e| Error::Decode(format!("invalid token response: {e}")))
}
