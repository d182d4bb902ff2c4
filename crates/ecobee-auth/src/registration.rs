//! ecobee PIN registration
//!
//! Two round trips: `request_pin` obtains a PIN for the user to enter in the
//! ecobee portal plus an authorization code; once the user has confirmed,
//! `exchange_pin` trades the code for the first credential.

use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::constants::{AUTHORIZE_PATH, TOKEN_PATH};
use crate::error::{Error, Result};
use crate::token::{TokenRefreshResponse, decode_token_response};

/// Initial response of the PIN authorization flow.
#[derive(Debug, Clone, Deserialize)]
pub struct PinChallenge {
    #[serde(rename = "ecobeePin")]
    pub pin: String,
    pub code: String,
    #[serde(default)]
    pub scope: Option<String>,
    /// Minutes until the PIN expires
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Minimum seconds between exchange attempts
    #[serde(default)]
    pub interval: Option<u64>,
}

/// Start PIN registration for `client_id`.
pub async fn request_pin(
    client: &reqwest::Client,
    api_host: &str,
    client_id: &str,
    scope: &str,
) -> Result<PinChallenge> {
    let url = Url::parse_with_params(
        &format!("{}{AUTHORIZE_PATH}", api_host.trim_end_matches('/')),
        &[
            ("response_type", "ecobeePin"),
            ("scope", scope),
            ("client_id", client_id),
        ],
    )
    .map_err(|e| Error::InvalidUrl(e.to_string()))?;

    let response = client.get(url).send().await.map_err(Error::Transport)?;
    let status = response.status();
    let body = response.bytes().await.map_err(Error::Transport)?;
    debug!(status = status.as_u16(), "pin authorization response");

    if !status.is_success() {
        let rejection = serde_json::from_slice(&body).map_err(|e| {
            Error::Decode(format!(
                "authorize endpoint returned {status} with an unreadable body: {e}"
            ))
        })?;
        return Err(Error::Authorization(rejection));
    }

    serde_json::from_slice(&body)
        .map_err(|e| Error::Decode(format!("invalid pin challenge: {e}")))
}

/// Trade a confirmed PIN's authorization code for tokens.
pub async fn exchange_pin(
    client: &reqwest::Client,
    api_host: &str,
    client_id: &str,
    code: &str,
) -> Result<TokenRefreshResponse> {
    let response = client
        .post(format!("{}{TOKEN_PATH}", api_host.trim_end_matches('/')))
        .form(&[
            ("grant_type", "ecobeePin"),
            ("code", code),
            ("client_id", client_id),
        ])
        .send()
        .await
        .map_err(Error::Transport)?;

    decode_token_response(response).await
}
