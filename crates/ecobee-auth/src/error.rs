//! Error types for credential lifecycle operations

use crate::token::AuthorizationErrorResponse;

/// Errors from token refresh, registration, and credential storage.
///
/// `Transport` carries the underlying `reqwest::Error` untouched so callers
/// can tell "network down" apart from `Authorization` ("credentials revoked").
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("{0}")]
    Authorization(AuthorizationErrorResponse),

    #[error("malformed token response: {0}")]
    Decode(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
