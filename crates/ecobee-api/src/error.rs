//! Error types for ecobee API calls

/// Errors from a single API call. Any of these aborts the call as a whole.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] ecobee_auth::Error),

    #[error("ecobee API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("ecobee API status {code}: {message}")]
    Api { code: i64, message: String },

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("failed to build request: {0}")]
    Request(String),

    #[error("multi-page responses unimplemented (page {page} of {total_pages})")]
    PagingUnimplemented { page: u32, total_pages: u32 },
}

/// Result alias for API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A sensor capability that is missing or unreadable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReadingError {
    #[error("remote sensor {sensor} does not have a {capability} capability")]
    Missing {
        sensor: String,
        capability: &'static str,
    },

    #[error("remote sensor {sensor} reported unparseable {capability} value {value:?}")]
    Unparseable {
        sensor: String,
        capability: &'static str,
        value: String,
    },
}
