//! Error types for accumulator operations

/// Errors from accumulator operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A fetch failed as a whole; the cycle is abandoned.
    #[error(transparent)]
    Source(#[from] ecobee_api::Error),

    #[error("metric family {0} registered twice")]
    DuplicateFamily(&'static str),
}

/// Result alias for accumulator operations.
pub type Result<T> = std::result::Result<T, Error>;
