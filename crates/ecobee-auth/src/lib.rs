//! ecobee OAuth credential lifecycle
//!
//! Keeps a bearer credential valid for the lifetime of the process:
//!
//! 1. `registration::request_pin()` + `registration::exchange_pin()` mint the
//!    first credential (the `promobee register` flow)
//! 2. `PersistentTokenStore::create()` writes it to disk
//! 3. At startup `PersistentTokenStore::load()` reconstructs it
//! 4. `AuthorizingTransport::send()` refreshes it whenever it drops below the
//!    low-water mark, then decorates each outbound request with it

pub mod clock;
pub mod constants;
pub mod error;
pub mod registration;
pub mod store;
pub mod token;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use constants::*;
pub use error::{Error, Result};
pub use registration::{PinChallenge, exchange_pin, request_pin};
pub use store::{Credential, MemoryTokenStore, PersistentTokenStore, TokenStore};
pub use token::{AuthorizationError, AuthorizationErrorResponse, TokenRefreshResponse, refresh_token};
pub use transport::{AuthorizingTransport, HTTP_LOG_TARGET};
