//! Types shared by the promobee crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
