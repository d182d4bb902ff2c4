//! Redacting holder for the ecobee application key
//!
//! The key identifies the registered app on every token and PIN request, so it
//! ends up in form bodies and query strings but never in logs.

use std::fmt;
use std::path::Path;

use zeroize::Zeroize;

use crate::{Error, Result};

/// Sensitive value, redacted in Debug/Display/logs and zeroed on drop.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Read a key file, trimming the surrounding whitespace editors and
    /// `echo` leave behind. A blank file yields `None`.
    pub fn from_key_file(path: &Path) -> Result<Option<Self>> {
        let mut raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read api_key_file {}: {e}", path.display()))
        })?;
        let trimmed = raw.trim();
        let key = (!trimmed.is_empty()).then(|| Self::new(trimmed.to_owned()));
        raw.zeroize();
        Ok(key)
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}
