//! Lists whose elements decode independently
//!
//! One malformed sensor, capability or event must not take the rest of its
//! thermostat down with it, so these lists decode element by element and
//! keep what failed as `RejectedRecord`s for the caller to report.

use std::ops::Deref;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

/// An element type that can be rejected on its own.
pub trait Record: DeserializeOwned {
    /// Label used when reporting a rejected element.
    const KIND: &'static str;
}

/// A list element that failed to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub kind: &'static str,
    /// Position in the list as sent by the API.
    pub index: usize,
    pub reason: String,
}

/// Decoded elements plus the ones that failed.
///
/// Derefs to the decoded elements. An absent or `null` list decodes as empty.
#[derive(Debug, Clone)]
pub struct Records<T> {
    valid: Vec<T>,
    rejected: Vec<RejectedRecord>,
}

impl<T> Records<T> {
    pub fn rejected(&self) -> &[RejectedRecord] {
        &self.rejected
    }
}

impl<T> Default for Records<T> {
    fn default() -> Self {
        Self {
            valid: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

impl<T> Deref for Records<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.valid
    }
}

impl<'a, T> IntoIterator for &'a Records<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.valid.iter()
    }
}

impl<T> FromIterator<T> for Records<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            valid: iter.into_iter().collect(),
            rejected: Vec::new(),
        }
    }
}

impl<'de, T: Record> Deserialize<'de> for Records<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
        let mut records = Self::default();
        for (index, value) in raw.into_iter().enumerate() {
            match serde_json::from_value(value) {
                Ok(record) => records.valid.push(record),
                Err(e) => records.rejected.push(RejectedRecord {
                    kind: T::KIND,
                    index,
                    reason: e.to_string(),
                }),
            }
        }
        Ok(records)
    }
}

/// Decode `null` as the type's default, for flags the API sometimes nulls out.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
