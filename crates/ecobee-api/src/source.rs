//! Poll source abstraction
//!
//! The accumulator only needs two calls from the remote service. Keeping them
//! behind a trait lets the poll loop run against a scripted source in tests.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::selection::Selection;
use crate::types::{Thermostat, ThermostatSummary};

/// Boxed future returned by `ThermostatSource` methods.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Where thermostat data comes from.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn ThermostatSource>`).
pub trait ThermostatSource: Send + Sync {
    /// Thermostats matching `selection`.
    ///
    /// The outer `Result` fails the whole call (transport, authorization,
    /// unusable envelope). Each inner `Result` is one list entry, so a single
    /// malformed thermostat does not hide the others.
    fn thermostats<'a>(
        &'a self,
        selection: &'a Selection,
    ) -> SourceFuture<'a, Vec<Result<Thermostat>>>;

    /// Revision and running-equipment summary for `selection`.
    fn thermostat_summary<'a>(
        &'a self,
        selection: &'a Selection,
    ) -> SourceFuture<'a, ThermostatSummary>;
}
