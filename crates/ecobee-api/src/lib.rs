//! ecobee REST API client
//!
//! Only the slice of the ecobee object model promobee reads is modelled here.
//! Fields the API may omit are `Option`s or default to empty collections, so
//! "absent" is never confused with "present and zero". Nested lists decode per
//! element, so one malformed sensor or event is set aside on its own.
//!
//! `ThermostatSource` is the seam the accumulator polls through;
//! `EcobeeClient` implements it on top of `ecobee_auth::AuthorizingTransport`.

pub mod client;
pub mod error;
pub mod records;
pub mod selection;
pub mod source;
pub mod types;

pub use client::EcobeeClient;
pub use error::{Error, ReadingError, Result};
pub use records::{Records, RejectedRecord};
pub use selection::{Selection, SelectionType};
pub use source::{SourceFuture, ThermostatSource};
pub use types::{
    ApiStatus, EquipmentStatus, Event, RemoteSensor, RemoteSensorCapability, Settings, Thermostat,
    ThermostatSummary,
};
