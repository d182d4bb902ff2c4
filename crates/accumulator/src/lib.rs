//! Thermostat metric accumulator
//!
//! A background poll loop pulls thermostat details and the equipment summary
//! from a `ThermostatSource` and merges them into a per-thermostat snapshot
//! cache. Readers take short read locks and never wait for a whole cycle.
//!
//! Snapshot lifecycle:
//! 1. A thermostat id seen by either fetch gets an empty snapshot, once
//! 2. Every cycle overwrites readings in place; hold setpoints, HVAC mode and
//!    running equipment are cleared and rebuilt from what the cycle asserts
//! 3. Snapshots are never removed; a silent thermostat keeps its last values
//! 4. `/thermostat?id=` renders one snapshot through a throwaway recorder

pub mod accumulator;
pub mod error;
pub mod exposition;
pub mod poll;
pub mod snapshot;

pub use accumulator::{Accumulator, PollReport};
pub use error::{Error, Result};
pub use exposition::render;
pub use poll::{PollHandle, spawn_poll_task};
pub use snapshot::{GaugeFamily, ThermostatMetrics, ThermostatUpdate, derive_update};
