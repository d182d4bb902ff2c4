//! Per-thermostat metric snapshots
//!
//! Deriving an update from a `Thermostat` is pure and happens outside the cache
//! lock; applying it is a handful of map writes under the lock.

use std::collections::BTreeMap;

use ecobee_api::{EquipmentStatus, ReadingError, Thermostat};

pub const TEMPERATURE: &str = "temperature_fahrenheit";
pub const HUMIDITY: &str = "humidity";
pub const OCCUPANCY: &str = "occupancy";
pub const HOLD_TEMPERATURE: &str = "hold_temperature_fahrenheit";
pub const HVAC_MODE: &str = "hvac";
pub const HVAC_IN_OPERATION: &str = "hvac_in_operation";

/// One gauge family with a single label dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeFamily {
    name: &'static str,
    help: &'static str,
    label: &'static str,
    values: BTreeMap<String, f64>,
}

impl GaugeFamily {
    pub fn new(name: &'static str, help: &'static str, label: &'static str) -> Self {
        Self {
            name,
            help,
            label,
            values: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn help(&self) -> &'static str {
        self.help
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn set(&mut self, label_value: impl Into<String>, value: f64) {
        self.values.insert(label_value.into(), value);
    }

    pub fn get(&self, label_value: &str) -> Option<f64> {
        self.values.get(label_value).copied()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Label values and their gauge values, ordered by label value.
    pub fn values(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Latest known measurements for one thermostat.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatMetrics {
    pub temperature: GaugeFamily,
    pub humidity: GaugeFamily,
    pub occupancy: GaugeFamily,
    pub hold_temperature: GaugeFamily,
    pub hvac_mode: GaugeFamily,
    pub hvac_in_operation: GaugeFamily,
}

impl Default for ThermostatMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ThermostatMetrics {
    pub fn new() -> Self {
        Self {
            temperature: GaugeFamily::new(
                TEMPERATURE,
                "Temperature in Fahrenheit as reported by an ecobee sensor.",
                "location",
            ),
            humidity: GaugeFamily::new(
                HUMIDITY,
                "Humidity as reported by an ecobee sensor.",
                "location",
            ),
            occupancy: GaugeFamily::new(
                OCCUPANCY,
                "Occupancy as reported by an ecobee sensor.",
                "location",
            ),
            hold_temperature: GaugeFamily::new(
                HOLD_TEMPERATURE,
                "Hold temperatures in Fahrenheit as reported by an ecobee thermostat.",
                "type",
            ),
            hvac_mode: GaugeFamily::new(
                HVAC_MODE,
                "HVAC mode as reported by an ecobee thermostat.",
                "mode",
            ),
            hvac_in_operation: GaugeFamily::new(
                HVAC_IN_OPERATION,
                "Running HVAC equipment is emitted with a '1' metric.",
                "equipment",
            ),
        }
    }

    /// Families in exposition order.
    pub fn families(&self) -> [&GaugeFamily; 6] {
        [
            &self.temperature,
            &self.occupancy,
            &self.humidity,
            &self.hold_temperature,
            &self.hvac_in_operation,
            &self.hvac_mode,
        ]
    }

    /// Merge one detail fetch.
    ///
    /// Readings are written in place and survive a cycle that omits them.
    /// Holds and mode only exist while the current cycle asserts them.
    pub fn apply(&mut self, update: &ThermostatUpdate) {
        for (location, value) in &update.temperature {
            self.temperature.set(location.as_str(), *value);
        }
        for (location, value) in &update.humidity {
            self.humidity.set(location.as_str(), *value);
        }
        for (location, present) in &update.occupancy {
            self.occupancy
                .set(location.as_str(), if *present { 1.0 } else { 0.0 });
        }

        self.hold_temperature.clear();
        for (kind, value) in &update.hold_temperature {
            self.hold_temperature.set(*kind, *value);
        }

        self.hvac_mode.clear();
        if let Some(mode) = &update.hvac_mode {
            self.hvac_mode.set(mode.as_str(), 1.0);
        }
    }

    /// Replace running equipment with one summary row.
    pub fn apply_equipment(&mut self, status: &EquipmentStatus) {
        self.hvac_in_operation.clear();
        for equipment in &status.running {
            self.hvac_in_operation.set(equipment.as_str(), 1.0);
        }
    }
}

/// Everything one detail fetch asserts about a thermostat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThermostatUpdate {
    pub temperature: Vec<(String, f64)>,
    pub humidity: Vec<(String, f64)>,
    pub occupancy: Vec<(String, bool)>,
    /// `("cool" | "heat", degrees)`
    pub hold_temperature: Vec<(&'static str, f64)>,
    pub hvac_mode: Option<String>,
    /// Readings present but unusable, plus missing temperatures.
    pub skipped: Vec<ReadingError>,
}

/// Derive the update for `thermostat`.
///
/// A missing humidity or occupancy capability is normal for some sensor
/// models and is not reported. A missing temperature is.
pub fn derive_update(thermostat: &Thermostat) -> ThermostatUpdate {
    let mut update = ThermostatUpdate {
        hvac_mode: thermostat.hvac_mode().map(str::to_string),
        ..ThermostatUpdate::default()
    };

    let mode = thermostat.hvac_mode();
    if mode != Some("off") {
        for event in thermostat.events.iter().filter(|e| e.is_running_hold()) {
            if !event.is_cool_off && mode != Some("heat") {
                if let Some(tenths) = event.cool_hold_temp {
                    update.hold_temperature.push(("cool", tenths as f64 / 10.0));
                }
            }
            if !event.is_heat_off && mode != Some("cool") {
                if let Some(tenths) = event.heat_hold_temp {
                    update.hold_temperature.push(("heat", tenths as f64 / 10.0));
                }
            }
        }
    }

    for sensor in &thermostat.remote_sensors {
        match sensor.humidity() {
            Ok(value) => update.humidity.push((sensor.name.clone(), value)),
            Err(ReadingError::Missing { .. }) => {}
            Err(e) => update.skipped.push(e),
        }
        match sensor.occupancy() {
            Ok(value) => update.occupancy.push((sensor.name.clone(), value)),
            Err(ReadingError::Missing { .. }) => {}
            Err(e) => update.skipped.push(e),
        }
        match sensor.temperature() {
            Ok(value) => update.temperature.push((sensor.name.clone(), value)),
            Err(e) => update.skipped.push(e),
        }
    }

    update
}
