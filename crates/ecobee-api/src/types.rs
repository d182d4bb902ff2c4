//! ecobee API objects
//!
//! See https://www.ecobee.com/home/developer/api/documentation/v1/objects/

use serde::Deserialize;

use crate::error::ReadingError;
use crate::records::{Record, Records, RejectedRecord, null_as_default};

pub const CAPABILITY_TEMPERATURE: &str = "temperature";
pub const CAPABILITY_HUMIDITY: &str = "humidity";
pub const CAPABILITY_OCCUPANCY: &str = "occupancy";

/// The central ecobee object, keyed by its stable `identifier`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thermostat {
    pub identifier: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub settings: Option<Settings>,
    #[serde(default)]
    pub events: Records<Event>,
    #[serde(default)]
    pub remote_sensors: Records<RemoteSensor>,
    #[serde(default)]
    pub equipment_status: Option<String>,
}

impl Thermostat {
    pub fn hvac_mode(&self) -> Option<&str> {
        self.settings.as_ref()?.hvac_mode.as_deref()
    }

    /// Events, sensors and sensor capabilities that failed to decode.
    pub fn rejected_records(&self) -> impl Iterator<Item = &RejectedRecord> {
        self.events
            .rejected()
            .iter()
            .chain(self.remote_sensors.rejected())
            .chain(self.remote_sensors.iter().flat_map(|s| s.capability.rejected()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// One of `auto`, `auxHeatOnly`, `cool`, `heat`, `off`
    #[serde(default)]
    pub hvac_mode: Option<String>,
}

/// A scheduled program change. Holds are events of type `hold`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub running: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_cool_off: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_heat_off: bool,
    /// Tenths of a degree Fahrenheit
    #[serde(default)]
    pub cool_hold_temp: Option<i64>,
    /// Tenths of a degree Fahrenheit
    #[serde(default)]
    pub heat_hold_temp: Option<i64>,
}

impl Record for Event {
    const KIND: &'static str = "event";
}

impl Event {
    pub fn is_running_hold(&self) -> bool {
        self.running && self.event_type == "hold"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSensor {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type", default)]
    pub sensor_type: Option<String>,
    #[serde(default)]
    pub in_use: Option<bool>,
    #[serde(default)]
    pub capability: Records<RemoteSensorCapability>,
}

impl Record for RemoteSensor {
    const KIND: &'static str = "sensor";
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteSensorCapability {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub capability_type: String,
    /// `None` when the API sends `null`, which reads as a missing capability.
    #[serde(default)]
    pub value: Option<String>,
}

impl Record for RemoteSensorCapability {
    const KIND: &'static str = "capability";
}

impl RemoteSensor {
    fn capability(&self, capability: &'static str) -> Result<&str, ReadingError> {
        self.capability
            .iter()
            .find(|c| c.capability_type == capability)
            .and_then(|c| c.value.as_deref())
            .ok_or_else(|| ReadingError::Missing {
                sensor: self.name.clone(),
                capability,
            })
    }

    fn unparseable(&self, capability: &'static str, value: &str) -> ReadingError {
        ReadingError::Unparseable {
            sensor: self.name.clone(),
            capability,
            value: value.to_string(),
        }
    }

    /// Temperature in degrees Fahrenheit. The API reports tenths of a degree.
    pub fn temperature(&self) -> Result<f64, ReadingError> {
        let raw = self.capability(CAPABILITY_TEMPERATURE)?;
        let tenths: f64 = raw
            .trim()
            .parse()
            .map_err(|_| self.unparseable(CAPABILITY_TEMPERATURE, raw))?;
        if !tenths.is_finite() {
            return Err(self.unparseable(CAPABILITY_TEMPERATURE, raw));
        }
        Ok(tenths / 10.0)
    }

    /// Relative humidity in percent.
    pub fn humidity(&self) -> Result<f64, ReadingError> {
        let raw = self.capability(CAPABILITY_HUMIDITY)?;
        let percent: f64 = raw
            .trim()
            .parse()
            .map_err(|_| self.unparseable(CAPABILITY_HUMIDITY, raw))?;
        if !percent.is_finite() {
            return Err(self.unparseable(CAPABILITY_HUMIDITY, raw));
        }
        Ok(percent)
    }

    pub fn occupancy(&self) -> Result<bool, ReadingError> {
        let raw = self.capability(CAPABILITY_OCCUPANCY)?;
        match raw.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(self.unparseable(CAPABILITY_OCCUPANCY, raw)),
        }
    }
}

/// Response envelope status. `code` 0 means success.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiStatus {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
}

/// Lightweight per-thermostat revision and status listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermostatSummary {
    #[serde(default)]
    pub revision_list: Vec<String>,
    #[serde(default)]
    pub thermostat_count: Option<u32>,
    /// `identifier:equipment,equipment,...` rows
    #[serde(default)]
    pub status_list: Vec<String>,
    #[serde(default)]
    pub status: Option<ApiStatus>,
}

/// One parsed `status_list` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentStatus {
    pub identifier: String,
    /// Running equipment, empty when everything is idle
    pub running: Vec<String>,
}

impl EquipmentStatus {
    /// Parse `identifier:equipment,...`. Returns `None` unless the row has
    /// exactly two colon-separated fields.
    pub fn parse(row: &str) -> Option<Self> {
        let mut fields = row.split(':');
        let identifier = fields.next()?;
        let equipment = fields.next()?;
        if fields.next().is_some() {
            return None;
        }
        let running = if equipment.is_empty() {
            Vec::new()
        } else {
            equipment.split(',').map(str::to_string).collect()
        };
        Some(Self {
            identifier: identifier.to_string(),
            running,
        })
    }
}
