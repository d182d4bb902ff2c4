//! Thermostat selection
//!
//! Sent as the `json` query parameter, wrapped as `{"selection": {...}}`.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionType {
    /// Thermostats registered to the authorizing user
    #[default]
    Registered,
    /// Thermostats listed in `selection_match`
    Thermostats,
    /// A management set path given in `selection_match`
    ManagementSet,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub selection_type: SelectionType,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub selection_match: String,
    #[serde(skip_serializing_if = "is_false")]
    pub include_runtime: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub include_settings: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub include_events: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub include_device: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub include_sensors: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub include_alerts: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub include_equipment_status: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Selection {
    /// Registered thermostats with everything the snapshot merge reads.
    pub fn thermostat_details() -> Self {
        Self {
            selection_type: SelectionType::Registered,
            include_runtime: true,
            include_settings: true,
            include_events: true,
            include_device: true,
            include_sensors: true,
            ..Self::default()
        }
    }

    /// Registered thermostats' running equipment, for the summary endpoint.
    pub fn equipment_status_summary() -> Self {
        Self {
            selection_type: SelectionType::Registered,
            include_equipment_status: true,
            include_alerts: true,
            ..Self::default()
        }
    }
}

#[derive(Serialize)]
pub(crate) struct SelectionQuery<'a> {
    pub selection: &'a Selection,
}
