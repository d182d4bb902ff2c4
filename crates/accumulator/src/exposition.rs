//! Single-thermostat Prometheus exposition
//!
//! Each render builds a fresh recorder that only ever sees one snapshot, so no
//! label from another thermostat (or from the process-wide recorder) can leak
//! into the output.

use std::collections::HashSet;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{Error, Result};
use crate::snapshot::{GaugeFamily, ThermostatMetrics};

/// Render `metrics` in the Prometheus text format.
pub fn render(metrics: &ThermostatMetrics) -> Result<String> {
    render_families(&metrics.families())
}

pub(crate) fn render_families(families: &[&GaugeFamily]) -> Result<String> {
    let mut seen = HashSet::new();
    for family in families {
        if !seen.insert(family.name()) {
            return Err(Error::DuplicateFamily(family.name()));
        }
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    metrics::with_local_recorder(&recorder, || {
        for family in families {
            metrics::describe_gauge!(family.name(), family.help());
            for (label_value, value) in family.values() {
                metrics::gauge!(family.name(), family.label() => label_value.to_string()).set(value);
            }
        }
    });
    Ok(recorder.handle().render())
}
