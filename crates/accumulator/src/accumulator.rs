//! Snapshot cache and the poll cycle that fills it
//!
//! The cache write lock is taken once per thermostat (or summary row) and
//! released before the next one, so readers wait at most for a single merge,
//! never for a network round trip.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use ecobee_api::{EquipmentStatus, Selection, ThermostatSource};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::exposition;
use crate::snapshot::{ThermostatMetrics, ThermostatUpdate, derive_update};

/// Counts from one successful cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Thermostats merged from the detail fetch
    pub thermostats: usize,
    /// Summary rows merged
    pub equipment_rows: usize,
    /// Entities, rows and readings that were logged and dropped
    pub skipped: usize,
}

pub struct Accumulator {
    source: Arc<dyn ThermostatSource>,
    details: Selection,
    summary: Selection,
    cache: RwLock<HashMap<String, ThermostatMetrics>>,
}

impl Accumulator {
    pub fn new(source: Arc<dyn ThermostatSource>) -> Self {
        Self {
            source,
            details: Selection::thermostat_details(),
            summary: Selection::equipment_status_summary(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Known thermostat identifiers, sorted.
    pub async fn thermostat_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.cache.read().await.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Copy of one thermostat's snapshot.
    pub async fn snapshot(&self, identifier: &str) -> Option<ThermostatMetrics> {
        self.cache.read().await.get(identifier).cloned()
    }

    /// Exposition for one thermostat, or `None` if it has never been seen.
    pub async fn render(&self, identifier: &str) -> Option<Result<String>> {
        let cache = self.cache.read().await;
        cache.get(identifier).map(exposition::render)
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Run one cycle and record its outcome. Errors are logged, never returned;
    /// the next tick is the retry.
    pub async fn poll_cycle(&self) {
        let started = Instant::now();
        let outcome = self.poll_once().await;
        metrics::histogram!("promobee_poll_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        metrics::gauge!("promobee_thermostats_known").set(self.len().await as f64);

        match outcome {
            Ok(report) => {
                metrics::counter!("promobee_poll_cycles_total", "outcome" => "success")
                    .increment(1);
                info!(
                    thermostats = report.thermostats,
                    equipment_rows = report.equipment_rows,
                    skipped = report.skipped,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "poll cycle complete"
                );
            }
            Err(e) => {
                metrics::counter!("promobee_poll_cycles_total", "outcome" => "error")
                    .increment(1);
                warn!(error = %e, "poll cycle failed");
            }
        }
    }

    /// Fetch details and the equipment summary and merge both into the cache.
    ///
    /// A failed detail fetch leaves the cache untouched, and an empty one ends
    /// the cycle early. A failed summary fetch is reported after the details
    /// have been merged.
    pub async fn poll_once(&self) -> Result<PollReport> {
        let mut report = PollReport::default();

        let entries = self.source.thermostats(&self.details).await?;
        if entries.is_empty() {
            info!("payload contained no thermostats");
            return Ok(report);
        }

        for entry in entries {
            let thermostat = match entry {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, "skipping undecodable thermostat");
                    skipped("thermostat", &mut report);
                    continue;
                }
            };
            for rejected in thermostat.rejected_records() {
                warn!(
                    thermostat = %thermostat.identifier,
                    kind = rejected.kind,
                    index = rejected.index,
                    reason = %rejected.reason,
                    "skipping undecodable record"
                );
                skipped(rejected.kind, &mut report);
            }
            if thermostat.remote_sensors.is_empty() {
                warn!(thermostat = %thermostat.identifier, "thermostat has no sensors, skipping");
                skipped("no_sensors", &mut report);
                continue;
            }

            let update = derive_update(&thermostat);
            for reading in &update.skipped {
                warn!(thermostat = %thermostat.identifier, error = %reading, "skipping sensor reading");
                skipped(reading_kind(reading), &mut report);
            }
            self.merge(&thermostat.identifier, &update).await;
            report.thermostats += 1;
        }

        let summary = self.source.thermostat_summary(&self.summary).await?;
        for row in &summary.status_list {
            let Some(status) = EquipmentStatus::parse(row) else {
                warn!(row = %row, "thermostat status did not have two fields");
                skipped("status_row", &mut report);
                continue;
            };
            self.merge_equipment(&status).await;
            report.equipment_rows += 1;
        }

        Ok(report)
    }

    async fn merge(&self, identifier: &str, update: &ThermostatUpdate) {
        let mut cache = self.cache.write().await;
        entry(&mut cache, identifier).apply(update);
    }

    async fn merge_equipment(&self, status: &EquipmentStatus) {
        let mut cache = self.cache.write().await;
        entry(&mut cache, &status.identifier).apply_equipment(status);
    }
}

/// Get or create the snapshot for `identifier`. Existing snapshots are never replaced.
fn entry<'a>(
    cache: &'a mut HashMap<String, ThermostatMetrics>,
    identifier: &str,
) -> &'a mut ThermostatMetrics {
    if !cache.contains_key(identifier) {
        debug!(thermostat = identifier, "first sighting, creating snapshot");
    }
    cache.entry(identifier.to_string()).or_default()
}

fn reading_kind(error: &ecobee_api::ReadingError) -> &'static str {
    match error {
        ecobee_api::ReadingError::Missing { capability, .. }
        | ecobee_api::ReadingError::Unparseable { capability, .. } => *capability,
    }
}

fn skipped(kind: &'static str, report: &mut PollReport) {
    metrics::counter!("promobee_poll_skipped_records_total", "kind" => kind).increment(1);
    report.skipped += 1;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ecobee_api::{Error as ApiError, SourceFuture, Thermostat, ThermostatSummary};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    type Details = ecobee_api::Result<Vec<ecobee_api::Result<Thermostat>>>;

    /// Scripted source. Each call pops the next scripted response; an empty
    /// script answers with no thermostats and an empty summary.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        details: Mutex<VecDeque<Details>>,
        summaries: Mutex<VecDeque<ecobee_api::Result<ThermostatSummary>>>,
        pub(crate) detail_calls: AtomicUsize,
        /// When set, detail fetches announce themselves and wait for `release`.
        gated: bool,
        pub(crate) entered: Notify,
        pub(crate) release: Notify,
    }

    impl FakeSource {
        /// A source whose detail fetches block until `release` is notified.
        pub(crate) fn gated() -> Self {
            Self {
                gated: true,
                ..Self::default()
            }
        }

        pub(crate) fn push_details(&self, details: Details) {
            self.details.lock().unwrap().push_back(details);
        }

        pub(crate) fn push_summary(&self, summary: ecobee_api::Result<ThermostatSummary>) {
            self.summaries.lock().unwrap().push_back(summary);
        }
    }

    impl ThermostatSource for FakeSource {
        fn thermostats<'a>(
            &'a self,
            _selection: &'a Selection,
        ) -> SourceFuture<'a, Vec<ecobee_api::Result<Thermostat>>> {
            Box::pin(async move {
                self.detail_calls.fetch_add(1, Ordering::SeqCst);
                if self.gated {
                    self.entered.notify_one();
                    self.release.notified().await;
                }
                self.details
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Ok(Vec::new()))
            })
        }

        fn thermostat_summary<'a>(
            &'a self,
            _selection: &'a Selection,
        ) -> SourceFuture<'a, ThermostatSummary> {
            Box::pin(async move {
                self.summaries
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Ok(ThermostatSummary::default()))
            })
        }
    }

    pub(crate) fn thermostat(id: &str, mode: &str, sensors: serde_json::Value) -> Thermostat {
        serde_json::from_value(json!({
            "identifier": id,
            "settings": {"hvacMode": mode},
            "remoteSensors": sensors,
        }))
        .unwrap()
    }

    fn with_temperature(id: &str, location: &str, tenths: &str) -> Thermostat {
        thermostat(
            id,
            "heat",
            json!([{"name": location, "capability": [{"type": "temperature", "value": tenths}]}]),
        )
    }

    fn summary(rows: &[&str]) -> ThermostatSummary {
        ThermostatSummary {
            status_list: rows.iter().map(|r| r.to_string()).collect(),
            ..ThermostatSummary::default()
        }
    }

    fn accumulator() -> (Accumulator, Arc<FakeSource>) {
        let source = Arc::new(FakeSource::default());
        (Accumulator::new(source.clone()), source)
    }

    #[tokio::test]
    async fn one_bad_thermostat_does_not_stop_the_others() {
        let (acc, source) = accumulator();
        source.push_details(Ok(vec![
            Ok(with_temperature("311000000001", "Upstairs", "700")),
            Err(ApiError::Decode("thermostat 311000000002: bad sensors".into())),
            Ok(with_temperature("311000000003", "Basement", "620")),
        ]));

        let report = acc.poll_once().await.unwrap();

        assert_eq!(report.thermostats, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(acc.thermostat_ids().await, vec!["311000000001", "311000000003"]);
        let basement = acc.snapshot("311000000003").await.unwrap();
        assert_eq!(basement.temperature.get("Basement"), Some(62.0));
    }

    #[tokio::test]
    async fn hold_disappears_and_temperature_persists_across_cycles() {
        let (acc, source) = accumulator();
        let mut first = with_temperature("311000000001", "Bedroom", "705");
        first.events = serde_json::from_value(json!([
            {"type": "hold", "running": true, "coolHoldTemp": 780, "heatHoldTemp": 690}
        ]))
        .unwrap();
        source.push_details(Ok(vec![Ok(first)]));
        acc.poll_once().await.unwrap();

        let held = acc.snapshot("311000000001").await.unwrap();
        assert_eq!(held.hold_temperature.get("heat"), Some(69.0));

        let silent = thermostat(
            "311000000001",
            "heat",
            json!([{"name": "Bedroom", "capability": [{"type": "occupancy", "value": "false"}]}]),
        );
        source.push_details(Ok(vec![Ok(silent)]));
        acc.poll_once().await.unwrap();

        let after = acc.snapshot("311000000001").await.unwrap();
        assert!(after.hold_temperature.is_empty());
        assert_eq!(after.temperature.get("Bedroom"), Some(70.5));
        assert_eq!(after.occupancy.get("Bedroom"), Some(0.0));
    }

    #[tokio::test]
    async fn summary_rows_create_and_update_entries() {
        let (acc, source) = accumulator();
        source.push_details(Ok(vec![Ok(with_temperature("311000000001", "Hall", "690"))]));
        source.push_summary(Ok(summary(&[
            "311000000001:compCool1,fan",
            "311000000009:",
            "garbage",
        ])));

        let report = acc.poll_once().await.unwrap();

        assert_eq!(report.equipment_rows, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(acc.thermostat_ids().await, vec!["311000000001", "311000000009"]);
        let known = acc.snapshot("311000000001").await.unwrap();
        assert_eq!(known.hvac_in_operation.get("compCool1"), Some(1.0));
        assert_eq!(known.temperature.get("Hall"), Some(69.0));
        let summary_only = acc.snapshot("311000000009").await.unwrap();
        assert!(summary_only.hvac_in_operation.is_empty());
        assert!(summary_only.temperature.is_empty());
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_untouched() {
        let (acc, source) = accumulator();
        source.push_details(Ok(vec![Ok(with_temperature("311000000001", "Hall", "690"))]));
        acc.poll_once().await.unwrap();
        let before = acc.snapshot("311000000001").await.unwrap();

        source.push_details(Err(ApiError::Status {
            status: 500,
            message: "Processing error.".into(),
        }));
        let err = acc.poll_once().await.unwrap_err();

        assert!(matches!(err, crate::Error::Source(ApiError::Status { status: 500, .. })));
        assert_eq!(acc.snapshot("311000000001").await.unwrap(), before);
        assert_eq!(acc.len().await, 1);
    }

    #[tokio::test]
    async fn failed_summary_keeps_merged_details() {
        let (acc, source) = accumulator();
        source.push_details(Ok(vec![Ok(with_temperature("311000000001", "Hall", "690"))]));
        source.push_summary(Err(ApiError::Api {
            code: 3,
            message: "Processing error.".into(),
        }));

        assert!(acc.poll_once().await.is_err());
        let snapshot = acc.snapshot("311000000001").await.unwrap();
        assert_eq!(snapshot.temperature.get("Hall"), Some(69.0));
    }

    #[tokio::test]
    async fn zero_thermostats_is_a_quiet_cycle() {
        let (acc, _source) = accumulator();
        let report = acc.poll_once().await.unwrap();
        assert_eq!(report, PollReport::default());
        assert!(acc.is_empty().await);
    }

    #[tokio::test]
    async fn thermostat_without_sensors_is_skipped() {
        let (acc, source) = accumulator();
        source.push_details(Ok(vec![Ok(thermostat("311000000001", "heat", json!([])))]));

        let report = acc.poll_once().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert!(acc.is_empty().await);
    }

    #[tokio::test]
    async fn malformed_sensor_is_skipped_alongside_good_ones() {
        let (acc, source) = accumulator();
        source.push_details(Ok(vec![Ok(thermostat(
            "311000000001",
            "heat",
            json!([
                {"name": "Good", "capability": [{"type": "temperature", "value": "700"}]},
                {"name": "Null", "capability": [{"type": "temperature", "value": null}]},
                {"capability": [{"type": "temperature", "value": "650"}]}
            ]),
        ))]));

        let report = acc.poll_once().await.unwrap();

        assert_eq!(report.thermostats, 1);
        assert_eq!(report.skipped, 2, "one unnamed sensor, one null temperature");
        let snapshot = acc.snapshot("311000000001").await.unwrap();
        assert_eq!(snapshot.temperature.get("Good"), Some(70.0));
        assert_eq!(snapshot.temperature.get("Null"), None);
        assert_eq!(snapshot.hvac_mode.get("heat"), Some(1.0));
    }

    #[tokio::test]
    async fn ids_are_sorted_regardless_of_arrival_order() {
        let (acc, source) = accumulator();
        source.push_details(Ok(vec![
            Ok(with_temperature("id1", "A", "700")),
            Ok(with_temperature("id3", "C", "700")),
            Ok(with_temperature("id2", "B", "700")),
        ]));
        acc.poll_once().await.unwrap();
        assert_eq!(acc.thermostat_ids().await, vec!["id1", "id2", "id3"]);
    }

    #[tokio::test]
    async fn readers_are_not_blocked_by_an_in_flight_fetch() {
        let source = Arc::new(FakeSource::gated());
        let acc = Arc::new(Accumulator::new(source.clone()));

        let polling = tokio::spawn({
            let acc = acc.clone();
            async move { acc.poll_once().await }
        });
        source.entered.notified().await;

        assert!(acc.thermostat_ids().await.is_empty());
        assert!(acc.render("311000000001").await.is_none());

        source.release.notify_one();
        polling.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn render_scopes_to_one_thermostat() {
        let (acc, source) = accumulator();
        source.push_details(Ok(vec![
            Ok(with_temperature("311000000001", "Upstairs", "715")),
            Ok(with_temperature("311000000002", "Downstairs", "668")),
        ]));
        acc.poll_once().await.unwrap();

        let body = acc.render("311000000001").await.unwrap().unwrap();
        assert!(body.contains(r#"location="Upstairs""#));
        assert!(!body.contains("Downstairs"));
        assert!(acc.render("311000000404").await.is_none());
    }
}
