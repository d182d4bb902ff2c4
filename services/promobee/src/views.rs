//! HTTP read views over the accumulator
//!
//! Handlers only take the cache's read lock, so they answer from whatever the
//! last completed merge left behind, even while a poll is in flight.

use std::collections::HashMap;
use std::sync::Arc;

use accumulator::Accumulator;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{debug, error};

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub accumulator: Arc<Accumulator>,
    pub prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/thermostats", get(list_thermostats))
        .route("/thermostat", get(thermostat))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Known thermostat identifiers, one per line, sorted.
async fn list_thermostats(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = String::new();
    for id in state.accumulator.thermostat_ids().await {
        body.push_str(&id);
        body.push('\n');
    }
    (StatusCode::OK, [(CONTENT_TYPE, "text/plain")], body)
}

/// Exposition for `?id=<identifier>`.
async fn thermostat(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(id) = params.get("id").filter(|id| !id.is_empty()) else {
        return not_found();
    };
    let rendered = state.accumulator.render(id).await;
    exposition_response(id, rendered)
}

fn exposition_response(id: &str, rendered: Option<accumulator::Result<String>>) -> Response {
    match rendered {
        Some(Ok(body)) => {
            (StatusCode::OK, [(CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body).into_response()
        }
        Some(Err(e)) => {
            error!(thermostat = id, error = %e, "failed to build thermostat exposition");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
        None => {
            debug!(thermostat = id, "unknown thermostat requested");
            not_found()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

/// Prometheus metrics endpoint for the process itself.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        state.prometheus.render(),
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use ecobee_api::{Selection, SourceFuture, Thermostat, ThermostatSource, ThermostatSummary};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    /// Answers every poll with the same payload.
    pub(crate) struct StaticSource {
        thermostats: Vec<serde_json::Value>,
        status_list: Vec<String>,
        fail: AtomicBool,
    }

    impl StaticSource {
        pub(crate) fn two_thermostats() -> Self {
            Self {
                thermostats: vec![
                    json!({
                        "identifier": "311000000002",
                        "settings": {"hvacMode": "cool"},
                        "remoteSensors": [{"name": "Downstairs", "capability": [
                            {"type": "temperature", "value": "740"},
                            {"type": "humidity", "value": "52"}
                        ]}]
                    }),
                    json!({
                        "identifier": "311000000001",
                        "settings": {"hvacMode": "heat"},
                        "events": [{"type": "hold", "running": true, "heatHoldTemp": 690, "coolHoldTemp": 780}],
                        "remoteSensors": [{"name": "Upstairs", "capability": [
                            {"type": "temperature", "value": "688"},
                            {"type": "occupancy", "value": "true"}
                        ]}]
                    }),
                ],
                status_list: vec!["311000000001:auxHeat1,fan".into(), "311000000002:".into()],
                fail: AtomicBool::new(false),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                thermostats: Vec::new(),
                status_list: Vec::new(),
                fail: AtomicBool::new(true),
            }
        }

        /// Make every later fetch fail.
        pub(crate) fn start_failing(&self) {
            self.fail.store(true, Ordering::SeqCst);
        }
    }

    impl ThermostatSource for StaticSource {
        fn thermostats<'a>(
            &'a self,
            _selection: &'a Selection,
        ) -> SourceFuture<'a, Vec<ecobee_api::Result<Thermostat>>> {
            Box::pin(async move {
                if self.fail.load(Ordering::SeqCst) {
                    return Err(ecobee_api::Error::Status {
                        status: 503,
                        message: "Service Unavailable".into(),
                    });
                }
                Ok(self
                    .thermostats
                    .iter()
                    .map(|t| Ok(serde_json::from_value(t.clone()).unwrap()))
                    .collect())
            })
        }

        fn thermostat_summary<'a>(
            &'a self,
            _selection: &'a Selection,
        ) -> SourceFuture<'a, ThermostatSummary> {
            Box::pin(async move {
                Ok(ThermostatSummary {
                    status_list: self.status_list.clone(),
                    ..ThermostatSummary::default()
                })
            })
        }
    }

    /// Create a PrometheusHandle for tests without installing a global recorder.
    fn test_prometheus_handle() -> PrometheusHandle {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle()
    }

    async fn polled_app() -> Router {
        let accumulator = Arc::new(Accumulator::new(Arc::new(StaticSource::two_thermostats())));
        accumulator.poll_once().await.unwrap();
        app(accumulator)
    }

    fn app(accumulator: Arc<Accumulator>) -> Router {
        build_router(
            AppState {
                accumulator,
                prometheus: test_prometheus_handle(),
            },
            16,
        )
    }

    async fn fetch(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn list_is_sorted_plain_text() {
        let (status, content_type, body) = fetch(polled_app().await, "/thermostats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/plain"));
        assert_eq!(body, "311000000001\n311000000002\n");
    }

    #[tokio::test]
    async fn empty_cache_lists_nothing() {
        let accumulator = Arc::new(Accumulator::new(Arc::new(StaticSource::failing())));
        let (status, _, body) = fetch(app(accumulator), "/thermostats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "");
    }

    #[tokio::test]
    async fn known_thermostat_renders_only_its_labels() {
        let (status, content_type, body) =
            fetch(polled_app().await, "/thermostat?id=311000000001").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(EXPOSITION_CONTENT_TYPE));
        assert!(body.contains(r#"temperature_fahrenheit{location="Upstairs"} 68.8"#), "{body}");
        assert!(body.contains(r#"occupancy{location="Upstairs"} 1"#), "{body}");
        assert!(body.contains(r#"hold_temperature_fahrenheit{type="heat"} 69"#), "{body}");
        assert!(body.contains(r#"hvac{mode="heat"} 1"#), "{body}");
        assert!(body.contains(r#"hvac_in_operation{equipment="auxHeat1"} 1"#), "{body}");
        assert!(!body.contains("Downstairs"), "{body}");
        assert!(!body.contains(r#"type="cool""#), "{body}");
    }

    #[tokio::test]
    async fn unknown_or_missing_id_is_not_found() {
        for uri in ["/thermostat?id=311000000404", "/thermostat", "/thermostat?id="] {
            let (status, _, body) = fetch(polled_app().await, uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body, "Not Found", "{uri}");
        }
    }

    #[test]
    fn render_failure_is_internal_server_error() {
        let response = exposition_response(
            "311000000001",
            Some(Err(accumulator::Error::DuplicateFamily("hvac"))),
        );
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn never_polled_thermostat_is_not_found_after_a_failed_poll() {
        let accumulator = Arc::new(Accumulator::new(Arc::new(StaticSource::failing())));
        accumulator.poll_cycle().await;
        let (status, _, _) = fetch(app(accumulator), "/thermostat?id=311000000001").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failed_poll_keeps_serving_the_last_good_data() {
        let source = Arc::new(StaticSource::two_thermostats());
        let accumulator = Arc::new(Accumulator::new(source.clone()));
        accumulator.poll_once().await.unwrap();
        let (_, _, before) = fetch(app(accumulator.clone()), "/thermostat?id=311000000001").await;

        source.start_failing();
        assert!(accumulator.poll_once().await.is_err());
        accumulator.poll_cycle().await;

        let (status, _, after) = fetch(app(accumulator.clone()), "/thermostat?id=311000000001").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after, before);
        assert!(after.contains(r#"temperature_fahrenheit{location="Upstairs"} 68.8"#), "{after}");

        let (_, _, list) = fetch(app(accumulator), "/thermostats").await;
        assert_eq!(list, "311000000001\n311000000002\n");
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_process_recorder() {
        let (status, content_type, _) = fetch(polled_app().await, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(EXPOSITION_CONTENT_TYPE));
    }
}
