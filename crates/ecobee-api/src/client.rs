//! ecobee API client over the authorizing transport

use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use ecobee_auth::AuthorizingTransport;

use crate::error::{Error, Result};
use crate::selection::{Selection, SelectionQuery};
use crate::source::{SourceFuture, ThermostatSource};
use crate::types::{ApiStatus, Thermostat, ThermostatSummary};

pub const THERMOSTAT_PATH: &str = "/1/thermostat";
pub const THERMOSTAT_SUMMARY_PATH: &str = "/1/thermostatSummary";

const REQUEST_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    total_pages: u32,
}

/// `thermostatList` entries stay as raw JSON until they are decoded one by one.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PagedThermostatResponse {
    #[serde(default)]
    page: Page,
    #[serde(default)]
    thermostat_list: Vec<serde_json::Value>,
    #[serde(default)]
    status: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct StatusOnly {
    status: ApiStatus,
}

pub struct EcobeeClient {
    transport: AuthorizingTransport,
    api_host: String,
}

impl EcobeeClient {
    pub fn new(transport: AuthorizingTransport, api_host: &str) -> Self {
        Self {
            transport,
            api_host: api_host.trim_end_matches('/').to_string(),
        }
    }

    /// All thermostats matching `selection`, each decoded independently.
    ///
    /// Multi-page responses are rejected with `Error::PagingUnimplemented`.
    pub async fn thermostats(&self, selection: &Selection) -> Result<Vec<Result<Thermostat>>> {
        let response: PagedThermostatResponse =
            self.get_selection(THERMOSTAT_PATH, selection).await?;
        check_status(response.status.as_ref())?;

        if response.page.page != response.page.total_pages {
            return Err(Error::PagingUnimplemented {
                page: response.page.page,
                total_pages: response.page.total_pages,
            });
        }

        Ok(response
            .thermostat_list
            .into_iter()
            .enumerate()
            .map(|(index, raw)| decode_thermostat(index, raw))
            .collect())
    }

    pub async fn thermostat_summary(&self, selection: &Selection) -> Result<ThermostatSummary> {
        let summary: ThermostatSummary = self
            .get_selection(THERMOSTAT_SUMMARY_PATH, selection)
            .await?;
        check_status(summary.status.as_ref())?;
        Ok(summary)
    }

    async fn get_selection<T: DeserializeOwned>(
        &self,
        path: &str,
        selection: &Selection,
    ) -> Result<T> {
        let query = serde_json::to_string(&SelectionQuery { selection })
            .map_err(|e| Error::Request(e.to_string()))?;
        let url = Url::parse_with_params(&format!("{}{path}", self.api_host), &[("json", query)])
            .map_err(|e| Error::Request(e.to_string()))?;

        let request = self
            .transport
            .http_client()
            .get(url)
            .header(CONTENT_TYPE, REQUEST_CONTENT_TYPE)
            .build()
            .map_err(|e| Error::Request(e.to_string()))?;

        let response = self.transport.send(request).await?;
        let status = response.status();
        let body = response.bytes().await.map_err(Error::Body)?;
        debug!(path, status = status.as_u16(), bytes = body.len(), "api response");

        if !status.is_success() {
            let message = serde_json::from_slice::<StatusOnly>(&body)
                .ok()
                .and_then(|s| s.status.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
            return Err(Error::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&body).map_err(|e| Error::Decode(format!("{path}: {e}")))
    }
}

fn check_status(status: Option<&ApiStatus>) -> Result<()> {
    match status {
        Some(status) if status.code != 0 => Err(Error::Api {
            code: status.code,
            message: status.message.clone().unwrap_or_default(),
        }),
        _ => Ok(()),
    }
}

fn decode_thermostat(index: usize, raw: serde_json::Value) -> Result<Thermostat> {
    let identifier = raw
        .get("identifier")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);
    serde_json::from_value(raw).map_err(|e| match identifier {
        Some(id) => Error::Decode(format!("thermostat {id}: {e}")),
        None => Error::Decode(format!("thermostat at index {index}: {e}")),
    })
}

impl ThermostatSource for EcobeeClient {
    fn thermostats<'a>(
        &'a self,
        selection: &'a Selection,
    ) -> SourceFuture<'a, Vec<Result<Thermostat>>> {
        Box::pin(EcobeeClient::thermostats(self, selection))
    }

    fn thermostat_summary<'a>(
        &'a self,
        selection: &'a Selection,
    ) -> SourceFuture<'a, ThermostatSummary> {
        Box::pin(EcobeeClient::thermostat_summary(self, selection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use chrono::{TimeDelta, Utc};
    use common::Secret;
    use ecobee_auth::{Credential, MemoryTokenStore, SystemClock};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    const TWO_THERMOSTATS: &str = r#"{
        "page": {"page": 1, "totalPages": 1, "pageSize": 2, "total": 2},
        "thermostatList": [
            {
                "identifier": "311000000001",
                "name": "Upstairs",
                "settings": {"hvacMode": "heat"},
                "events": [],
                "remoteSensors": [
                    {"id": "ei:0", "name": "Upstairs", "type": "thermostat", "inUse": true,
                     "capability": [{"id": "1", "type": "temperature", "value": "694"}]}
                ]
            },
            {
                "identifier": "311000000002",
                "remoteSensors": "not-a-list"
            }
        ],
        "status": {"code": 0, "message": ""}
    }"#;

    #[derive(Clone, Default)]
    struct Api {
        body: Arc<Mutex<(StatusCode, &'static str)>>,
        seen: Arc<Mutex<Vec<(String, String, String)>>>,
    }

    async fn handler(
        State(api): State<Api>,
        headers: HeaderMap,
        Query(q): Query<HashMap<String, String>>,
    ) -> (StatusCode, &'static str) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string()
        };
        api.seen.lock().unwrap().push((
            header("authorization"),
            header("content-type"),
            q.get("json").cloned().unwrap_or_default(),
        ));
        *api.body.lock().unwrap()
    }

    async fn start_api(status: StatusCode, body: &'static str) -> (EcobeeClient, Api) {
        let api = Api::default();
        *api.body.lock().unwrap() = (status, body);
        let app = Router::new()
            .route(THERMOSTAT_PATH, get(handler))
            .route(THERMOSTAT_SUMMARY_PATH, get(handler))
            .with_state(api.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let host = format!("http://{addr}");
        let store = Arc::new(MemoryTokenStore::from_credential(
            Credential {
                access_token: "at_live".into(),
                refresh_token: "rt_live".into(),
                valid_until: Utc::now() + TimeDelta::seconds(3600),
            },
            Arc::new(SystemClock),
        ));
        let transport = AuthorizingTransport::new(
            store,
            reqwest::Client::new(),
            Secret::new("app-key".to_string()),
            &host,
        );
        (EcobeeClient::new(transport, &host), api)
    }

    #[tokio::test]
    async fn thermostats_are_decoded_independently() {
        let (client, api) = start_api(StatusCode::OK, TWO_THERMOSTATS).await;

        let entries = client
            .thermostats(&Selection::thermostat_details())
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        let first = entries[0].as_ref().unwrap();
        assert_eq!(first.identifier, "311000000001");
        assert_eq!(first.hvac_mode(), Some("heat"));
        assert_eq!(first.remote_sensors[0].temperature(), Ok(69.4));
        assert!(
            matches!(&entries[1], Err(Error::Decode(m)) if m.contains("311000000002")),
            "got: {:?}",
            entries[1]
        );

        let seen = api.seen.lock().unwrap();
        let (auth, content_type, json) = &seen[0];
        assert_eq!(auth, "Bearer at_live");
        assert_eq!(content_type, REQUEST_CONTENT_TYPE);
        let query: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(query["selection"]["selectionType"], "registered");
        assert_eq!(query["selection"]["includeSensors"], true);
    }

    #[tokio::test]
    async fn multi_page_response_is_rejected() {
        let (client, _) = start_api(
            StatusCode::OK,
            r#"{"page":{"page":1,"totalPages":3},"thermostatList":[],"status":{"code":0}}"#,
        )
        .await;

        let err = client
            .thermostats(&Selection::thermostat_details())
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::PagingUnimplemented { page: 1, total_pages: 3 }),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn empty_list_is_not_an_error() {
        let (client, _) = start_api(
            StatusCode::OK,
            r#"{"page":{"page":0,"totalPages":0},"thermostatList":[],"status":{"code":0}}"#,
        )
        .await;

        let entries = client
            .thermostats(&Selection::thermostat_details())
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn non_success_status_carries_api_message() {
        let (client, _) = start_api(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"status":{"code":3,"message":"Processing error."}}"#,
        )
        .await;

        let err = client
            .thermostats(&Selection::thermostat_details())
            .await
            .unwrap_err();
        match err {
            Error::Status { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Processing error.");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_zero_api_code_is_an_error() {
        let (client, _) = start_api(
            StatusCode::OK,
            r#"{"statusList":[],"status":{"code":14,"message":"Authentication token has expired."}}"#,
        )
        .await;

        let err = client
            .thermostat_summary(&Selection::equipment_status_summary())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { code: 14, .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn summary_decodes_status_list() {
        let (client, api) = start_api(
            StatusCode::OK,
            r#"{"thermostatCount":2,"revisionList":["311000000001:Upstairs:true:a:b:c:d"],
                "statusList":["311000000001:heatPump,fan","311000000002:"],
                "status":{"code":0,"message":""}}"#,
        )
        .await;

        let summary = client
            .thermostat_summary(&Selection::equipment_status_summary())
            .await
            .unwrap();
        assert_eq!(summary.thermostat_count, Some(2));
        assert_eq!(
            summary.status_list,
            vec!["311000000001:heatPump,fan", "311000000002:"]
        );

        let seen = api.seen.lock().unwrap();
        let query: serde_json::Value = serde_json::from_str(&seen[0].2).unwrap();
        assert_eq!(query["selection"]["includeEquipmentStatus"], true);
    }

    #[tokio::test]
    async fn garbage_body_is_a_decode_error() {
        let (client, _) = start_api(StatusCode::OK, "<html>maintenance</html>").await;

        let err = client
            .thermostat_summary(&Selection::equipment_status_summary())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "got: {err:?}");
    }

    #[test]
    fn null_sensor_value_keeps_its_neighbours() {
        let thermostat = decode_thermostat(
            0,
            serde_json::json!({
                "identifier": "311000000001",
                "events": [{"type": "hold", "running": null}],
                "remoteSensors": [
                    {"name": "Good", "capability": [{"type": "temperature", "value": "700"}]},
                    {"name": "Bad", "capability": [{"type": "temperature", "value": null}]}
                ]
            }),
        )
        .unwrap();

        assert_eq!(thermostat.remote_sensors.len(), 2);
        assert_eq!(thermostat.remote_sensors[0].temperature(), Ok(70.0));
        assert!(thermostat.remote_sensors[1].temperature().is_err());
        assert_eq!(thermostat.events.len(), 1);
    }
}
