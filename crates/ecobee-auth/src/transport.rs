//! Bearer-authorizing request transport
//!
//! Every outbound ecobee API request goes through `AuthorizingTransport::send`.
//! If the stored credential is empty or has less than the low-water mark left,
//! it is refreshed first; the request is then decorated with
//! `Authorization: Bearer <access token>` and handed to reqwest unchanged.

use std::sync::Arc;
use std::time::Instant;

use chrono::TimeDelta;
use common::Secret;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::{REFRESH_LOW_WATER_MARK_SECS, TOKEN_PATH};
use crate::error::{Error, Result};
use crate::store::TokenStore;
use crate::token;

/// Tracing target of the request/response exchange log.
pub const HTTP_LOG_TARGET: &str = "promobee::http";

pub struct AuthorizingTransport {
    store: Arc<dyn TokenStore>,
    http: reqwest::Client,
    app_id: Secret<String>,
    token_url: String,
    log_http: bool,
    /// Held across the refresh round trip so concurrent callers that all see
    /// a stale credential trigger one refresh between them.
    refresh_gate: Mutex<()>,
}

impl AuthorizingTransport {
    pub fn new(
        store: Arc<dyn TokenStore>,
        http: reqwest::Client,
        app_id: Secret<String>,
        api_host: &str,
    ) -> Self {
        Self {
            store,
            http,
            app_id,
            token_url: format!("{}{TOKEN_PATH}", api_host.trim_end_matches('/')),
            log_http: false,
            refresh_gate: Mutex::new(()),
        }
    }

    /// Log every request/response pair at debug level under `HTTP_LOG_TARGET`.
    pub fn with_http_logging(mut self, enabled: bool) -> Self {
        self.log_http = enabled;
        self
    }

    /// The undecorated client, for building requests.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn needs_refresh(&self) -> bool {
        self.store.valid_for() < TimeDelta::seconds(REFRESH_LOW_WATER_MARK_SECS)
            || self.store.access_token().is_empty()
    }

    /// Authorize and dispatch `request`.
    ///
    /// A failed refresh is returned as-is and the request is never sent.
    /// Transport failures of the request itself come back as
    /// `Error::Transport` holding reqwest's error untouched.
    pub async fn send(&self, mut request: reqwest::Request) -> Result<reqwest::Response> {
        self.ensure_fresh().await?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.store.access_token()))
            .map_err(|e| Error::InvalidHeader(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        if !self.log_http {
            return self.http.execute(request).await.map_err(Error::Transport);
        }

        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        debug!(
            target: HTTP_LOG_TARGET,
            request_id = %request_id,
            method = %request.method(),
            url = %request.url(),
            "outgoing request"
        );
        let started = Instant::now();
        let result = self.http.execute(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(response) => debug!(
                target: HTTP_LOG_TARGET,
                request_id = %request_id,
                status = response.status().as_u16(),
                elapsed_ms,
                "incoming response"
            ),
            Err(e) => debug!(
                target: HTTP_LOG_TARGET,
                request_id = %request_id,
                error = %e,
                elapsed_ms,
                "request failed"
            ),
        }
        result.map_err(Error::Transport)
    }

    async fn ensure_fresh(&self) -> Result<()> {
        if !self.needs_refresh() {
            return Ok(());
        }
        let _gate = self.refresh_gate.lock().await;
        // Someone else may have refreshed while we waited for the gate.
        if !self.needs_refresh() {
            return Ok(());
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<()> {
        let refresh = self.store.refresh_token();
        debug!(
            valid_for_secs = self.store.valid_for().num_seconds(),
            "credential below low-water mark, refreshing"
        );

        let outcome = match token::refresh_token(
            &self.http,
            &self.token_url,
            &refresh,
            self.app_id.expose(),
        )
        .await
        {
            Ok(response) => self.store.update(&response).await,
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(()) => {
                metrics::counter!("promobee_token_refreshes_total", "outcome" => "success")
                    .increment(1);
                info!(
                    valid_for_secs = self.store.valid_for().num_seconds(),
                    "access token refreshed"
                );
            }
            Err(e) => {
                metrics::counter!("promobee_token_refreshes_total", "outcome" => "error")
                    .increment(1);
                warn!(error = %e, "token refresh failed");
            }
        }
        outcome
    }
}
