//! Client for the backend's monitoring control endpoints.

use std::time::Duration;

use url::Url;

use monitor_core::error::{MonitorError, Result};
use monitor_core::models::{StartRequest, StartResponse, StartStatus, StopResponse};
use monitor_core::protocol::{control_url, START_PATH, STOP_PATH};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Starts and stops the backend's simulated response generator.
#[derive(Debug, Clone)]
pub struct ControlClient {
    http: reqwest::Client,
    start_url: Url,
    stop_url: Url,
}

impl ControlClient {
    pub fn new(api_base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(control_error)?;
        Ok(Self {
            http,
            start_url: control_url(api_base, START_PATH)?,
            stop_url: control_url(api_base, STOP_PATH)?,
        })
    }

    /// `POST /monitor/start`.
    pub async fn start(&self, request: &StartRequest) -> Result<StartStatus> {
        let response = self
            .http
            .post(self.start_url.clone())
            .json(request)
            .send()
            .await
            .map_err(control_error)?
            .error_for_status()
            .map_err(control_error)?;
        let body: StartResponse = response.json().await.map_err(control_error)?;
        tracing::info!(
            status = ?body.status,
            response_interval = request.response_interval,
            jitter = request.jitter,
            "monitoring start requested"
        );
        Ok(body.status)
    }

    /// `POST /monitor/stop`. An empty body yields a default response.
    pub async fn stop(&self) -> Result<StopResponse> {
        let response = self
            .http
            .post(self.stop_url.clone())
            .send()
            .await
            .map_err(control_error)?
            .error_for_status()
            .map_err(control_error)?;
        let text = response.text().await.map_err(control_error)?;
        if text.trim().is_empty() {
            return Ok(StopResponse::default());
        }
        let body: StopResponse = serde_json::from_str(&text)?;
        tracing::info!(status = ?body.status, has_stats = body.stats.is_some(), "monitoring stopped");
        Ok(body)
    }
}

fn control_error(e: reqwest::Error) -> MonitorError {
    MonitorError::Control(e.to_string())
}
