//! InfluxDB v2 HTTP backend.
//!
//! Writes go to `POST /api/v2/write` as line protocol with nanosecond
//! precision; reachability is probed with `GET /health`; history is read with
//! a Flux query through `POST /api/v2/query`, answered as annotated CSV.

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::TimeSeriesBackend;
use crate::error::{Result, TelemetryError, TelemetryWriteError};
use crate::history::{AccessRecord, parse_access_csv};
use crate::point::TelemetryPoint;

fn default_url() -> String {
    "http://localhost:8086".to_string()
}

fn default_org() -> String {
    "metro_org".to_string()
}

fn default_bucket() -> String {
    "metro_system".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

/// Connection settings for the InfluxDB backend.
#[derive(Clone, Deserialize)]
pub struct InfluxConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_org")]
    pub org: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default)]
    pub token: String,
    /// Per-request timeout of the HTTP client, independent of the pipeline's
    /// write timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            org: default_org(),
            bucket: default_bucket(),
            token: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

/// InfluxDB v2 backend over HTTP.
#[derive(Debug)]
pub struct InfluxBackend {
    client: reqwest::Client,
    config: InfluxConfig,
}

impl InfluxBackend {
    /// Create the backend. No request is made until the first write or probe.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::Config` if the URL is empty or the HTTP
    /// client cannot be built.
    pub fn new(mut config: InfluxConfig) -> Result<Self> {
        config.url = config.url.trim_end_matches('/').to_string();
        if config.url.is_empty() {
            return Err(TelemetryError::Config("influx url is empty".to_string()));
        }
        if config.token.is_empty() {
            warn!(url = %config.url, "InfluxDB token not configured, writes will likely be rejected");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| TelemetryError::Config(format!("http client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &InfluxConfig {
        &self.config
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.config.token)
    }

    /// Flux query for `access_granted` rows since `since`, newest first.
    pub fn access_query(&self, since: DateTime<Utc>, limit: Option<usize>) -> String {
        let mut query = format!(
            "from(bucket: \"{}\")\n  |> range(start: {})\n  |> filter(fn: (r) => r._measurement == \"metro_access\" and r._field == \"access_granted\")\n  |> group()\n  |> sort(columns: [\"_time\"], desc: true)",
            self.config.bucket,
            since.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        if let Some(limit) = limit {
            query.push_str(&format!("\n  |> limit(n: {limit})"));
        }
        query
    }
}

fn transport_error(error: reqwest::Error, timeout_ms: u64) -> TelemetryWriteError {
    if error.is_timeout() {
        TelemetryWriteError::Timeout {
            duration_ms: timeout_ms,
        }
    } else {
        TelemetryWriteError::unreachable(error.to_string())
    }
}

impl TimeSeriesBackend for InfluxBackend {
    async fn write(&self, points: &[TelemetryPoint]) -> std::result::Result<(), TelemetryWriteError> {
        if points.is_empty() {
            return Ok(());
        }

        let body = points
            .iter()
            .map(TelemetryPoint::to_line_protocol)
            .collect::<Vec<_>>()
            .join("\n");

        let response = self
            .client
            .post(format!("{}/api/v2/write", self.config.url))
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header("Authorization", self.auth_header())
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.config.request_timeout_ms))?;

        let status = response.status();
        if status.is_success() {
            debug!(points = points.len(), "Batch written to InfluxDB");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(TelemetryWriteError::rejected(status.as_u16(), body))
    }

    async fn ping(&self) -> std::result::Result<(), TelemetryWriteError> {
        let response = self
            .client
            .get(format!("{}/health", self.config.url))
            .send()
            .await
            .map_err(|e| transport_error(e, self.config.request_timeout_ms))?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(TelemetryWriteError::rejected(
                status.as_u16(),
                response.text().await.unwrap_or_default(),
            )),
        }
    }

    async fn query_access(
        &self,
        since: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<AccessRecord>> {
        let response = self
            .client
            .post(format!("{}/api/v2/query", self.config.url))
            .query(&[("org", self.config.org.as_str())])
            .header("Authorization", self.auth_header())
            .header("Content-Type", "application/vnd.flux")
            .header("Accept", "application/csv")
            .body(self.access_query(since, limit))
            .send()
            .await
            .map_err(|e| transport_error(e, self.config.request_timeout_ms))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TelemetryError::MalformedResponse(e.to_string()))?;

        if !status.is_success() {
            return Err(TelemetryError::QueryFailed {
                status: status.as_u16(),
                body,
            });
        }

        parse_access_csv(&body)
    }
}
