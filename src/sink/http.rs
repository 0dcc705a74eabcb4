//! HTTP sink for a JSON metrics ingestion endpoint.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{Metrics, MetricsSink, RunInfo, RunSpec, SinkError};

/// Connection timeout for HTTP requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall request timeout for HTTP requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of retries for transient failures.
const MAX_RETRIES: u32 = 3;

/// Determine if a request should be retried based on status code and attempt count.
fn should_retry(status_code: u16, attempt: u32) -> bool {
    if attempt >= MAX_RETRIES {
        return false;
    }
    (500..600).contains(&status_code)
}

/// Exponential backoff: 1s, 2s, 4s.
fn calculate_backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt)
}

#[derive(Debug, Deserialize)]
struct RunCreated {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

/// Sink that posts runs and metrics to a tracking service.
///
/// Endpoints, relative to the base URL:
/// - `POST runs` with the run spec, answering `{"id": ..., "url": ...}`
/// - `POST runs/{id}/metrics` with `{"metrics": {...}, "timestamp": ...}`
/// - `POST runs/{id}/finish`
#[derive(Debug)]
pub struct HttpSink {
    client: Client,
    base: Url,
    api_key: Option<String>,
    run: Mutex<Option<RunInfo>>,
}

impl HttpSink {
    /// Create a sink for `base_url`, authenticating with `api_key` if given.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, SinkError> {
        let mut base =
            Url::parse(base_url).map_err(|e| SinkError::InvalidEndpoint(format!("{base_url}: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SinkError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            base,
            api_key,
            run: Mutex::new(None),
        })
    }

    /// Create a sink reading the API key from the environment variable `api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unset or the URL is invalid.
    pub fn from_env(base_url: &str, api_key_env: &str) -> Result<Self, SinkError> {
        let key = std::env::var(api_key_env)
            .map_err(|_| SinkError::MissingApiKey(api_key_env.to_string()))?;
        Self::new(base_url, Some(key))
    }

    /// Base URL with a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, SinkError> {
        self.base
            .join(path)
            .map_err(|e| SinkError::InvalidEndpoint(format!("{path}: {e}")))
    }

    fn current(&self) -> Option<RunInfo> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<String, SinkError> {
        let url = self.endpoint(path)?;
        let mut attempt = 0;
        loop {
            let mut request = self.client.post(url.clone()).json(body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }
            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    SinkError::Timeout
                } else {
                    SinkError::RequestFailed(e.to_string())
                }
            })?;

            let status = response.status();
            if status.is_success() {
                return response
                    .text()
                    .await
                    .map_err(|e| SinkError::RequestFailed(e.to_string()));
            }

            if should_retry(status.as_u16(), attempt) {
                let backoff = calculate_backoff(attempt);
                tracing::warn!(
                    url = %url,
                    status = status.as_u16(),
                    attempt = attempt + 1,
                    backoff_secs = backoff.as_secs(),
                    "Tracking request failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status {
                status: status.as_u16(),
                body,
            });
        }
    }
}

#[async_trait]
impl MetricsSink for HttpSink {
    async fn ensure_active_context(&self, run: &RunSpec) -> Result<RunInfo, SinkError> {
        if let Some(info) = self.current() {
            return Ok(info);
        }
        let body = serde_json::to_value(run)?;
        let text = self.post("runs", &body).await?;
        let created: RunCreated = serde_json::from_str(&text)?;
        let info = RunInfo {
            run_id: created.id,
            project: run.project.clone(),
            name: run.name.clone(),
            url: created.url,
        };
        tracing::info!(run_id = %info.run_id, "Opened tracking run");
        *self.run.lock().unwrap_or_else(PoisonError::into_inner) = Some(info.clone());
        Ok(info)
    }

    fn has_active_context(&self) -> bool {
        self.current().is_some()
    }

    async fn emit(&self, metrics: Metrics) -> Result<(), SinkError> {
        let run = self.current().ok_or(SinkError::NoActiveRun)?;
        let body = json!({
            "metrics": metrics,
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.post(&format!("runs/{}/metrics", run.run_id), &body)
            .await
            .map(|_| ())
    }

    async fn close_context(&self) -> Result<(), SinkError> {
        let Some(run) = self.run.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return Ok(());
        };
        self.post(&format!("runs/{}/finish", run.run_id), &json!({}))
            .await
            .map(|_| ())?;
        tracing::info!(run_id = %run.run_id, "Closed tracking run");
        Ok(())
    }
}
