use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::error::TryOnError;

/// Remote job snapshot as returned by the status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteJobSnapshot {
    pub status: String,
    #[serde(default)]
    pub result: Option<RemoteJobResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteJobResult {
    #[serde(default)]
    pub sample: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitAck {
    id: String,
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .or_else(|| value.get("detail").and_then(|v| v.as_str()))
            .or_else(|| value.get("message").and_then(|v| v.as_str()));
        if let Some(message) = message {
            return message.to_string();
        }
        return truncate_for_log(&value.to_string(), 2000);
    }

    truncate_for_log(trimmed, 2000)
}

/// Client for the two remote model endpoints. Holds the one shared HTTP
/// client and the read-only configuration; cheap to share across runs.
#[derive(Clone)]
pub struct GenerationClient {
    http: reqwest::Client,
    config: Arc<Config>,
}

impl GenerationClient {
    pub fn new(http: reqwest::Client, config: Arc<Config>) -> Self {
        GenerationClient { http, config }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn redact_api_key(&self, text: &str) -> String {
        let key = self.config.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), model)
    }

    fn map_status_error(&self, status: StatusCode, body: &str) -> TryOnError {
        let message = self.redact_api_key(&summarize_error_body(body));
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TryOnError::Authentication {
                status: status.as_u16(),
                message,
            },
            StatusCode::TOO_MANY_REQUESTS => TryOnError::RateLimit { message },
            s if s.is_server_error() => TryOnError::Server {
                status: status.as_u16(),
                message,
            },
            _ => TryOnError::Validation(format!(
                "generation request rejected with status {status}: {message}"
            )),
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> TryOnError {
        TryOnError::Network(self.redact_api_key(&format!(
            "{err} (timeout={}, connect={})",
            err.is_timeout(),
            err.is_connect()
        )))
    }

    /// Submits an image-conditioned edit job. Does not block for completion;
    /// the returned id is the poller's business.
    pub async fn submit_edit(
        &self,
        prompt: &str,
        image_data_uri: &str,
        cancel: &CancellationToken,
    ) -> Result<String, TryOnError> {
        let payload = json!({
            "prompt": prompt,
            "input_image": image_data_uri,
            "guidance": self.config.guidance,
            "safety_tolerance": self.config.safety_tolerance,
            "output_format": self.config.output_format,
        });
        self.submit(&self.config.edit_model, payload, cancel).await
    }

    /// Submits a text-only standalone generation job.
    pub async fn submit_generation(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, TryOnError> {
        let payload = json!({
            "prompt": prompt,
            "width": self.config.output_width,
            "height": self.config.output_height,
            "steps": self.config.steps,
            "guidance": self.config.guidance,
            "safety_tolerance": self.config.safety_tolerance,
            "output_format": self.config.output_format,
        });
        self.submit(&self.config.generation_model, payload, cancel)
            .await
    }

    async fn submit(
        &self,
        model: &str,
        payload: Value,
        cancel: &CancellationToken,
    ) -> Result<String, TryOnError> {
        let url = self.endpoint(model);
        debug!(target: "tryon.client", model = model, "submitting generation job");

        let send = self
            .http
            .post(&url)
            .header("x-key", &self.config.api_key)
            .json(&payload)
            .send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(TryOnError::Cancelled),
            result = send => result.map_err(|err| self.transport_error(err))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.map_status_error(status, &body));
        }

        let ack = response
            .json::<SubmitAck>()
            .await
            .map_err(|err| self.transport_error(err))?;
        debug!(target: "tryon.client", model = model, job_id = %ack.id, "job accepted");
        Ok(ack.id)
    }

    /// Fetches the current job snapshot. Each call carries its own short
    /// timeout so one stuck poll cannot eat the whole wait budget.
    pub async fn fetch_status(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RemoteJobSnapshot, TryOnError> {
        let url = self.endpoint("get_result");

        let send = self
            .http
            .get(&url)
            .query(&[("id", job_id)])
            .header("x-key", &self.config.api_key)
            .timeout(Duration::from_millis(self.config.poll_request_timeout_ms))
            .send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(TryOnError::Cancelled),
            result = send => result.map_err(|err| self.transport_error(err))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.map_status_error(status, &body));
        }

        response
            .json::<RemoteJobSnapshot>()
            .await
            .map_err(|err| self.transport_error(err))
    }
}
