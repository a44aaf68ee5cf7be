use std::time::Instant;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::info;

/// Wraps a remote generation round-trip with request/response timing events
/// on the `tryon.timing` target, which the logging setup routes to its own
/// file.
pub async fn log_generation_timing<T, E, F, Fut>(
    endpoint: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: "tryon.timing",
        "event=generation_request endpoint={} model={} operation={} started_at={} metadata={}",
        endpoint,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let mut status = "success";
    let result = call().await;
    if result.is_err() {
        status = "error";
    }

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: "tryon.timing",
        "event=generation_response endpoint={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        endpoint,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}
