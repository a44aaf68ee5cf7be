use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{Config, PLACEHOLDER_API_KEY};
use crate::error::TryOnError;
use crate::types::{TryOnMetadata, TryOnRequest, TryOnResult};

const MOCK_CONFIDENCE: f32 = 0.85;

/// Whether the run should short-circuit to a canned result without touching
/// the network: the explicit dry-run flag is set, or no usable credential is
/// configured.
pub fn should_mock(config: &Config) -> bool {
    if config.mock_mode {
        return true;
    }
    let key = config.api_key.trim();
    key.is_empty() || key == PLACEHOLDER_API_KEY
}

/// Synthetic result served in mock mode after a simulated delay. Performs
/// zero network calls.
pub async fn mock_result(
    request: &TryOnRequest,
    config: &Config,
    prompt_used: &str,
    cancel: &CancellationToken,
) -> Result<TryOnResult, TryOnError> {
    info!(
        user_id = request.context.user_id.as_deref().unwrap_or("-"),
        "mock mode active; serving canned try-on result"
    );

    tokio::select! {
        _ = cancel.cancelled() => return Err(TryOnError::Cancelled),
        _ = tokio::time::sleep(Duration::from_millis(config.mock_delay_ms)) => {}
    }

    Ok(TryOnResult {
        generated_image_url: config.placeholder_image_url.clone(),
        processing_time_ms: config.mock_delay_ms,
        confidence_score: MOCK_CONFIDENCE,
        metadata: TryOnMetadata {
            prompt_used: prompt_used.to_string(),
            style_instructions: request.style_instructions.clone(),
            item_references: request
                .garment_images
                .iter()
                .map(|garment| garment.as_str().to_string())
                .collect(),
            generated_at: Utc::now(),
            mock: true,
        },
    })
}
