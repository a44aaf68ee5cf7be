use std::env;

use anyhow::Result;
use tracing::warn;
use url::Url;

/// Credential value shipped in example env files; treated the same as an
/// absent credential so unconfigured environments degrade to mock mode.
pub const PLACEHOLDER_API_KEY: &str = "your_api_key_here";

/// Pipeline configuration, read once at startup and immutable afterwards.
/// Constructed explicitly and passed into the pipeline rather than living in
/// a global.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_key: String,
    pub api_base_url: String,
    pub edit_model: String,
    pub generation_model: String,
    pub guidance: f32,
    pub safety_tolerance: u32,
    pub output_format: String,
    pub output_width: u32,
    pub output_height: u32,
    pub steps: u32,
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_request_timeout_ms: u64,
    pub max_wait_time_ms: u64,
    pub http_timeout_secs: u64,
    /// Explicit dry-run switch. Mock mode also activates when the credential
    /// is absent or still the placeholder value.
    pub mock_mode: bool,
    pub mock_delay_ms: u64,
    pub placeholder_image_url: String,
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "info".to_string(),
            api_key: String::new(),
            api_base_url: "https://api.bfl.ml/v1".to_string(),
            edit_model: "flux-kontext-pro".to_string(),
            generation_model: "flux-pro-1.1".to_string(),
            guidance: 3.5,
            safety_tolerance: 2,
            output_format: "jpeg".to_string(),
            output_width: 768,
            output_height: 1344,
            steps: 28,
            max_retries: 3,
            retry_base_delay_ms: 2000,
            poll_interval_ms: 3000,
            poll_request_timeout_ms: 15_000,
            max_wait_time_ms: 120_000,
            http_timeout_secs: 30,
            mock_mode: false,
            mock_delay_ms: 1500,
            placeholder_image_url:
                "https://images.unsplash.com/photo-1515886657613-9f3515b0c78f?w=768&q=80"
                    .to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Config::default();

        let api_base_url = env_string("TRYON_API_BASE_URL", &defaults.api_base_url);
        Url::parse(&api_base_url)
            .map_err(|err| anyhow::anyhow!("TRYON_API_BASE_URL is not a valid URL: {err}"))?;

        let max_retries = env_usize("TRYON_MAX_RETRIES", defaults.max_retries);
        if max_retries == 0 {
            warn!("TRYON_MAX_RETRIES=0 is not meaningful; a single attempt is always made.");
        }

        let poll_interval_ms = env_u64("TRYON_POLL_INTERVAL_MS", defaults.poll_interval_ms);
        let max_wait_time_ms = env_u64("TRYON_MAX_WAIT_TIME_MS", defaults.max_wait_time_ms);
        if poll_interval_ms >= max_wait_time_ms {
            warn!(
                "TRYON_POLL_INTERVAL_MS ({poll_interval_ms}) is not below \
                 TRYON_MAX_WAIT_TIME_MS ({max_wait_time_ms}); jobs will time out \
                 before the first poll."
            );
        }

        Ok(Config {
            log_level: env_string("TRYON_LOG_LEVEL", &defaults.log_level).to_lowercase(),
            api_key: env_string("TRYON_API_KEY", ""),
            api_base_url,
            edit_model: env_string("TRYON_EDIT_MODEL", &defaults.edit_model),
            generation_model: env_string("TRYON_GENERATION_MODEL", &defaults.generation_model),
            guidance: env_f32("TRYON_GUIDANCE", defaults.guidance),
            safety_tolerance: env_u32("TRYON_SAFETY_TOLERANCE", defaults.safety_tolerance),
            output_format: env_string("TRYON_OUTPUT_FORMAT", &defaults.output_format),
            output_width: env_u32("TRYON_OUTPUT_WIDTH", defaults.output_width),
            output_height: env_u32("TRYON_OUTPUT_HEIGHT", defaults.output_height),
            steps: env_u32("TRYON_STEPS", defaults.steps),
            max_retries,
            retry_base_delay_ms: env_u64(
                "TRYON_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay_ms,
            ),
            poll_interval_ms,
            poll_request_timeout_ms: env_u64(
                "TRYON_POLL_REQUEST_TIMEOUT_MS",
                defaults.poll_request_timeout_ms,
            ),
            max_wait_time_ms,
            http_timeout_secs: env_u64("TRYON_HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
            mock_mode: env_bool("TRYON_MOCK_MODE", defaults.mock_mode),
            mock_delay_ms: env_u64("TRYON_MOCK_DELAY_MS", defaults.mock_delay_ms),
            placeholder_image_url: env_string(
                "TRYON_PLACEHOLDER_IMAGE_URL",
                &defaults.placeholder_image_url,
            ),
        })
    }
}
