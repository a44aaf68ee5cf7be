use std::time::Duration;

use reqwest::Client;

use crate::config::Config;

/// Builds the one HTTP client shared by every component of a pipeline.
/// Constructed once at startup and injected, never a process-wide static.
pub fn build_http_client(config: &Config) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()
        .expect("Failed to build HTTP client")
}
