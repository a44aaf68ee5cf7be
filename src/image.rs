use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

use crate::error::TryOnError;
use crate::types::{ImagePayload, ImageRef};

/// Path fragments written by the capture/picker tooling on device. References
/// containing one of these are local files even without a file scheme.
const LOCAL_PATH_MARKERS: &[&str] = &["/ImagePicker/", "/CameraRoll/", "/DCIM/", "/Caches/"];

const LOCAL_SCHEMES: &[&str] = &["file://", "content://", "ph://", "assets-library://"];

const FETCH_MAX_ATTEMPTS: usize = 3;
const FETCH_BASE_DELAY_MS: u64 = 400;
const FETCH_ERROR_BODY_LIMIT: usize = 800;

/// Classifies a caller-supplied reference. Scheme prefixes and device path
/// markers win; everything that parses as an http(s) URL is remote.
pub fn is_local_reference(reference: &str) -> bool {
    if LOCAL_SCHEMES
        .iter()
        .any(|scheme| reference.starts_with(scheme))
    {
        return true;
    }
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return false;
    }
    reference.starts_with('/') || LOCAL_PATH_MARKERS.iter().any(|m| reference.contains(m))
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

/// The one base64 routine every image path goes through, whether the bytes
/// came from a local read or a remote download.
pub fn encode_image_bytes(bytes: &[u8]) -> ImagePayload {
    let mime_type = detect_mime_type(bytes).unwrap_or_else(|| "image/jpeg".to_string());
    ImagePayload::Inline {
        data: general_purpose::STANDARD.encode(bytes),
        mime_type,
    }
}

/// Produces the payload form the remote API needs: local references are read
/// and base64-encoded, remote URLs pass through untouched.
pub async fn prepare(
    reference: &ImageRef,
    cancel: &CancellationToken,
) -> Result<ImagePayload, TryOnError> {
    let reference = reference.as_str().trim();
    if reference.is_empty() {
        return Err(TryOnError::Validation(
            "image reference is empty".to_string(),
        ));
    }
    if cancel.is_cancelled() {
        return Err(TryOnError::Cancelled);
    }

    if is_local_reference(reference) {
        let path = reference.strip_prefix("file://").unwrap_or(reference);
        let bytes = tokio::fs::read(path).await.map_err(|err| {
            TryOnError::Validation(format!("cannot read image file {path}: {err}"))
        })?;
        if bytes.is_empty() {
            return Err(TryOnError::Validation(format!(
                "image file {path} is empty"
            )));
        }
        return Ok(encode_image_bytes(&bytes));
    }

    match Url::parse(reference) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(ImagePayload::Remote {
            url: reference.to_string(),
        }),
        _ => Err(TryOnError::Validation(format!(
            "unrecognized image reference: {reference}"
        ))),
    }
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn should_retry_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Downloads a remote reference and runs it through the same encoder as local
/// files. Used when the image-conditioned endpoint needs inline bytes for a
/// remote source image.
pub async fn fetch_inline(
    client: &reqwest::Client,
    url: &str,
    cancel: &CancellationToken,
) -> Result<ImagePayload, TryOnError> {
    for attempt in 0..FETCH_MAX_ATTEMPTS {
        if cancel.is_cancelled() {
            return Err(TryOnError::Cancelled);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(TryOnError::Cancelled),
            result = client.get(url).send() => result,
        };

        let response = match response {
            Ok(resp) => resp,
            Err(err) => {
                warn!(
                    "Failed to fetch image {url}: {err} (timeout={}, connect={}, attempt={}/{})",
                    err.is_timeout(),
                    err.is_connect(),
                    attempt + 1,
                    FETCH_MAX_ATTEMPTS
                );
                if !should_retry_error(&err) || attempt + 1 == FETCH_MAX_ATTEMPTS {
                    return Err(TryOnError::Validation(format!(
                        "cannot download image {url}: {err}"
                    )));
                }
                let delay = Duration::from_millis(FETCH_BASE_DELAY_MS << attempt);
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Image download failed for {url} with status {}: {}",
                status,
                truncate_for_log(&body, FETCH_ERROR_BODY_LIMIT)
            );
            if !should_retry_status(status) || attempt + 1 == FETCH_MAX_ATTEMPTS {
                return Err(TryOnError::Validation(format!(
                    "cannot download image {url}: status {status}"
                )));
            }
            let delay = Duration::from_millis(FETCH_BASE_DELAY_MS << attempt);
            tokio::time::sleep(delay).await;
            continue;
        }

        let bytes = response.bytes().await.map_err(|err| {
            TryOnError::Validation(format!("cannot read image bytes from {url}: {err}"))
        })?;
        if bytes.is_empty() {
            return Err(TryOnError::Validation(format!(
                "image downloaded from {url} is empty"
            )));
        }
        return Ok(encode_image_bytes(&bytes));
    }

    Err(TryOnError::Validation(format!(
        "cannot download image {url}"
    )))
}
