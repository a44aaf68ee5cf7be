use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::error::TryOnError;

/// A caller-supplied image reference: a remote URL, an absolute path, or a
/// device file-scheme URI handed over by the capture/picker layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(reference: impl Into<String>) -> Self {
        ImageRef(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ImageRef {
    fn from(reference: &str) -> Self {
        ImageRef::new(reference)
    }
}

impl From<String> for ImageRef {
    fn from(reference: String) -> Self {
        ImageRef(reference)
    }
}

/// Structured garment description produced by the upstream vision service.
#[derive(Debug, Clone)]
pub struct GarmentDescription {
    pub category: String,
    pub attributes: Vec<String>,
}

impl GarmentDescription {
    pub fn new(category: impl Into<String>, attributes: Vec<String>) -> Self {
        GarmentDescription {
            category: category.into(),
            attributes,
        }
    }
}

/// Opaque caller identifiers, used for logging only.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

/// One try-on request. Constructed fresh per call and never reused.
#[derive(Debug, Clone)]
pub struct TryOnRequest {
    pub source_image: ImageRef,
    pub garment_images: Vec<ImageRef>,
    /// Pre-composed garment text from the vision service; consumed as opaque
    /// prompt text when present.
    pub prompt_text: Option<String>,
    pub garment_descriptions: Vec<GarmentDescription>,
    pub style_instructions: Option<String>,
    pub context: RequestContext,
}

impl TryOnRequest {
    pub fn new(source_image: ImageRef, garment_images: Vec<ImageRef>) -> Self {
        TryOnRequest {
            source_image,
            garment_images,
            prompt_text: None,
            garment_descriptions: Vec::new(),
            style_instructions: None,
            context: RequestContext::default(),
        }
    }

    pub fn validate(&self) -> Result<(), TryOnError> {
        if self.source_image.as_str().trim().is_empty() {
            return Err(TryOnError::Validation(
                "source image reference is empty".into(),
            ));
        }
        if self.garment_images.is_empty() {
            return Err(TryOnError::Validation(
                "at least one garment image is required".into(),
            ));
        }
        Ok(())
    }
}

/// Payload form required by the remote API. The variant makes the invariant
/// structural: an inline payload carries base64 bytes and never a URL, a
/// remote payload carries a URL and never bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    Inline { data: String, mime_type: String },
    Remote { url: String },
}

impl ImagePayload {
    pub fn is_inline(&self) -> bool {
        matches!(self, ImagePayload::Inline { .. })
    }

    /// Renders an inline payload as a `data:` URI for image-conditioned
    /// submission. Remote payloads have no inline form.
    pub fn data_uri(&self) -> Option<String> {
        match self {
            ImagePayload::Inline { data, mime_type } => {
                Some(format!("data:{mime_type};base64,{data}"))
            }
            ImagePayload::Remote { .. } => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            ImagePayload::Remote { url } => Some(url),
            ImagePayload::Inline { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Ready,
    Error,
}

impl JobStatus {
    /// Normalizes the remote status vocabulary to the internal one. Unknown
    /// statuses keep the job polling.
    pub fn from_remote(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "ready" | "completed" => JobStatus::Ready,
            "error" | "failed" => JobStatus::Error,
            "pending" | "queued" | "task not found" => JobStatus::Pending,
            _ => JobStatus::Processing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Ready | JobStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Ready => "ready",
            JobStatus::Error => "error",
        }
    }
}

/// A unit of work submitted to the remote backend, mutated only by the poller
/// re-fetching status and discarded once terminal.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub id: String,
    pub status: JobStatus,
    pub result_image_url: Option<String>,
    pub error_detail: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl GenerationJob {
    pub fn new(id: impl Into<String>) -> Self {
        GenerationJob {
            id: id.into(),
            status: JobStatus::Pending,
            result_image_url: None,
            error_detail: None,
            submitted_at: Utc::now(),
        }
    }

    pub fn apply_remote(
        &mut self,
        remote_status: &str,
        sample_url: Option<String>,
        error: Option<String>,
    ) {
        self.status = JobStatus::from_remote(remote_status);
        match self.status {
            JobStatus::Ready => self.result_image_url = sample_url,
            JobStatus::Error => {
                self.error_detail =
                    Some(error.unwrap_or_else(|| format!("remote status: {remote_status}")));
            }
            _ => {}
        }
    }
}

/// Ordered stages of one try-on run, plus the terminal error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    InputAnalysis,
    AiStyling,
    ApiTransmission,
    OutputDelivery,
    Completed,
    Error,
}

impl Phase {
    pub fn progress(&self) -> u8 {
        match self {
            Phase::InputAnalysis => 10,
            Phase::AiStyling => 30,
            Phase::ApiTransmission => 60,
            Phase::OutputDelivery => 90,
            Phase::Completed => 100,
            Phase::Error => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::InputAnalysis => "input_analysis",
            Phase::AiStyling => "ai_styling",
            Phase::ApiTransmission => "api_transmission",
            Phase::OutputDelivery => "output_delivery",
            Phase::Completed => "completed",
            Phase::Error => "error",
        }
    }
}

/// Progress snapshot delivered to the caller's callback at every phase
/// boundary and poll tick.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub phase: Phase,
    pub progress: u8,
    pub message: String,
    pub detail: Option<JsonValue>,
}

impl WorkflowState {
    pub fn at(phase: Phase, message: impl Into<String>) -> Self {
        WorkflowState {
            phase,
            progress: phase.progress(),
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: JsonValue) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn error(err: &TryOnError) -> Self {
        WorkflowState::at(Phase::Error, err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct TryOnMetadata {
    pub prompt_used: String,
    pub style_instructions: Option<String>,
    pub item_references: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub mock: bool,
}

/// Caller-facing result. Constructed once, immutable, not retained by the
/// pipeline.
#[derive(Debug, Clone)]
pub struct TryOnResult {
    pub generated_image_url: String,
    pub processing_time_ms: u64,
    pub confidence_score: f32,
    pub metadata: TryOnMetadata,
}
