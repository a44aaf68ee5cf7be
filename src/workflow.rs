use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::assembler;
use crate::client::GenerationClient;
use crate::config::Config;
use crate::error::TryOnError;
use crate::fallback;
use crate::image;
use crate::poller;
use crate::prompt;
use crate::retry;
use crate::types::{ImagePayload, ImageRef, Phase, TryOnRequest, TryOnResult, WorkflowState};
use crate::utils::http::build_http_client;
use crate::utils::timing::log_generation_timing;

/// Orchestrates one try-on run through its five phases, reporting progress at
/// every phase boundary and poll tick. Cheap to clone; concurrent runs are
/// fully independent and share only the read-only configuration and the HTTP
/// client.
#[derive(Clone)]
pub struct TryOnPipeline {
    config: Arc<Config>,
    client: GenerationClient,
}

impl TryOnPipeline {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let http = build_http_client(&config);
        TryOnPipeline {
            client: GenerationClient::new(http, Arc::clone(&config)),
            config,
        }
    }

    /// Constructs a pipeline around an existing HTTP client, for hosts that
    /// share one client across subsystems.
    pub fn with_http_client(config: Config, http: reqwest::Client) -> Self {
        let config = Arc::new(config);
        TryOnPipeline {
            client: GenerationClient::new(http, Arc::clone(&config)),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Inbound contract for the host layer: build the request from raw
    /// references and run it.
    pub async fn process_try_on<F>(
        &self,
        source_image: ImageRef,
        garment_images: Vec<ImageRef>,
        style_context: Option<String>,
        on_progress: F,
    ) -> Result<TryOnResult, TryOnError>
    where
        F: FnMut(&WorkflowState),
    {
        let mut request = TryOnRequest::new(source_image, garment_images);
        request.style_instructions = style_context;
        self.run(request, on_progress).await
    }

    /// Runs a request to completion, timeout, or error. Without a token the
    /// run cannot be aborted early.
    pub async fn run<F>(
        &self,
        request: TryOnRequest,
        on_progress: F,
    ) -> Result<TryOnResult, TryOnError>
    where
        F: FnMut(&WorkflowState),
    {
        self.run_cancellable(request, on_progress, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but the caller can abort the run through the
    /// token, even mid-poll. Cancellation surfaces as
    /// [`TryOnError::Cancelled`].
    pub async fn run_cancellable<F>(
        &self,
        request: TryOnRequest,
        mut on_progress: F,
        cancel: CancellationToken,
    ) -> Result<TryOnResult, TryOnError>
    where
        F: FnMut(&WorkflowState),
    {
        match self.execute(&request, &mut on_progress, &cancel).await {
            Ok(result) => Ok(result),
            Err(err) => {
                // Every fatal error becomes an observable error-phase event
                // before it reaches the caller.
                on_progress(&WorkflowState::error(&err));
                Err(err)
            }
        }
    }

    async fn execute<F>(
        &self,
        request: &TryOnRequest,
        on_progress: &mut F,
        cancel: &CancellationToken,
    ) -> Result<TryOnResult, TryOnError>
    where
        F: FnMut(&WorkflowState),
    {
        let started = Instant::now();

        let prompt_used = prompt::build_prompt(
            request.prompt_text.as_deref(),
            &request.garment_descriptions,
            request.style_instructions.as_deref(),
        );

        if fallback::should_mock(&self.config) {
            let result = fallback::mock_result(request, &self.config, &prompt_used, cancel).await?;
            on_progress(&WorkflowState::at(Phase::Completed, "Try-on complete (mock)"));
            return Ok(result);
        }

        // Phase 1: input analysis.
        on_progress(&WorkflowState::at(Phase::InputAnalysis, "Analyzing input images"));
        request.validate()?;
        let source_payload = image::prepare(&request.source_image, cancel).await?;
        for garment in &request.garment_images {
            image::prepare(garment, cancel).await?;
        }

        // Phase 2: styling.
        on_progress(&WorkflowState::at(Phase::AiStyling, "Composing styling prompt"));

        // Phase 3: transmission (submission with retry, then polling).
        on_progress(
            &WorkflowState::at(Phase::ApiTransmission, "Submitting generation job").with_detail(
                json!({ "garment_count": request.garment_images.len() }),
            ),
        );
        if cancel.is_cancelled() {
            return Err(TryOnError::Cancelled);
        }

        // The edit endpoint needs inline image bytes. A remote source image
        // is downloaded through the shared encoder; when that fails the run
        // degrades to standalone generation instead of aborting.
        let inline_source: Option<Arc<str>> = match &source_payload {
            ImagePayload::Inline { .. } => source_payload.data_uri().map(Arc::from),
            ImagePayload::Remote { url } => {
                match image::fetch_inline(self.client.http(), url, cancel).await {
                    Ok(payload) => payload.data_uri().map(Arc::from),
                    Err(TryOnError::Cancelled) => return Err(TryOnError::Cancelled),
                    Err(err) => {
                        warn!(
                            "could not inline remote source image ({err}); \
                             falling back to standalone generation"
                        );
                        None
                    }
                }
            }
        };

        let (model, operation) = if inline_source.is_some() {
            (self.config.edit_model.as_str(), "edit")
        } else {
            (self.config.generation_model.as_str(), "generate")
        };

        let user_id = request.context.user_id.clone();
        let job = log_generation_timing(
            "tryon-backend",
            model,
            operation,
            Some(json!({ "user_id": user_id })),
            || async {
                let submitted = Instant::now();
                let job_id = retry::with_retry(
                    self.config.max_retries,
                    self.config.retry_base_delay_ms,
                    "generation submission",
                    || {
                        // Each attempt owns cheap clones so the future does
                        // not borrow through the closure.
                        let client = self.client.clone();
                        let prompt = prompt_used.clone();
                        let source = inline_source.clone();
                        let cancel = cancel.clone();
                        async move {
                            match source {
                                Some(data_uri) => {
                                    client.submit_edit(&prompt, &data_uri, &cancel).await
                                }
                                None => client.submit_generation(&prompt, &cancel).await,
                            }
                        }
                    },
                )
                .await?;
                info!(job_id = %job_id, model = model, "generation job submitted");

                poller::poll_job(
                    &self.client,
                    &self.config,
                    &job_id,
                    submitted,
                    cancel,
                    |job| {
                        on_progress(
                            &WorkflowState::at(
                                Phase::ApiTransmission,
                                format!("Generation in progress ({})", job.status.as_str()),
                            )
                            .with_detail(json!({ "job_id": job.id })),
                        );
                    },
                )
                .await
            },
        )
        .await?;

        // Phase 4: delivery.
        on_progress(&WorkflowState::at(Phase::OutputDelivery, "Preparing try-on result"));
        let result = assembler::assemble(&job, request, &prompt_used, started.elapsed(), &self.config);

        on_progress(&WorkflowState::at(Phase::Completed, "Try-on complete"));
        Ok(result)
    }
}
