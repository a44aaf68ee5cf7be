//! Virtual try-on generation pipeline.
//!
//! Takes a photo of a person plus a set of garment references, composes a
//! generation prompt, submits a job to a remote image-generation backend
//! (image-conditioned edit when a source image is available, standalone
//! generation otherwise), polls the job until it is terminal, and hands the
//! caller a rendered try-on result. Transient submission failures are retried
//! with linear backoff, stuck jobs time out against an overall wait budget,
//! and when no usable credential is configured the pipeline serves a
//! deterministic mock result without touching the network.
//!
//! ```no_run
//! use tryon_pipeline::{Config, ImageRef, TryOnPipeline};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let pipeline = TryOnPipeline::new(Config::load()?);
//! let result = pipeline
//!     .process_try_on(
//!         ImageRef::new("file:///var/mobile/me.jpg"),
//!         vec![ImageRef::new("https://cdn.example.com/jacket.jpg")],
//!         Some("street style, golden hour".to_string()),
//!         |state| println!("{}% {}", state.progress, state.message),
//!     )
//!     .await?;
//! println!("{}", result.generated_image_url);
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod client;
pub mod config;
pub mod error;
pub mod fallback;
pub mod image;
pub mod poller;
pub mod prompt;
pub mod retry;
pub mod types;
pub mod utils;
pub mod workflow;

pub use config::Config;
pub use error::TryOnError;
pub use types::{
    GarmentDescription, GenerationJob, ImagePayload, ImageRef, JobStatus, Phase, RequestContext,
    TryOnMetadata, TryOnRequest, TryOnResult, WorkflowState,
};
pub use workflow::TryOnPipeline;

pub use tokio_util::sync::CancellationToken;
