use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::GenerationClient;
use crate::config::Config;
use crate::error::TryOnError;
use crate::types::{GenerationJob, JobStatus};

/// Polls the status endpoint until the job is terminal or the overall wait
/// budget (measured from submission) runs out.
///
/// A transport failure on a single tick is logged and swallowed; the loop
/// keeps going and only the budget is fatal. `on_tick` fires once per
/// completed poll so the orchestrator can surface progress.
pub async fn poll_job<F>(
    client: &GenerationClient,
    config: &Config,
    job_id: &str,
    submitted: Instant,
    cancel: &CancellationToken,
    mut on_tick: F,
) -> Result<GenerationJob, TryOnError>
where
    F: FnMut(&GenerationJob),
{
    let budget = Duration::from_millis(config.max_wait_time_ms);
    let interval = Duration::from_millis(config.poll_interval_ms);
    let mut job = GenerationJob::new(job_id);

    loop {
        let elapsed = submitted.elapsed();
        if elapsed >= budget {
            return Err(TryOnError::ProcessingTimeout {
                waited_ms: elapsed.as_millis() as u64,
            });
        }

        // Sleep no longer than the remaining budget so the timeout fires on
        // time and no poll is ever issued past it.
        let wait = interval.min(budget - elapsed);
        tokio::select! {
            _ = cancel.cancelled() => return Err(TryOnError::Cancelled),
            _ = tokio::time::sleep(wait) => {}
        }

        let elapsed = submitted.elapsed();
        if elapsed >= budget {
            return Err(TryOnError::ProcessingTimeout {
                waited_ms: elapsed.as_millis() as u64,
            });
        }

        match client.fetch_status(job_id, cancel).await {
            Ok(snapshot) => {
                let sample = snapshot.result.as_ref().and_then(|r| r.sample.clone());
                let error = snapshot.result.as_ref().and_then(|r| r.error.clone());
                job.apply_remote(&snapshot.status, sample, error);
                debug!(
                    target: "tryon.poller",
                    job_id = %job.id,
                    remote_status = %snapshot.status,
                    "poll tick"
                );
                on_tick(&job);

                match job.status {
                    JobStatus::Ready => return Ok(job),
                    JobStatus::Error => {
                        let detail = job
                            .error_detail
                            .clone()
                            .unwrap_or_else(|| "no error detail reported".to_string());
                        return Err(TryOnError::JobFailed(detail));
                    }
                    JobStatus::Pending | JobStatus::Processing => {}
                }
            }
            Err(TryOnError::Cancelled) => return Err(TryOnError::Cancelled),
            Err(TryOnError::Network(message)) => {
                warn!(
                    "Status poll for job {job_id} failed: {message}; continuing until the wait budget runs out"
                );
            }
            Err(err) => return Err(err),
        }
    }
}
