//! Job status poller
//!
//! Queries a rendering job until it reaches `COMPLETE` or `FAILED`. Waits between
//! queries are tokio timers, so the runtime stays free to observe cancellation
//! and the overall deadline while the job renders.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{NarrationError, Result, Stage};
use crate::job::{JobId, JobStatus, PollResult, StatusTransition};

/// Anything that can report the current status of a job
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn query_status(&self, job_id: &JobId) -> Result<PollResult>;
}

/// Callback invoked on every status transition
pub type TransitionHook = Arc<dyn Fn(&StatusTransition) + Send + Sync + 'static>;

#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Pause between two status queries
    pub interval: Duration,
    /// Overall bound on the wait; `None` waits indefinitely
    pub max_wait: Option<Duration>,
    /// Extra attempts for a single query failing with a transient error
    pub max_query_retries: u32,
    /// Base delay between retries, multiplied by the attempt number
    pub retry_delay: Duration,
    /// Consecutive unrecognized statuses tolerated before giving up
    pub max_unknown_statuses: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            max_wait: Some(Duration::from_secs(30 * 60)),
            max_query_retries: 3,
            retry_delay: Duration::from_secs(2),
            max_unknown_statuses: 5,
        }
    }
}

pub struct JobStatusPoller {
    config: PollConfig,
    hook: Option<TransitionHook>,
}

impl JobStatusPoller {
    pub fn new(config: PollConfig) -> Self {
        Self { config, hook: None }
    }

    pub fn with_hook(mut self, hook: TransitionHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Wait until `job_id` is terminal and return the final snapshot.
    ///
    /// Cancellation wins over the deadline, and both win over a result that
    /// becomes ready in the same instant.
    pub async fn wait_for_terminal<S>(
        &self,
        source: &S,
        job_id: &JobId,
        cancel: &CancelToken,
    ) -> Result<PollResult>
    where
        S: StatusSource + ?Sized,
    {
        if cancel.is_cancelled() {
            return Err(NarrationError::Cancelled { stage: Stage::Poll });
        }

        let started = Instant::now();
        let deadline = self.config.max_wait.map(|wait| started + wait);
        let polling = self.poll_until_terminal(source, job_id, cancel);
        tokio::pin!(polling);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(job_id = %job_id, "polling cancelled");
                Err(NarrationError::Cancelled { stage: Stage::Poll })
            }
            _ = sleep_until_deadline(deadline) => {
                let waited = started.elapsed();
                warn!(job_id = %job_id, ?waited, "polling deadline reached");
                Err(NarrationError::PollTimeout {
                    job_id: job_id.to_string(),
                    waited,
                })
            }
            result = &mut polling => result,
        }
    }

    async fn poll_until_terminal<S>(
        &self,
        source: &S,
        job_id: &JobId,
        cancel: &CancelToken,
    ) -> Result<PollResult>
    where
        S: StatusSource + ?Sized,
    {
        let mut last_known: Option<JobStatus> = None;
        let mut unknown_in_a_row = 0u32;

        loop {
            let snapshot = self.query_with_retry(source, job_id).await?;

            // A query may have been in flight when cancellation was raised
            if cancel.is_cancelled() {
                return Err(NarrationError::Cancelled { stage: Stage::Poll });
            }

            if snapshot.status == JobStatus::Unknown {
                unknown_in_a_row += 1;
                warn!(
                    job_id = %job_id,
                    raw_status = %snapshot.raw_status,
                    count = unknown_in_a_row,
                    "unrecognized job status"
                );
                if unknown_in_a_row >= self.config.max_unknown_statuses {
                    return Err(NarrationError::UnexpectedStatus {
                        job_id: job_id.to_string(),
                        count: unknown_in_a_row,
                        last: snapshot.raw_status,
                    });
                }
            } else {
                unknown_in_a_row = 0;
                if last_known != Some(snapshot.status) {
                    self.emit(StatusTransition {
                        job_id: job_id.clone(),
                        from: last_known,
                        to: snapshot.status,
                    });
                    last_known = Some(snapshot.status);
                }
                if snapshot.status.is_terminal() {
                    return Ok(snapshot);
                }
            }

            debug!(job_id = %job_id, interval = ?self.config.interval, "waiting before next status query");
            time::sleep(self.config.interval).await;
        }
    }

    async fn query_with_retry<S>(&self, source: &S, job_id: &JobId) -> Result<PollResult>
    where
        S: StatusSource + ?Sized,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match source.query_status(job_id).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if attempt > self.config.max_query_retries => {
                    return Err(NarrationError::StatusQuery {
                        job_id: job_id.to_string(),
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    let backoff = retry_backoff(self.config.retry_delay, attempt);
                    warn!(
                        job_id = %job_id,
                        attempt,
                        ?backoff,
                        error = %err,
                        "status query failed, retrying"
                    );
                    time::sleep(backoff).await;
                }
            }
        }
    }

    fn emit(&self, transition: StatusTransition) {
        match transition.from {
            Some(from) => info!(
                job_id = %transition.job_id,
                from = %from,
                to = %transition.to,
                "job status changed"
            ),
            None => info!(job_id = %transition.job_id, to = %transition.to, "job status observed"),
        }
        if let Some(hook) = &self.hook {
            hook(&transition);
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Linear backoff with up to 25% jitter
fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    let linear = base.saturating_mul(attempt);
    let jitter_cap = (linear.as_millis() / 4) as u64;
    if jitter_cap == 0 {
        return linear;
    }
    let jitter = rand::thread_rng().gen_range(0..=jitter_cap);
    linear + Duration::from_millis(jitter)
}
