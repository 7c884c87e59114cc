use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::provider::{JobProvider, PollStatus};
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::state_machine::{Event, Job, JobReport, JobStatus, StateMachine, Transition};

/// Timing knobs for a single job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSettings {
    pub retry: RetryPolicy,
    /// Pause between two status checks.
    pub poll_interval: Duration,
    /// Ceiling measured from the first submission attempt.
    pub max_poll_duration: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(3),
            max_poll_duration: Duration::from_secs(600),
        }
    }
}

/// Drives one job at a time from `Pending` to a terminal status.
///
/// The client is provider-agnostic; the rate limiter may be shared with
/// other clients so their submissions are spaced globally.
pub struct JobClient<P> {
    provider: Arc<P>,
    limiter: Arc<RateLimiter>,
    settings: JobSettings,
}

impl<P: JobProvider> JobClient<P> {
    pub fn new(provider: Arc<P>, limiter: Arc<RateLimiter>, settings: JobSettings) -> Self {
        Self {
            provider,
            limiter,
            settings,
        }
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    pub fn new_job(&self, prompt: impl Into<String>, output: impl Into<PathBuf>) -> Job {
        Job::new(prompt.into(), output, self.settings.retry.clone())
    }

    /// Run a single generation and report whether the artifact was written.
    pub async fn generate(&self, prompt: &str, output: impl Into<PathBuf>) -> bool {
        let mut job = self.new_job(prompt, output);
        self.run(&mut job).await.success()
    }

    /// Run a fresh `job` to a terminal status. Errors are captured on the job,
    /// never returned. A job that was already started is reported as is.
    pub async fn run(&self, job: &mut Job) -> JobReport {
        if StateMachine::next(job, Event::Start) != Transition::Next(JobStatus::Submitting) {
            warn!(job = job.short_id(), status = %job.status, "job already started, not resubmitting");
            return JobReport::from_job(job);
        }
        let started = Instant::now();
        job.submitted_at = Some(Utc::now());
        info!(job = job.short_id(), output = %job.output.display(), "submitting job");

        if self.submit(job).await {
            self.poll_until_done(job, started).await;
        }

        job.elapsed = started.elapsed();
        let report = JobReport::from_job(job);
        match job.status {
            JobStatus::Succeeded => info!(
                job = job.short_id(),
                output = %job.output.display(),
                elapsed_ms = report.elapsed_ms,
                "job succeeded"
            ),
            status => error!(
                job = job.short_id(),
                %status,
                error = report.error.as_deref().unwrap_or("unknown"),
                "job did not succeed"
            ),
        }
        report
    }

    /// Submit until accepted or out of budget. Returns true once polling may begin.
    async fn submit(&self, job: &mut Job) -> bool {
        loop {
            let waited = self.limiter.acquire().await;
            if !waited.is_zero() {
                debug!(job = job.short_id(), waited_ms = waited.as_millis() as u64, "rate limited locally");
            }

            let event = match self.provider.submit(&job.prompt).await {
                Ok(remote_id) => Event::Submitted { remote_id },
                Err(e) => Event::SubmitFailed(e),
            };

            match StateMachine::next(job, event) {
                Transition::Next(_) => {
                    info!(
                        job = job.short_id(),
                        remote_id = job.remote_id.as_deref().unwrap_or_default(),
                        attempt = job.submit_attempts,
                        "submission accepted"
                    );
                    return true;
                }
                Transition::Retry {
                    attempt,
                    delay,
                    reason,
                } => {
                    warn!(
                        job = job.short_id(),
                        attempt,
                        max = job.retry_policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "submission failed, retrying"
                    );
                    sleep(delay).await;
                }
                Transition::Complete(_) => return false,
                Transition::Stay | Transition::Ignored => {
                    error!(job = job.short_id(), status = %job.status, "submission left the job unchanged");
                    return false;
                }
            }
        }
    }

    async fn poll_until_done(&self, job: &mut Job, started: Instant) {
        let remote_id = job.remote_id.clone().unwrap_or_default();

        loop {
            if started.elapsed() > self.settings.max_poll_duration {
                StateMachine::next(job, Event::Deadline(self.settings.max_poll_duration));
                return;
            }

            let event = match self.provider.poll(&remote_id).await {
                Ok(PollStatus::Pending) => {
                    debug!(job = job.short_id(), %remote_id, "still pending");
                    Event::RemotePending
                }
                Ok(PollStatus::Succeeded { result_location }) => {
                    match self.materialize(&result_location, &job.output).await {
                        Ok(bytes) => {
                            debug!(job = job.short_id(), bytes, "result written");
                            Event::Materialized
                        }
                        Err(e) => {
                            warn!(job = job.short_id(), %remote_id, error = %e, "could not materialize result");
                            Event::PollError(e.to_string())
                        }
                    }
                }
                Ok(PollStatus::Failed { message }) => Event::RemoteFailed(message),
                Err(e) => {
                    warn!(job = job.short_id(), %remote_id, error = %e, "status check failed");
                    Event::PollError(e.to_string())
                }
            };

            if let Transition::Complete(_) = StateMachine::next(job, event) {
                return;
            }
            sleep(self.settings.poll_interval).await;
        }
    }

    /// Fetch the artifact and write it to `output`, creating parent directories.
    async fn materialize(&self, location: &str, output: &Path) -> Result<usize> {
        let bytes = self.provider.fetch_result(location).await?;
        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, &bytes).await?;
        Ok(bytes.len())
    }
}
