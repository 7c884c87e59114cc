use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::JobStatus;
use crate::retry::RetryPolicy;

/// Why a job ended in `Failed` or `TimedOut`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Submission kept failing transiently until the retry budget ran out.
    Transient(String),
    /// Submission refused with an error that retrying cannot fix.
    Rejected(String),
    /// The remote service reported the job itself as failed.
    Remote(String),
    /// The poll ceiling elapsed before a result was materialized.
    TimedOut(Duration),
    /// The per-job task panicked and was caught at the worker boundary.
    Crashed(String),
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Transient(msg) => write!(f, "retries exhausted: {msg}"),
            FailureKind::Rejected(msg) => write!(f, "submission rejected: {msg}"),
            FailureKind::Remote(msg) => write!(f, "remote job failed: {msg}"),
            FailureKind::TimedOut(after) => write!(f, "timed out after {}s", after.as_secs()),
            FailureKind::Crashed(msg) => write!(f, "worker crashed: {msg}"),
        }
    }
}

/// One generation request tracked from submission to a terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub prompt: String,
    pub output: PathBuf,
    pub status: JobStatus,
    pub status_history: Vec<JobStatus>,
    /// Identifier assigned by the remote service, set once a submission is accepted.
    pub remote_id: Option<String>,
    pub submit_attempts: u32,
    pub polls: u32,
    pub retry_policy: RetryPolicy,
    pub submitted_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
    pub error: Option<FailureKind>,
}

impl Job {
    pub fn new(prompt: String, output: impl Into<PathBuf>, retry_policy: RetryPolicy) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            prompt,
            output: output.into(),
            status: JobStatus::Pending,
            status_history: Vec::new(),
            remote_id: None,
            submit_attempts: 0,
            polls: 0,
            retry_policy,
            submitted_at: None,
            elapsed: Duration::ZERO,
            error: None,
        }
    }

    /// First eight characters of the local id, for log lines.
    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }
}

/// Summary produced once a job reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    pub remote_id: Option<String>,
    pub prompt: String,
    pub output: PathBuf,
    pub status: JobStatus,
    pub status_transitions: Vec<JobStatus>,
    pub submit_attempts: u32,
    pub polls: u32,
    pub submitted_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl JobReport {
    pub fn from_job(job: &Job) -> Self {
        let mut transitions = job.status_history.clone();
        transitions.push(job.status);

        Self {
            job_id: job.id.clone(),
            remote_id: job.remote_id.clone(),
            prompt: job.prompt.clone(),
            output: job.output.clone(),
            status: job.status,
            status_transitions: transitions,
            submit_attempts: job.submit_attempts,
            polls: job.polls,
            submitted_at: job.submitted_at,
            elapsed_ms: u64::try_from(job.elapsed.as_millis()).unwrap_or(u64::MAX),
            error: job.error.as_ref().map(ToString::to_string),
        }
    }

    pub fn success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}
