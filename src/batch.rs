//! Bounded worker pool running many jobs against one provider.
//!
//! Every batch gets its own [`RateLimiter`] shared by all workers. Workers
//! drain a common queue; each job is owned by one worker until it is
//! terminal. The returned [`BatchResult`] always has one entry per output
//! key, whatever happened to the individual jobs.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::client::{JobClient, JobSettings};
use crate::error::Result;
use crate::provider::JobProvider;
use crate::rate_limiter::RateLimiter;
use crate::state_machine::{FailureKind, JobReport, JobStatus};

/// A prompt and the path its artifact should be written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub prompt: String,
    pub output: PathBuf,
}

impl JobSpec {
    pub fn new(prompt: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub workers: usize,
    /// Submissions per second across the whole batch.
    pub rate_limit: f64,
    /// Treat an existing non-empty output file as already generated.
    pub skip_existing: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: 3,
            rate_limit: 2.0,
            skip_existing: false,
        }
    }
}

/// Terminal outcome recorded for one output key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub error: Option<String>,
    pub remote_id: Option<String>,
    #[serde(default)]
    pub skipped: bool,
}

impl JobOutcome {
    pub fn from_report(report: &JobReport) -> Self {
        Self {
            status: report.status,
            error: report.error.clone(),
            remote_id: report.remote_id.clone(),
            skipped: false,
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: JobStatus::Succeeded,
            error: None,
            remote_id: None,
            skipped: true,
        }
    }

    pub fn crashed(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            error: Some(FailureKind::Crashed(message.into()).to_string()),
            remote_id: None,
            skipped: false,
        }
    }

    pub fn success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

/// Outcomes keyed by output path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    outcomes: BTreeMap<PathBuf, JobOutcome>,
}

impl BatchResult {
    /// Insert an outcome. When two jobs share a key, a failure wins over a success.
    pub fn record(&mut self, key: PathBuf, outcome: JobOutcome) {
        match self.outcomes.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(outcome);
            }
            Entry::Occupied(mut slot) => {
                if slot.get().success() && !outcome.success() {
                    slot.insert(outcome);
                }
            }
        }
    }

    pub fn get(&self, key: &Path) -> Option<&JobOutcome> {
        self.outcomes.get(key)
    }

    pub fn contains(&self, key: &Path) -> bool {
        self.outcomes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &JobOutcome)> {
        self.outcomes.iter()
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.success()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = (&PathBuf, &JobOutcome)> {
        self.outcomes.iter().filter(|(_, o)| !o.success())
    }

    /// Write the outcomes as pretty JSON, creating parent directories.
    pub async fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub fn to_bool_map(&self) -> HashMap<PathBuf, bool> {
        self.outcomes
            .iter()
            .map(|(key, outcome)| (key.clone(), outcome.success()))
            .collect()
    }
}

/// Notified from worker tasks each time a job finishes.
pub trait BatchObserver: Send + Sync {
    fn job_finished(&self, output: &Path, outcome: &JobOutcome, done: usize, total: usize);
}

pub struct BatchCoordinator<P> {
    provider: Arc<P>,
    settings: JobSettings,
    observer: Option<Arc<dyn BatchObserver>>,
}

struct WorkerContext<P> {
    client: JobClient<P>,
    queue: Mutex<VecDeque<JobSpec>>,
    results: Mutex<BatchResult>,
    completed: AtomicUsize,
    total: usize,
    skip_existing: bool,
    observer: Option<Arc<dyn BatchObserver>>,
}

impl<P: JobProvider + 'static> BatchCoordinator<P> {
    pub fn new(provider: Arc<P>, settings: JobSettings) -> Self {
        Self {
            provider,
            settings,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run every job to a terminal status on `options.workers` workers.
    pub async fn run_batch(&self, jobs: Vec<JobSpec>, options: &BatchOptions) -> BatchResult {
        let total = jobs.len();
        if total == 0 {
            return BatchResult::default();
        }

        let keys: Vec<PathBuf> = jobs.iter().map(|spec| spec.output.clone()).collect();
        let workers = options.workers.clamp(1, total);
        info!(
            jobs = total,
            workers,
            rate_limit = options.rate_limit,
            "starting batch"
        );

        let limiter = Arc::new(RateLimiter::new(options.rate_limit));
        let ctx = Arc::new(WorkerContext {
            client: JobClient::new(Arc::clone(&self.provider), limiter, self.settings.clone()),
            queue: Mutex::new(jobs.into()),
            results: Mutex::new(BatchResult::default()),
            completed: AtomicUsize::new(0),
            total,
            skip_existing: options.skip_existing,
            observer: self.observer.clone(),
        });

        let handles: Vec<_> = (0..workers)
            .map(|worker| tokio::spawn(worker_loop(worker, Arc::clone(&ctx))))
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task aborted");
            }
        }

        let mut result = std::mem::take(&mut *ctx.results.lock().await);
        for key in keys {
            if !result.contains(&key) {
                result.record(key, JobOutcome::crashed("worker exited before the job finished"));
            }
        }

        info!(
            succeeded = result.succeeded_count(),
            total = result.len(),
            "batch finished"
        );
        result
    }
}

async fn worker_loop<P: JobProvider + 'static>(worker: usize, ctx: Arc<WorkerContext<P>>) {
    loop {
        let Some(spec) = ctx.queue.lock().await.pop_front() else {
            break;
        };
        let key = spec.output.clone();

        let outcome = if ctx.skip_existing && already_materialized(&spec.output).await {
            info!(worker, output = %key.display(), "output exists, skipping");
            JobOutcome::skipped()
        } else {
            let job_ctx = Arc::clone(&ctx);
            let handle = tokio::spawn(async move {
                let mut job = job_ctx.client.new_job(spec.prompt, spec.output);
                job_ctx.client.run(&mut job).await
            });
            match handle.await {
                Ok(report) => JobOutcome::from_report(&report),
                Err(e) => {
                    error!(worker, output = %key.display(), error = %e, "job task crashed");
                    JobOutcome::crashed(e.to_string())
                }
            }
        };

        ctx.results
            .lock()
            .await
            .record(key.clone(), outcome.clone());
        let done = ctx.completed.fetch_add(1, Ordering::SeqCst) + 1;
        info!(worker, done, total = ctx.total, "progress");
        if let Some(observer) = &ctx.observer {
            let notify = AssertUnwindSafe(|| observer.job_finished(&key, &outcome, done, ctx.total));
            if std::panic::catch_unwind(notify).is_err() {
                error!(worker, output = %key.display(), "batch observer panicked");
            }
        }
    }
}

async fn already_materialized(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Run a batch and reduce the outcome to `output -> succeeded`.
pub async fn generate_batch<P: JobProvider + 'static>(
    provider: Arc<P>,
    jobs: Vec<JobSpec>,
    workers: usize,
    rate_limit: f64,
    settings: JobSettings,
) -> HashMap<PathBuf, bool> {
    let options = BatchOptions {
        workers,
        rate_limit,
        skip_existing: false,
    };
    BatchCoordinator::new(provider, settings)
        .run_batch(jobs, &options)
        .await
        .to_bool_map()
}
