//! genjob: rate-limited, retrying client for asynchronous remote generation jobs.
//!
//! A [`JobClient`] drives one job through submit, poll and materialize;
//! a [`BatchCoordinator`] fans many jobs out over a bounded worker pool
//! sharing one [`RateLimiter`].

pub mod batch;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod provider;
pub mod rate_limiter;
pub mod retry;
pub mod state_machine;
pub mod ui;

pub use batch::{BatchCoordinator, BatchOptions, BatchResult, JobOutcome, JobSpec, generate_batch};
pub use client::{JobClient, JobSettings};
pub use config::{GenConfig, ProviderKind};
pub use error::{GenError, Result};
pub use provider::{JobProvider, PollStatus, ProviderError, ProviderSettings};
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
pub use state_machine::{Job, JobReport, JobStatus};
