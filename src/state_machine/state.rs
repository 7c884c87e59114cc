use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::job::{FailureKind, Job};
use crate::provider::ProviderError;

/// Lifecycle of a generation job.
///
/// Pending → Submitting → Polling → Succeeded | Failed | TimedOut,
/// with Submitting → Failed when the submission budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Submitting,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::TimedOut
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Submitting => write!(f, "SUBMITTING"),
            JobStatus::Polling => write!(f, "POLLING"),
            JobStatus::Succeeded => write!(f, "SUCCEEDED"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

/// Something that happened to a job, fed into [`StateMachine::next`].
#[derive(Debug)]
pub enum Event {
    Start,
    Submitted { remote_id: String },
    SubmitFailed(ProviderError),
    RemotePending,
    /// Poll-level hiccup: a failed status check or a failed materialization.
    PollError(String),
    RemoteFailed(String),
    Materialized,
    Deadline(Duration),
}

/// The result of evaluating a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Advance to a non-terminal status.
    Next(JobStatus),
    /// Submit again after `delay`; `attempt` submissions have been made so far.
    Retry { attempt: u32, delay: Duration, reason: String },
    /// Remain in the current status (still polling).
    Stay,
    /// The job reached a terminal status.
    Complete(JobStatus),
    /// The event does not apply to the current status; nothing changed.
    Ignored,
}

/// Drives a `Job` through its lifecycle.
pub struct StateMachine;

impl StateMachine {
    /// Apply `event` to `job` and report the resulting transition.
    ///
    /// - Submission outcomes bump `submit_attempts`; a transient failure
    ///   retries while attempts remain, preferring the server's retry hint
    ///   over the policy delay.
    /// - Poll outcomes bump `polls`; pending and poll errors keep polling.
    /// - Terminal statuses absorb every further event.
    pub fn next(job: &mut Job, event: Event) -> Transition {
        if job.status.is_terminal() {
            return Transition::Complete(job.status);
        }

        let transition = match (job.status, event) {
            (JobStatus::Pending, Event::Start) => Transition::Next(JobStatus::Submitting),

            (JobStatus::Submitting, Event::Submitted { remote_id }) => {
                job.submit_attempts += 1;
                job.remote_id = Some(remote_id);
                Transition::Next(JobStatus::Polling)
            }
            (JobStatus::Submitting, Event::SubmitFailed(err)) => {
                job.submit_attempts += 1;
                Self::handle_submit_failure(job, err)
            }

            (JobStatus::Polling, Event::RemotePending | Event::PollError(_)) => {
                job.polls += 1;
                Transition::Stay
            }
            (JobStatus::Polling, Event::Materialized) => {
                job.polls += 1;
                Transition::Complete(JobStatus::Succeeded)
            }
            (JobStatus::Polling, Event::RemoteFailed(message)) => {
                job.polls += 1;
                job.error = Some(FailureKind::Remote(message));
                Transition::Complete(JobStatus::Failed)
            }
            (JobStatus::Polling, Event::Deadline(limit)) => {
                job.error = Some(FailureKind::TimedOut(limit));
                Transition::Complete(JobStatus::TimedOut)
            }

            _ => Transition::Ignored,
        };

        match &transition {
            Transition::Next(next) | Transition::Complete(next) => {
                job.status_history.push(job.status);
                job.status = *next;
            }
            Transition::Retry { .. } | Transition::Stay | Transition::Ignored => {}
        }

        transition
    }

    fn handle_submit_failure(job: &mut Job, err: ProviderError) -> Transition {
        job.remote_id = None;

        if !err.is_transient() {
            job.error = Some(FailureKind::Rejected(err.to_string()));
            return Transition::Complete(JobStatus::Failed);
        }

        if job.submit_attempts < job.retry_policy.max_attempts() {
            let delay = err
                .retry_after()
                .unwrap_or_else(|| job.retry_policy.delay_for(job.submit_attempts - 1));
            Transition::Retry {
                attempt: job.submit_attempts,
                delay,
                reason: err.to_string(),
            }
        } else {
            job.error = Some(FailureKind::Transient(err.to_string()));
            Transition::Complete(JobStatus::Failed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;

    fn make_job(max_retries: u32) -> Job {
        Job::new(
            "Test job".to_string(),
            "out.jpg",
            RetryPolicy {
                max_retries,
                ..Default::default()
            },
        )
    }

    fn overloaded() -> ProviderError {
        ProviderError::ApiError {
            status: 503,
            message: "overloaded".into(),
        }
    }

    fn submitted(job: &mut Job) {
        StateMachine::next(job, Event::Start);
        StateMachine::next(
            job,
            Event::Submitted {
                remote_id: "r-1".into(),
            },
        );
    }

    #[test]
    fn happy_path_walks_all_states() {
        let mut job = make_job(3);
        assert_eq!(
            StateMachine::next(&mut job, Event::Start),
            Transition::Next(JobStatus::Submitting)
        );
        assert!(job.remote_id.is_none());

        let t = StateMachine::next(
            &mut job,
            Event::Submitted {
                remote_id: "r-1".into(),
            },
        );
        assert_eq!(t, Transition::Next(JobStatus::Polling));
        assert_eq!(job.remote_id.as_deref(), Some("r-1"));

        assert_eq!(
            StateMachine::next(&mut job, Event::RemotePending),
            Transition::Stay
        );
        assert_eq!(
            StateMachine::next(&mut job, Event::Materialized),
            Transition::Complete(JobStatus::Succeeded)
        );
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.polls, 2);
        assert_eq!(
            job.status_history,
            vec![JobStatus::Pending, JobStatus::Submitting, JobStatus::Polling]
        );
    }

    #[test]
    fn transient_failures_retry_then_fail() {
        let mut job = make_job(2);
        StateMachine::next(&mut job, Event::Start);

        for expected_attempt in 1..=2 {
            let t = StateMachine::next(&mut job, Event::SubmitFailed(overloaded()));
            assert!(
                matches!(t, Transition::Retry { attempt, .. } if attempt == expected_attempt),
                "got {t:?}"
            );
            assert_eq!(job.status, JobStatus::Submitting);
        }

        let t = StateMachine::next(&mut job, Event::SubmitFailed(overloaded()));
        assert_eq!(t, Transition::Complete(JobStatus::Failed));
        assert_eq!(job.submit_attempts, 3);
        assert!(matches!(job.error, Some(FailureKind::Transient(_))));
        assert!(job.remote_id.is_none());
    }

    #[test]
    fn retry_delays_follow_policy() {
        let mut job = make_job(3);
        StateMachine::next(&mut job, Event::Start);

        let delays: Vec<Duration> = (0..3)
            .map(|_| match StateMachine::next(&mut job, Event::SubmitFailed(overloaded())) {
                Transition::Retry { delay, .. } => delay,
                other => panic!("expected retry, got {other:?}"),
            })
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[test]
    fn retry_after_hint_overrides_policy() {
        let mut job = make_job(3);
        StateMachine::next(&mut job, Event::Start);

        let t = StateMachine::next(
            &mut job,
            Event::SubmitFailed(ProviderError::RateLimited {
                retry_after_ms: Some(7000),
            }),
        );
        assert!(matches!(t, Transition::Retry { delay, .. } if delay == Duration::from_secs(7)));
    }

    #[test]
    fn zero_retries_fails_on_first_transient_error() {
        let mut job = make_job(0);
        StateMachine::next(&mut job, Event::Start);
        let t = StateMachine::next(&mut job, Event::SubmitFailed(overloaded()));
        assert_eq!(t, Transition::Complete(JobStatus::Failed));
        assert_eq!(job.submit_attempts, 1);
    }

    #[test]
    fn non_transient_error_is_not_retried() {
        let mut job = make_job(5);
        StateMachine::next(&mut job, Event::Start);
        let t = StateMachine::next(
            &mut job,
            Event::SubmitFailed(ProviderError::ApiError {
                status: 401,
                message: "bad key".into(),
            }),
        );
        assert_eq!(t, Transition::Complete(JobStatus::Failed));
        assert!(matches!(job.error, Some(FailureKind::Rejected(_))));
    }

    #[test]
    fn remote_failure_is_terminal() {
        let mut job = make_job(3);
        submitted(&mut job);
        let t = StateMachine::next(&mut job, Event::RemoteFailed("policy".into()));
        assert_eq!(t, Transition::Complete(JobStatus::Failed));
        assert_eq!(job.error, Some(FailureKind::Remote("policy".into())));
        assert_eq!(job.submit_attempts, 1);
    }

    #[test]
    fn poll_errors_do_not_touch_submit_budget() {
        let mut job = make_job(0);
        submitted(&mut job);
        for _ in 0..5 {
            assert_eq!(
                StateMachine::next(&mut job, Event::PollError("reset".into())),
                Transition::Stay
            );
        }
        assert_eq!(job.status, JobStatus::Polling);
        assert_eq!(job.submit_attempts, 1);
        assert_eq!(job.polls, 5);
    }

    #[test]
    fn deadline_times_out() {
        let mut job = make_job(3);
        submitted(&mut job);
        let t = StateMachine::next(&mut job, Event::Deadline(Duration::from_secs(600)));
        assert_eq!(t, Transition::Complete(JobStatus::TimedOut));
        assert_eq!(
            job.error,
            Some(FailureKind::TimedOut(Duration::from_secs(600)))
        );
    }

    #[test]
    fn terminal_states_absorb_events() {
        let mut job = make_job(3);
        submitted(&mut job);
        StateMachine::next(&mut job, Event::RemoteFailed("nope".into()));
        let history = job.status_history.clone();

        assert_eq!(
            StateMachine::next(&mut job, Event::Materialized),
            Transition::Complete(JobStatus::Failed)
        );
        assert_eq!(job.status_history, history);
    }

    #[test]
    fn out_of_order_events_are_ignored() {
        let mut job = make_job(3);
        assert_eq!(
            StateMachine::next(&mut job, Event::Materialized),
            Transition::Ignored
        );
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn status_display() {
        assert_eq!(JobStatus::Pending.to_string(), "PENDING");
        assert_eq!(JobStatus::TimedOut.to_string(), "TIMED_OUT");
        assert!(JobStatus::TimedOut.is_terminal());
        assert!(!JobStatus::Polling.is_terminal());
    }
}
