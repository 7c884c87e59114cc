mod job;
mod state;

pub use job::{FailureKind, Job, JobReport};
pub use state::{Event, JobStatus, StateMachine, Transition};
