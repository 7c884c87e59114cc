//! Scripted in-memory provider used by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::{JobProvider, PollStatus, ProviderError};

type SubmitFn = dyn Fn(&str, u32) -> Result<String, ProviderError> + Send + Sync;
type PollFn = dyn Fn(&str, u32) -> Result<PollStatus, ProviderError> + Send + Sync;
type FetchFn = dyn Fn(&str, u32) -> Result<Vec<u8>, ProviderError> + Send + Sync;

/// Behaviour is given as closures receiving the prompt/remote id/location
/// and the zero-based call count for that key.
pub(crate) struct FakeProvider {
    submit: Box<SubmitFn>,
    poll: Box<PollFn>,
    fetch: Box<FetchFn>,
    poll_delay: Duration,
    submit_calls: AtomicU32,
    poll_calls: AtomicU32,
    fetch_calls: AtomicU32,
    per_key: Mutex<HashMap<String, u32>>,
}

impl FakeProvider {
    /// Accepts every prompt, reports success on the first poll.
    pub(crate) fn succeeding() -> Self {
        Self {
            submit: Box::new(|prompt, _| Ok(format!("remote-{prompt}"))),
            poll: Box::new(|id, _| {
                Ok(PollStatus::Succeeded {
                    result_location: format!("mem://{id}"),
                })
            }),
            fetch: Box::new(|_, _| Ok(b"artifact".to_vec())),
            poll_delay: Duration::ZERO,
            submit_calls: AtomicU32::new(0),
            poll_calls: AtomicU32::new(0),
            fetch_calls: AtomicU32::new(0),
            per_key: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn on_submit(
        mut self,
        f: impl Fn(&str, u32) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        self.submit = Box::new(f);
        self
    }

    pub(crate) fn on_poll(
        mut self,
        f: impl Fn(&str, u32) -> Result<PollStatus, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        self.poll = Box::new(f);
        self
    }

    pub(crate) fn on_fetch(
        mut self,
        f: impl Fn(&str, u32) -> Result<Vec<u8>, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        self.fetch = Box::new(f);
        self
    }

    /// Simulated latency of every status check.
    pub(crate) fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    pub(crate) fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn poll_calls(&self) -> u32 {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn next_index(&self, key: String) -> u32 {
        let mut per_key = self.per_key.lock().unwrap();
        let count = per_key.entry(key).or_insert(0);
        let index = *count;
        *count += 1;
        index
    }
}

impl JobProvider for FakeProvider {
    async fn submit(&self, prompt: &str) -> Result<String, ProviderError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let index = self.next_index(format!("submit:{prompt}"));
        (self.submit)(prompt, index)
    }

    async fn poll(&self, remote_id: &str) -> Result<PollStatus, ProviderError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        if !self.poll_delay.is_zero() {
            tokio::time::sleep(self.poll_delay).await;
        }
        let index = self.next_index(format!("poll:{remote_id}"));
        (self.poll)(remote_id, index)
    }

    async fn fetch_result(&self, location: &str) -> Result<Vec<u8>, ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let index = self.next_index(format!("fetch:{location}"));
        (self.fetch)(location, index)
    }
}
