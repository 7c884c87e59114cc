//! Remote generation backends speaking a submit/poll job protocol.
//!
//! [`JobProvider`] is the seam between the provider-agnostic
//! [`JobClient`](crate::client::JobClient) and each concrete service.

use std::future::Future;
use std::time::Duration;

pub mod dashscope;
pub mod error;
pub mod modelscope;

#[cfg(test)]
pub(crate) mod fake;

pub use dashscope::DashScopeProvider;
pub use error::ProviderError;
pub use modelscope::ModelScopeProvider;

/// Remote status of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// Queued or running on the remote side.
    Pending,
    /// Finished; the artifact can be fetched from `result_location`.
    Succeeded { result_location: String },
    /// Definitive failure of this submission, as reported by the service.
    Failed { message: String },
}

/// Operations every remote job backend must offer.
///
/// Futures are required to be `Send` so one provider can be shared by the
/// worker tasks of a batch.
pub trait JobProvider: Send + Sync {
    /// Submit a prompt and return the remote job identifier.
    fn submit(&self, prompt: &str) -> impl Future<Output = Result<String, ProviderError>> + Send;

    /// Check the status of a previously submitted job.
    fn poll(&self, remote_id: &str)
    -> impl Future<Output = Result<PollStatus, ProviderError>> + Send;

    /// Download the artifact at `location`.
    fn fetch_result(
        &self,
        location: &str,
    ) -> impl Future<Output = Result<Vec<u8>, ProviderError>> + Send;
}

/// Connection parameters shared by the HTTP providers.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
}

pub(crate) fn http_client(request_timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(request_timeout)
        .build()?;
    Ok(client)
}

/// Parse a `Retry-After` header given in whole seconds.
pub(crate) fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000))
}

/// Turn a non-success HTTP response into a [`ProviderError`].
pub(crate) async fn error_from_response(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return ProviderError::RateLimited {
            retry_after_ms: retry_after_ms(response.headers()),
        };
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    ProviderError::ApiError {
        status: status.as_u16(),
        message,
    }
}

/// Read the whole body, then decode it. A body that breaks off midway is a
/// network error; only a complete body that fails to parse is invalid.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

/// Shared body of `fetch_result` for providers that hand out plain URLs.
pub(crate) async fn download(
    client: &reqwest::Client,
    location: &str,
) -> Result<Vec<u8>, ProviderError> {
    let response = client.get(location).send().await?;
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }
    Ok(response.bytes().await?.to_vec())
}
