//! Tipos de erro para os provedores remotos de geração.
//!
//! Define [`ProviderError`] com variantes para rate limiting, erros da API,
//! erros de rede e respostas inválidas. A classificação em transitório ou
//! definitivo fica em [`ProviderError::is_transient`].

use std::time::Duration;

use thiserror::Error;

/// Erros que podem ocorrer ao falar com um provedor de jobs remoto.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// O servidor retornou HTTP 429 (ou o equivalente do provedor).
    /// `retry_after_ms` vem do cabeçalho `Retry-After`, quando presente.
    #[error("rate limited{}", retry_hint(.retry_after_ms))]
    RateLimited { retry_after_ms: Option<u64> },

    /// Erro HTTP retornado pela API (ex.: 401 chave inválida, 503 sobrecarga).
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Serviço temporariamente indisponível, sem resposta HTTP utilizável.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Corpo de resposta que não segue o contrato esperado.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

fn retry_hint(retry_after_ms: &Option<u64>) -> String {
    match retry_after_ms {
        Some(ms) => format!(", retry after {ms}ms"),
        None => String::new(),
    }
}

impl ProviderError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::NetworkError(_)
            | ProviderError::Unavailable(_) => true,
            ProviderError::ApiError { status, .. } => *status >= 500 || *status == 408,
            ProviderError::InvalidResponse(_) => false,
        }
    }

    /// Server-provided wait hint, only present on rate-limit responses.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited {
                retry_after_ms: Some(ms),
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_display() {
        let err = ProviderError::RateLimited {
            retry_after_ms: Some(5000),
        };
        assert_eq!(err.to_string(), "rate limited, retry after 5000ms");

        let err = ProviderError::RateLimited {
            retry_after_ms: None,
        };
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn api_error_display() {
        let err = ProviderError::ApiError {
            status: 401,
            message: "Invalid API key".into(),
        };
        assert_eq!(err.to_string(), "API error (status 401): Invalid API key");
    }

    #[test]
    fn transient_classification() {
        let server = ProviderError::ApiError {
            status: 503,
            message: "overloaded".into(),
        };
        let timeout = ProviderError::ApiError {
            status: 408,
            message: "timeout".into(),
        };
        let auth = ProviderError::ApiError {
            status: 401,
            message: "bad key".into(),
        };
        assert!(server.is_transient());
        assert!(timeout.is_transient());
        assert!(!auth.is_transient());
        assert!(ProviderError::RateLimited { retry_after_ms: None }.is_transient());
        assert!(ProviderError::Unavailable("connection reset".into()).is_transient());
        assert!(!ProviderError::InvalidResponse("missing task_id".into()).is_transient());
    }

    #[test]
    fn retry_after_only_for_rate_limits() {
        let limited = ProviderError::RateLimited {
            retry_after_ms: Some(3000),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(
            ProviderError::RateLimited { retry_after_ms: None }.retry_after(),
            None
        );
        assert_eq!(ProviderError::Unavailable("x".into()).retry_after(), None);
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProviderError>();
    }
}
