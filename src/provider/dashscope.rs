//! Cliente para a síntese de imagens assíncrona do DashScope.
//!
//! O envio usa `X-DashScope-Async: enable`; o identificador e o status
//! ficam aninhados no objeto `output` da resposta.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{JobProvider, PollStatus, ProviderError, ProviderSettings};

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com";
pub const DEFAULT_MODEL: &str = "wanx2.1-t2i-plus";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub model: String,
    pub input: SynthesisInput,
    pub parameters: SynthesisParameters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisInput {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisParameters {
    pub n: u32,
    pub size: String,
}

impl Default for SynthesisParameters {
    fn default() -> Self {
        Self {
            n: 1,
            size: "1024*1024".to_string(),
        }
    }
}

/// Envelope shared by submit and task responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    #[serde(default)]
    pub output: Option<TaskOutput>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub task_status: Option<String>,
    #[serde(default)]
    pub results: Vec<TaskResult>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub url: Option<String>,
}

impl TaskEnvelope {
    fn is_throttled(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| code.starts_with("Throttling"))
    }

    fn into_status(self) -> Result<PollStatus, ProviderError> {
        let output = self
            .output
            .ok_or_else(|| ProviderError::InvalidResponse("missing output".into()))?;

        match output.task_status.as_deref() {
            Some("SUCCEEDED") => {
                let result_location = output
                    .results
                    .into_iter()
                    .find_map(|r| r.url)
                    .ok_or_else(|| {
                        ProviderError::InvalidResponse("SUCCEEDED without result url".into())
                    })?;
                Ok(PollStatus::Succeeded { result_location })
            }
            Some("FAILED" | "CANCELED" | "UNKNOWN") => Ok(PollStatus::Failed {
                message: output
                    .message
                    .or(self.message)
                    .unwrap_or_else(|| "unknown error".to_string()),
            }),
            _ => Ok(PollStatus::Pending),
        }
    }
}

pub struct DashScopeProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl DashScopeProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            client: super::http_client(settings.request_timeout)?,
            api_key: settings.api_key,
            model: settings.model,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl JobProvider for DashScopeProvider {
    async fn submit(&self, prompt: &str) -> Result<String, ProviderError> {
        let req = SynthesisRequest {
            model: self.model.clone(),
            input: SynthesisInput {
                prompt: prompt.to_string(),
            },
            parameters: SynthesisParameters::default(),
        };
        let response = self
            .client
            .post(format!(
                "{}/api/v1/services/aigc/text2image/image-synthesis",
                self.base_url
            ))
            .bearer_auth(&self.api_key)
            .header("X-DashScope-Async", "enable")
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(super::error_from_response(response).await);
        }

        let retry_after_ms = super::retry_after_ms(response.headers());
        let text = response.text().await?;
        let body: TaskEnvelope = serde_json::from_str(&text).map_err(|_| {
            if status.is_success() {
                ProviderError::InvalidResponse(text.clone())
            } else {
                ProviderError::ApiError {
                    status: status.as_u16(),
                    message: text.clone(),
                }
            }
        })?;

        // Quota errors sometimes arrive with a non-429 status.
        if body.is_throttled() {
            return Err(ProviderError::RateLimited { retry_after_ms });
        }
        if !status.is_success() {
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body.message.unwrap_or(text),
            });
        }

        body.output
            .and_then(|o| o.task_id)
            .ok_or_else(|| ProviderError::InvalidResponse("missing output.task_id".into()))
    }

    async fn poll(&self, remote_id: &str) -> Result<PollStatus, ProviderError> {
        let response = self
            .client
            .get(format!("{}/api/v1/tasks/{remote_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(super::error_from_response(response).await);
        }

        let body: TaskEnvelope = super::read_json(response).await?;
        body.into_status()
    }

    async fn fetch_result(&self, location: &str) -> Result<Vec<u8>, ProviderError> {
        super::download(&self.client, location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SUBMIT_PATH: &str = "/api/v1/services/aigc/text2image/image-synthesis";

    fn provider(server: &MockServer) -> DashScopeProvider {
        DashScopeProvider::new(ProviderSettings {
            api_key: "sk-test".into(),
            base_url: server.uri(),
            model: DEFAULT_MODEL.into(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn submit_returns_nested_task_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SUBMIT_PATH))
            .and(header("x-dashscope-async", "enable"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": {"task_id": "ds-42", "task_status": "PENDING"},
                "request_id": "r-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(provider(&server).submit("sketch").await.unwrap(), "ds-42");
    }

    #[tokio::test]
    async fn throttling_code_is_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SUBMIT_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": "Throttling.RateQuota",
                "message": "Requests rate limit exceeded"
            })))
            .mount(&server)
            .await;

        let err = provider(&server).submit("sketch").await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::RateLimited {
                retry_after_ms: None
            }
        ));
    }

    #[tokio::test]
    async fn invalid_parameter_is_not_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SUBMIT_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": "InvalidParameter",
                "message": "prompt too long"
            })))
            .mount(&server)
            .await;

        let err = provider(&server).submit("sketch").await.unwrap_err();
        match &err {
            ProviderError::ApiError { status, message } => {
                assert_eq!(*status, 400);
                assert_eq!(message, "prompt too long");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn poll_maps_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": {
                    "task_id": "ok",
                    "task_status": "SUCCEEDED",
                    "results": [{"url": "https://oss.example/a.png"}]
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/bad"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": {"task_id": "bad", "task_status": "FAILED", "message": "DataInspectionFailed"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/wait"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": {"task_id": "wait", "task_status": "RUNNING"}
            })))
            .mount(&server)
            .await;

        let p = provider(&server);
        assert_eq!(
            p.poll("ok").await.unwrap(),
            PollStatus::Succeeded {
                result_location: "https://oss.example/a.png".into()
            }
        );
        assert_eq!(
            p.poll("bad").await.unwrap(),
            PollStatus::Failed {
                message: "DataInspectionFailed".into()
            }
        );
        assert_eq!(p.poll("wait").await.unwrap(), PollStatus::Pending);
    }

    #[test]
    fn envelope_without_output_is_invalid() {
        let env: TaskEnvelope = serde_json::from_str(r#"{"code":"x"}"#).unwrap();
        assert!(matches!(
            env.into_status(),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn request_serializes_default_parameters() {
        let req = SynthesisRequest {
            model: DEFAULT_MODEL.into(),
            input: SynthesisInput {
                prompt: "hello".into(),
            },
            parameters: SynthesisParameters::default(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["input"]["prompt"], "hello");
        assert_eq!(json["parameters"]["n"], 1);
        assert_eq!(json["parameters"]["size"], "1024*1024");
    }
}
