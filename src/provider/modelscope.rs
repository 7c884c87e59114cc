//! Cliente para a API de inferência assíncrona do ModelScope.
//!
//! O envio usa `X-ModelScope-Async-Mode: true` e devolve um `task_id`;
//! o status é consultado em `v1/tasks/{id}` até `SUCCEED` ou `FAILED`.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{JobProvider, PollStatus, ProviderError, ProviderSettings};

pub const DEFAULT_BASE_URL: &str = "https://api-inference.modelscope.cn";
pub const DEFAULT_MODEL: &str = "Tongyi-MAI/Z-Image-Turbo";

/// Corpo da requisição para `v1/images/generations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
}

/// Resposta do envio assíncrono: apenas o identificador da tarefa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub task_id: String,
}

/// Resposta de `v1/tasks/{id}`.
///
/// `task_status` é `SUCCEED`, `FAILED` ou algum estado intermediário
/// (`PENDING`, `RUNNING`, `PROCESSING`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_status: String,
    #[serde(default)]
    pub output_images: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl TaskResponse {
    fn into_status(self) -> Result<PollStatus, ProviderError> {
        match self.task_status.as_str() {
            "SUCCEED" => {
                let result_location = self.output_images.into_iter().next().ok_or_else(|| {
                    ProviderError::InvalidResponse("SUCCEED without output_images".into())
                })?;
                Ok(PollStatus::Succeeded { result_location })
            }
            "FAILED" => Ok(PollStatus::Failed {
                message: self.message.unwrap_or_else(|| "unknown error".to_string()),
            }),
            _ => Ok(PollStatus::Pending),
        }
    }
}

pub struct ModelScopeProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl ModelScopeProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            client: super::http_client(settings.request_timeout)?,
            api_key: settings.api_key,
            model: settings.model,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl JobProvider for ModelScopeProvider {
    async fn submit(&self, prompt: &str) -> Result<String, ProviderError> {
        let req = GenerationRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
        };
        let response = self
            .client
            .post(format!("{}/v1/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .header("X-ModelScope-Async-Mode", "true")
            .json(&req)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(super::error_from_response(response).await);
        }

        let body: GenerationResponse = super::read_json(response).await?;
        Ok(body.task_id)
    }

    async fn poll(&self, remote_id: &str) -> Result<PollStatus, ProviderError> {
        let response = self
            .client
            .get(format!("{}/v1/tasks/{remote_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .header("X-ModelScope-Task-Type", "image_generation")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(super::error_from_response(response).await);
        }

        let body: TaskResponse = super::read_json(response).await?;
        body.into_status()
    }

    async fn fetch_result(&self, location: &str) -> Result<Vec<u8>, ProviderError> {
        super::download(&self.client, location).await
    }
}
