//! Configuração do genjob carregada a partir de `genjob.toml`.
//!
//! A struct [`GenConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `MODELSCOPE_API_KEY` / `DASHSCOPE_API_KEY`
//! têm precedência sobre o arquivo, conforme o provedor escolhido.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::BatchOptions;
use crate::client::JobSettings;
use crate::error::{GenError, Result};
use crate::provider::{ProviderSettings, dashscope, modelscope};
use crate::retry::RetryPolicy;

pub const CONFIG_FILE: &str = "genjob.toml";

/// Provedor remoto de geração.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    ModelScope,
    DashScope,
}

impl ProviderKind {
    /// Variável de ambiente com a chave da API deste provedor.
    pub fn api_key_env(self) -> &'static str {
        match self {
            ProviderKind::ModelScope => "MODELSCOPE_API_KEY",
            ProviderKind::DashScope => "DASHSCOPE_API_KEY",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::ModelScope => modelscope::DEFAULT_BASE_URL,
            ProviderKind::DashScope => dashscope::DEFAULT_BASE_URL,
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            ProviderKind::ModelScope => modelscope::DEFAULT_MODEL,
            ProviderKind::DashScope => dashscope::DEFAULT_MODEL,
        }
    }
}

/// Configuração de nível superior carregada de `genjob.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenConfig {
    /// Provedor remoto a usar.
    #[serde(default)]
    pub provider: ProviderKind,

    /// Chave da API do provedor.
    #[serde(default)]
    pub api_key: String,

    /// URL base da API; `None` usa o padrão do provedor.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Identificador do modelo; `None` usa o padrão do provedor.
    #[serde(default)]
    pub model: Option<String>,

    /// Número de workers concorrentes em um lote.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Limite de envios por segundo, compartilhado por todos os workers.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,

    /// Intervalo entre consultas de status, em milissegundos.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Tempo máximo de um job desde o primeiro envio, em segundos.
    #[serde(default = "default_max_poll_duration_secs")]
    pub max_poll_duration_secs: u64,

    /// Timeout de cada requisição HTTP, em segundos.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Política de retentativas para envios.
    #[serde(default)]
    pub retry: RetryPolicy,
}

// Valor padrão de workers: 3.
fn default_workers() -> usize {
    3
}

// Valor padrão do limite de taxa: 2 requisições por segundo.
fn default_rate_limit() -> f64 {
    2.0
}

fn default_poll_interval_ms() -> u64 {
    3000
}

// Dez minutos.
fn default_max_poll_duration_secs() -> u64 {
    600
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            api_key: String::new(),
            base_url: None,
            model: None,
            workers: default_workers(),
            rate_limit: default_rate_limit(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_duration_secs: default_max_poll_duration_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

impl GenConfig {
    /// Carrega `genjob.toml` do diretório atual, ou o caminho informado.
    /// Usa valores padrão se o arquivo padrão não existir; um caminho
    /// explícito inexistente é erro.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::from_file(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<GenConfig>(&contents)?)
    }

    /// Variável de ambiente tem precedência sobre o arquivo para a chave API.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(self.provider.api_key_env())
            && !key.is_empty()
        {
            self.api_key = key;
        }
    }

    /// Troca o provedor. A chave atual pertence ao provedor anterior, então
    /// é descartada e a variável de ambiente do novo provedor é consultada.
    pub fn switch_provider(&mut self, provider: ProviderKind) {
        if provider == self.provider {
            return;
        }
        self.provider = provider;
        self.api_key.clear();
        self.apply_env();
    }

    /// Rejeita combinações que tornariam o cliente inutilizável.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(GenError::Config("workers must be at least 1".into()));
        }
        if !(self.rate_limit.is_finite() && self.rate_limit > 0.0) {
            return Err(GenError::Config(format!(
                "rate_limit must be a positive number, got {}",
                self.rate_limit
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(GenError::Config("poll_interval_ms must be positive".into()));
        }
        let base = self.retry.exponential_base;
        if base.is_nan() || base < 1.0 {
            return Err(GenError::Config(format!(
                "retry.exponential_base must be >= 1, got {base}"
            )));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(GenError::Config(
                "retry.initial_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            retry: self.retry.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_poll_duration: Duration::from_secs(self.max_poll_duration_secs),
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            workers: self.workers,
            rate_limit: self.rate_limit,
            skip_existing: false,
        }
    }

    /// Parâmetros de conexão; falha se nenhuma chave foi configurada.
    pub fn provider_settings(&self) -> Result<ProviderSettings> {
        if self.api_key.is_empty() {
            return Err(GenError::MissingApiKey(self.provider.api_key_env()));
        }
        Ok(ProviderSettings {
            api_key: self.api_key.clone(),
            base_url: self
                .base_url
                .clone()
                .unwrap_or_else(|| self.provider.default_base_url().to_string()),
            model: self
                .model
                .clone()
                .unwrap_or_else(|| self.provider.default_model().to_string()),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }
}
