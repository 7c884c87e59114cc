use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum GenError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("No API key configured. Set {0} or `api_key` in genjob.toml.")]
    MissingApiKey(&'static str),

    #[error("Batch file line {line}: {reason}")]
    Manifest { line: usize, reason: String },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T, E = GenError> = std::result::Result<T, E>;
