//! Interface de linha de comando do genjob baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (gen, batch)
//! e flags globais (--config, --provider, --model, --max-retries, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{GenConfig, ProviderKind};

/// genjob: geração assíncrona em lote contra APIs de jobs remotos.
#[derive(Debug, Parser)]
#[command(name = "genjob", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./genjob.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Provedor remoto a usar nesta execução.
    #[arg(long, global = true)]
    pub provider: Option<ProviderArg>,

    /// Identificador do modelo no provedor.
    #[arg(long, short, global = true)]
    pub model: Option<String>,

    /// Número máximo de retentativas de envio.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Provedor aceito pela CLI, mapeado para [`ProviderKind`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProviderArg {
    /// ModelScope (Z-Image-Turbo por padrão).
    Modelscope,
    /// DashScope (wanx por padrão).
    Dashscope,
}

impl From<ProviderArg> for ProviderKind {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Modelscope => ProviderKind::ModelScope,
            ProviderArg::Dashscope => ProviderKind::DashScope,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Gera um único artefato a partir de um prompt.
    Gen {
        /// Prompt enviado ao provedor.
        prompt: String,

        /// Caminho do arquivo de saída.
        #[arg(long, short, default_value = "output/image.jpg")]
        output: PathBuf,
    },

    /// Gera vários artefatos a partir de um arquivo de prompts.
    Batch {
        /// Arquivo com um job por linha (`prompt` ou `prompt|saida`).
        file: PathBuf,

        /// Diretório base das saídas.
        #[arg(long, short, default_value = "output/images")]
        output_dir: PathBuf,

        /// Número de workers concorrentes.
        #[arg(long, short)]
        workers: Option<usize>,

        /// Limite de envios por segundo.
        #[arg(long, short)]
        rate: Option<f64>,

        /// Pula saídas que já existem e não estão vazias.
        #[arg(long, default_value_t = false)]
        skip_existing: bool,

        /// Grava o resultado do lote em JSON neste caminho.
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

impl Cli {
    /// Aplica as flags globais sobre a configuração carregada do arquivo.
    pub fn apply_overrides(&self, config: &mut GenConfig) {
        if let Some(provider) = self.provider {
            config.switch_provider(provider.into());
        }
        if let Some(model) = &self.model {
            config.model = Some(model.clone());
        }
        if let Some(max_retries) = self.max_retries {
            config.retry.max_retries = max_retries;
        }
        if let Command::Batch { workers, rate, .. } = &self.command {
            if let Some(workers) = workers {
                config.workers = *workers;
            }
            if let Some(rate) = rate {
                config.rate_limit = *rate;
            }
        }
    }
}
