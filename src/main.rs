use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use genjob::batch::BatchCoordinator;
use genjob::cli::{Cli, Command};
use genjob::client::JobClient;
use genjob::config::{GenConfig, ProviderKind};
use genjob::provider::{DashScopeProvider, JobProvider, ModelScopeProvider};
use genjob::rate_limiter::RateLimiter;
use genjob::ui::{BatchProgress, JobProgress, print_summary};
use genjob::{logging, manifest};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = GenConfig::load(cli.config.as_deref()).context("loading configuration")?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    let settings = config.provider_settings()?;
    debug!(provider = ?config.provider, model = %settings.model, base_url = %settings.base_url, "provider selected");

    let succeeded = match config.provider {
        ProviderKind::ModelScope => {
            run(Arc::new(ModelScopeProvider::new(settings)?), &cli.command, &config).await?
        }
        ProviderKind::DashScope => {
            run(Arc::new(DashScopeProvider::new(settings)?), &cli.command, &config).await?
        }
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run<P: JobProvider + 'static>(
    provider: Arc<P>,
    command: &Command,
    config: &GenConfig,
) -> anyhow::Result<bool> {
    match command {
        Command::Gen { prompt, output } => {
            let limiter = Arc::new(RateLimiter::new(config.rate_limit));
            let client = JobClient::new(provider, limiter, config.job_settings());

            let progress = JobProgress::start(prompt);
            let mut job = client.new_job(prompt.as_str(), output.as_path());
            let report = client.run(&mut job).await;
            progress.complete(&report);
            if !report.success() {
                progress.print_report(&report);
            }
            Ok(report.success())
        }
        Command::Batch {
            file,
            output_dir,
            skip_existing,
            report,
            ..
        } => {
            let jobs = manifest::load_batch(file, output_dir)
                .with_context(|| format!("reading batch file {}", file.display()))?;
            if jobs.is_empty() {
                info!(file = %file.display(), "batch file has no jobs");
                return Ok(true);
            }

            let mut options = config.batch_options();
            options.skip_existing = *skip_existing;

            let progress = Arc::new(BatchProgress::new(jobs.len()));
            let result = BatchCoordinator::new(provider, config.job_settings())
                .with_observer(progress.clone())
                .run_batch(jobs, &options)
                .await;
            progress.finish();
            print_summary(&result);

            if let Some(path) = report {
                result
                    .write_json(path)
                    .await
                    .with_context(|| format!("writing report {}", path.display()))?;
                info!(path = %path.display(), "batch report written");
            }
            Ok(result.succeeded_count() == result.len())
        }
    }
}
