//! Interface de terminal do genjob: spinners, barra de lote e saída colorida.
//!
//! Usa `indicatif` para o progresso e `console` para estilização com cores.
//! [`JobProgress`] acompanha um único job; [`BatchProgress`] recebe as
//! notificações do coordenador de lote como [`BatchObserver`].

use std::path::Path;
use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::batch::{BatchObserver, BatchResult, JobOutcome};
use crate::state_machine::{JobReport, JobStatus};

fn styled(template: &str, fallback: ProgressStyle) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or(fallback)
}

/// Spinner para a execução de um único job (`genjob gen`).
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
}

impl JobProgress {
    /// Inicia o spinner com a descrição do job.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(styled(
            "{spinner:.cyan} {msg} [{elapsed}]",
            ProgressStyle::default_spinner(),
        ));
        pb.set_message(format!("generating: {description}"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    /// Finaliza o spinner e exibe o resultado do job.
    pub fn complete(&self, report: &JobReport) {
        self.pb.finish_and_clear();
        if report.success() {
            println!(
                "  {} {} ({:.1}s)",
                self.green.apply_to("✓"),
                report.output.display(),
                report.elapsed_ms as f64 / 1000.0
            );
        } else {
            println!(
                "  {} {}: {}",
                self.red.apply_to("✗"),
                report.status,
                report.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    /// Imprime o relatório do job em JSON.
    pub fn print_report(&self, report: &JobReport) {
        let yellow = Style::new().yellow();
        let style = match report.status {
            JobStatus::Succeeded => &self.green,
            JobStatus::Failed | JobStatus::TimedOut => &self.red,
            _ => &yellow,
        };
        println!();
        println!("{}", style.apply_to("─── Job Report ───"));
        println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
    }
}

/// Barra de progresso do lote, alimentada pelos workers.
pub struct BatchProgress {
    pb: ProgressBar,
    red: Style,
    dim: Style,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            styled(
                "{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg} [{elapsed}]",
                ProgressStyle::default_bar(),
            )
            .progress_chars("=> "),
        );
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            red: Style::new().red(),
            dim: Style::new().dim(),
        }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl BatchObserver for BatchProgress {
    fn job_finished(&self, output: &Path, outcome: &JobOutcome, done: usize, _total: usize) {
        self.pb.set_position(done as u64);
        if outcome.skipped {
            self.pb.println(format!(
                "  {} {} (exists)",
                self.dim.apply_to("-"),
                output.display()
            ));
        } else if !outcome.success() {
            self.pb.println(format!(
                "  {} {}: {}",
                self.red.apply_to("✗"),
                output.display(),
                outcome.error.as_deref().unwrap_or("unknown error")
            ));
        }
        self.pb.set_message(output.display().to_string());
    }
}

/// Resumo final do lote: contagem e lista das saídas que falharam.
pub fn print_summary(result: &BatchResult) {
    let green = Style::new().green().bold();
    let red = Style::new().red().bold();

    let succeeded = result.succeeded_count();
    let total = result.len();
    let headline = format!("{succeeded}/{total} succeeded");
    if succeeded == total {
        println!("{}", green.apply_to(headline));
        return;
    }

    println!("{}", red.apply_to(headline));
    for (output, outcome) in result.failed() {
        println!(
            "  {} {} [{}] {}",
            red.apply_to("✗"),
            output.display(),
            outcome.status,
            outcome.error.as_deref().unwrap_or_default()
        );
    }
}
