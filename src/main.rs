//! `dbt-reviewer` command-line entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use console::style;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use dbt_reviewer::config::ReportFormat;
use dbt_reviewer::optimize::OptimizationState;
use dbt_reviewer::review::Severity;
use dbt_reviewer::{provider, Config, RunOptions, RunResult, RunSummary};

/// Review (and optionally optimize) the dbt models in a directory.
#[derive(Parser, Debug)]
#[command(name = "dbt-reviewer", version)]
#[command(about = "Multi-agent review and optimization of dbt model files")]
struct Cli {
    /// Directory containing the model `.sql` files and their documentation
    #[arg(long)]
    models_dir: PathBuf,

    /// Also plan, apply and evaluate optimizations
    #[arg(long)]
    optimize: bool,

    /// Where review documents are written
    #[arg(long)]
    review_dir: Option<PathBuf>,

    /// Where optimized models and optimization reports are written
    #[arg(long)]
    optimization_dir: Option<PathBuf>,

    /// Artifacts reviewed concurrently per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Artifacts optimized concurrently per batch
    #[arg(long)]
    optimize_batch_size: Option<usize>,

    /// Config file (default: ~/.dbt-reviewer/config.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Report document format
    #[arg(long, value_enum)]
    format: Option<ReportFormat>,

    /// Debug-level logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(cli).await {
        Ok(summary) => {
            print_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {e}", style("error:").red().bold());
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("dbt_reviewer=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn execute(cli: Cli) -> RunResult<RunSummary> {
    let mut config = Config::load(cli.config.as_deref())?;

    if let Some(dir) = cli.review_dir {
        config.output.review_dir = dir;
    }
    if let Some(dir) = cli.optimization_dir {
        config.output.optimization_dir = dir;
    }
    if let Some(n) = cli.batch_size {
        config.review.batch_size = n;
    }
    if let Some(n) = cli.optimize_batch_size {
        config.optimize.batch_size = n;
    }
    if let Some(format) = cli.format {
        config.output.format = format;
    }
    config.expand_paths();
    config.validate()?;

    let completion = provider::from_config(&config.provider)?;
    tracing::info!(
        provider = completion.name(),
        model = %config.provider.model,
        "Using completion provider"
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current batch");
                cancel.cancel();
            }
        }
    });

    let options = RunOptions {
        models_dir: cli.models_dir,
        optimize: cli.optimize,
    };
    dbt_reviewer::run(&config, &options, completion, &cancel).await
}

// ── Console summary ──────────────────────────────────────────────

fn severity_cell(severity: Option<Severity>) -> String {
    let label = format!("{:<9}", severity.map_or("-", Severity::label));
    match severity {
        Some(Severity::Critical) => style(label).red().bold().to_string(),
        Some(Severity::High) => style(label).red().to_string(),
        Some(Severity::Medium) => style(label).yellow().to_string(),
        _ => style(label).dim().to_string(),
    }
}

fn print_summary(summary: &RunSummary) {
    let review = &summary.review;
    println!();
    println!("{}", style("Review summary").bold().underlined());
    println!(
        "  {} models in {} batch(es), {} findings",
        review.artifacts_reviewed, summary.review_batches, review.total_findings
    );
    for severity in Severity::ALL {
        println!("  {:<9} {}", severity.label(), review.count(severity));
    }
    println!();

    println!("  {:<32} {:>6}  {:<9}  Status", "Model", "Issues", "Highest");
    for tally in &review.artifacts {
        let status = if tally.degraded {
            style("degraded").yellow().to_string()
        } else {
            style("ok").green().to_string()
        };
        println!(
            "  {:<32} {:>6}  {}  {}",
            tally.artifact,
            tally.issues,
            severity_cell(tally.highest),
            status
        );
    }

    if !review.undocumented.is_empty() {
        println!();
        println!(
            "  {} {}",
            style("Missing documentation:").yellow(),
            review.undocumented.join(", ")
        );
    }
    for warning in &review.unmatched {
        println!("  {} {}", style("warning:").yellow(), warning.description);
    }

    if !summary.optimization.is_empty() {
        println!();
        println!("{}", style("Optimization summary").bold().underlined());
        println!("  {:<32} {:<14} Coverage", "Model", "Status");
        for result in &summary.optimization {
            let state = format!("{:<14}", result.state.label());
            let state = match result.state {
                OptimizationState::Evaluated => style(state).green(),
                OptimizationState::EvalSkipped => style(state).yellow(),
                _ => style(state).red(),
            };
            let coverage = result
                .score
                .as_ref()
                .map_or_else(|| "unscored".to_string(), |s| format!("{}%", s.percent()));
            println!("  {:<32} {} {}", result.artifact, state, coverage);
        }
        println!(
            "  {} evaluated, {} eval-skipped, {} apply-failed",
            summary.optimization_count(OptimizationState::Evaluated),
            summary.optimization_count(OptimizationState::EvalSkipped),
            summary.optimization_count(OptimizationState::ApplyFailed),
        );
    }

    println!();
    println!("  {} documents written", summary.documents_written);
    for failure in &summary.write_failures {
        println!(
            "  {} {}: {}",
            style("write failed:").red(),
            failure.path.display(),
            failure.reason
        );
    }
    if summary.cancelled {
        println!("  {}", style("Run cancelled; remaining batches were skipped").yellow());
    }
}
