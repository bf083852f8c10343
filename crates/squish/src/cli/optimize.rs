//! The `squish optimize` command.

use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use squish_core::pipeline::Toolchain;
use squish_core::units::{format_bytes, format_duration};
use squish_core::{Backend, Config, FileStatus, Optimizer, RunEvent, RunOptions, RunReport};
use std::process::ExitCode;

/// Arguments for the `optimize` command.
#[derive(Args, Debug, Default)]
pub struct OptimizeArgs {
    /// Copy originals into the backup directory before processing
    #[arg(long)]
    pub backup: bool,

    /// Generate responsive thumbnail widths
    #[arg(long)]
    pub thumbnails: bool,

    /// Images processed concurrently per batch (overrides config)
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Skip images already listed in the previous manifest
    #[arg(long)]
    pub skip_existing: bool,

    /// Encoder backend (overrides config)
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,
}

/// Encoder backend choice on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum BackendArg {
    /// In-process libwebp
    Native,
    /// cwebp, identify, and convert subprocesses
    External,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Native => Backend::Native,
            BackendArg::External => Backend::External,
        }
    }
}

/// Execute the optimize command.
///
/// Per-file failures are reported but never change the exit code; only
/// setup failures (missing tools, unwritable directories) do.
pub async fn execute(args: OptimizeArgs, mut config: Config) -> anyhow::Result<ExitCode> {
    if args.concurrency == Some(0) {
        anyhow::bail!("--concurrency must be at least 1");
    }
    if let Some(backend) = args.backend {
        config.codec.backend = backend.into();
    }

    tracing::info!(
        "Optimizing {} -> {} (cap {}, {} backend)",
        config.source_dir().display(),
        config.output_dir().display(),
        format_bytes(config.optimization.max_file_size),
        config.codec.backend
    );

    let toolchain = Toolchain::from_config(&config).await?;
    let mut optimizer = Optimizer::new(config, toolchain);

    let options = RunOptions {
        backup: args.backup,
        thumbnails: args.thumbnails,
        concurrency: args.concurrency,
        skip_existing: args.skip_existing,
    };

    let progress = create_progress_bar();
    let bar = progress.clone();
    let report = optimizer
        .run_with_progress(options, move |event| match event {
            RunEvent::Discovered(total) => bar.set_length(total as u64),
            RunEvent::FileFinished { name, status } => {
                bar.inc(1);
                if status == FileStatus::Failed {
                    bar.println(format!("  failed: {name}"));
                }
                bar.set_message(name);
            }
            RunEvent::State(state) => tracing::debug!("State: {state}"),
        })
        .await;
    progress.finish_and_clear();

    let report = report?;
    print_summary(&report);
    Ok(ExitCode::SUCCESS)
}

/// Create a progress bar; its length is set once discovery finishes.
fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb.set_message("discovering...");
    pb
}

/// Print the run summary, then every error and warning.
fn print_summary(report: &RunReport) {
    let stats = &report.statistics;

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("          Optimization Summary");
    eprintln!("  ====================================");
    eprintln!("    Processed:    {:>10}", stats.processed);
    eprintln!("    Optimized:    {:>10}", stats.optimized);
    if stats.failed > 0 {
        eprintln!("    Failed:       {:>10}", stats.failed);
    }
    if stats.duplicates_found > 0 {
        eprintln!("    Duplicates:   {:>10}", stats.duplicates_found);
    }
    if stats.skipped > 0 {
        eprintln!("    Skipped:      {:>10}", stats.skipped);
    }
    if stats.thumbnails_generated > 0 {
        eprintln!("    Thumbnails:   {:>10}", stats.thumbnails_generated);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Before:       {:>10}", format_bytes(stats.total_size_before));
    eprintln!("    After:        {:>10}", format_bytes(stats.total_size_after));
    eprintln!("    Saved:        {:>10}", format_bytes(stats.bytes_saved()));
    eprintln!("    Compression:  {:>9.2}%", stats.compression_ratio());
    eprintln!("    Duration:     {:>10}", format_duration(stats.elapsed));
    eprintln!("  ====================================");

    if !stats.errors.is_empty() {
        eprintln!();
        eprintln!("  Errors:");
        for error in &stats.errors {
            eprintln!("    - {error}");
        }
    }
    if !stats.warnings.is_empty() {
        eprintln!();
        eprintln!("  Warnings:");
        for warning in &stats.warnings {
            eprintln!("    - {warning}");
        }
    }

    eprintln!();
    eprintln!("  Manifest: {}", report.manifest_path.display());
}
