//! The `squish validate` command.

use clap::Args;
use squish_core::manifest::write_json_atomic;
use squish_core::{Config, OutputValidator, ValidationReport};
use std::path::PathBuf;
use std::process::ExitCode;

/// Arguments for the `validate` command.
#[derive(Args, Debug, Default)]
pub struct ValidateArgs {
    /// Directory to audit (defaults to the configured output directory)
    pub dir: Option<PathBuf>,

    /// Print the report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Also save the report as JSON to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

/// Execute the validate command. Exit code 1 when the report is FAIL.
///
/// The audited directory is never written to; the report is saved only
/// when `--report` names a destination.
pub async fn execute(args: ValidateArgs, config: &Config) -> anyhow::Result<ExitCode> {
    let root = args.dir.unwrap_or_else(|| config.output_dir());
    let validator = OutputValidator::new(
        config.optimization.max_file_size,
        &config.optimization.source_formats,
    );

    let report = {
        let root = root.clone();
        tokio::task::spawn_blocking(move || validator.validate(&root)).await?
    };

    if let Some(report_path) = &args.report {
        write_json_atomic(report_path, &report)?;
        tracing::info!("Validation report written to {:?}", report_path);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn print_report(report: &ValidationReport) {
    let summary = &report.summary;

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("          Validation: {:?}", report.status);
    eprintln!("  ====================================");
    eprintln!("    Total:        {:>8}", summary.total);
    eprintln!("    Valid:        {:>8}", summary.valid);
    eprintln!("    Oversized:    {:>8}", summary.oversized);
    eprintln!("    Unsupported:  {:>8}", summary.unsupported);
    eprintln!("    Pass rate:    {:>8}", summary.pass_rate);
    eprintln!("  ====================================");

    for image in &report.issues.oversized_images {
        eprintln!("    oversized: {} ({} > {})", image.path, image.size, image.limit);
    }
    for image in &report.issues.unsupported_formats {
        eprintln!("    unsupported: {} ({})", image.path, image.format);
    }
    for error in &report.issues.errors {
        eprintln!("    error: {error}");
    }

    eprintln!();
    for recommendation in &report.recommendations {
        eprintln!("  * {recommendation}");
    }
}
