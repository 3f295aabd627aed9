//! `termspec build` (spec.md section 6).

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use termspec_core::findings::Severity;
use termspec_core::pipeline::{self, BuildOptions};

use crate::cli::OutputFormat;

/// Runs the build pipeline and prints a summary in the requested format.
///
/// Returns the process exit code (spec.md section 6): `0` on success --
/// non-fatal findings are permitted and never change this, per spec.md
/// section 6's "0 on success (warnings permitted)" -- `2` on a fatal
/// pipeline error (manifest missing/invalid, output path unwritable).
pub async fn run(manifest: Option<PathBuf>, no_fetch: bool, format: OutputFormat, base_dir: &Path) -> Result<i32> {
    let now = Utc::now();
    let options = BuildOptions {
        base_dir: base_dir.to_path_buf(),
        manifest_path: manifest,
        no_fetch,
        timestamp: now.to_rfc3339(),
        unix_ms: now.timestamp_millis(),
        // spec.md section 4.13: "currentDate (author-local date formatted `DD Month YYYY`)".
        current_date: now.format("%d %B %Y").to_string(),
        write_output: true,
    };

    let report = match pipeline::build(&options).await {
        Ok(report) => report,
        Err(err) => {
            match format {
                OutputFormat::Text => eprintln!("{} {err}", "error:".red().bold()),
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "error": err.to_string(), "category": err.category() }));
                }
            }
            return Ok(2);
        }
    };

    match format {
        OutputFormat::Text => print_text_summary(&report),
        OutputFormat::Json => print_json_summary(&report)?,
    }

    Ok(0)
}

fn print_text_summary(report: &pipeline::BuildReport) {
    match &report.output_path {
        Some(path) => println!("{} wrote {}", "build:".green().bold(), path.display()),
        None => println!("{} no output written", "build:".green().bold()),
    }
    println!("{} {} reference(s) in store", "build:".green().bold(), report.reference_count);

    if report.findings.is_empty() {
        println!("{} no issues found", "build:".green().bold());
        return;
    }

    for finding in &report.findings {
        let label = match finding.severity {
            Severity::Info => "info".normal(),
            Severity::Warning => "warn".yellow().bold(),
            Severity::Error => "error".red().bold(),
        };
        println!("{label} [{}] {}", finding.operation, finding.message);
    }
}

fn print_json_summary(report: &pipeline::BuildReport) -> Result<()> {
    let summary = serde_json::json!({
        "outputPath": report.output_path,
        "referenceCount": report.reference_count,
        "findings": report.findings,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
