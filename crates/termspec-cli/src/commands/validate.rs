//! `termspec validate` (spec.md section 6).

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use termspec_core::findings::Severity;
use termspec_core::pipeline::{self, BuildOptions};

/// Runs the pipeline through rendering and validation only -- no remote
/// fetches, no output written -- and prints every recorded finding.
///
/// Returns `1` if any warning- or error-severity findings were recorded, `0`
/// otherwise, and `2` on a fatal pipeline error.
pub async fn run(manifest: Option<PathBuf>, base_dir: &Path) -> Result<i32> {
    let now = Utc::now();
    let options = BuildOptions {
        base_dir: base_dir.to_path_buf(),
        manifest_path: manifest,
        no_fetch: true,
        timestamp: now.to_rfc3339(),
        unix_ms: now.timestamp_millis(),
        current_date: now.format("%d %B %Y").to_string(),
        write_output: false,
    };

    let findings = match pipeline::validate_only(&options).await {
        Ok(findings) => findings,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            return Ok(2);
        }
    };

    if findings.is_empty() {
        println!("{} no issues found", "validate:".green().bold());
        return Ok(0);
    }

    let mut has_problems = false;
    for finding in &findings {
        has_problems |= matches!(finding.severity, Severity::Warning | Severity::Error);
        let label = match finding.severity {
            Severity::Info => "info".normal(),
            Severity::Warning => "warn".yellow().bold(),
            Severity::Error => "error".red().bold(),
        };
        println!("{label} [{}] {}", finding.operation, finding.message);
    }

    Ok(i32::from(has_problems))
}
