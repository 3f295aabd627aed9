//! Command-line surface (spec.md section 6).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Builds a self-contained HTML specification document with cross-document
/// terminology resolution.
#[derive(Debug, Parser)]
#[command(name = "termspec", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increases log verbosity; repeat for more detail (`-v`, `-vv`).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppresses all but warning and error logs.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Output format for the `build` subcommand's summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable, colorized text.
    Text,
    /// Machine-readable JSON on stdout.
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Builds the HTML specification document.
    Build {
        /// Directory containing `specs.json`; defaults to the current directory.
        #[arg(long, value_name = "PATH")]
        manifest: Option<PathBuf>,

        /// Skips contacting external specifications; uses only the cached store.
        #[arg(long)]
        no_fetch: bool,

        /// Output format for the build summary.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Runs the full pipeline without fetching remotes or writing output,
    /// reporting findings only.
    Validate {
        /// Directory containing `specs.json`; defaults to the current directory.
        #[arg(long, value_name = "PATH")]
        manifest: Option<PathBuf>,
    },
    /// Deletes the persisted reference store and history snapshots.
    CleanCache {
        /// Directory containing `specs.json`; defaults to the current directory.
        #[arg(long, value_name = "PATH")]
        manifest: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_defaults_to_text_format_and_fetches() {
        let cli = Cli::parse_from(["termspec", "build"]);
        match cli.command {
            Command::Build { no_fetch, format, manifest } => {
                assert!(!no_fetch);
                assert_eq!(format, OutputFormat::Text);
                assert!(manifest.is_none());
            }
            _ => panic!("expected Build"),
        }
    }

    #[test]
    fn verbose_and_quiet_are_mutually_exclusive() {
        let result = Cli::try_parse_from(["termspec", "-v", "-q", "build"]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_json_format_flag() {
        let cli = Cli::parse_from(["termspec", "build", "--format", "json"]);
        match cli.command {
            Command::Build { format, .. } => assert_eq!(format, OutputFormat::Json),
            _ => panic!("expected Build"),
        }
    }
}
