use std::env;

use clap::Parser;

use termspec_cli::cli::{Cli, Command, OutputFormat};
use termspec_cli::commands::{build, clean_cache, validate};
use termspec_cli::utils::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let machine_output = matches!(
        &cli.command,
        Command::Build { format: OutputFormat::Json, .. }
    );
    logging::init(cli.verbose, cli.quiet, machine_output);

    let base_dir = env::current_dir()?;

    let exit_code = match cli.command {
        Command::Build { manifest, no_fetch, format } => {
            build::run(manifest, no_fetch, format, &base_dir).await?
        }
        Command::Validate { manifest } => validate::run(manifest, &base_dir).await?,
        Command::CleanCache { manifest } => clean_cache::run(manifest, &base_dir)?,
    };

    std::process::exit(exit_code);
}
