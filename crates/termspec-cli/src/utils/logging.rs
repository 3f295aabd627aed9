//! `tracing` subscriber setup, driven by the global `--verbose`/`--quiet` flags.
//!
//! Always writes to stderr (never stdout) so machine-readable command output
//! (`--format json`) stays parseable, matching `blz-cli`'s own
//! `initialize_logging`.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing_subscriber::fmt` subscriber whose level is derived
/// from `verbose`/`quiet`, falling back to `RUST_LOG` when set.
///
/// `machine_output` suppresses info-level logs even without `--quiet`, for
/// commands emitting JSON on stdout (spec.md section 9's ambient logging
/// note): a build run as `--format json` should not interleave progress
/// chatter with the JSON payload.
pub fn init(verbose: u8, quiet: bool, machine_output: bool) {
    let default_directive = if quiet || (machine_output && verbose == 0) {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}
