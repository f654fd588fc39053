use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use covhtml::cli::{cmd_generate, Style};
use covhtml::engine::Invocation;

/// covhtml: render LCOV trace files as a static HTML coverage report.
#[derive(Parser)]
#[command(name = "covhtml", version, about)]
struct Cli {
    /// Trace files to merge into one report.
    #[arg(required = true)]
    trace_files: Vec<PathBuf>,

    /// Directory to write the report into (created if missing).
    #[arg(short, long)]
    output_directory: PathBuf,

    /// Configuration file (default: $HOME/.lcovrc if present).
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// Leave the generation time out of the pages.
    #[arg(long)]
    no_timestamp: bool,

    /// How to print the closing summary.
    #[arg(long, value_enum, default_value_t = Style::Text)]
    format: Style,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Log progress; repeat for debug output.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(quiet: bool, verbose: u8) {
    let default = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let timestamp = (!cli.no_timestamp)
        .then(|| chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string());

    let invocation = Invocation {
        trace_files: cli.trace_files,
        output_dir: cli.output_directory,
        config_path: cli.config_file,
        timestamp,
    };

    let out = cmd_generate(&invocation, cli.format)?;
    if !cli.quiet || matches!(cli.format, Style::Json) {
        print!("{out}");
    }
    Ok(())
}
