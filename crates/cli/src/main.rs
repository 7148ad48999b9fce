// frecon - reconcile NF-e XML sets against ERP and fiscal-system exports

mod exit_codes;
mod recon;

use std::io::IsTerminal;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use exit_codes::EXIT_SUCCESS;
use recon::ReconCommands;

#[derive(Parser)]
#[command(name = "frecon")]
#[command(about = "Fiscal document reconciliation (NF-e vs. secondary systems)")]
#[command(version)]
#[command(long_version = long_version())]
struct Cli {
    #[command(subcommand)]
    command: ReconCommands,

    /// More diagnostics on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Log filter (error, warn, info, debug, trace, off, or `fiscal_io=debug`); overrides -v
    #[arg(long, env = "FRECON_LOG", global = true)]
    log_level: Option<String>,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        "\ncommit: ",
        env!("FRECON_COMMIT"),
        "\ntarget: ",
        env!("FRECON_TARGET"),
    )
}

/// Filter directive from `--log-level`/`FRECON_LOG`, else from the `-v` count.
fn log_filter(explicit: Option<&str>, verbose: u8) -> String {
    match explicit.map(str::trim) {
        Some(directive) if !directive.is_empty() => directive.to_string(),
        _ => match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
        .to_string(),
    }
}

fn init_logging(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal())
                .with_target(false)
                .without_time(),
        )
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(&log_filter(cli.log_level.as_deref(), cli.verbose));

    match recon::cmd_recon(cli.command) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
