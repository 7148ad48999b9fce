//! `frecon run` and `frecon validate`: config-driven fiscal reconciliation.

use std::path::{Path, PathBuf};

use clap::Subcommand;

use fiscal_io::{load_canonical, load_source, IoError, LoadWarning};
use fiscal_recon::{reasons_by_key, ReconConfig, ReconInput, ReconResult};

use crate::exit_codes::{EXIT_ERROR, EXIT_RECON_ALERTS, EXIT_RECON_INVALID_CONFIG, EXIT_RECON_RUNTIME};
use crate::CliError;

#[derive(Subcommand)]
pub enum ReconCommands {
    /// Reconcile the canonical XML set against every configured source
    #[command(after_help = "\
Examples:
  frecon run janeiro.toml
  frecon run janeiro.toml --json
  frecon run janeiro.toml --output result.json -v

Exit codes:
  0  every record reconciled
  3  alerts were produced
  4  invalid config
  5  a file could not be read or written")]
    Run {
        /// Path to the TOML config file
        config: PathBuf,

        /// Output JSON to stdout instead of the per-record listing
        #[arg(long)]
        json: bool,

        /// Write JSON output to file (overrides [output] json)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a config without loading any data
    #[command(after_help = "\
Examples:
  frecon validate janeiro.toml")]
    Validate {
        /// Path to the TOML config file
        config: PathBuf,
    },
}

pub fn cmd_recon(cmd: ReconCommands) -> Result<(), CliError> {
    match cmd {
        ReconCommands::Run { config, json, output } => cmd_recon_run(config, json, output),
        ReconCommands::Validate { config } => cmd_recon_validate(config),
    }
}

fn recon_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn read_config(config_path: &Path) -> Result<ReconConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot read config: {e}")))?;
    ReconConfig::from_toml(&config_str).map_err(|e| recon_err(EXIT_RECON_INVALID_CONFIG, e.to_string()))
}

fn load_err(label: &str, e: IoError) -> CliError {
    let err = recon_err(EXIT_RECON_RUNTIME, format!("{label}: {e}"));
    match e {
        IoError::MissingColumn { .. } => err.with_hint("name the header explicitly under [sources.columns]"),
        IoError::UnsupportedFormat(_) => {
            err.with_hint("expected .csv, .tsv, .txt, .xlsx, .xls, .ods, .xml, .zip or a directory")
        }
        _ => err,
    }
}

/// Load every supplied input. Paths are relative to the config file.
fn load_inputs(config: &ReconConfig, base_dir: &Path) -> Result<(ReconInput, Vec<LoadWarning>), CliError> {
    let mut input = ReconInput::default();
    let mut warnings = Vec::new();

    match &config.canonical.path {
        Some(path) => {
            let path = base_dir.join(path);
            let loaded = load_canonical(&path, &config.canonical.cancelled_prefixes)
                .map_err(|e| load_err("canonical", e))?;
            tracing::info!("canonical: {} documents from {}", loaded.rows.len(), path.display());
            warnings.extend(loaded.warnings);
            input.canonical = Some(loaded.rows);
        }
        None => tracing::warn!("no canonical path configured"),
    }

    for source in &config.sources {
        let Some(path) = &source.path else {
            continue;
        };
        let path = base_dir.join(path);
        let loaded = load_source(&path, &source.columns)
            .map_err(|e| load_err(&format!("source {}", source.name), e))?;
        tracing::info!("source {}: {} rows from {}", source.name, loaded.rows.len(), path.display());
        warnings.extend(loaded.warnings);
        input.sources.insert(source.name.clone(), loaded.rows);
    }

    Ok((input, warnings))
}

fn cmd_recon_run(config_path: PathBuf, json_output: bool, output_file: Option<PathBuf>) -> Result<(), CliError> {
    let config = read_config(&config_path)?;

    // Resolve file paths relative to config file's directory
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    let (input, warnings) = load_inputs(&config, base_dir)?;
    let result = fiscal_recon::run(&config, &input);

    // Output
    let json_str = serde_json::to_string_pretty(&result)
        .map_err(|e| recon_err(EXIT_ERROR, format!("JSON serialization error: {e}")))?;

    let output_path = output_file.or_else(|| config.output.json.as_ref().map(|p| base_dir.join(p)));
    if let Some(ref path) = output_path {
        std::fs::write(path, &json_str)
            .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    } else {
        print_alerts(&result);
    }

    print_summary(&result, warnings.len());

    if !result.is_clean() {
        let keys = result.metrics.total_records - result.metrics.reconciled_count;
        return Err(recon_err(
            EXIT_RECON_ALERTS,
            format!("{} alert(s) on {keys} record(s)", result.alerts.len()),
        ));
    }

    Ok(())
}

/// One line per alerted record, reasons joined.
fn print_alerts(result: &ReconResult) {
    for (key, reasons) in reasons_by_key(&result.alerts) {
        println!("{key}\t{reasons}");
    }
}

/// Human summary to stderr.
fn print_summary(result: &ReconResult, warning_count: usize) {
    let m = &result.metrics;
    eprintln!(
        "recon '{}': {} records: {} reconciled, {} divergent, {} alerts",
        result.meta.config_name,
        m.total_records,
        m.reconciled_count,
        m.divergent_count,
        result.alerts.len(),
    );

    for source in &result.meta.sources {
        let absent = m.absent_count.get(source).copied().unwrap_or(0);
        let multiple = m.multiple_count.get(source).copied().unwrap_or(0);
        eprintln!("  {source}: {absent} absent, {multiple} with multiple candidates");
    }

    if result.meta.cancelled_rows > 0 {
        eprintln!("  {} cancelled document(s) excluded", result.meta.cancelled_rows);
    }
    let dropped: usize = result.meta.dropped_rows.values().sum();
    if dropped > 0 {
        eprintln!("  {dropped} row(s) dropped for missing series/number");
    }
    if warning_count > 0 {
        eprintln!("  {warning_count} file(s) skipped (see warnings)");
    }
}

fn cmd_recon_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    eprintln!(
        "valid: recon '{}' with {} source(s): {}",
        config.name,
        config.sources.len(),
        config.source_names().join(", "),
    );
    Ok(())
}
