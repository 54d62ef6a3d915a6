//! `rentkit`: run rental desk operation scripts.

mod runner;
mod script;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use rentkit_infra::{DeskConfig, RentalDesk};
use rentkit_observability::{LogFormat, TracingConfig};

use crate::runner::Runner;
use crate::script::Script;

#[derive(Debug, Parser)]
#[command(name = "rentkit", version, about = "Rental inventory desk")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log line format (logs go to stderr).
    #[arg(long, value_enum, default_value_t = LogFormatArg::Json, global = true)]
    log_format: LogFormatArg,

    /// Overrides RENTKIT_LOW_STOCK_THRESHOLD.
    #[arg(long, global = true)]
    low_stock_threshold: Option<i64>,

    /// Overrides RENTKIT_ENFORCE_BUNDLE_STOCK.
    #[arg(long, global = true)]
    enforce_bundle_stock: Option<bool>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a script against a fresh in-memory desk and print the reports.
    Run { script: PathBuf },
    /// Parse and validate a script without running it.
    Check { script: PathBuf },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Json,
    Pretty,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Pretty => LogFormat::Pretty,
        }
    }
}

impl Cli {
    fn desk_config(&self) -> DeskConfig {
        let mut config = DeskConfig::from_env();
        if let Some(threshold) = self.low_stock_threshold {
            config.low_stock_threshold = threshold;
        }
        if let Some(enforce) = self.enforce_bundle_stock {
            config.enforce_bundle_stock = enforce;
        }
        config
    }
}

fn load_script(path: &Path) -> anyhow::Result<Script> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Script::parse(&json).with_context(|| format!("loading {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    rentkit_observability::tracing::init(&TracingConfig {
        format: cli.log_format.into(),
        ..TracingConfig::default()
    });

    match &cli.command {
        Command::Check { script } => {
            let parsed = load_script(script)?;
            println!("{}: {} steps ok", script.display(), parsed.len());
        }
        Command::Run { script } => {
            let parsed = load_script(script)?;
            let config = cli.desk_config();
            tracing::info!(
                steps = parsed.len(),
                low_stock_threshold = config.low_stock_threshold,
                enforce_bundle_stock = config.enforce_bundle_stock,
                "running script"
            );

            let desk = RentalDesk::new(config);
            let reports = Runner::new(&desk)
                .run(&parsed)
                .with_context(|| format!("running {}", script.display()))?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "rentkit",
            "run",
            "script.json",
            "--low-stock-threshold",
            "7",
            "--enforce-bundle-stock",
            "false",
        ]);
        let config = cli.desk_config();
        assert_eq!(config.low_stock_threshold, 7);
        assert!(!config.enforce_bundle_stock);
    }
}
