use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use crashclean_core::{CleanReport, CleaningConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const POLICY_ENV: &str = "CRASHCLEAN_POLICY";

#[derive(Parser, Debug)]
#[command(author, version, about = "Clean collision CSV exports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge crash date and time, fill missing values, write the cleaned CSV
    Clean(CleanArgs),
    /// Print the effective cleaning policy as TOML
    Policy(PolicyArgs),
}

#[derive(Args, Debug, Default)]
struct CleanArgs {
    /// Policy file (defaults to $CRASHCLEAN_POLICY, then the built-in NYC policy)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the input CSV path
    #[arg(long)]
    input: Option<PathBuf>,
    /// Override the output CSV path
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct PolicyArgs {
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(None))
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Clean(args) => {
            let config = resolve_config(args.config, policy_from_env())?
                .with_paths(args.input, args.output);
            info!(
                input = %config.input_path.display(),
                output = %config.output_path.display(),
                "Reading file"
            );
            let report = crashclean_core::run(&config).with_context(|| {
                format!("cleaning {} failed", config.input_path.display())
            })?;
            println!("{}", summary_table(&report));
            Ok(())
        }
        Command::Policy(args) => {
            let config = resolve_config(args.config, policy_from_env())?;
            let rendered = config
                .to_toml_string()
                .context("failed to render policy as TOML")?;
            print!("{rendered}");
            Ok(())
        }
    }
}

/// Load `.env` (or the given file) first so a `RUST_LOG` set there reaches the filter.
fn log_filter(env_file: Option<&Path>) -> EnvFilter {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path).ok();
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    EnvFilter::from_default_env()
}

fn policy_from_env() -> Option<PathBuf> {
    std::env::var_os(POLICY_ENV).map(PathBuf::from)
}

/// The `--config` flag wins over the environment; with neither, the built-in policy applies.
fn resolve_config(flag: Option<PathBuf>, env: Option<PathBuf>) -> Result<CleaningConfig> {
    match flag.or(env) {
        Some(path) => load_policy(&path),
        None => {
            let config = CleaningConfig::nyc_collisions();
            config.validate().context("built-in policy is invalid")?;
            Ok(config)
        }
    }
}

fn load_policy(path: &Path) -> Result<CleaningConfig> {
    CleaningConfig::load(path)
        .with_context(|| format!("failed to load policy {}", path.display()))
}

fn summary_table(report: &CleanReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Column", "Filled"]);
    for (column, filled) in &report.fill.filled {
        table.add_row(vec![column.clone(), filled.to_string()]);
    }
    table.add_row(vec!["total".to_string(), report.fill.total().to_string()]);
    table
}
