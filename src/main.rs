//! `consolidate-cashflows`: one full consolidation run.
//!
//! ```bash
//! # Standard OneDrive layout under the home directory
//! consolidate-cashflows
//!
//! # Explicit paths
//! consolidate-cashflows --config cashflows.json --verbose
//! ```

use anyhow::{Context, Result};
use cashflow_consolidator::{CashflowConfig, CashflowProcessor};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "consolidate-cashflows")]
#[command(about = "Consolidate bond, note and letter cashflows into the Cashflows workbook")]
#[command(version)]
struct Cli {
    /// JSON run configuration; defaults to the standard OneDrive layout
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log every schedule read
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &cli.config {
        Some(path) => CashflowConfig::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => CashflowConfig::default_for_home()?,
    };

    let summary = CashflowProcessor::run(&config).context("consolidation failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
