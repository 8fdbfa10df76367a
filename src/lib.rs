//! # Cashflow Consolidator
//!
//! Reads four fixed-income source workbooks (sovereign dollar bonds, corporate
//! dollar notes, peso letters, peso bonds), extracts a TIR table and the
//! per-instrument cashflow schedules from each, classifies every instrument,
//! and writes two normalized tables into a copy of a formatted template.
//!
//! ## Core Concepts
//!
//! - **Universe**: the tickers listed in a source's `TIR` (or `LECAPS`) sheet.
//!   Every universe ticker must produce cashflow rows.
//! - **Schedule sheet**: one sheet per ticker with a dated coupon/amortization
//!   table; missing interest is rebuilt on an ACT/360 basis.
//! - **Letter-style table**: flat `Ticker, Emisión, Vencimiento, Monto al Vto`
//!   table expanded into an issue row and a maturity row per instrument.
//! - **Flow invariant**: `flow == interest + amortization` on every schedule row.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cashflow_consolidator::*;
//!
//! let config = CashflowConfig::default_for_home()?;
//! let summary = run_consolidation(&config)?;
//! println!("{} rows written to {}", summary.total_rows, summary.output.display());
//! ```

pub mod cell;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod letters;
pub mod named_range;
pub mod output;
pub mod reconcile;
pub mod schedule;
pub mod schema;
pub mod table;
pub mod tir;
pub mod utils;
pub mod workbook;
pub mod xlsx_patch;
pub mod xlsx_styles;

pub use cell::CellValue;
pub use config::CashflowConfig;
pub use engine::{consolidate, SourceCounts, SourceExtract};
pub use error::{CashflowError, Result};
pub use output::OutputReport;
pub use reconcile::{enforce_flow_invariant, reconcile, VerificationResult};
pub use schema::*;
pub use workbook::{Sheet, SourceWorkbook};

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Absolute tolerance of the flow invariant check.
pub const FLOW_TOLERANCE: f64 = 1e-9;

/// What one run read and wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub sources: Vec<SourceCounts>,
    pub total_cashflow_rows: usize,
    pub total_tir_rows: usize,
    pub total_rows: usize,
    pub uncovered_tickers: Vec<String>,
    pub archived: Option<PathBuf>,
    pub output: PathBuf,
}

/// Result of reading and checking every source, before anything is written.
#[derive(Debug, Clone)]
pub struct Consolidation {
    pub tables: ConsolidatedTables,
    pub verification: VerificationResult,
    pub sources: Vec<SourceCounts>,
}

fn open_and_extract<F>(path: &Path, extract: F) -> Result<SourceExtract>
where
    F: FnOnce(&SourceWorkbook) -> Result<SourceExtract>,
{
    debug!("Opening {}", path.display());
    let book = SourceWorkbook::open(path)?;
    extract(&book)
}

pub struct CashflowProcessor;

impl CashflowProcessor {
    /// Reads the four sources one workbook at a time, consolidates them and
    /// checks the result. Flow invariant violations are fatal; uncovered
    /// tickers are logged.
    pub fn consolidate_sources(config: &CashflowConfig) -> Result<Consolidation> {
        let letters = open_and_extract(&config.letters_path(), engine::extract_letters)?;
        let sovereign = open_and_extract(&config.sovereign_path(), engine::extract_sovereign)?;
        let strict = config.strict_note_classification;
        let notes = open_and_extract(&config.notes_path(), |book| engine::extract_notes(book, strict))?;
        let peso_bonds = open_and_extract(&config.peso_bonds_path(), engine::extract_peso_bonds)?;

        let sources = vec![
            sovereign.counts(),
            notes.counts(),
            letters.counts(),
            peso_bonds.counts(),
        ];
        let universe: Vec<String> = [&sovereign, &notes, &letters, &peso_bonds]
            .iter()
            .flat_map(|extract| extract.universe.iter().cloned())
            .collect();

        let tables = consolidate(sovereign, notes, letters, peso_bonds);
        let verification = reconcile(&universe, &tables.cashflows, FLOW_TOLERANCE);

        for violation in &verification.flow_violations {
            debug!("Flow invariant violation: {}", violation);
        }
        enforce_flow_invariant(&verification)?;

        for ticker in &verification.uncovered_tickers {
            warn!("Ticker {} produced no cashflow rows", ticker);
        }

        Ok(Consolidation {
            tables,
            verification,
            sources,
        })
    }

    /// One full run, stamping archives with the given date.
    pub fn run_on(config: &CashflowConfig, today: NaiveDate) -> Result<RunSummary> {
        config.validate()?;
        info!(
            "Consolidating cashflows from {} into {}",
            config.input_dir.display(),
            config.output_path().display()
        );

        let consolidation = Self::consolidate_sources(config)?;
        let report = output::write_output(
            &config.output_path(),
            &config.template_path(),
            &config.archive_dir,
            &consolidation.tables,
            today,
        )?;

        Ok(RunSummary {
            sources: consolidation.sources,
            total_cashflow_rows: report.cashflow_rows,
            total_tir_rows: report.tir_rows,
            total_rows: report.cashflow_rows + report.tir_rows,
            uncovered_tickers: consolidation.verification.uncovered_tickers,
            archived: report.archived,
            output: report.output,
        })
    }

    /// One full run, stamping archives with the local date.
    pub fn run(config: &CashflowConfig) -> Result<RunSummary> {
        Self::run_on(config, chrono::Local::now().date_naive())
    }
}

pub fn run_consolidation(config: &CashflowConfig) -> Result<RunSummary> {
    CashflowProcessor::run(config)
}
