use crate::cell::CellValue;
use crate::error::{CashflowError, Result};
use crate::schema::{CashflowRow, ConsolidatedTables, TirRow, CASHFLOW_COLUMNS, TIR_COLUMNS};
use crate::xlsx_patch::{patch_workbook, CellBlock, SheetPatch};
use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CASHFLOWS_SHEET: &str = "CASHFLOWS";
pub const TIR_OUTPUT_SHEET: &str = "TIR";

/// Last row of the value block cleared before writing.
pub const CLEAR_LAST_ROW: u32 = 50_000;
pub const FIRST_DATA_ROW: u32 = 2;

const ARCHIVE_PREFIX: &str = "cashflows_";

/// Where a run left its files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputReport {
    pub output: PathBuf,
    pub archived: Option<PathBuf>,
    pub cashflow_rows: usize,
    pub tir_rows: usize,
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| ".xlsx".to_string())
}

/// First unused archive name for `today`: `cashflows_DD-MM-YYYY.xlsx`, then
/// `cashflows_DD-MM-YYYY.2.xlsx`, `.3`, ...
pub fn archive_path(archive_dir: &Path, today: NaiveDate, extension: &str) -> PathBuf {
    let stem = format!("{}{}", ARCHIVE_PREFIX, today.format("%d-%m-%Y"));
    let first = archive_dir.join(format!("{}{}", stem, extension));
    if !first.exists() {
        return first;
    }

    let mut suffix = 2u32;
    loop {
        let candidate = archive_dir.join(format!("{}.{}{}", stem, suffix, extension));
        if !candidate.exists() {
            return candidate;
        }
        suffix += 1;
    }
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_err() {
        // rename fails across filesystems
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

/// Moves an existing output into the archive directory. Returns where it went,
/// or `None` when there was nothing to archive.
pub fn archive_existing_output(output: &Path, archive_dir: &Path, today: NaiveDate) -> Result<Option<PathBuf>> {
    if !output.exists() {
        return Ok(None);
    }
    fs::create_dir_all(archive_dir)?;

    let target = archive_path(archive_dir, today, &extension_of(output));
    move_file(output, &target)?;
    warn!("Archived previous output {} to {}", output.display(), target.display());
    Ok(Some(target))
}

/// Byte-for-byte copy of the template at the output path.
fn ensure_template(template: &Path) -> Result<()> {
    if !template.is_file() {
        return Err(CashflowError::Template(format!(
            "template not found: {}",
            template.display()
        )));
    }
    Ok(())
}

pub fn create_output_from_template(template: &Path, output: &Path) -> Result<()> {
    ensure_template(template)?;
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(template, output)?;
    Ok(())
}

fn optional(value: Option<f64>) -> CellValue {
    value.into()
}

/// One output row in `CASHFLOW_COLUMNS` order.
pub fn cashflow_cells(row: &CashflowRow) -> Vec<CellValue> {
    let classification = if row.classification.is_empty() {
        CellValue::Empty
    } else {
        row.classification.as_str().into()
    };
    vec![
        row.ticker.as_str().into(),
        classification,
        row.date.into(),
        optional(row.coupon_rate),
        optional(row.residual),
        optional(row.interest),
        optional(row.amortization),
        row.flow.into(),
        row.currency().code().into(),
    ]
}

pub fn tir_cells(row: &TirRow) -> Vec<CellValue> {
    vec![row.ticker.as_str().into(), row.tir.clone()]
}

fn block_patch(sheet: &str, width: usize, rows: Vec<Vec<CellValue>>) -> SheetPatch {
    SheetPatch {
        sheet: sheet.to_string(),
        clear: CellBlock {
            first_row: FIRST_DATA_ROW,
            last_row: CLEAR_LAST_ROW,
            first_col: 1,
            last_col: width as u32,
        },
        start_row: FIRST_DATA_ROW,
        start_col: 1,
        rows,
    }
}

/// Clears both value blocks of an output workbook and writes the tables.
pub fn write_tables(output: &Path, tables: &ConsolidatedTables) -> Result<()> {
    let capacity = (CLEAR_LAST_ROW - FIRST_DATA_ROW + 1) as usize;
    if tables.cashflows.len() > capacity || tables.tirs.len() > capacity {
        return Err(CashflowError::Template(format!(
            "tables exceed the {} row output block",
            capacity
        )));
    }

    let patches = [
        block_patch(
            CASHFLOWS_SHEET,
            CASHFLOW_COLUMNS.len(),
            tables.cashflows.iter().map(cashflow_cells).collect(),
        ),
        block_patch(TIR_OUTPUT_SHEET, TIR_COLUMNS.len(), tables.tirs.iter().map(tir_cells).collect()),
    ];
    patch_workbook(output, &patches)
}

/// Archive, copy the template, write. A missing template fails before the
/// previous output is moved away.
pub fn write_output(
    output: &Path,
    template: &Path,
    archive_dir: &Path,
    tables: &ConsolidatedTables,
    today: NaiveDate,
) -> Result<OutputReport> {
    ensure_template(template)?;
    let archived = archive_existing_output(output, archive_dir, today)?;
    create_output_from_template(template, output)?;
    write_tables(output, tables)?;

    info!(
        "Wrote {} cashflow rows and {} TIR rows to {}",
        tables.cashflows.len(),
        tables.tirs.len(),
        output.display()
    );
    Ok(OutputReport {
        output: output.to_path_buf(),
        archived,
        cashflow_rows: tables.cashflows.len(),
        tir_rows: tables.tirs.len(),
    })
}
