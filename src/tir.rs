use crate::cell::CellValue;
use crate::error::{CashflowError, Result};
use crate::schema::TirRow;
use crate::table::read_pair_columns;
use crate::workbook::Sheet;
use log::{debug, warn};
use std::collections::HashSet;

pub const TIR_SHEET: &str = "TIR";

/// TIR row for `ticker`, keeping a non-numeric cell verbatim with a warning.
pub(crate) fn tir_row(sheet: &str, row: u32, ticker: String, cell: &CellValue) -> TirRow {
    TirRow::from_cell(ticker, cell).unwrap_or_else(|kept| {
        warn!(
            "Sheet '{}' row {}: TIR of {} is not a number ('{}'), copied as is",
            sheet, row, kept.ticker, kept.tir
        );
        kept
    })
}

/// Two-column `(ticker, TIR)` sheet read from A1 down to the first blank ticker.
///
/// Tickers keep their cell text untrimmed since they also name schedule sheets.
pub fn read_tir_sheet(sheet: &Sheet) -> Result<Vec<TirRow>> {
    read_pair_columns(sheet, 1, 2)
        .into_iter()
        .enumerate()
        .map(|(i, (ticker, tir))| {
            let row = i as u32 + 1;
            let ticker = ticker
                .ticker_text()
                .ok_or_else(|| CashflowError::InvalidTicker {
                    sheet: sheet.name().to_string(),
                    row,
                    found: ticker.to_string(),
                })?;
            Ok(tir_row(sheet.name(), row, ticker, &tir))
        })
        .collect()
}

/// Distinct tickers in first-seen order, the instrument universe of a book.
pub fn universe(tirs: &[TirRow]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut tickers = Vec::new();
    for row in tirs {
        if seen.insert(&row.ticker) {
            tickers.push(row.ticker.clone());
        } else {
            debug!("Skipping repeated ticker {}", row.ticker);
        }
    }
    tickers
}
