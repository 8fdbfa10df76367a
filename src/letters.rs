use crate::cell::CellValue;
use crate::error::{CashflowError, Result};
use crate::schema::{CashflowRow, RowOrigin, SourceBook, TirRow};
use crate::table::{read_table_until_blank, Table};
use crate::tir::tir_row;
use crate::workbook::Sheet;
use chrono::NaiveDate;
use std::collections::HashSet;

pub const COL_TICKER: &str = "Ticker";
pub const COL_ISSUE: &str = "Emisión";
pub const COL_MATURITY: &str = "Vencimiento";
pub const COL_AMOUNT_AT_MATURITY: &str = "Monto al Vto";
pub const COL_TIR: &str = "TIR";

/// Column names of a flat letter-style instrument table.
#[derive(Debug, Clone, Copy)]
pub struct LetterColumns<'a> {
    pub ticker: &'a str,
    pub issue_date: &'a str,
    pub maturity_date: &'a str,
    pub amount_at_maturity: &'a str,
}

impl Default for LetterColumns<'static> {
    fn default() -> Self {
        Self {
            ticker: COL_TICKER,
            issue_date: COL_ISSUE,
            maturity_date: COL_MATURITY,
            amount_at_maturity: COL_AMOUNT_AT_MATURITY,
        }
    }
}

/// A parsed letter-style table row.
#[derive(Debug, Clone, PartialEq)]
pub struct LetterInstrument {
    pub ticker: String,
    pub issue: NaiveDate,
    pub maturity: NaiveDate,
    pub amount_at_maturity: f64,
}

impl LetterInstrument {
    /// Issue row `(t, d0, -, -, -, -, 0)` and maturity row `(t, d1, -, 100, 0, 100, m)`.
    pub fn to_rows(&self, source: SourceBook) -> [CashflowRow; 2] {
        [
            CashflowRow {
                ticker: self.ticker.clone(),
                classification: String::new(),
                date: self.issue,
                coupon_rate: None,
                residual: None,
                interest: None,
                amortization: None,
                flow: 0.0,
                origin: RowOrigin::LetterIssue,
                source,
            },
            CashflowRow {
                ticker: self.ticker.clone(),
                classification: String::new(),
                date: self.maturity,
                coupon_rate: None,
                residual: Some(100.0),
                interest: Some(0.0),
                amortization: Some(100.0),
                flow: self.amount_at_maturity,
                origin: RowOrigin::LetterMaturity,
                source,
            },
        ]
    }
}

fn ticker_at(table: &Table, i: usize, col: usize) -> Result<String> {
    match &table.rows()[i][col] {
        CellValue::Text(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        other => Err(CashflowError::InvalidTicker {
            sheet: table.sheet().to_string(),
            row: table.sheet_row(i),
            found: other.to_string(),
        }),
    }
}

fn date_at(table: &Table, i: usize, col: usize) -> Result<NaiveDate> {
    let cell = &table.rows()[i][col];
    cell.to_date().ok_or_else(|| CashflowError::InvalidDate {
        sheet: table.sheet().to_string(),
        row: table.sheet_row(i),
        col: col as u32 + 1,
        found: cell.to_string(),
    })
}

fn amount_at(table: &Table, i: usize, col: usize) -> Result<f64> {
    let cell = &table.rows()[i][col];
    let non_numeric = |found: String| CashflowError::NonNumeric {
        sheet: table.sheet().to_string(),
        row: table.sheet_row(i),
        col: col as u32 + 1,
        found,
    };
    match cell.to_optional_number() {
        Ok(Some(amount)) => Ok(amount),
        Ok(None) => Err(non_numeric(cell.to_string())),
        Err(found) => Err(non_numeric(found)),
    }
}

/// Header positions of [`LetterColumns`] in one table.
struct ColumnIndex {
    ticker: usize,
    issue: usize,
    maturity: usize,
    amount: usize,
}

impl ColumnIndex {
    fn resolve(table: &Table, columns: &LetterColumns<'_>) -> Result<Self> {
        Ok(Self {
            ticker: table.column(columns.ticker)?,
            issue: table.column(columns.issue_date)?,
            maturity: table.column(columns.maturity_date)?,
            amount: table.column(columns.amount_at_maturity)?,
        })
    }

    fn parse_row(&self, table: &Table, i: usize) -> Result<LetterInstrument> {
        Ok(LetterInstrument {
            ticker: ticker_at(table, i, self.ticker)?,
            issue: date_at(table, i, self.issue)?,
            maturity: date_at(table, i, self.maturity)?,
            amount_at_maturity: amount_at(table, i, self.amount)?,
        })
    }
}

/// Parses every row of a flat letter-style table. A blank amount at maturity
/// is an error, not a zero flow.
pub fn parse_letter_table(table: &Table, columns: &LetterColumns<'_>) -> Result<Vec<LetterInstrument>> {
    let index = ColumnIndex::resolve(table, columns)?;
    (0..table.len()).map(|i| index.parse_row(table, i)).collect()
}

/// Two cashflow rows per table row, in table order.
pub fn build_two_row_schedule(
    table: &Table,
    columns: &LetterColumns<'_>,
    source: SourceBook,
) -> Result<Vec<CashflowRow>> {
    Ok(parse_letter_table(table, columns)?
        .iter()
        .flat_map(|instrument| instrument.to_rows(source))
        .collect())
}

/// The `(Ticker, TIR)` projection of a letter-style table. TIR cells are
/// copied as they are when not numeric.
pub fn extract_tir_table(table: &Table, ticker_col: &str, tir_col: &str) -> Result<Vec<TirRow>> {
    let t = table.column(ticker_col)?;
    let v = table.column(tir_col)?;
    (0..table.len())
        .map(|i| {
            let ticker = ticker_at(table, i, t)?;
            Ok(tir_row(table.sheet(), table.sheet_row(i), ticker, &table.rows()[i][v]))
        })
        .collect()
}

/// LECAPS sheet of the letters workbook: header row 1, data until the
/// ticker column is empty. Returns the TIR table and the cashflow rows.
pub fn build_letters_from_lecaps(sheet: &Sheet) -> Result<(Vec<TirRow>, Vec<CashflowRow>)> {
    let table = read_table_until_blank(sheet, 1, 2, 1)?;
    let tirs = extract_tir_table(&table, COL_TICKER, COL_TIR)?;
    let cashflows = build_two_row_schedule(&table, &LetterColumns::default(), SourceBook::Letters)?;
    Ok((tirs, cashflows))
}

/// Peso-bond bucket sheet (`Bonos_CER`, ...): same layout as LECAPS, rows
/// restricted to tickers in the peso-bond universe. Rows outside the
/// universe are skipped before their dates or amounts are looked at.
pub fn build_bucket_from_sheet(sheet: &Sheet, universe: &HashSet<String>) -> Result<Vec<CashflowRow>> {
    let table = read_table_until_blank(sheet, 1, 2, 1)?;
    let index = ColumnIndex::resolve(&table, &LetterColumns::default())?;

    let mut rows = Vec::new();
    for i in 0..table.len() {
        let in_universe = table.rows()[i][index.ticker]
            .lookup_key()
            .is_some_and(|ticker| universe.contains(&ticker));
        if !in_universe {
            continue;
        }
        rows.extend(index.parse_row(&table, i)?.to_rows(SourceBook::PesoBonds));
    }
    Ok(rows)
}

/// Tickers listed in a bucket sheet, regardless of universe membership.
///
/// Rows run until the issue-date column is empty; blank tickers are skipped.
pub fn bucket_tickers(sheet: &Sheet) -> Result<Vec<String>> {
    let table = read_table_until_blank(sheet, 1, 2, 2)?;
    let col = table.column(COL_TICKER)?;
    Ok(table.rows().iter().filter_map(|row| row[col].lookup_key()).collect())
}
