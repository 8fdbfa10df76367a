//! Per-instrument cashflow schedule sheets.
//!
//! The layout shared by the sovereign, notes and individual peso-bond sheets:
//! headers on row 3 starting at column D, data from row 5 until the maturity
//! column runs out. Interest comes from `INTERESES CF` when the sheet has it,
//! otherwise it is rebuilt with ACT/360 from consecutive maturity dates.

use crate::cell::{CellValue, NumericCell};
use crate::error::{CashflowError, Result};
use crate::schema::{CashflowRow, RowOrigin, SourceBook};
use crate::table::HeaderIndex;
use crate::utils::act360_interest;
use crate::workbook::Sheet;
use log::debug;

pub const COL_MATURITY: &str = "VENCIMIENTO";
pub const COL_COUPON: &str = "CUPON %";
pub const COL_RESIDUAL: &str = "RESIDUAL";
pub const COL_AMORTIZATION: &str = "AMORTIZ.";
pub const COL_INTEREST_CF: &str = "INTERESES CF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleLayout {
    pub header_row: u32,
    pub data_start_row: u32,
    pub start_col: u32,
}

impl Default for ScheduleLayout {
    fn default() -> Self {
        Self {
            header_row: 3,
            data_start_row: 5,
            start_col: 4,
        }
    }
}

struct ScheduleColumns {
    maturity: u32,
    coupon: u32,
    residual: u32,
    amortization: u32,
    interest_cf: Option<u32>,
}

impl ScheduleColumns {
    fn resolve(sheet: &Sheet, layout: &ScheduleLayout) -> Result<Self> {
        let first = layout.start_col;
        let headers = (first..=sheet.max_col().max(first)).map(|col| {
            let name = match sheet.cell(layout.header_row, col) {
                CellValue::Text(s) => s.clone(),
                _ => String::new(),
            };
            (col as usize, name)
        });
        let index = HeaderIndex::build(sheet.name(), headers);

        Ok(Self {
            maturity: index.require(COL_MATURITY)? as u32,
            coupon: index.require(COL_COUPON)? as u32,
            residual: index.require(COL_RESIDUAL)? as u32,
            amortization: index.require(COL_AMORTIZATION)? as u32,
            interest_cf: index.find(COL_INTEREST_CF)?.map(|c| c as u32),
        })
    }
}

fn number_at(sheet: &Sheet, row: u32, col: u32) -> Result<f64> {
    match sheet.cell(row, col).to_number() {
        NumericCell::Value(n) => Ok(n),
        NumericCell::NotNumeric(found) => Err(CashflowError::NonNumeric {
            sheet: sheet.name().to_string(),
            row,
            col,
            found,
        }),
    }
}

/// Reads the schedule of one instrument with the default sheet layout.
pub fn read_cashflow_schedule(
    sheet: &Sheet,
    ticker: &str,
    source: SourceBook,
) -> Result<Vec<CashflowRow>> {
    read_cashflow_schedule_with_layout(sheet, ticker, source, &ScheduleLayout::default())
}

/// Reads the schedule of one instrument.
///
/// Classification is left empty; the caller assigns it.
pub fn read_cashflow_schedule_with_layout(
    sheet: &Sheet,
    ticker: &str,
    source: SourceBook,
    layout: &ScheduleLayout,
) -> Result<Vec<CashflowRow>> {
    let cols = ScheduleColumns::resolve(sheet, layout)?;

    let mut rows = Vec::new();
    let mut prev_date = None;
    let mut row = layout.data_start_row;

    while row <= sheet.max_row() {
        let maturity_cell = sheet.cell(row, cols.maturity);
        if maturity_cell.is_blank() {
            break;
        }
        let date = maturity_cell
            .to_date()
            .ok_or_else(|| CashflowError::InvalidDate {
                sheet: sheet.name().to_string(),
                row,
                col: cols.maturity,
                found: maturity_cell.to_string(),
            })?;

        let coupon = number_at(sheet, row, cols.coupon)?;
        let residual = number_at(sheet, row, cols.residual)?;
        let amortization = number_at(sheet, row, cols.amortization)?;

        let interest = match (cols.interest_cf, prev_date) {
            (Some(col), _) => number_at(sheet, row, col)?,
            (None, Some(prev)) => act360_interest(residual, coupon, prev, date),
            // First row has nothing to accrue from.
            (None, None) => 0.0,
        };

        rows.push(CashflowRow {
            ticker: ticker.to_string(),
            classification: String::new(),
            date,
            coupon_rate: Some(coupon),
            residual: Some(residual),
            interest: Some(interest),
            amortization: Some(amortization),
            flow: interest + amortization,
            origin: RowOrigin::Schedule,
            source,
        });
        prev_date = Some(date);
        row += 1;
    }

    debug!(
        "Read {} schedule rows for {} from sheet '{}'",
        rows.len(),
        ticker,
        sheet.name()
    );

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Sheet with headers on row 3 from column D and data from row 5.
    fn schedule_sheet(headers: &[&str], data: Vec<Vec<CellValue>>) -> Sheet {
        let mut sheet = Sheet::new("AL30");
        sheet.set(1, 1, "BONO AL30".into());
        for (i, h) in headers.iter().enumerate() {
            sheet.set(3, 4 + i as u32, (*h).into());
        }
        for (r, row) in data.into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                sheet.set(5 + r as u32, 4 + c as u32, value);
            }
        }
        sheet
    }

    #[test]
    fn test_reconstructs_interest_act360() {
        let sheet = schedule_sheet(
            &["VENCIMIENTO", "CUPON %", "RESIDUAL", "AMORTIZ."],
            vec![
                vec![date(2024, 1, 1).into(), 5.0.into(), 100.0.into(), "-".into()],
                vec![date(2024, 4, 1).into(), 5.0.into(), 100.0.into(), 4.0.into()],
            ],
        );

        let rows = read_cashflow_schedule(&sheet, "AL30", SourceBook::Sovereign).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].interest, Some(0.0));
        assert_eq!(rows[0].amortization, Some(0.0));
        assert_eq!(rows[0].flow, 0.0);

        let expected = 100.0 * 5.0 * 91.0 / 360.0;
        assert_eq!(rows[1].interest, Some(expected));
        assert_eq!(rows[1].flow, expected + 4.0);
        assert_eq!(rows[1].origin, RowOrigin::Schedule);
    }

    #[test]
    fn test_uses_precomputed_interest_when_present() {
        let sheet = schedule_sheet(
            &["FECHA PAGO", "AMORTIZ.", "VENCIMIENTO", "INTERESES CF", "RESIDUAL", "CUPON %"],
            vec![
                vec![
                    CellValue::Empty,
                    10.0.into(),
                    date(2025, 7, 9).into(),
                    0.375.into(),
                    100.0.into(),
                    0.75.into(),
                ],
                vec![
                    CellValue::Empty,
                    "".into(),
                    date(2026, 1, 9).into(),
                    "-".into(),
                    90.0.into(),
                    0.75.into(),
                ],
            ],
        );

        let rows = read_cashflow_schedule(&sheet, "GD30", SourceBook::Sovereign).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].interest, Some(0.375));
        assert_eq!(rows[0].flow, 10.375);
        assert_eq!(rows[1].interest, Some(0.0));
        assert_eq!(rows[1].amortization, Some(0.0));
        assert_eq!(rows[1].flow, 0.0);
    }

    #[test]
    fn test_stops_at_first_blank_maturity() {
        let sheet = schedule_sheet(
            &["VENCIMIENTO", "CUPON %", "RESIDUAL", "AMORTIZ."],
            vec![
                vec![date(2024, 1, 1).into(), 1.0.into(), 100.0.into(), 0.0.into()],
                vec!["".into(), 1.0.into(), 100.0.into(), 0.0.into()],
                vec![date(2025, 1, 1).into(), 1.0.into(), 100.0.into(), 100.0.into()],
            ],
        );
        let rows = read_cashflow_schedule(&sheet, "AL30", SourceBook::Sovereign).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_flow_always_interest_plus_amortization() {
        let sheet = schedule_sheet(
            &["VENCIMIENTO", "CUPON %", "RESIDUAL", "AMORTIZ."],
            vec![
                vec![date(2024, 1, 9).into(), 0.125.into(), 100.0.into(), 0.0.into()],
                vec![date(2024, 7, 9).into(), 0.5.into(), 96.0.into(), 4.0.into()],
                vec![date(2025, 1, 9).into(), 0.75.into(), 88.0.into(), 8.0.into()],
            ],
        );
        let rows = read_cashflow_schedule(&sheet, "AL30", SourceBook::Sovereign).unwrap();
        for row in &rows {
            assert_eq!(row.flow, row.interest.unwrap() + row.amortization.unwrap());
        }
    }

    #[test]
    fn test_missing_required_header_is_fatal() {
        let sheet = schedule_sheet(
            &["CUPON %", "RESIDUAL", "AMORTIZ."],
            vec![vec![1.0.into(), 100.0.into(), 0.0.into()]],
        );
        match read_cashflow_schedule(&sheet, "AL30", SourceBook::Sovereign) {
            Err(CashflowError::MissingHeader { header, .. }) => assert_eq!(header, "VENCIMIENTO"),
            other => panic!("expected MissingHeader, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_cell_is_fatal() {
        let sheet = schedule_sheet(
            &["VENCIMIENTO", "CUPON %", "RESIDUAL", "AMORTIZ."],
            vec![vec![date(2024, 1, 1).into(), "5%".into(), 100.0.into(), 0.0.into()]],
        );
        match read_cashflow_schedule(&sheet, "AL30", SourceBook::Sovereign) {
            Err(CashflowError::NonNumeric { row, col, found, .. }) => {
                assert_eq!((row, col), (5, 5));
                assert_eq!(found, "5%");
            }
            other => panic!("expected NonNumeric, got {:?}", other),
        }
    }

    #[test]
    fn test_headers_left_of_start_column_are_ignored() {
        let mut sheet = schedule_sheet(
            &["VENCIMIENTO", "CUPON %", "RESIDUAL", "AMORTIZ."],
            vec![vec![date(2024, 1, 1).into(), 1.0.into(), 100.0.into(), 0.0.into()]],
        );
        sheet.set(3, 1, "INTERESES CF".into());
        sheet.set(5, 1, 99.0.into());

        let rows = read_cashflow_schedule(&sheet, "AL30", SourceBook::Sovereign).unwrap();
        assert_eq!(rows[0].interest, Some(0.0));
    }
}
