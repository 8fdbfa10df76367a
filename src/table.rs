//! Generic rectangular readers. Nothing here knows about instruments.

use crate::cell::CellValue;
use crate::error::{CashflowError, Result};
use crate::workbook::Sheet;
use std::collections::HashMap;

/// Header name to position, built once per sheet.
///
/// Duplicate names are remembered so that looking one up fails instead of
/// silently picking the first occurrence.
#[derive(Debug, Clone, Default)]
pub struct HeaderIndex {
    sheet: String,
    positions: HashMap<String, usize>,
    duplicates: Vec<String>,
}

impl HeaderIndex {
    pub fn build<I>(sheet: &str, headers: I) -> Self
    where
        I: IntoIterator<Item = (usize, String)>,
    {
        let mut index = Self {
            sheet: sheet.to_string(),
            ..Default::default()
        };
        for (pos, name) in headers {
            if name.is_empty() {
                continue;
            }
            if index.positions.contains_key(&name) {
                if !index.duplicates.contains(&name) {
                    index.duplicates.push(name);
                }
                continue;
            }
            index.positions.insert(name, pos);
        }
        index
    }

    /// Position of an optional column.
    pub fn find(&self, name: &str) -> Result<Option<usize>> {
        if self.duplicates.iter().any(|d| d == name) {
            return Err(CashflowError::DuplicateHeader {
                sheet: self.sheet.clone(),
                header: name.to_string(),
            });
        }
        Ok(self.positions.get(name).copied())
    }

    /// Position of a required column.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.find(name)?.ok_or_else(|| CashflowError::MissingHeader {
            sheet: self.sheet.clone(),
            header: name.to_string(),
        })
    }
}

/// A block of rows under a header row, one value per header.
#[derive(Debug, Clone, Default)]
pub struct Table {
    sheet: String,
    headers: Vec<String>,
    index: HeaderIndex,
    first_data_row: u32,
    rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Result<usize> {
        self.index.require(name)
    }

    /// Sheet row number (1-based) of the `i`-th data row.
    pub fn sheet_row(&self, i: usize) -> u32 {
        self.first_data_row + i as u32
    }
}

/// Reads `(A, B)` pairs from row 1 down, stopping at the first row whose
/// column-A cell is empty or the empty string.
pub fn read_pair_columns(sheet: &Sheet, col_a: u32, col_b: u32) -> Vec<(CellValue, CellValue)> {
    let mut pairs = Vec::new();
    let mut row = 1;

    while row <= sheet.max_row() {
        let a = sheet.cell(row, col_a);
        if a.is_blank() {
            break;
        }
        pairs.push((a.clone(), sheet.cell(row, col_b).clone()));
        row += 1;
    }

    pairs
}

/// Reads a header row from column 1 until the first empty header, then data
/// rows from `first_data_row` until `stop_col` is empty.
pub fn read_table_until_blank(
    sheet: &Sheet,
    header_row: u32,
    first_data_row: u32,
    stop_col: u32,
) -> Result<Table> {
    let mut headers = Vec::new();
    let mut col = 1;
    loop {
        let header = sheet.cell(header_row, col);
        if header.is_blank() {
            break;
        }
        headers.push(header.to_string());
        col += 1;
    }

    let index = HeaderIndex::build(
        sheet.name(),
        headers.iter().cloned().enumerate(),
    );

    let mut rows = Vec::new();
    let mut row = first_data_row;
    while row <= sheet.max_row() && !sheet.cell(row, stop_col).is_blank() {
        let values = (1..=headers.len() as u32)
            .map(|c| sheet.cell(row, c).clone())
            .collect();
        rows.push(values);
        row += 1;
    }

    Ok(Table {
        sheet: sheet.name().to_string(),
        headers,
        index,
        first_data_row,
        rows,
    })
}
