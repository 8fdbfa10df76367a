use crate::cell::CellValue;
use crate::error::{CashflowError, Result};
use calamine::{open_workbook_auto, Data, Range, Reader, SheetType};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

static EMPTY: CellValue = CellValue::Empty;

/// An immutable rectangular bag of cells addressed 1-based by (row, col).
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    name: String,
    cells: HashMap<(u32, u32), CellValue>,
    max_row: u32,
    max_col: u32,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builds a sheet whose first row lands on row 1, column 1.
    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let mut sheet = Self::new(name);
        for (r, row) in rows.into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                sheet.set(r as u32 + 1, c as u32 + 1, value);
            }
        }
        sheet
    }

    pub fn from_range(name: impl Into<String>, range: &Range<Data>) -> Self {
        let mut sheet = Self::new(name);
        let (start_row, start_col) = range.start().unwrap_or((0, 0));

        for (r, c, data) in range.used_cells() {
            let value = CellValue::from(data);
            if value == CellValue::Empty {
                continue;
            }
            sheet.set(start_row + r as u32 + 1, start_col + c as u32 + 1, value);
        }
        sheet
    }

    pub fn set(&mut self, row: u32, col: u32, value: CellValue) {
        if value == CellValue::Empty {
            self.cells.remove(&(row, col));
            return;
        }
        self.max_row = self.max_row.max(row);
        self.max_col = self.max_col.max(col);
        self.cells.insert((row, col), value);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cell(&self, row: u32, col: u32) -> &CellValue {
        self.cells.get(&(row, col)).unwrap_or(&EMPTY)
    }

    /// Last used row (0 for an empty sheet).
    pub fn max_row(&self) -> u32 {
        self.max_row
    }

    /// Last used column (0 for an empty sheet).
    pub fn max_col(&self) -> u32 {
        self.max_col
    }
}

/// A source workbook fully loaded into memory, plus its workbook-level
/// defined names as `(name, formula)` pairs.
#[derive(Debug, Clone, Default)]
pub struct SourceWorkbook {
    path: PathBuf,
    sheets: BTreeMap<String, Sheet>,
    defined_names: Vec<(String, String)>,
}

impl SourceWorkbook {
    /// Opens an `.xlsx`/`.xlsm` (or any calamine-supported format), reads
    /// every worksheet, and closes the file before returning.
    pub fn open(path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path)?;

        let sheet_names: Vec<String> = workbook
            .sheets_metadata()
            .iter()
            .filter(|meta| meta.typ == SheetType::WorkSheet)
            .map(|meta| meta.name.clone())
            .collect();
        let defined_names = workbook.defined_names().to_vec();

        let mut sheets = BTreeMap::new();
        for name in sheet_names {
            let range = workbook.worksheet_range(&name)?;
            sheets.insert(name.clone(), Sheet::from_range(name, &range));
        }

        debug!(
            "Loaded {} sheets and {} defined names from {}",
            sheets.len(),
            defined_names.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            sheets,
            defined_names,
        })
    }

    /// In-memory workbook, used when the sheets are already at hand.
    pub fn from_sheets(path: impl Into<PathBuf>, sheets: Vec<Sheet>) -> Self {
        Self {
            path: path.into(),
            sheets: sheets
                .into_iter()
                .map(|sheet| (sheet.name().to_string(), sheet))
                .collect(),
            defined_names: Vec::new(),
        }
    }

    pub fn with_defined_name(mut self, name: impl Into<String>, formula: impl Into<String>) -> Self {
        self.defined_names.push((name.into(), formula.into()));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn defined_names(&self) -> &[(String, String)] {
        &self.defined_names
    }

    pub fn sheet(&self, name: &str) -> Result<&Sheet> {
        self.sheets
            .get(name)
            .ok_or_else(|| CashflowError::MissingSheet {
                workbook: self.path.clone(),
                sheet: name.to_string(),
            })
    }

    /// Resolves one sheet per ticker before any of them is parsed, so a
    /// missing sheet fails the run without partial work.
    pub fn sheets_for<'a, I>(&self, tickers: I) -> Result<Vec<(&'a str, &Sheet)>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        tickers
            .into_iter()
            .map(|ticker| Ok((ticker.as_str(), self.sheet(ticker)?)))
            .collect()
    }
}
