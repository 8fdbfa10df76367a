use crate::utils::{excel_serial_to_date, parse_date_text};
use calamine::Data;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single scalar read from a worksheet cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    /// Spreadsheet error value such as `#N/A`, kept verbatim.
    Error(String),
}

/// Outcome of numeric normalization; the caller attaches sheet coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericCell {
    Value(f64),
    NotNumeric(String),
}

impl CellValue {
    /// Missing, `None`-like, or the empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Schedule-sheet numeric normalization: blank, empty string and the
    /// literal `-` are zero; numeric text is parsed; everything else is
    /// reported as not numeric.
    pub fn to_number(&self) -> NumericCell {
        match self {
            CellValue::Empty => NumericCell::Value(0.0),
            CellValue::Number(n) => NumericCell::Value(*n),
            CellValue::Text(s) => {
                let trimmed = s.trim();
                if s.is_empty() || trimmed == "-" {
                    return NumericCell::Value(0.0);
                }
                match trimmed.parse::<f64>() {
                    Ok(n) => NumericCell::Value(n),
                    Err(_) => NumericCell::NotNumeric(s.clone()),
                }
            }
            other => NumericCell::NotNumeric(other.to_string()),
        }
    }

    /// Like [`CellValue::to_number`] but keeps blank and `-` as `None`.
    pub fn to_optional_number(&self) -> std::result::Result<Option<f64>, String> {
        if self.is_blank() || matches!(self, CellValue::Text(s) if s.trim() == "-") {
            return Ok(None);
        }
        match self.to_number() {
            NumericCell::Value(n) => Ok(Some(n)),
            NumericCell::NotNumeric(found) => Err(found),
        }
    }

    /// Interprets the cell as a calendar date. Numbers are Excel serials.
    pub fn to_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => Some(*d),
            CellValue::Number(n) => excel_serial_to_date(*n),
            CellValue::Text(s) => parse_date_text(s),
            _ => None,
        }
    }

    /// Ticker text as written in the cell, for sheet lookups. Whitespace-only
    /// text counts as missing; non-text cells use their [`lookup_key`](Self::lookup_key).
    pub fn ticker_text(&self) -> Option<String> {
        match self {
            CellValue::Text(s) if s.trim().is_empty() => None,
            CellValue::Text(s) => Some(s.clone()),
            other => other.lookup_key(),
        }
    }

    /// Key used for set membership; strings are trimmed, whole numbers lose
    /// their fractional part so `123.0` and `"123"` compare equal.
    pub fn lookup_key(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) if s.trim().is_empty() => None,
            CellValue::Text(s) => Some(s.trim().to_string()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::Error(e) => write!(f, "{}", e),
        }
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Float(n) => CellValue::Number(*n),
            Data::Int(n) => CellValue::Number(*n as f64),
            Data::Bool(b) => CellValue::Bool(*b),
            // 1900 date system assumed; calamine does not expose the 1904 flag.
            Data::DateTime(dt) => match excel_serial_to_date(dt.as_f64()) {
                Some(date) => CellValue::Date(date),
                None => CellValue::Number(dt.as_f64()),
            },
            Data::DateTimeIso(s) => match parse_date_text(s) {
                Some(date) => CellValue::Date(date),
                None => CellValue::Text(s.clone()),
            },
            Data::DurationIso(s) => CellValue::Text(s.clone()),
            Data::Error(e) => CellValue::Error(e.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(d: NaiveDate) -> Self {
        CellValue::Date(d)
    }
}

impl From<Option<f64>> for CellValue {
    fn from(n: Option<f64>) -> Self {
        n.map(CellValue::Number).unwrap_or(CellValue::Empty)
    }
}
