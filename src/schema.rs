use crate::cell::CellValue;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output column headers of the consolidated cashflow table, in order.
pub const CASHFLOW_COLUMNS: [&str; 9] = [
    "Ticker",
    "Clasificación",
    "Fecha",
    "Cupón",
    "Residual",
    "Intereses",
    "Amortización",
    "Flujo",
    "Moneda",
];

/// Output column headers of the consolidated TIR table, in order.
pub const TIR_COLUMNS: [&str; 2] = ["Ticker", "TIR"];

/// Which source workbook a row was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceBook {
    Sovereign,
    Notes,
    Letters,
    PesoBonds,
}

impl fmt::Display for SourceBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceBook::Sovereign => "sovereign",
            SourceBook::Notes => "notes",
            SourceBook::Letters => "letters",
            SourceBook::PesoBonds => "peso bonds",
        };
        write!(f, "{}", label)
    }
}

/// How a cashflow row came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowOrigin {
    /// Read from a per-instrument schedule sheet.
    Schedule,
    /// Issue-date row of a letter-style instrument (flow 0, everything else blank).
    LetterIssue,
    /// Maturity row of a letter-style instrument (flow = amount at maturity).
    LetterMaturity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "ARS")]
    Ars,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Ars => "ARS",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One scheduled cash event for one instrument.
///
/// `None` in an optional field means "blank by design" (letter-style rows);
/// a dash or empty cell in a schedule sheet is normalized to `Some(0.0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashflowRow {
    pub ticker: String,
    /// Taxonomy label; empty when no rule matched.
    pub classification: String,
    pub date: NaiveDate,
    pub coupon_rate: Option<f64>,
    pub residual: Option<f64>,
    pub interest: Option<f64>,
    pub amortization: Option<f64>,
    pub flow: f64,
    pub origin: RowOrigin,
    pub source: SourceBook,
}

impl CashflowRow {
    /// Interest plus amortization, blanks counted as zero.
    pub fn component_sum(&self) -> f64 {
        self.interest.unwrap_or(0.0) + self.amortization.unwrap_or(0.0)
    }

    /// Derived from the classification, never stored.
    pub fn currency(&self) -> Currency {
        crate::classify::currency_for(&self.classification)
    }
}

/// `(ticker, tir)`, one per instrument.
///
/// The TIR is carried as the source cell held it: blank and `-` become
/// [`CellValue::Empty`], numeric text becomes a number, anything else
/// (error values, stray text) is passed through to the output untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TirRow {
    pub ticker: String,
    pub tir: CellValue,
}

impl TirRow {
    pub fn new(ticker: impl Into<String>, tir: Option<f64>) -> Self {
        Self::with_value(ticker, tir.into())
    }

    pub fn with_value(ticker: impl Into<String>, tir: CellValue) -> Self {
        Self {
            ticker: ticker.into(),
            tir,
        }
    }

    /// Builds a row from a raw TIR cell. `Err` carries the row when the cell
    /// is kept verbatim because it is not a number.
    pub fn from_cell(ticker: impl Into<String>, cell: &CellValue) -> std::result::Result<Self, Self> {
        match cell.to_optional_number() {
            Ok(rate) => Ok(Self::new(ticker, rate)),
            Err(_) => Err(Self::with_value(ticker, cell.clone())),
        }
    }

    /// The rate when the TIR cell held a number.
    pub fn rate(&self) -> Option<f64> {
        match self.tir {
            CellValue::Number(n) => Some(n),
            _ => None,
        }
    }
}

/// The two final tables, ready to be written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedTables {
    pub cashflows: Vec<CashflowRow>,
    pub tirs: Vec<TirRow>,
}
