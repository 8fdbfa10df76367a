use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CashflowError {
    #[error("Sheet '{sheet}' not found in workbook {workbook}")]
    MissingSheet { workbook: PathBuf, sheet: String },

    #[error("Sheet '{sheet}' is missing required column '{header}'")]
    MissingHeader { sheet: String, header: String },

    #[error("Sheet '{sheet}' has duplicate column header '{header}'")]
    DuplicateHeader { sheet: String, header: String },

    #[error("Sheet '{sheet}' row {row} column {col}: expected a number, found '{found}'")]
    NonNumeric {
        sheet: String,
        row: u32,
        col: u32,
        found: String,
    },

    #[error("Sheet '{sheet}' row {row} column {col}: expected a date, found '{found}'")]
    InvalidDate {
        sheet: String,
        row: u32,
        col: u32,
        found: String,
    },

    #[error("Sheet '{sheet}' row {row}: invalid ticker '{found}'")]
    InvalidTicker {
        sheet: String,
        row: u32,
        found: String,
    },

    #[error("Defined name '{name}' has an unsupported reference: {formula}")]
    InvalidDefinedName { name: String, formula: String },

    #[error("Note classification anomaly: {0}")]
    NoteClassification(String),

    #[error("Flow invariant violated for {count} row(s), first: {first}")]
    FlowInvariant { count: usize, first: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CashflowError>;
