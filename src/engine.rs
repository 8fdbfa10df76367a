use crate::classify::{
    classify_letter, classify_note, classify_peso_bond, classify_sovereign, NoteSets,
    PesoBondBucket,
};
use crate::error::{CashflowError, Result};
use crate::letters::{bucket_tickers, build_bucket_from_sheet, build_letters_from_lecaps};
use crate::named_range::resolve_defined_name_set;
use crate::schedule::read_cashflow_schedule;
use crate::schema::{CashflowRow, ConsolidatedTables, SourceBook, TirRow};
use crate::tir::{read_tir_sheet, universe, TIR_SHEET};
use crate::workbook::SourceWorkbook;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashSet;

pub const LECAPS_SHEET: &str = "LECAPS";

/// Everything extracted from one source workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceExtract {
    pub source: SourceBook,
    pub universe: Vec<String>,
    pub tirs: Vec<TirRow>,
    pub cashflows: Vec<CashflowRow>,
}

impl SourceExtract {
    fn new(source: SourceBook, tirs: Vec<TirRow>) -> Self {
        Self {
            source,
            universe: universe(&tirs),
            tirs,
            cashflows: Vec::new(),
        }
    }

    pub fn counts(&self) -> SourceCounts {
        SourceCounts {
            source: self.source,
            tickers: self.universe.len(),
            tir_rows: self.tirs.len(),
            cashflow_rows: self.cashflows.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub source: SourceBook,
    pub tickers: usize,
    pub tir_rows: usize,
    pub cashflow_rows: usize,
}

fn classified(mut rows: Vec<CashflowRow>, label: &str) -> Vec<CashflowRow> {
    for row in &mut rows {
        row.classification = label.to_string();
    }
    rows
}

/// Reads one schedule sheet per universe ticker, after checking that every
/// sheet exists. Sheets are looked up by the raw ticker text; `classify`
/// sees it trimmed.
fn read_schedules<F>(
    book: &SourceWorkbook,
    tickers: &[String],
    source: SourceBook,
    classify: F,
) -> Result<Vec<CashflowRow>>
where
    F: Fn(&str) -> String,
{
    let mut rows = Vec::new();
    for (ticker, sheet) in book.sheets_for(tickers)? {
        let schedule = read_cashflow_schedule(sheet, ticker, source)?;
        rows.extend(classified(schedule, &classify(ticker.trim())));
    }
    Ok(rows)
}

fn log_extract(extract: &SourceExtract, book: &SourceWorkbook) {
    info!(
        "Extracted {} tickers, {} TIR rows and {} cashflow rows from {} workbook {}",
        extract.universe.len(),
        extract.tirs.len(),
        extract.cashflows.len(),
        extract.source,
        book.path().display()
    );
}

/// Sovereign and Bopreal dollar bonds: TIR sheet plus one schedule sheet per ticker.
pub fn extract_sovereign(book: &SourceWorkbook) -> Result<SourceExtract> {
    let mut extract = SourceExtract::new(SourceBook::Sovereign, read_tir_sheet(book.sheet(TIR_SHEET)?)?);
    extract.cashflows = read_schedules(book, &extract.universe, SourceBook::Sovereign, |t| {
        classify_sovereign(t).to_string()
    })?;
    log_extract(&extract, book);
    Ok(extract)
}

/// Loads the three classification named ranges of the notes workbook.
pub fn load_note_sets(book: &SourceWorkbook) -> Result<NoteSets> {
    Ok(NoteSets {
        local_law: resolve_defined_name_set(book, NoteSets::LOCAL_LAW_NAME)?,
        foreign_law: resolve_defined_name_set(book, NoteSets::FOREIGN_LAW_NAME)?,
        dollar_linked: resolve_defined_name_set(book, NoteSets::DOLLAR_LINKED_NAME)?,
    })
}

/// Reports notes that sit in several sets or in none. Warnings only, unless
/// `strict`, in which case the first anomaly aborts.
pub fn check_note_sets(sets: &NoteSets, tickers: &[String], strict: bool) -> Result<Vec<String>> {
    let mut anomalies: Vec<String> = sets
        .overlaps()
        .into_iter()
        .map(|(ticker, names)| format!("{} is listed in {}", ticker, names.join(", ")))
        .collect();

    anomalies.extend(
        tickers
            .iter()
            .filter(|ticker| sets.memberships(ticker.trim()).is_empty())
            .map(|ticker| format!("{} is in none of leg_arg, leg_eeuu, dl", ticker)),
    );

    if strict {
        if let Some(first) = anomalies.first() {
            return Err(CashflowError::NoteClassification(first.clone()));
        }
    }
    for anomaly in &anomalies {
        warn!("Note classification: {}", anomaly);
    }
    Ok(anomalies)
}

/// Dollar corporate notes: TIR sheet, one schedule per ticker, classified by
/// named-range membership.
pub fn extract_notes(book: &SourceWorkbook, strict: bool) -> Result<SourceExtract> {
    let mut extract = SourceExtract::new(SourceBook::Notes, read_tir_sheet(book.sheet(TIR_SHEET)?)?);

    let sets = load_note_sets(book)?;
    check_note_sets(&sets, &extract.universe, strict)?;

    extract.cashflows = read_schedules(book, &extract.universe, SourceBook::Notes, |t| {
        classify_note(t, &sets).to_string()
    })?;
    log_extract(&extract, book);
    Ok(extract)
}

/// Peso letters: the LECAPS table provides both the TIR table and the
/// two-row cashflows.
pub fn extract_letters(book: &SourceWorkbook) -> Result<SourceExtract> {
    let (tirs, rows) = build_letters_from_lecaps(book.sheet(LECAPS_SHEET)?)?;
    let mut extract = SourceExtract::new(SourceBook::Letters, tirs);
    extract.cashflows = rows
        .into_iter()
        .map(|mut row| {
            row.classification = classify_letter(&row.ticker).to_string();
            row
        })
        .collect();
    log_extract(&extract, book);
    Ok(extract)
}

/// Peso bonds: bucket sheets first (filtered to the TIR universe), then an
/// individual schedule sheet for every universe ticker no bucket lists.
pub fn extract_peso_bonds(book: &SourceWorkbook) -> Result<SourceExtract> {
    let mut extract = SourceExtract::new(SourceBook::PesoBonds, read_tir_sheet(book.sheet(TIR_SHEET)?)?);
    let universe_set: HashSet<String> = extract.universe.iter().map(|t| t.trim().to_string()).collect();

    let mut covered: HashSet<String> = HashSet::new();
    for bucket in PesoBondBucket::SHEETS {
        let Some(sheet_name) = bucket.sheet_name() else {
            continue;
        };
        let sheet = book.sheet(sheet_name)?;

        let rows = build_bucket_from_sheet(sheet, &universe_set)?;
        debug!("Bucket {} contributed {} rows", bucket, rows.len());
        extract.cashflows.extend(rows.into_iter().map(|mut row| {
            row.classification = classify_peso_bond(&row.ticker, bucket).to_string();
            row
        }));
        covered.extend(bucket_tickers(sheet)?);
    }

    let remaining: Vec<String> = extract
        .universe
        .iter()
        .filter(|ticker| !covered.contains(ticker.trim()))
        .cloned()
        .collect();
    debug!(
        "{} peso bonds covered by bucket sheets, {} read from individual sheets",
        extract.universe.len() - remaining.len(),
        remaining.len()
    );

    let individual = read_schedules(book, &remaining, SourceBook::PesoBonds, |t| {
        classify_peso_bond(t, PesoBondBucket::Individual).to_string()
    })?;
    extract.cashflows.extend(individual);

    log_extract(&extract, book);
    Ok(extract)
}

/// Concatenates the four extracts into the final tables.
///
/// TIR rows go sovereign, notes, peso bonds, letters; cashflow rows go
/// letters, sovereign, notes, peso bonds.
pub fn consolidate(
    sovereign: SourceExtract,
    notes: SourceExtract,
    letters: SourceExtract,
    peso_bonds: SourceExtract,
) -> ConsolidatedTables {
    let mut tables = ConsolidatedTables::default();

    for extract in [&sovereign, &notes, &peso_bonds, &letters] {
        tables.tirs.extend(extract.tirs.iter().cloned());
    }
    for extract in [letters, sovereign, notes, peso_bonds] {
        tables.cashflows.extend(extract.cashflows);
    }

    info!(
        "Consolidated {} cashflow rows and {} TIR rows",
        tables.cashflows.len(),
        tables.tirs.len()
    );
    tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellValue;
    use crate::schema::RowOrigin;
    use crate::workbook::Sheet;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tir_sheet(tickers: &[&str]) -> Sheet {
        Sheet::from_rows(
            "TIR",
            tickers.iter().map(|t| vec![(*t).into(), 0.1.into()]).collect(),
        )
    }

    fn schedule(name: &str, amortizations: &[f64]) -> Sheet {
        let mut sheet = Sheet::new(name);
        for (i, h) in ["VENCIMIENTO", "CUPON %", "RESIDUAL", "AMORTIZ."].iter().enumerate() {
            sheet.set(3, 4 + i as u32, (*h).into());
        }
        for (i, amort) in amortizations.iter().enumerate() {
            let row = 5 + i as u32;
            sheet.set(row, 4, date(2025 + i as i32, 1, 9).into());
            sheet.set(row, 5, 1.0.into());
            sheet.set(row, 6, 100.0.into());
            sheet.set(row, 7, (*amort).into());
        }
        sheet
    }

    fn bucket(name: &str, tickers: &[&str]) -> Sheet {
        let mut rows: Vec<Vec<CellValue>> = vec![vec![
            "Ticker".into(),
            "Emisión".into(),
            "Vencimiento".into(),
            "Monto al Vto".into(),
        ]];
        for t in tickers {
            rows.push(vec![
                (*t).into(),
                date(2024, 5, 1).into(),
                date(2026, 5, 1).into(),
                150.0.into(),
            ]);
        }
        Sheet::from_rows(name, rows)
    }

    #[test]
    fn test_sovereign_extract_classifies_every_row() {
        let book = SourceWorkbook::from_sheets(
            "sob.xlsm",
            vec![
                tir_sheet(&["AL30", "GD35", "BPY26"]),
                schedule("AL30", &[0.0, 100.0]),
                schedule("GD35", &[100.0]),
                schedule("BPY26", &[50.0, 50.0]),
            ],
        );
        let extract = extract_sovereign(&book).unwrap();
        assert_eq!(extract.tirs.len(), 3);
        assert_eq!(extract.cashflows.len(), 5);

        let labels: Vec<&str> = extract.cashflows.iter().map(|r| r.classification.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Sob. Ley Local",
                "Sob. Ley Local",
                "Sob. Ley Extranjera",
                "Bopreal",
                "Bopreal"
            ]
        );
    }

    #[test]
    fn test_ticker_without_sheet_is_fatal() {
        let book = SourceWorkbook::from_sheets(
            "sob.xlsm",
            vec![tir_sheet(&["AL30", "GD35"]), schedule("AL30", &[100.0])],
        );
        assert!(matches!(
            extract_sovereign(&book),
            Err(CashflowError::MissingSheet { sheet, .. }) if sheet == "GD35"
        ));
    }

    #[test]
    fn test_notes_classified_by_named_ranges() {
        let listas = Sheet::from_rows(
            "Listas",
            vec![vec!["YMCXO".into(), "MGCOO".into(), "PNDCO".into()]],
        );
        let book = SourceWorkbook::from_sheets(
            "ons.xlsm",
            vec![
                tir_sheet(&["YMCXO", "MGCOO", "PNDCO"]),
                schedule("YMCXO", &[100.0]),
                schedule("MGCOO", &[100.0]),
                schedule("PNDCO", &[100.0]),
                listas,
            ],
        )
        .with_defined_name("leg_arg", "Listas!$A$1")
        .with_defined_name("leg_eeuu", "Listas!$B$1")
        .with_defined_name("dl", "Listas!$C$1");

        let extract = extract_notes(&book, true).unwrap();
        let labels: Vec<(&str, &str)> = extract
            .cashflows
            .iter()
            .map(|r| (r.ticker.as_str(), r.classification.as_str()))
            .collect();
        assert_eq!(
            labels,
            vec![("YMCXO", "ON Ley Local"), ("MGCOO", "ON Ley Extr."), ("PNDCO", "ON DDL")]
        );
    }

    #[test]
    fn test_unmatched_note_warns_or_aborts() {
        let book = SourceWorkbook::from_sheets(
            "ons.xlsm",
            vec![tir_sheet(&["XXXXO"]), schedule("XXXXO", &[100.0])],
        );

        let extract = extract_notes(&book, false).unwrap();
        assert_eq!(extract.cashflows[0].classification, "");

        assert!(matches!(
            extract_notes(&book, true),
            Err(CashflowError::NoteClassification(_))
        ));
    }

    #[test]
    fn test_peso_bonds_buckets_then_individual() {
        let book = SourceWorkbook::from_sheets(
            "pesos.xlsm",
            vec![
                tir_sheet(&["TX26", "TZVD5", "M10F6", "TTM26", "TO26"]),
                bucket("Bonos_DDL", &["TZVD5", "D31O5"]),
                bucket("Bonos_CER", &[]),
                bucket("Bonos_TAMAR", &["M10F6", "TTM26"]),
                schedule("TX26", &[20.0, 80.0]),
                schedule("TO26", &[100.0]),
            ],
        );

        let extract = extract_peso_bonds(&book).unwrap();
        let summary: Vec<(&str, &str, RowOrigin)> = extract
            .cashflows
            .iter()
            .map(|r| (r.ticker.as_str(), r.classification.as_str(), r.origin))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("TZVD5", "Dollar linked", RowOrigin::LetterIssue),
                ("TZVD5", "Dollar linked", RowOrigin::LetterMaturity),
                ("M10F6", "TAMAR +Margen", RowOrigin::LetterIssue),
                ("M10F6", "TAMAR +Margen", RowOrigin::LetterMaturity),
                ("TTM26", "TAMAR con Tasa Fija", RowOrigin::LetterIssue),
                ("TTM26", "TAMAR con Tasa Fija", RowOrigin::LetterMaturity),
                ("TX26", "CER", RowOrigin::Schedule),
                ("TX26", "CER", RowOrigin::Schedule),
                ("TO26", "Bono PV", RowOrigin::Schedule),
            ]
        );
    }

    #[test]
    fn test_sheet_lookup_uses_raw_ticker_text() {
        let book = SourceWorkbook::from_sheets(
            "sob.xlsm",
            vec![tir_sheet(&["AL30", "GD35 "]), schedule("AL30", &[100.0]), schedule("GD35 ", &[100.0])],
        );
        let extract = extract_sovereign(&book).unwrap();
        assert_eq!(extract.universe, vec!["AL30", "GD35 "]);
        assert_eq!(extract.cashflows[1].ticker, "GD35 ");
        assert_eq!(extract.cashflows[1].classification, "Sob. Ley Extranjera");

        let trimmed_only = SourceWorkbook::from_sheets(
            "sob.xlsm",
            vec![tir_sheet(&["GD35 "]), schedule("GD35", &[100.0])],
        );
        assert!(matches!(
            extract_sovereign(&trimmed_only),
            Err(CashflowError::MissingSheet { sheet, .. }) if sheet == "GD35 "
        ));
    }

    #[test]
    fn test_peso_bond_membership_ignores_padding() {
        let book = SourceWorkbook::from_sheets(
            "pesos.xlsm",
            vec![
                tir_sheet(&["TZVD5 "]),
                bucket("Bonos_DDL", &["TZVD5"]),
                bucket("Bonos_CER", &[]),
                bucket("Bonos_TAMAR", &[]),
            ],
        );
        let extract = extract_peso_bonds(&book).unwrap();
        assert_eq!(extract.cashflows.len(), 2);
        assert!(extract.cashflows.iter().all(|r| r.classification == "Dollar linked"));
    }

    #[test]
    fn test_bucket_row_outside_universe_is_not_parsed() {
        let mut ddl = bucket("Bonos_DDL", &["TZVD5"]);
        ddl.set(3, 1, "D31O5".into());
        ddl.set(3, 3, date(2025, 10, 31).into());
        ddl.set(3, 4, 100.0.into());
        let book = SourceWorkbook::from_sheets(
            "pesos.xlsm",
            vec![
                tir_sheet(&["TZVD5"]),
                ddl,
                bucket("Bonos_CER", &[]),
                bucket("Bonos_TAMAR", &[]),
            ],
        );
        let extract = extract_peso_bonds(&book).unwrap();
        assert_eq!(extract.cashflows.len(), 2);
        assert!(extract.cashflows.iter().all(|r| r.ticker == "TZVD5"));
    }

    #[test]
    fn test_consolidation_order() {
        let extract = |source: SourceBook, ticker: &str| SourceExtract {
            source,
            universe: vec![ticker.to_string()],
            tirs: vec![TirRow::new(ticker, None)],
            cashflows: letter_rows(ticker, source),
        };

        let tables = consolidate(
            extract(SourceBook::Sovereign, "AL30"),
            extract(SourceBook::Notes, "YMCXO"),
            extract(SourceBook::Letters, "S31O5"),
            extract(SourceBook::PesoBonds, "TX26"),
        );

        let tir_order: Vec<&str> = tables.tirs.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tir_order, vec!["AL30", "YMCXO", "TX26", "S31O5"]);

        let cf_order: Vec<&str> = tables.cashflows.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(cf_order, vec!["S31O5", "S31O5", "AL30", "AL30", "YMCXO", "YMCXO", "TX26", "TX26"]);
    }

    fn letter_rows(ticker: &str, source: SourceBook) -> Vec<CashflowRow> {
        crate::letters::LetterInstrument {
            ticker: ticker.to_string(),
            issue: date(2025, 1, 1),
            maturity: date(2026, 1, 1),
            amount_at_maturity: 120.0,
        }
        .to_rows(source)
        .to_vec()
    }
}
