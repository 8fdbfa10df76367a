use crate::error::{CashflowError, Result};
use crate::utils::parse_cell_ref;
use crate::workbook::SourceWorkbook;
use log::debug;
use std::collections::BTreeSet;

/// One rectangular destination of a defined name, 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRegion {
    pub sheet: String,
    pub first_row: u32,
    pub first_col: u32,
    /// `None` for whole-column references (`$A:$A`): runs to the sheet's last row.
    pub last_row: Option<u32>,
    pub last_col: u32,
}

/// Splits on commas that are not inside a quoted sheet name.
fn split_areas(formula: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, ch) in formula.char_indices() {
        match ch {
            '\'' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&formula[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&formula[start..]);
    parts
}

fn column_only(reference: &str) -> Option<u32> {
    let cleaned = reference.trim_start_matches('$');
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    parse_cell_ref(&format!("{}1", cleaned)).map(|(_, col)| col)
}

fn parse_area(area: &str) -> Option<RangeRegion> {
    let bang = area.rfind('!')?;
    let (sheet_part, range_part) = (&area[..bang], &area[bang + 1..]);

    let sheet = if sheet_part.starts_with('\'') && sheet_part.ends_with('\'') && sheet_part.len() >= 2
    {
        sheet_part[1..sheet_part.len() - 1].replace("''", "'")
    } else {
        sheet_part.to_string()
    };
    if sheet.is_empty() {
        return None;
    }

    let (start, end) = match range_part.split_once(':') {
        Some((a, b)) => (a, b),
        None => (range_part, range_part),
    };

    if let (Some(c1), Some(c2)) = (column_only(start), column_only(end)) {
        return Some(RangeRegion {
            sheet,
            first_row: 1,
            first_col: c1.min(c2),
            last_row: None,
            last_col: c1.max(c2),
        });
    }

    let (r1, c1) = parse_cell_ref(start)?;
    let (r2, c2) = parse_cell_ref(end)?;
    Some(RangeRegion {
        sheet,
        first_row: r1.min(r2),
        first_col: c1.min(c2),
        last_row: Some(r1.max(r2)),
        last_col: c1.max(c2),
    })
}

/// Parses a defined-name formula such as `Hoja1!$A$2:$A$40` or
/// `('ONs Ley NY'!$B$2:$B$9,Hoja1!$A$1)` into its regions.
pub fn parse_destinations(name: &str, formula: &str) -> Result<Vec<RangeRegion>> {
    let body = formula.trim().trim_start_matches('=');
    let body = body
        .strip_prefix('(')
        .and_then(|b| b.strip_suffix(')'))
        .unwrap_or(body);

    split_areas(body)
        .into_iter()
        .map(|area| {
            parse_area(area.trim()).ok_or_else(|| CashflowError::InvalidDefinedName {
                name: name.to_string(),
                formula: formula.to_string(),
            })
        })
        .collect()
}

/// Every non-empty scalar covered by a workbook defined name, strings trimmed.
///
/// An absent name yields an empty set.
pub fn resolve_defined_name_set(workbook: &SourceWorkbook, name: &str) -> Result<BTreeSet<String>> {
    let Some((_, formula)) = workbook
        .defined_names()
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
    else {
        debug!("Defined name '{}' not present; using an empty set", name);
        return Ok(BTreeSet::new());
    };

    let mut values = BTreeSet::new();
    for region in parse_destinations(name, formula)? {
        let sheet = workbook.sheet(&region.sheet)?;
        let last_row = region.last_row.unwrap_or(sheet.max_row());

        for row in region.first_row..=last_row {
            for col in region.first_col..=region.last_col {
                if let Some(key) = sheet.cell(row, col).lookup_key() {
                    values.insert(key);
                }
            }
        }
    }

    debug!("Defined name '{}' resolved to {} values", name, values.len());
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellValue;
    use crate::workbook::Sheet;

    #[test]
    fn test_parse_single_and_multi_area() {
        let regions = parse_destinations("leg_arg", "Listas!$A$2:$A$4").unwrap();
        assert_eq!(
            regions,
            vec![RangeRegion {
                sheet: "Listas".to_string(),
                first_row: 2,
                first_col: 1,
                last_row: Some(4),
                last_col: 1,
            }]
        );

        let regions =
            parse_destinations("dl", "=('Ley, NY''s'!$B$1:$C$2,Listas!$D$7)").unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].sheet, "Ley, NY's");
        assert_eq!((regions[0].first_col, regions[0].last_col), (2, 3));
        assert_eq!(regions[1].last_row, Some(7));
    }

    #[test]
    fn test_parse_whole_column() {
        let regions = parse_destinations("dl", "Listas!$C:$C").unwrap();
        assert_eq!(regions[0].first_col, 3);
        assert_eq!(regions[0].last_row, None);
    }

    #[test]
    fn test_parse_rejects_broken_reference() {
        assert!(matches!(
            parse_destinations("dl", "#REF!"),
            Err(CashflowError::InvalidDefinedName { .. })
        ));
    }

    #[test]
    fn test_resolve_trims_and_skips_blanks() {
        let listas = Sheet::from_rows(
            "Listas",
            vec![
                vec!["YMCXO".into(), " TLCMO ".into()],
                vec![CellValue::Empty, "".into()],
                vec!["MGCOO".into(), 123.0.into()],
            ],
        );
        let otras = Sheet::from_rows("Otras", vec![vec!["RUCDO".into()]]);
        let book = SourceWorkbook::from_sheets("ons.xlsm", vec![listas, otras])
            .with_defined_name("leg_eeuu", "Listas!$A$1:$B$3,Otras!$A$1");

        let set = resolve_defined_name_set(&book, "leg_eeuu").unwrap();
        let expected: BTreeSet<String> = ["YMCXO", "TLCMO", "MGCOO", "123", "RUCDO"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(set, expected);
    }

    #[test]
    fn test_missing_name_is_empty_set() {
        let book = SourceWorkbook::from_sheets("ons.xlsm", vec![]);
        assert!(resolve_defined_name_set(&book, "dl").unwrap().is_empty());
    }
}
