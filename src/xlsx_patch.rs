//! In-place value patching of an `.xlsx` package.
//!
//! Only the worksheet parts being written are rewritten; every other part is
//! raw-copied so styles, tables and drawings of the template survive. Cells
//! inside a cleared block keep their style (`s`) attribute and lose their
//! value, matching what a user sees after pressing Delete in Excel.

use crate::cell::CellValue;
use crate::error::{CashflowError, Result};
use crate::utils::{column_letters, date_to_excel_serial, parse_cell_ref};
use crate::xlsx_styles::CellStyles;
use log::debug;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const CALC_CHAIN_PART: &str = "xl/calcChain.xml";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const DEFAULT_STYLES_PART: &str = "xl/styles.xml";

/// Inclusive, 1-based rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellBlock {
    pub first_row: u32,
    pub last_row: u32,
    pub first_col: u32,
    pub last_col: u32,
}

impl CellBlock {
    fn contains(&self, row: u32, col: u32) -> bool {
        (self.first_row..=self.last_row).contains(&row) && (self.first_col..=self.last_col).contains(&col)
    }
}

/// Values to write into one worksheet, located by sheet name.
#[derive(Debug, Clone)]
pub struct SheetPatch {
    pub sheet: String,
    pub clear: CellBlock,
    pub start_row: u32,
    pub start_col: u32,
    pub rows: Vec<Vec<CellValue>>,
}

pub(crate) fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            let raw = String::from_utf8_lossy(&attr.value).into_owned();
            let value = unescape(&raw).map(|v| v.into_owned()).unwrap_or(raw);
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Copy of `e` without the listed attributes.
pub(crate) fn without_attrs(e: &BytesStart<'_>, drop: &[&[u8]]) -> Result<BytesStart<'static>> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        if !drop.contains(&attr.key.as_ref()) {
            out.push_attribute(attr);
        }
    }
    Ok(out.into_owned())
}

fn element_prefix(qname: &[u8]) -> Option<String> {
    let pos = qname.iter().position(|b| *b == b':')?;
    Some(String::from_utf8_lossy(&qname[..pos]).into_owned())
}

fn prefixed(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{}:{}", p, local),
        None => local.to_string(),
    }
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<Vec<u8>>> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            Ok(Some(bytes))
        }
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Maps sheet names to worksheet part paths via `workbook.xml` and its rels.
pub fn resolve_sheet_parts(workbook_xml: &[u8], rels_xml: &[u8]) -> Result<HashMap<String, String>> {
    let mut sheets = Vec::new();
    let mut reader = Reader::from_reader(workbook_xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(ref e) | Event::Start(ref e) if e.local_name().as_ref() == b"sheet" => {
                let name = attr_value(e, b"name")?;
                let rid = attr_value(e, b"r:id")?;
                if let (Some(name), Some(rid)) = (name, rid) {
                    sheets.push((name, rid));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let mut targets = HashMap::new();
    let mut reader = Reader::from_reader(rels_xml);
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(ref e) | Event::Start(ref e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr_value(e, b"Id")?, attr_value(e, b"Target")?) {
                    targets.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets
        .into_iter()
        .filter_map(|(name, rid)| {
            let target = targets.get(&rid)?;
            let part = match target.strip_prefix('/') {
                Some(absolute) => absolute.to_string(),
                None => format!("xl/{}", target),
            };
            Some((name, part))
        })
        .collect())
}

/// Package path of the workbook's styles part.
fn styles_part(rels_xml: &[u8]) -> Result<String> {
    let mut reader = Reader::from_reader(rels_xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(ref e) | Event::Start(ref e) if e.local_name().as_ref() == b"Relationship" => {
                let is_styles = attr_value(e, b"Type")?.is_some_and(|t| t.ends_with("/styles"));
                if let (true, Some(target)) = (is_styles, attr_value(e, b"Target")?) {
                    return Ok(match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{}", target),
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(DEFAULT_STYLES_PART.to_string())
}

struct CellXml {
    start: BytesStart<'static>,
    /// Child events; empty for `<c .../>`.
    body: Vec<Event<'static>>,
}

struct RowXml {
    start: BytesStart<'static>,
    cells: BTreeMap<u32, CellXml>,
    /// Non-cell children such as `extLst`, emitted after the cells.
    trailing: Vec<Event<'static>>,
}

struct WorksheetXml {
    before: Vec<Event<'static>>,
    sheet_data: BytesStart<'static>,
    rows: BTreeMap<u32, RowXml>,
    after: Vec<Event<'static>>,
}

fn row_number(e: &BytesStart<'_>) -> Result<u32> {
    attr_value(e, b"r")?
        .and_then(|r| r.parse().ok())
        .ok_or_else(|| CashflowError::Template("worksheet row without a valid r attribute".to_string()))
}

fn cell_position(e: &BytesStart<'_>) -> Result<(u32, u32)> {
    let reference = attr_value(e, b"r")?.unwrap_or_default();
    parse_cell_ref(&reference)
        .ok_or_else(|| CashflowError::Template(format!("invalid cell reference '{}'", reference)))
}

fn parse_worksheet(xml: &[u8], part: &str) -> Result<WorksheetXml> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut before = Vec::new();
    let mut after = Vec::new();
    let mut sheet_data = None;
    let mut rows = BTreeMap::new();
    let mut done_sheet_data = false;

    let mut row: Option<(u32, RowXml)> = None;
    let mut cell: Option<(u32, CellXml)> = None;

    loop {
        let event = reader.read_event_into(&mut buf)?.into_owned();
        buf.clear();

        if let Event::Eof = event {
            break;
        }
        if done_sheet_data {
            after.push(event);
            continue;
        }
        if sheet_data.is_none() {
            match event {
                Event::Start(e) if e.local_name().as_ref() == b"sheetData" => sheet_data = Some(e),
                Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                    sheet_data = Some(e);
                    done_sheet_data = true;
                }
                other => before.push(other),
            }
            continue;
        }

        if let Some((_, current)) = cell.as_mut() {
            match event {
                Event::End(ref e) if e.local_name().as_ref() == b"c" => {
                    if let (Some((col, finished)), Some((_, r))) = (cell.take(), row.as_mut()) {
                        r.cells.insert(col, finished);
                    }
                }
                other => current.body.push(other),
            }
            continue;
        }

        match event {
            Event::Start(e) if e.local_name().as_ref() == b"row" => {
                let number = row_number(&e)?;
                row = Some((number, RowXml { start: e, cells: BTreeMap::new(), trailing: Vec::new() }));
            }
            Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                let number = row_number(&e)?;
                rows.insert(number, RowXml { start: e, cells: BTreeMap::new(), trailing: Vec::new() });
            }
            Event::End(e) if e.local_name().as_ref() == b"row" => {
                if let Some((number, finished)) = row.take() {
                    rows.insert(number, finished);
                }
            }
            Event::Start(e) if row.is_some() && e.local_name().as_ref() == b"c" => {
                let (_, col) = cell_position(&e)?;
                cell = Some((col, CellXml { start: e, body: Vec::new() }));
            }
            Event::Empty(e) if row.is_some() && e.local_name().as_ref() == b"c" => {
                let (_, col) = cell_position(&e)?;
                if let Some((_, r)) = row.as_mut() {
                    r.cells.insert(col, CellXml { start: e, body: Vec::new() });
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                done_sheet_data = true;
            }
            // Whitespace between rows is dropped; anything else inside a row is kept.
            Event::Text(_) if row.is_none() => {}
            other => {
                if let Some((_, r)) = row.as_mut() {
                    if !matches!(other, Event::Text(_)) {
                        r.trailing.push(other);
                    }
                }
            }
        }
    }

    let sheet_data = sheet_data.ok_or_else(|| {
        CashflowError::Template(format!("worksheet {} has no sheetData section", part))
    })?;

    Ok(WorksheetXml {
        before,
        sheet_data,
        rows,
        after,
    })
}

/// Error literals a worksheet can store as `t="e"`; other error text is
/// written as a string.
const ERROR_VALUES: [&str; 7] = ["#DIV/0!", "#N/A", "#NAME?", "#NULL!", "#NUM!", "#REF!", "#VALUE!"];

fn value_cell(
    reference: &str,
    style: Option<&str>,
    value: &CellValue,
    prefix: Option<&str>,
) -> Option<CellXml> {
    let mut start = BytesStart::new(prefixed(prefix, "c"));
    start.push_attribute(("r", reference));
    if let Some(s) = style {
        start.push_attribute(("s", s));
    }

    let v_tag = prefixed(prefix, "v");
    let number_body = |n: f64| {
        vec![
            Event::Start(BytesStart::new(v_tag.clone())),
            Event::Text(BytesText::new(&n.to_string()).into_owned()),
            Event::End(BytesEnd::new(v_tag.clone())),
        ]
    };

    let body = match value {
        CellValue::Empty => return None,
        CellValue::Number(n) if !n.is_finite() => return None,
        CellValue::Number(n) => number_body(*n),
        CellValue::Date(d) => number_body(date_to_excel_serial(*d)),
        CellValue::Bool(b) => {
            start.push_attribute(("t", "b"));
            number_body(if *b { 1.0 } else { 0.0 })
        }
        CellValue::Error(e) if ERROR_VALUES.contains(&e.as_str()) => {
            start.push_attribute(("t", "e"));
            vec![
                Event::Start(BytesStart::new(v_tag.clone())),
                Event::Text(BytesText::new(e).into_owned()),
                Event::End(BytesEnd::new(v_tag.clone())),
            ]
        }
        CellValue::Text(_) | CellValue::Error(_) => {
            let text = value.to_string();
            if text.is_empty() {
                return None;
            }
            start.push_attribute(("t", "inlineStr"));
            let is_tag = prefixed(prefix, "is");
            let t_tag = prefixed(prefix, "t");
            let mut t_start = BytesStart::new(t_tag.clone());
            if text.trim() != text {
                t_start.push_attribute(("xml:space", "preserve"));
            }
            vec![
                Event::Start(BytesStart::new(is_tag.clone())),
                Event::Start(t_start),
                Event::Text(BytesText::new(&text).into_owned()),
                Event::End(BytesEnd::new(t_tag)),
                Event::End(BytesEnd::new(is_tag)),
            ]
        }
    };

    Some(CellXml { start, body })
}

/// `(min, max, style)` of every `<col>` that carries a style.
fn column_styles(before: &[Event<'static>]) -> Result<Vec<(u32, u32, String)>> {
    let mut styles = Vec::new();
    for event in before {
        if let Event::Empty(e) | Event::Start(e) = event {
            if e.local_name().as_ref() != b"col" {
                continue;
            }
            let min = attr_value(e, b"min")?.and_then(|v| v.parse().ok());
            let max = attr_value(e, b"max")?.and_then(|v| v.parse().ok());
            if let (Some(min), Some(max), Some(style)) = (min, max, attr_value(e, b"style")?) {
                styles.push((min, max, style));
            }
        }
    }
    Ok(styles)
}

fn apply_patch(sheet: &mut WorksheetXml, patch: &SheetPatch, mut styles: Option<&mut CellStyles>) -> Result<()> {
    let prefix = element_prefix(sheet.sheet_data.name().as_ref());
    let prefix = prefix.as_deref();
    let col_styles = column_styles(&sheet.before)?;

    let mut cleared = 0usize;
    for (&row_number, row) in sheet.rows.range_mut(patch.clear.first_row..=patch.clear.last_row) {
        let mut remove = Vec::new();
        for (&col, cell) in row.cells.iter_mut() {
            if !patch.clear.contains(row_number, col) {
                continue;
            }
            if attr_value(&cell.start, b"s")?.is_some() {
                cell.start = without_attrs(&cell.start, &[b"t", b"cm", b"vm"])?;
                cell.body.clear();
            } else {
                remove.push(col);
            }
            cleared += 1;
        }
        for col in remove {
            row.cells.remove(&col);
        }
        row.start = without_attrs(&row.start, &[b"spans"])?;
    }

    let mut written = 0usize;
    for (i, values) in patch.rows.iter().enumerate() {
        let row_number = patch.start_row + i as u32;
        let row = sheet.rows.entry(row_number).or_insert_with(|| {
            let mut start = BytesStart::new(prefixed(prefix, "row"));
            start.push_attribute(("r", row_number.to_string().as_str()));
            RowXml {
                start,
                cells: BTreeMap::new(),
                trailing: Vec::new(),
            }
        });
        row.start = without_attrs(&row.start, &[b"spans"])?;

        for (j, value) in values.iter().enumerate() {
            let col = patch.start_col + j as u32;
            let reference = format!("{}{}", column_letters(col), row_number);
            let mut style = match row.cells.get(&col) {
                Some(existing) => attr_value(&existing.start, b"s")?,
                None => None,
            };
            if style.is_none() {
                style = col_styles
                    .iter()
                    .find(|(min, max, _)| (*min..=*max).contains(&col))
                    .map(|(_, _, s)| s.clone());
            }
            if let (CellValue::Date(_), Some(styles)) = (value, styles.as_mut()) {
                let base = style.as_deref().and_then(|s| s.parse().ok());
                style = Some(styles.date_style(base).to_string());
            }
            match value_cell(&reference, style.as_deref(), value, prefix) {
                Some(cell) => {
                    row.cells.insert(col, cell);
                    written += 1;
                }
                None => {
                    if style.is_none() {
                        row.cells.remove(&col);
                    }
                }
            }
        }
    }

    debug!(
        "Sheet '{}': cleared {} cells, wrote {} cells",
        patch.sheet, cleared, written
    );
    Ok(())
}

fn used_dimension(rows: &BTreeMap<u32, RowXml>) -> String {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (&r, row) in rows {
        for &c in row.cells.keys() {
            bounds = Some(match bounds {
                None => (r, c, r, c),
                Some((r0, c0, r1, c1)) => (r0.min(r), c0.min(c), r1.max(r), c1.max(c)),
            });
        }
    }
    match bounds {
        None => "A1".to_string(),
        Some((r0, c0, r1, c1)) if (r0, c0) == (r1, c1) => format!("{}{}", column_letters(c0), r0),
        Some((r0, c0, r1, c1)) => format!(
            "{}{}:{}{}",
            column_letters(c0),
            r0,
            column_letters(c1),
            r1
        ),
    }
}

fn write_worksheet(sheet: WorksheetXml) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    let dimension = used_dimension(&sheet.rows);

    for event in sheet.before {
        match event {
            Event::Empty(ref e) if e.local_name().as_ref() == b"dimension" => {
                let mut updated = without_attrs(e, &[b"ref"])?;
                updated.push_attribute(("ref", dimension.as_str()));
                writer.write_event(Event::Empty(updated))?;
            }
            other => writer.write_event(other)?,
        }
    }

    let sheet_data_name = String::from_utf8_lossy(sheet.sheet_data.name().as_ref()).into_owned();
    writer.write_event(Event::Start(sheet.sheet_data.clone()))?;

    for (_, row) in sheet.rows {
        let row_name = String::from_utf8_lossy(row.start.name().as_ref()).into_owned();
        if row.cells.is_empty() && row.trailing.is_empty() {
            writer.write_event(Event::Empty(row.start))?;
            continue;
        }
        writer.write_event(Event::Start(row.start))?;
        for (_, cell) in row.cells {
            if cell.body.is_empty() {
                writer.write_event(Event::Empty(cell.start))?;
                continue;
            }
            let cell_name = String::from_utf8_lossy(cell.start.name().as_ref()).into_owned();
            writer.write_event(Event::Start(cell.start))?;
            for event in cell.body {
                writer.write_event(event)?;
            }
            writer.write_event(Event::End(BytesEnd::new(cell_name)))?;
        }
        for event in row.trailing {
            writer.write_event(event)?;
        }
        writer.write_event(Event::End(BytesEnd::new(row_name)))?;
    }

    writer.write_event(Event::End(BytesEnd::new(sheet_data_name)))?;
    for event in sheet.after {
        writer.write_event(event)?;
    }

    Ok(writer.into_inner())
}

/// Rewrites a worksheet part with `patch` applied.
///
/// Date values get a date-formatted style from `styles` when one is given.
pub fn patch_worksheet_xml(
    xml: &[u8],
    part: &str,
    patch: &SheetPatch,
    styles: Option<&mut CellStyles>,
) -> Result<Vec<u8>> {
    let mut sheet = parse_worksheet(xml, part)?;
    apply_patch(&mut sheet, patch, styles)?;
    write_worksheet(sheet)
}

/// Drops empty elements named `local` whose `attr` value satisfies `matches`.
fn drop_elements<F>(xml: &[u8], local: &[u8], attr: &[u8], matches: F) -> Result<Vec<u8>>
where
    F: Fn(&str) -> bool,
{
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            Event::Empty(ref e) if e.local_name().as_ref() == local => {
                let value = attr_value(e, attr)?.unwrap_or_default();
                if !matches(&value) {
                    writer.write_event(Event::Empty(e.clone()))?;
                }
            }
            other => writer.write_event(other)?,
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}

/// Applies `patches` to the workbook at `path`, replacing the file.
pub fn patch_workbook(path: &Path, patches: &[SheetPatch]) -> Result<()> {
    let bytes = fs::read(path)?;
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let workbook_xml = read_part(&mut archive, WORKBOOK_PART)?
        .ok_or_else(|| CashflowError::Template(format!("{} missing", WORKBOOK_PART)))?;
    let rels_xml = read_part(&mut archive, WORKBOOK_RELS_PART)?
        .ok_or_else(|| CashflowError::Template(format!("{} missing", WORKBOOK_RELS_PART)))?;
    let sheet_parts = resolve_sheet_parts(&workbook_xml, &rels_xml)?;

    let styles_part = styles_part(&rels_xml)?;
    let mut styles = match read_part(&mut archive, &styles_part)? {
        Some(xml) => Some(CellStyles::parse(&xml)?),
        None => None,
    };

    let mut rewritten: HashMap<String, Vec<u8>> = HashMap::new();
    for patch in patches {
        let part = sheet_parts.get(&patch.sheet).ok_or_else(|| {
            CashflowError::Template(format!("template has no sheet named '{}'", patch.sheet))
        })?;
        let xml = match rewritten.remove(part) {
            Some(xml) => xml,
            None => read_part(&mut archive, part)?
                .ok_or_else(|| CashflowError::Template(format!("worksheet part {} missing", part)))?,
        };
        rewritten.insert(part.clone(), patch_worksheet_xml(&xml, part, patch, styles.as_mut())?);
    }
    if let Some(styles) = styles.as_ref().filter(|styles| styles.is_modified()) {
        rewritten.insert(styles_part, styles.to_xml()?);
    }

    let drop_calc_chain = archive.file_names().any(|name| name == CALC_CHAIN_PART);
    if drop_calc_chain {
        if let Some(xml) = read_part(&mut archive, CONTENT_TYPES_PART)? {
            let updated = drop_elements(&xml, b"Override", b"PartName", |v| v == "/xl/calcChain.xml")?;
            rewritten.insert(CONTENT_TYPES_PART.to_string(), updated);
        }
        let updated = drop_elements(&rels_xml, b"Relationship", b"Type", |v| v.ends_with("/calcChain"))?;
        rewritten.insert(WORKBOOK_RELS_PART.to_string(), updated);
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for i in 0..archive.len() {
        let file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();

        if drop_calc_chain && name == CALC_CHAIN_PART {
            continue;
        }
        match rewritten.remove(&name) {
            Some(bytes) => {
                drop(file);
                zip.start_file(name, options)?;
                std::io::Write::write_all(&mut zip, &bytes)?;
            }
            None => zip.raw_copy_file(file)?,
        }
    }

    let output = zip.finish()?.into_inner();
    fs::write(path, output)?;
    Ok(())
}
