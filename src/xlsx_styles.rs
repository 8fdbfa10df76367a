//! Date cell formats for values written into a template.
//!
//! A date value is only read back as a date when its cell format has a date
//! number format. `CellStyles` answers "which `cellXfs` index should this date
//! cell use", appending date variants of existing formats to `styles.xml` when
//! the template has none.

use crate::error::Result;
use crate::xlsx_patch::{attr_value, without_attrs};
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;

/// Built-in `d/m/yyyy` short date.
pub const SHORT_DATE_FMT_ID: u32 = 14;

fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=17 | 22 | 27..=36 | 50..=58)
}

/// True when a custom format code renders a date: it has a day or year
/// token outside quoted literals and `[...]` sections.
fn is_date_format_code(code: &str) -> bool {
    let mut in_quotes = false;
    let mut in_brackets = false;
    for ch in code.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => in_brackets = true,
            ']' if !in_quotes => in_brackets = false,
            'd' | 'D' | 'y' | 'Y' if !in_quotes && !in_brackets => return true,
            _ => {}
        }
    }
    false
}

/// The `cellXfs` table of a workbook plus any date formats added to it.
#[derive(Debug, Clone)]
pub struct CellStyles {
    xml: Vec<u8>,
    custom_formats: HashMap<u32, String>,
    /// Attributes of each `cellXfs/xf`, in index order.
    xfs: Vec<Vec<(String, String)>>,
    xf_tag: String,
    added: Vec<Vec<(String, String)>>,
    date_variants: HashMap<Option<u32>, u32>,
}

impl CellStyles {
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();

        let mut custom_formats = HashMap::new();
        let mut xfs = Vec::new();
        let mut xf_tag = "xf".to_string();
        let mut in_cell_xfs = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = true,
                Event::End(ref e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
                Event::Empty(ref e) | Event::Start(ref e) if e.local_name().as_ref() == b"numFmt" => {
                    let id = attr_value(e, b"numFmtId")?.and_then(|v| v.parse().ok());
                    if let (Some(id), Some(code)) = (id, attr_value(e, b"formatCode")?) {
                        custom_formats.insert(id, code);
                    }
                }
                Event::Empty(ref e) | Event::Start(ref e)
                    if in_cell_xfs && e.local_name().as_ref() == b"xf" =>
                {
                    xf_tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let mut attrs = Vec::new();
                    for attr in e.attributes() {
                        let attr = attr?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let raw = String::from_utf8_lossy(&attr.value).into_owned();
                        let value = unescape(&raw).map(|v| v.into_owned()).unwrap_or(raw);
                        attrs.push((key, value));
                    }
                    xfs.push(attrs);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(Self {
            xml: xml.to_vec(),
            custom_formats,
            xfs,
            xf_tag,
            added: Vec::new(),
            date_variants: HashMap::new(),
        })
    }

    fn xf(&self, index: u32) -> Option<&Vec<(String, String)>> {
        let index = index as usize;
        if index < self.xfs.len() {
            self.xfs.get(index)
        } else {
            self.added.get(index - self.xfs.len())
        }
    }

    fn num_fmt_id(attrs: &[(String, String)]) -> u32 {
        attrs
            .iter()
            .find(|(key, _)| key == "numFmtId")
            .and_then(|(_, value)| value.parse().ok())
            .unwrap_or(0)
    }

    pub fn is_date_style(&self, index: u32) -> bool {
        let Some(attrs) = self.xf(index) else {
            return false;
        };
        let id = Self::num_fmt_id(attrs);
        match self.custom_formats.get(&id) {
            Some(code) => is_date_format_code(code),
            None => is_builtin_date_format(id),
        }
    }

    /// Style index for a date cell whose current style is `base`: `base`
    /// itself when it already formats dates, otherwise a copy of it (or of
    /// the default format) with the short date number format.
    pub fn date_style(&mut self, base: Option<u32>) -> u32 {
        if let Some(index) = base {
            if self.is_date_style(index) {
                return index;
            }
        }
        if let Some(&index) = self.date_variants.get(&base) {
            return index;
        }

        let mut attrs: Vec<(String, String)> = base
            .and_then(|index| self.xf(index))
            .or_else(|| self.xf(0))
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|(key, _)| key != "numFmtId" && key != "applyNumberFormat")
            .collect();
        attrs.insert(0, ("numFmtId".to_string(), SHORT_DATE_FMT_ID.to_string()));
        attrs.push(("applyNumberFormat".to_string(), "1".to_string()));
        for key in ["fontId", "fillId", "borderId"] {
            if !attrs.iter().any(|(k, _)| k == key) {
                attrs.push((key.to_string(), "0".to_string()));
            }
        }

        let index = (self.xfs.len() + self.added.len()) as u32;
        self.added.push(attrs);
        self.date_variants.insert(base, index);
        index
    }

    pub fn is_modified(&self) -> bool {
        !self.added.is_empty()
    }

    /// `styles.xml` with the added formats appended to `cellXfs`.
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        if self.added.is_empty() {
            return Ok(self.xml.clone());
        }

        let total = (self.xfs.len() + self.added.len()).to_string();
        let mut reader = Reader::from_reader(self.xml.as_slice());
        reader.config_mut().trim_text(false);
        let mut writer = Writer::new(Vec::new());
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Eof => break,
                Event::Start(ref e) if e.local_name().as_ref() == b"cellXfs" => {
                    let mut start = without_attrs(e, &[b"count"])?;
                    start.push_attribute(("count", total.as_str()));
                    writer.write_event(Event::Start(start))?;
                }
                Event::End(ref e) if e.local_name().as_ref() == b"cellXfs" => {
                    for attrs in &self.added {
                        let mut xf = BytesStart::new(self.xf_tag.clone());
                        for (key, value) in attrs {
                            xf.push_attribute((key.as_str(), value.as_str()));
                        }
                        writer.write_event(Event::Empty(xf))?;
                    }
                    writer.write_event(Event::End(e.clone()))?;
                }
                other => writer.write_event(other)?,
            }
            buf.clear();
        }
        Ok(writer.into_inner())
    }
}
