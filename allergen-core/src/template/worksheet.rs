//! Read model of a worksheet: cell text and formula flags

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;

use super::cell_ref::{CellRef, parse_cell_ref};
use crate::error::Result;

/// Content of one template cell as the populator sees it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetCell {
    /// Displayed text: shared/inline string, cached formula result or raw number
    pub text: Option<String>,
    /// Formula text without the leading `=`; empty for shared-formula children
    pub formula: Option<String>,
    /// `ref` range of a shared-formula master cell
    pub shared_ref: Option<String>,
}

impl SheetCell {
    /// Whether the cell content begins with the formula marker
    pub fn is_formula(&self) -> bool {
        self.formula.is_some() || self.text.as_deref().is_some_and(|t| t.starts_with('='))
    }

    /// Whether this cell is a shared-formula master whose range reaches
    /// columns other than `col`
    pub fn shares_beyond_column(&self, col: u32) -> bool {
        let Some(range) = self.shared_ref.as_deref() else {
            return false;
        };
        let mut ends = range.split(':').map(parse_cell_ref);
        match (ends.next(), ends.next()) {
            (Some(Some((_, first))), Some(Some((_, last)))) => first != col || last != col,
            (Some(Some((_, only))), None) => only != col,
            // Unreadable range: treat as shared elsewhere
            _ => true,
        }
    }
}

/// Non-empty cells of one worksheet, keyed by 0-based (row, col)
#[derive(Debug, Clone, Default)]
pub struct Worksheet {
    cells: BTreeMap<(u32, u32), SheetCell>,
}

impl Worksheet {
    pub fn cell(&self, cell: CellRef) -> Option<&SheetCell> {
        self.cells.get(&(cell.row, cell.col))
    }

    pub fn text(&self, cell: CellRef) -> Option<&str> {
        self.cell(cell).and_then(|c| c.text.as_deref())
    }

    /// Cells of one column in row order
    pub fn column(&self, col: u32) -> impl Iterator<Item = (u32, &SheetCell)> {
        self.cells
            .iter()
            .filter(move |((_, c), _)| *c == col)
            .map(|((row, _), cell)| (*row, cell))
    }

    /// Last row holding a cell, 0-based
    pub fn max_row(&self) -> Option<u32> {
        self.cells.keys().map(|(row, _)| *row).max()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Plain text of every `<si>` in sharedStrings.xml; phonetic runs are skipped
pub(crate) fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut strings = Vec::new();

    let mut current = String::new();
    let mut in_t = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_t = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(e) if in_t && !in_phonetic => current.push_str(&e.unescape()?),
            Event::CData(e) if in_t && !in_phonetic => {
                current.push_str(&String::from_utf8_lossy(e.as_ref()))
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_t = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

/// Position and type attributes of a `<c>` element
#[derive(Debug, Default)]
pub(crate) struct CellAttrs {
    pub position: Option<(u32, u32)>,
    pub cell_type: Option<String>,
    pub style: Option<String>,
}

impl CellAttrs {
    pub(crate) fn parse(e: &BytesStart) -> Result<Self> {
        let mut attrs = CellAttrs::default();
        for attr in e.attributes() {
            let attr = attr?;
            match attr.key.as_ref() {
                b"r" => attrs.position = parse_cell_ref(&attr.unescape_value()?),
                b"t" => attrs.cell_type = Some(attr.unescape_value()?.into_owned()),
                b"s" => attrs.style = Some(attr.unescape_value()?.into_owned()),
                _ => {}
            }
        }
        Ok(attrs)
    }
}

/// 1-based `r` attribute of a `<row>` element
pub(crate) fn row_number(e: &BytesStart) -> Result<Option<u32>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"r" {
            return Ok(attr.unescape_value()?.parse().ok());
        }
    }
    Ok(None)
}

#[derive(Default)]
struct PendingCell {
    row: u32,
    col: u32,
    cell_type: Option<String>,
    value: String,
    inline: String,
    formula: Option<String>,
    shared_ref: Option<String>,
}

impl PendingCell {
    fn finish(self, shared_strings: &[String]) -> Option<((u32, u32), SheetCell)> {
        let text = match self.cell_type.as_deref() {
            Some("s") => self
                .value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|idx| shared_strings.get(idx).cloned()),
            Some("inlineStr") => Some(self.inline),
            Some("b") => match self.value.trim() {
                "1" => Some("TRUE".to_string()),
                "0" => Some("FALSE".to_string()),
                _ => None,
            },
            _ => Some(self.value),
        }
        .filter(|t| !t.is_empty());

        if text.is_none() && self.formula.is_none() {
            return None;
        }
        Some((
            (self.row, self.col),
            SheetCell {
                text,
                formula: self.formula,
                shared_ref: self.shared_ref,
            },
        ))
    }
}

/// `ref` of an `<f t="shared">` element; only masters carry one
fn shared_formula_ref(e: &BytesStart) -> Result<Option<String>> {
    let mut shared = false;
    let mut range = None;
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"t" => shared = attr.unescape_value()? == "shared",
            b"ref" => range = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }
    Ok(range.filter(|_| shared))
}

/// Build the read model of a worksheet part
pub(crate) fn parse_worksheet(xml: &[u8], shared_strings: &[String]) -> Result<Worksheet> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut cells = BTreeMap::new();

    // Rows and cells may omit `r`; positions then follow their predecessors
    let mut last_row: Option<u32> = None;
    let mut next_col = 0u32;
    let mut pending: Option<PendingCell> = None;
    let mut in_v = false;
    let mut in_f = false;
    let mut in_t = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                let row = row_number(&e)?
                    .map(|r| r.saturating_sub(1))
                    .unwrap_or_else(|| last_row.map_or(0, |r| r + 1));
                last_row = Some(row);
                next_col = 0;
            }
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                let attrs = CellAttrs::parse(&e)?;
                let (cell_row, col) = attrs
                    .position
                    .unwrap_or((last_row.unwrap_or(0), next_col));
                next_col = col + 1;
                pending = Some(PendingCell {
                    row: cell_row,
                    col,
                    cell_type: attrs.cell_type,
                    ..Default::default()
                });
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let attrs = CellAttrs::parse(&e)?;
                let col = attrs.position.map_or(next_col, |(_, col)| col);
                next_col = col + 1;
            }
            Event::Start(e) => match e.local_name().as_ref() {
                b"v" => in_v = true,
                b"f" => {
                    in_f = true;
                    if let Some(cell) = pending.as_mut() {
                        cell.formula.get_or_insert_with(String::new);
                        cell.shared_ref = shared_formula_ref(&e)?;
                    }
                }
                b"t" => in_t = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"f" => {
                if let Some(cell) = pending.as_mut() {
                    cell.formula.get_or_insert_with(String::new);
                    cell.shared_ref = shared_formula_ref(&e)?;
                }
            }
            Event::Text(e) => {
                if let Some(cell) = pending.as_mut() {
                    let text = e.unescape()?;
                    if in_v {
                        cell.value.push_str(&text);
                    } else if in_f {
                        if let Some(formula) = cell.formula.as_mut() {
                            formula.push_str(&text);
                        }
                    } else if in_t && !in_phonetic {
                        cell.inline.push_str(&text);
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"c" => {
                    if let Some((pos, cell)) =
                        pending.take().and_then(|p| p.finish(shared_strings))
                    {
                        cells.insert(pos, cell);
                    }
                }
                b"v" => in_v = false,
                b"f" => in_f = false,
                b"t" => in_t = false,
                b"rPh" => in_phonetic = false,
                b"sheetData" => break,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(Worksheet { cells })
}
