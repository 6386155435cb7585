//! Cell edits applied to a worksheet part by streaming its XML
//!
//! Only the `<c>` elements named by a patch are rewritten. Everything else,
//! including formulas in other cells, row attributes and the parts of the
//! worksheet outside `<sheetData>`, is copied through unchanged. Cells and rows
//! that do not exist yet are inserted in sorted position.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::BufRead;

use super::cell_ref::{CellRef, cell_name};
use super::worksheet::{CellAttrs, row_number};
use crate::error::{ConvertError, Result};
use crate::value::CellValue;

/// A single cell edit
#[derive(Debug, Clone, PartialEq)]
pub enum CellPatch {
    /// Remove value and formula, keep the cell style
    Clear,
    /// Write a literal value, dropping any formula
    Set(CellValue),
}

/// Pending edits of one worksheet, in row-major order
#[derive(Debug, Clone, Default)]
pub struct CellPatches {
    cells: BTreeMap<(u32, u32), CellPatch>,
}

impl CellPatches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Insert/replace the edit of one cell
    pub fn set(&mut self, cell: CellRef, value: CellValue) {
        self.cells.insert((cell.row, cell.col), CellPatch::Set(value));
    }

    pub fn clear(&mut self, cell: CellRef) {
        self.cells.insert((cell.row, cell.col), CellPatch::Clear);
    }

    pub fn get(&self, cell: CellRef) -> Option<&CellPatch> {
        self.cells.get(&(cell.row, cell.col))
    }

    /// Patches grouped by 1-based row number, columns ascending
    fn by_row(&self) -> BTreeMap<u32, Vec<(u32, &CellPatch)>> {
        let mut rows: BTreeMap<u32, Vec<(u32, &CellPatch)>> = BTreeMap::new();
        for (&(row, col), patch) in &self.cells {
            rows.entry(row + 1).or_default().push((col, patch));
        }
        rows
    }
}

type RowPatches<'p> = BTreeMap<u32, Vec<(u32, &'p CellPatch)>>;

/// Rewrite a worksheet part with `patches` applied
pub(crate) fn patch_worksheet_xml(part: &str, original: &[u8], patches: &CellPatches) -> Result<Vec<u8>> {
    let mut rows = patches.by_row();
    let mut reader = Reader::from_reader(original);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(original.len() + patches.len() * 64));
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                writer.write_event(Event::Start(e))?;
                patch_sheet_data(part, &mut reader, &mut writer, &mut rows)?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                if has_writable_rows(&rows) {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    writer.write_event(Event::Start(e))?;
                    flush_rows(&mut writer, &mut rows, None)?;
                    writer.write_event(Event::End(BytesEnd::new(name)))?;
                } else {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn has_writable_rows(rows: &RowPatches) -> bool {
    rows.values()
        .flatten()
        .any(|(_, patch)| !matches!(patch, CellPatch::Clear))
}

fn patch_sheet_data<R: BufRead>(
    part: &str,
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
    rows: &mut RowPatches,
) -> Result<()> {
    let mut buf = Vec::new();
    let mut last_row = 0u32;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"row" => {
                let row_num = row_number(&e)?.unwrap_or(last_row + 1);
                last_row = row_num;
                flush_rows(writer, rows, Some(row_num))?;

                writer.write_event(Event::Start(e))?;
                if let Some(cells) = rows.remove(&row_num) {
                    // patch_row writes the closing </row>
                    patch_row(part, reader, writer, row_num, &cells)?;
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                let row_num = row_number(&e)?.unwrap_or(last_row + 1);
                last_row = row_num;
                flush_rows(writer, rows, Some(row_num))?;

                match rows.remove(&row_num) {
                    Some(cells) if cells.iter().any(|(_, p)| !matches!(p, CellPatch::Clear)) => {
                        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        writer.write_event(Event::Start(e))?;
                        for (col, patch) in cells {
                            write_new_cell(writer, row_num, col, patch)?;
                        }
                        writer.write_event(Event::End(BytesEnd::new(name)))?;
                    }
                    _ => writer.write_event(Event::Empty(e))?,
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                flush_rows(writer, rows, None)?;
                writer.write_event(Event::End(e))?;
                return Ok(());
            }
            Event::Eof => {
                return Err(ConvertError::invalid_template(
                    part,
                    "unexpected end of file inside <sheetData>",
                ));
            }
            e => writer.write_event(e)?,
        }
        buf.clear();
    }
}

fn patch_row<R: BufRead>(
    part: &str,
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    cells: &[(u32, &CellPatch)],
) -> Result<()> {
    let mut buf = Vec::new();
    let mut next = 0usize;
    let mut next_col = 0u32;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                let attrs = CellAttrs::parse(&e)?;
                let col = attrs.position.map_or(next_col, |(_, col)| col);
                next_col = col + 1;
                next = write_cells_before(writer, row_num, cells, next, col)?;

                if let Some((_, patch)) = cells.get(next).filter(|(c, _)| *c == col) {
                    next += 1;
                    skip_element(part, reader)?;
                    write_cell(writer, row_num, col, patch, attrs.style.as_deref())?;
                } else {
                    writer.write_event(Event::Start(e))?;
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let attrs = CellAttrs::parse(&e)?;
                let col = attrs.position.map_or(next_col, |(_, col)| col);
                next_col = col + 1;
                next = write_cells_before(writer, row_num, cells, next, col)?;

                if let Some((_, patch)) = cells.get(next).filter(|(c, _)| *c == col) {
                    next += 1;
                    write_cell(writer, row_num, col, patch, attrs.style.as_deref())?;
                } else {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"row" => {
                write_cells_before(writer, row_num, cells, next, u32::MAX)?;
                writer.write_event(Event::End(e))?;
                return Ok(());
            }
            Event::Eof => {
                return Err(ConvertError::invalid_template(
                    part,
                    format!("unexpected end of file inside row {}", row_num),
                ));
            }
            e => writer.write_event(e)?,
        }
        buf.clear();
    }
}

/// Insert patched cells that sort before `col` and do not exist in the row
fn write_cells_before(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    cells: &[(u32, &CellPatch)],
    mut next: usize,
    col: u32,
) -> Result<usize> {
    while let Some((patch_col, patch)) = cells.get(next).filter(|(c, _)| *c < col) {
        write_new_cell(writer, row_num, *patch_col, patch)?;
        next += 1;
    }
    Ok(next)
}

/// Write whole new rows for patches above `limit` (all of them when None)
fn flush_rows(writer: &mut Writer<Vec<u8>>, rows: &mut RowPatches, limit: Option<u32>) -> Result<()> {
    while let Some((&row_num, _)) = rows.first_key_value() {
        if limit.is_some_and(|limit| row_num >= limit) {
            break;
        }
        let Some((row_num, cells)) = rows.pop_first() else {
            break;
        };
        if cells.iter().all(|(_, patch)| matches!(patch, CellPatch::Clear)) {
            continue;
        }

        let mut row = BytesStart::new("row");
        row.push_attribute(("r", row_num.to_string().as_str()));
        writer.write_event(Event::Start(row))?;
        for (col, patch) in cells {
            write_new_cell(writer, row_num, col, patch)?;
        }
        writer.write_event(Event::End(BytesEnd::new("row")))?;
    }
    Ok(())
}

/// Consume events up to and including the `</c>` closing the current cell
fn skip_element<R: BufRead>(part: &str, reader: &mut Reader<R>) -> Result<()> {
    let mut buf = Vec::new();
    let mut depth = 1usize;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => {
                return Err(ConvertError::invalid_template(
                    part,
                    "unexpected end of file inside a cell",
                ));
            }
            _ => {}
        }
        buf.clear();
    }
}

fn write_new_cell(writer: &mut Writer<Vec<u8>>, row_num: u32, col: u32, patch: &CellPatch) -> Result<()> {
    // Clearing a cell that does not exist is a no-op
    if matches!(patch, CellPatch::Clear) {
        return Ok(());
    }
    write_cell(writer, row_num, col, patch, None)
}

fn write_cell(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    col: u32,
    patch: &CellPatch,
    style: Option<&str>,
) -> Result<()> {
    let reference = cell_name(row_num - 1, col);
    let mut start = BytesStart::new("c");
    start.push_attribute(("r", reference.as_str()));
    if let Some(style) = style {
        start.push_attribute(("s", style));
    }

    match patch {
        CellPatch::Clear | CellPatch::Set(CellValue::Empty) => {
            writer.write_event(Event::Empty(start))?;
        }
        CellPatch::Set(CellValue::Number(n)) if n.is_finite() => {
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, "v", &n.to_string())?;
            writer.write_event(Event::End(BytesEnd::new("c")))?;
        }
        CellPatch::Set(CellValue::Boolean(b)) => {
            start.push_attribute(("t", "b"));
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, "v", if *b { "1" } else { "0" })?;
            writer.write_event(Event::End(BytesEnd::new("c")))?;
        }
        CellPatch::Set(value) => {
            let raw = value.to_string();
            let text = escape_ooxml_text(&raw);
            start.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Start(BytesStart::new("is")))?;
            let mut t = BytesStart::new("t");
            if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
                t.push_attribute(("xml:space", "preserve"));
            }
            writer.write_event(Event::Start(t))?;
            writer.write_event(Event::Text(BytesText::new(&text)))?;
            writer.write_event(Event::End(BytesEnd::new("t")))?;
            writer.write_event(Event::End(BytesEnd::new("is")))?;
            writer.write_event(Event::End(BytesEnd::new("c")))?;
        }
    }
    Ok(())
}

/// Encode characters XML 1.0 cannot carry as `_xHHHH_`
///
/// A literal `_xHHHH_` in the input is protected as `_x005F_xHHHH_` so that
/// spreadsheet readers do not decode it.
fn escape_ooxml_text(text: &str) -> Cow<'_, str> {
    let needs_escape = text.chars().any(is_xml_forbidden) || text.contains("_x");
    if !needs_escape {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 16);
    for (idx, ch) in text.char_indices() {
        if is_xml_forbidden(ch) {
            out.push_str(&format!("_x{:04X}_", ch as u32));
        } else if ch == '_' && is_escape_sequence(&text[idx..]) {
            out.push_str("_x005F_");
        } else {
            out.push(ch);
        }
    }
    Cow::Owned(out)
}

fn is_xml_forbidden(ch: char) -> bool {
    matches!(ch, '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}')
}

/// Whether `text` starts with `_xHHHH_`
fn is_escape_sequence(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() >= 7
        && bytes[0] == b'_'
        && bytes[1] == b'x'
        && bytes[2..6].iter().all(u8::is_ascii_hexdigit)
        && bytes[6] == b'_'
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
