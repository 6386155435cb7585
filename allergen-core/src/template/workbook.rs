//! Workbook-level XML: sheet listing, relationships and sheet removal

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::Result;

pub(crate) const WORKBOOK_PART: &str = "xl/workbook.xml";
pub(crate) const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const CALC_CHAIN_REL_TYPE: &str = "/calcChain";

/// A `<sheet>` entry of workbook.xml
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SheetEntry {
    pub name: String,
    pub rel_id: String,
}

/// A `<Relationship>` of a .rels part
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

impl Relationship {
    pub(crate) fn is_calc_chain(&self) -> bool {
        self.rel_type.ends_with(CALC_CHAIN_REL_TYPE)
    }
}

fn attr_value(e: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Sheets in workbook order
pub(crate) fn parse_sheets(workbook_xml: &[u8]) -> Result<Vec<SheetEntry>> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = String::new();
                let mut rel_id = String::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"name" {
                        name = attr.unescape_value()?.into_owned();
                    } else if attr.key.local_name().as_ref() == b"id" && attr.key.prefix().is_some()
                    {
                        rel_id = attr.unescape_value()?.into_owned();
                    }
                }
                sheets.push(SheetEntry { name, rel_id });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

/// Index of the active sheet (`workbookView/@activeTab`, default 0)
pub(crate) fn active_tab(workbook_xml: &[u8]) -> Result<usize> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"workbookView" => {
                let tab = attr_value(&e, b"activeTab")?;
                return Ok(tab.and_then(|t| t.parse().ok()).unwrap_or(0));
            }
            Event::Start(e) if e.local_name().as_ref() == b"sheets" => return Ok(0),
            Event::Eof => return Ok(0),
            _ => {}
        }
        buf.clear();
    }
}

pub(crate) fn parse_relationships(rels_xml: &[u8]) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_reader(rels_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut rels = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                rels.push(Relationship {
                    id: attr_value(&e, b"Id")?.unwrap_or_default(),
                    rel_type: attr_value(&e, b"Type")?.unwrap_or_default(),
                    target: attr_value(&e, b"Target")?.unwrap_or_default(),
                });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

/// Resolve a relationship target against the directory of its source part
pub(crate) fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Path of the .rels part belonging to `part` ("xl/worksheets/sheet1.xml" -> "xl/worksheets/_rels/sheet1.xml.rels")
pub(crate) fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Copy of `e` with numeric sheet-index attributes shifted down past a removed sheet
fn shift_sheet_indices(e: &BytesStart, keys: &[&[u8]], removed: usize) -> Result<BytesStart<'static>> {
    let mut shifted = BytesStart::new(element_name(e));
    for attr in e.attributes() {
        let attr = attr?;
        let index = if keys.contains(&attr.key.as_ref()) {
            attr.unescape_value()?.parse::<usize>().ok()
        } else {
            None
        };

        match index {
            Some(n) if n >= removed => {
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                let value = n.saturating_sub(1).to_string();
                shifted.push_attribute((key.as_str(), value.as_str()));
            }
            _ => shifted.push_attribute(attr),
        }
    }
    Ok(shifted)
}

/// Drop the `<sheet>` named `sheet_name` (at position `removed`) from workbook.xml,
/// together with names local to it, and re-index the remaining sheet references
pub(crate) fn remove_sheet_from_workbook_xml(
    xml: &[u8],
    sheet_name: &str,
    removed: usize,
) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    // Depth inside an element being dropped
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;

        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
            continue;
        }

        match event {
            Event::Start(e) if e.local_name().as_ref() == b"sheet" => {
                if attr_value(&e, b"name")?.as_deref() == Some(sheet_name) {
                    skip_depth = 1;
                } else {
                    writer.write_event(Event::Start(e))?;
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                if attr_value(&e, b"name")?.as_deref() != Some(sheet_name) {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"definedName" => {
                match attr_value(&e, b"localSheetId")?.and_then(|v| v.parse::<usize>().ok()) {
                    Some(id) if id == removed => skip_depth = 1,
                    Some(_) => {
                        let shifted = shift_sheet_indices(&e, &[b"localSheetId"], removed)?;
                        writer.write_event(Event::Start(shifted))?;
                    }
                    None => writer.write_event(Event::Start(e))?,
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"workbookView" => {
                let shifted = shift_sheet_indices(&e, &[b"activeTab", b"firstSheet"], removed)?;
                writer.write_event(Event::Empty(shifted))?;
            }
            Event::Start(e) if e.local_name().as_ref() == b"workbookView" => {
                let shifted = shift_sheet_indices(&e, &[b"activeTab", b"firstSheet"], removed)?;
                writer.write_event(Event::Start(shifted))?;
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

/// Drop the `<Relationship>` with the given Id
pub(crate) fn remove_relationship(xml: &[u8], rel_id: &str) -> Result<Vec<u8>> {
    filter_empty_elements(xml, b"Relationship", |e| {
        Ok(attr_value(e, b"Id")?.as_deref() != Some(rel_id))
    })
}

/// Drop the `<Override>` declaring the content type of `part`
pub(crate) fn remove_content_type_override(xml: &[u8], part: &str) -> Result<Vec<u8>> {
    let part_name = format!("/{}", part);
    filter_empty_elements(xml, b"Override", |e| {
        Ok(attr_value(e, b"PartName")?.as_deref() != Some(part_name.as_str()))
    })
}

fn filter_empty_elements<F>(xml: &[u8], local_name: &[u8], mut keep: F) -> Result<Vec<u8>>
where
    F: FnMut(&BytesStart) -> Result<bool>,
{
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) if e.local_name().as_ref() == local_name => {
                if keep(&e)? {
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

/// Set `fullCalcOnLoad="1"` on an existing `<calcPr>`; returns None when there is none
pub(crate) fn force_full_calc_on_load(xml: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 32));
    let mut buf = Vec::new();
    let mut found = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) if e.local_name().as_ref() == b"calcPr" => {
                found = true;
                writer.write_event(Event::Empty(with_full_calc(&e)?))?;
            }
            Event::Start(e) if e.local_name().as_ref() == b"calcPr" => {
                found = true;
                writer.write_event(Event::Start(with_full_calc(&e)?))?;
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
        buf.clear();
    }

    Ok(found.then(|| writer.into_inner()))
}

fn with_full_calc(e: &BytesStart) -> Result<BytesStart<'static>> {
    let mut updated = BytesStart::new(element_name(e));
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() != b"fullCalcOnLoad" {
            updated.push_attribute(attr);
        }
    }
    updated.push_attribute(("fullCalcOnLoad", "1"));
    Ok(updated)
}
