//! Workbook builders shared by the integration tests

#![allow(dead_code)]

use calamine::{Data, Range, Reader, Xlsx, open_workbook_from_rs};
use rust_xlsxwriter::Workbook;
use std::io::{Cursor, Read};
use std::path::Path;

pub const DETAIL_TEMPLATE: &str = "83 CFF.xlsx";
pub const CONSOLIDATED_TEMPLATE: &str = "26 통합.xlsx";

const LOOKUP: &str = r#"=IFERROR(VLOOKUP(B{row},Sheet2!A:B,2,FALSE),"")"#;

/// CFF 83 template: labels in B, lookup formulas in D, metadata in C3:C5,
/// plus the lookup sheet "Sheet2"
pub fn detail_template(labels: &[&str]) -> anyhow::Result<Vec<u8>> {
    let mut workbook = Workbook::new();

    let form = workbook.add_worksheet().set_name("Form")?;
    form.write_string(0, 0, "ALLERGEN DECLARATION (83)")?;
    form.write_string(2, 1, "Customer")?;
    form.write_string(3, 1, "Product")?;
    form.write_string(4, 1, "Date")?;
    form.write_string(5, 1, "Substance")?;
    form.write_string(5, 3, "Result")?;
    for (i, label) in labels.iter().enumerate() {
        let row = 6 + i as u32;
        form.write_string(row, 1, *label)?;
        form.write_formula(row, 3, LOOKUP.replace("{row}", &(row + 1).to_string()).as_str())?;
        form.write_formula(row, 4, format!("=LEN(B{})", row + 1).as_str())?;
    }

    let lookup = workbook.add_worksheet().set_name("Sheet2")?;
    lookup.write_string(0, 0, "7732-18-5")?;
    lookup.write_string(0, 1, "stale")?;

    Ok(workbook.save_to_buffer()?)
}

/// CFF 26 template: labels in A, targets in C, customer B2, product B3, date F2
pub fn consolidated_template(rows: &[(&str, Option<&str>)]) -> anyhow::Result<Vec<u8>> {
    let mut workbook = Workbook::new();

    let form = workbook.add_worksheet().set_name("통합")?;
    form.write_string(0, 0, "ALLERGEN (26)")?;
    form.write_string(1, 0, "Customer")?;
    form.write_string(2, 0, "Product")?;
    form.write_string(1, 4, "Date")?;
    for (i, (label, target)) in rows.iter().enumerate() {
        let row = 4 + i as u32;
        form.write_string(row, 0, *label)?;
        if let Some(target) = target {
            form.write_string(row, 2, *target)?;
        }
    }
    form.write_formula(30, 2, "=COUNTA(C5:C29)")?;

    let notes = workbook.add_worksheet().set_name("Sheet2")?;
    notes.write_string(0, 0, "kept")?;

    Ok(workbook.save_to_buffer()?)
}

/// Supplier sheet: header row, CAS text in F, value in L
pub fn source_workbook(rows: &[(&str, SourceValue)]) -> anyhow::Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "No.")?;
    sheet.write_string(0, 5, "CAS")?;
    sheet.write_string(0, 11, "Result")?;

    for (i, (cas_text, value)) in rows.iter().enumerate() {
        let row = 1 + i as u32;
        sheet.write_number(row, 0, (i + 1) as f64)?;
        sheet.write_string(row, 5, *cas_text)?;
        match value {
            SourceValue::Text(text) => {
                sheet.write_string(row, 11, *text)?;
            }
            SourceValue::Number(n) => {
                sheet.write_number(row, 11, *n)?;
            }
            SourceValue::Blank => {}
        }
    }

    // A second sheet is never read
    let other = workbook.add_worksheet();
    other.write_string(1, 5, "50-00-0")?;
    other.write_string(1, 11, "ignored")?;

    Ok(workbook.save_to_buffer()?)
}

pub enum SourceValue {
    Text(&'static str),
    Number(f64),
    Blank,
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> anyhow::Result<std::path::PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

pub struct Output {
    workbook: Xlsx<Cursor<Vec<u8>>>,
}

impl Output {
    pub fn open(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            workbook: open_workbook_from_rs(Cursor::new(bytes.to_vec()))?,
        })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names()
    }

    pub fn values(&mut self, sheet: &str) -> anyhow::Result<Range<Data>> {
        Ok(self.workbook.worksheet_range(sheet)?)
    }

    pub fn formulas(&mut self, sheet: &str) -> anyhow::Result<Range<String>> {
        Ok(self.workbook.worksheet_formula(sheet)?)
    }
}

/// Text of a cell, empty when the cell is absent or blank
pub fn text_at(range: &Range<Data>, row: u32, col: u32) -> String {
    match range.get_value((row, col)) {
        Some(Data::String(s)) => s.clone(),
        Some(Data::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

pub fn formula_at(range: &Range<String>, row: u32, col: u32) -> String {
    range.get_value((row, col)).cloned().unwrap_or_default()
}

/// Raw bytes of one zip part
pub fn zip_part(bytes: &[u8], name: &str) -> Option<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).ok()?;
    let mut file = archive.by_name(name).ok()?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).ok()?;
    Some(data)
}

pub fn zip_part_names(bytes: &[u8]) -> Vec<String> {
    match zip::ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive.file_names().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}
