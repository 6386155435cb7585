//! Supplier sheet reader using calamine
//!
//! Only the first worksheet is read. Columns are addressed by fixed position
//! (no header-name validation); rows shorter than a configured column simply
//! have no value there.

use calamine::{Data, Range, Reader, Sheets, open_workbook_auto, open_workbook_auto_from_rs};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::error::{ConvertError, Result};
use crate::value::CellValue;

/// One row of the uploaded spreadsheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRow {
    /// 1-based row number in the sheet
    pub row: u32,
    /// Free text that may embed CAS numbers
    pub cas_text: Option<String>,
    /// Value propagated into the template target column
    pub value: CellValue,
}

impl SourceRow {
    pub fn new(row: u32, cas_text: Option<&str>, value: impl Into<CellValue>) -> Self {
        Self {
            row,
            cas_text: cas_text.map(str::to_string),
            value: value.into(),
        }
    }
}

/// Read source rows from a spreadsheet file (xlsx, xlsm, xls, xlsb or ods)
pub fn read_source<P: AsRef<Path>>(path: P, config: &SourceConfig) -> Result<Vec<SourceRow>> {
    let path = path.as_ref();
    let origin = path.display().to_string();
    let mut workbook: Sheets<_> = open_workbook_auto(path).map_err(|e| input_error(&origin, e))?;
    first_sheet_rows(&mut workbook, &origin, config)
}

/// Read source rows from an in-memory upload
pub fn read_source_bytes(bytes: Vec<u8>, config: &SourceConfig) -> Result<Vec<SourceRow>> {
    let origin = "<upload>".to_string();
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| input_error(&origin, e))?;
    first_sheet_rows(&mut workbook, &origin, config)
}

fn first_sheet_rows<RS>(
    workbook: &mut Sheets<RS>,
    origin: &str,
    config: &SourceConfig,
) -> Result<Vec<SourceRow>>
where
    RS: std::io::Read + std::io::Seek,
{
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| input_error(origin, e))?,
        None => {
            return Err(ConvertError::InputRead {
                origin: origin.to_string(),
                reason: "workbook has no worksheets".to_string(),
            });
        }
    };

    let rows = rows_from_range(&range, config);
    debug!(origin, rows = rows.len(), "read source sheet");
    Ok(rows)
}

/// Collect data rows from a worksheet range using absolute sheet positions
pub fn rows_from_range(range: &Range<Data>, config: &SourceConfig) -> Vec<SourceRow> {
    let (Some((_, _)), Some((end_row, _))) = (range.start(), range.end()) else {
        warn!("source sheet is empty");
        return Vec::new();
    };

    let cas_col = config.cas_column.index();
    let value_col = config.value_column.index();

    (config.header_rows..=end_row)
        .filter_map(|row| {
            let cas_text = range
                .get_value((row, cas_col))
                .map(CellValue::from)
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string());
            let value = range
                .get_value((row, value_col))
                .map(CellValue::from)
                .unwrap_or_default();

            if cas_text.is_none() && value.is_empty() {
                return None;
            }

            Some(SourceRow {
                row: row + 1,
                cas_text,
                value,
            })
        })
        .collect()
}

fn input_error(origin: &str, err: impl std::fmt::Display) -> ConvertError {
    ConvertError::InputRead {
        origin: origin.to_string(),
        reason: err.to_string(),
    }
}
