//! Template population: CAS matching plus metadata cells

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cas::extract_cas;
use crate::error::{ConvertError, Result};
use crate::index::SourceIndex;
use crate::source::SourceRow;
use crate::template::{CellPatches, CellRef, TemplateDocument};
use crate::value::CellValue;
use crate::variant::FieldLayout;

/// Date format written into the date cell
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Caller-supplied fields written into every form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub customer_name: String,
    pub product_name: String,
    pub date: NaiveDate,
}

/// What a population pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PopulateSummary {
    /// Distinct CAS numbers in the source
    pub indexed_cas: usize,
    /// Template rows whose target cell received a source value
    pub matched_rows: usize,
    /// Formulas cleared from the target column by housekeeping
    pub stripped_formulas: usize,
    /// Secondary sheet removed by housekeeping
    pub removed_sheet: Option<String>,
}

/// Fill `template` from `rows` according to `layout`
///
/// Steps, in order: build the CAS index, run the layout's housekeeping,
/// write the first index hit of every label cell into its target cell and
/// finally write customer, product and date. Target cells of rows without a
/// hit keep their template content.
pub fn populate(
    rows: &[SourceRow],
    template: &mut TemplateDocument,
    layout: &FieldLayout,
    metadata: &Metadata,
) -> Result<PopulateSummary> {
    let index = SourceIndex::build(rows);
    let mut summary = PopulateSummary {
        indexed_cas: index.len(),
        ..Default::default()
    };
    if index.is_empty() {
        warn!(template = template.name(), "no CAS numbers found in source rows");
    }

    let sheet = template.primary_sheet()?;
    let label_col = layout.label_column.index();
    let target_col = layout.target_column.index();
    let mut patches = CellPatches::new();

    let mut strip_formulas = false;
    if let Some(housekeeping) = &layout.housekeeping {
        strip_formulas = housekeeping.strip_target_formulas;

        if let Some(name) = housekeeping.remove_sheet.as_deref() {
            if name == sheet.name {
                return Err(ConvertError::invalid_template(
                    template.name(),
                    format!("housekeeping would remove the primary sheet '{}'", name),
                ));
            }
            if template.remove_sheet(name)? {
                summary.removed_sheet = Some(name.to_string());
            } else {
                debug!(template = template.name(), sheet = name, "secondary sheet not present");
            }
        }
    }

    let worksheet = template.worksheet(&sheet)?;

    if strip_formulas {
        for (row, cell) in worksheet.column(target_col) {
            if !cell.is_formula() {
                continue;
            }
            let target = CellRef::new(row, target_col);
            if cell.shares_beyond_column(target_col) {
                warn!(
                    template = template.name(),
                    %target,
                    range = cell.shared_ref.as_deref().unwrap_or_default(),
                    "keeping shared formula that reaches other columns"
                );
                continue;
            }
            patches.clear(target);
            summary.stripped_formulas += 1;
        }
        debug!(
            template = template.name(),
            count = summary.stripped_formulas,
            "stripped target column formulas"
        );
    }

    for (row, cell) in worksheet.column(label_col) {
        let Some(label) = cell.text.as_deref() else {
            continue;
        };
        if let Some((cas, value)) = index.first_hit(extract_cas(Some(label))) {
            let target = CellRef::new(row, target_col);
            debug!(%target, cas, %value, "matched template row");
            match value {
                CellValue::Empty => patches.clear(target),
                value => patches.set(target, value.clone()),
            }
            summary.matched_rows += 1;
        }
    }

    let date = metadata.date.format(DATE_FORMAT).to_string();
    patches.set(layout.customer_cell, CellValue::Text(metadata.customer_name.clone()));
    patches.set(layout.product_cell, CellValue::Text(metadata.product_name.clone()));
    patches.set(layout.date_cell, CellValue::Text(date));

    template.apply_patches(&sheet, &patches)?;
    if summary.stripped_formulas > 0 {
        template.drop_calc_chain()?;
    }

    info!(
        template = template.name(),
        sheet = %sheet.name,
        matched = summary.matched_rows,
        stripped = summary.stripped_formulas,
        "populated template"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::ColumnRef;
    use crate::template::test_support::mock_xlsx;
    use crate::variant::Housekeeping;

    fn layout(housekeeping: Option<Housekeeping>) -> FieldLayout {
        FieldLayout {
            label_column: ColumnRef(1),
            target_column: ColumnRef(3),
            customer_cell: CellRef::new(2, 2),
            product_cell: CellRef::new(3, 2),
            date_cell: CellRef::new(4, 2),
            housekeeping,
        }
    }

    fn metadata() -> Metadata {
        Metadata {
            customer_name: "Acme".to_string(),
            product_name: "Widget".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 7).unwrap(),
        }
    }

    fn label_row(row: u32, label: &str, target: &str) -> String {
        format!(
            r#"<row r="{row}"><c r="B{row}" t="inlineStr"><is><t>{label}</t></is></c>{target}</row>"#
        )
    }

    fn populated(sheet_data: &str, rows: &[SourceRow], layout: &FieldLayout) -> (TemplateDocument, PopulateSummary) {
        let bytes = mock_xlsx(&[("Form", sheet_data), ("Sheet2", "")], 0, true);
        let mut doc = TemplateDocument::from_bytes("83 CFF.xlsx", &bytes).unwrap();
        let summary = populate(rows, &mut doc, layout, &metadata()).unwrap();
        let doc = TemplateDocument::from_bytes("83 CFF.xlsx", &doc.to_bytes().unwrap()).unwrap();
        (doc, summary)
    }

    fn target_text(doc: &TemplateDocument, row: u32) -> Option<String> {
        let sheet = doc.primary_sheet().unwrap();
        doc.worksheet(&sheet)
            .unwrap()
            .text(CellRef::new(row, 3))
            .map(str::to_string)
    }

    #[test]
    fn test_first_match_wins_in_extraction_order() {
        let data = [
            label_row(6, "Formaldehyde 50-00-0, Ethanol 64-17-5", ""),
            label_row(7, "Ethanol 64-17-5 / Formaldehyde 50-00-0", ""),
            label_row(8, "Unknown 1234-56-7, Ethanol 64-17-5", ""),
        ]
        .concat();
        let rows = vec![
            SourceRow::new(2, Some("64-17-5"), "ethanol"),
            SourceRow::new(3, Some("50-00-0"), "formaldehyde"),
        ];
        let (doc, summary) = populated(&data, &rows, &layout(None));

        assert_eq!(summary.matched_rows, 3);
        assert_eq!(target_text(&doc, 5).as_deref(), Some("formaldehyde"));
        assert_eq!(target_text(&doc, 6).as_deref(), Some("ethanol"));
        assert_eq!(target_text(&doc, 7).as_deref(), Some("ethanol"));
    }

    #[test]
    fn test_miss_leaves_target_untouched() {
        let data = label_row(6, "Limonene 5989-27-5", r#"<c r="D6" t="inlineStr"><is><t>keep me</t></is></c>"#);
        let rows = vec![SourceRow::new(2, Some("7732-18-5"), "Negative")];
        let (doc, summary) = populated(&data, &rows, &layout(None));

        assert_eq!(summary.matched_rows, 0);
        assert_eq!(target_text(&doc, 5).as_deref(), Some("keep me"));
    }

    #[test]
    fn test_housekeeping_strips_formulas_and_sheet() {
        let data = [
            label_row(6, "Water 7732-18-5", r#"<c r="D6"><f>VLOOKUP(B6,Sheet2!A:B,2,0)</f><v>0</v></c>"#),
            label_row(7, "Nothing here", r#"<c r="D7"><f>VLOOKUP(B7,Sheet2!A:B,2,0)</f><v>0</v></c>"#),
            r#"<row r="8"><c r="E8"><f>SUM(D6:D7)</f><v>0</v></c></row>"#.to_string(),
        ]
        .concat();
        let rows = vec![SourceRow::new(2, Some("CAS: 7732-18-5 (water)"), "Negative")];
        let housekeeping = Housekeeping {
            strip_target_formulas: true,
            remove_sheet: Some("Sheet2".to_string()),
        };
        let (doc, summary) = populated(&data, &rows, &layout(Some(housekeeping)));

        assert_eq!(summary.stripped_formulas, 2);
        assert_eq!(summary.removed_sheet.as_deref(), Some("Sheet2"));
        assert!(doc.sheet("Sheet2").unwrap().is_none());
        assert!(doc.part("xl/calcChain.xml").is_none());

        let sheet = doc.primary_sheet().unwrap();
        let ws = doc.worksheet(&sheet).unwrap();
        assert!(ws.column(3).all(|(_, cell)| !cell.is_formula()));
        assert_eq!(ws.text(CellRef::new(5, 3)), Some("Negative"));
        assert!(ws.cell(CellRef::new(6, 3)).is_none());
        // Formulas outside the target column survive
        assert!(ws.cell(CellRef::new(7, 4)).unwrap().is_formula());
    }

    #[test]
    fn test_shared_formula_reaching_other_columns_is_kept() {
        let data = [
            label_row(
                6,
                "Nothing",
                r#"<c r="D6"><f t="shared" ref="D6:E7" si="0">A6*2</f><v>0</v></c><c r="E6"><f t="shared" si="0"/><v>0</v></c>"#,
            ),
            label_row(
                7,
                "Nothing",
                r#"<c r="D7"><f t="shared" si="0"/><v>0</v></c><c r="E7"><f t="shared" si="0"/><v>0</v></c>"#,
            ),
            label_row(8, "Nothing", r#"<c r="D8"><f t="shared" ref="D8:D9" si="1">A8</f><v>0</v></c>"#),
            label_row(9, "Nothing", r#"<c r="D9"><f t="shared" si="1"/><v>0</v></c>"#),
        ]
        .concat();
        let housekeeping = Housekeeping {
            strip_target_formulas: true,
            remove_sheet: None,
        };
        let (doc, summary) = populated(&data, &[], &layout(Some(housekeeping)));

        // D7 is a child and is cleared; the D6 master and its E children stay
        assert_eq!(summary.stripped_formulas, 3);
        let sheet = doc.primary_sheet().unwrap();
        let ws = doc.worksheet(&sheet).unwrap();
        assert_eq!(ws.cell(CellRef::new(5, 3)).unwrap().shared_ref.as_deref(), Some("D6:E7"));
        assert!(ws.cell(CellRef::new(5, 4)).unwrap().is_formula());
        assert!(ws.cell(CellRef::new(6, 3)).is_none());
        assert!(ws.cell(CellRef::new(7, 3)).is_none());
        assert!(ws.cell(CellRef::new(8, 3)).is_none());
    }

    #[test]
    fn test_control_characters_never_reach_the_sheet_xml() {
        let data = label_row(6, "Water 7732-18-5", "");
        let rows = vec![SourceRow::new(2, Some("7732-18-5"), "Neg\u{B}ative")];
        let bytes = mock_xlsx(&[("Form", &data)], 0, false);
        let mut doc = TemplateDocument::from_bytes("83 CFF.xlsx", &bytes).unwrap();
        let metadata = Metadata {
            customer_name: "Ac\u{1}me".to_string(),
            ..metadata()
        };
        populate(&rows, &mut doc, &layout(None), &metadata).unwrap();

        let sheet = doc.part("xl/worksheets/sheet1.xml").unwrap();
        let illegal: Vec<u8> = sheet
            .iter()
            .copied()
            .filter(|b| *b < 0x20 && !matches!(*b, b'\t' | b'\n' | b'\r'))
            .collect();
        assert!(illegal.is_empty(), "illegal XML 1.0 bytes: {:?}", illegal);
        let sheet = std::str::from_utf8(sheet).unwrap();
        assert!(sheet.contains("Neg_x000B_ative"));
        assert!(sheet.contains("Ac_x0001_me"));
    }

    #[test]
    fn test_without_housekeeping_formulas_stay() {
        let data = label_row(6, "Nothing", r#"<c r="D6"><f>1+1</f><v>2</v></c>"#);
        let (doc, summary) = populated(&data, &[], &layout(None));

        assert_eq!(summary.stripped_formulas, 0);
        assert!(summary.removed_sheet.is_none());
        assert!(doc.sheet("Sheet2").unwrap().is_some());
        assert!(doc.part("xl/calcChain.xml").is_some());
        let sheet = doc.primary_sheet().unwrap();
        assert!(doc.worksheet(&sheet).unwrap().cell(CellRef::new(5, 3)).unwrap().is_formula());
    }

    #[test]
    fn test_metadata_cells() {
        let (doc, _) = populated("", &[], &layout(None));
        let sheet = doc.primary_sheet().unwrap();
        let ws = doc.worksheet(&sheet).unwrap();

        assert_eq!(ws.text(CellRef::new(2, 2)), Some("Acme"));
        assert_eq!(ws.text(CellRef::new(3, 2)), Some("Widget"));
        assert_eq!(ws.text(CellRef::new(4, 2)), Some("2026-03-07"));
        assert_eq!(ws.len(), 3);
    }

    #[test]
    fn test_numbers_stay_numeric_and_empty_clears() {
        let data = [
            label_row(6, "Linalool 78-70-6", ""),
            label_row(7, "Citral 5392-40-5", r#"<c r="D7" s="3" t="inlineStr"><is><t>old</t></is></c>"#),
        ]
        .concat();
        let rows = vec![
            SourceRow::new(2, Some("78-70-6"), 0.02),
            SourceRow::new(3, Some("5392-40-5"), CellValue::Empty),
        ];
        let (doc, _) = populated(&data, &rows, &layout(None));

        let sheet = doc.part("xl/worksheets/sheet1.xml").unwrap();
        let sheet = std::str::from_utf8(sheet).unwrap();
        assert!(sheet.contains(r#"<c r="D6"><v>0.02</v></c>"#));
        assert!(sheet.contains(r#"<c r="D7" s="3"/>"#));
    }

    #[test]
    fn test_removing_primary_sheet_is_rejected() {
        let bytes = mock_xlsx(&[("Form", ""), ("Sheet2", "")], 0, false);
        let mut doc = TemplateDocument::from_bytes("t.xlsx", &bytes).unwrap();
        let housekeeping = Housekeeping {
            strip_target_formulas: false,
            remove_sheet: Some("Form".to_string()),
        };
        let err = populate(&[], &mut doc, &layout(Some(housekeeping)), &metadata()).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidTemplate { .. }));
    }
}
