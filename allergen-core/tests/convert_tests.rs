mod common;

use allergen_core::{
    CompanyType, ConversionRequest, ConvertError, Converter, ConverterConfig, DirectoryTemplateStore,
    FormType, MemoryTemplateStore, SourceConfig, SourceIndex, VariantRegistry, read_source,
};
use calamine::Data;
use chrono::NaiveDate;
use common::*;

fn request(company: CompanyType) -> ConversionRequest {
    ConversionRequest::new(company, "Acme", "Widget")
        .with_date(NaiveDate::from_ymd_opt(2026, 10, 17).unwrap())
}

fn supplier_rows() -> anyhow::Result<Vec<allergen_core::SourceRow>> {
    let dir = tempfile::tempdir()?;
    let path = write_file(
        dir.path(),
        "supplier.xlsx",
        &source_workbook(&[
            ("CAS: 7732-18-5 (water)", SourceValue::Text("Negative")),
            ("no CAS here", SourceValue::Text("N/A")),
            ("Ethanol 64-17-5", SourceValue::Number(0.5)),
        ])?,
    )?;
    Ok(read_source(&path, &SourceConfig::default())?)
}

const DETAIL_LABELS: [&str; 4] = [
    "Water (7732-18-5)",
    "Ethanol 64-17-5",
    "Formaldehyde 50-00-0, Ethanol 64-17-5",
    "Limonene 5989-27-5",
];

#[test]
fn test_end_to_end_cff_detail() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), DETAIL_TEMPLATE, &detail_template(&DETAIL_LABELS)?)?;

    let rows = supplier_rows()?;
    let index = SourceIndex::build(&rows);
    assert_eq!(index.len(), 2);
    assert_eq!(index.get("7732-18-5").map(|v| v.to_string()).as_deref(), Some("Negative"));

    let converter = Converter::new(DirectoryTemplateStore::new(dir.path()), VariantRegistry::builtin());
    let result = converter.convert(&rows, &request(CompanyType::Cff), FormType::Detail83)?;
    assert_eq!(result.filename, "83 ALLERGENS Widget.xlsx");
    assert_eq!(result.summary.matched_rows, 3);
    assert_eq!(result.summary.stripped_formulas, 4);

    let mut output = Output::open(&result.data)?;
    assert_eq!(output.sheet_names(), vec!["Form".to_string()]);

    let values = output.values("Form")?;
    assert_eq!(text_at(&values, 6, 3), "Negative");
    assert_eq!(values.get_value((7, 3)), Some(&Data::Float(0.5)));
    // 50-00-0 is not in the source, the ethanol CAS is used
    assert_eq!(values.get_value((8, 3)), Some(&Data::Float(0.5)));
    // No hit: the stripped formula leaves the cell blank
    assert_eq!(text_at(&values, 9, 3), "");

    assert_eq!(text_at(&values, 2, 2), "Acme");
    assert_eq!(text_at(&values, 3, 2), "Widget");
    assert_eq!(text_at(&values, 4, 2), "2026-10-17");
    assert_eq!(text_at(&values, 0, 0), "ALLERGEN DECLARATION (83)");
    assert_eq!(text_at(&values, 5, 3), "Result");

    let formulas = output.formulas("Form")?;
    for row in 6..10 {
        assert_eq!(formula_at(&formulas, row, 3), "", "row {}", row + 1);
        assert_eq!(formula_at(&formulas, row, 4), format!("LEN(B{})", row + 1));
    }
    Ok(())
}

#[test]
fn test_detail_output_package_is_consistent() -> anyhow::Result<()> {
    let template = detail_template(&DETAIL_LABELS)?;
    let mut store = MemoryTemplateStore::new();
    store.insert(DETAIL_TEMPLATE, template.clone());

    let converter = Converter::new(store, VariantRegistry::builtin());
    let result = converter.convert(&supplier_rows()?, &request(CompanyType::Cff), FormType::Detail83)?;

    let names = zip_part_names(&result.data);
    assert!(names.iter().any(|n| n == "xl/worksheets/sheet1.xml"));
    assert!(!names.iter().any(|n| n == "xl/worksheets/sheet2.xml"));

    let workbook = String::from_utf8(zip_part(&result.data, "xl/workbook.xml").unwrap())?;
    assert!(!workbook.contains("Sheet2"));
    let types = String::from_utf8(zip_part(&result.data, "[Content_Types].xml").unwrap())?;
    assert!(!types.contains("sheet2.xml"));
    let rels = String::from_utf8(zip_part(&result.data, "xl/_rels/workbook.xml.rels").unwrap())?;
    assert!(!rels.contains("sheet2.xml"));

    // Parts the conversion does not touch are copied byte for byte
    for part in ["xl/styles.xml", "xl/sharedStrings.xml", "xl/theme/theme1.xml", "docProps/core.xml"] {
        assert_eq!(zip_part(&result.data, part), zip_part(&template, part), "{}", part);
    }
    Ok(())
}

#[test]
fn test_cff_consolidated_keeps_formulas_and_sheets() -> anyhow::Result<()> {
    let mut store = MemoryTemplateStore::new();
    store.insert(
        CONSOLIDATED_TEMPLATE,
        consolidated_template(&[
            ("Water 7732-18-5", None),
            ("Limonene 5989-27-5", Some("not declared")),
            ("Ethanol 64-17-5", Some("old")),
        ])?,
    );

    let converter = Converter::new(store, VariantRegistry::builtin());
    let result = converter.convert(&supplier_rows()?, &request(CompanyType::Cff), FormType::Consolidated26)?;
    assert_eq!(result.filename, "ALLERGEN Widget.xlsx");
    assert_eq!(result.summary.stripped_formulas, 0);
    assert!(result.summary.removed_sheet.is_none());

    let mut output = Output::open(&result.data)?;
    assert_eq!(output.sheet_names(), vec!["통합".to_string(), "Sheet2".to_string()]);

    let values = output.values("통합")?;
    assert_eq!(text_at(&values, 4, 2), "Negative");
    assert_eq!(text_at(&values, 5, 2), "not declared");
    assert_eq!(values.get_value((6, 2)), Some(&Data::Float(0.5)));
    assert_eq!(text_at(&values, 1, 1), "Acme");
    assert_eq!(text_at(&values, 2, 1), "Widget");
    assert_eq!(text_at(&values, 1, 5), "2026-10-17");

    let formulas = output.formulas("통합")?;
    assert_eq!(formula_at(&formulas, 30, 2), "COUNTA(C5:C29)");
    Ok(())
}

#[test]
fn test_convert_all_with_missing_consolidated_template() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), DETAIL_TEMPLATE, &detail_template(&DETAIL_LABELS)?)?;

    let converter = Converter::new(DirectoryTemplateStore::new(dir.path()), VariantRegistry::builtin());
    let outcome = converter.convert_all(&supplier_rows()?, &request(CompanyType::Cff));

    assert_eq!(outcome.detail.as_ref().map(|r| r.filename.as_str()).ok(), Some("83 ALLERGENS Widget.xlsx"));
    match &outcome.consolidated {
        Err(ConvertError::TemplateLoad { name, .. }) => assert_eq!(name, CONSOLIDATED_TEMPLATE),
        other => panic!("expected a template load error, got {:?}", other.as_ref().map(|r| &r.filename)),
    }
    Ok(())
}

#[test]
fn test_hp_variants_fail_loudly() -> anyhow::Result<()> {
    // Even with templates present, HP has no layout yet
    let mut store = MemoryTemplateStore::new();
    store.insert("83 HP.xlsx", detail_template(&DETAIL_LABELS)?);
    store.insert(CONSOLIDATED_TEMPLATE, consolidated_template(&[])?);

    let converter = Converter::new(store, VariantRegistry::builtin());
    let outcome = converter.convert_all(&supplier_rows()?, &request(CompanyType::Hp));
    for (form, result) in outcome.iter() {
        let err = result.as_ref().unwrap_err();
        assert!(err.is_unimplemented(), "{}: {}", form, err);
        assert_eq!(err.to_string(), format!("HP {} conversion is not available yet", form));
    }
    Ok(())
}

#[test]
fn test_configured_hp_layout_converts() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "83 HP.xlsx", &detail_template(&DETAIL_LABELS)?)?;

    let mut config = ConverterConfig::from_toml(
        r#"
        [[variants]]
        company = "hp"
        form = "detail-83"
        template = "83 HP.xlsx"
        output_name = "HP 83 {product} for {customer}.xlsx"

        [variants.layout]
        label_column = "B"
        target_column = "D"
        customer_cell = "C3"
        product_cell = "C4"
        date_cell = "C5"
        "#,
    )?;
    config.templates.directory = dir.path().to_path_buf();

    let converter = Converter::from_config(&config)?;
    let result = converter.convert(&supplier_rows()?, &request(CompanyType::Hp), FormType::Detail83)?;
    assert_eq!(result.filename, "HP 83 Widget for Acme.xlsx");
    assert_eq!(result.summary.stripped_formulas, 0);

    let mut output = Output::open(&result.data)?;
    assert_eq!(output.sheet_names().len(), 2);
    let values = output.values("Form")?;
    assert_eq!(text_at(&values, 6, 3), "Negative");

    // Unmatched rows keep their lookup formula
    let formulas = output.formulas("Form")?;
    assert!(formula_at(&formulas, 9, 3).starts_with("IFERROR(VLOOKUP(B10"));
    Ok(())
}

#[test]
fn test_invalid_template_bytes() {
    let mut store = MemoryTemplateStore::new();
    store.insert(DETAIL_TEMPLATE, b"not a zip".to_vec());

    let converter = Converter::new(store, VariantRegistry::builtin());
    let err = converter
        .convert(&[], &request(CompanyType::Cff), FormType::Detail83)
        .unwrap_err();
    assert!(matches!(err, ConvertError::InvalidTemplate { .. }));
}
