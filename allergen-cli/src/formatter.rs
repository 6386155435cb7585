//! Output formatters for conversion reports

use allergen_core::{CellValue, SourceIndex, VariantRegistry};
use anyhow::Result;
use colored::*;
use std::path::{Path, PathBuf};

/// One form of a conversion as reported to the user
pub struct FormReport {
    pub form: String,
    pub status: FormStatus,
}

pub enum FormStatus {
    Written {
        path: PathBuf,
        matched_rows: usize,
        stripped_formulas: usize,
        removed_sheet: Option<String>,
    },
    Unavailable(String),
    Failed(String),
}

impl FormReport {
    pub fn is_written(&self) -> bool {
        matches!(self.status, FormStatus::Written { .. })
    }

    /// The variant has no implementation yet; nothing was attempted
    pub fn is_unavailable(&self) -> bool {
        matches!(self.status, FormStatus::Unavailable(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, FormStatus::Failed(_))
    }
}

/// Print conversion results in human-readable format
pub fn print_human(source: &Path, company: &str, indexed_cas: usize, reports: &[FormReport]) {
    println!("{}", format!("Converting: {}", source.display()).bold());
    println!("  {} {}", "Company:".bold(), company.cyan());
    println!("  {} {}", "CAS numbers in source:".bold(), indexed_cas);
    println!();

    for report in reports {
        match &report.status {
            FormStatus::Written {
                path,
                matched_rows,
                stripped_formulas,
                removed_sheet,
            } => {
                println!(
                    "{} {} {}",
                    "✓".green().bold(),
                    format!("Form {}", report.form).bold(),
                    path.display()
                );
                println!("    {} {}", "Matched rows:".bright_black(), matched_rows);
                if *stripped_formulas > 0 {
                    println!("    {} {}", "Formulas stripped:".bright_black(), stripped_formulas);
                }
                if let Some(sheet) = removed_sheet {
                    println!("    {} {}", "Sheet removed:".bright_black(), sheet);
                }
            }
            FormStatus::Unavailable(message) => {
                println!(
                    "{} {} {}",
                    "-".yellow().bold(),
                    format!("Form {}", report.form).bold(),
                    message.yellow()
                );
            }
            FormStatus::Failed(message) => {
                println!(
                    "{} {} {}",
                    "✗".red().bold(),
                    format!("Form {}", report.form).bold(),
                    message.red()
                );
            }
        }
    }
}

/// Print conversion results in JSON format
pub fn print_json(source: &Path, company: &str, indexed_cas: usize, reports: &[FormReport]) -> Result<()> {
    let forms: Vec<_> = reports
        .iter()
        .map(|report| match &report.status {
            FormStatus::Written {
                path,
                matched_rows,
                stripped_formulas,
                removed_sheet,
            } => serde_json::json!({
                "form": report.form,
                "status": "written",
                "path": path.display().to_string(),
                "matched_rows": matched_rows,
                "stripped_formulas": stripped_formulas,
                "removed_sheet": removed_sheet,
            }),
            FormStatus::Unavailable(message) => serde_json::json!({
                "form": report.form,
                "status": "unavailable",
                "message": message,
            }),
            FormStatus::Failed(message) => serde_json::json!({
                "form": report.form,
                "status": "failed",
                "message": message,
            }),
        })
        .collect();

    let output = serde_json::json!({
        "source": source.display().to_string(),
        "company": company,
        "indexed_cas": indexed_cas,
        "forms": forms,
        "summary": {
            "written": reports.iter().filter(|r| r.is_written()).count(),
            "unavailable": reports.iter().filter(|r| r.is_unavailable()).count(),
            "failed": reports.iter().filter(|r| r.is_failed()).count(),
        }
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Print the CAS index of a source sheet
pub fn print_index_human(source: &Path, index: &SourceIndex) {
    println!("{}", format!("Source: {}", source.display()).bold());
    if index.is_empty() {
        println!("{}", "No CAS numbers found".yellow());
        return;
    }
    for (cas, value) in index.entries() {
        println!("  {:<14} {}", cas.cyan(), display_value(value));
    }
    println!();
    println!("{} {}", "CAS numbers:".bold(), index.len());
}

pub fn print_index_json(source: &Path, index: &SourceIndex) -> Result<()> {
    let mut entries = serde_json::Map::new();
    for (cas, value) in index.entries() {
        entries.insert(cas.to_string(), serde_json::to_value(value)?);
    }
    let output = serde_json::json!({
        "source": source.display().to_string(),
        "index": entries,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn display_value(value: &CellValue) -> ColoredString {
    match value {
        CellValue::Empty => "(empty)".bright_black(),
        value => value.to_string().normal(),
    }
}

/// List registered variants
pub fn print_variants(registry: &VariantRegistry) {
    for variant in registry.iter() {
        let status = if variant.is_implemented() {
            "available".green()
        } else {
            "not available".yellow()
        };
        println!(
            "{:<4} {:<16} {:<14} {}",
            variant.company.to_string().bold(),
            variant.form.label(),
            status,
            variant.template.bright_black()
        );
    }
}
