//! XLSX templates: loading, reading and part-preserving edits
//!
//! A [`TemplateDocument`] keeps every zip entry of the template in memory.
//! Edits rewrite only the parts they touch, so styles, drawings, defined names
//! and every formula outside the edited cells ship unchanged.

mod cell_ref;
mod package;
mod patch;
mod store;
mod workbook;
mod worksheet;

pub use cell_ref::{CellRef, ColumnRef, cell_name, column_letters, parse_cell_ref, parse_column};
pub use patch::{CellPatch, CellPatches};
pub use store::{DirectoryTemplateStore, MemoryTemplateStore, TemplateStore};
pub use worksheet::{SheetCell, Worksheet};

use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{ConvertError, Result};
use package::Package;
use workbook::{CONTENT_TYPES_PART, WORKBOOK_PART, WORKBOOK_RELS_PART};

const SHARED_STRINGS_REL_TYPE: &str = "/sharedStrings";
const DEFAULT_SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// A worksheet of the template as listed in workbook.xml
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    pub name: String,
    /// Position in workbook order, 0-based
    pub index: usize,
    pub rel_id: String,
    /// Zip path of the worksheet part
    pub part: String,
}

/// A loaded template, mutated in memory and serialized once populated
#[derive(Debug, Clone)]
pub struct TemplateDocument {
    name: String,
    package: Package,
}

impl TemplateDocument {
    /// Parse template bytes; `name` is used in errors and logs
    pub fn from_bytes(name: &str, bytes: &[u8]) -> Result<Self> {
        let package = Package::read(bytes).map_err(|e| match e {
            ConvertError::Zip(zip) => ConvertError::invalid_template(name, zip.to_string()),
            other => other,
        })?;

        if !package.contains(WORKBOOK_PART) {
            return Err(ConvertError::invalid_template(
                name,
                format!("missing {}", WORKBOOK_PART),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            package,
        })
    }

    /// Read a template file from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let bytes = fs::read(path).map_err(|source| ConvertError::TemplateLoad {
            name: name.clone(),
            source,
        })?;
        Self::from_bytes(&name, &bytes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw bytes of a package part
    pub fn part(&self, part: &str) -> Option<&[u8]> {
        self.package.part(part)
    }

    /// Names of all file parts, in package order
    pub fn part_names(&self) -> Vec<&str> {
        self.package.part_names().collect()
    }

    fn required_part(&self, part: &str) -> Result<&[u8]> {
        self.package
            .part(part)
            .ok_or_else(|| ConvertError::invalid_template(&self.name, format!("missing {}", part)))
    }

    /// Worksheets in workbook order
    pub fn sheets(&self) -> Result<Vec<SheetInfo>> {
        let entries = workbook::parse_sheets(self.required_part(WORKBOOK_PART)?)?;
        let rels = workbook::parse_relationships(self.required_part(WORKBOOK_RELS_PART)?)?;

        entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let rel = rels.iter().find(|r| r.id == entry.rel_id).ok_or_else(|| {
                    ConvertError::invalid_template(
                        &self.name,
                        format!("sheet '{}' has no relationship {}", entry.name, entry.rel_id),
                    )
                })?;
                Ok(SheetInfo {
                    name: entry.name,
                    index,
                    rel_id: entry.rel_id,
                    part: workbook::resolve_target("xl", &rel.target),
                })
            })
            .collect()
    }

    pub fn sheet(&self, name: &str) -> Result<Option<SheetInfo>> {
        Ok(self.sheets()?.into_iter().find(|s| s.name == name))
    }

    /// The active sheet (`activeTab`), falling back to the first one
    pub fn primary_sheet(&self) -> Result<SheetInfo> {
        let active = workbook::active_tab(self.required_part(WORKBOOK_PART)?)?;
        let mut sheets = self.sheets()?;
        if sheets.is_empty() {
            return Err(ConvertError::invalid_template(&self.name, "workbook has no sheets"));
        }
        let index = if active < sheets.len() { active } else { 0 };
        Ok(sheets.swap_remove(index))
    }

    fn shared_strings(&self) -> Result<Vec<String>> {
        let part = workbook::parse_relationships(self.required_part(WORKBOOK_RELS_PART)?)?
            .into_iter()
            .find(|r| r.rel_type.ends_with(SHARED_STRINGS_REL_TYPE))
            .map(|r| workbook::resolve_target("xl", &r.target))
            .unwrap_or_else(|| DEFAULT_SHARED_STRINGS_PART.to_string());

        match self.package.part(&part) {
            Some(xml) => worksheet::parse_shared_strings(xml),
            None => Ok(Vec::new()),
        }
    }

    /// Read model of a worksheet
    pub fn worksheet(&self, sheet: &SheetInfo) -> Result<Worksheet> {
        let shared = self.shared_strings()?;
        worksheet::parse_worksheet(self.required_part(&sheet.part)?, &shared)
    }

    /// Rewrite the cells named by `patches` in `sheet`
    pub fn apply_patches(&mut self, sheet: &SheetInfo, patches: &CellPatches) -> Result<()> {
        if patches.is_empty() {
            return Ok(());
        }
        let patched = patch::patch_worksheet_xml(&sheet.part, self.required_part(&sheet.part)?, patches)?;
        self.package.set_part(&sheet.part, patched);
        debug!(template = %self.name, sheet = %sheet.name, cells = patches.len(), "patched worksheet");
        Ok(())
    }

    /// Remove a worksheet and everything that points at it
    ///
    /// Returns false when no sheet has that name. The calculation chain is
    /// dropped as well since it may list cells of the removed sheet.
    pub fn remove_sheet(&mut self, name: &str) -> Result<bool> {
        let Some(sheet) = self.sheet(name)? else {
            return Ok(false);
        };
        if self.sheets()?.len() == 1 {
            return Err(ConvertError::invalid_template(
                &self.name,
                format!("cannot remove '{}', the only sheet", name),
            ));
        }

        let workbook_xml =
            workbook::remove_sheet_from_workbook_xml(self.required_part(WORKBOOK_PART)?, name, sheet.index)?;
        self.package.set_part(WORKBOOK_PART, workbook_xml);

        let rels = workbook::remove_relationship(self.required_part(WORKBOOK_RELS_PART)?, &sheet.rel_id)?;
        self.package.set_part(WORKBOOK_RELS_PART, rels);

        if let Some(types) = self.package.part(CONTENT_TYPES_PART) {
            let types = workbook::remove_content_type_override(types, &sheet.part)?;
            self.package.set_part(CONTENT_TYPES_PART, types);
        }

        self.package.remove_part(&sheet.part);
        self.package.remove_part(&workbook::rels_part_for(&sheet.part));
        self.drop_calc_chain()?;

        debug!(template = %self.name, sheet = name, part = %sheet.part, "removed sheet");
        Ok(true)
    }

    /// Drop `xl/calcChain.xml` and ask Excel to recalculate on open
    ///
    /// Returns whether a calculation chain was present.
    pub fn drop_calc_chain(&mut self) -> Result<bool> {
        let rels = workbook::parse_relationships(self.required_part(WORKBOOK_RELS_PART)?)?;
        let calc_chain = rels.into_iter().find(|r| r.is_calc_chain());

        if let Some(rel) = &calc_chain {
            let part = workbook::resolve_target("xl", &rel.target);
            let rels = workbook::remove_relationship(self.required_part(WORKBOOK_RELS_PART)?, &rel.id)?;
            self.package.set_part(WORKBOOK_RELS_PART, rels);
            if let Some(types) = self.package.part(CONTENT_TYPES_PART) {
                let types = workbook::remove_content_type_override(types, &part)?;
                self.package.set_part(CONTENT_TYPES_PART, types);
            }
            self.package.remove_part(&part);
            debug!(template = %self.name, %part, "dropped calculation chain");
        }

        if let Some(workbook_xml) = workbook::force_full_calc_on_load(self.required_part(WORKBOOK_PART)?)? {
            self.package.set_part(WORKBOOK_PART, workbook_xml);
        }

        Ok(calc_chain.is_some())
    }

    /// Serialize the document as XLSX bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.package.write()
    }
}
