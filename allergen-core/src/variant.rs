//! Per-variant field layouts for the 83/26 templates
//!
//! A variant is a (company-type, form-type) pair. Each one names its
//! template, its output filename pattern and, once known, the layout of the
//! cells the populator reads and writes. Descriptors without a layout are
//! declared placeholders and resolve to [`ConvertError::UnimplementedVariant`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{ConvertError, Result};
use crate::template::{CellRef, ColumnRef};

/// Which pair of templates governs a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanyType {
    Cff,
    Hp,
}

impl CompanyType {
    pub const ALL: [CompanyType; 2] = [CompanyType::Cff, CompanyType::Hp];
}

impl fmt::Display for CompanyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompanyType::Cff => f.write_str("CFF"),
            CompanyType::Hp => f.write_str("HP"),
        }
    }
}

impl FromStr for CompanyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cff" => Ok(CompanyType::Cff),
            "hp" => Ok(CompanyType::Hp),
            other => Err(format!("unknown company type '{}'", other)),
        }
    }
}

/// Output form produced by a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FormType {
    /// Per-substance disclosure
    #[serde(rename = "detail-83")]
    Detail83,
    /// Aggregated disclosure
    #[serde(rename = "consolidated-26")]
    Consolidated26,
}

impl FormType {
    pub const ALL: [FormType; 2] = [FormType::Detail83, FormType::Consolidated26];

    /// Long name used in configuration files
    pub fn label(self) -> &'static str {
        match self {
            FormType::Detail83 => "detail-83",
            FormType::Consolidated26 => "consolidated-26",
        }
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormType::Detail83 => f.write_str("83"),
            FormType::Consolidated26 => f.write_str("26"),
        }
    }
}

impl FromStr for FormType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "83" | "detail-83" | "detail" => Ok(FormType::Detail83),
            "26" | "consolidated-26" | "consolidated" => Ok(FormType::Consolidated26),
            other => Err(format!("unknown form type '{}'", other)),
        }
    }
}

/// Fixed cell positions of one template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldLayout {
    /// Column whose text embeds CAS numbers
    pub label_column: ColumnRef,
    /// Column receiving the matched source value
    pub target_column: ColumnRef,
    pub customer_cell: CellRef,
    pub product_cell: CellRef,
    pub date_cell: CellRef,
    /// Cleanup run before population
    #[serde(default)]
    pub housekeeping: Option<Housekeeping>,
}

impl FieldLayout {
    fn validate(&self, variant: &str) -> Result<()> {
        if self.label_column == self.target_column {
            return Err(ConvertError::Config(format!(
                "{}: label and target column are both {}",
                variant, self.label_column
            )));
        }

        let cells = [self.customer_cell, self.product_cell, self.date_cell];
        if cells.iter().collect::<HashSet<_>>().len() != cells.len() {
            return Err(ConvertError::Config(format!(
                "{}: customer, product and date cells must be distinct",
                variant
            )));
        }

        if let Some(Housekeeping {
            remove_sheet: Some(sheet),
            ..
        }) = &self.housekeeping
            && sheet.trim().is_empty()
        {
            return Err(ConvertError::Config(format!(
                "{}: housekeeping remove_sheet is empty",
                variant
            )));
        }

        Ok(())
    }
}

/// Template cleanup applied before the row walk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Housekeeping {
    /// Clear formulas from the target column
    #[serde(default = "default_true")]
    pub strip_target_formulas: bool,
    /// Secondary sheet dropped from the output
    #[serde(default)]
    pub remove_sheet: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Everything the converter needs to know about one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDescriptor {
    pub company: CompanyType,
    pub form: FormType,
    /// Template name in the template store
    pub template: String,
    /// Output filename pattern; `{product}`, `{customer}`, `{company}` and `{form}` are substituted
    #[serde(default)]
    pub output_name: Option<String>,
    /// Absent while the variant is only declared
    #[serde(default)]
    pub layout: Option<FieldLayout>,
}

impl VariantDescriptor {
    pub fn is_implemented(&self) -> bool {
        self.layout.is_some()
    }

    /// Layout of an implemented variant
    pub fn layout(&self) -> Result<&FieldLayout> {
        self.layout
            .as_ref()
            .ok_or(ConvertError::UnimplementedVariant {
                company: self.company,
                form: self.form,
            })
    }

    /// Suggested filename of the converted document
    pub fn output_filename(&self, product_name: &str, customer_name: &str) -> String {
        let pattern = self
            .output_name
            .as_deref()
            .unwrap_or("{company}_{form}_Converted.xlsx");
        pattern
            .replace("{product}", product_name)
            .replace("{customer}", customer_name)
            .replace("{company}", &self.company.to_string())
            .replace("{form}", &self.form.to_string())
    }

    pub fn validate(&self) -> Result<()> {
        let name = format!("{} {}", self.company, self.form);
        if self.template.trim().is_empty() {
            return Err(ConvertError::Config(format!("{}: template name is empty", name)));
        }
        match &self.layout {
            Some(layout) => layout.validate(&name),
            None => Ok(()),
        }
    }
}

/// Descriptors keyed by (company-type, form-type)
#[derive(Debug, Clone, Default)]
pub struct VariantRegistry {
    variants: BTreeMap<(CompanyType, FormType), VariantDescriptor>,
}

impl VariantRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The four known variants; HP layouts are placeholders
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.register(VariantDescriptor {
            company: CompanyType::Cff,
            form: FormType::Detail83,
            template: "83 CFF.xlsx".to_string(),
            output_name: Some("83 ALLERGENS {product}.xlsx".to_string()),
            layout: Some(FieldLayout {
                label_column: ColumnRef(1),
                target_column: ColumnRef(3),
                customer_cell: CellRef::new(2, 2),
                product_cell: CellRef::new(3, 2),
                date_cell: CellRef::new(4, 2),
                housekeeping: Some(Housekeeping {
                    strip_target_formulas: true,
                    remove_sheet: Some("Sheet2".to_string()),
                }),
            }),
        });

        registry.register(VariantDescriptor {
            company: CompanyType::Cff,
            form: FormType::Consolidated26,
            template: "26 통합.xlsx".to_string(),
            output_name: Some("ALLERGEN {product}.xlsx".to_string()),
            layout: Some(FieldLayout {
                label_column: ColumnRef(0),
                target_column: ColumnRef(2),
                customer_cell: CellRef::new(1, 1),
                product_cell: CellRef::new(2, 1),
                date_cell: CellRef::new(1, 5),
                housekeeping: None,
            }),
        });

        registry.register(VariantDescriptor {
            company: CompanyType::Hp,
            form: FormType::Detail83,
            template: "83 HP.xlsx".to_string(),
            output_name: Some("HP_83_Converted.xlsx".to_string()),
            layout: None,
        });

        registry.register(VariantDescriptor {
            company: CompanyType::Hp,
            form: FormType::Consolidated26,
            template: "26 통합.xlsx".to_string(),
            output_name: Some("HP_26_Converted.xlsx".to_string()),
            layout: None,
        });

        registry
    }

    /// Add or replace a descriptor, returning the one it replaced
    pub fn register(&mut self, descriptor: VariantDescriptor) -> Option<VariantDescriptor> {
        self.variants
            .insert((descriptor.company, descriptor.form), descriptor)
    }

    pub fn get(&self, company: CompanyType, form: FormType) -> Option<&VariantDescriptor> {
        self.variants.get(&(company, form))
    }

    /// Descriptor and layout of an implemented variant
    pub fn resolve(
        &self,
        company: CompanyType,
        form: FormType,
    ) -> Result<(&VariantDescriptor, &FieldLayout)> {
        let descriptor = self
            .get(company, form)
            .ok_or(ConvertError::UnimplementedVariant { company, form })?;
        Ok((descriptor, descriptor.layout()?))
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariantDescriptor> {
        self.variants.values()
    }
}
