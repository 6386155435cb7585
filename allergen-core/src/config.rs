//! Configuration for source columns, template location and variant layouts

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConvertError, Result};
use crate::template::ColumnRef;
use crate::variant::{VariantDescriptor, VariantRegistry};

/// Main converter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConverterConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    /// Variant descriptors that replace or extend the built-in ones
    #[serde(default)]
    pub variants: Vec<VariantDescriptor>,
}

impl ConverterConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConvertError::Config(e.to_string()))
    }

    /// Validate source columns and every configured variant
    pub fn validate(&self) -> Result<()> {
        if self.source.cas_column == self.source.value_column {
            return Err(ConvertError::Config(format!(
                "source cas_column and value_column are both {}",
                self.source.cas_column
            )));
        }

        let mut seen = HashSet::new();
        for variant in &self.variants {
            if !seen.insert((variant.company, variant.form)) {
                return Err(ConvertError::Config(format!(
                    "variant {} {} is configured more than once",
                    variant.company, variant.form
                )));
            }
            variant.validate()?;
        }

        Ok(())
    }

    /// Built-in variants with the configured ones registered on top
    pub fn registry(&self) -> VariantRegistry {
        let mut registry = VariantRegistry::builtin();
        for variant in &self.variants {
            registry.register(variant.clone());
        }
        registry
    }
}

/// Positions of the relevant columns in the uploaded sheet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Leading rows to skip (the header row)
    #[serde(default = "default_header_rows")]
    pub header_rows: u32,
    /// Column holding free text with CAS numbers
    #[serde(default = "default_cas_column")]
    pub cas_column: ColumnRef,
    /// Column holding the value to propagate
    #[serde(default = "default_value_column")]
    pub value_column: ColumnRef,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            header_rows: default_header_rows(),
            cas_column: default_cas_column(),
            value_column: default_value_column(),
        }
    }
}

fn default_header_rows() -> u32 {
    1
}

fn default_cas_column() -> ColumnRef {
    ColumnRef(5)
}

fn default_value_column() -> ColumnRef {
    ColumnRef(11)
}

/// Where template files are looked up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default = "default_template_dir")]
    pub directory: PathBuf,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            directory: default_template_dir(),
        }
    }
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("template")
}
