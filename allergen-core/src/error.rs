//! Error taxonomy for conversions

use thiserror::Error;

use crate::variant::{CompanyType, FormType};

/// Errors raised while reading a source sheet, loading a template or
/// populating it
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The uploaded source spreadsheet could not be opened or parsed
    #[error("failed to read source spreadsheet {origin}: {reason}")]
    InputRead { origin: String, reason: String },

    /// A named template could not be read from its store
    #[error("failed to load template '{name}'")]
    TemplateLoad {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The template was read but is not a usable XLSX package
    #[error("template '{name}' is not a valid workbook: {reason}")]
    InvalidTemplate { name: String, reason: String },

    /// The variant is declared but has no field layout yet
    #[error("{company} {form} conversion is not available yet")]
    UnimplementedVariant { company: CompanyType, form: FormType },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    pub(crate) fn invalid_template(name: &str, reason: impl Into<String>) -> Self {
        ConvertError::InvalidTemplate {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error reports a capability gap rather than a failure
    pub fn is_unimplemented(&self) -> bool {
        matches!(self, ConvertError::UnimplementedVariant { .. })
    }
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;
