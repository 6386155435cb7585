//! allergen-core: converts supplier allergen disclosure sheets into the
//! standardized 83 (detail) and 26 (consolidated) forms
//!
//! Substances are matched between the uploaded sheet and each template by CAS
//! registry number. Templates are edited in place so that everything the
//! conversion does not touch ships exactly as it was.

pub mod cas;
pub mod config;
pub mod convert;
pub mod error;
pub mod index;
pub mod populate;
pub mod source;
pub mod template;
pub mod value;
pub mod variant;

pub use cas::extract_cas;
pub use config::{ConverterConfig, SourceConfig};
pub use convert::{ConversionOutcome, ConversionRequest, ConversionResult, Converter};
pub use error::{ConvertError, Result};
pub use index::SourceIndex;
pub use populate::{Metadata, PopulateSummary, populate};
pub use source::{SourceRow, read_source, read_source_bytes};
pub use template::{
    CellRef, ColumnRef, DirectoryTemplateStore, MemoryTemplateStore, TemplateDocument, TemplateStore,
};
pub use value::CellValue;
pub use variant::{CompanyType, FieldLayout, FormType, Housekeeping, VariantDescriptor, VariantRegistry};
