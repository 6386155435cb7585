//! Request-level conversion: both forms from one source upload

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ConverterConfig;
use crate::error::Result;
use crate::populate::{Metadata, PopulateSummary, populate};
use crate::source::SourceRow;
use crate::template::{DirectoryTemplateStore, TemplateStore};
use crate::variant::{CompanyType, FormType, VariantRegistry};

/// Caller input of one conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub company: CompanyType,
    pub customer_name: String,
    pub product_name: String,
    pub date: NaiveDate,
}

impl ConversionRequest {
    /// Request dated today (local time)
    pub fn new(company: CompanyType, customer_name: impl Into<String>, product_name: impl Into<String>) -> Self {
        Self {
            company,
            customer_name: customer_name.into(),
            product_name: product_name.into(),
            date: Local::now().date_naive(),
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    fn metadata(&self) -> Metadata {
        Metadata {
            customer_name: self.customer_name.clone(),
            product_name: self.product_name.clone(),
            date: self.date,
        }
    }
}

/// A populated form ready to be stored or downloaded
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub company: CompanyType,
    pub form: FormType,
    /// Suggested output filename
    pub filename: String,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub summary: PopulateSummary,
}

/// Results of both forms; each one succeeds or fails on its own
#[derive(Debug)]
pub struct ConversionOutcome {
    pub detail: Result<ConversionResult>,
    pub consolidated: Result<ConversionResult>,
}

impl ConversionOutcome {
    pub fn iter(&self) -> impl Iterator<Item = (FormType, &Result<ConversionResult>)> {
        [
            (FormType::Detail83, &self.detail),
            (FormType::Consolidated26, &self.consolidated),
        ]
        .into_iter()
    }

    pub fn all_succeeded(&self) -> bool {
        self.detail.is_ok() && self.consolidated.is_ok()
    }
}

/// Converts source rows into the forms of the registered variants
#[derive(Debug, Clone)]
pub struct Converter<S> {
    store: S,
    registry: VariantRegistry,
}

impl<S: TemplateStore> Converter<S> {
    pub fn new(store: S, registry: VariantRegistry) -> Self {
        Self { store, registry }
    }

    /// Convert one form
    ///
    /// The variant is resolved before the store is touched, so placeholder
    /// variants fail without loading anything.
    pub fn convert(
        &self,
        rows: &[SourceRow],
        request: &ConversionRequest,
        form: FormType,
    ) -> Result<ConversionResult> {
        let (descriptor, layout) = self.registry.resolve(request.company, form)?;

        let mut template = self.store.load(&descriptor.template)?;
        let summary = populate(rows, &mut template, layout, &request.metadata())?;
        let data = template.to_bytes()?;
        let filename = descriptor.output_filename(&request.product_name, &request.customer_name);

        info!(
            company = %request.company,
            %form,
            %filename,
            bytes = data.len(),
            "converted form"
        );
        Ok(ConversionResult {
            company: request.company,
            form,
            filename,
            data,
            summary,
        })
    }

    /// Convert the detail and the consolidated form independently
    pub fn convert_all(&self, rows: &[SourceRow], request: &ConversionRequest) -> ConversionOutcome {
        let outcome = ConversionOutcome {
            detail: self.convert(rows, request, FormType::Detail83),
            consolidated: self.convert(rows, request, FormType::Consolidated26),
        };
        for (form, result) in outcome.iter() {
            if let Err(e) = result {
                warn!(company = %request.company, %form, error = %e, "conversion failed");
            }
        }
        outcome
    }
}

impl Converter<DirectoryTemplateStore> {
    /// Converter over the configured template directory and variants
    pub fn from_config(config: &ConverterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            DirectoryTemplateStore::new(&config.templates.directory),
            config.registry(),
        ))
    }
}
