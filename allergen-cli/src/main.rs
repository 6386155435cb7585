use allergen_core::{
    CompanyType, ConversionRequest, Converter, ConverterConfig, DirectoryTemplateStore, SourceIndex,
    read_source,
};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};

mod formatter;
mod logging;

use formatter::{FormReport, FormStatus};

const DEFAULT_CONFIG: &str = "allergen.toml";

/// A form failed to convert
const EXIT_FAILED: i32 = 1;
/// Nothing failed, but a requested form has no implementation yet
const EXIT_UNAVAILABLE: i32 = 3;

#[derive(Parser)]
#[command(name = "allergen")]
#[command(about = "Convert supplier allergen sheets into the 83/26 disclosure forms", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a source sheet into both forms
    Convert {
        /// Supplier spreadsheet (first sheet is read)
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        /// Company type selecting the template pair
        #[arg(long, value_parser = parse_company)]
        company: CompanyType,

        /// Customer name written into the forms
        #[arg(long, default_value = "")]
        customer: String,

        /// Product name written into the forms and filenames
        #[arg(long, default_value = "")]
        product: String,

        /// Template directory (overrides the configuration)
        #[arg(short, long, value_name = "DIR")]
        templates: Option<PathBuf>,

        /// Directory receiving the converted forms
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output_dir: PathBuf,

        /// Date written into the forms (YYYY-MM-DD, default today)
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    /// Print the CAS number index of a source sheet
    Index {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    /// List the registered variants
    Variants,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripting
    Json,
}

fn parse_company(value: &str) -> Result<CompanyType, String> {
    value.parse()
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| format!("invalid date '{}': {}", value, e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Command::Convert {
            source,
            company,
            customer,
            product,
            templates,
            output_dir,
            date,
            format,
        } => {
            let mut request = ConversionRequest::new(company, customer, product);
            if let Some(date) = date {
                request = request.with_date(date);
            }
            let templates = templates.unwrap_or_else(|| config.templates.directory.clone());
            let reports = run_convert(&config, &source, &templates, &output_dir, &request, &format)?;
            if let Some(code) = exit_code(&reports) {
                std::process::exit(code);
            }
        }
        Command::Index { source, format } => {
            let rows = read_source(&source, &config.source)
                .with_context(|| format!("Failed to read source: {}", source.display()))?;
            let index = SourceIndex::build(&rows);
            match format {
                OutputFormat::Human => formatter::print_index_human(&source, &index),
                OutputFormat::Json => formatter::print_index_json(&source, &index)?,
            }
        }
        Command::Variants => formatter::print_variants(&config.registry()),
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ConverterConfig> {
    if let Some(path) = path {
        return ConverterConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    // Try to load default config from current directory if it exists
    let default_path = PathBuf::from(DEFAULT_CONFIG);
    if default_path.exists() {
        ConverterConfig::from_file(&default_path)
            .with_context(|| format!("Failed to load config from {}", default_path.display()))
    } else {
        Ok(ConverterConfig::default())
    }
}

/// Convert both forms, write and print their reports
fn run_convert(
    config: &ConverterConfig,
    source: &Path,
    templates: &Path,
    output_dir: &Path,
    request: &ConversionRequest,
    format: &OutputFormat,
) -> Result<Vec<FormReport>> {
    let rows = read_source(source, &config.source)
        .with_context(|| format!("Failed to read source: {}", source.display()))?;
    let indexed_cas = SourceIndex::build(&rows).len();

    let converter = Converter::new(DirectoryTemplateStore::new(templates), config.registry());
    let outcome = converter.convert_all(&rows, request);

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let mut reports = Vec::new();
    for (form, result) in outcome.iter() {
        let status = match result {
            Ok(converted) => {
                let path = output_dir.join(sanitize_filename(&converted.filename));
                fs::write(&path, &converted.data)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                FormStatus::Written {
                    path,
                    matched_rows: converted.summary.matched_rows,
                    stripped_formulas: converted.summary.stripped_formulas,
                    removed_sheet: converted.summary.removed_sheet.clone(),
                }
            }
            Err(e) if e.is_unimplemented() => FormStatus::Unavailable(e.to_string()),
            Err(e) => FormStatus::Failed(error_chain(e)),
        };
        reports.push(FormReport {
            form: form.to_string(),
            status,
        });
    }

    let company = request.company.to_string();
    match format {
        OutputFormat::Human => formatter::print_human(source, &company, indexed_cas, &reports),
        OutputFormat::Json => formatter::print_json(source, &company, indexed_cas, &reports)?,
    }

    Ok(reports)
}

/// Process exit code for a conversion; `None` when every form was written
fn exit_code(reports: &[FormReport]) -> Option<i32> {
    if reports.iter().any(FormReport::is_failed) {
        Some(EXIT_FAILED)
    } else if reports.iter().any(FormReport::is_unavailable) {
        Some(EXIT_UNAVAILABLE)
    } else {
        None
    }
}

/// Error message including its sources
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Product names end up in filenames; keep them inside the output directory
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}
