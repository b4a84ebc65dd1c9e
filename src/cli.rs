use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::BoqConfig;
use crate::error::SectionWarning;
use crate::export::{items_to_csv, read_items_json, write_items, Envelope, OutputFormat};
use crate::mapping::ColumnMapping;
use crate::pipeline::{process_pdf_with_progress, process_sheets, BoqExtraction, CancellationToken, ExtractionOutcome, PipelineOptions};
use crate::sheet::SheetSource;
use crate::sources::{load_pages, open_sheet_sources};
use crate::statistics::{calculate_statistics, cost_distribution, identify_outliers, CategoryShare, ItemStatistics, Outlier};

/// Flags shared by the extraction commands
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub mapping: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
    pub keep_invalid: bool,
}

/// Config file if given, otherwise defaults with `BOQ_*` environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<BoqConfig> {
    match path {
        Some(path) => BoqConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => {
            let config = BoqConfig::load_from_env();
            config.validate().context("invalid BOQ_* environment settings")?;
            Ok(config)
        }
    }
}

fn pipeline_options(run: &RunOptions) -> Result<PipelineOptions> {
    let mapping_override = match &run.mapping {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading column mapping {}", path.display()))?;
            let mapping: ColumnMapping = serde_json::from_str(&json)
                .with_context(|| format!("parsing column mapping {}", path.display()))?;
            Some(mapping)
        }
        None => None,
    };

    Ok(PipelineOptions {
        config: load_config(run.config.as_deref())?,
        mapping_override,
        keep_invalid: run.keep_invalid,
    })
}

/// Reconstruct BOQ items from a PDF text-layer dump
pub fn pdf_command(input: PathBuf, run: RunOptions) -> Result<()> {
    info!("🔍 Extracting BOQ tables from: {:?}", input);
    let options = pipeline_options(&run)?;
    let pages = load_pages(&input)?;

    let outcome = process_pdf_with_progress(
        &source_name(&input),
        &pages,
        &options,
        |p| info!(page = p.page, total = p.total_pages, tables = p.tables_found, "📄 Page done"),
        &CancellationToken::new(),
    )?;

    emit_outcome(outcome, &run)
}

/// Read BOQ items from a workbook or CSV file
pub fn sheet_command(input: PathBuf, run: RunOptions) -> Result<()> {
    info!("📊 Reading BOQ sheets from: {:?}", input);
    let options = pipeline_options(&run)?;
    let loaded = open_sheet_sources(&input)?;
    for warning in &loaded.warnings {
        crate::log_section_warning!(warning);
    }

    let sources: Vec<&dyn SheetSource> = loaded.sheets.iter().map(|s| &**s as &dyn SheetSource).collect();
    let mut outcome = process_sheets(&source_name(&input), &sources, &options)?;

    outcome.prepend_warnings(loaded.warnings);
    emit_outcome(outcome, &run)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsReport {
    statistics: ItemStatistics,
    outliers: Vec<Outlier>,
    cost_distribution: Vec<CategoryShare>,
}

/// Statistics, outliers and cost distribution of an exported item list
pub fn stats_command(
    input: PathBuf,
    threshold: Option<f64>,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config.as_deref())?;
    let threshold = threshold.unwrap_or(config.statistics.outlier_threshold);
    let items = read_items_json(&input)?;

    let report = StatsReport {
        statistics: calculate_statistics(&items),
        outliers: identify_outliers(&items, threshold),
        cost_distribution: cost_distribution(&items),
    };

    write_json(&Envelope::new(report), output.as_deref())?;

    if output.is_some() {
        println!("📊 {} items analysed, outlier threshold {}σ", items.len(), threshold);
    }
    Ok(())
}

/// Write the default configuration as TOML
pub fn init_config_command(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    BoqConfig::default().save_to_file(&path)?;
    println!("⚙️  Default configuration written to {:?}", path);
    Ok(())
}

fn emit_outcome(outcome: ExtractionOutcome, run: &RunOptions) -> Result<()> {
    let extraction = match outcome {
        ExtractionOutcome::Extracted(extraction) => extraction,
        ExtractionOutcome::NeedsManualMapping {
            source_name,
            headers,
            warnings,
            ..
        } => {
            print_warnings(&warnings);
            eprintln!("🔍 No columns of {} could be matched to BOQ fields.", source_name);
            if !headers.is_empty() {
                eprintln!("   Headers found: {}", headers.join(" | "));
            }
            eprintln!("   Pass --mapping <file.json>, e.g. {{\"description\": 1, \"quantity\": 3}}");
            anyhow::bail!("manual column mapping required for {}", source_name);
        }
    };

    let items = extraction.items();
    match (&run.output, run.format) {
        (Some(path), format) => {
            write_items(&items, format, path)?;
            print_summary(&extraction, path);
        }
        (None, OutputFormat::Json) => write_json(&Envelope::new(&extraction), None)?,
        (None, OutputFormat::Csv) => items_to_csv(&items, std::io::stdout().lock())?,
    }
    Ok(())
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
            serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, value)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

fn print_warnings(warnings: &[SectionWarning]) {
    for warning in warnings {
        eprintln!("⚠️  Skipped {}", warning);
    }
}

fn print_summary(extraction: &BoqExtraction, output: &Path) {
    print_warnings(&extraction.warnings);

    println!("  \\___/>");
    println!("  [o-·-o]");
    println!("  (\")~(\")  🎉 Extraction Complete!");
    println!("          Source: {}", extraction.source_name);
    println!("          Valid items: {}", extraction.validation.valid.len());
    println!("          Invalid items: {}", extraction.validation.invalid.len());
    if extraction.dropped_rows > 0 {
        println!("          Empty rows dropped: {}", extraction.dropped_rows);
    }
    if !extraction.total_mismatches.is_empty() {
        println!("          Totals to double-check: {}", extraction.total_mismatches.len());
    }
    for quality in &extraction.quality {
        for suggestion in &quality.report.suggestions {
            println!("          [{}] {}", quality.sheet, suggestion);
        }
    }
    if extraction.cancelled {
        println!("          Cancelled: partial results");
    }
    println!("          Total cost: {:.2}", extraction.statistics.total_cost);
    println!("          Output file: {:?}", output);
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
