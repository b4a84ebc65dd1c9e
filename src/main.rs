use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use chonker_boq::cli::{self, RunOptions};
use chonker_boq::export::OutputFormat;
use chonker_boq::logging::{init_logging, log_system_info, LoggingConfig};

#[derive(Parser)]
#[command(name = "chonker-boq")]
#[command(about = "🐹 Rebuild bill-of-quantities items from PDF text layers and spreadsheets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug-level logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write daily-rotated logs to this directory (advanced_logging feature)
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

#[derive(Args)]
struct ExtractArgs {
    /// TOML configuration (defaults plus BOQ_* environment variables otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON column mapping, e.g. {"description": 1, "quantity": 3}
    #[arg(short, long)]
    mapping: Option<PathBuf>,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Include items that failed validation in the output
    #[arg(long)]
    keep_invalid: bool,
}

impl From<ExtractArgs> for RunOptions {
    fn from(args: ExtractArgs) -> Self {
        RunOptions {
            config: args.config,
            mapping: args.mapping,
            output: args.output,
            format: args.format,
            keep_invalid: args.keep_invalid,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Text fragments (JSON dump of a PDF text layer) to BOQ items
    Pdf {
        input: PathBuf,
        #[command(flatten)]
        args: ExtractArgs,
    },
    /// Workbook (xlsx, xls, xlsb, ods) or CSV to BOQ items
    Sheet {
        input: PathBuf,
        #[command(flatten)]
        args: ExtractArgs,
    },
    /// Statistics, outliers and cost distribution of an item list
    Stats {
        input: PathBuf,
        /// Standard deviations from the mean that count as an outlier
        #[arg(short, long)]
        threshold: Option<f64>,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// JSON report file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the default configuration file
    InitConfig {
        #[arg(default_value = "chonker-boq.toml")]
        path: PathBuf,
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::verbose(cli.verbose);
    if let Some(dir) = cli.log_dir {
        logging.log_dir = dir;
        logging.enable_file_logging = true;
    }
    let _guard = init_logging(&logging)?;
    log_system_info();

    let result = match cli.command {
        Commands::Pdf { input, args } => cli::pdf_command(input, args.into()),
        Commands::Sheet { input, args } => cli::sheet_command(input, args.into()),
        Commands::Stats {
            input,
            threshold,
            config,
            output,
        } => cli::stats_command(input, threshold, config, output),
        Commands::InitConfig { path, force } => cli::init_config_command(path, force),
    };

    if let Err(e) = &result {
        if let Some(boq_error) = e.downcast_ref::<chonker_boq::BoqError>() {
            eprintln!("{}", boq_error.user_message());
        }
    }
    result
}
