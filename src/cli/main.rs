//! legacy-archive-cli - convert legacy archive tables into XML preservation
//! packages

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use legacy_archive_sdk::archive::verify_archive;
use legacy_archive_sdk::{
    ArchiveError, Converter, LegacyRepository, RunOptions, SchemaLoader, TableStatus,
};

#[derive(Parser)]
#[command(name = "legacy-archive-cli")]
#[command(about = "Convert fixed-width legacy archive tables into XML preservation packages")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert the tables of a legacy archive
    Convert {
        /// YAML table metadata
        #[arg(long)]
        metadata: PathBuf,

        /// Root directory of the legacy archive (holds FILMAP.TAB files)
        #[arg(long)]
        source: PathBuf,

        /// Package output directory
        #[arg(long)]
        output: PathBuf,

        /// TOML run configuration
        #[arg(long)]
        config: Option<PathBuf>,

        /// Validate only, write no archive files
        #[arg(long)]
        validate_only: bool,

        /// Only tables matching this regex (case-insensitive)
        #[arg(long)]
        tables: Option<String>,

        /// Write the JSON conversion report here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Re-read every table XML of a package against its XSD
    Verify {
        /// Package directory
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            match e.downcast_ref::<ArchiveError>() {
                Some(archive_error) => eprintln!("Error: {}", archive_error.user_message()),
                None => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands) -> Result<bool> {
    match command {
        Commands::Convert {
            metadata,
            source,
            output,
            config,
            validate_only,
            tables,
            report,
        } => {
            let mut options = match &config {
                Some(path) => RunOptions::load(path)
                    .with_context(|| format!("loading run configuration {}", path.display()))?,
                None => RunOptions::default(),
            };
            if validate_only {
                options = options.with_validation_only(true);
            }
            if let Some(pattern) = tables {
                options = options.with_table_filter(pattern);
            }
            options.validate()?;

            let schema = SchemaLoader::load(&metadata)?;
            let repository = LegacyRepository::open(&source)?.with_batch_size(options.batch_size);
            info!(
                source = %source.display(),
                tables = repository.file_map().len(),
                "Indexed legacy archive"
            );

            let converter = Converter::new(Arc::new(schema), Box::new(repository), &output, options)?;
            let result = converter.run()?;

            if let Some(path) = &report {
                result
                    .write_json(path)
                    .with_context(|| format!("writing report {}", path.display()))?;
            }

            for table in &result.tables {
                let status = match table.status {
                    TableStatus::Completed => "archived",
                    TableStatus::Validated => "validated",
                    TableStatus::Failed => "FAILED",
                    TableStatus::Cancelled => "cancelled",
                    TableStatus::Pending => "pending",
                };
                println!(
                    "{:<24} {:<10} rows={} written={} removed={} warnings={}",
                    table.table,
                    status,
                    table.rows_read,
                    table.rows_written,
                    table.rows_removed,
                    table.warnings
                );
                if let Some(error) = &table.error {
                    println!("    {error}");
                }
            }
            if result.headers_written {
                println!("Package {} written to {}", result.package_id, output.display());
            }
            Ok(result.is_success())
        }
        Commands::Verify { output } => {
            let verified = verify_archive(&output)?;
            for (folder, rows) in &verified {
                println!("{folder:<12} rows={rows}");
            }
            println!("Verified {} table(s)", verified.len());
            Ok(true)
        }
    }
}
