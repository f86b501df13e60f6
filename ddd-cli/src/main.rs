//! Tachograph DDD Reader CLI Application
//!
//! This is the command-line interface for the tachograph download decoder.
//! It uses the ddd-decoder library and adds:
//! - Batch decoding of many files on the rayon pool
//! - Text summaries and JSON export of the unified document
//! - config.toml support

use anyhow::{Context, Result};
use clap::Parser;
use ddd_decoder::{DecodeReport, Decoder, DecoderError};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod config;
mod report;

use config::{AppConfig, OutputFormat};

/// Tachograph DDD Reader - Decode driver card and vehicle unit downloads
#[derive(Parser, Debug)]
#[command(name = "ddd-cli")]
#[command(about = "Decode EU tachograph downloads (.ddd), Gen1 and Gen2", long_about = None)]
#[command(version)]
struct Args {
    /// Paths to .ddd files to decode
    #[arg(value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Write one report per file into this directory (default: stdout)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Number of files decoded at once (default: one per CPU)
    #[arg(short, long, value_name = "JOBS")]
    jobs: Option<usize>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<ExitCode> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Tachograph DDD Reader CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", ddd_decoder::VERSION);

    let config = merged_config(&args)?;
    if config.input.files.is_empty() {
        println!("Tachograph DDD Reader - No input specified");
        println!("\nQuick Start:");
        println!("  ddd-cli driver.ddd");
        println!("  ddd-cli -f json --pretty -o out/ downloads/*.ddd");
        println!("\nWith a configuration file:");
        println!("  ddd-cli --config config.toml");
        println!("\nUse --help for more options");
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(dir) = &config.output.output_dir {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory: {:?}", dir))?;
    }

    let decoder = Decoder::with_config(config.decoder.clone());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs.unwrap_or(0))
        .build()
        .context("Failed to start worker pool")?;

    let results: Vec<(PathBuf, Result<DecodeReport, DecoderError>)> = pool.install(|| {
        config
            .input
            .files
            .par_iter()
            .map(|path| (path.clone(), decoder.decode_file(path)))
            .collect()
    });

    let mut rejected = 0;
    for (path, result) in &results {
        match result {
            Ok(report) => {
                if !args.quiet {
                    eprintln!("{}", report::outcome_line(path, report));
                }
                emit(path, report, &config)?;
            }
            Err(e) => {
                rejected += 1;
                eprintln!("{}: Rejected ({})", path.display(), e);
            }
        }
    }

    log::info!("{} file(s) decoded, {} rejected", results.len() - rejected, rejected);
    if rejected > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Config file values with command-line flags applied on top
fn merged_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    config.input.files.extend(args.files.iter().cloned());
    if let Some(format) = args.format {
        config.output.format = format;
    }
    if let Some(dir) = &args.output_dir {
        config.output.output_dir = Some(dir.clone());
    }
    config.output.pretty |= args.pretty;
    log::debug!("Effective configuration: {:?}", config);
    Ok(config)
}

/// Print a report or write it next to the others in the output directory
fn emit(path: &Path, report: &DecodeReport, config: &AppConfig) -> Result<()> {
    let rendered = match config.output.format {
        OutputFormat::Text => report::render_text(path, report),
        OutputFormat::Json => report::render_json(report, config.output.pretty)?,
    };

    match &config.output.output_dir {
        Some(dir) => {
            let stem = path.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
            let target = dir
                .join(stem)
                .with_extension(config.output.format.extension());
            fs::write(&target, rendered).with_context(|| format!("Failed to write report: {:?}", target))?;
            log::info!("Wrote {:?}", target);
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from(["ddd-cli", "-f", "json", "--pretty", "-j", "4", "a.ddd", "b.ddd"]);
        let config = merged_config(&args).unwrap();
        assert_eq!(config.input.files.len(), 2);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.pretty);
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["ddd-cli", "driver.ddd"]);
        let config = merged_config(&args).unwrap();
        assert_eq!(config.output.format, OutputFormat::Text);
        assert!(config.output.output_dir.is_none());
    }

    #[test]
    fn test_emit_writes_into_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.output.format = OutputFormat::Json;
        config.output.output_dir = Some(dir.path().to_path_buf());

        let data = ddd_decoder::dispatcher::encode_block(0x7600, &[0x01, 0x01]).unwrap();
        let report = Decoder::new().decode_bytes(&data).unwrap();
        emit(Path::new("uploads/vu_2024.DDD"), &report, &config).unwrap();

        let written = fs::read_to_string(dir.path().join("vu_2024.json")).unwrap();
        assert!(written.contains("\"generation\":\"Gen2\""));
    }
}
