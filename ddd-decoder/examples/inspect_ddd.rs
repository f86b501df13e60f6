//! Standalone tachograph download inspector
//!
//! Lists the top-level blocks of a `.ddd` file with their routing outcome,
//! then prints every activity day as per-slot segments.
//!
//! Usage:
//!   inspect_ddd <file.ddd> [--limit <days>]
//!
//! Example:
//!   RUST_LOG=debug inspect_ddd driver.ddd --limit 7

use ddd_decoder::dispatcher::{self, BlockStatus};
use ddd_decoder::{Decoder, DecoderConfig};
use std::env;
use std::path::PathBuf;

fn hhmm(minute: u16) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <file.ddd> [--limit <days>]", args[0]);
        std::process::exit(1);
    }

    let path = PathBuf::from(&args[1]);
    let limit = args
        .iter()
        .position(|a| a == "--limit")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(usize::MAX);

    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Cannot read {:?}: {}", path, e);
            std::process::exit(1);
        }
    };

    let config = DecoderConfig::new().with_unknown_payloads(false);
    let dispatch = match dispatcher::dispatch(&bytes, &config, None) {
        Ok(dispatch) => dispatch,
        Err(e) => {
            eprintln!("Rejected: {}", e);
            std::process::exit(2);
        }
    };

    println!("=== {} ({}) ===", dispatch.source, dispatch.generation);
    println!("{:>8}  {:>6}  {:>6}  {:<28} STATUS", "OFFSET", "TAG", "LEN", "PART");
    for block in &dispatch.blocks {
        let part = match (block.part, block.is_signature) {
            (Some(part), true) => format!("{} (signature)", part),
            (Some(part), false) => part.to_string(),
            (None, _) => "-".to_string(),
        };
        let status = match block.status {
            BlockStatus::Decoded => format!("{} record(s)", block.records.len()),
            BlockStatus::Skipped => "skipped".to_string(),
            BlockStatus::LocallyFailed => "FAILED".to_string(),
        };
        println!(
            "{:>8}  0x{:04X}  {:>6}  {:<28} {}",
            block.offset, block.tag, block.declared_length, part, status
        );
        for issue in &block.issues {
            println!("          {}", issue);
        }
    }

    let report = match Decoder::with_config(config).decode_bytes(&bytes) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Rejected: {}", e);
            std::process::exit(2);
        }
    };

    println!("\n=== ACTIVITY ===");
    for day in report.document.activities.iter().take(limit) {
        let date = day.date.map(|d| d.to_string()).unwrap_or_else(|| "????-??-??".to_string());
        println!("{}", date);
        for segment in &day.segments {
            println!(
                "  {:?} {} - {}  {:?} ({} min)",
                segment.slot,
                hhmm(segment.start_minute),
                hhmm(segment.end_minute),
                segment.activity,
                segment.duration_minutes()
            );
        }
    }

    println!("\nOutcome: {:?}", report.outcome());
}
