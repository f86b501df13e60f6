//! Tachograph DDD Decoder Library
//!
//! A stateless, reusable library for decoding EU digital tachograph downloads
//! (`.ddd` files) from driver cards and vehicle units, first and second
//! generation, into one unified document.
//!
//! # Architecture
//!
//! The pipeline runs in one pass over an in-memory buffer:
//! - [`cursor`]: typed big-endian reads (BCD, bitfields, fixed strings, timestamps)
//! - [`dispatcher`]: walks the `tag | length | payload` blocks, detects the
//!   source kind and generation, and routes payloads to the record decoders
//! - [`records`]: one decoder per record kind, generation-aware
//! - [`validator`]: one Valid / Invalid / Missing verdict per structural part
//! - [`normalizer`]: merges everything into a [`UnifiedDocument`]
//!
//! Only a file whose leading blocks cannot be identified is rejected. Every
//! other problem is recorded as an [`Issue`] and decoding carries on with the
//! next block.
//!
//! The library does NOT:
//! - Verify signatures or certificates
//! - Render reports or tables
//!
//! Presentation is in the application layer (ddd-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use ddd_decoder::{Decoder, DecoderConfig, ParseOutcome};
//! use std::path::Path;
//!
//! let config = DecoderConfig::new()
//!     .with_parallel_records(true)
//!     .with_unknown_payloads(false);
//!
//! let decoder = Decoder::with_config(config);
//! let report = decoder.decode_file(Path::new("driver.ddd")).unwrap();
//!
//! println!("{} ({:?})", report.document.source_kind, report.outcome());
//! for day in &report.document.activities {
//!     println!("{:?}: {} changes", day.date, day.changes.len());
//! }
//! ```

// Public modules
pub mod bitfield;
pub mod config;
pub mod cursor;
pub mod decoder;
pub mod dispatcher;
pub mod document;
pub mod normalizer;
pub mod records;
pub mod tables;
pub mod tlv;
pub mod types;
pub mod validator;

// Re-export main types for convenience
pub use config::DecoderConfig;
pub use decoder::{DecodeReport, Decoder, ParseOutcome};
pub use document::UnifiedDocument;
pub use types::{DecoderError, Generation, Issue, IssueKind, Result, Severity, SourceKind, Timestamp};
pub use validator::{PartId, PartStatus, ValidationResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
