//! Main decoder API
//!
//! This module provides the primary interface for the decoder library.
//! The Decoder struct runs the whole pipeline: block dispatch, validation and
//! normalization into a [`UnifiedDocument`].

use crate::config::DecoderConfig;
use crate::dispatcher;
use crate::document::UnifiedDocument;
use crate::normalizer;
use crate::types::{DecoderError, Issue, Result};
use crate::validator::{self, PartStatus};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::AtomicBool;

/// How completely a file was parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseOutcome {
    /// No issue, every part valid, no mandatory part missing
    FullyParsed,
    /// A document was produced, with issues or invalid/missing parts
    PartiallyParsed,
}

/// Decoded document plus every finding collected on the way
#[derive(Debug, Clone, Serialize)]
pub struct DecodeReport {
    pub document: UnifiedDocument,
    /// File, block, record and part issues in stream order
    pub issues: Vec<Issue>,
}

impl DecodeReport {
    pub fn outcome(&self) -> ParseOutcome {
        let parts_ok = self.document.validation.iter().all(|r| match r.status {
            PartStatus::Valid => true,
            PartStatus::Invalid => false,
            PartStatus::Missing => !r.mandatory,
        });
        if self.issues.is_empty() && parts_ok {
            ParseOutcome::FullyParsed
        } else {
            ParseOutcome::PartiallyParsed
        }
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues.len() - self.error_count()
    }
}

/// The main decoder struct - entry point for all decoding operations
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    config: DecoderConfig,
}

impl Decoder {
    /// Create a new decoder instance with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode a file held in memory
    ///
    /// # Returns
    /// * `Err(DecoderError::MalformedHeader)` when the file cannot be identified
    ///   as a driver card or vehicle unit download (the file is rejected)
    /// * `Ok(DecodeReport)` otherwise, however damaged the rest of the file is
    ///
    /// # Example
    /// ```no_run
    /// use ddd_decoder::{Decoder, ParseOutcome};
    ///
    /// let bytes = std::fs::read("driver.ddd").unwrap();
    /// let report = Decoder::new().decode_bytes(&bytes).unwrap();
    /// if report.outcome() == ParseOutcome::PartiallyParsed {
    ///     for issue in &report.issues {
    ///         eprintln!("{}", issue);
    ///     }
    /// }
    /// ```
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<DecodeReport> {
        self.run(bytes, None)
    }

    /// Like [`Decoder::decode_bytes`], polling `cancel` between blocks
    ///
    /// Returns `DecoderError::Cancelled` once the flag is seen set.
    pub fn decode_bytes_cancellable(&self, bytes: &[u8], cancel: &AtomicBool) -> Result<DecodeReport> {
        self.run(bytes, Some(cancel))
    }

    /// Read a `.ddd` file (extension checked case-insensitively) and decode it
    pub fn decode_file(&self, path: &Path) -> Result<DecodeReport> {
        log::info!("Decoding tachograph file: {:?}", path);

        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase());

        match extension.as_deref() {
            Some("ddd") => {
                let bytes = std::fs::read(path)?;
                self.decode_bytes(&bytes)
            }
            _ => Err(DecoderError::UnsupportedFile(format!(
                "expected a .ddd file, got {:?}",
                path.file_name().unwrap_or_default()
            ))),
        }
    }

    fn run(&self, bytes: &[u8], cancel: Option<&AtomicBool>) -> Result<DecodeReport> {
        let dispatch = dispatcher::dispatch(bytes, &self.config, cancel)?;
        log::info!(
            "{} file, {}: {} blocks",
            dispatch.source,
            dispatch.generation,
            dispatch.blocks.len()
        );

        let validation = validator::validate(&dispatch);
        let mut issues: Vec<Issue> = dispatch.all_issues().cloned().collect();
        issues.extend(validation.issues);

        let document = normalizer::normalize(
            dispatch.records(),
            validation.results,
            dispatch.source,
            dispatch.generation,
        );

        let report = DecodeReport { document, issues };
        log::info!(
            "Decoding finished: {:?} ({} errors, {} warnings)",
            report.outcome(),
            report.error_count(),
            report.warning_count()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_creation() {
        let decoder = Decoder::new();
        assert_eq!(decoder.config(), &DecoderConfig::default());
    }

    #[test]
    fn test_unsupported_file_format() {
        let decoder = Decoder::new();
        let result = decoder.decode_file(Path::new("test.txt"));
        assert!(matches!(result, Err(DecoderError::UnsupportedFile(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let decoder = Decoder::new();
        let result = decoder.decode_file(Path::new("/nonexistent/driver.DDD"));
        assert!(matches!(result, Err(DecoderError::IoError(_))));
    }

    #[test]
    fn test_empty_input_rejected() {
        let result = Decoder::new().decode_bytes(&[]);
        assert!(matches!(result, Err(DecoderError::MalformedHeader(_))));
    }
}
