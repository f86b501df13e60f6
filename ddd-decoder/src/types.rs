//! Core types for the tachograph file decoder
//!
//! This module defines the fundamental types shared by every stage of the
//! pipeline: the error enum, the detected source kind and generation, and the
//! non-fatal issues that get attached to a decode report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used throughout the decoder
pub type Timestamp = DateTime<Utc>;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Errors that can occur during decoding
///
/// Only [`DecoderError::MalformedHeader`] rejects a whole file. The cursor-level
/// variants are raised by the primitive reads and are caught by the record
/// decoders or the dispatcher, which turn them into [`Issue`]s.
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Truncated data at offset {offset}: requested {requested} bytes, {remaining} remaining")]
    TruncatedData {
        /// Cursor position when the read was attempted
        offset: usize,
        /// Number of bytes the read needed
        requested: usize,
        /// Number of bytes left in the buffer
        remaining: usize,
    },

    #[error("Invalid encoding at offset {offset}: {detail}")]
    InvalidEncoding {
        /// Position of the first byte of the offending field
        offset: usize,
        /// What was wrong with the field
        detail: String,
        /// Best-effort decoding of the field (invalid digits rendered as '?')
        partial: Option<String>,
    },

    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Block 0x{tag:04X} payload of {length} bytes does not fit a 16-bit length")]
    PayloadTooLarge { tag: u16, length: usize },

    #[error("Unsupported file: {0}")]
    UnsupportedFile(String),

    #[error("Decoding cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Kind of device that produced the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Driver card download
    DriverCard,
    /// Vehicle unit download
    VehicleUnit,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::DriverCard => write!(f, "Driver card"),
            SourceKind::VehicleUnit => write!(f, "Vehicle unit"),
        }
    }
}

/// Tachograph data format generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Generation {
    /// First generation: fixed-width records
    Gen1,
    /// Second generation (smart tachograph): nested record arrays and ECC certificates
    Gen2,
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Gen1 => write!(f, "Gen1"),
            Generation::Gen2 => write!(f, "Gen2"),
        }
    }
}

/// Category of a non-fatal finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    /// Buffer exhausted before an expected length
    TruncatedData,
    /// BCD digit or character outside the allowed alphabet
    InvalidEncoding,
    /// Block tag not in the dispatch table
    UnknownBlockType,
    /// Block belongs to the other generation than the file
    GenerationMismatch,
    /// Declared lengths disagree with each other or with a length rule
    LengthMismatch,
    /// Part-level integrity envelope (signature) missing or malformed
    ChecksumMismatch,
    /// Mandatory part absent
    MissingPart,
    /// Activity change out of range or out of order
    TimelineAnomaly,
    /// Bytes after the last complete block
    TrailingBytes,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IssueKind::TruncatedData => "truncated data",
            IssueKind::InvalidEncoding => "invalid encoding",
            IssueKind::UnknownBlockType => "unknown block type",
            IssueKind::GenerationMismatch => "generation mismatch",
            IssueKind::LengthMismatch => "length mismatch",
            IssueKind::ChecksumMismatch => "checksum mismatch",
            IssueKind::MissingPart => "missing part",
            IssueKind::TimelineAnomaly => "timeline anomaly",
            IssueKind::TrailingBytes => "trailing bytes",
        };
        write!(f, "{}", label)
    }
}

/// How much an issue affects its enclosing part
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Informational; the part stays valid
    Warning,
    /// The enclosing part is invalid
    Error,
}

/// A non-fatal finding attached to a field, block, part or the whole file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    /// Absolute byte offset in the file, when known
    pub offset: Option<usize>,
    /// Tag of the enclosing block, when the issue belongs to one
    pub tag: Option<u16>,
    pub message: String,
}

impl Issue {
    pub fn warning(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            offset: None,
            tag: None,
            message: message.into(),
        }
    }

    pub fn error(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            offset: None,
            tag: None,
            message: message.into(),
        }
    }

    /// Builder method: attach the absolute offset
    pub fn at(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Builder method: attach the enclosing block tag
    pub fn in_block(mut self, tag: u16) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Build an issue from a cursor error raised inside a record decoder
    pub fn from_error(err: &DecoderError, severity: Severity) -> Self {
        let (kind, offset) = match err {
            DecoderError::TruncatedData { offset, .. } => (IssueKind::TruncatedData, Some(*offset)),
            DecoderError::InvalidEncoding { offset, .. } => (IssueKind::InvalidEncoding, Some(*offset)),
            _ => (IssueKind::LengthMismatch, None),
        };
        Self {
            kind,
            severity,
            offset,
            tag: None,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.tag, self.offset) {
            (Some(tag), Some(offset)) => {
                write!(f, "[{}] block 0x{:04X} @{}: {}", self.kind, tag, offset, self.message)
            }
            (Some(tag), None) => write!(f, "[{}] block 0x{:04X}: {}", self.kind, tag, self.message),
            (None, Some(offset)) => write!(f, "[{}] @{}: {}", self.kind, offset, self.message),
            (None, None) => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Convert a `TimeReal` value to a timestamp
///
/// `0` and `0xFFFFFFFF` are the format's "no value" markers and map to `None`.
pub fn time_real(seconds: u32) -> Option<Timestamp> {
    if seconds == 0 || seconds == u32::MAX {
        return None;
    }
    DateTime::from_timestamp(seconds as i64, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_real_sentinels() {
        assert_eq!(time_real(0), None);
        assert_eq!(time_real(u32::MAX), None);
        let ts = time_real(1_700_000_000).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_issue_display() {
        let issue = Issue::error(IssueKind::LengthMismatch, "expected 10 bytes")
            .at(42)
            .in_block(0x0501);
        assert_eq!(
            issue.to_string(),
            "[length mismatch] block 0x0501 @42: expected 10 bytes"
        );
        assert!(issue.is_error());
    }

    #[test]
    fn test_issue_from_cursor_error() {
        let err = DecoderError::TruncatedData {
            offset: 7,
            requested: 4,
            remaining: 1,
        };
        let issue = Issue::from_error(&err, Severity::Error);
        assert_eq!(issue.kind, IssueKind::TruncatedData);
        assert_eq!(issue.offset, Some(7));
    }
}
