//! Decoder configuration types
//!
//! The decoder needs very little configuration: the file format is fully
//! self-describing, so these knobs only change how the work is scheduled and
//! how much of unrecognised data is retained.

use serde::{Deserialize, Serialize};

/// Configuration for the decoder library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Decode block payloads on the rayon pool after the sequential block walk
    #[serde(default)]
    pub parallel_records: bool,

    /// Keep the undecoded payload bytes of unknown blocks (false = length only)
    #[serde(default = "default_true")]
    pub keep_unknown_payloads: bool,

    /// Number of per-block warnings written to the log before suppressing the rest
    #[serde(default = "default_max_logged_warnings")]
    pub max_logged_warnings: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_logged_warnings() -> usize {
    16
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            parallel_records: false,
            keep_unknown_payloads: true,
            max_logged_warnings: default_max_logged_warnings(),
        }
    }
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: decode records in parallel
    pub fn with_parallel_records(mut self, enabled: bool) -> Self {
        self.parallel_records = enabled;
        self
    }

    /// Builder method: keep or drop unknown block payloads
    pub fn with_unknown_payloads(mut self, keep: bool) -> Self {
        self.keep_unknown_payloads = keep;
        self
    }

    /// Builder method: set the warning log cap
    pub fn with_max_logged_warnings(mut self, max: usize) -> Self {
        self.max_logged_warnings = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_config_builder() {
        let config = DecoderConfig::new()
            .with_parallel_records(true)
            .with_unknown_payloads(false)
            .with_max_logged_warnings(4);

        assert!(config.parallel_records);
        assert!(!config.keep_unknown_payloads);
        assert_eq!(config.max_logged_warnings, 4);
    }

    #[test]
    fn test_serde_defaults() {
        let config: DecoderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, DecoderConfig::default());
        assert!(config.keep_unknown_payloads);
        assert_eq!(config.max_logged_warnings, 16);
    }
}
