//! Thresholds that drive the decoder chain

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for extraction behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Minimum sanitized length for an in-process candidate to be accepted
    pub min_candidate_length: usize,
    /// Minimum sanitized length for the out-of-process candidate
    pub min_external_length: usize,
    /// Below this the job cannot proceed to delivery
    pub min_text_length: usize,
    /// Time budget for the out-of-process decoder
    pub external_timeout_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_candidate_length: 30,
            min_external_length: 50,
            min_text_length: 10,
            external_timeout_ms: 30_000,
        }
    }
}

impl ExtractionConfig {
    pub fn external_timeout(&self) -> Duration {
        Duration::from_millis(self.external_timeout_ms)
    }
}
