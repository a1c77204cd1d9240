//! Common types for PDF text extraction

use serde::{Deserialize, Serialize};

use crate::decoders::DecoderKind;

/// Bytes per estimated page
pub const BYTES_PER_PAGE: u64 = 50 * 1024;

/// Metadata about an uploaded file, derived once per request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    pub size_bytes: u64,
    pub estimated_pages: u32,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            estimated_pages: estimate_pages(size_bytes),
        }
    }
}

/// Rough page count from file size (one page per 50 KiB, at least one).
pub fn estimate_pages(size_bytes: u64) -> u32 {
    let pages = size_bytes.div_ceil(BYTES_PER_PAGE).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Text produced by one decoder
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub decoder: DecoderKind,
    pub text: String,
}

impl Candidate {
    pub fn new(decoder: DecoderKind, text: String) -> Self {
        Self { decoder, text }
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// How much the orchestrator trusts the returned text
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// A decoder met every acceptance rule
    High,
    /// Best effort after every decoder fell short
    Low,
}

/// Why a decoder's candidate was or was not accepted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted,
    Empty,
    TooShort,
    Garbled,
    MetadataOnly,
    Failed(String),
}

/// One step of the decoder chain, kept for logging and diagnostics
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub decoder: DecoderKind,
    pub length: usize,
    pub outcome: AttemptOutcome,
}

/// Complete extraction result
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Extraction {
    pub text: String,
    pub decoder: DecoderKind,
    pub confidence: Confidence,
    pub attempts: Vec<Attempt>,
}

impl Extraction {
    pub fn text_length(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_low_confidence(&self) -> bool {
        self.confidence == Confidence::Low
    }
}
