//! Heuristic decoders
//!
//! Each decoder scans the raw buffer independently and returns whatever
//! readable fragments it finds, joined by newlines. Decoders never fail: an
//! empty string means "nothing found". Cleaning and acceptance are left to
//! the [`Orchestrator`](crate::Orchestrator).

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod alternative;
pub mod external;
pub mod filtered;
pub mod hex;
pub mod readable;
pub mod stream;

pub use alternative::AlternativeEncodingDecoder;
pub use filtered::BasicFilteredDecoder;
pub use hex::HexUtf16Decoder;
pub use readable::ReadableTextDecoder;
pub use stream::StreamContentDecoder;

/// Identifies the strategy that produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderKind {
    External,
    HexUtf16,
    ReadableText,
    StreamContent,
    BasicFiltered,
    AlternativeEncoding,
}

impl DecoderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecoderKind::External => "external",
            DecoderKind::HexUtf16 => "hex_utf16",
            DecoderKind::ReadableText => "readable_text",
            DecoderKind::StreamContent => "stream_content",
            DecoderKind::BasicFiltered => "basic_filtered",
            DecoderKind::AlternativeEncoding => "alternative_encoding",
        }
    }
}

impl fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-process text recovery strategy
pub trait Decoder: Send + Sync {
    fn kind(&self) -> DecoderKind;

    /// Readable fragments found in `buffer`, or an empty string
    fn decode(&self, buffer: &[u8]) -> String;
}

/// The in-process decoders in priority order
pub fn default_chain() -> Vec<Box<dyn Decoder>> {
    vec![
        Box::new(HexUtf16Decoder::new()),
        Box::new(ReadableTextDecoder::new()),
        Box::new(StreamContentDecoder::new()),
        Box::new(BasicFilteredDecoder::new()),
        Box::new(AlternativeEncodingDecoder::new()),
    ]
}

/// One char per byte. Offsets into the result line up with regex matches
/// over the same string, and every byte value survives.
pub(crate) fn latin1(buffer: &[u8]) -> String {
    buffer.iter().map(|&b| b as char).collect()
}
