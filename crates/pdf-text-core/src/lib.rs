//! Byte-level PDF text recovery
//!
//! Recovers human-readable text from raw PDF bytes without a PDF parser.
//! Several independent heuristics scan the buffer, a sanitizer cleans and
//! classifies each candidate, and the [`Orchestrator`] walks the decoders in
//! priority order until one produces usable text.
//!
//! ## Decoder chain
//!
//! | Order | Decoder | Looks for |
//! |-------|---------|-----------|
//! | 0 | External (optional) | Structured JSON from an out-of-process parser |
//! | 1 | Hex/UTF-16 | `feff…` and long hex runs, 4 digits per code unit |
//! | 2 | Readable text | ASCII runs and `(…) Tj` / `[…] TJ` literals |
//! | 3 | Stream content | `stream … endstream` payloads, inflated when zlib |
//! | 4 | Basic filtered | Line scan skipping object headers and xref entries |
//! | 5 | Alternative encoding | UTF-8 / Latin-1 / ASCII / UTF-16LE re-reads |
//!
//! A candidate is accepted when it is long enough, not garbled and not
//! metadata-only. When every decoder falls short the best candidate is
//! returned tagged [`Confidence::Low`].

pub mod config;
pub mod decoders;
pub mod error;
pub mod orchestrator;
pub mod sanitize;
pub mod types;

pub use config::ExtractionConfig;
pub use decoders::external::{ExternalCommand, ExternalDecoder, SubprocessDecoder};
pub use decoders::{Decoder, DecoderKind};
pub use error::{DecoderError, ErrorKind, ExtractionFailure};
pub use orchestrator::Orchestrator;
pub use types::*;

/// Extract text from a PDF buffer using the in-process decoders and default
/// thresholds.
pub fn extract_text(buffer: &[u8]) -> Result<Extraction, ExtractionFailure> {
    Orchestrator::new(ExtractionConfig::default()).extract(buffer)
}
