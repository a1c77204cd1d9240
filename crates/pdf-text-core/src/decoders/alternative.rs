//! Re-read the buffer under several encodings

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use super::{latin1, Decoder, DecoderKind};
use crate::sanitize::{is_only_metadata, sanitize};

/// Sanitized text must be longer than this for an encoding to win
const MIN_ENCODED_CHARS: usize = 50;

/// Fragments at or below this length are dropped
const MIN_FRAGMENT_CHARS: usize = 5;

lazy_static! {
    static ref WIDE_FRAGMENT: Regex =
        Regex::new(r"[A-Za-z\u{00C0}-\u{024F}\u{1E00}-\u{1EFF}\s\-_.,;:()]{10,}").unwrap();
}

/// Encodings tried, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
    Ascii,
    Utf16Le,
}

impl TextEncoding {
    pub const ALL: [TextEncoding; 4] = [
        TextEncoding::Utf8,
        TextEncoding::Latin1,
        TextEncoding::Ascii,
        TextEncoding::Utf16Le,
    ];

    pub fn decode(&self, buffer: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(buffer).into_owned(),
            TextEncoding::Latin1 => latin1(buffer),
            TextEncoding::Ascii => buffer.iter().map(|&b| (b & 0x7F) as char).collect(),
            TextEncoding::Utf16Le => {
                let units = buffer
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
                char::decode_utf16(units)
                    .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect()
            }
        }
    }
}

/// Returns the first encoding whose readable fragments survive sanitizing
/// with enough text that is not metadata-only.
#[derive(Debug, Default, Clone)]
pub struct AlternativeEncodingDecoder;

impl AlternativeEncodingDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for AlternativeEncodingDecoder {
    fn kind(&self) -> DecoderKind {
        DecoderKind::AlternativeEncoding
    }

    fn decode(&self, buffer: &[u8]) -> String {
        for encoding in TextEncoding::ALL {
            let text = encoding.decode(buffer);
            let fragments: Vec<&str> = WIDE_FRAGMENT
                .find_iter(&text)
                .map(|m| m.as_str().trim())
                .filter(|fragment| fragment.chars().count() > MIN_FRAGMENT_CHARS)
                .collect();

            let cleaned = sanitize(&fragments.join("\n"));
            if cleaned.chars().count() > MIN_ENCODED_CHARS && !is_only_metadata(&cleaned) {
                debug!(?encoding, chars = cleaned.chars().count(), "Alternative encoding produced text");
                return cleaned;
            }
        }

        String::new()
    }
}
