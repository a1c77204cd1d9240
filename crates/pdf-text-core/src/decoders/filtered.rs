//! Line scan that skips PDF structure

use lazy_static::lazy_static;
use regex::Regex;

use super::{Decoder, DecoderKind};
use crate::sanitize::is_metadata_line;

lazy_static! {
    static ref LINE_FRAGMENT: Regex =
        Regex::new(r"[A-Za-z\u{00C0}-\u{024F}\u{1E00}-\u{1EFF}\s\-_.,;:()]{5,}").unwrap();
}

/// Splits the buffer into lines, skips object headers, xref entries and
/// dictionary lines, and keeps runs of letters and punctuation from the
/// rest.
#[derive(Debug, Default, Clone)]
pub struct BasicFilteredDecoder;

impl BasicFilteredDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for BasicFilteredDecoder {
    fn kind(&self) -> DecoderKind {
        DecoderKind::BasicFiltered
    }

    fn decode(&self, buffer: &[u8]) -> String {
        let view = String::from_utf8_lossy(buffer);

        view.split(['\n', '\r'])
            .map(str::trim)
            .filter(|line| !line.is_empty() && !is_metadata_line(line))
            .map(line_fragments)
            .filter(|fragment| fragment.chars().count() > 3)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn line_fragments(line: &str) -> String {
    LINE_FRAGMENT
        .find_iter(line)
        .map(|m| m.as_str().trim())
        .filter(|fragment| fragment.chars().count() > 3)
        .collect::<Vec<_>>()
        .join(" ")
}
