//! Hex-encoded UTF-16 strings
//!
//! Producers that embed Unicode text often write it as `<FEFF0048…>` hex
//! strings: a byte-order mark followed by big-endian UTF-16 code units, four
//! hex digits each. Long unmarked hex runs are tried the same way.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use super::{Decoder, DecoderKind};
use crate::sanitize::remove_similar_sentences;

/// Decoded BOM runs shorter than this are discarded
const MIN_BOM_TEXT_CHARS: usize = 5;

/// Decoded bare runs must be longer than this
const MIN_BARE_TEXT_CHARS: usize = 10;

lazy_static! {
    static ref BOM_RUN: Regex = Regex::new(r"(?i)feff([0-9a-f]{16,})").unwrap();
    static ref BARE_RUN: Regex = Regex::new(r"[0-9a-fA-F]{40,}").unwrap();
}

#[derive(Debug, Default, Clone)]
pub struct HexUtf16Decoder;

impl HexUtf16Decoder {
    pub fn new() -> Self {
        Self
    }

    /// Decoded text of every qualifying hex run, exact duplicates removed,
    /// in order of first appearance
    pub fn collect_runs(&self, view: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut runs = Vec::new();

        for caps in BOM_RUN.captures_iter(view) {
            let decoded = decode_utf16_hex(&caps[1]);
            let decoded = decoded.trim();
            if decoded.chars().count() >= MIN_BOM_TEXT_CHARS && seen.insert(decoded.to_string()) {
                runs.push(decoded.to_string());
            }
        }

        for m in BARE_RUN.find_iter(view) {
            if m.as_str().len() % 4 != 0 {
                continue;
            }
            let decoded = decode_utf16_hex(m.as_str());
            let decoded = decoded.trim();
            if decoded.chars().count() > MIN_BARE_TEXT_CHARS
                && decoded.chars().any(|c| c.is_ascii_alphabetic() || c == ' ')
                && seen.insert(decoded.to_string())
            {
                runs.push(decoded.to_string());
            }
        }

        runs
    }
}

impl Decoder for HexUtf16Decoder {
    fn kind(&self) -> DecoderKind {
        DecoderKind::HexUtf16
    }

    fn decode(&self, buffer: &[u8]) -> String {
        let view = String::from_utf8_lossy(buffer);
        let runs = self.collect_runs(&view);
        if runs.is_empty() {
            return String::new();
        }

        debug!(runs = runs.len(), "Decoded hex UTF-16 runs");
        remove_similar_sentences(&runs.join(" "))
    }
}

/// Decode big-endian UTF-16 written as hex, four digits per code unit.
///
/// NUL units, lone surrogates and characters outside letters, digits,
/// whitespace, basic punctuation and Latin-1/Latin Extended-A are dropped.
pub fn decode_utf16_hex(hex: &str) -> String {
    hex.as_bytes()
        .chunks_exact(4)
        .filter_map(|unit| std::str::from_utf8(unit).ok())
        .filter_map(|unit| u16::from_str_radix(unit, 16).ok())
        .filter(|&unit| unit != 0)
        .filter_map(|unit| char::from_u32(u32::from(unit)))
        .filter(|&c| is_decodable(c))
        .collect()
}

fn is_decodable(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c.is_whitespace()
        || "-_.,;:()".contains(c)
        || ('\u{00C0}'..='\u{017F}').contains(&c)
}
