//! Quality classification for decoded text

use lazy_static::lazy_static;
use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};

/// Share of disallowed characters above which text counts as garbled
pub const WEIRD_CHAR_RATIO: f64 = 0.5;

/// A single character repeated more than this many times in a row is garbled
pub const MAX_REPEAT_RUN: usize = 10;

/// Share of non-blank lines carrying a structure indicator for text to be
/// considered metadata-only
pub const METADATA_LINE_RATIO: f64 = 0.7;

lazy_static! {
    static ref METADATA_LINE: RegexSet = RegexSet::new([
        r"^%?PDF-1\.",
        r"^%%EOF",
        r"^\d+\s+\d+\s+obj\b",
        r"^\d+\s+\d+\s+R\b",
        r"^\d+\s+\d+\s+n$",
        r"^\d{10}\s+\d{5}\s+[nf]\b",
        r"^(?:startxref|EOF|xref|trailer|endobj|stream|endstream)$",
        r"^(?:Filter|FlateDecode|DeviceRGB|MediaBox|CropBox|Resources|ExtGState|ProcSet)$",
        r"^/(?:Type|Filter|Length|MediaBox|CropBox|Resources|Font|XObject|ExtGState|ProcSet|Contents|Parent|Kids|Count|Subtype|BaseFont|Encoding|Annots|Border|Rect)\b",
        r"^<<",
        r"^Border\s+\d+",
        r"^Contents\(",
        r"^Subtype\s+(?:Square|Text)",
        r"^Name\(",
        r"^Linearized\s+\d+",
        r"^[LOET]\s+\d+",
        r"^(?:Size|Root|Info)\s+\d+",
        r"^h\s+[A-Za-z0-9,\s]+$",
        r"^V,VzcV",
        r"^Xop\d+",
    ])
    .unwrap();
    static ref METADATA_REFERENCE: RegexSet = RegexSet::new([
        r"\d+\s+\d+\s+obj\b",
        r"\d+\s+\d+\s+R\b",
        r"\d+\s+\d+\s+n\b",
    ])
    .unwrap();
}

/// Substrings that mark a line as PDF structure rather than content
const METADATA_INDICATORS: &[&str] = &[
    "Linearized",
    "endobj",
    "xref",
    "trailer",
    "startxref",
    "/Type",
    "/Filter",
    "/Length",
    "/Root",
    "/Info",
    "/Size",
    "/Prev",
    "/XRefStm",
    "/Encrypt",
    "/ID",
    "/Pages",
    "/Kids",
    "/Count",
    "/MediaBox",
    "/Resources",
    "/Font",
    "/ProcSet",
    "/ExtGState",
    "/XObject",
    "FlateDecode",
    "DeviceRGB",
    "Border",
    "Contents(",
    "Subtype",
    "Name(",
    "%%EOF",
    "%PDF-1.",
];

/// Characters a human-readable candidate may contain: printable ASCII,
/// line whitespace and the Latin accented ranges.
pub fn is_allowed_char(c: char) -> bool {
    matches!(
        c,
        ' '..='~' | '\n' | '\r' | '\t' | '\u{00C0}'..='\u{024F}' | '\u{1E00}'..='\u{1EFF}'
    )
}

/// Summary of the quality checks run against one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total_chars: usize,
    pub weird_chars: usize,
    pub weird_ratio: f64,
    pub longest_repeat: usize,
    pub digits_only: bool,
    pub garbled: bool,
    pub metadata_only: bool,
}

/// Run every quality check and collect the measurements
pub fn assess(text: &str) -> QualityReport {
    let total_chars = text.chars().count();
    let weird_chars = text.chars().filter(|c| !is_allowed_char(*c)).count();
    let weird_ratio = if total_chars == 0 {
        0.0
    } else {
        weird_chars as f64 / total_chars as f64
    };
    let longest_repeat = longest_repeat_run(text);
    let digits_only = text
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_whitespace());

    let garbled = total_chars == 0
        || weird_ratio > WEIRD_CHAR_RATIO
        || longest_repeat > MAX_REPEAT_RUN
        || digits_only;

    QualityReport {
        total_chars,
        weird_chars,
        weird_ratio,
        longest_repeat,
        digits_only,
        garbled,
        metadata_only: is_only_metadata(text),
    }
}

/// True when the text is empty, mostly disallowed characters, contains a
/// long single-character run, or is nothing but digits and whitespace.
pub fn is_garbled(text: &str) -> bool {
    assess(text).garbled
}

/// Longest run of one repeated character. Line breaks are ignored.
fn longest_repeat_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<char> = None;

    for c in text.chars() {
        if c == '\n' {
            previous = None;
            current = 0;
            continue;
        }
        if previous == Some(c) {
            current += 1;
        } else {
            previous = Some(c);
            current = 1;
        }
        longest = longest.max(current);
    }

    longest
}

/// Whether a single line is PDF structure: headers, object and xref
/// entries, trailer keywords, dictionary keys, annotation fragments.
pub fn is_metadata_line(line: &str) -> bool {
    METADATA_LINE.is_match(line.trim())
}

fn has_metadata_indicator(line: &str) -> bool {
    METADATA_INDICATORS.iter().any(|marker| line.contains(marker))
        || METADATA_REFERENCE.is_match(line)
}

/// True when at least 70% of the non-blank lines carry a structure
/// indicator. Empty text is not metadata.
pub fn is_only_metadata(text: &str) -> bool {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        return false;
    }

    let flagged = lines
        .iter()
        .filter(|line| has_metadata_indicator(line))
        .count();

    flagged as f64 / lines.len() as f64 >= METADATA_LINE_RATIO
}
