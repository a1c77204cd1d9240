//! Text sanitizer
//!
//! Every candidate passes through the same cleaning steps before it is
//! classified:
//!
//! 1. [`strip_pdf_tokens`] removes structure keywords, object references,
//!    dictionary keys and hex blobs
//! 2. [`restrict_charset`] drops everything outside printable ASCII and the
//!    Latin accented ranges
//! 3. [`normalize_whitespace`] collapses horizontal whitespace and caps
//!    blank lines
//! 4. [`dedupe_lines`] keeps the first occurrence of each meaningful line
//!
//! [`filter_tool_noise`] then removes authoring-tool artifacts (CAD font
//! tags, PDF date stamps, generated identifiers).

pub mod quality;

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

pub use quality::{
    assess, is_allowed_char, is_garbled, is_metadata_line, is_only_metadata, QualityReport,
};

/// Lines at or below this length carry no content worth keeping
const MIN_LINE_CHARS: usize = 5;

/// Sentences at or below this length are dropped by the similarity pass
const MIN_SENTENCE_CHARS: usize = 10;

/// Shared-word ratio above which two sentences count as the same
const SIMILARITY_THRESHOLD: f64 = 0.7;

lazy_static! {
    static ref CONTROL_CHARS: Regex =
        Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F-\x9F]").unwrap();
    static ref OBJECT_REFERENCE: Regex = Regex::new(r"\b\d+\s+\d+\s+R\b").unwrap();
    static ref STRUCTURE_KEYWORDS: Regex =
        Regex::new(r"\b(?:obj|endobj|stream|endstream|xref|trailer|startxref)\b").unwrap();
    static ref DICTIONARY_KEYS: Regex = Regex::new(
        r"/?\b(?:Parent|Count|First|Last|Next|Prev|Title|Creator|Producer|ModDate|CreationDate)\b"
    )
    .unwrap();
    static ref HEX_BLOB: Regex = Regex::new(r"\b[0-9a-fA-F]{8,}\b").unwrap();
    static ref SENTENCE_BREAK: Regex = Regex::new(r"[.!?]\s+").unwrap();

    static ref CAD_SHX_TEXT: Regex = Regex::new(r"(?i)AutoCAD[ \t]+SHX[ \t]+Text[ \t]*").unwrap();
    static ref CAD_NAME: Regex = Regex::new(r"(?i)AutoCAD[ \t]*").unwrap();
    static ref SHX_TEXT: Regex = Regex::new(r"(?i)SHX[ \t]+Text[ \t]*").unwrap();
    static ref TOOL_PARENTHETICAL: Regex = Regex::new(r"(?i)\((?:Adobe|UCS)[^)\n]*\)").unwrap();
    static ref POSTSCRIPT_DEF: Regex = Regex::new(r"(?i)\bdef[ \t]+").unwrap();
    static ref PDF_DATE: Regex = Regex::new(r"D:\d{14}(?:[+\-Z](?:\d{2}'?\d{2}'?)?)?").unwrap();
    static ref BACKSLASH_PAIRS: Regex = Regex::new(r"\\[ \t]+\\[ \t]+").unwrap();
    static ref NUMBERED_IDENTIFIER: Regex = Regex::new(r"\b\d+_\w+").unwrap();
    static ref UPPER_IDENTIFIER: Regex = Regex::new(r"\b[A-Z]{2,}_[A-Z\d_]+\b").unwrap();
}

/// Full cleaning applied to every candidate before classification
pub fn sanitize(text: &str) -> String {
    filter_tool_noise(&clean(text))
}

/// strip → restrict → normalize → dedupe
pub fn clean(text: &str) -> String {
    let stripped = strip_pdf_tokens(text);
    let restricted = restrict_charset(&stripped);
    let normalized = normalize_whitespace(&restricted);
    dedupe_lines(&normalized)
}

/// Remove control characters, object references, structure keywords,
/// common dictionary keys and long hex blobs. Words repeated three or more
/// times in a row collapse to one.
pub fn strip_pdf_tokens(text: &str) -> String {
    let text = CONTROL_CHARS.replace_all(text, " ");
    let text = OBJECT_REFERENCE.replace_all(&text, "");
    let text = STRUCTURE_KEYWORDS.replace_all(&text, "");
    let text = DICTIONARY_KEYS.replace_all(&text, "");
    let text = HEX_BLOB.replace_all(&text, "");

    text.split('\n')
        .map(collapse_repeated_words)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse runs of three or more identical words on one line
fn collapse_repeated_words(line: &str) -> String {
    let words: Vec<&str> = line.split_whitespace().collect();
    let mut out: Vec<&str> = Vec::with_capacity(words.len());
    let mut i = 0;

    while i < words.len() {
        let mut run = 1;
        while i + run < words.len() && words[i + run] == words[i] {
            run += 1;
        }
        if run >= 3 {
            out.push(words[i]);
        } else {
            out.extend_from_slice(&words[i..i + run]);
        }
        i += run;
    }

    out.join(" ")
}

/// Keep printable ASCII, line whitespace and Latin accented letters
pub fn restrict_charset(text: &str) -> String {
    text.chars().filter(|c| quality::is_allowed_char(*c)).collect()
}

/// Collapse horizontal whitespace to single spaces, trim every line, allow
/// at most one consecutive blank line and trim the whole text.
pub fn normalize_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0;

    for line in text.split('\n') {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(collapsed);
    }

    lines.join("\n").trim().to_string()
}

/// Drop lines of five characters or fewer, lines without a letter, and any
/// line whose lowercase whitespace-normalized form was already seen. Order of
/// first occurrence is preserved.
pub fn dedupe_lines(text: &str) -> String {
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept: Vec<&str> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.chars().count() <= MIN_LINE_CHARS || !line.chars().any(char::is_alphabetic) {
            continue;
        }
        if seen.insert(normalized_key(line)) {
            kept.push(line);
        }
    }

    kept.join("\n")
}

fn normalized_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Split into sentences, keep those longer than ten characters and drop any
/// sentence too similar to one already kept.
pub fn remove_similar_sentences(text: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut kept_keys: Vec<String> = Vec::new();

    for sentence in SENTENCE_BREAK.split(text) {
        let sentence = sentence.trim();
        if sentence.chars().count() <= MIN_SENTENCE_CHARS {
            continue;
        }
        let key = normalized_key(sentence);
        if kept_keys.iter().any(|existing| is_similar(&key, existing)) {
            continue;
        }
        kept.push(sentence);
        kept_keys.push(key);
    }

    kept.join(".\n")
}

/// Two normalized sentences are similar when identical, or when their word
/// counts differ by at most three and the share of common words longer
/// than three characters exceeds the threshold.
fn is_similar(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }

    let words_a: Vec<&str> = a.split_whitespace().collect();
    let words_b: Vec<&str> = b.split_whitespace().collect();
    if words_a.len().abs_diff(words_b.len()) > 3 {
        return false;
    }

    let vocabulary: HashSet<&str> = words_b.iter().copied().collect();
    let common = words_a
        .iter()
        .filter(|word| word.chars().count() > 3 && vocabulary.contains(*word))
        .count();
    let longest = words_a.len().max(words_b.len());

    longest > 0 && common as f64 / longest as f64 > SIMILARITY_THRESHOLD
}

/// Remove authoring-tool noise, then collapse whitespace and drop empty
/// lines.
pub fn filter_tool_noise(text: &str) -> String {
    let text = CAD_SHX_TEXT.replace_all(text, "");
    let text = CAD_NAME.replace_all(&text, "");
    let text = SHX_TEXT.replace_all(&text, "");
    let text = TOOL_PARENTHETICAL.replace_all(&text, "");
    let text = POSTSCRIPT_DEF.replace_all(&text, "");
    let text = PDF_DATE.replace_all(&text, "");
    let text = BACKSLASH_PAIRS.replace_all(&text, " ");
    let text = NUMBERED_IDENTIFIER.replace_all(&text, "");
    let text = UPPER_IDENTIFIER.replace_all(&text, "");

    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
