//! Show-operator literals and readable ASCII runs
//!
//! Uncompressed content streams keep their text in literal strings passed
//! to the show operators: `(text) Tj`, `(text) '`, `(text) "` and
//! `[(te) -120 (xt)] TJ`. Those are decoded first. The rest of the buffer is
//! then scanned for runs of letters, digits and basic punctuation.

use std::ops::Range;

use lazy_static::lazy_static;
use regex::Regex;

use super::{latin1, Decoder, DecoderKind};

/// TJ offsets more negative than this (thousandths of an em) are word gaps
const TJ_SPACE_THRESHOLD: f64 = -100.0;

lazy_static! {
    static ref SHOW_LITERAL: Regex =
        Regex::new(r#"(?s)\(((?:[^()\\]|\\.)*)\)\s*(?:Tj|'|")"#).unwrap();
    static ref SHOW_ARRAY: Regex = Regex::new(r"(?s)\[((?:[^\[\]\\]|\\.)*)\]\s*TJ").unwrap();
    static ref ARRAY_ELEMENT: Regex =
        Regex::new(r"(?s)\(((?:[^()\\]|\\.)*)\)|(-?\d+(?:\.\d+)?|-?\.\d+)").unwrap();
    static ref READABLE_RUN: Regex = Regex::new(r"[A-Za-z0-9\s\-_.,;:()]{5,}").unwrap();
}

#[derive(Debug, Default, Clone)]
pub struct ReadableTextDecoder;

impl ReadableTextDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for ReadableTextDecoder {
    fn kind(&self) -> DecoderKind {
        DecoderKind::ReadableText
    }

    fn decode(&self, buffer: &[u8]) -> String {
        let view = latin1(buffer);
        let shown = show_operator_spans(&view);

        let mut fragments: Vec<String> = shown.iter().map(|(_, text)| text.clone()).collect();

        // Literal spans are masked so their text is not collected twice
        let mut rest = String::with_capacity(view.len());
        let mut last = 0;
        for (span, _) in &shown {
            rest.push_str(&view[last..span.start]);
            rest.push('\n');
            last = span.end;
        }
        rest.push_str(&view[last..]);

        fragments.extend(readable_runs(&rest));
        fragments.join("\n")
    }
}

/// Text passed to show operators, in document order
pub fn show_operator_text(view: &str) -> Vec<String> {
    show_operator_spans(view)
        .into_iter()
        .map(|(_, text)| text)
        .collect()
}

fn show_operator_spans(view: &str) -> Vec<(Range<usize>, String)> {
    let mut spans: Vec<(Range<usize>, String)> = Vec::new();

    for caps in SHOW_LITERAL.captures_iter(view) {
        if let Some(whole) = caps.get(0) {
            spans.push((whole.range(), decode_literal(&caps[1])));
        }
    }

    for caps in SHOW_ARRAY.captures_iter(view) {
        if let Some(whole) = caps.get(0) {
            spans.push((whole.range(), decode_array(&caps[1])));
        }
    }

    spans.sort_by_key(|(span, _)| span.start);

    let mut kept: Vec<(Range<usize>, String)> = Vec::with_capacity(spans.len());
    for (span, text) in spans {
        if kept.last().is_some_and(|(prev, _)| span.start < prev.end) {
            continue;
        }
        if text.chars().any(char::is_alphanumeric) {
            kept.push((span, text.trim().to_string()));
        }
    }
    kept
}

/// Concatenate the strings of a TJ array, inserting a space for large
/// negative offsets
fn decode_array(body: &str) -> String {
    let mut out = String::new();

    for caps in ARRAY_ELEMENT.captures_iter(body) {
        if let Some(literal) = caps.get(1) {
            out.push_str(&decode_literal(literal.as_str()));
        } else if let Some(offset) = caps.get(2) {
            let offset: f64 = offset.as_str().parse().unwrap_or(0.0);
            if offset < TJ_SPACE_THRESHOLD && !out.ends_with(' ') {
                out.push(' ');
            }
        }
    }

    out
}

/// Resolve the escapes of a literal string body
///
/// Handles `\n \r \t \b \f \( \) \\`, one to three octal digits, and a
/// backslash before a line break (continuation). Unknown escapes keep the
/// escaped character.
pub fn decode_literal(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '\\' {
            out.push(c);
            i += 1;
            continue;
        }

        i += 1;
        let Some(&next) = chars.get(i) else {
            break;
        };

        match next {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            '(' | ')' | '\\' => out.push(next),
            '\r' => {
                if chars.get(i + 1) == Some(&'\n') {
                    i += 1;
                }
            }
            '\n' => {}
            '0'..='7' => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 3 {
                    match chars.get(i) {
                        Some(&d @ '0'..='7') => {
                            value = value * 8 + (d as u32 - '0' as u32);
                            i += 1;
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                if let Some(decoded) = char::from_u32(value & 0xFF) {
                    out.push(decoded);
                }
                continue;
            }
            other => out.push(other),
        }
        i += 1;
    }

    out
}

fn readable_runs(view: &str) -> Vec<String> {
    READABLE_RUN
        .find_iter(view)
        .map(|m| m.as_str().trim())
        .filter(|run| run.chars().count() > 4)
        .filter(|run| !run.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()))
        .map(str::to_string)
        .collect()
}
