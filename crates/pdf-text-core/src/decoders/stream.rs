//! `stream … endstream` payloads
//!
//! Payloads are inflated when they are zlib data (FlateDecode, the common
//! case). A truncated or corrupt deflate stream still yields whatever was
//! decompressed before the error.

use std::io::Read;

use flate2::read::ZlibDecoder;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::trace;

use super::readable::show_operator_text;
use super::{latin1, Decoder, DecoderKind};

/// Payloads at or below this many bytes are skipped
const MIN_PAYLOAD_BYTES: usize = 20;

/// Plain UTF-8 payloads must be longer than this
const MIN_PLAIN_CHARS: usize = 10;

lazy_static! {
    static ref STREAM_BODY: regex::bytes::Regex =
        regex::bytes::Regex::new(r"(?s-u)\bstream[ \t]*\r?\n?(.*?)\s*endstream").unwrap();
    static ref LETTER_RUN: Regex = Regex::new(r"[A-Za-z\s]{10,}").unwrap();
}

#[derive(Debug, Default, Clone)]
pub struct StreamContentDecoder;

impl StreamContentDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for StreamContentDecoder {
    fn kind(&self) -> DecoderKind {
        DecoderKind::StreamContent
    }

    fn decode(&self, buffer: &[u8]) -> String {
        let mut fragments = Vec::new();

        for caps in STREAM_BODY.captures_iter(buffer) {
            let Some(payload) = caps.get(1) else {
                continue;
            };
            let payload = payload.as_bytes();
            if payload.len() <= MIN_PAYLOAD_BYTES {
                continue;
            }
            if let Some(text) = decode_payload(payload) {
                fragments.push(text);
            }
        }

        fragments.join("\n")
    }
}

fn decode_payload(payload: &[u8]) -> Option<String> {
    let inflated = inflate(payload);

    if let Some(content) = &inflated {
        let shown = show_operator_text(&latin1(content));
        if !shown.is_empty() {
            trace!(bytes = content.len(), "Inflated content stream with show operators");
            return Some(shown.join("\n"));
        }
    }

    let body = inflated.as_deref().unwrap_or(payload);
    let view = latin1(body);
    let runs: Vec<&str> = LETTER_RUN
        .find_iter(&view)
        .map(|m| m.as_str().trim())
        .filter(|run| !run.is_empty())
        .collect();
    if !runs.is_empty() {
        return Some(runs.join(" "));
    }

    match std::str::from_utf8(body) {
        Ok(text)
            if text.chars().count() > MIN_PLAIN_CHARS
                && text.chars().any(|c| c.is_ascii_alphabetic()) =>
        {
            Some(text.to_string())
        }
        _ => None,
    }
}

/// Inflate zlib data, keeping partial output when the stream is damaged
fn inflate(payload: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(payload);
    let mut out = Vec::new();

    match decoder.read_to_end(&mut out) {
        Ok(_) if !out.is_empty() => Some(out),
        Err(err) if !out.is_empty() => {
            trace!(error = %err, recovered = out.len(), "Partial inflate");
            Some(out)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn wrap(payload: &[u8]) -> Vec<u8> {
        let mut pdf = b"4 0 obj\n<< /Length 99 /Filter /FlateDecode >>\nstream\n".to_vec();
        pdf.extend_from_slice(payload);
        pdf.extend_from_slice(b"\nendstream\nendobj\n");
        pdf
    }

    #[test]
    fn test_flate_stream_with_show_operators() {
        let content = b"BT /F1 12 Tf 72 712 Td (Trench inspection report) Tj ET";
        let decoded = StreamContentDecoder::new().decode(&wrap(&compress(content)));
        assert_eq!(decoded, "Trench inspection report");
    }

    #[test]
    fn test_truncated_flate_recovers_prefix() {
        let content: String = (0..400)
            .map(|i| format!("BT (Station {} depth {} cm) Tj ET\n", i, i * 37 % 1000))
            .collect();
        let compressed = compress(content.as_bytes());
        let truncated = &compressed[..compressed.len() / 2];

        let recovered = inflate(truncated).unwrap();
        assert!(!recovered.is_empty());
        assert!(content.as_bytes().starts_with(&recovered));
    }

    #[test]
    fn test_uncompressed_stream_falls_back_to_letter_runs() {
        let decoded = StreamContentDecoder::new()
            .decode(&wrap(b"\x01\x02Groundwater observed at 2 meters\x03\x04"));
        assert_eq!(decoded, "Groundwater observed at");
    }

    #[test]
    fn test_short_payload_skipped() {
        assert_eq!(StreamContentDecoder::new().decode(&wrap(b"tiny")), "");
    }
}
