//! Decoder chain
//!
//! Walks the decoders in priority order, sanitizes each candidate and stops
//! at the first one that is long enough, not garbled and not metadata-only.
//! If none qualifies, the best remaining candidate is returned with
//! [`Confidence::Low`] instead of failing.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::decoders::external::ExternalDecoder;
use crate::decoders::{default_chain, Decoder, DecoderKind};
use crate::error::ExtractionFailure;
use crate::sanitize::{self, assess};
use crate::types::{Attempt, AttemptOutcome, Candidate, Confidence, Extraction};

/// Position of the orchestrator in the chain, recorded in traces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Idle,
    TryingDecoder(DecoderKind),
    Sanitizing(DecoderKind),
    Accepted(DecoderKind),
    TryNextDecoder,
    AllDecodersExhausted,
}

/// Attempts and rejected candidates gathered during one run
#[derive(Debug, Default)]
struct ChainRun {
    attempts: Vec<Attempt>,
    rejected: Vec<Candidate>,
}

impl ChainRun {
    fn into_extraction(self, candidate: Candidate, confidence: Confidence) -> Extraction {
        Extraction {
            text: candidate.text,
            decoder: candidate.decoder,
            confidence,
            attempts: self.attempts,
        }
    }
}

pub struct Orchestrator {
    config: ExtractionConfig,
    decoders: Vec<Box<dyn Decoder>>,
    external: Option<Arc<dyn ExternalDecoder>>,
}

impl Orchestrator {
    /// Orchestrator over the default in-process chain
    pub fn new(config: ExtractionConfig) -> Self {
        Self::with_decoders(config, default_chain())
    }

    pub fn with_decoders(config: ExtractionConfig, decoders: Vec<Box<dyn Decoder>>) -> Self {
        Self {
            config,
            decoders,
            external: None,
        }
    }

    /// Try `external` before the in-process decoders
    pub fn with_external(mut self, external: Arc<dyn ExternalDecoder>) -> Self {
        self.external = Some(external);
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn has_external(&self) -> bool {
        self.external.is_some()
    }

    /// Run the in-process decoders over `buffer`
    pub fn extract(&self, buffer: &[u8]) -> Result<Extraction, ExtractionFailure> {
        check_readable(buffer)?;
        let mut run = ChainRun::default();
        match self.run_chain(buffer, &mut run) {
            Some(accepted) => Ok(run.into_extraction(accepted, Confidence::High)),
            None => self.best_effort(run),
        }
    }

    /// Try the external decoder first, then the in-process chain on a
    /// blocking thread. External failures and timeouts fall through.
    pub async fn extract_with_external(
        self: Arc<Self>,
        job_id: &str,
        buffer: Bytes,
    ) -> Result<Extraction, ExtractionFailure> {
        check_readable(&buffer)?;
        let mut run = ChainRun::default();

        if let Some(external) = &self.external {
            debug!(job_id, state = ?ChainState::TryingDecoder(DecoderKind::External), decoder = external.name());
            match external
                .extract(job_id, &buffer, self.config.external_timeout())
                .await
            {
                Ok(text) => {
                    let candidate = Candidate::new(DecoderKind::External, text);
                    if let Some(accepted) =
                        self.evaluate(&mut run, candidate, self.config.min_external_length)
                    {
                        return Ok(run.into_extraction(accepted, Confidence::High));
                    }
                }
                Err(err) => {
                    warn!(
                        job_id,
                        error = %err,
                        kind = ?err.kind(),
                        "External decoder failed, falling back to in-process decoders"
                    );
                    run.attempts.push(Attempt {
                        decoder: DecoderKind::External,
                        length: 0,
                        outcome: AttemptOutcome::Failed(err.to_string()),
                    });
                }
            }
        }

        tokio::task::spawn_blocking(move || {
            let mut run = run;
            match self.run_chain(&buffer, &mut run) {
                Some(accepted) => Ok(run.into_extraction(accepted, Confidence::High)),
                None => self.best_effort(run),
            }
        })
        .await
        .map_err(|e| ExtractionFailure::Internal(e.to_string()))?
    }

    fn run_chain(&self, buffer: &[u8], run: &mut ChainRun) -> Option<Candidate> {
        for decoder in &self.decoders {
            let kind = decoder.kind();
            debug!(state = ?ChainState::TryingDecoder(kind));
            let candidate = Candidate::new(kind, decoder.decode(buffer));
            if let Some(accepted) = self.evaluate(run, candidate, self.config.min_candidate_length) {
                return Some(accepted);
            }
            debug!(state = ?ChainState::TryNextDecoder, after = %kind);
        }
        None
    }

    /// Sanitize and classify one candidate; `Some` when it is accepted
    fn evaluate(&self, run: &mut ChainRun, raw: Candidate, min_length: usize) -> Option<Candidate> {
        debug!(state = ?ChainState::Sanitizing(raw.decoder), raw_chars = raw.len());
        let candidate = Candidate::new(raw.decoder, sanitize::sanitize(&raw.text));
        let length = candidate.len();
        let report = assess(&candidate.text);

        let outcome = if candidate.is_empty() {
            AttemptOutcome::Empty
        } else if report.garbled {
            AttemptOutcome::Garbled
        } else if report.metadata_only {
            AttemptOutcome::MetadataOnly
        } else if length < min_length {
            AttemptOutcome::TooShort
        } else {
            AttemptOutcome::Accepted
        };

        run.attempts.push(Attempt {
            decoder: candidate.decoder,
            length,
            outcome: outcome.clone(),
        });

        if outcome == AttemptOutcome::Accepted {
            info!(state = ?ChainState::Accepted(candidate.decoder), chars = length, "Extraction accepted");
            return Some(candidate);
        }

        debug!(decoder = %candidate.decoder, chars = length, ?outcome, "Candidate rejected");
        if !candidate.is_empty() {
            run.rejected.push(candidate);
        }
        None
    }

    /// Pick the best rejected candidate once every decoder has been tried.
    ///
    /// Preference goes to the first candidate, in priority order, that is
    /// clean and at least the minimum viable length; otherwise the longest.
    fn best_effort(&self, mut run: ChainRun) -> Result<Extraction, ExtractionFailure> {
        debug!(state = ?ChainState::AllDecodersExhausted, candidates = run.rejected.len());
        let required = self.config.min_text_length;

        let clean = run.rejected.iter().position(|candidate| {
            let report = assess(&candidate.text);
            !report.garbled && !report.metadata_only && candidate.len() >= required
        });
        let chosen = clean.or_else(|| {
            run.rejected
                .iter()
                .enumerate()
                .max_by_key(|(index, candidate)| (candidate.len(), std::cmp::Reverse(*index)))
                .map(|(index, _)| index)
        });

        let Some(index) = chosen else {
            warn!("No decoder produced any text");
            return Err(ExtractionFailure::InsufficientText { found: 0, required });
        };

        let candidate = run.rejected.swap_remove(index);
        let found = candidate.len();
        if found < required {
            warn!(decoder = %candidate.decoder, found, required, "Best candidate below minimum length");
            return Err(ExtractionFailure::InsufficientText { found, required });
        }

        warn!(decoder = %candidate.decoder, chars = found, "Returning low-confidence extraction");
        Ok(run.into_extraction(candidate, Confidence::Low))
    }
}

fn check_readable(buffer: &[u8]) -> Result<(), ExtractionFailure> {
    debug!(state = ?ChainState::Idle, bytes = buffer.len(), "Starting extraction");
    if buffer.is_empty() {
        return Err(ExtractionFailure::UnreadableInput("empty buffer".into()));
    }
    if !buffer.starts_with(b"%PDF") {
        warn!(bytes = buffer.len(), "Buffer has no %PDF header, decoding anyway");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::external::{ExternalCommand, SubprocessDecoder};
    use crate::error::DecoderError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::time::Duration;

    struct Fixed(DecoderKind, &'static str);

    impl Decoder for Fixed {
        fn kind(&self) -> DecoderKind {
            self.0
        }

        fn decode(&self, _buffer: &[u8]) -> String {
            self.1.to_string()
        }
    }

    struct StubExternal(Result<&'static str, ()>);

    #[async_trait]
    impl ExternalDecoder for StubExternal {
        fn name(&self) -> &str {
            "stub"
        }

        async fn extract(
            &self,
            _job_id: &str,
            _buffer: &[u8],
            timeout: Duration,
        ) -> Result<String, DecoderError> {
            match self.0 {
                Ok(text) => Ok(text.to_string()),
                Err(()) => Err(DecoderError::SubprocessTimeout(timeout.as_millis() as u64)),
            }
        }
    }

    fn utf16_hex(text: &str) -> String {
        let mut hex = String::from("feff");
        for unit in text.encode_utf16() {
            hex.push_str(&format!("{:04X}", unit));
        }
        hex
    }

    #[test]
    fn test_empty_buffer_is_unreadable() {
        let err = extract_fixture(b"").unwrap_err();
        assert!(matches!(err, ExtractionFailure::UnreadableInput(_)));
    }

    fn extract_fixture(buffer: &[u8]) -> Result<Extraction, ExtractionFailure> {
        Orchestrator::new(ExtractionConfig::default()).extract(buffer)
    }

    #[test]
    fn test_first_acceptable_decoder_wins() {
        let orchestrator = Orchestrator::with_decoders(
            ExtractionConfig::default(),
            vec![
                Box::new(Fixed(DecoderKind::HexUtf16, "")),
                Box::new(Fixed(DecoderKind::ReadableText, "Too short text")),
                Box::new(Fixed(
                    DecoderKind::StreamContent,
                    "Excavation permit approved for the north parcel",
                )),
                Box::new(Fixed(
                    DecoderKind::BasicFiltered,
                    "A later decoder that is never consulted at all",
                )),
            ],
        );

        let extraction = orchestrator.extract(b"%PDF-1.4").unwrap();
        assert_eq!(extraction.decoder, DecoderKind::StreamContent);
        assert_eq!(extraction.confidence, Confidence::High);
        assert_eq!(
            extraction
                .attempts
                .iter()
                .map(|a| a.outcome.clone())
                .collect::<Vec<_>>(),
            vec![AttemptOutcome::Empty, AttemptOutcome::TooShort, AttemptOutcome::Accepted]
        );
    }

    #[test]
    fn test_metadata_only_candidate_is_skipped() {
        let orchestrator = Orchestrator::with_decoders(
            ExtractionConfig::default(),
            vec![
                Box::new(Fixed(
                    DecoderKind::ReadableText,
                    "/Type /Catalog /Pages\n/MediaBox 0 0 612 792\n/Font /F1 /Resources",
                )),
                Box::new(Fixed(
                    DecoderKind::BasicFiltered,
                    "Geotechnical report for lot seven, boring B-2",
                )),
            ],
        );

        let extraction = orchestrator.extract(b"%PDF-1.4").unwrap();
        assert_eq!(extraction.decoder, DecoderKind::BasicFiltered);
        assert_eq!(extraction.attempts[0].outcome, AttemptOutcome::MetadataOnly);
    }

    #[test]
    fn test_short_fallback_is_low_confidence() {
        let mut buffer: Vec<u8> = (0..200u32).map(|i| 0x80 + (i % 0x40) as u8).collect();
        buffer.extend_from_slice(b"(Hello World) Tj");
        buffer.extend((0..200u32).map(|i| 0x80 + ((i * 3) % 0x40) as u8));

        let extraction = extract_fixture(&buffer).unwrap();
        assert_eq!(extraction.text, "Hello World");
        assert_eq!(extraction.decoder, DecoderKind::ReadableText);
        assert_eq!(extraction.confidence, Confidence::Low);
    }

    #[test]
    fn test_bom_hex_sentence_is_accepted() {
        let sentence = "Hello from the excavation site on Route 9";
        let buffer = format!("%PDF-1.4\nBT <{}> Tj ET\n", utf16_hex(sentence));

        let extraction = extract_fixture(buffer.as_bytes()).unwrap();
        assert_eq!(extraction.decoder, DecoderKind::HexUtf16);
        assert_eq!(extraction.confidence, Confidence::High);
        assert!(extraction.text.starts_with("Hello"));
    }

    #[test]
    fn test_lone_short_hex_falls_through() {
        let buffer = b"%PDF-1.4\n<feff00480065006c006c006f> Tj\nPlain words describing the shoring layout in detail";
        let extraction = extract_fixture(buffer).unwrap();
        assert_ne!(extraction.decoder, DecoderKind::HexUtf16);
        assert_eq!(extraction.attempts[0].outcome, AttemptOutcome::Empty);
    }

    #[test]
    fn test_nothing_found_is_insufficient() {
        let buffer: Vec<u8> = (0..256u32).map(|i| 0x80 + (i % 0x40) as u8).collect();
        let err = extract_fixture(&buffer).unwrap_err();
        assert!(matches!(
            err,
            ExtractionFailure::InsufficientText { found: 0, required: 10 }
        ));
    }

    #[test]
    fn test_below_minimum_is_insufficient() {
        let orchestrator = Orchestrator::with_decoders(
            ExtractionConfig::default(),
            vec![Box::new(Fixed(DecoderKind::ReadableText, "Tiny note"))],
        );
        let err = orchestrator.extract(b"%PDF").unwrap_err();
        assert!(matches!(
            err,
            ExtractionFailure::InsufficientText { found: 9, required: 10 }
        ));
    }

    #[tokio::test]
    async fn test_external_text_takes_priority() {
        let orchestrator = Arc::new(
            Orchestrator::with_decoders(
                ExtractionConfig::default(),
                vec![Box::new(Fixed(
                    DecoderKind::ReadableText,
                    "In-process text that should not be reached by the chain",
                ))],
            )
            .with_external(Arc::new(StubExternal(Ok(
                "Helper output with more than fifty characters of real content",
            )))),
        );

        let extraction = orchestrator
            .extract_with_external("pdf-process-test", Bytes::from_static(b"%PDF-1.4"))
            .await
            .unwrap();
        assert_eq!(extraction.decoder, DecoderKind::External);
        assert_eq!(extraction.confidence, Confidence::High);
    }

    #[tokio::test]
    async fn test_external_failure_falls_back() {
        let orchestrator = Arc::new(
            Orchestrator::with_decoders(
                ExtractionConfig::default(),
                vec![Box::new(Fixed(
                    DecoderKind::ReadableText,
                    "In-process text recovered after the helper timed out",
                ))],
            )
            .with_external(Arc::new(StubExternal(Err(())))),
        );

        let extraction = orchestrator
            .extract_with_external("pdf-process-test", Bytes::from_static(b"%PDF-1.4"))
            .await
            .unwrap();
        assert_eq!(extraction.decoder, DecoderKind::ReadableText);
        assert!(matches!(
            extraction.attempts[0].outcome,
            AttemptOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_short_external_text_is_not_accepted() {
        let orchestrator = Arc::new(
            Orchestrator::with_decoders(
                ExtractionConfig::default(),
                vec![Box::new(Fixed(
                    DecoderKind::ReadableText,
                    "In-process text that is long enough to be accepted",
                ))],
            )
            .with_external(Arc::new(StubExternal(Ok("Only forty characters from the helper.")))),
        );

        let extraction = orchestrator
            .extract_with_external("pdf-process-test", Bytes::from_static(b"%PDF-1.4"))
            .await
            .unwrap();
        assert_eq!(extraction.decoder, DecoderKind::ReadableText);
        assert_eq!(extraction.attempts[0].outcome, AttemptOutcome::TooShort);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_decoder_runs_first() {
        let dir = tempfile::tempdir().unwrap();
        let helper = SubprocessDecoder::new(ExternalCommand::new(
            "sh",
            vec![
                "-c".into(),
                r#"test -s "$1" && printf '{"success":true,"text":"Helper output with more than fifty characters of real content","pages":2}'"#.into(),
                "sh".into(),
            ],
        ))
        .with_temp_dir(dir.path());

        let orchestrator = Arc::new(
            Orchestrator::with_decoders(
                ExtractionConfig::default(),
                vec![Box::new(Fixed(
                    DecoderKind::ReadableText,
                    "In-process text that should not be reached by the chain",
                ))],
            )
            .with_external(Arc::new(helper)),
        );

        let extraction = orchestrator
            .extract_with_external("pdf-process-sh", Bytes::from_static(b"%PDF-1.4 body"))
            .await
            .unwrap();
        assert_eq!(extraction.decoder, DecoderKind::External);
        assert!(extraction.text.starts_with("Helper output"));
        assert_eq!(extraction.attempts.len(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 1..2048)) {
            let _ = extract_fixture(&bytes);
        }

        #[test]
        fn prop_success_meets_minimum_length(bytes in proptest::collection::vec(any::<u8>(), 1..1024)) {
            if let Ok(extraction) = extract_fixture(&bytes) {
                prop_assert!(extraction.text_length() >= 10);
            }
        }
    }
}
