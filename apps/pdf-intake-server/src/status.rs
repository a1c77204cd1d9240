//! Process records and the status store behind the poll endpoint
//!
//! A record only moves forward: `processing → analyzing → completed`, or to
//! `failed` from any state that is not already terminal. Progress never
//! decreases and the extracted text appears only with `completed`.
//!
//! The store is a trait so the poll contract does not depend on where
//! records live. [`InMemoryStatusStore`] drops finished records some time
//! after a poll has seen them, or after a longer grace period when nobody
//! ever polls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pdf_text_core::{Confidence, DecoderKind, ErrorKind, FileInfo};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Lifecycle of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Processing,
    Analyzing,
    Completed,
    Failed,
}

impl ProcessStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessStatus::Completed | ProcessStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            ProcessStatus::Processing => 0,
            ProcessStatus::Analyzing => 1,
            ProcessStatus::Completed | ProcessStatus::Failed => 2,
        }
    }
}

/// Why a job failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("Unknown process: {0}")]
    UnknownProcess(String),

    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ProcessStatus,
        to: ProcessStatus,
    },

    #[error("Process already exists: {0}")]
    DuplicateProcess(String),
}

/// A change requested by the job that owns the record
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    Advance {
        status: ProcessStatus,
        progress: u8,
    },
    Complete {
        text: String,
        confidence: Option<Confidence>,
        decoder: Option<DecoderKind>,
    },
    Fail(ProcessError),
}

impl StatusUpdate {
    fn target(&self) -> ProcessStatus {
        match self {
            StatusUpdate::Advance { status, .. } => *status,
            StatusUpdate::Complete { .. } => ProcessStatus::Completed,
            StatusUpdate::Fail(_) => ProcessStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecord {
    pub process_id: String,
    pub status: ProcessStatus,
    pub progress: u8,
    pub extracted_text: Option<String>,
    pub text_length: Option<usize>,
    pub file_info: FileInfo,
    pub confidence: Option<Confidence>,
    pub decoder: Option<DecoderKind>,
    pub error: Option<ProcessError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessRecord {
    /// A freshly accepted job: `processing` at 10%
    pub fn new(process_id: impl Into<String>, file_info: FileInfo) -> Self {
        let now = Utc::now();
        Self {
            process_id: process_id.into(),
            status: ProcessStatus::Processing,
            progress: 10,
            extracted_text: None,
            text_length: None,
            file_info,
            confidence: None,
            decoder: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply `update`, refusing anything that would move the record
    /// backwards. A refused update leaves the record untouched.
    pub fn apply(&mut self, update: StatusUpdate) -> Result<(), StatusError> {
        let to = update.target();
        let refused = StatusError::InvalidTransition {
            from: self.status,
            to,
        };

        if self.status.is_terminal() {
            return Err(refused);
        }

        match update {
            StatusUpdate::Advance { status, progress } => {
                if status.is_terminal()
                    || status.rank() < self.status.rank()
                    || progress < self.progress
                {
                    return Err(refused);
                }
                self.status = status;
                self.progress = progress.min(100);
            }
            StatusUpdate::Complete {
                text,
                confidence,
                decoder,
            } => {
                self.status = ProcessStatus::Completed;
                self.progress = 100;
                self.text_length = Some(text.chars().count());
                self.extracted_text = Some(text);
                self.confidence = confidence;
                self.decoder = decoder;
            }
            StatusUpdate::Fail(error) => {
                self.status = ProcessStatus::Failed;
                self.error = Some(error);
            }
        }

        self.updated_at = Utc::now();
        Ok(())
    }
}

/// What the poll endpoint returns for a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: ProcessStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_info: Option<FileInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProcessError>,
}

impl From<ProcessRecord> for StatusSnapshot {
    fn from(record: ProcessRecord) -> Self {
        Self {
            status: record.status,
            progress: record.progress,
            extracted_text: record.extracted_text,
            text_length: record.text_length,
            file_info: Some(record.file_info),
            confidence: record.confidence,
            error: record.error,
        }
    }
}

/// Storage for process records, isolating the poll contract
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn create(&self, record: ProcessRecord) -> Result<(), StatusError>;

    /// Snapshot of a record. Reading a finished record starts its expiry.
    async fn get(&self, process_id: &str) -> Result<ProcessRecord, StatusError>;

    async fn update(
        &self,
        process_id: &str,
        update: StatusUpdate,
    ) -> Result<ProcessRecord, StatusError>;

    /// Drop expired records, returning how many were removed
    async fn sweep_expired(&self) -> usize;
}

/// How long a finished record that was never polled is kept
pub const DEFAULT_UNOBSERVED_TTL: Duration = Duration::from_secs(3600);

struct StoredRecord {
    record: ProcessRecord,
    finished_at: Option<Instant>,
    observed_at: Option<Instant>,
}

impl StoredRecord {
    fn is_expired(&self, ttl: Duration, unobserved_ttl: Duration) -> bool {
        match (self.observed_at, self.finished_at) {
            (Some(observed), _) => observed.elapsed() >= ttl,
            (None, Some(finished)) => finished.elapsed() >= unobserved_ttl,
            (None, None) => false,
        }
    }
}

pub struct InMemoryStatusStore {
    records: RwLock<HashMap<String, StoredRecord>>,
    ttl: Duration,
    unobserved_ttl: Duration,
}

impl InMemoryStatusStore {
    /// `ttl` counts from the first poll that sees a finished record
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            ttl,
            unobserved_ttl: DEFAULT_UNOBSERVED_TTL.max(ttl),
        }
    }

    /// Lifetime of finished records that no poll has seen
    pub fn with_unobserved_ttl(mut self, ttl: Duration) -> Self {
        self.unobserved_ttl = ttl;
        self
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn create(&self, record: ProcessRecord) -> Result<(), StatusError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.process_id) {
            return Err(StatusError::DuplicateProcess(record.process_id));
        }
        records.insert(
            record.process_id.clone(),
            StoredRecord {
                record,
                finished_at: None,
                observed_at: None,
            },
        );
        Ok(())
    }

    async fn get(&self, process_id: &str) -> Result<ProcessRecord, StatusError> {
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(process_id)
            .ok_or_else(|| StatusError::UnknownProcess(process_id.to_string()))?;

        if stored.record.status.is_terminal() && stored.observed_at.is_none() {
            stored.observed_at = Some(Instant::now());
        }
        Ok(stored.record.clone())
    }

    async fn update(
        &self,
        process_id: &str,
        update: StatusUpdate,
    ) -> Result<ProcessRecord, StatusError> {
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(process_id)
            .ok_or_else(|| StatusError::UnknownProcess(process_id.to_string()))?;

        stored.record.apply(update)?;
        if stored.record.status.is_terminal() && stored.finished_at.is_none() {
            stored.finished_at = Some(Instant::now());
        }
        Ok(stored.record.clone())
    }

    async fn sweep_expired(&self) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, stored| !stored.is_expired(self.ttl, self.unobserved_ttl));
        before - records.len()
    }
}

/// Sweep `store` every `interval` until the runtime shuts down
pub fn spawn_sweeper(store: Arc<dyn StatusStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = store.sweep_expired().await;
            if removed > 0 {
                debug!(removed, "Swept expired process records");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(id: &str) -> ProcessRecord {
        ProcessRecord::new(id, FileInfo::new("plano.pdf", 2048))
    }

    fn complete(text: &str) -> StatusUpdate {
        StatusUpdate::Complete {
            text: text.to_string(),
            confidence: Some(Confidence::High),
            decoder: Some(DecoderKind::ReadableText),
        }
    }

    #[test]
    fn test_forward_transitions() {
        let mut record = record("pdf-process-1");
        assert_eq!(record.status, ProcessStatus::Processing);
        assert_eq!(record.progress, 10);

        record
            .apply(StatusUpdate::Advance {
                status: ProcessStatus::Analyzing,
                progress: 50,
            })
            .unwrap();
        record.apply(complete("Final text here")).unwrap();

        assert_eq!(record.status, ProcessStatus::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.text_length, Some(15));
    }

    #[test]
    fn test_regression_is_rejected_and_record_unchanged() {
        let mut record = record("pdf-process-2");
        record
            .apply(StatusUpdate::Advance {
                status: ProcessStatus::Analyzing,
                progress: 50,
            })
            .unwrap();
        let before = record.clone();

        let err = record
            .apply(StatusUpdate::Advance {
                status: ProcessStatus::Processing,
                progress: 60,
            })
            .unwrap_err();
        assert!(matches!(err, StatusError::InvalidTransition { .. }));

        let err = record
            .apply(StatusUpdate::Advance {
                status: ProcessStatus::Analyzing,
                progress: 20,
            })
            .unwrap_err();
        assert!(matches!(err, StatusError::InvalidTransition { .. }));
        assert_eq!(record, before);
    }

    #[test]
    fn test_terminal_records_are_frozen() {
        let mut record = record("pdf-process-3");
        record
            .apply(StatusUpdate::Fail(ProcessError {
                kind: ErrorKind::WebhookRejected,
                message: "status 500".into(),
            }))
            .unwrap();

        assert!(record.apply(complete("late text")).is_err());
        assert_eq!(record.status, ProcessStatus::Failed);
        assert_eq!(record.extracted_text, None);
    }

    #[test]
    fn test_snapshot_omits_absent_fields() {
        let snapshot = StatusSnapshot::from(record("pdf-process-4"));
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["fileInfo"]["name"], "plano.pdf");
        assert!(json.get("extractedText").is_none());
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_store_unknown_and_duplicate() {
        let store = InMemoryStatusStore::new(Duration::from_secs(300));
        assert!(matches!(
            store.get("pdf-process-missing").await,
            Err(StatusError::UnknownProcess(_))
        ));

        store.create(record("pdf-process-5")).await.unwrap();
        assert!(matches!(
            store.create(record("pdf-process-5")).await,
            Err(StatusError::DuplicateProcess(_))
        ));
    }

    #[tokio::test]
    async fn test_expiry_starts_when_terminal_record_is_polled() {
        let store = InMemoryStatusStore::new(Duration::ZERO);
        store.create(record("pdf-process-6")).await.unwrap();
        store.create(record("pdf-process-7")).await.unwrap();

        // Polled while running: not expired
        store.get("pdf-process-6").await.unwrap();
        assert_eq!(store.sweep_expired().await, 0);

        store
            .update("pdf-process-6", complete("Delivered text"))
            .await
            .unwrap();
        assert_eq!(store.sweep_expired().await, 0);

        store.get("pdf-process-6").await.unwrap();
        assert_eq!(store.sweep_expired().await, 1);
        assert!(matches!(
            store.get("pdf-process-6").await,
            Err(StatusError::UnknownProcess(_))
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_unpolled_finished_records_expire() {
        let store = InMemoryStatusStore::new(Duration::from_secs(300))
            .with_unobserved_ttl(Duration::ZERO);
        store.create(record("pdf-process-9")).await.unwrap();
        store.create(record("pdf-process-10")).await.unwrap();
        store
            .update(
                "pdf-process-9",
                StatusUpdate::Fail(ProcessError {
                    kind: ErrorKind::WebhookRejected,
                    message: "status 500".into(),
                }),
            )
            .await
            .unwrap();

        // Only the finished one goes; the running job is kept
        assert_eq!(store.sweep_expired().await, 1);
        assert!(store.get("pdf-process-10").await.is_ok());
        assert!(matches!(
            store.get("pdf-process-9").await,
            Err(StatusError::UnknownProcess(_))
        ));
    }

    #[tokio::test]
    async fn test_unpolled_records_outlive_polled_ttl() {
        let store = InMemoryStatusStore::new(Duration::ZERO);
        store.create(record("pdf-process-11")).await.unwrap();
        store
            .update("pdf-process-11", complete("Delivered text"))
            .await
            .unwrap();

        assert_eq!(store.sweep_expired().await, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_ttl_keeps_recently_observed_records() {
        let store = InMemoryStatusStore::new(Duration::from_secs(300));
        store.create(record("pdf-process-8")).await.unwrap();
        store
            .update("pdf-process-8", complete("Delivered text"))
            .await
            .unwrap();
        store.get("pdf-process-8").await.unwrap();

        assert_eq!(store.sweep_expired().await, 0);
        assert!(!store.is_empty().await);
    }
}
