//! Job pipeline: extraction, webhook delivery and record updates
//!
//! Each accepted upload gets a process record and one spawned task. The
//! task extracts text (external decoder first when configured, in-process
//! decoders on a blocking thread), moves the record to `analyzing`, posts
//! the webhook and finishes the record as `completed` or `failed`.

use std::sync::Arc;

use bytes::Bytes;
use pdf_text_core::{Confidence, DecoderKind, ErrorKind, FileInfo, Orchestrator};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::status::{
    ProcessError, ProcessRecord, ProcessStatus, StatusError, StatusStore, StatusUpdate,
};
use crate::webhook::{WebhookClient, WebhookPayload};

/// Progress reported once extraction has produced text
pub const ANALYZING_PROGRESS: u8 = 50;

/// Optional form fields sent with an upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_phase_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A validated upload
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: Bytes,
    pub metadata: UploadMetadata,
}

impl Upload {
    pub fn file_info(&self) -> FileInfo {
        FileInfo::new(self.file_name.clone(), self.data.len() as u64)
    }
}

/// Unique id of the form `pdf-process-<uuid>`
pub fn new_process_id() -> String {
    format!("pdf-process-{}", Uuid::new_v4())
}

/// Where the delivered text came from
#[derive(Debug, Clone, Copy, Default)]
struct Provenance {
    confidence: Option<Confidence>,
    decoder: Option<DecoderKind>,
}

#[derive(Clone)]
pub struct Pipeline {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn StatusStore>,
    webhook: WebhookClient,
    max_webhook_text: usize,
}

impl Pipeline {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        store: Arc<dyn StatusStore>,
        webhook: WebhookClient,
        max_webhook_text: usize,
    ) -> Self {
        Self {
            orchestrator,
            store,
            webhook,
            max_webhook_text,
        }
    }

    pub fn store(&self) -> &Arc<dyn StatusStore> {
        &self.store
    }

    /// Register a job for `upload` and start it in the background
    pub async fn submit_upload(&self, upload: Upload) -> Result<ProcessRecord, StatusError> {
        let process_id = new_process_id();
        let file_info = upload.file_info();
        let record = ProcessRecord::new(process_id.clone(), file_info.clone());
        self.store.create(record.clone()).await?;

        info!(
            process_id = %process_id,
            file = %file_info.name,
            size = file_info.size_bytes,
            project_phase_id = ?upload.metadata.project_phase_id,
            pdf_type = ?upload.metadata.pdf_type,
            "Upload accepted"
        );

        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline
                .run_upload(process_id, upload.data, file_info)
                .await;
        });

        Ok(record)
    }

    /// Register a delivery-only job for text extracted elsewhere
    pub async fn submit_for_delivery(
        &self,
        text: String,
        file_info: FileInfo,
    ) -> Result<ProcessRecord, StatusError> {
        let process_id = new_process_id();
        let record = ProcessRecord::new(process_id.clone(), file_info.clone());
        self.store.create(record.clone()).await?;

        info!(process_id = %process_id, file = %file_info.name, "Delivery accepted");

        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline
                .deliver(&process_id, text, file_info, Provenance::default())
                .await;
        });

        Ok(record)
    }

    async fn run_upload(&self, process_id: String, data: Bytes, file_info: FileInfo) {
        let extraction = match Arc::clone(&self.orchestrator)
            .extract_with_external(&process_id, data)
            .await
        {
            Ok(extraction) => extraction,
            Err(err) => {
                warn!(process_id = %process_id, error = %err, "Extraction failed");
                self.fail(&process_id, err.kind(), err.to_string()).await;
                return;
            }
        };

        info!(
            process_id = %process_id,
            decoder = %extraction.decoder,
            confidence = ?extraction.confidence,
            chars = extraction.text_length(),
            attempts = extraction.attempts.len(),
            "Text extracted"
        );

        let provenance = Provenance {
            confidence: Some(extraction.confidence),
            decoder: Some(extraction.decoder),
        };
        self.deliver(&process_id, extraction.text, file_info, provenance)
            .await;
    }

    async fn deliver(
        &self,
        process_id: &str,
        text: String,
        file_info: FileInfo,
        provenance: Provenance,
    ) {
        let required = self.orchestrator.config().min_text_length;
        let found = text.chars().count();
        if found < required {
            warn!(process_id, found, required, "Text too short for delivery");
            self.fail(
                process_id,
                ErrorKind::InsufficientText,
                format!("Insufficient text: extracted {found} characters, at least {required} required"),
            )
            .await;
            return;
        }

        self.transition(
            process_id,
            StatusUpdate::Advance {
                status: ProcessStatus::Analyzing,
                progress: ANALYZING_PROGRESS,
            },
        )
        .await;

        let payload = WebhookPayload::new(&text, &file_info, self.max_webhook_text);
        match self.webhook.post(&payload).await {
            Ok(receipt) => {
                info!(process_id, status = receipt.status, "Delivery completed");
                self.transition(
                    process_id,
                    StatusUpdate::Complete {
                        text,
                        confidence: provenance.confidence,
                        decoder: provenance.decoder,
                    },
                )
                .await;
            }
            Err(err) => {
                error!(process_id, error = %err, "Delivery failed");
                self.fail(process_id, err.kind(), err.to_string()).await;
            }
        }
    }

    async fn fail(&self, process_id: &str, kind: ErrorKind, message: String) {
        self.transition(process_id, StatusUpdate::Fail(ProcessError { kind, message }))
            .await;
    }

    async fn transition(&self, process_id: &str, update: StatusUpdate) {
        match self.store.update(process_id, update).await {
            Ok(record) => {
                info!(process_id, status = ?record.status, progress = record.progress, "Process updated");
            }
            Err(err) => {
                warn!(process_id, error = %err, "Process update refused");
            }
        }
    }
}
