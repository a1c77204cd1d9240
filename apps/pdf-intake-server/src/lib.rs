//! Excavation PDF intake server
//!
//! Accepts PDF uploads over HTTP, extracts their text in the background,
//! delivers it to a webhook and exposes the job state for polling.
//!
//! ## Architecture
//!
//! - `api`: axum routes, upload validation and response envelopes
//! - `auth`: bearer-token extractor
//! - `pipeline`: one background task per job (extract, deliver, record)
//! - `status`: forward-only process records behind a [`status::StatusStore`]
//! - `webhook`: the single outbound POST
//! - `poller`: client-side loop over the status endpoint
//!
//! Text extraction itself lives in `pdf-text-core`.

use std::sync::Arc;

use pdf_text_core::{Orchestrator, SubprocessDecoder};
use tracing::info;

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod poller;
pub mod status;
pub mod webhook;


use config::ServerConfig;
use pipeline::Pipeline;
use status::InMemoryStatusStore;
use webhook::WebhookClient;

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self, reqwest::Error> {
        let mut orchestrator = Orchestrator::new(config.extraction_config());
        if let Some(command) = &config.extractor_command {
            info!(program = %command.program, "External extractor enabled");
            let decoder = SubprocessDecoder::new(command.clone())
                .with_temp_dir(config.temp_dir.clone())
                .with_max_output(config.max_buffer_size);
            orchestrator = orchestrator.with_external(Arc::new(decoder));
        }

        let store = Arc::new(
            InMemoryStatusStore::new(config.record_ttl)
                .with_unobserved_ttl(config.unpolled_record_ttl),
        );
        let webhook = WebhookClient::new(config.webhook_url.clone(), config.processing_timeout)?;
        let pipeline = Pipeline::new(
            Arc::new(orchestrator),
            store,
            webhook,
            config.max_webhook_text,
        );

        Ok(Self { config, pipeline })
    }
}
