//! Client-side poll loop over the status endpoint

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::ApiResponse;
use crate::error::ErrorResponse;
use crate::status::StatusSnapshot;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 150;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server answered {status} ({code}): {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("Process still running after {attempts} polls")]
    Exhausted { attempts: u32 },
}

pub struct StatusPoller {
    client: reqwest::Client,
    base_url: String,
    token: String,
    interval: Duration,
    max_attempts: u32,
}

impl StatusPoller {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// One GET of the status endpoint
    pub async fn fetch(&self, process_id: &str) -> Result<StatusSnapshot, PollError> {
        let url = format!(
            "{}/excavation/process-pdf/status/{}",
            self.base_url, process_id
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => PollError::Api {
                    status,
                    code: err.code,
                    message: err.error,
                },
                Err(_) => PollError::Api {
                    status,
                    code: String::new(),
                    message: body,
                },
            });
        }

        let envelope: ApiResponse<StatusSnapshot> = response.json().await?;
        Ok(envelope.data)
    }

    /// Poll until the process reaches `completed` or `failed`
    pub async fn wait_for_completion(&self, process_id: &str) -> Result<StatusSnapshot, PollError> {
        for attempt in 1..=self.max_attempts {
            let snapshot = self.fetch(process_id).await?;
            debug!(
                process_id,
                attempt,
                status = ?snapshot.status,
                progress = snapshot.progress,
                "Polled status"
            );

            if snapshot.status.is_terminal() {
                info!(process_id, status = ?snapshot.status, attempts = attempt, "Process finished");
                return Ok(snapshot);
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(PollError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}
