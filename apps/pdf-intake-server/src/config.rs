//! Server configuration
//!
//! Every option can be given as a flag or through the environment (a `.env`
//! file is loaded first by the binary). Numbers that fail to parse are
//! rejected by clap at startup; [`ServerConfig::validate`] catches the rest.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use pdf_text_core::{ExternalCommand, ExtractionConfig};
use thiserror::Error;

pub const DEFAULT_WEBHOOK_URL: &str = "https://n8n-jose.up.railway.app/webhook-test/pdfexca";
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_WEBHOOK_TEXT: usize = 50 * 1024;

/// Slack on top of the file limit for multipart framing and form fields
pub const BODY_LIMIT_SLACK: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("Invalid webhook URL '{url}': {reason}")]
    InvalidWebhookUrl { url: String, reason: String },
}

/// Flags for the `serve` subcommand
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Webhook that receives extracted text
    #[arg(long, env = "N8N_WEBHOOK_URL", default_value = DEFAULT_WEBHOOK_URL)]
    pub webhook_url: String,

    /// Maximum upload size in bytes
    #[arg(long, env = "PDF_MAX_FILE_SIZE", default_value_t = DEFAULT_MAX_FILE_SIZE)]
    pub max_file_size: usize,

    /// Minimum extracted characters required for delivery
    #[arg(long, env = "PDF_MIN_TEXT_LENGTH", default_value_t = 10)]
    pub min_text_length: usize,

    /// Time budget for the external extractor and the webhook call
    #[arg(long, env = "PDF_PROCESSING_TIMEOUT_MS", default_value_t = 30_000)]
    pub processing_timeout_ms: u64,

    /// Maximum stdout captured from the external extractor
    #[arg(long, env = "PDF_MAX_BUFFER_SIZE", default_value_t = DEFAULT_MAX_BUFFER_SIZE)]
    pub max_buffer_size: usize,

    /// Characters of text sent to the webhook before truncation
    #[arg(long, env = "PDF_MAX_WEBHOOK_TEXT", default_value_t = DEFAULT_MAX_WEBHOOK_TEXT)]
    pub max_webhook_text: usize,

    /// External extractor command line; the PDF path is appended
    #[arg(long, env = "PDF_EXTRACTOR_COMMAND")]
    pub extractor_command: Option<String>,

    /// Directory for the external extractor's temporary files
    #[arg(long, env = "PDF_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Accepted bearer tokens (comma separated). Empty accepts any token.
    #[arg(long, env = "API_TOKENS", value_delimiter = ',')]
    pub api_tokens: Vec<String>,

    /// Seconds a finished record survives after it was first polled
    #[arg(long, env = "PDF_RECORD_TTL_SECS", default_value_t = 300)]
    pub record_ttl_secs: u64,

    /// Seconds a finished record survives when it is never polled
    #[arg(long, env = "PDF_UNPOLLED_RECORD_TTL_SECS", default_value_t = 3600)]
    pub unpolled_record_ttl_secs: u64,

    /// Rate limit: requests per second per IP
    #[arg(long, env = "RATE_LIMIT", default_value_t = 10)]
    pub rate_limit: u32,
}

/// Resolved configuration shared by the router and the pipeline
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub webhook_url: String,
    pub max_file_size: usize,
    pub min_text_length: usize,
    pub processing_timeout: Duration,
    pub max_buffer_size: usize,
    pub max_webhook_text: usize,
    pub extractor_command: Option<ExternalCommand>,
    pub temp_dir: PathBuf,
    pub api_tokens: Vec<String>,
    pub record_ttl: Duration,
    pub unpolled_record_ttl: Duration,
    pub sweep_interval: Duration,
    pub rate_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            webhook_url: DEFAULT_WEBHOOK_URL.to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            min_text_length: 10,
            processing_timeout: Duration::from_millis(30_000),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_webhook_text: DEFAULT_MAX_WEBHOOK_TEXT,
            extractor_command: None,
            temp_dir: std::env::temp_dir(),
            api_tokens: Vec::new(),
            record_ttl: Duration::from_secs(300),
            unpolled_record_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            rate_limit: 10,
        }
    }
}

impl From<ServeArgs> for ServerConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            webhook_url: args.webhook_url,
            max_file_size: args.max_file_size,
            min_text_length: args.min_text_length,
            processing_timeout: Duration::from_millis(args.processing_timeout_ms),
            max_buffer_size: args.max_buffer_size,
            max_webhook_text: args.max_webhook_text,
            extractor_command: args
                .extractor_command
                .as_deref()
                .and_then(ExternalCommand::parse),
            temp_dir: args.temp_dir.unwrap_or_else(std::env::temp_dir),
            api_tokens: args
                .api_tokens
                .into_iter()
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty())
                .collect(),
            record_ttl: Duration::from_secs(args.record_ttl_secs),
            unpolled_record_ttl: Duration::from_secs(args.unpolled_record_ttl_secs),
            sweep_interval: Duration::from_secs(60),
            rate_limit: args.rate_limit,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_file_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "PDF_MAX_FILE_SIZE",
                reason: "must be greater than zero".into(),
            });
        }
        if self.processing_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "PDF_PROCESSING_TIMEOUT_MS",
                reason: "must be greater than zero".into(),
            });
        }
        if self.max_buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "PDF_MAX_BUFFER_SIZE",
                reason: "must be greater than zero".into(),
            });
        }
        if self.unpolled_record_ttl < self.record_ttl {
            return Err(ConfigError::InvalidValue {
                name: "PDF_UNPOLLED_RECORD_TTL_SECS",
                reason: "must not be shorter than PDF_RECORD_TTL_SECS".into(),
            });
        }
        if self.rate_limit == 0 {
            return Err(ConfigError::InvalidValue {
                name: "RATE_LIMIT",
                reason: "must be greater than zero".into(),
            });
        }

        let url = reqwest::Url::parse(&self.webhook_url).map_err(|e| {
            ConfigError::InvalidWebhookUrl {
                url: self.webhook_url.clone(),
                reason: e.to_string(),
            }
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidWebhookUrl {
                url: self.webhook_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        Ok(())
    }

    /// Thresholds handed to the extraction orchestrator
    pub fn extraction_config(&self) -> ExtractionConfig {
        ExtractionConfig {
            min_text_length: self.min_text_length,
            external_timeout_ms: u64::try_from(self.processing_timeout.as_millis())
                .unwrap_or(u64::MAX),
            ..ExtractionConfig::default()
        }
    }

    /// Request body limit for uploads
    pub fn body_limit(&self) -> usize {
        self.max_file_size.saturating_add(BODY_LIMIT_SLACK)
    }

    /// Any non-empty token passes when no tokens are configured
    pub fn accepts_token(&self, token: &str) -> bool {
        !token.is_empty()
            && (self.api_tokens.is_empty() || self.api_tokens.iter().any(|t| t == token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        serve: ServeArgs,
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.body_limit(), 11 * 1024 * 1024);
        assert_eq!(config.extraction_config().external_timeout_ms, 30_000);
    }

    #[test]
    fn test_flags_resolve_into_config() {
        let cli = TestCli::try_parse_from([
            "test",
            "--port",
            "8080",
            "--api-tokens",
            "alpha, beta",
            "--extractor-command",
            "python3 scripts/extract.py",
            "--max-file-size",
            "1024",
        ])
        .unwrap();
        let config = ServerConfig::from(cli.serve);

        assert_eq!(config.port, 8080);
        assert_eq!(config.max_file_size, 1024);
        assert_eq!(config.api_tokens, vec!["alpha", "beta"]);
        let command = config.extractor_command.unwrap();
        assert_eq!(command.program, "python3");
        assert_eq!(command.args, vec!["scripts/extract.py"]);
    }

    #[test]
    fn test_non_numeric_size_is_rejected() {
        assert!(TestCli::try_parse_from(["test", "--max-file-size", "ten"]).is_err());
    }

    #[test]
    fn test_invalid_webhook_url() {
        let config = ServerConfig {
            webhook_url: "ftp://example.com/hook".into(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWebhookUrl { .. })
        ));
    }

    #[test]
    fn test_unpolled_ttl_flag() {
        let cli = TestCli::try_parse_from([
            "test",
            "--record-ttl-secs",
            "60",
            "--unpolled-record-ttl-secs",
            "900",
        ])
        .unwrap();
        let config = ServerConfig::from(cli.serve);
        assert_eq!(config.unpolled_record_ttl, Duration::from_secs(900));
        assert!(config.validate().is_ok());

        let shorter = ServerConfig {
            unpolled_record_ttl: Duration::from_secs(10),
            ..config
        };
        assert!(matches!(
            shorter.validate(),
            Err(ConfigError::InvalidValue { name: "PDF_UNPOLLED_RECORD_TTL_SECS", .. })
        ));
    }

    #[test]
    fn test_token_acceptance() {
        let open = ServerConfig::default();
        assert!(open.accepts_token("anything"));
        assert!(!open.accepts_token(""));

        let locked = ServerConfig {
            api_tokens: vec!["secret".into()],
            ..ServerConfig::default()
        };
        assert!(locked.accepts_token("secret"));
        assert!(!locked.accepts_token("guess"));
    }
}
