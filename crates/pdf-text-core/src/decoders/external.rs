//! Out-of-process decoder
//!
//! A dedicated parser is run as a child process against a temporary copy of
//! the upload. It must print a single JSON object on stdout:
//!
//! ```json
//! {"success": true, "text": "...", "pages": 3}
//! {"success": false, "error": "encrypted document"}
//! ```
//!
//! The temporary file is removed on every exit path, including timeouts.

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, Command};
use tracing::{debug, warn};

use crate::error::DecoderError;

/// Cap on captured stderr, used only for diagnostics
const MAX_STDERR_BYTES: u64 = 64 * 1024;

/// Text recovery delegated to something outside this process
#[async_trait]
pub trait ExternalDecoder: Send + Sync {
    fn name(&self) -> &str;

    /// Extract text from `buffer`, giving up after `timeout`
    async fn extract(
        &self,
        job_id: &str,
        buffer: &[u8],
        timeout: Duration,
    ) -> Result<String, DecoderError>;
}

/// Program and leading arguments; the temp file path is appended last
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a command line on whitespace. Returns `None` when blank.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SubprocessOutput {
    success: bool,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    pages: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

/// Runs an [`ExternalCommand`] per job
#[derive(Debug, Clone)]
pub struct SubprocessDecoder {
    command: ExternalCommand,
    temp_dir: PathBuf,
    max_output_bytes: usize,
}

impl SubprocessDecoder {
    pub const DEFAULT_MAX_OUTPUT: usize = 10 * 1024 * 1024;

    pub fn new(command: ExternalCommand) -> Self {
        Self {
            command,
            temp_dir: std::env::temp_dir(),
            max_output_bytes: Self::DEFAULT_MAX_OUTPUT,
        }
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn command(&self) -> &ExternalCommand {
        &self.command
    }

    fn write_temp_file(&self, job_id: &str, buffer: &[u8]) -> Result<NamedTempFile, DecoderError> {
        std::fs::create_dir_all(&self.temp_dir)?;
        let prefix = format!("{}-", file_safe(job_id));
        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".pdf")
            .tempfile_in(&self.temp_dir)?;
        file.write_all(buffer)?;
        file.flush()?;
        Ok(file)
    }
}

fn file_safe(job_id: &str) -> String {
    job_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait]
impl ExternalDecoder for SubprocessDecoder {
    fn name(&self) -> &str {
        &self.command.program
    }

    async fn extract(
        &self,
        job_id: &str,
        buffer: &[u8],
        timeout: Duration,
    ) -> Result<String, DecoderError> {
        // Deleted when dropped
        let temp_file = self.write_temp_file(job_id, buffer)?;

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(temp_file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| DecoderError::InvalidOutput("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DecoderError::InvalidOutput("stderr not captured".into()))?;
        let stderr_task = tokio::spawn(drain_stderr(stderr));
        let limit = self.max_output_bytes;

        let run = async {
            let mut out = Vec::new();
            let mut out_reader = (&mut stdout).take(limit as u64 + 1);
            out_reader.read_to_end(&mut out).await?;
            if out.len() > limit {
                return Err(DecoderError::OutputTooLarge { limit });
            }
            let status = child.wait().await?;
            let err = stderr_task.await.unwrap_or_default();
            Ok::<_, DecoderError>((status, out, err))
        };

        let (status, out, err) = match tokio::time::timeout(timeout, run).await {
            Ok(result) => result?,
            Err(_) => {
                let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(job_id, program = %self.command.program, timeout_ms = ms, "External decoder timed out");
                return Err(DecoderError::SubprocessTimeout(ms));
            }
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&err);
            return Err(DecoderError::ExitStatus(format!("{}: {}", status, stderr.trim())));
        }

        let output: SubprocessOutput = serde_json::from_slice(&out)
            .map_err(|e| DecoderError::InvalidOutput(e.to_string()))?;

        if !output.success {
            return Err(DecoderError::Reported(
                output.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        let text = output.text.unwrap_or_default();
        debug!(
            job_id,
            pages = ?output.pages,
            chars = text.chars().count(),
            "External decoder finished"
        );
        Ok(text)
    }
}

/// First [`MAX_STDERR_BYTES`] of stderr; the rest is read to EOF and dropped
async fn drain_stderr(mut stderr: ChildStderr) -> Vec<u8> {
    let mut captured = Vec::new();
    let mut head = (&mut stderr).take(MAX_STDERR_BYTES);
    if let Err(e) = head.read_to_end(&mut captured).await {
        debug!(error = %e, "Failed to read external decoder stderr");
        return captured;
    }
    if let Err(e) = tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await {
        debug!(error = %e, "Failed to drain external decoder stderr");
    }
    captured
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn script(body: &str) -> ExternalCommand {
        ExternalCommand::new("sh", vec!["-c".into(), body.into(), "sh".into()])
    }

    fn leftover_files(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[test]
    fn test_parse_command_line() {
        let command = ExternalCommand::parse("python3  scripts/extract.py --json").unwrap();
        assert_eq!(command.program, "python3");
        assert_eq!(command.args, vec!["scripts/extract.py", "--json"]);
        assert!(ExternalCommand::parse("   ").is_none());
    }

    #[test]
    fn test_file_safe_prefix() {
        assert_eq!(file_safe("pdf-process-1/../x"), "pdf-process-1____x");
    }

    #[tokio::test]
    async fn test_success_reads_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = SubprocessDecoder::new(script(
            r#"test -s "$1" && printf '{"success":true,"text":"Decoded by helper","pages":1}'"#,
        ))
        .with_temp_dir(dir.path());

        let text = decoder
            .extract("job-1", b"%PDF-1.4 body", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "Decoded by helper");
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_reported_failure() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = SubprocessDecoder::new(script(
            r#"printf '{"success":false,"error":"encrypted"}'"#,
        ))
        .with_temp_dir(dir.path());

        let err = decoder
            .extract("job-2", b"%PDF", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DecoderError::Reported(ref msg) if msg == "encrypted"));
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_timeout_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = SubprocessDecoder::new(script("sleep 5")).with_temp_dir(dir.path());

        let err = decoder
            .extract("job-3", b"%PDF", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, DecoderError::SubprocessTimeout(100)));
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_output_limit() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = SubprocessDecoder::new(script("printf '%0200d' 0"))
            .with_temp_dir(dir.path())
            .with_max_output(64);

        let err = decoder
            .extract("job-4", b"%PDF", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DecoderError::OutputTooLarge { limit: 64 }));
    }

    #[tokio::test]
    async fn test_non_json_output() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = SubprocessDecoder::new(script("echo not json")).with_temp_dir(dir.path());

        let err = decoder
            .extract("job-5", b"%PDF", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DecoderError::InvalidOutput(_)));
    }

    #[tokio::test]
    async fn test_chatty_stderr_does_not_block_output() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = SubprocessDecoder::new(script(
            r#"head -c 300000 /dev/zero | tr '\0' w >&2; printf '{"success":true,"text":"ok text"}'"#,
        ))
        .with_temp_dir(dir.path());

        let text = decoder
            .extract("job-7", b"%PDF", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "ok text");
        assert_eq!(leftover_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let decoder =
            SubprocessDecoder::new(script("echo boom >&2; exit 3")).with_temp_dir(dir.path());

        let err = decoder
            .extract("job-6", b"%PDF", Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            DecoderError::ExitStatus(msg) => assert!(msg.contains("boom")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
