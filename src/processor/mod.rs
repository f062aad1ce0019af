//! Processor integrations: the hosted model endpoints a requisition can be
//! sent to.
//!
//! A processor owns one provider protocol (request shape, upload dance,
//! auth). Everything else (batching, parsing, persistence, reporting) is
//! provider-agnostic and lives outside this module. The [`DocumentProcessor`]
//! trait keeps that boundary mockable.

pub mod genai;
pub mod requesty;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{self, Settings};

pub use genai::GenAiProcessor;
pub use requesty::RequestyProcessor;

// ──────────────────────────────────────────────
// Kinds
// ──────────────────────────────────────────────

/// Which hosted integration handles the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    GenAi,
    Requesty,
}

impl ProcessorKind {
    /// Accepts the menu key or the processor name, case-insensitively.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "1" | "genai" => Some(Self::GenAi),
            "2" | "requesty" => Some(Self::Requesty),
            _ => None,
        }
    }

    /// Name used in menus, logs, and artifact file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenAi => "genai",
            Self::Requesty => "requesty",
        }
    }

    /// The model catalog offered for this processor.
    pub fn catalog(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::GenAi => config::GENAI_MODELS,
            Self::Requesty => config::REQUESTY_MODELS,
        }
    }
}

impl std::fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("PDF file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("file is not a PDF: {0}")]
    NotAPdf(PathBuf),

    #[error("cannot read PDF file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not configured; set the environment variable")]
    MissingConfiguration(&'static str),

    #[error("cannot reach {0}")]
    Connect(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("remote file processing failed: {0}")]
    UploadFailed(String),

    #[error("provider returned an empty reply")]
    EmptyReply,

    #[error("cannot decode provider response: {0}")]
    ResponseDecoding(String),

    #[error("network error: {0}")]
    Network(String),
}

impl ProcessorError {
    /// Map a reqwest failure onto the taxonomy, preserving the
    /// timeout/connect distinction the diagnostics rely on.
    pub(crate) fn from_reqwest(err: reqwest::Error, endpoint: &str, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout_secs)
        } else if err.is_connect() {
            Self::Connect(endpoint.to_string())
        } else if err.is_decode() {
            Self::ResponseDecoding(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }

    /// Transient failures worth retrying (connection drops and timeouts).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_))
            || matches!(self, Self::Api { status, .. } if *status == 429 || *status >= 500)
    }
}

// ──────────────────────────────────────────────
// Inputs and outputs
// ──────────────────────────────────────────────

/// A validated input document.
#[derive(Debug, Clone)]
pub struct PdfFile {
    path: PathBuf,
    file_name: String,
}

impl PdfFile {
    /// Validate that the path exists, has a `.pdf` extension
    /// (case-insensitive), and is readable.
    pub fn open(path: &Path) -> Result<Self, ProcessorError> {
        if !path.exists() {
            return Err(ProcessorError::FileNotFound(path.to_path_buf()));
        }
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return Err(ProcessorError::NotAPdf(path.to_path_buf()));
        }
        // Readability probe; the bytes are read again at send time.
        std::fs::File::open(path).map_err(|source| ProcessorError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf")
            .to_string();

        tracing::debug!(path = %path.display(), "file validation successful");
        Ok(Self { path: path.to_path_buf(), file_name })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Read the document bytes for transmission.
    pub fn read_bytes(&self) -> Result<Vec<u8>, ProcessorError> {
        std::fs::read(&self.path).map_err(|source| ProcessorError::Unreadable {
            path: self.path.clone(),
            source,
        })
    }
}

/// Per-run request parameters shared by every file in a batch.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Provider model id, as listed in the catalog.
    pub model: String,
    /// Stream the completion where the provider supports it.
    pub streaming: bool,
}

/// Token accounting as reported by the provider, when available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Billed cost in USD (Requesty reports it, GenAI does not).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// Result of one successful provider round-trip.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// Raw completion text, fences and all.
    pub raw_reply: String,
    pub usage: Option<TokenUsage>,
    pub elapsed: Duration,
}

// ──────────────────────────────────────────────
// The trait
// ──────────────────────────────────────────────

/// A hosted model integration that can read one requisition PDF.
///
/// Implementations own the full provider round-trip for a single file.
/// They must be `&self`-callable from many in-flight futures at once,
/// because the batch runner drives up to `max_workers` extractions concurrently
/// over one shared instance.
pub trait DocumentProcessor {
    fn kind(&self) -> ProcessorKind;

    /// Send one PDF to the provider and return its raw reply.
    fn extract(
        &self,
        pdf: &PdfFile,
        request: &ExtractionRequest,
    ) -> impl Future<Output = Result<ExtractionOutcome, ProcessorError>>;
}

// ──────────────────────────────────────────────
// Retry policy
// ──────────────────────────────────────────────

/// Attempts for transient provider failures, including the first try.
pub(crate) const RETRY_ATTEMPTS: u32 = 3;

/// Exponential backoff starting at 4s, capped at 10s.
pub(crate) fn retry_delay(attempt: u32) -> Duration {
    let secs = 4u64.saturating_mul(1 << attempt.min(8));
    Duration::from_secs(secs.min(10))
}

/// Run `op` with the transient-failure retry policy.
pub(crate) async fn with_retry<T, F, Fut>(what: &str, op: F) -> Result<T, ProcessorError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProcessorError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < RETRY_ATTEMPTS => {
                let delay = retry_delay(attempt);
                tracing::warn!(
                    operation = what,
                    attempt = attempt + 1,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "transient provider failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

// ──────────────────────────────────────────────
// MockProcessor (testing)
// ──────────────────────────────────────────────

/// Mock processor for tests. Returns a configurable reply or error.
#[cfg(test)]
pub struct MockProcessor {
    reply: String,
    usage: Option<TokenUsage>,
    fail_on: Vec<String>,
}

#[cfg(test)]
impl MockProcessor {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            usage: None,
            fail_on: Vec::new(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Fail extraction for the given file names.
    pub fn failing_on(mut self, file_name: &str) -> Self {
        self.fail_on.push(file_name.to_string());
        self
    }
}

#[cfg(test)]
impl DocumentProcessor for MockProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::GenAi
    }

    async fn extract(
        &self,
        pdf: &PdfFile,
        _request: &ExtractionRequest,
    ) -> Result<ExtractionOutcome, ProcessorError> {
        if self.fail_on.iter().any(|f| f == pdf.file_name()) {
            return Err(ProcessorError::Api {
                status: 500,
                body: "mock failure".into(),
            });
        }
        Ok(ExtractionOutcome {
            raw_reply: self.reply.clone(),
            usage: self.usage,
            elapsed: Duration::from_millis(5),
        })
    }
}

// ──────────────────────────────────────────────
// Processor construction from settings
// ──────────────────────────────────────────────

/// Build the selected processor from settings.
///
/// Enum dispatch instead of trait objects: the trait's async method keeps it
/// non-object-safe, and two variants do not justify boxing.
pub enum AnyProcessor {
    GenAi(GenAiProcessor),
    Requesty(RequestyProcessor),
}

impl AnyProcessor {
    pub fn build(kind: ProcessorKind, settings: &Settings) -> Result<Self, ProcessorError> {
        match kind {
            ProcessorKind::GenAi => Ok(Self::GenAi(GenAiProcessor::new(settings)?)),
            ProcessorKind::Requesty => Ok(Self::Requesty(RequestyProcessor::new(settings)?)),
        }
    }
}

impl DocumentProcessor for AnyProcessor {
    fn kind(&self) -> ProcessorKind {
        match self {
            Self::GenAi(p) => p.kind(),
            Self::Requesty(p) => p.kind(),
        }
    }

    async fn extract(
        &self,
        pdf: &PdfFile,
        request: &ExtractionRequest,
    ) -> Result<ExtractionOutcome, ProcessorError> {
        match self {
            Self::GenAi(p) => p.extract(pdf, request).await,
            Self::Requesty(p) => p.extract(pdf, request).await,
        }
    }
}
