//! Google Generative Language API integration.
//!
//! The flow mirrors the Files API contract: upload the PDF, poll until the
//! service finishes ingesting it, run `generateContent` (or the SSE streaming
//! variant) referencing the uploaded file, then delete the remote copy.
//! Remote files are also listable and bulk-deletable for maintenance.

use std::time::{Duration, Instant};

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;

use crate::config::Settings;
use crate::prompts;

use super::{
    with_retry, DocumentProcessor, ExtractionOutcome, ExtractionRequest, PdfFile, ProcessorError,
    ProcessorKind, TokenUsage,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Interval between upload-state polls.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Give up if the service never leaves PROCESSING.
const MAX_POLL_ATTEMPTS: u32 = 150;

#[derive(Debug)]
pub struct GenAiProcessor {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout_secs: u64,
}

// ──────────────────────────────────────────────
// Wire types
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteFile {
    /// Resource id, e.g. `files/abc123`.
    name: String,
    uri: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<RemoteFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

impl From<UsageMetadata> for TokenUsage {
    fn from(meta: UsageMetadata) -> Self {
        TokenUsage {
            prompt_tokens: meta.prompt_token_count,
            completion_tokens: meta.candidates_token_count,
            total_tokens: meta.total_token_count,
            cost: None,
        }
    }
}

// ──────────────────────────────────────────────
// Processor
// ──────────────────────────────────────────────

impl GenAiProcessor {
    pub fn new(settings: &Settings) -> Result<Self, ProcessorError> {
        let api_key = settings
            .genai_api_key
            .clone()
            .ok_or(ProcessorError::MissingConfiguration("GENAI_API_KEY"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| ProcessorError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: settings.request_timeout_secs,
        })
    }

    fn net_err(&self, err: reqwest::Error, endpoint: &str) -> ProcessorError {
        ProcessorError::from_reqwest(err, endpoint, self.timeout_secs)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProcessorError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProcessorError::Api { status: status.as_u16(), body })
    }

    /// Upload the PDF bytes through the raw upload protocol.
    async fn upload(&self, pdf: &PdfFile) -> Result<RemoteFile, ProcessorError> {
        let bytes = pdf.read_bytes()?;
        let url = format!("{}/upload/v1beta/files?key={}", self.base_url, self.api_key);

        tracing::info!(file = pdf.file_name(), size = bytes.len(), "uploading to GenAI");
        let response = self
            .client
            .post(&url)
            .header("X-Goog-Upload-Protocol", "raw")
            .header("Content-Type", "application/pdf")
            .header("X-Goog-Upload-Header-Content-Type", "application/pdf")
            .body(bytes)
            .send()
            .await
            .map_err(|e| self.net_err(e, &self.base_url))?;

        let upload: UploadResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProcessorError::ResponseDecoding(e.to_string()))?;
        Ok(upload.file)
    }

    /// Poll the uploaded file until ingestion completes.
    async fn wait_until_active(&self, file: RemoteFile) -> Result<RemoteFile, ProcessorError> {
        let mut file = file;
        let mut attempts = 0;
        while file.state == "PROCESSING" {
            if attempts >= MAX_POLL_ATTEMPTS {
                return Err(ProcessorError::UploadFailed(format!(
                    "{} still processing after {attempts} polls",
                    file.name
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            attempts += 1;

            let url = format!("{}/v1beta/{}?key={}", self.base_url, file.name, self.api_key);
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| self.net_err(e, &self.base_url))?;
            file = Self::check_status(response)
                .await?
                .json()
                .await
                .map_err(|e| ProcessorError::ResponseDecoding(e.to_string()))?;
        }
        if file.state == "FAILED" {
            return Err(ProcessorError::UploadFailed(format!(
                "remote ingestion of {} failed",
                file.name
            )));
        }
        tracing::debug!(remote = %file.name, state = %file.state, "remote file ready");
        Ok(file)
    }

    fn generation_body(&self, file: &RemoteFile) -> serde_json::Value {
        json!({
            "system_instruction": {
                "parts": [{ "text": prompts::system_prompt(ProcessorKind::GenAi) }]
            },
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "file_data": {
                            "mime_type": "application/pdf",
                            "file_uri": file.uri,
                        }
                    },
                    { "text": prompts::EXTRACTION_INSTRUCTION }
                ]
            }],
            "generationConfig": {
                "temperature": 0.0
            }
        })
    }

    async fn generate(
        &self,
        request: &ExtractionRequest,
        file: &RemoteFile,
    ) -> Result<(String, Option<TokenUsage>), ProcessorError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, request.model, self.api_key
        );
        let response = self
            .client
            .post(&url)
            .json(&self.generation_body(file))
            .send()
            .await
            .map_err(|e| self.net_err(e, &self.base_url))?;

        let parsed: GenerateResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProcessorError::ResponseDecoding(e.to_string()))?;

        let text = collect_text(&parsed);
        if text.is_empty() {
            return Err(ProcessorError::EmptyReply);
        }
        Ok((text, parsed.usage_metadata.map(TokenUsage::from)))
    }

    /// Streaming variant: server-sent events, one `GenerateResponse` chunk
    /// per `data:` line.
    async fn generate_streaming(
        &self,
        request: &ExtractionRequest,
        file: &RemoteFile,
    ) -> Result<(String, Option<TokenUsage>), ProcessorError> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, request.model, self.api_key
        );
        let response = self
            .client
            .post(&url)
            .json(&self.generation_body(file))
            .send()
            .await
            .map_err(|e| self.net_err(e, &self.base_url))?;
        let response = Self::check_status(response).await?;

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut text = String::new();
        let mut usage = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.net_err(e, &self.base_url))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Complete lines only; a chunk can split an event mid-line.
            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim_end_matches('\r').to_string();
                buffer.drain(..=newline);
                let Some(payload) = line.strip_prefix("data: ") else {
                    continue;
                };
                if payload == "[DONE]" {
                    continue;
                }
                match serde_json::from_str::<GenerateResponse>(payload) {
                    Ok(chunk) => {
                        text.push_str(&collect_text(&chunk));
                        if let Some(meta) = chunk.usage_metadata {
                            usage = Some(TokenUsage::from(meta));
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "skipping undecodable stream event");
                    }
                }
            }
        }

        if text.is_empty() {
            return Err(ProcessorError::EmptyReply);
        }
        Ok((text, usage))
    }

    /// Best-effort cleanup of the uploaded file.
    async fn delete_remote(&self, file: &RemoteFile) {
        let url = format!("{}/v1beta/{}?key={}", self.base_url, file.name, self.api_key);
        match self.client.delete(&url).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(remote = %file.name, "deleted remote file");
            }
            Ok(response) => {
                tracing::warn!(remote = %file.name, status = %response.status(), "remote delete refused");
            }
            Err(err) => {
                tracing::warn!(remote = %file.name, error = %err, "remote delete failed");
            }
        }
    }

    /// List files still held by the service, across all pages.
    pub async fn list_remote_files(&self) -> Result<Vec<(String, Option<String>)>, ProcessorError> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = format!("{}/v1beta/files?key={}", self.base_url, self.api_key);
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={token}"));
            }
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| self.net_err(e, &self.base_url))?;
            let page: FileListResponse = Self::check_status(response)
                .await?
                .json()
                .await
                .map_err(|e| ProcessorError::ResponseDecoding(e.to_string()))?;

            out.extend(page.files.into_iter().map(|f| (f.name, f.display_name)));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(out)
    }

    /// Delete every remote file; returns how many were removed.
    pub async fn cleanup_remote_files(&self) -> Result<usize, ProcessorError> {
        let files = self.list_remote_files().await?;
        let total = files.len();
        let mut deleted = 0;
        for (name, _) in files {
            let url = format!("{}/v1beta/{}?key={}", self.base_url, name, self.api_key);
            match self.client.delete(&url).send().await {
                Ok(response) if response.status().is_success() => deleted += 1,
                Ok(response) => {
                    tracing::warn!(remote = %name, status = %response.status(), "cleanup delete refused");
                }
                Err(err) => {
                    tracing::warn!(remote = %name, error = %err, "cleanup delete failed");
                }
            }
        }
        tracing::info!(deleted, total, "remote file cleanup finished");
        Ok(deleted)
    }
}

fn collect_text(response: &GenerateResponse) -> String {
    response
        .candidates
        .iter()
        .filter_map(|c| c.content.as_ref())
        .flat_map(|c| c.parts.iter())
        .filter_map(|p| p.text.as_deref())
        .collect()
}

impl DocumentProcessor for GenAiProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::GenAi
    }

    async fn extract(
        &self,
        pdf: &PdfFile,
        request: &ExtractionRequest,
    ) -> Result<ExtractionOutcome, ProcessorError> {
        let started = Instant::now();

        let uploaded = with_retry("upload", || self.upload(pdf)).await?;
        let file = self.wait_until_active(uploaded).await?;

        let generation = with_retry("generate", || async {
            if request.streaming {
                self.generate_streaming(request, &file).await
            } else {
                self.generate(request, &file).await
            }
        })
        .await;

        // The remote copy goes away whether generation worked or not.
        self.delete_remote(&file).await;

        let (raw_reply, usage) = generation?;
        Ok(ExtractionOutcome {
            raw_reply,
            usage,
            elapsed: started.elapsed(),
        })
    }
}
