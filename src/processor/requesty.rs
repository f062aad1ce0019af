//! Requesty router integration (OpenAI-compatible chat completions).
//!
//! The PDF travels inline, base64-encoded. Gemini models routed through
//! Requesty only accept documents as an `image_url` data URI; every other
//! model family takes the dedicated `file` content part.

use std::time::Instant;

use base64::Engine as _;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Settings;
use crate::prompts;

use super::{
    with_retry, DocumentProcessor, ExtractionOutcome, ExtractionRequest, PdfFile, ProcessorError,
    ProcessorKind, TokenUsage,
};

#[derive(Debug)]
pub struct RequestyProcessor {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout_secs: u64,
}

// ──────────────────────────────────────────────
// Wire types
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
    FileInput {
        filename: String,
        /// Raw base64, no data-URI prefix.
        file_data: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChatMessage>,
    delta: Option<ChatDelta>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    cost: Option<f64>,
}

impl From<ChatUsage> for TokenUsage {
    fn from(usage: ChatUsage) -> Self {
        TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            cost: usage.cost,
        }
    }
}

// ──────────────────────────────────────────────
// Processor
// ──────────────────────────────────────────────

impl RequestyProcessor {
    pub fn new(settings: &Settings) -> Result<Self, ProcessorError> {
        let api_key = settings
            .requesty_api_key
            .clone()
            .ok_or(ProcessorError::MissingConfiguration("REQUESTY_API_KEY"))?;
        let base_url = settings
            .requesty_base_url
            .clone()
            .ok_or(ProcessorError::MissingConfiguration("REQUESTY_BASE_URL"))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| ProcessorError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url,
            timeout_secs: settings.request_timeout_secs,
        })
    }

    fn net_err(&self, err: reqwest::Error) -> ProcessorError {
        ProcessorError::from_reqwest(err, &self.base_url, self.timeout_secs)
    }

    /// Build the document content part for the given model.
    ///
    /// Gemini models behind the router take the PDF as an `image_url` data
    /// URI; every other family takes a `file_input` part with bare base64.
    fn document_part(model: &str, pdf: &PdfFile) -> Result<ContentPart, ProcessorError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(pdf.read_bytes()?);

        if model.to_lowercase().contains("google/gemini") {
            Ok(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:application/pdf;base64,{encoded}"),
                },
            })
        } else {
            Ok(ContentPart::FileInput {
                filename: pdf.file_name().to_string(),
                file_data: encoded,
            })
        }
    }

    fn request_body(
        &self,
        request: &ExtractionRequest,
        pdf: &PdfFile,
    ) -> Result<serde_json::Value, ProcessorError> {
        let parts = vec![
            ContentPart::Text {
                text: prompts::EXTRACTION_INSTRUCTION.to_string(),
            },
            Self::document_part(&request.model, pdf)?,
        ];
        Ok(json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": prompts::system_prompt(ProcessorKind::Requesty) },
                { "role": "user", "content": parts }
            ],
            "temperature": 0.0,
            "stream": request.streaming,
        }))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProcessorError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProcessorError::Api { status: status.as_u16(), body })
    }

    async fn complete(
        &self,
        request: &ExtractionRequest,
        pdf: &PdfFile,
    ) -> Result<(String, Option<TokenUsage>), ProcessorError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request, pdf)?)
            .send()
            .await
            .map_err(|e| self.net_err(e))?;

        let parsed: ChatResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProcessorError::ResponseDecoding(e.to_string()))?;

        let text = parsed
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.clone())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(ProcessorError::EmptyReply);
        }
        Ok((text, parsed.usage.map(TokenUsage::from)))
    }

    /// Streaming variant. Deltas arrive as SSE `data:` lines; usage, when the
    /// router reports it, rides the final chunk.
    async fn complete_streaming(
        &self,
        request: &ExtractionRequest,
        pdf: &PdfFile,
    ) -> Result<(String, Option<TokenUsage>), ProcessorError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request, pdf)?)
            .send()
            .await
            .map_err(|e| self.net_err(e))?;
        let response = Self::check_status(response).await?;

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut text = String::new();
        let mut usage = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.net_err(e))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim_end_matches('\r').to_string();
                buffer.drain(..=newline);
                let Some(payload) = line.strip_prefix("data: ") else {
                    continue;
                };
                if payload == "[DONE]" {
                    continue;
                }
                match serde_json::from_str::<ChatResponse>(payload) {
                    Ok(chunk) => {
                        if let Some(delta) = chunk
                            .choices
                            .first()
                            .and_then(|c| c.delta.as_ref())
                            .and_then(|d| d.content.as_deref())
                        {
                            text.push_str(delta);
                        }
                        if let Some(u) = chunk.usage {
                            usage = Some(TokenUsage::from(u));
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
}

impl DocumentProcessor for RequestyProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Requesty
    }

    async fn extract(
        &self,
        pdf: &PdfFile,
        request: &ExtractionRequest,
    ) -> Result<ExtractionOutcome, ProcessorError> {
        let started = Instant::now();
        tracing::info!(
            file = pdf.file_name(),
            model = %request.model,
            streaming = request.streaming,
            "sending to Requesty"
        );

        let (raw_reply, usage) = with_retry("chat completion", || async {
            if request.streaming {
                self.complete_streaming(request, pdf).await
            } else {
                self.complete(request, pdf).await
            }
        })
        .await?;

        Ok(ExtractionOutcome {
            raw_reply,
            usage,
            elapsed: started.elapsed(),
        })
    }
}
