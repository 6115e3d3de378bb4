//! Gemini REST client with server-sent-event streaming.
//!
//! Page transcription uses `streamGenerateContent?alt=sse`; every `data:`
//! line carries one `GenerateContentResponse` chunk whose text parts become
//! fragments. Question generation uses `generateContent` with a JSON
//! response MIME type.

use crate::config::ModelSettings;
use crate::error::{ModelError, Pdf2McqError};
use crate::pipeline::encode::{PageImage, PAGE_MIME_TYPE};
use crate::pipeline::llm::{FragmentStream, ModelClient, TextModel};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

/// Public Gemini REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Gemini `generateContent` / `streamGenerateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Build from settings, reading the key from `GEMINI_API_KEY` if unset.
    pub fn from_settings(settings: &ModelSettings) -> Result<Self, Pdf2McqError> {
        let api_key = match settings.api_key.clone() {
            Some(key) => key,
            None => std::env::var(API_KEY_ENV).unwrap_or_default(),
        };
        if api_key.trim().is_empty() {
            return Err(Pdf2McqError::ProviderNotConfigured {
                provider: "gemini".to_string(),
                hint: format!("Set {API_KEY_ENV} in the environment or a .env file."),
            });
        }

        let mut client = Self::new(api_key, settings.model.clone());
        if let Some(ref url) = settings.base_url {
            client.base_url = url.trim_end_matches('/').to_string();
        }
        client.temperature = settings.temperature;
        client.max_tokens = settings.max_tokens;
        Ok(client)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }

    fn generation_config(&self, response_mime_type: &'static str) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
            max_output_tokens: self.max_tokens,
            response_mime_type,
            thinking_config: ThinkingConfig {
                thinking_budget: -1,
            },
        }
    }

    async fn post(&self, url: &str, body: &GenerateRequest<'_>) -> Result<reqwest::Response, ModelError> {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Http {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn stream_page(
        &self,
        instruction: &str,
        image: &PageImage,
    ) -> Result<FragmentStream, ModelError> {
        let data = image.to_base64();
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text { text: instruction },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: PAGE_MIME_TYPE,
                            data: &data,
                        },
                    },
                ],
            }],
            generation_config: self.generation_config("text/plain"),
        };

        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        debug!("POST {} ({} bytes image)", url, image.png().len());
        let response = self.post(&url, &body).await?;
        Ok(Box::pin(SseFragmentStream::new(response.bytes_stream())))
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    async fn generate_json(&self, prompt: &str) -> Result<String, ModelError> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part::Text { text: prompt }],
            }],
            generation_config: self.generation_config("application/json"),
        };

        let response = self.post(&self.endpoint("generateContent"), &body).await?;
        let raw = response
            .text()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;
        let chunk: ResponseChunk =
            serde_json::from_str(&raw).map_err(|e| ModelError::Parse(e.to_string()))?;
        let text = chunk.into_text()?;
        if text.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(text)
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'static str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
    response_mime_type: &'static str,
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    /// -1 lets the model pick its own budget.
    thinking_budget: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

impl ResponseChunk {
    /// Concatenated answer text, or the reason there is none.
    fn into_text(self) -> Result<String, ModelError> {
        if let Some(err) = self.error {
            return Err(ModelError::Http {
                status: err.code,
                body: err.message,
            });
        }
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ModelError::Blocked(reason));
        }

        let mut text = String::new();
        for candidate in self.candidates {
            if let Some(reason) = candidate.finish_reason.as_deref() {
                if matches!(
                    reason,
                    "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII"
                ) {
                    return Err(ModelError::Blocked(reason.to_string()));
                }
            }
            let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
            for part in parts.into_iter().filter(|p| !p.thought) {
                if let Some(t) = part.text {
                    text.push_str(&t);
                }
            }
        }
        Ok(text)
    }
}

// ── SSE parsing ──────────────────────────────────────────────────────────

/// Turns a raw SSE byte stream into text fragments.
///
/// Bytes are buffered until a full line is available, so chunk boundaries
/// that split a line or a UTF-8 sequence are harmless. Chunks carrying no
/// text (metadata, thoughts) produce no fragment.
pub struct SseFragmentStream<S> {
    inner: Pin<Box<S>>,
    buffer: Vec<u8>,
    done: bool,
}

impl<S, E> SseFragmentStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    pub fn new(byte_stream: S) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            buffer: Vec::new(),
            done: false,
        }
    }
}

impl<S, E> Stream for SseFragmentStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    type Item = Result<String, ModelError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        loop {
            if let Some(item) = try_parse_line(&mut this.buffer) {
                if item.is_err() {
                    this.done = true;
                }
                return Poll::Ready(Some(item));
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(ModelError::Network(e.to_string()))));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    // A final line may lack its trailing newline.
                    if !this.buffer.iter().all(u8::is_ascii_whitespace) {
                        this.buffer.push(b'\n');
                        if let Some(item) = try_parse_line(&mut this.buffer) {
                            return Poll::Ready(Some(item));
                        }
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Consume complete lines from `buffer` until one yields a fragment or an
/// error. Returns `None` when more bytes are needed.
fn try_parse_line(buffer: &mut Vec<u8>) -> Option<Result<String, ModelError>> {
    loop {
        let newline = buffer.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = buffer.drain(..=newline).collect();
        let line = match std::str::from_utf8(&raw) {
            Ok(l) => l.trim(),
            Err(e) => {
                return Some(Err(ModelError::Parse(format!(
                    "invalid UTF-8 in stream: {e}"
                ))))
            }
        };

        let Some(data) = line.strip_prefix("data:") else {
            // Blank separators and `event:` / `id:` lines.
            continue;
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }

        let chunk: ResponseChunk = match serde_json::from_str(data) {
            Ok(c) => c,
            Err(e) => {
                return Some(Err(ModelError::Parse(format!(
                    "bad stream chunk: {e} (data: {})",
                    truncate(data, 200)
                ))))
            }
        };
        match chunk.into_text() {
            Ok(text) if text.is_empty() => continue,
            other => return Some(other),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
