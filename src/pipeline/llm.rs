//! Model Client: the seam between the driver and a remote model.
//!
//! [`ModelClient`] turns one instruction plus one page image into a stream
//! of text fragments. [`TextModel`] answers a text-only prompt with JSON
//! and is used for question generation. Two implementations exist:
//!
//! * [`crate::pipeline::gemini::GeminiClient`] streams over the Gemini
//!   REST API (default backend);
//! * [`LlmProviderClient`] wraps any `edgequake-llm` provider. Those calls
//!   are not streamed, so each page yields a single fragment.
//!
//! Retrying is the driver's job. Clients make exactly one request per call.

use crate::config::{ModelBackend, ModelSettings};
use crate::error::{ModelError, Pdf2McqError};
use crate::pipeline::encode::PageImage;
use crate::pipeline::gemini::GeminiClient;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// Fragments of one page's transcription, in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ModelError>> + Send>>;

/// Streams the transcription of one page image.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Start a request. An `Err` here, or any `Err` item in the returned
    /// stream, fails the attempt.
    async fn stream_page(
        &self,
        instruction: &str,
        image: &PageImage,
    ) -> Result<FragmentStream, ModelError>;
}

/// Answers a text prompt with a JSON document.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate_json(&self, prompt: &str) -> Result<String, ModelError>;
}

/// [`ModelClient`] and [`TextModel`] over an `edgequake-llm` provider.
pub struct LlmProviderClient {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, settings: &ModelSettings) -> Self {
        Self {
            provider,
            options: build_options(settings),
        }
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ModelError> {
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;
        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

#[async_trait]
impl ModelClient for LlmProviderClient {
    async fn stream_page(
        &self,
        instruction: &str,
        image: &PageImage,
    ) -> Result<FragmentStream, ModelError> {
        // An empty user text: the image carries the content.
        let messages = vec![
            ChatMessage::system(instruction),
            ChatMessage::user_with_images("", vec![image.to_image_data()]),
        ];
        let content = self.chat(messages).await?;
        Ok(Box::pin(futures::stream::iter(
            std::iter::once(content)
                .filter(|c| !c.is_empty())
                .map(Ok::<String, ModelError>),
        )))
    }
}

#[async_trait]
impl TextModel for LlmProviderClient {
    async fn generate_json(&self, prompt: &str) -> Result<String, ModelError> {
        let content = self.chat(vec![ChatMessage::user(prompt)]).await?;
        if content.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(content)
    }
}

fn build_options(settings: &ModelSettings) -> CompletionOptions {
    CompletionOptions {
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
        ..Default::default()
    }
}

/// Build the page transcription client for `settings`.
pub fn build_client(settings: &ModelSettings) -> Result<Arc<dyn ModelClient>, Pdf2McqError> {
    Ok(match settings.backend {
        ModelBackend::Gemini => Arc::new(GeminiClient::from_settings(settings)?),
        ModelBackend::Llm => Arc::new(LlmProviderClient::new(
            resolve_provider(settings)?,
            settings,
        )),
    })
}

/// Build the question-generation client for `settings`.
pub fn build_text_model(settings: &ModelSettings) -> Result<Arc<dyn TextModel>, Pdf2McqError> {
    Ok(match settings.backend {
        ModelBackend::Gemini => Arc::new(GeminiClient::from_settings(settings)?),
        ModelBackend::Llm => Arc::new(LlmProviderClient::new(
            resolve_provider(settings)?,
            settings,
        )),
    })
}

/// Resolve an `edgequake-llm` provider.
///
/// Order: explicit provider name, then `EDGEQUAKE_LLM_PROVIDER` +
/// `EDGEQUAKE_MODEL`, then auto-detection from the environment.
fn resolve_provider(settings: &ModelSettings) -> Result<Arc<dyn LLMProvider>, Pdf2McqError> {
    if let Some(ref name) = settings.provider_name {
        return create_provider(name, &settings.model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    let (provider, _) =
        ProviderFactory::from_env().map_err(|e| Pdf2McqError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!("No LLM provider auto-detected: {e}"),
        })?;
    Ok(provider)
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2McqError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        Pdf2McqError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: e.to_string(),
        }
    })
}
