//! OpenAI-compatible embedding and chat completion adapters.
//!
//! This module is only available when the `openai` feature is enabled. Any
//! gateway that speaks the `/embeddings` and `/chat/completions` wire format
//! works; the base URL and key come from a [`ClientHandle`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, error};

use crate::credentials::{ClientHandle, CredentialProvider};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::generation::TextGenerator;
use crate::settings::{EmbeddingsConfig, LlmConfig};

/// Service name used to resolve the embeddings endpoint.
pub const EMBEDDINGS_SERVICE: &str = "embeddings";

/// Service name used to resolve the chat completion endpoint.
pub const LLM_SERVICE: &str = "llm";

fn build_client(handle: &ClientHandle, provider: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder().timeout(handle.request_timeout).build().map_err(|e| {
        RagError::Credentials(format!("failed to build HTTP client for {provider}: {e}"))
    })
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Extract the most useful message from a failed response body.
fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}

/// POST `body` as JSON and decode the successful response as `T`.
async fn post_json<B, T>(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &B,
    to_error: impl Fn(String) -> RagError,
) -> Result<T>
where
    B: Serialize + ?Sized,
    T: for<'de> Deserialize<'de>,
{
    let mut request = client.post(url).json(body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let response = request.send().await.map_err(|e| {
        error!(url, error = %e, "request failed");
        to_error(format!("request failed: {e}"))
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let detail = error_detail(response.text().await.unwrap_or_default());
        error!(url, %status, "API error");
        return Err(to_error(format!("API returned {status}: {detail}")));
    }

    response.json().await.map_err(|e| {
        error!(url, error = %e, "failed to parse response");
        to_error(format!("failed to parse response: {e}"))
    })
}

// ── Embeddings ─────────────────────────────────────────────────────

/// An [`Embedder`] backed by an OpenAI-compatible `/embeddings` endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use rag_core::openai::OpenAiEmbedder;
///
/// let embedder = OpenAiEmbedder::from_provider(&credentials, &config.embeddings_config())?;
/// let vectors = embedder.embed_documents(&texts).await?;
/// ```
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    /// Create an embedder from an already resolved client handle.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Credentials`] if the handle has no endpoint.
    pub fn new(handle: &ClientHandle, config: &EmbeddingsConfig) -> Result<Self> {
        let url = format!("{}/embeddings", handle.require_endpoint()?);
        Ok(Self {
            client: build_client(handle, "embeddings")?,
            url,
            api_key: handle.api_key.clone(),
            model: config.model_id.clone(),
            dimensions: config.dimensions,
        })
    }

    /// Resolve the `embeddings` service through `credentials` and build an embedder.
    pub fn from_provider(
        credentials: &dyn CredentialProvider,
        config: &EmbeddingsConfig,
    ) -> Result<Self> {
        let handle =
            credentials.get_client(EMBEDDINGS_SERVICE, config.assumed_role_arn.as_deref())?;
        Self::new(&handle, config)
    }

    fn error(&self, message: String) -> RagError {
        RagError::Embedding { provider: self.model.clone(), message }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Put embeddings back in input order. Entries without an index keep
/// their response position.
fn into_input_order(mut data: Vec<EmbeddingData>) -> Vec<Vec<f32>> {
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    data.into_iter().map(|d| d.embedding).collect()
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = "openai", batch_size = texts.len(), model = %self.model, "embedding batch");

        let request = EmbeddingRequest { model: &self.model, input: texts };
        let response: EmbeddingResponse = post_json(
            &self.client,
            &self.url,
            self.api_key.as_deref(),
            &request,
            |message| self.error(message),
        )
        .await?;

        let embeddings = into_input_order(response.data);
        if embeddings.len() != texts.len() {
            return Err(self.error(format!(
                "API returned {} embeddings for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_documents(&[text.to_string()]).await?;
        results.into_iter().next().ok_or_else(|| self.error("API returned empty response".into()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ── Chat completions ───────────────────────────────────────────────

/// A [`TextGenerator`] backed by an OpenAI-compatible `/chat/completions` endpoint.
///
/// The prompt is sent as a single user message. `model_kwargs` from
/// [`LlmConfig`] (temperature, max tokens, ...) are merged into the request body.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    model_kwargs: Map<String, Value>,
}

impl OpenAiGenerator {
    /// Create a generator from an already resolved client handle.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Credentials`] if the handle has no endpoint.
    pub fn new(handle: &ClientHandle, config: &LlmConfig) -> Result<Self> {
        let url = format!("{}/chat/completions", handle.require_endpoint()?);
        Ok(Self {
            client: build_client(handle, "llm")?,
            url,
            api_key: handle.api_key.clone(),
            model: config.model_id.clone(),
            model_kwargs: config.model_kwargs.clone(),
        })
    }

    /// Resolve the `llm` service through `credentials` and build a generator.
    pub fn from_provider(credentials: &dyn CredentialProvider, config: &LlmConfig) -> Result<Self> {
        let handle = credentials.get_client(LLM_SERVICE, config.assumed_role_arn.as_deref())?;
        Self::new(&handle, config)
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut body = self.model_kwargs.clone();
        body.insert("model".to_string(), Value::String(self.model.clone()));
        body.insert("messages".to_string(), json!([{ "role": "user", "content": prompt }]));
        Value::Object(body)
    }

    fn error(&self, message: String) -> RagError {
        RagError::Generation { provider: self.model.clone(), message }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = "openai", model = %self.model, prompt_len = prompt.len(), "generating");

        let body = self.request_body(prompt);
        let response: ChatResponse = post_json(
            &self.client,
            &self.url,
            self.api_key.as_deref(),
            &body,
            |message| self.error(message),
        )
        .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| self.error("response contained no message content".into()))
    }
}
