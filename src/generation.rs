//! The external generation service.
//!
//! [`GenerationService`] is the single seam between the pipeline and the
//! language model: one multimodal request in, generated text out. Two
//! implementations ship with the crate:
//!
//! * [`GeminiClient`] — calls the Gemini `generateContent` REST endpoint with
//!   the session's credential. This is the native execution path.
//! * [`LlmProviderService`] — wraps any pre-built
//!   [`edgequake_llm::LLMProvider`]. The provider carries its own
//!   configuration, so the session credential only gates the run.
//!
//! Tests substitute their own implementation.

use crate::credential::Credential;
use crate::document::PageImage;
use crate::error::GenerationError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Public Gemini REST endpoint.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// One input segment of a request, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestPart {
    Image(PageImage),
    Text(String),
}

/// A single generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub parts: Vec<RequestPart>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            parts: Vec::new(),
            temperature: None,
            max_output_tokens: None,
        }
    }

    pub fn image(mut self, image: PageImage) -> Self {
        self.parts.push(RequestPart::Image(image));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(RequestPart::Text(text.into()));
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.max_output_tokens = Some(n);
        self
    }

    /// Concatenation of every text part.
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                RequestPart::Text(t) => Some(t.as_str()),
                RequestPart::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn images(&self) -> impl Iterator<Item = &PageImage> {
        self.parts.iter().filter_map(|p| match p {
            RequestPart::Image(img) => Some(img),
            RequestPart::Text(_) => None,
        })
    }
}

/// Token usage when the service reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Result of a generation call. `text` may be empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: Option<Usage>,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// A language-model backend able to serve multimodal generation calls.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
    ) -> Result<Generation, GenerationError>;
}

// ── Gemini REST client ───────────────────────────────────────────────────

/// Native client for the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: String,
    client: Client,
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiClient {
    pub fn new() -> Self {
        Self::with_base_url(GEMINI_BASE_URL)
    }

    /// Point the client at another endpoint (proxies, tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn build_body(request: &GenerationRequest) -> GenerateContentRequest {
        let parts = request
            .parts
            .iter()
            .map(|part| match part {
                RequestPart::Image(img) => WirePart {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: img.mime_type.clone(),
                        data: img.data.clone(),
                    }),
                },
                RequestPart::Text(t) => WirePart {
                    text: Some(t.clone()),
                    inline_data: None,
                },
            })
            .collect();

        let generation_config =
            if request.temperature.is_some() || request.max_output_tokens.is_some() {
                Some(WireGenerationConfig {
                    temperature: request.temperature,
                    max_output_tokens: request.max_output_tokens,
                })
            } else {
                None
            };

        GenerateContentRequest {
            contents: vec![WireContent {
                role: "user".to_string(),
                parts,
            }],
            generation_config,
        }
    }
}

#[async_trait]
impl GenerationService for GeminiClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
    ) -> Result<Generation, GenerationError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        debug!(
            model = %request.model,
            parts = request.parts.len(),
            "Gemini generateContent"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", credential.expose())
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to send request to Gemini API");
                GenerationError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = api_error_message(&body);
            error!(status = %status, error = %detail, "Gemini API returned error status");
            return Err(match status.as_u16() {
                code @ (401 | 403) => GenerationError::Rejected {
                    status: code,
                    detail,
                },
                code => GenerationError::Api {
                    status: code,
                    detail,
                },
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default();

        let usage = parsed.usage_metadata.map(|u| Usage {
            input_tokens: u.prompt_token_count.unwrap_or(0),
            output_tokens: u.candidates_token_count.unwrap_or(0),
        });

        Ok(Generation { text, usage })
    }
}

/// Pull `error.message` out of a Gemini error body, or return the body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<WireErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| {
            if body.is_empty() {
                "Unknown error".to_string()
            } else {
                body.to_string()
            }
        })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct WireContent {
    role: String,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    usage_metadata: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    content: Option<WireCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct WireCandidateContent {
    #[serde(default)]
    parts: Vec<WireResponsePart>,
}

#[derive(Debug, Deserialize)]
struct WireResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    error: Option<WireErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    message: Option<String>,
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// Serves requests through a pre-built `edgequake_llm` provider.
///
/// The request's `model` is ignored: the provider was created for a model.
#[derive(Clone)]
pub struct LlmProviderService {
    provider: Arc<dyn LLMProvider>,
}

impl std::fmt::Debug for LlmProviderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmProviderService")
            .field("provider", &"<dyn LLMProvider>")
            .finish()
    }
}

impl LlmProviderService {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    /// Create a provider by name via [`ProviderFactory`]; its API key comes
    /// from the provider's usual environment variable.
    pub fn named(provider_name: &str, model: &str) -> Result<Self, GenerationError> {
        ProviderFactory::create_llm_provider(provider_name, model)
            .map(Self::new)
            .map_err(|e| GenerationError::Other(format!("provider '{provider_name}': {e}")))
    }
}

#[async_trait]
impl GenerationService for LlmProviderService {
    async fn generate(
        &self,
        request: &GenerationRequest,
        _credential: &Credential,
    ) -> Result<Generation, GenerationError> {
        let images: Vec<ImageData> = request
            .images()
            .map(|img| ImageData::new(img.data.clone(), img.mime_type.clone()))
            .collect();
        let messages = vec![ChatMessage::user_with_images(request.prompt_text(), images)];

        let options = CompletionOptions {
            temperature: request.temperature,
            max_tokens: request.max_output_tokens.map(|n| n as usize),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| GenerationError::Other(format!("{}", e)))?;

        Ok(Generation {
            text: response.content,
            usage: Some(Usage {
                input_tokens: response.prompt_tokens as u64,
                output_tokens: response.completion_tokens as u64,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Credential {
        Credential::new("test-key").unwrap()
    }

    #[test]
    fn body_puts_image_before_text() {
        let req = GenerationRequest::new("gemini-2.5-flash")
            .image(PageImage::jpeg("QUJD"))
            .text("hello")
            .temperature(0.3)
            .max_output_tokens(2048);
        let json = serde_json::to_value(GeminiClient::build_body(&req)).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "QUJD");
        assert_eq!(parts[1]["text"], "hello");
        assert!(parts[1].get("inlineData").is_none());
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
        assert!((json["generationConfig"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn body_omits_empty_generation_config() {
        let req = GenerationRequest::new("m").text("x");
        let json = serde_json::to_value(GeminiClient::build_body(&req)).unwrap();
        assert!(json.get("generationConfig").is_none());
    }

    #[test]
    fn error_message_extraction() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body), "API key not valid.");
        assert_eq!(api_error_message("plain"), "plain");
        assert_eq!(api_error_message(""), "Unknown error");
    }

    #[tokio::test]
    async fn gemini_success_joins_parts_and_reads_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-2.5-flash:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                "candidates": [{"content": {"role": "model", "parts": [{"text": "Hello, "}, {"text": "world"}]}}],
                "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3, "totalTokenCount": 15}
            }"#,
            )
            .create_async()
            .await;

        let client = GeminiClient::with_base_url(server.url());
        let req = GenerationRequest::new("gemini-2.5-flash").text("Say hello");
        let out = client.generate(&req, &key()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(out.text, "Hello, world");
        assert_eq!(
            out.usage,
            Some(Usage {
                input_tokens: 12,
                output_tokens: 3
            })
        );
    }

    #[tokio::test]
    async fn gemini_403_is_rejected_credential() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/gemini-2.5-flash:generateContent")
            .with_status(403)
            .with_body(r#"{"error":{"code":403,"message":"Permission denied","status":"PERMISSION_DENIED"}}"#)
            .create_async()
            .await;

        let client = GeminiClient::with_base_url(server.url());
        let req = GenerationRequest::new("gemini-2.5-flash").text("x");
        let err = client.generate(&req, &key()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Rejected { status: 403, .. }));
        assert!(err.is_credential());
    }

    #[tokio::test]
    async fn gemini_server_error_is_not_credential() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/gemini-2.5-flash:generateContent")
            .with_status(503)
            .with_body(r#"{"error":{"code":503,"message":"The model is overloaded."}}"#)
            .create_async()
            .await;

        let client = GeminiClient::with_base_url(server.url());
        let req = GenerationRequest::new("gemini-2.5-flash").text("x");
        let err = client.generate(&req, &key()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Api { status: 503, .. }));
        assert!(!err.is_credential());
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn gemini_empty_candidates_yield_empty_text() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/gemini-2.5-flash:generateContent")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates": []}"#)
            .create_async()
            .await;

        let client = GeminiClient::with_base_url(server.url());
        let req = GenerationRequest::new("gemini-2.5-flash").text("x");
        let out = client.generate(&req, &key()).await.unwrap();
        assert!(out.text.is_empty());
        assert!(out.usage.is_none());
    }

    #[test]
    fn prompt_text_skips_images() {
        let req = GenerationRequest::new("m")
            .image(PageImage::jpeg("AA"))
            .text("only text");
        assert_eq!(req.prompt_text(), "only text");
        assert_eq!(req.images().count(), 1);
    }
}
