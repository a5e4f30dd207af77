//! Google Gemini client
//!
//! Calls the non-streaming `v1beta/models/{model}:generateContent` endpoint.
//! The stored transcript already uses Gemini's `{role, parts: [{text}]}`
//! shape, so history is sent as-is followed by the new user turn.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use voice_relay_core::config::ModelConfig;
use voice_relay_core::session::{Transcript, Turn};

use crate::base::{GenerationParams, LanguageModel, ModelError, ModelResult};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<&'a Turn>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Gemini API client
pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl GeminiClient {
    /// Create a client for `model`; an empty key makes every call fail
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::build(api_key.into(), model.into(), None, None)
    }

    /// Create a client from configuration
    pub fn from_config(config: &ModelConfig) -> Self {
        Self::build(
            config.api_key.clone(),
            config.model.clone(),
            config.api_base.clone(),
            config.timeout_secs.map(Duration::from_secs),
        )
    }

    /// Point the client at a different API base (e.g. a proxy)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn build(
        api_key: String,
        model: String,
        api_base: Option<String>,
        timeout: Option<Duration>,
    ) -> Self {
        let mut builder = Client::builder().connect_timeout(Duration::from_secs(10));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let api_base = api_base
            .filter(|base| !base.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: strip_model_prefix(&model).to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        )
    }

    fn build_request<'a>(
        history: &'a Transcript,
        user_turn: &'a Turn,
        params: GenerationParams,
    ) -> GenerateContentRequest<'a> {
        let mut contents: Vec<&Turn> = history.iter().collect();
        contents.push(user_turn);
        GenerateContentRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_output_tokens,
            },
        }
    }

    fn parse_response(response: GenerateContentResponse) -> ModelResult<String> {
        if let Some(reason) = response
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
        {
            return Err(ModelError::other(format!("prompt blocked: {}", reason)));
        }

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::other("model returned no candidates"))?;

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            let reason = candidate.finish_reason.as_deref().unwrap_or("UNKNOWN");
            return Err(ModelError::other(format!(
                "model returned no text (finish reason: {})",
                reason
            )));
        }
        Ok(text)
    }

    /// Map a non-success response to a tagged error
    fn classify_failure(status: StatusCode, body: &str) -> ModelError {
        let (message, api_status) = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => {
                let code = envelope.error.code.unwrap_or(status.as_u16());
                let message = match &envelope.error.status {
                    Some(api_status) => {
                        format!("{} {}. {}", code, api_status, envelope.error.message)
                    }
                    None => format!("{} {}", code, envelope.error.message),
                };
                (message, envelope.error.status)
            }
            Err(_) => (format!("{} {}", status.as_u16(), body.trim()), None),
        };

        if status == StatusCode::TOO_MANY_REQUESTS
            || api_status.as_deref() == Some("RESOURCE_EXHAUSTED")
        {
            ModelError::quota(message)
        } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            ModelError::transient(message)
        } else {
            ModelError::other(message)
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(
        &self,
        history: &Transcript,
        utterance: &str,
        params: GenerationParams,
    ) -> ModelResult<String> {
        if self.api_key.trim().is_empty() {
            return Err(ModelError::other("GEMINI_API_KEY is not set"));
        }

        let user_turn = Turn::user(utterance);
        let request = Self::build_request(history, &user_turn, params);
        debug!(
            model = %self.model,
            history_turns = history.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            let err = Self::classify_failure(status, &body);
            warn!(status = %status, kind = %err.kind, "Gemini request failed");
            return Err(err);
        }

        let body = response.text().await?;
        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| ModelError::other(format!("invalid response from model: {}", e)))?;
        Self::parse_response(parsed)
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

/// Strip `gemini/` or `models/` prefixes so the name fits the URL path
pub fn strip_model_prefix(model: &str) -> &str {
    let model = model.strip_prefix("gemini/").unwrap_or(model);
    model.strip_prefix("models/").unwrap_or(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::ModelErrorKind;
    use mockito::Matcher;
    use serde_json::json;

    const PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

    fn client(server: &mockito::ServerGuard) -> GeminiClient {
        GeminiClient::new("test-key", "gemini-2.0-flash").with_api_base(server.url())
    }

    fn history() -> Transcript {
        Transcript::from_turns(vec![Turn::user("Hi"), Turn::model("Hello!")])
    }

    #[test]
    fn test_request_body_shape() {
        let history = history();
        let user_turn = Turn::user("How are you?");
        let request = GeminiClient::build_request(&history, &user_turn, GenerationParams::default());
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(
            body,
            json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "Hi"}]},
                    {"role": "model", "parts": [{"text": "Hello!"}]},
                    {"role": "user", "parts": [{"text": "How are you?"}]}
                ],
                "generationConfig": {"temperature": 0.5, "maxOutputTokens": 500}
            })
        );
    }

    #[test]
    fn test_strip_model_prefix() {
        assert_eq!(strip_model_prefix("gemini/gemini-2.0-flash"), "gemini-2.0-flash");
        assert_eq!(strip_model_prefix("models/gemini-2.0-flash"), "gemini-2.0-flash");
        assert_eq!(strip_model_prefix("gemini-2.0-flash"), "gemini-2.0-flash");
    }

    #[test]
    fn test_classify_rate_limit() {
        let body = r#"{"error":{"code":429,"message":"quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = GeminiClient::classify_failure(StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(err.kind, ModelErrorKind::Quota);
        assert_eq!(err.message, "429 RESOURCE_EXHAUSTED. quota exceeded");
    }

    #[test]
    fn test_classify_unparseable_server_error() {
        let err = GeminiClient::classify_failure(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(err.kind, ModelErrorKind::Transient);
        assert_eq!(err.message, "502 upstream down");
    }

    #[test]
    fn test_classify_bad_key() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        let err = GeminiClient::classify_failure(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.kind, ModelErrorKind::Other);
    }

    #[test]
    fn test_blocked_prompt_is_error() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        let err = GeminiClient::parse_response(response).unwrap_err();
        assert!(err.message.contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_generate_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJson(json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "Hi"}]},
                    {"role": "model", "parts": [{"text": "Hello!"}]},
                    {"role": "user", "parts": [{"text": "What is the weather"}]}
                ],
                "generationConfig": {"maxOutputTokens": 500}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "candidates": [{
                        "content": {"role": "model", "parts": [{"text": "It is "}, {"text": "sunny"}]},
                        "finishReason": "STOP"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let reply = client(&server)
            .generate(&history(), "What is the weather", GenerationParams::default())
            .await
            .unwrap();

        assert_eq!(reply, "It is sunny");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_quota_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(429)
            .with_body(
                r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#,
            )
            .create_async()
            .await;

        let err = client(&server)
            .generate(&Transcript::new(), "hello", GenerationParams::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ModelErrorKind::Quota);
        assert!(err.message.starts_with("429 RESOURCE_EXHAUSTED"));
    }

    #[tokio::test]
    async fn test_generate_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(503)
            .with_body(r#"{"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#)
            .create_async()
            .await;

        let err = client(&server)
            .generate(&Transcript::new(), "hello", GenerationParams::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ModelErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_generate_without_key_skips_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", PATH).expect(0).create_async().await;

        let err = GeminiClient::new("", "gemini-2.0-flash")
            .with_api_base(server.url())
            .generate(&Transcript::new(), "hello", GenerationParams::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ModelErrorKind::Other);
        assert!(err.message.contains("GEMINI_API_KEY"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client(&server)
            .generate(&Transcript::new(), "hello", GenerationParams::default())
            .await
            .unwrap_err();

        assert!(err.message.starts_with("invalid response from model"));
    }
}
