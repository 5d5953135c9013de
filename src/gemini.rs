use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::chat_client::{GenerativeClient, HistoryTurn, Role};
use crate::config::{AppConfig, GenerationSettings, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::error::{GenerationError, GenerationResult};

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    generation: GenerationSettings,
    timeout: Duration,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: &'a GenerationSettings,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl Content {
    fn text(role: Role, text: &str) -> Self {
        let role = match role {
            Role::User => "user",
            Role::Model => "model",
        };
        Self {
            role: Some(role.to_string()),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            generation: GenerationSettings::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        Ok(Self::new(api_key, config.settings.model.clone())
            .with_base_url(config.settings.base_url.clone())
            .with_generation(config.settings.generation.clone())
            .with_timeout(Duration::from_secs(config.settings.timeout_secs)))
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_generation(mut self, generation: GenerationSettings) -> Self {
        self.generation = generation;
        self
    }

    /// Upper bound on one whole request, connect through body
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }

    fn build_request(&self, prompt: &str, history: &[HistoryTurn]) -> GenerateContentRequest<'_> {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| Content::text(turn.role, &turn.text))
            .collect();
        contents.push(Content::text(Role::User, prompt));

        GenerateContentRequest {
            contents,
            generation_config: &self.generation,
        }
    }

    pub async fn generate(&self, prompt: &str, history: &[HistoryTurn]) -> GenerationResult {
        let request = self.build_request(prompt, history);
        tracing::debug!(
            model = %self.model,
            turns = request.contents.len(),
            "sending generateContent request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(%status, bytes = body.len(), "generateContent responded");

        if !status.is_success() {
            return Err(api_failure(status, &body));
        }

        let api_response: GenerateContentResponse = serde_json::from_str(&body)?;
        Ok(extract_text(api_response))
    }
}

fn api_failure(status: reqwest::StatusCode, body: &str) -> GenerationError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => GenerationError::new(envelope.error.message),
        Err(_) => GenerationError::new(format!("API request failed ({})", status)),
    }
}

/// Joins the text parts of the first candidate; `None` when there are none.
fn extract_text(response: GenerateContentResponse) -> Option<String> {
    let candidate = response.candidates.into_iter().next()?;
    if let Some(reason) = &candidate.finish_reason {
        if reason != "STOP" {
            tracing::warn!(finish_reason = %reason, "candidate finished early");
        }
    }
    let parts = candidate.content?.parts;
    let texts: Vec<String> = parts.into_iter().filter_map(|part| part.text).collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.concat())
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(&self, prompt: &str, history: &[HistoryTurn]) -> GenerationResult {
        self.generate(prompt, history).await
    }

    fn client_name(&self) -> &str {
        "Gemini"
    }

    fn model(&self) -> &str {
        self.model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_request_puts_prompt_after_history() {
        let client = GeminiClient::new("key".to_string(), "gemini-pro".to_string());
        let history = vec![HistoryTurn::user("hi"), HistoryTurn::model("hello")];
        let request = client.build_request("how are you?", &history);
        let json = serde_json::to_value(&request).unwrap();

        let contents = json["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "how are you?");
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = GeminiClient::new("key".to_string(), "gemini-pro".to_string())
            .with_base_url("http://localhost:8080/models/".to_string());
        assert_eq!(
            client.endpoint(),
            "http://localhost:8080/models/gemini-pro:generateContent"
        );
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response = parse(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello, "}, {"text": "world"}]},
                "finishReason": "STOP"
            }]
        }));
        assert_eq!(extract_text(response).as_deref(), Some("Hello, world"));
    }

    #[test]
    fn test_extract_text_absent() {
        assert_eq!(extract_text(parse(json!({}))), None);
        assert_eq!(
            extract_text(parse(json!({"candidates": [{"finishReason": "SAFETY"}]}))),
            None
        );
        assert_eq!(
            extract_text(parse(json!({"candidates": [{"content": {"parts": []}}]}))),
            None
        );
    }

    #[tokio::test]
    async fn test_connection_error_hides_api_key() {
        // Bind then drop so the port is known to refuse connections
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = GeminiClient::new("SECRET123".to_string(), "gemini-pro".to_string())
            .with_base_url(format!("http://{}/models", addr));
        let err = client.generate("hi", &[]).await.unwrap_err();

        assert!(!err.message.contains("SECRET123"), "leaked key: {}", err.message);
        assert!(!err.message.contains("key="));
    }

    #[tokio::test]
    async fn test_stalled_request_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold the connection without ever answering
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let client = GeminiClient::new("SECRET123".to_string(), "gemini-pro".to_string())
            .with_base_url(format!("http://{}/models", addr))
            .with_timeout(Duration::from_millis(200));
        let err = client.generate("hi", &[]).await.unwrap_err();

        assert_eq!(err.message, "Request timed out");
        server.abort();
    }

    #[test]
    fn test_api_failure_uses_error_message() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#;
        let err = api_failure(reqwest::StatusCode::BAD_REQUEST, body);
        assert_eq!(err.message, "API key not valid");

        let err = api_failure(reqwest::StatusCode::BAD_GATEWAY, "<html>");
        assert_eq!(err.message, "API request failed (502 Bad Gateway)");
    }
}
