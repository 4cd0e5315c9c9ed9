//! Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{LlmError, ReplyGenerator};
use crate::config::LlmConfig;

// ----- Request types -----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

// ----- Response types -----

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
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
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Client for a Gemini model.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl GeminiClient {
    /// Create a client. Requests are bounded by `config.timeout_secs`.
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn map_transport_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.config.timeout_secs)
        } else {
            // Strip the URL, which carries the API key.
            LlmError::Request(e.without_url().to_string())
        }
    }
}

/// Pull the reply text out of a response body.
fn extract_reply(body: GenerateResponse) -> Result<String, LlmError> {
    if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(LlmError::Blocked(reason));
    }
    body.candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| LlmError::InvalidResponse("response has no candidate text".to_owned()))
}

/// Extract an error message from a Gemini error body (`{"error": {"message": ..}}`).
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[async_trait]
impl ReplyGenerator for GeminiClient {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        if self.config.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let resp = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::Http {
                status: status.as_u16(),
                message: extract_error_message(&text),
            });
        }

        let text = resp.text().await.map_err(|e| self.map_transport_error(e))?;
        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        extract_reply(parsed)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> GenerateResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn request_body_shape() {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: "Hello" }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                max_output_tokens: 800,
            },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "Hello");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 800);
        assert!(value["generationConfig"]["temperature"].as_f64().unwrap() > 0.69);
    }

    #[test]
    fn extracts_first_candidate_text() {
        let body = parse(json!({
            "candidates": [{"content": {"parts": [{"text": "Hi there!"}], "role": "model"}}]
        }));
        assert_eq!(extract_reply(body).unwrap(), "Hi there!");
    }

    #[test]
    fn block_reason_wins() {
        let body = parse(json!({"promptFeedback": {"blockReason": "SAFETY"}}));
        assert!(matches!(extract_reply(body), Err(LlmError::Blocked(r)) if r == "SAFETY"));
    }

    #[test]
    fn missing_text_is_invalid() {
        let body = parse(json!({"candidates": [{"finishReason": "MAX_TOKENS"}]}));
        assert!(matches!(
            extract_reply(body),
            Err(LlmError::InvalidResponse(_))
        ));
        assert!(matches!(
            extract_reply(GenerateResponse::default()),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn endpoint_includes_model() {
        let client = GeminiClient::new(LlmConfig {
            base_url: "http://127.0.0.1:1/".into(),
            ..LlmConfig::default()
        });
        assert_eq!(
            client.endpoint(),
            "http://127.0.0.1:1/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[tokio::test]
    async fn missing_key_fails_fast() {
        let client = GeminiClient::new(LlmConfig::default());
        assert!(matches!(
            client.generate("hi").await,
            Err(LlmError::MissingApiKey)
        ));
    }

    #[test]
    fn error_message_from_google_body() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(extract_error_message(body), "API key not valid");
    }
}
