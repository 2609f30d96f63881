//! Gemini API client
//!
//! Implements [`ChatModel`] over the `generateContent` REST endpoint.
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::config::AppConfig;
use crate::error::AdvisorError;
use crate::llm::{ChatModel, ModelRequest};
use crate::models::{ChatRole, ChatTurn};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Provider error bodies are cut to this many bytes
const MAX_ERROR_BODY: usize = 512;

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            config.gemini_base_url.clone(),
            config.llm_timeout,
        )
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn generate(&self, request: &ModelRequest) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(AdvisorError::Config(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let body = GeminiRequest::from_model_request(request);

        debug!(model = %self.model, history = request.history.len(), "Calling Gemini API");

        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AdvisorError::Timeout(format!("Gemini did not answer within {:?}", self.timeout))
                } else {
                    error!("Gemini API request failed: {}", e);
                    AdvisorError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let mut message = response.text().await.unwrap_or_default();
            if message.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
                message.push_str("... [truncated]");
            }
            error!(status = status.as_u16(), "Gemini API error response: {}", message);
            return Err(AdvisorError::LlmHttp {
                status: status.as_u16(),
                message,
                retry_after_secs,
            });
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AdvisorError::Llm(format!("Gemini parse error: {}", e))
        })?;

        gemini_response.into_text()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
}

impl GeminiRequest {
    fn from_model_request(request: &ModelRequest) -> Self {
        let mut contents: Vec<Content> = request.history.iter().map(Content::from_turn).collect();
        contents.push(Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: request.prompt.clone(),
            }],
        });

        Self {
            contents,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: request.max_output_tokens,
                stop_sequences: request.stop.clone(),
            },
            system_instruction: request.system.as_ref().map(|text| SystemInstruction {
                parts: vec![Part { text: text.clone() }],
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn from_turn(turn: &ChatTurn) -> Self {
        let role = match turn.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "model",
        };
        Self {
            role: Some(role.to_string()),
            parts: vec![Part {
                text: turn.text.clone(),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

impl GeminiResponse {
    /// Concatenate the text parts of the first candidate.
    fn into_text(self) -> Result<String> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AdvisorError::Llm("No response from Gemini API".to_string()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AdvisorError::Llm(format!(
                "Empty response from Gemini (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = ModelRequest::new("What is RSI?")
            .with_system("You are a financial advisor")
            .with_history(vec![ChatTurn::user("hi"), ChatTurn::assistant("hello")])
            .with_stop("\nObservation:");

        let json = serde_json::to_value(GeminiRequest::from_model_request(&request)).unwrap();

        assert_eq!(json["contents"].as_array().unwrap().len(), 3);
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "What is RSI?");
        assert_eq!(json["generationConfig"]["stopSequences"][0], "\nObservation:");
        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            "You are a financial advisor"
        );
    }

    #[test]
    fn test_response_text_extraction() {
        let raw = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Buy "}, {"text": "index funds"}]},
                "finishReason": "STOP"
            }]
        }"#;
        let response: GeminiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.into_text().unwrap(), "Buy index funds");
    }

    #[test]
    fn test_empty_candidates_is_error() {
        let response: GeminiResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(matches!(response.into_text(), Err(AdvisorError::Llm(_))));

        let blocked = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        let response: GeminiResponse = serde_json::from_str(blocked).unwrap();
        let err = response.into_text().unwrap_err().to_string();
        assert!(err.contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = GeminiClient::new(
            String::new(),
            "gemini-2.0-flash".to_string(),
            "http://localhost".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();

        let result = client.generate(&ModelRequest::new("what is RSI?")).await;
        let error_msg = result.unwrap_err().to_string();
        assert!(error_msg.contains("GEMINI_API_KEY"));
    }
}
