//! Language model seam
//!
//! Everything that talks to a model goes through [`ChatModel`], so the
//! reasoning loop and the HTTP handlers can run against a scripted model
//! in tests.

use crate::error::AdvisorError;
use crate::models::ChatTurn;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

/// A single generation request
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub history: Vec<ChatTurn>,
    pub prompt: String,
    pub stop: Vec<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl ModelRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            history: Vec::new(),
            prompt: prompt.into(),
            stop: Vec::new(),
            temperature: 0.7,
            max_output_tokens: 2048,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_stop(mut self, stop: &str) -> Self {
        self.stop.push(stop.to_string());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

/// Trait for text generation backends
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, request: &ModelRequest) -> Result<String>;
}

//
// ================= Retry =================
//

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Never retry
    pub fn none() -> Self {
        Self::with_max_retries(0)
    }

    /// Delay before retry number `attempt` (1-based). A server supplied
    /// `Retry-After` wins, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        if let Some(secs) = retry_after_secs {
            return Duration::from_secs(secs).min(self.max_delay);
        }

        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor) as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }
}

/// Call the model, retrying transient failures with exponential backoff.
///
/// Non-retryable errors are returned as-is. When the retry budget runs out
/// the last error is wrapped in [`AdvisorError::RetriesExhausted`].
pub async fn generate_with_retry(
    model: &dyn ChatModel,
    request: &ModelRequest,
    policy: &RetryPolicy,
) -> Result<String> {
    let mut attempt = 0u32;

    loop {
        match model.generate(request).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let retry_after = match &e {
                    AdvisorError::LlmHttp { retry_after_secs, .. } => *retry_after_secs,
                    _ => None,
                };
                let delay = policy.delay_for(attempt, retry_after);
                warn!(attempt, error = %e, ?delay, "Model call failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) if e.is_retryable() => {
                return Err(AdvisorError::RetriesExhausted {
                    attempts: attempt + 1,
                    last_error: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

//
// ================= Scripted Model =================
//

/// Replays a fixed sequence of responses.
///
/// Used by tests and for running the service without provider credentials.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(responses.into_iter().map(|r| Ok(r.into())))
    }

    pub fn from_results<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Result<String>>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests seen so far, oldest first
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn generate(&self, request: &ModelRequest) -> Result<String> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }

        self.responses
            .lock()
            .map_err(|_| AdvisorError::Llm("scripted model poisoned".to_string()))?
            .pop_front()
            .unwrap_or_else(|| Err(AdvisorError::Llm("scripted model exhausted".to_string())))
    }
}
