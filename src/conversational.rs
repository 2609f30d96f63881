//! Conversational interaction handler
//!
//! Quick Q&A that goes straight to the model without tools, plus
//! multi-turn chat backed by the session store.

use crate::error::AdvisorError;
use crate::llm::{generate_with_retry, ChatModel, ModelRequest, RetryPolicy};
use crate::memory::SessionStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub const ADVISOR_INSTRUCTION: &str = "You are a knowledgeable personal financial advisor dedicated to \
helping individuals navigate their financial journey. Focus on providing guidance on budgeting, \
investing, retirement planning, debt management, and wealth building strategies. Be precise and \
practical in your advice while considering individual circumstances.

Key areas of expertise:
- Budgeting and expense tracking
- Investment strategies and portfolio management
- Retirement planning
- Debt management and elimination
- Tax planning considerations
- Emergency fund planning
- Risk management and insurance

Provide balanced, ethical financial advice and acknowledge when certain situations may require \
consultation with other financial professionals.

If the user provides you the research data then use it for your response.";

/// Reply to one chat turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub output: String,
    pub session_id: Uuid,
}

pub struct Advisor {
    model: Arc<dyn ChatModel>,
    retry: RetryPolicy,
}

impl Advisor {
    pub fn new(model: Arc<dyn ChatModel>, retry: RetryPolicy) -> Self {
        Self { model, retry }
    }

    /// Single-shot answer without tools.
    ///
    /// Makes exactly one attempt: callers fall back to the reasoning loop on
    /// any failure, so retrying here would only delay that.
    pub async fn direct_answer(&self, query: &str, research: Option<&str>) -> Result<String> {
        let request = ModelRequest::new(direct_prompt(query, research))
            .with_system(ADVISOR_INSTRUCTION)
            .with_temperature(0.7);

        debug!(query = %query, "Sending query to model");

        let text = strip_reasoning(&self.model.generate(&request).await?);
        if text.is_empty() {
            return Err(AdvisorError::Llm("Model returned an empty answer".to_string()));
        }
        Ok(text)
    }

    /// One turn of a chat session. Turns in the same session run one at a
    /// time; only successful exchanges are remembered.
    pub async fn chat(&self, store: &SessionStore, session_id: Uuid, input: &str) -> Result<ChatReply> {
        let session = store.get_or_create(session_id).await;
        let mut history = session.history.lock().await;
        history.touch();

        let request = ModelRequest::new(input)
            .with_system(ADVISOR_INSTRUCTION)
            .with_history(history.turns())
            .with_temperature(0.5);

        let text = strip_reasoning(&generate_with_retry(self.model.as_ref(), &request, &self.retry).await?);
        if text.is_empty() {
            return Err(AdvisorError::Llm("Model returned an empty answer".to_string()));
        }

        history.push_exchange(input.to_string(), text.clone());

        info!(
            session_id = %session_id,
            messages = history.message_count(),
            "Chat turn complete"
        );

        Ok(ChatReply {
            output: text,
            session_id,
        })
    }
}

fn direct_prompt(query: &str, research: Option<&str>) -> String {
    let mut prompt = String::new();
    if let Some(research) = research.filter(|r| !r.trim().is_empty()) {
        prompt.push_str(&format!("Research Information:\n{}\n\n", research));
    }
    prompt.push_str(&format!(
        "Question: {}\n\nPlease provide a detailed analysis and answer.",
        query
    ));
    prompt
}

/// Remove `<think>…</think>` reasoning blocks some models emit.
///
/// A dangling `</think>` without an opening tag cuts everything before it.
pub fn strip_reasoning(text: &str) -> String {
    let mut rest = text;
    if let Some(end) = rest.rfind("</think>") {
        if !rest[..end].contains("<think>") {
            rest = &rest[end + "</think>".len()..];
        }
    }

    let mut out = String::new();
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}
