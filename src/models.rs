//! Core data models for the wealth advisor

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

//
// ================= Enums =================
//

/// Where an answer came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Direct single-shot model call
    Gemini,
    /// Tool-augmented reasoning loop
    Agent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    #[default]
    Conservative,
    Moderate,
    Aggressive,
}

impl RiskProfile {
    /// Lenient parse of free text such as "very aggressive" or "medium risk".
    ///
    /// The boldest profile named wins. Text naming none of them falls back to
    /// conservative with a warning.
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let mentions = |names: &[&str]| words.iter().any(|w| names.contains(w));

        if mentions(&["aggressive", "high", "risky"]) {
            RiskProfile::Aggressive
        } else if mentions(&["moderate", "moderately", "medium", "balanced"]) {
            RiskProfile::Moderate
        } else if mentions(&["conservative", "low", "safe", "cautious"]) {
            RiskProfile::Conservative
        } else {
            warn!(risk = %raw, "Unrecognised risk profile, assuming conservative");
            RiskProfile::Conservative
        }
    }
}

//
// ================= Agent Response =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResponse {
    pub output: String,
    pub source: Provenance,
    pub status: ResponseStatus,
    /// Raw reasoning trace, only present on the agent path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
}

impl AgentResponse {
    pub fn direct(output: String) -> Self {
        Self {
            output,
            source: Provenance::Gemini,
            status: ResponseStatus::Success,
            thought: None,
        }
    }

    pub fn from_agent(output: String, trace: String) -> Self {
        Self {
            output,
            source: Provenance::Agent,
            status: ResponseStatus::Success,
            thought: Some(trace),
        }
    }
}

//
// ================= Chat =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }
}

//
// ================= Tool I/O =================
//

/// Tool input after validation against the tool's declared schema
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    Text(String),
    Numbers(Vec<f64>),
    Fields(Vec<String>),
}

impl ToolInput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolInput::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Text result handed back to the reasoning loop as an observation
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub text: String,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskProfile::Conservative => "conservative",
            RiskProfile::Moderate => "moderate",
            RiskProfile::Aggressive => "aggressive",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_serialization() {
        let response = AgentResponse::direct("Buy index funds".to_string());
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["source"], "gemini");
        assert_eq!(json["status"], "success");
        assert!(json.get("thought").is_none());
    }

    #[test]
    fn test_risk_profile_parse() {
        assert_eq!(RiskProfile::parse("Aggressive"), RiskProfile::Aggressive);
        assert_eq!(RiskProfile::parse("moderate"), RiskProfile::Moderate);
        assert_eq!(RiskProfile::parse("whatever"), RiskProfile::Conservative);
        assert_eq!(RiskProfile::parse("very aggressive"), RiskProfile::Aggressive);
        assert_eq!(RiskProfile::parse("Moderately aggressive"), RiskProfile::Aggressive);
        assert_eq!(RiskProfile::parse("medium-risk"), RiskProfile::Moderate);
        assert_eq!(RiskProfile::parse(" Low "), RiskProfile::Conservative);
        assert_eq!(RiskProfile::parse("highly conservative"), RiskProfile::Conservative);
        assert_eq!(RiskProfile::default().to_string(), "conservative");
    }
}
