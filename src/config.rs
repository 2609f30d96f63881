//! Runtime configuration
//!
//! Everything is read from the process environment (a `.env` file is
//! loaded first by the binaries).

use crate::error::AdvisorError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub port: u16,

    /// Reasoning loop budget
    pub max_iterations: usize,
    pub max_execution_time: Duration,

    pub tool_timeout: Duration,
    pub llm_timeout: Duration,
    pub llm_max_retries: u32,

    pub python_bin: String,
    pub code_timeout: Duration,

    /// Chat session bounds
    pub chat_max_messages: usize,
    pub chat_max_sessions: usize,
    pub chat_session_ttl: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            port: 8080,
            max_iterations: 15,
            max_execution_time: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(30),
            llm_timeout: Duration::from_secs(60),
            llm_max_retries: 3,
            python_bin: "python3".to_string(),
            code_timeout: Duration::from_secs(10),
            chat_max_messages: 50,
            chat_max_sessions: 1000,
            chat_session_ttl: Duration::from_secs(3600),
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// `GEMINI_API_KEY` is mandatory; every other setting has a default.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let gemini_api_key = env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AdvisorError::Config("GEMINI_API_KEY is not set".to_string()))?;

        let port = match env::var("PORT").or_else(|_| env::var("API_PORT")) {
            Ok(raw) => parse_value("PORT", &raw)?,
            Err(_) => defaults.port,
        };

        Ok(Self {
            gemini_api_key,
            gemini_model: env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_base_url: env::var("GEMINI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gemini_base_url),
            port,
            max_iterations: env_or("AGENT_MAX_ITERATIONS", defaults.max_iterations)?,
            max_execution_time: env_secs("AGENT_MAX_EXECUTION_SECS", defaults.max_execution_time)?,
            tool_timeout: env_secs("TOOL_TIMEOUT_SECS", defaults.tool_timeout)?,
            llm_timeout: env_secs("LLM_TIMEOUT_SECS", defaults.llm_timeout)?,
            llm_max_retries: env_or("LLM_MAX_RETRIES", defaults.llm_max_retries)?,
            python_bin: env::var("PYTHON_BIN").unwrap_or(defaults.python_bin),
            code_timeout: env_secs("CODE_TIMEOUT_SECS", defaults.code_timeout)?,
            chat_max_messages: env_or("CHAT_MAX_MESSAGES", defaults.chat_max_messages)?,
            chat_max_sessions: env_or("CHAT_MAX_SESSIONS", defaults.chat_max_sessions)?,
            chat_session_ttl: env_secs("CHAT_SESSION_TTL_SECS", defaults.chat_session_ttl)?,
        })
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AdvisorError::Config(format!("{} has an invalid value: {:?}", key, raw)))
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn env_secs(key: &str, default: Duration) -> Result<Duration> {
    env_or(key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.max_iterations, 15);
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.port, 8080);
        assert_eq!(config.chat_max_sessions, 1000);
    }

    #[test]
    fn test_parse_value_rejects_garbage() {
        let parsed: Result<u16> = parse_value("PORT", "eighty");
        assert!(matches!(parsed, Err(AdvisorError::Config(_))));

        let parsed: u16 = parse_value("PORT", " 9090 ").unwrap();
        assert_eq!(parsed, 9090);
    }
}
