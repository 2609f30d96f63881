//! Wealth Advisor
//!
//! A financial advisory assistant that:
//! - Answers questions directly from the model when it can
//! - Falls back to a tool-augmented reasoning loop (arithmetic, web search,
//!   code execution, stock market data)
//! - Keeps bounded per-session chat memory
//! - Produces capital allocation graphs for a given risk profile
//!
//! REASONING LOOP:
//! QUESTION → THOUGHT → ACTION → OBSERVATION → … → FINAL ANSWER

pub mod agent;
pub mod api;
pub mod config;
pub mod conversational;
pub mod error;
pub mod financial_path;
pub mod gemini;
pub mod llm;
pub mod market;
pub mod memory;
pub mod models;
pub mod prompt;
pub mod tools;

pub use error::{AdvisorError, Result};

// Re-export common types
pub use models::*;
