//! Conversation history storage
//!
//! Stores one session's messages with timestamps, bounded to a fixed
//! number of messages.

use crate::models::{ChatRole, ChatTurn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// A single message in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: String) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content,
        }
    }
}

/// Conversation history for one chat session
#[derive(Debug)]
pub struct ChatHistory {
    messages: VecDeque<ChatMessage>,
    max_messages: usize,
    last_active: Instant,
}

impl ChatHistory {
    /// `max_messages` is rounded down to whole user/assistant exchanges (min. one).
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            max_messages: (max_messages / 2 * 2).max(2),
            last_active: Instant::now(),
        }
    }

    /// Record one completed exchange, dropping the oldest exchanges when full.
    pub fn push_exchange(&mut self, user: String, assistant: String) {
        self.messages
            .push_back(ChatMessage::new(ChatRole::User, user));
        self.messages
            .push_back(ChatMessage::new(ChatRole::Assistant, assistant));
        self.trim_to_recent(self.max_messages);
        self.touch();
    }

    /// History as model turns, oldest first
    pub fn turns(&self) -> Vec<ChatTurn> {
        self.messages
            .iter()
            .map(|m| ChatTurn {
                role: m.role,
                text: m.content.clone(),
            })
            .collect()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Keep only the last `keep_count` messages
    fn trim_to_recent(&mut self, keep_count: usize) {
        while self.messages.len() > keep_count {
            self.messages.pop_front();
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_is_recorded_in_order() {
        let mut history = ChatHistory::new(10);
        history.push_exchange("What is RSI?".to_string(), "A momentum oscillator.".to_string());

        let turns = history.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], ChatTurn::user("What is RSI?"));
        assert_eq!(turns[1], ChatTurn::assistant("A momentum oscillator."));
    }

    #[test]
    fn test_history_is_bounded_by_whole_exchanges() {
        let mut history = ChatHistory::new(5);
        for i in 0..10 {
            history.push_exchange(format!("Question {}", i), format!("Answer {}", i));
        }

        assert_eq!(history.message_count(), 4);
        let turns = history.turns();
        assert_eq!(turns[0], ChatTurn::user("Question 8"));
        assert_eq!(turns[3], ChatTurn::assistant("Answer 9"));
    }
}
