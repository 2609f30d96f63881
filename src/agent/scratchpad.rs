//! Per-session record of thought/action/observation turns

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScratchpadEntry {
    pub thought: String,
    /// `None` when the completion could not be parsed into an action
    pub tool: Option<String>,
    pub input: Option<String>,
    pub observation: String,
    #[serde(skip)]
    pub log: String,
}

/// Append-only; owned by exactly one reasoning session.
#[derive(Debug, Default)]
pub struct Scratchpad {
    entries: Vec<ScratchpadEntry>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ScratchpadEntry) {
        self.entries.push(entry);
    }

    pub fn into_entries(self) -> Vec<ScratchpadEntry> {
        self.entries
    }

    /// Text that follows `Thought:` in the next prompt.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.log);
            out.push_str("\nObservation: ");
            out.push_str(&entry.observation);
            out.push_str("\nThought: ");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let mut pad = Scratchpad::new();
        assert_eq!(pad.render(), "");

        pad.push(ScratchpadEntry {
            thought: "I need to add.".to_string(),
            tool: Some("add".to_string()),
            input: Some("2, 3".to_string()),
            observation: "5".to_string(),
            log: " I need to add.\nAction: add\nAction Input: 2, 3".to_string(),
        });

        assert_eq!(
            pad.render(),
            " I need to add.\nAction: add\nAction Input: 2, 3\nObservation: 5\nThought: "
        );
        assert_eq!(pad.into_entries().len(), 1);
    }
}
