//! ReAct output parser
//!
//! Reads one model completion and decides whether it is a tool call or a
//! final answer. Markers are only recognised at the start of a line.

use regex::Regex;
use std::sync::OnceLock;

pub const MISSING_ACTION: &str = "Invalid Format: Missing 'Action:' after 'Thought:'";
pub const MISSING_ACTION_INPUT: &str = "Invalid Format: Missing 'Action Input:' after 'Action:'";
pub const EMPTY_FINAL_ANSWER: &str = "Invalid Format: 'Final Answer:' must be followed by the answer";

#[derive(Debug, Clone, PartialEq)]
pub struct AgentAction {
    pub tool: String,
    pub input: String,
    /// Reasoning that preceded the action, may be empty
    pub thought: String,
    /// Completion text as kept in the scratchpad
    pub log: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentStep {
    Action(AgentAction),
    Finish { answer: String, log: String },
}

/// A completion that follows neither branch of the grammar
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub message: &'static str,
    pub log: String,
}

struct Patterns {
    observation: Regex,
    final_answer: Regex,
    action: Regex,
    action_input: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        observation: Regex::new(r"(?m)^[ \t]*Observation\s*:").expect("valid regex"),
        final_answer: Regex::new(r"(?m)^[ \t]*Final Answer\s*:").expect("valid regex"),
        action: Regex::new(r"(?m)^[ \t]*Action\s*\d*\s*:[ \t]*(.*?)[ \t]*$").expect("valid regex"),
        action_input: Regex::new(r"(?ms)^[ \t]*Action\s*\d*\s*Input\s*\d*\s*:[ \t]*(.*?)(?:\n[ \t]*Thought\s*:|\z)")
            .expect("valid regex"),
    })
}

/// Parse one completion.
///
/// Anything from the first `Observation:` line on is the model inventing a
/// tool result and is dropped before parsing.
pub fn parse(completion: &str) -> Result<AgentStep, ParseFailure> {
    let p = patterns();

    let text = match p.observation.find(completion) {
        Some(m) => &completion[..m.start()],
        None => completion,
    };
    let log = text.trim_end().to_string();

    if let Some(m) = p.final_answer.find(text) {
        let answer = text[m.end()..].trim();
        if answer.is_empty() {
            return Err(ParseFailure {
                message: EMPTY_FINAL_ANSWER,
                log,
            });
        }
        return Ok(AgentStep::Finish {
            answer: answer.to_string(),
            log,
        });
    }

    let Some(action) = p.action.captures(text) else {
        return Err(ParseFailure {
            message: MISSING_ACTION,
            log,
        });
    };
    let tool = normalize_tool_name(&action[1]);
    let thought = text[..action.get(0).map_or(0, |m| m.start())].trim().to_string();

    let input = p
        .action_input
        .captures(text)
        .map(|c| c[1].trim().to_string());

    match input {
        Some(input) if !tool.is_empty() => Ok(AgentStep::Action(AgentAction {
            tool,
            input,
            thought,
            log,
        })),
        Some(_) => Err(ParseFailure {
            message: MISSING_ACTION,
            log,
        }),
        None => Err(ParseFailure {
            message: MISSING_ACTION_INPUT,
            log,
        }),
    }
}

/// Models often decorate tool names: `` `add` ``, `add()`, `[add]`, `"add"`.
pub fn normalize_tool_name(raw: &str) -> String {
    let mut name = raw.trim();
    loop {
        let before = name;
        name = name
            .trim_matches(|c| matches!(c, '`' | '"' | '\'' | '[' | ']' | '*'))
            .trim();
        name = name.strip_suffix("()").unwrap_or(name).trim();
        if name == before {
            return name.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action() {
        let step = parse(" I need to add.\nAction: add\nAction Input: 2, 3").unwrap();
        assert_eq!(
            step,
            AgentStep::Action(AgentAction {
                tool: "add".to_string(),
                input: "2, 3".to_string(),
                thought: "I need to add.".to_string(),
                log: " I need to add.\nAction: add\nAction Input: 2, 3".to_string(),
            })
        );
    }

    #[test]
    fn test_final_answer() {
        let step = parse(" I now know the final answer\nFinal Answer: Buy index funds\n").unwrap();
        assert_eq!(
            step,
            AgentStep::Finish {
                answer: "Buy index funds".to_string(),
                log: " I now know the final answer\nFinal Answer: Buy index funds".to_string(),
            }
        );
    }

    #[test]
    fn test_multiline_final_answer() {
        let step = parse("Done.\nFinal Answer: Two options:\n1. SIP\n2. FD").unwrap();
        match step {
            AgentStep::Finish { answer, .. } => assert_eq!(answer, "Two options:\n1. SIP\n2. FD"),
            other => panic!("expected finish, got {:?}", other),
        }
    }

    #[test]
    fn test_marker_must_start_a_line() {
        let result = parse("I will write the Final Answer: later");
        assert_eq!(result.unwrap_err().message, MISSING_ACTION);
    }

    #[test]
    fn test_hallucinated_observation_is_dropped() {
        let completion = "Check price.\nAction: get_current_price\nAction Input: Cipla\n\
                          Observation: 1500\nThought: I know it\nFinal Answer: 1500";
        match parse(completion).unwrap() {
            AgentStep::Action(action) => {
                assert_eq!(action.tool, "get_current_price");
                assert_eq!(action.input, "Cipla");
                assert!(!action.log.contains("Observation"));
            }
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_markers() {
        assert_eq!(parse("Just chatting").unwrap_err().message, MISSING_ACTION);
        assert_eq!(
            parse("Thinking\nAction: search").unwrap_err().message,
            MISSING_ACTION_INPUT
        );
        assert_eq!(
            parse("Thinking\nFinal Answer:   ").unwrap_err().message,
            EMPTY_FINAL_ANSWER
        );
    }

    #[test]
    fn test_normalize_tool_name() {
        assert_eq!(normalize_tool_name(" `add` "), "add");
        assert_eq!(normalize_tool_name("add()"), "add");
        assert_eq!(normalize_tool_name("[search]"), "search");
        assert_eq!(normalize_tool_name("\"python_repl\""), "python_repl");
        assert_eq!(normalize_tool_name("**`divide()`**"), "divide");
    }
}
