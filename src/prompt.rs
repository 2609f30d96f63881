//! ReAct prompt template
//!
//! The markers in [`FORMAT_INSTRUCTIONS`] are the contract with the output
//! parser in `agent::parser`; both must change together.

use chrono::{Local, NaiveDate};

pub const DEFAULT_PERSONA: &str = "You are \"Wealth Wise AI\", a personal financial advisor. You analyze \
users' financial goals, risk tolerance and portfolios to recommend personalized investment \
strategies, backed by current market data and careful research. Keep financial planning simple, \
inclusive and effective. Only answer financial questions.";

const FORMAT_INSTRUCTIONS: &str = "Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question";

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    persona: String,
    today: NaiveDate,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_PERSONA)
    }
}

impl PromptTemplate {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            today: Local::now().date_naive(),
        }
    }

    /// Pin the date shown to the model.
    pub fn with_date(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Render one turn of the prompt. Every placeholder is filled exactly once.
    pub fn render(&self, tools: &str, tool_names: &str, question: &str, scratchpad: &str) -> String {
        let format = FORMAT_INSTRUCTIONS.replacen("{tool_names}", tool_names, 1);

        format!(
            "{persona}\n\n\
             Today's date is {today}.\n\n\
             Answer the following questions as best you can. You have access to the following tools:\n\n\
             {tools}\n\n\
             {format}\n\n\
             Begin!\n\n\
             Question: {question}\n\
             Thought:{scratchpad}",
            persona = self.persona,
            today = self.today.format("%Y-%m-%d"),
            tools = tools,
            format = format,
            question = question,
            scratchpad = scratchpad,
        )
    }
}
