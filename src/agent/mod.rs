//! Tool-augmented reasoning loop
//!
//! AWAITING_MODEL → PARSING_RESPONSE → DISPATCHING_TOOL → AWAITING_MODEL … → DONE
//!
//! Every session owns its scratchpad. The loop always ends: either the model
//! produces a final answer, or the iteration or wall-clock budget runs out and
//! the outcome says which one.

use crate::config::AppConfig;
use crate::llm::{generate_with_retry, ChatModel, ModelRequest, RetryPolicy};
use crate::prompt::PromptTemplate;
use crate::tools::ToolRegistry;
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

pub mod parser;
pub mod scratchpad;

pub use parser::{AgentAction, AgentStep, ParseFailure};
pub use scratchpad::{Scratchpad, ScratchpadEntry};

/// Generation stops before the model writes its own observation
pub const OBSERVATION_STOP: &str = "\nObservation:";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_iterations: usize,
    pub max_execution_time: Duration,
    pub retry: RetryPolicy,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_execution_time: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

impl LoopConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            max_execution_time: config.max_execution_time,
            retry: RetryPolicy::with_max_retries(config.llm_max_retries),
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    FinalAnswer,
    IterationLimit,
    TimeLimit,
}

#[derive(Debug)]
enum LoopState {
    AwaitingModel,
    ParsingResponse(String),
    DispatchingTool(AgentAction),
    Done(StopReason),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    /// Present only when `stop` is [`StopReason::FinalAnswer`]
    pub answer: Option<String>,
    pub stop: StopReason,
    pub steps: Vec<ScratchpadEntry>,
    /// Full Thought/Action/Observation transcript
    pub trace: String,
    pub iterations: usize,
    pub elapsed_ms: u64,
}

impl SessionOutcome {
    pub fn is_complete(&self) -> bool {
        self.stop == StopReason::FinalAnswer
    }
}

pub struct ReasoningLoop {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    template: PromptTemplate,
    config: LoopConfig,
}

impl ReasoningLoop {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<ToolRegistry>, config: LoopConfig) -> Self {
        Self {
            model,
            tools,
            template: PromptTemplate::default(),
            config,
        }
    }

    /// Run one session to completion or budget exhaustion.
    ///
    /// Only model failures that survive the retry policy are returned as
    /// errors. Tool failures and malformed completions become observations.
    pub async fn run(&self, question: &str) -> Result<SessionOutcome> {
        let started = Instant::now();
        let deadline = started + self.config.max_execution_time;

        let tool_descriptions = self.tools.render_descriptions();
        let tool_names = self.tools.names().join(", ");

        let mut pad = Scratchpad::new();
        let mut iterations = 0usize;
        let mut answer = None;
        let mut final_log = String::new();
        let mut state = LoopState::AwaitingModel;

        info!(
            question = %question,
            max_iterations = self.config.max_iterations,
            "Reasoning session started"
        );

        let stop = loop {
            state = match state {
                LoopState::AwaitingModel => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if iterations >= self.config.max_iterations {
                        LoopState::Done(StopReason::IterationLimit)
                    } else if remaining.is_zero() {
                        LoopState::Done(StopReason::TimeLimit)
                    } else {
                        iterations += 1;
                        let prompt = self.template.render(
                            &tool_descriptions,
                            &tool_names,
                            question,
                            &pad.render(),
                        );
                        let request = ModelRequest::new(prompt).with_stop(OBSERVATION_STOP);

                        debug!(iteration = iterations, "Awaiting model");

                        match timeout(
                            remaining,
                            generate_with_retry(self.model.as_ref(), &request, &self.config.retry),
                        )
                        .await
                        {
                            Ok(completion) => LoopState::ParsingResponse(completion?),
                            Err(_) => LoopState::Done(StopReason::TimeLimit),
                        }
                    }
                }

                LoopState::ParsingResponse(completion) => match parser::parse(&completion) {
                    Ok(AgentStep::Finish { answer: text, log }) => {
                        answer = Some(text);
                        final_log = log;
                        LoopState::Done(StopReason::FinalAnswer)
                    }
                    Ok(AgentStep::Action(action)) => LoopState::DispatchingTool(action),
                    Err(failure) => {
                        warn!(iteration = iterations, reason = failure.message, "Unparseable completion");
                        pad.push(ScratchpadEntry {
                            thought: failure.log.trim().to_string(),
                            tool: None,
                            input: None,
                            observation: failure.message.to_string(),
                            log: failure.log,
                        });
                        LoopState::AwaitingModel
                    }
                },

                LoopState::DispatchingTool(action) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());

                    debug!(tool_name = %action.tool, input = %action.input, "Dispatching tool");

                    match timeout(remaining, self.tools.dispatch(&action.tool, &action.input)).await
                    {
                        Ok(observation) => {
                            pad.push(ScratchpadEntry {
                                thought: action.thought,
                                tool: Some(action.tool),
                                input: Some(action.input),
                                observation,
                                log: action.log,
                            });
                            LoopState::AwaitingModel
                        }
                        Err(_) => LoopState::Done(StopReason::TimeLimit),
                    }
                }

                LoopState::Done(stop) => break stop,
            };
        };

        let trace = format!("Thought:{}{}", pad.render(), final_log);
        let steps = pad.into_entries();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match stop {
            StopReason::FinalAnswer => info!(
                iterations,
                steps = steps.len(),
                elapsed_ms,
                "Reasoning session finished"
            ),
            _ => warn!(
                ?stop,
                iterations,
                steps = steps.len(),
                elapsed_ms,
                "Reasoning session ran out of budget"
            ),
        }

        Ok(SessionOutcome {
            answer,
            stop,
            steps,
            trace,
            iterations,
            elapsed_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdvisorError;
    use crate::llm::ScriptedModel;
    use crate::tools::{ArithmeticTool, Operation};

    fn arithmetic() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(ArithmeticTool::new(Operation::Add)))
            .unwrap();
        registry
            .register(Arc::new(ArithmeticTool::new(Operation::Divide)))
            .unwrap();
        Arc::new(registry)
    }

    fn agent(model: Arc<ScriptedModel>, config: LoopConfig) -> ReasoningLoop {
        ReasoningLoop::new(model, arithmetic(), config)
    }

    #[tokio::test]
    async fn test_immediate_final_answer() {
        let model = Arc::new(ScriptedModel::new([
            " I now know the final answer\nFinal Answer: Buy index funds",
        ]));
        let outcome = agent(model.clone(), LoopConfig::default())
            .run("Where should I invest?")
            .await
            .unwrap();

        assert!(outcome.is_complete());
        assert_eq!(outcome.answer.as_deref(), Some("Buy index funds"));
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.steps.is_empty());

        let requests = model.requests();
        assert_eq!(requests[0].stop, vec![OBSERVATION_STOP.to_string()]);
        assert!(requests[0].prompt.contains("Question: Where should I invest?"));
        assert!(requests[0].prompt.contains("[add, divide]"));
    }

    #[tokio::test]
    async fn test_action_then_answer() {
        let model = Arc::new(ScriptedModel::new([
            " I should add them.\nAction: add\nAction Input: 2, 3",
            " I now know the final answer\nFinal Answer: 5",
        ]));
        let outcome = agent(model.clone(), LoopConfig::default())
            .run("What is 2 + 3?")
            .await
            .unwrap();

        assert_eq!(outcome.answer.as_deref(), Some("5"));
        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.steps[0].tool.as_deref(), Some("add"));
        assert_eq!(outcome.steps[0].observation, "5");

        let second = &model.requests()[1].prompt;
        assert!(second.ends_with("Action Input: 2, 3\nObservation: 5\nThought: "));
        assert!(outcome.trace.contains("Observation: 5"));
        assert!(outcome.trace.ends_with("Final Answer: 5"));
    }

    #[tokio::test]
    async fn test_one_observation_per_action() {
        let model = Arc::new(ScriptedModel::new([
            "Divide.\nAction: divide\nAction Input: 10, 0",
            "Add.\nAction: add\nAction Input: 1, 1",
            "Final Answer: done",
        ]));
        let outcome = agent(model, LoopConfig::default())
            .run("q")
            .await
            .unwrap();

        assert_eq!(outcome.steps.len(), 2);
        assert!(outcome.steps[0].observation.starts_with("Error: Arithmetic error"));
        assert_eq!(outcome.steps[1].observation, "2");
    }

    #[tokio::test]
    async fn test_odd_tool_inputs_each_yield_one_observation() {
        use crate::market::fake::FakeMarketData;
        use crate::tools::{EvaluateReturnsTool, HistoricalPriceTool};

        let market = Arc::new(FakeMarketData::with_company(
            "RELIANCE.NS",
            "Reliance Industries Limited",
        ));
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(EvaluateReturnsTool::new(market.clone())))
            .unwrap();
        registry
            .register(Arc::new(HistoricalPriceTool::new(market)))
            .unwrap();
        registry
            .register(Arc::new(ArithmeticTool::new(Operation::Divide)))
            .unwrap();

        let model = Arc::new(ScriptedModel::new([
            "Check returns.\nAction: evaluate_returns\nAction Input: Reliance Industries, 100000000Y",
            "Check history.\nAction: get_historical_price\nAction Input: Reliance Industries, +262142-12-31, 30",
            "Divide.\nAction: divide\nAction Input: {\"numerator\": 10}",
            "Final Answer: no data",
        ]));
        let outcome = ReasoningLoop::new(model.clone(), Arc::new(registry), LoopConfig::default())
            .run("How did Reliance do?")
            .await
            .unwrap();

        assert!(outcome.is_complete());
        assert_eq!(outcome.steps.len(), 3);
        for step in &outcome.steps {
            assert!(!step.observation.is_empty());
        }

        let last_prompt = &model.requests()[3].prompt;
        let scratchpad = last_prompt
            .split("Question: How did Reliance do?")
            .nth(1)
            .unwrap();
        assert_eq!(scratchpad.matches("\nObservation: ").count(), 3);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_observed() {
        let model = Arc::new(ScriptedModel::new([
            "Hmm.\nAction: teleport\nAction Input: mars",
            "Final Answer: cannot teleport",
        ]));
        let outcome = agent(model, LoopConfig::default())
            .run("q")
            .await
            .unwrap();

        assert_eq!(
            outcome.steps[0].observation,
            "teleport is not a valid tool, try one of [add, divide]."
        );
        assert_eq!(outcome.answer.as_deref(), Some("cannot teleport"));
    }

    #[tokio::test]
    async fn test_bad_format_is_fed_back() {
        let model = Arc::new(ScriptedModel::new([
            "I think I will just talk.",
            "Final Answer: ok",
        ]));
        let outcome = agent(model.clone(), LoopConfig::default())
            .run("q")
            .await
            .unwrap();

        assert_eq!(outcome.steps[0].tool, None);
        assert_eq!(outcome.steps[0].observation, parser::MISSING_ACTION);
        assert_eq!(outcome.iterations, 2);
        assert!(model.requests()[1].prompt.contains(parser::MISSING_ACTION));
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let model = Arc::new(ScriptedModel::new(
            (0..10).map(|_| "Again.\nAction: add\nAction Input: 1, 1"),
        ));
        let config = LoopConfig {
            max_iterations: 3,
            ..LoopConfig::default()
        };
        let outcome = agent(model.clone(), config).run("q").await.unwrap();

        assert_eq!(outcome.stop, StopReason::IterationLimit);
        assert_eq!(outcome.answer, None);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(model.call_count(), 3);
    }

    struct SlowModel;

    #[async_trait::async_trait]
    impl ChatModel for SlowModel {
        async fn generate(&self, _request: &ModelRequest) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("Again.\nAction: add\nAction Input: 1, 1".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_limit() {
        let config = LoopConfig {
            max_iterations: 100,
            max_execution_time: Duration::from_secs(25),
            ..LoopConfig::default()
        };
        let outcome = ReasoningLoop::new(Arc::new(SlowModel), arithmetic(), config)
            .run("q")
            .await
            .unwrap();

        assert_eq!(outcome.stop, StopReason::TimeLimit);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.steps.len(), 2);
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let model = Arc::new(ScriptedModel::from_results(vec![Err(AdvisorError::Llm(
            "blocked".to_string(),
        ))]));
        let result = agent(model, LoopConfig::default()).run("q").await;
        assert!(matches!(result, Err(AdvisorError::Llm(_))));
    }
}
