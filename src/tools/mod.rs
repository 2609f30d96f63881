//! Tool trait and registry
//!
//! Every tool takes the raw `Action Input` text from the model, validated
//! against the schema the tool declares, and produces text. The registry is
//! the boundary the reasoning loop talks to: [`ToolRegistry::dispatch`]
//! always yields an observation string, never an error.

use crate::config::AppConfig;
use crate::error::AdvisorError;
use crate::market::MarketData;
use crate::models::{ToolInput, ToolOutput};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub mod arithmetic;
pub mod clock;
pub mod code;
pub mod finance;
pub mod search;

pub use arithmetic::{ArithmeticTool, Operation};
pub use clock::ClockTool;
pub use code::PythonReplTool;
pub use finance::{CompanyInfoTool, CurrentPriceTool, EvaluateReturnsTool, HistoricalPriceTool};
pub use search::WebSearchTool;

/// Shared sentinel for "the provider returned nothing"
pub const NO_DATA: &str = "No data available";

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> InputSchema;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

/// Declared shape of a tool's input
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputSchema {
    /// Free text; empty input is rejected when `required`
    Text { required: bool },
    /// Exactly `n` numbers, comma/space separated or as a JSON array/object
    Numbers(usize),
    /// Comma separated fields, one per name. Extra commas stay in the first field.
    Fields(&'static [&'static str]),
}

impl InputSchema {
    /// Validate raw model text into a typed [`ToolInput`].
    pub fn validate(&self, raw: &str) -> Result<ToolInput> {
        let raw = strip_quotes(raw.trim());

        match *self {
            InputSchema::Text { required } => {
                if required && raw.is_empty() {
                    return Err(AdvisorError::InvalidToolInput(
                        "Expected a non-empty text input".to_string(),
                    ));
                }
                Ok(ToolInput::Text(raw.to_string()))
            }
            InputSchema::Numbers(n) => {
                let numbers = parse_numbers(raw)?;
                if numbers.len() != n {
                    return Err(AdvisorError::InvalidToolInput(format!(
                        "Expected {} numbers, got {} in {:?}",
                        n,
                        numbers.len(),
                        raw
                    )));
                }
                Ok(ToolInput::Numbers(numbers))
            }
            InputSchema::Fields(names) => {
                let mut fields: Vec<String> = raw
                    .rsplitn(names.len(), ',')
                    .map(|f| strip_quotes(f.trim()).to_string())
                    .collect();
                fields.reverse();

                if fields.len() != names.len() || fields.iter().any(|f| f.is_empty()) {
                    return Err(AdvisorError::InvalidToolInput(format!(
                        "Expected {} comma separated values ({}), got {:?}",
                        names.len(),
                        names.join(", "),
                        raw
                    )));
                }
                Ok(ToolInput::Fields(fields))
            }
        }
    }

    /// Human readable form used in the prompt
    pub fn describe(&self) -> String {
        match self {
            InputSchema::Text { required: true } => "text".to_string(),
            InputSchema::Text { required: false } => "optional text".to_string(),
            InputSchema::Numbers(n) => format!("{} comma separated numbers", n),
            InputSchema::Fields(names) => format!("\"{}\"", names.join(", ")),
        }
    }
}

fn strip_quotes(s: &str) -> &str {
    for q in ['"', '\'', '`'] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return s[1..s.len() - 1].trim();
        }
    }
    s
}

fn parse_numbers(raw: &str) -> Result<Vec<f64>> {
    let invalid = |what: &str| AdvisorError::InvalidToolInput(format!("Not a number: {:?}", what));

    if raw.starts_with('[') || raw.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| AdvisorError::InvalidToolInput(format!("Invalid JSON input: {}", e)))?;
        let items: Vec<serde_json::Value> = match value {
            serde_json::Value::Array(items) => items,
            // Named `a`/`b` operands first, otherwise the order the keys were written in
            serde_json::Value::Object(mut map) if map.contains_key("a") && map.contains_key("b") => {
                let mut items: Vec<serde_json::Value> =
                    ["a", "b"].iter().filter_map(|k| map.shift_remove(*k)).collect();
                items.extend(map.into_iter().map(|(_, v)| v));
                items
            }
            serde_json::Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            _ => Vec::new(),
        };
        return items
            .iter()
            .map(|v| {
                v.as_f64()
                    .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
                    .ok_or_else(|| invalid(&v.to_string()))
            })
            .collect();
    }

    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().map_err(|_| invalid(s)))
        .collect()
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a tool. Names are unique within a registry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(AdvisorError::Tool(format!(
                "Tool '{}' is already registered",
                name
            )));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// One line per tool for the prompt
    pub fn render_descriptions(&self) -> String {
        self.tools
            .iter()
            .map(|t| {
                format!(
                    "{}: {} Input: {}.",
                    t.name(),
                    t.description(),
                    t.input_schema().describe()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Validate and run one tool, bounded by the registry timeout.
    pub async fn invoke(&self, name: &str, raw_input: &str) -> Result<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| AdvisorError::ToolNotFound(name.to_string()))?;

        let input = tool.input_schema().validate(raw_input)?;

        debug!(tool_name = %name, ?input, "Executing tool");

        match tokio::time::timeout(self.timeout, tool.execute(&input)).await {
            Ok(result) => result,
            Err(_) => Err(AdvisorError::Timeout(format!(
                "{} did not finish within {}s",
                name,
                self.timeout.as_secs()
            ))),
        }
    }

    /// Run a tool and turn every outcome into observation text.
    pub async fn dispatch(&self, name: &str, raw_input: &str) -> String {
        match self.invoke(name, raw_input).await {
            Ok(output) => output.text,
            Err(AdvisorError::ToolNotFound(_)) => {
                warn!(tool_name = %name, "Model requested an unknown tool");
                format!(
                    "{} is not a valid tool, try one of [{}].",
                    name,
                    self.names().join(", ")
                )
            }
            Err(e) => {
                warn!(tool_name = %name, error = %e, "Tool execution failed");
                format!("Error: {}", e)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry with the full tool library.
pub fn create_default_registry(
    config: &AppConfig,
    market: Arc<dyn MarketData>,
) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new().with_timeout(config.tool_timeout);

    for op in Operation::ALL {
        registry.register(Arc::new(ArithmeticTool::new(op)))?;
    }
    registry.register(Arc::new(ClockTool))?;
    registry.register(Arc::new(WebSearchTool::new(config.tool_timeout)?))?;
    registry.register(Arc::new(PythonReplTool::new(
        config.python_bin.clone(),
        config.code_timeout,
    )))?;

    registry.register(Arc::new(HistoricalPriceTool::new(Arc::clone(&market))))?;
    registry.register(Arc::new(CurrentPriceTool::new(Arc::clone(&market))))?;
    registry.register(Arc::new(CompanyInfoTool::new(Arc::clone(&market))))?;
    registry.register(Arc::new(EvaluateReturnsTool::new(market)))?;

    Ok(registry)
}
