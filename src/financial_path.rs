//! Capital allocation planner
//!
//! Asks the model for a recommended split of the user's money and returns it
//! as a node/edge graph a flow-chart widget can draw directly.

use crate::error::AdvisorError;
use crate::llm::{generate_with_retry, ChatModel, ModelRequest, RetryPolicy};
use crate::models::RiskProfile;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

const PATH_INSTRUCTION: &str = r#"You are a personal financial advisor dedicated to helping in a financial journey. Focus on providing guidance on budgeting, investing, retirement planning, debt management, and wealth building strategies. Be precise and practical in your advice while considering individual circumstances and the user's risk profile.

Provide balanced, ethical financial advice.

You can increase the number of nodes and edges in the response if needed.

For the given user query respond with an allocation graph in the following format.
Strictly follow the given format only.

{
  "nodes": [
    {
      "id": "start",
      "position": { "x": 250, "y": 50 },
      "data": { "label": "Investment\n₹1,00,000" },
      "style": { "background": "bg-blue-100", "border": "border-blue-500" }
    },
    {
      "id": "index",
      "position": { "x": 50, "y": 200 },
      "data": { "label": "Index Funds\n₹40,000" },
      "style": { "background": "bg-indigo-100", "border": "border-indigo-500" }
    },
    {
      "id": "midcap",
      "position": { "x": 250, "y": 200 },
      "data": { "label": "Mid-Cap Stocks\n₹35,000" },
      "style": { "background": "bg-orange-100", "border": "border-orange-500" }
    },
    {
      "id": "gold",
      "position": { "x": 450, "y": 200 },
      "data": { "label": "Gold Investment\n₹25,000" },
      "style": { "background": "bg-yellow-100", "border": "border-yellow-500" }
    }
  ],
  "edges": [
    { "id": "e-index", "source": "start", "target": "index", "label": "40%", "style": { "stroke": "stroke-indigo-500" } },
    { "id": "e-midcap", "source": "start", "target": "midcap", "label": "35%", "style": { "stroke": "stroke-orange-500" } },
    { "id": "e-gold", "source": "start", "target": "gold", "label": "25%", "style": { "stroke": "stroke-yellow-500" } }
  ]
}"#;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowNode {
    pub id: String,
    pub position: Position,
    pub data: NodeData,
    #[serde(default)]
    pub style: NodeStyle,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeData {
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeStyle {
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub border: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub style: EdgeStyle,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EdgeStyle {
    #[serde(default)]
    pub stroke: String,
}

impl FlowGraph {
    /// Node ids are unique and every edge connects two known nodes.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(AdvisorError::Extraction("Graph has no nodes".to_string()));
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(AdvisorError::Extraction(format!(
                    "Duplicate node id '{}'",
                    node.id
                )));
            }
        }

        for edge in &self.edges {
            for end in [&edge.source, &edge.target] {
                if !ids.contains(end.as_str()) {
                    return Err(AdvisorError::Extraction(format!(
                        "Edge '{}' references unknown node '{}'",
                        edge.id, end
                    )));
                }
            }
        }
        Ok(())
    }
}

pub struct FinancialPathPlanner {
    model: Arc<dyn ChatModel>,
    retry: RetryPolicy,
}

impl FinancialPathPlanner {
    pub fn new(model: Arc<dyn ChatModel>, retry: RetryPolicy) -> Self {
        Self { model, retry }
    }

    pub async fn plan(&self, input: &str, risk: RiskProfile) -> Result<FlowGraph> {
        let request = ModelRequest::new(format!("{} \nMy risk profile is:{}", input, risk))
            .with_system(PATH_INSTRUCTION)
            .with_temperature(1.0)
            .with_max_output_tokens(8192);

        debug!(%risk, "Requesting allocation graph");

        let reply = generate_with_retry(self.model.as_ref(), &request, &self.retry).await?;
        parse_graph(&reply).map_err(|e| {
            warn!(error = %e, "Model returned an unusable allocation graph");
            e
        })
    }
}

/// Pull the graph out of a reply: a ```json fenced block if there is one,
/// otherwise the whole reply.
pub fn parse_graph(reply: &str) -> Result<FlowGraph> {
    let json_str = extract_json_block(reply).unwrap_or_else(|| reply.trim());

    let graph: FlowGraph = serde_json::from_str(json_str)
        .map_err(|e| AdvisorError::Extraction(format!("Allocation graph is not valid JSON: {}", e)))?;
    graph.validate()?;
    Ok(graph)
}

fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find("```json")?;
    let after_fence = &text[start + 7..]; // skip "```json"
    let end = after_fence.find("```")?;
    Some(after_fence[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;

    const GRAPH: &str = r#"{
      "nodes": [
        {"id": "start", "position": {"x": 250, "y": 50}, "data": {"label": "Investment\n₹10,00,000"},
         "style": {"background": "bg-blue-100", "border": "border-blue-500"}},
        {"id": "fd", "position": {"x": 50, "y": 200}, "data": {"label": "Fixed Deposits\n₹6,00,000"},
         "style": {"background": "bg-green-100", "border": "border-green-500"}}
      ],
      "edges": [
        {"id": "e-fd", "source": "start", "target": "fd", "label": "60%", "style": {"stroke": "stroke-green-500"}}
      ]
    }"#;

    #[test]
    fn test_parse_fenced_reply() {
        let reply = format!("Here is your plan:\n```json\n{}\n```\nStay invested.", GRAPH);
        let graph = parse_graph(&reply).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges[0].label, "60%");
        assert_eq!(graph.nodes[1].position, Position { x: 50.0, y: 200.0 });
    }

    #[test]
    fn test_parse_bare_reply() {
        let graph = parse_graph(GRAPH).unwrap();
        assert_eq!(graph.nodes[0].id, "start");
    }

    #[test]
    fn test_rejects_dangling_edge() {
        let reply = GRAPH.replace(r#""target": "fd""#, r#""target": "crypto""#);
        let err = parse_graph(&reply).unwrap_err();
        assert!(err.to_string().contains("crypto"));
    }

    #[test]
    fn test_rejects_prose() {
        assert!(matches!(
            parse_graph("Invest in gold."),
            Err(AdvisorError::Extraction(_))
        ));
    }

    #[tokio::test]
    async fn test_plan_sends_risk_profile() {
        let model = Arc::new(ScriptedModel::new([GRAPH]));
        let planner = FinancialPathPlanner::new(model.clone(), RetryPolicy::none());

        let graph = planner
            .plan("I have ten lakh rupees", RiskProfile::Aggressive)
            .await
            .unwrap();
        assert_eq!(graph.edges.len(), 1);

        let request = &model.requests()[0];
        assert_eq!(request.prompt, "I have ten lakh rupees \nMy risk profile is:aggressive");
        assert!(request.system.as_deref().unwrap_or_default().contains("\"nodes\""));
    }
}
