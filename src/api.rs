//! REST API server for the wealth advisor
//!
//! Form-based endpoints consumed by the web frontend. Every failure is
//! answered with a JSON body carrying `error` and `status`.

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::{json, Value};
use std::any::Any;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::agent::{LoopConfig, ReasoningLoop};
use crate::config::AppConfig;
use crate::conversational::Advisor;
use crate::financial_path::FinancialPathPlanner;
use crate::gemini::GeminiClient;
use crate::llm::{ChatModel, RetryPolicy};
use crate::market::YahooMarketData;
use crate::memory::{session_uuid, SessionStore};
use crate::models::{AgentResponse, RiskProfile};
use crate::tools::{create_default_registry, ToolRegistry};

/// Extra time the HTTP layer allows a reasoning session on top of its own budget
const AGENT_DEADLINE_GRACE: Duration = Duration::from_secs(5);

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub advisor: Arc<Advisor>,
    pub agent: Arc<ReasoningLoop>,
    pub planner: Arc<FinancialPathPlanner>,
    pub sessions: Arc<SessionStore>,
    pub agent_deadline: Duration,
}

impl ApiState {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<ToolRegistry>, config: &AppConfig) -> Self {
        let loop_config = LoopConfig::from_config(config);
        let retry = loop_config.retry.clone();

        Self {
            advisor: Arc::new(Advisor::new(Arc::clone(&model), retry.clone())),
            planner: Arc::new(FinancialPathPlanner::new(Arc::clone(&model), retry)),
            agent: Arc::new(ReasoningLoop::new(model, tools, loop_config)),
            sessions: Arc::new(
                SessionStore::new(config.chat_max_messages, config.chat_session_ttl)
                    .with_max_sessions(config.chat_max_sessions),
            ),
            agent_deadline: config.max_execution_time + AGENT_DEADLINE_GRACE,
        }
    }

    /// Production wiring: Gemini for the model, Yahoo Finance for market data.
    pub fn from_config(config: &AppConfig) -> crate::Result<Self> {
        let model: Arc<dyn ChatModel> = Arc::new(GeminiClient::from_config(config)?);
        let tools = Arc::new(create_default_registry(
            config,
            Arc::new(YahooMarketData::new()),
        )?);

        info!(
            model = %config.gemini_model,
            tools = tools.len(),
            "API state initialized"
        );

        Ok(Self::new(model, tools, config))
    }
}

/// =============================
/// Form Extraction
/// =============================

/// Text fields of a urlencoded, multipart or JSON body.
///
/// Never rejects: an unreadable body yields no fields, and the handler
/// reports the missing field itself.
#[derive(Debug, Default)]
pub struct FormFields(pub HashMap<String, String>);

impl FormFields {
    /// Trimmed, non-empty value of a field
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

#[async_trait]
impl<S> FromRequest<S> for FormFields
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let mut fields = HashMap::new();

        if content_type.starts_with("multipart/form-data") {
            if let Ok(mut multipart) = Multipart::from_request(req, state).await {
                while let Ok(Some(field)) = multipart.next_field().await {
                    let Some(name) = field.name().map(str::to_string) else {
                        continue;
                    };
                    if let Ok(value) = field.text().await {
                        fields.insert(name, value);
                    }
                }
            }
        } else if content_type.starts_with("application/json") {
            if let Ok(Json(body)) = Json::<HashMap<String, Value>>::from_request(req, state).await {
                for (name, value) in body {
                    let text = match value {
                        Value::String(s) => s,
                        Value::Null => continue,
                        other => other.to_string(),
                    };
                    fields.insert(name, text);
                }
            }
        } else if let Ok(Form(body)) = Form::<HashMap<String, String>>::from_request(req, state).await
        {
            fields = body;
        }

        Ok(Self(fields))
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": message.into(),
            "status": "error"
        })),
    )
        .into_response()
}

fn missing_input() -> Response {
    error_response(StatusCode::BAD_REQUEST, "No input provided")
}

/// =============================
/// Health Endpoints
/// =============================

async fn home() -> Json<&'static str> {
    Json("HI")
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Agent Endpoint
/// =============================

async fn agent_handler(State(state): State<ApiState>, fields: FormFields) -> Response {
    let Some(input) = fields.get("input") else {
        return missing_input();
    };

    info!(query = %input, "Received agent query");

    // First try a direct model answer
    match state.advisor.direct_answer(input, None).await {
        Ok(output) => return Json(AgentResponse::direct(output)).into_response(),
        Err(e) => warn!(error = %e, "Direct answer failed, falling back to agent"),
    }

    match tokio::time::timeout(state.agent_deadline, state.agent.run(input)).await {
        Ok(Ok(outcome)) => match outcome.answer {
            Some(answer) if outcome.is_complete() => {
                Json(AgentResponse::from_agent(answer, outcome.trace)).into_response()
            }
            _ => {
                warn!(stop = ?outcome.stop, "Agent stopped without a final answer");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Could not extract response from agent",
                        "raw_output": outcome.trace,
                        "stop_reason": outcome.stop,
                        "status": "error"
                    })),
                )
                    .into_response()
            }
        },
        Ok(Err(e)) => {
            error!(error = %e, "Agent processing failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Agent processing failed: {}", e),
            )
        }
        Err(_) => {
            error!(deadline = ?state.agent_deadline, "Agent exceeded its deadline");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!(
                    "Agent processing failed: no answer within {}s",
                    state.agent_deadline.as_secs()
                ),
            )
        }
    }
}

/// =============================
/// Financial Path Endpoint
/// =============================

async fn financial_path_handler(State(state): State<ApiState>, fields: FormFields) -> Response {
    let Some(input) = fields.get("input") else {
        return missing_input();
    };
    let risk = fields.get("risk").map(RiskProfile::parse).unwrap_or_default();

    match state.planner.plan(input, risk).await {
        Ok(graph) => Json(graph).into_response(),
        Err(e) => {
            error!(error = %e, "Financial path generation failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
        }
    }
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(State(state): State<ApiState>, fields: FormFields) -> Response {
    let Some(input) = fields.get("input") else {
        return missing_input();
    };
    let session_id = session_uuid(fields.get("session_id"));

    match state.advisor.chat(&state.sessions, session_id, input).await {
        Ok(reply) => Json(json!({
            "output": reply.output,
            "session_id": reply.session_id,
            "status": "success"
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, %session_id, "Chat turn failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Chat processing failed: {}", e),
            )
        }
    }
}

/// =============================
/// Onboarding Data
/// =============================

/// Placeholder for a bank account aggregator feed
async fn bank_data() -> Json<Value> {
    Json(json!({
        "assets": [
            {
                "Name": "SBI Savings Account",
                "Type": "Cash",
                "Value": "10000",
                "DateUpdated": "2020-01-01"
            },
            {
                "liabilities": [
                    {
                        "Name": "SBI Car Loan",
                        "Type": "Loan",
                        "Value": "500000",
                        "DateUpdated": "2020-01-01"
                    }
                ]
            }
        ]
    }))
}

/// Placeholder for a mutual fund holdings feed
async fn mf_data() -> Json<Value> {
    Json(json!({
        "assets": [
            {
                "Name": "Nippon India Large Cap Fund Direct Growth",
                "Type": "Mutual Fund",
                "Value": "54962",
                "DateUpdated": "2020-01-01",
                "Quantity": "124.34"
            },
            {
                "Name": "Axis Bluechip Fund Direct Growth",
                "Type": "Mutual Fund",
                "Value": "33515",
                "DateUpdated": "2020-01-01",
                "Quantity": "67.03"
            },
            {
                "Name": "ICICI Prudential Bluechip Fund Direct Growth",
                "Type": "Mutual Fund",
                "Value": "36742",
                "DateUpdated": "2020-01-01",
                "Quantity": "58.79"
            }
        ]
    }))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");

    error!(detail, "Request handler panicked");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("An unexpected error occurred: {}", detail),
    )
}

/// =============================
/// Router Setup
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/agent", post(agent_handler))
        .route("/ai-financial-path", post(financial_path_handler))
        .route("/chat", post(chat_handler))
        .route("/auto-bank-data", get(bank_data))
        .route("/auto-mf-data", get(mf_data))
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
