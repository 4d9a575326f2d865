use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::agent::AssistantReply;
use crate::crm::{self, Lead, LeadQuery, LeadStatus, NewLead};
use crate::engine::{WorkflowContext, WorkflowSummary, get_workflow_summary};
use crate::llm::ChatMessage;

use super::AppState;
use super::errors::AppError;

// --- Request/Response types ---

#[derive(Serialize)]
pub struct WorkflowResponse {
    pub success: bool,
    pub summary: WorkflowSummary,
    pub context: WorkflowContext,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListLeadsQuery {
    pub query: Option<String>,
    pub status: Option<String>,
    pub min_score: Option<u8>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
}

#[derive(Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// --- Handlers ---

/// POST /api/workflows/lead-processing
pub async fn run_lead_workflow(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<WorkflowResponse>, AppError> {
    let lead_id = body
        .get("leadId")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("leadId is required".to_string()))?;

    info!(lead_id = %lead_id, "Workflow triggered over HTTP");
    let context = state
        .workflow
        .trigger(lead_id, state.workflow_timeout)
        .await?;

    Ok(Json(WorkflowResponse {
        success: context.is_success(),
        summary: get_workflow_summary(&context),
        context,
    }))
}

/// GET /api/leads
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListLeadsQuery>,
) -> Result<Json<Value>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<LeadStatus>)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let leads = state
        .store
        .list_leads(&LeadQuery {
            query: params.query,
            status,
            min_score: params.min_score,
            limit: params.limit,
        })
        .await?;

    Ok(Json(json!({
        "count": leads.len(),
        "leads": leads,
    })))
}

/// POST /api/leads
pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    Json(new_lead): Json<NewLead>,
) -> Result<(StatusCode, Json<Lead>), AppError> {
    let lead = crm::create_lead(state.store.as_ref(), new_lead).await?;
    Ok((StatusCode::CREATED, Json(lead)))
}

/// GET /api/leads/{id}
pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<crm::LeadDetail>, AppError> {
    crm::lead_detail(state.store.as_ref(), &id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Lead '{}' not found", id)))
}

/// POST /api/agent
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatBody>,
) -> Result<Json<AssistantReply>, AppError> {
    if body.messages.is_empty() {
        return Err(AppError::BadRequest("Invalid messages".to_string()));
    }

    let history: Vec<ChatMessage> = body
        .messages
        .into_iter()
        .map(|m| match m.role.as_str() {
            "assistant" => ChatMessage::assistant(m.content),
            _ => ChatMessage::user(m.content),
        })
        .collect();

    info!(messages = history.len(), "Assistant request");
    let reply = state.assistant.respond(history).await?;
    Ok(Json(reply))
}

/// GET /api/agent/tools
pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<Value> {
    let tools: Vec<ToolInfo> = state
        .assistant
        .tools()
        .specs()
        .into_iter()
        .map(|spec| ToolInfo {
            name: spec.name,
            description: spec.description,
            parameters: spec.parameters,
        })
        .collect();

    let total = tools.len();
    Json(json!({
        "tools": tools,
        "total": total,
    }))
}

/// POST /api/agent/tools/{name}
pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Option<Json<Value>>,
) -> Result<Json<Value>, AppError> {
    let tool = state
        .assistant
        .tools()
        .get(&name)
        .ok_or_else(|| AppError::NotFound(format!("Tool '{}' not found", name)))?;

    let args = body.map(|Json(v)| v).unwrap_or(Value::Null);
    let result = tool.call(args).await?;
    Ok(Json(result))
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
