use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::crm::{ActivityQuery, ActivityType, LeadQuery, LeadStatus, lead_detail};
use crate::engine::LeadWorkflow;
use crate::storage::RecordStore;

use super::{Tool, ToolRegistry};

const DEFAULT_SEARCH_LIMIT: usize = 10;
const RECENT_WORKFLOW_ACTIVITY_LIMIT: usize = 10;
const STATS_WINDOW_DAYS: i64 = 7;
/// Subject fragment of the activity written when a workflow run completes.
const COMPLETED_MARKER: &str = "Workflow Completed";

/// Register the six CRM tools.
pub fn register_all(
    registry: &mut ToolRegistry,
    store: Arc<dyn RecordStore>,
    workflow: Arc<LeadWorkflow>,
) {
    registry.register(Arc::new(SearchLeadsTool {
        store: store.clone(),
    }));
    registry.register(Arc::new(GetLeadStatusTool {
        store: store.clone(),
    }));
    registry.register(Arc::new(ProcessLeadTool { workflow }));
    registry.register(Arc::new(GetWorkflowStatusTool {
        store: store.clone(),
    }));
    registry.register(Arc::new(ListAgentsTool));
    registry.register(Arc::new(GetCrmStatsTool { store }));
}

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, args: Value) -> Result<T> {
    // Models send `null` or nothing for argument-less calls.
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).with_context(|| format!("Invalid arguments for {}", tool))
}

fn no_parameters() -> Value {
    json!({"type": "object", "properties": {}})
}

// --- search_leads ---

pub struct SearchLeadsTool {
    store: Arc<dyn RecordStore>,
}

#[async_trait]
impl Tool for SearchLeadsTool {
    fn name(&self) -> &str {
        "search_leads"
    }

    fn description(&self) -> &str {
        "Search for leads in the CRM. Use this to find leads by name, company, title, status, or other criteria."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query to filter leads by name, company, title, or research summary"},
                "limit": {"type": "number", "description": "Maximum number of leads to return (default: 10)"},
                "status": {"type": "string", "enum": ["new", "researching", "nurturing", "qualified", "contacted"], "description": "Filter by lead status"},
                "minScore": {"type": "number", "description": "Minimum lead quality score (0-100)"}
            }
        })
    }

    async fn call(&self, args: Value) -> Result<Value> {
        let mut query: LeadQuery = parse_args(self.name(), args)?;
        query.limit = Some(query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT));

        let leads = self.store.list_leads(&query).await?;
        Ok(json!({
            "success": true,
            "count": leads.len(),
            "leads": leads,
        }))
    }
}

// --- get_lead_status ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeadIdArgs {
    lead_id: String,
}

pub struct GetLeadStatusTool {
    store: Arc<dyn RecordStore>,
}

#[async_trait]
impl Tool for GetLeadStatusTool {
    fn name(&self) -> &str {
        "get_lead_status"
    }

    fn description(&self) -> &str {
        "Get detailed status and information about a specific lead by their ID. Returns lead details, score, status, research summary, and recent activities."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "leadId": {"type": "string", "description": "The UUID of the lead to retrieve"}
            },
            "required": ["leadId"]
        })
    }

    async fn call(&self, args: Value) -> Result<Value> {
        let args: LeadIdArgs = parse_args(self.name(), args)?;
        match lead_detail(self.store.as_ref(), &args.lead_id).await? {
            Some(detail) => Ok(json!({
                "success": true,
                "lead": detail.lead,
                "recentActivities": detail.recent_activities,
            })),
            None => Ok(json!({"success": false, "error": "Lead not found"})),
        }
    }
}

// --- process_lead ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessLeadArgs {
    lead_ids: Vec<String>,
}

pub struct ProcessLeadTool {
    workflow: Arc<LeadWorkflow>,
}

#[async_trait]
impl Tool for ProcessLeadTool {
    fn name(&self) -> &str {
        "process_lead"
    }

    fn description(&self) -> &str {
        "Trigger the automated lead processing workflow for one or more leads. This will enrich the lead with research, calculate a quality score, and update their status."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "leadIds": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Array of lead UUIDs to process through the workflow"
                }
            },
            "required": ["leadIds"]
        })
    }

    async fn call(&self, args: Value) -> Result<Value> {
        let args: ProcessLeadArgs = parse_args(self.name(), args)?;

        let mut results = Vec::with_capacity(args.lead_ids.len());
        for lead_id in &args.lead_ids {
            let ctx = self.workflow.execute(lead_id).await;
            results.push(json!({
                "leadId": lead_id,
                "success": ctx.is_success(),
                "status": ctx.current_state,
                "score": ctx.score,
                "newStatus": ctx.new_status,
                "error": ctx.error,
            }));
        }

        Ok(json!({
            "success": true,
            "processed": results.len(),
            "results": results,
        }))
    }
}

// --- get_workflow_status ---

pub struct GetWorkflowStatusTool {
    store: Arc<dyn RecordStore>,
}

#[async_trait]
impl Tool for GetWorkflowStatusTool {
    fn name(&self) -> &str {
        "get_workflow_status"
    }

    fn description(&self) -> &str {
        "Get information about available AI workflows and their recent activity. Shows workflow stats and recent executions."
    }

    fn parameters(&self) -> Value {
        no_parameters()
    }

    async fn call(&self, _args: Value) -> Result<Value> {
        let recent = self
            .store
            .list_activities(&ActivityQuery {
                activity_type: Some(ActivityType::AgentAction),
                limit: Some(RECENT_WORKFLOW_ACTIVITY_LIMIT),
                ..ActivityQuery::default()
            })
            .await?;
        let completed = self
            .store
            .list_activities(&ActivityQuery {
                activity_type: Some(ActivityType::AgentAction),
                subject_contains: Some(COMPLETED_MARKER.to_string()),
                ..ActivityQuery::default()
            })
            .await?;

        Ok(json!({
            "success": true,
            "workflows": [{
                "name": "lead-processing",
                "description": "Automated lead enrichment, scoring, and status updates",
                "status": "active",
                "totalProcessed": completed.len(),
            }],
            "recentActivities": recent,
        }))
    }
}

// --- list_agents ---

pub struct ListAgentsTool;

#[async_trait]
impl Tool for ListAgentsTool {
    fn name(&self) -> &str {
        "list_agents"
    }

    fn description(&self) -> &str {
        "Get information about available AI agents in the CRM system and their capabilities."
    }

    fn parameters(&self) -> Value {
        no_parameters()
    }

    async fn call(&self, _args: Value) -> Result<Value> {
        Ok(json!({
            "success": true,
            "agents": [
                {
                    "name": "Lead Enrichment Agent",
                    "type": "enrichment",
                    "description": "Researches leads using web search and AI to gather insights, pain points, and buying signals",
                    "capabilities": [
                        "Web research",
                        "LinkedIn profile analysis",
                        "Pain point identification",
                        "Buying signal detection"
                    ],
                    "status": "active"
                },
                {
                    "name": "Lead Scoring Agent",
                    "type": "scoring",
                    "description": "Analyzes lead quality and assigns scores based on multiple factors",
                    "capabilities": [
                        "Quality scoring (0-100)",
                        "Status recommendation",
                        "Engagement analysis"
                    ],
                    "status": "active"
                }
            ]
        }))
    }
}

// --- get_crm_stats ---

pub struct GetCrmStatsTool {
    store: Arc<dyn RecordStore>,
}

#[async_trait]
impl Tool for GetCrmStatsTool {
    fn name(&self) -> &str {
        "get_crm_stats"
    }

    fn description(&self) -> &str {
        "Get overall CRM statistics including lead counts, average scores, and recent activity metrics."
    }

    fn parameters(&self) -> Value {
        no_parameters()
    }

    async fn call(&self, _args: Value) -> Result<Value> {
        let leads = self.store.list_leads(&LeadQuery::default()).await?;

        let mut by_status: BTreeMap<LeadStatus, usize> = BTreeMap::new();
        for lead in &leads {
            *by_status.entry(lead.status).or_default() += 1;
        }
        let by_status: BTreeMap<&str, usize> =
            by_status.into_iter().map(|(s, n)| (s.as_str(), n)).collect();

        let average_score = if leads.is_empty() {
            0
        } else {
            let total: u64 = leads.iter().map(|l| u64::from(l.score)).sum();
            (total as f64 / leads.len() as f64).round() as u64
        };

        let companies = self.store.count_companies().await?;
        let recent = self
            .store
            .list_activities(&ActivityQuery {
                since: Some(Utc::now() - Duration::days(STATS_WINDOW_DAYS)),
                ..ActivityQuery::default()
            })
            .await?;

        Ok(json!({
            "success": true,
            "stats": {
                "totalLeads": leads.len(),
                "leadsByStatus": by_status,
                "averageScore": average_score,
                "totalCompanies": companies,
                "recentActivityCount": recent.len(),
            }
        }))
    }
}
