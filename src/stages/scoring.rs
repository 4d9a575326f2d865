use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::crm::{Lead, LeadPatch, filled};
use crate::engine::types::{EnrichmentData, StageEffect, WorkflowContext, WorkflowState};
use crate::extraction::{Extraction, ExtractionRequest, ExtractionTask};
use crate::llm::StructuredOutput;
use crate::storage::RecordStore;

use super::{Stage, require_lead};

pub const DEFAULT_SCORE: u8 = 50;
const DEFAULT_REASONING: &str = "Default score assigned";

const INSTRUCTIONS: &str = "You are a lead scoring expert. Analyze the lead data and assign a \
quality score from 0 to 100. Consider company fit, contact information quality, pain points \
(more = higher), buying signals (more = higher) and engagement indicators.\n\
JSON shape: {\"score\": integer, \"reasoning\": string}";

/// Clamp any numeric score into 0..=100. Non-finite input gets the default.
pub fn clamp_score(raw: f64) -> u8 {
    if !raw.is_finite() {
        return DEFAULT_SCORE;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

/// Score and reasoning from the model reply. Missing, non-numeric or
/// unparseable scores fall back to 50.
pub fn parse_score(output: &StructuredOutput) -> (u8, String) {
    let Some(value) = output.value() else {
        return (DEFAULT_SCORE, DEFAULT_REASONING.to_string());
    };

    let score = match value.get("score") {
        Some(Value::Number(n)) => n.as_f64().map(clamp_score),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().map(clamp_score),
        _ => None,
    };
    let reasoning = output
        .str_field("reasoning")
        .unwrap_or_else(|| DEFAULT_REASONING.to_string());

    match score {
        Some(score) => (score, reasoning),
        None => (DEFAULT_SCORE, DEFAULT_REASONING.to_string()),
    }
}

fn joined_or(items: Option<&Vec<String>>, fallback: &str) -> String {
    match items.filter(|v| !v.is_empty()) {
        Some(v) => v.join(", "),
        None => fallback.to_string(),
    }
}

fn scoring_prompt(lead: &Lead, enrichment: Option<&EnrichmentData>) -> String {
    format!(
        "Lead Data:\nName: {}\nTitle: {}\nCompany: {}\nEmail: {}\nPain Points: {}\nBuying Signals: {}\nResearch Summary: {}\n\nCalculate a lead quality score (0-100).",
        lead.full_name(),
        filled(&lead.title).unwrap_or("Unknown"),
        filled(&lead.company_name).unwrap_or("Unknown"),
        filled(&lead.email).unwrap_or(""),
        joined_or(enrichment.map(|e| &e.pain_points), "Not analyzed"),
        joined_or(enrichment.map(|e| &e.buying_signals), "Not analyzed"),
        enrichment
            .map(|e| e.research_summary.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("Not available"),
    )
}

/// Asks the model for a 0-100 quality score and persists it.
pub struct ScoringStage {
    store: Arc<dyn RecordStore>,
    extraction: Arc<dyn Extraction>,
}

impl ScoringStage {
    pub fn new(store: Arc<dyn RecordStore>, extraction: Arc<dyn Extraction>) -> Self {
        Self { store, extraction }
    }
}

#[async_trait]
impl Stage for ScoringStage {
    fn state(&self) -> WorkflowState {
        WorkflowState::Scoring
    }

    async fn run(&self, ctx: &WorkflowContext) -> Result<StageEffect> {
        let lead = require_lead(ctx)?;
        let output = self
            .extraction
            .extract(ExtractionRequest {
                task: ExtractionTask::Scoring,
                instructions: INSTRUCTIONS.to_string(),
                content: scoring_prompt(lead, ctx.enrichment_data.as_ref()),
                temperature: 0.3,
            })
            .await?;

        if !output.is_parsed() {
            warn!(lead_id = %lead.id, "Scoring reply had no JSON, using default score");
        }
        let (score, reasoning) = parse_score(&output);

        let patch = LeadPatch {
            score: Some(score),
            ..LeadPatch::default()
        };
        let updated = self.store.update_lead(&lead.id, &patch).await?;
        info!(lead_id = %lead.id, score, "Lead scored");

        Ok(StageEffect {
            score: Some(score),
            ..StageEffect::output(json!({"score": score, "reasoning": reasoning})).with_lead(updated)
        })
    }

    /// The default score still feeds the status decision.
    fn fallback(&self, _ctx: &WorkflowContext) -> StageEffect {
        StageEffect {
            score: Some(DEFAULT_SCORE),
            ..StageEffect::default()
        }
    }
}
