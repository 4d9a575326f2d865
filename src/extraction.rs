use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::{ChatMessage, ChatModel, ChatRequest, StructuredOutput, extract_json_object};

/// Which profile site a page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileSource {
    LinkedIn,
    Twitter,
}

impl ProfileSource {
    pub fn label(self) -> &'static str {
        match self {
            ProfileSource::LinkedIn => "LinkedIn",
            ProfileSource::Twitter => "X/Twitter",
        }
    }
}

/// What an extraction call is for. Carried on every request so test doubles
/// can answer per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionTask {
    Profile(ProfileSource),
    Contact,
    Enrichment,
    Scoring,
}

/// Confidence label attached to extracted results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    #[default]
    Low,
}

impl Confidence {
    /// Read a confidence field, falling back to `default` when absent or unknown.
    pub fn from_output(output: &StructuredOutput, key: &str, default: Confidence) -> Self {
        match output.str_field(key).map(|s| s.to_ascii_lowercase()).as_deref() {
            Some("high") => Confidence::High,
            Some("medium") => Confidence::Medium,
            Some("low") => Confidence::Low,
            _ => default,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub task: ExtractionTask,
    /// Extraction rules and the JSON shape expected back.
    pub instructions: String,
    /// The unstructured text to extract from.
    pub content: String,
    pub temperature: f64,
}

/// Turns unstructured text into a structured JSON object.
#[async_trait]
pub trait Extraction: Send + Sync {
    /// Errors mean the call itself failed; a reply without usable JSON is
    /// `StructuredOutput::ParseFailed`.
    async fn extract(&self, request: ExtractionRequest) -> Result<StructuredOutput>;
}

/// Extraction backed by a chat model constrained to answer with one JSON object.
pub struct LlmExtraction {
    model: Arc<dyn ChatModel>,
}

impl LlmExtraction {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Extraction for LlmExtraction {
    async fn extract(&self, request: ExtractionRequest) -> Result<StructuredOutput> {
        let system = format!(
            "{}\n\nRespond with a single JSON object and nothing else.",
            request.instructions
        );
        let chat = ChatRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(request.content),
        ])
        .temperature(request.temperature);

        let reply = self.model.chat(chat).await?;
        let output = extract_json_object(reply.text_or_empty());
        debug!(task = ?request.task, parsed = output.is_parsed(), "extraction finished");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatReply;
    use serde_json::json;

    struct Canned(&'static str);

    #[async_trait]
    impl ChatModel for Canned {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
            assert_eq!(request.messages[0].role, "system");
            assert_eq!(request.messages[1].content.as_deref(), Some("text"));
            Ok(ChatReply::text(self.0))
        }
    }

    fn request() -> ExtractionRequest {
        ExtractionRequest {
            task: ExtractionTask::Scoring,
            instructions: "Score it".into(),
            content: "text".into(),
            temperature: 0.3,
        }
    }

    #[tokio::test]
    async fn llm_extraction_parses_embedded_object() {
        let extraction = LlmExtraction::new(Arc::new(Canned("Result: {\"score\": 91} done")));
        let out = extraction.extract(request()).await.unwrap();
        assert_eq!(out.value(), Some(&json!({"score": 91})));
    }

    #[tokio::test]
    async fn llm_extraction_reports_parse_failure() {
        let extraction = LlmExtraction::new(Arc::new(Canned("no json here")));
        assert!(!extraction.extract(request()).await.unwrap().is_parsed());
    }

    #[test]
    fn confidence_defaults_when_unknown() {
        let out = extract_json_object(r#"{"confidence": "HIGH", "other": "certain"}"#);
        assert_eq!(Confidence::from_output(&out, "confidence", Confidence::Low), Confidence::High);
        assert_eq!(Confidence::from_output(&out, "other", Confidence::Medium), Confidence::Medium);
    }
}
