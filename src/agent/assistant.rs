use std::sync::Arc;

use anyhow::{Result, bail};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::llm::{ChatMessage, ChatModel, ChatRequest, ToolCall};

use super::ToolRegistry;

pub const MAX_TOOL_ROUNDS: usize = 8;
pub const ASSISTANT_TEMPERATURE: f64 = 0.7;

const SYSTEM_PROMPT: &str = "You are a CRM assistant for a sales team. Use the available tools to \
search leads, inspect a lead, run the lead processing workflow, and report CRM statistics. \
Answer concisely and refer to leads by name.";

/// One tool call the assistant made while answering.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
    pub result: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantReply {
    pub reply: String,
    pub tool_calls: Vec<ToolInvocation>,
}

/// Chat agent over the CRM tools: model, then tools, then model again, until
/// the model answers without requesting a tool.
pub struct CrmAssistant {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    max_rounds: usize,
}

impl CrmAssistant {
    pub fn new(model: Arc<dyn ChatModel>, tools: ToolRegistry) -> Self {
        Self {
            model,
            tools,
            max_rounds: MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer the last user turn of `history`.
    pub async fn respond(&self, history: Vec<ChatMessage>) -> Result<AssistantReply> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        messages.extend(history);

        let specs = self.tools.specs();
        let mut invocations = Vec::new();

        for round in 0..self.max_rounds {
            let request = ChatRequest::new(messages.clone())
                .temperature(ASSISTANT_TEMPERATURE)
                .tools(specs.clone());
            let reply = self.model.chat(request).await?;

            if reply.tool_calls.is_empty() {
                info!(rounds = round + 1, tools = invocations.len(), "Assistant answered");
                return Ok(AssistantReply {
                    reply: reply.text_or_empty().to_string(),
                    tool_calls: invocations,
                });
            }

            messages.push(ChatMessage::assistant_tool_calls(
                reply.content.clone(),
                reply.tool_calls.clone(),
            ));
            for call in reply.tool_calls {
                let result = self.invoke(&call).await;
                messages.push(ChatMessage::tool_result(&call.id, result.to_string()));
                invocations.push(ToolInvocation {
                    name: call.name,
                    arguments: call.arguments,
                    result,
                });
            }
        }

        bail!(
            "Assistant did not produce an answer within {} tool rounds",
            self.max_rounds
        )
    }

    /// Run one tool call. Failures are answered to the model, not raised.
    async fn invoke(&self, call: &ToolCall) -> Value {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "Model requested unknown tool");
            return json!({"success": false, "error": format!("Unknown tool: {}", call.name)});
        };
        debug!(tool = %call.name, "Calling tool");
        match tool.call(call.arguments.clone()).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %call.name, error = %format!("{:#}", e), "Tool call failed");
                json!({"success": false, "error": format!("{:#}", e)})
            }
        }
    }
}
