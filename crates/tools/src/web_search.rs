//! Web search tool — asks a search-capable model, falls back to the
//! knowledge lookup.
//!
//! The raw query is the entire prompt. Without a credential, or on any
//! failure of the model call, the same query goes to the knowledge lookup
//! instead. The fallback is silent: callers only ever see search text.

use std::sync::Arc;

use async_trait::async_trait;
use stratagem_core::error::LlmError;
use stratagem_core::message::Message;
use stratagem_core::tool::{Tool, ToolContext, ToolKind, ToolOutput};
use stratagem_providers::{CompletionOptions, LlmClient};
use tracing::{debug, warn};

use crate::knowledge_lookup::KnowledgeLookupTool;

pub struct WebSearchTool {
    llm: LlmClient,
    model: String,
    fallback: Arc<KnowledgeLookupTool>,
}

impl WebSearchTool {
    pub fn new(llm: LlmClient, model: impl Into<String>, fallback: Arc<KnowledgeLookupTool>) -> Self {
        Self {
            llm,
            model: model.into(),
            fallback,
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn kind(&self) -> ToolKind {
        ToolKind::WebSearch
    }

    fn description(&self) -> &str {
        "Search the web for current information. Input: a natural-language search query"
    }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolOutput {
        if ctx.credential.is_none() {
            debug!("No credential for web search, using knowledge lookup");
            return ToolOutput::text(self.fallback.lookup(input).await);
        }

        let opts = CompletionOptions::new(self.model.clone())
            .with_credential(ctx.credential.clone())
            .with_cancel(ctx.cancel.clone());

        match self.llm.complete(&[Message::user(input)], &opts).await {
            Ok(completion) => ToolOutput {
                text: completion.text,
                llm_calls: 1,
                usage: completion.usage,
            },
            Err(LlmError::Cancelled) => ToolOutput::text(format!("Error: {}", LlmError::Cancelled)),
            Err(e) => {
                warn!(model = %self.model, error = %e, "Web search failed, falling back to knowledge lookup");
                // The failed call was still issued.
                ToolOutput {
                    llm_calls: 1,
                    ..ToolOutput::text(self.fallback.lookup(input).await)
                }
            }
        }
    }
}
