//! Built-in tool implementations for stratagem.
//!
//! Tools give the strategies access to the outside world: an encyclopedia
//! lookup, web search through a search-capable model, arithmetic and the
//! clock. Every tool maps `(input, context) → text` and never fails.

pub mod calculator;
pub mod clock;
pub mod knowledge_lookup;
pub mod web_search;

use std::sync::Arc;

use stratagem_config::AppConfig;
use stratagem_core::tool::ToolRegistry;
use stratagem_providers::LlmClient;

pub use knowledge_lookup::{KnowledgeLookupTool, SearchHit, SearchIndex, WikipediaIndex};

/// Create the default tool registry with all built-in tools.
pub fn default_registry(llm: &LlmClient, config: &AppConfig) -> ToolRegistry {
    let knowledge = Arc::new(KnowledgeLookupTool::from_config(&config.knowledge));
    registry_with_knowledge(llm, &config.search_model, knowledge)
}

/// Build the registry around a given knowledge lookup (custom index, tests).
pub fn registry_with_knowledge(
    llm: &LlmClient,
    search_model: &str,
    knowledge: Arc<KnowledgeLookupTool>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(web_search::WebSearchTool::new(
        llm.clone(),
        search_model,
        knowledge.clone(),
    )));
    registry.register(Box::new(SharedKnowledge(knowledge)));
    registry.register(Box::new(calculator::CalculatorTool));
    registry.register(Box::new(clock::ClockTool));
    registry
}

/// Lets the registry and the web search fallback share one lookup.
struct SharedKnowledge(Arc<KnowledgeLookupTool>);

#[async_trait::async_trait]
impl stratagem_core::Tool for SharedKnowledge {
    fn kind(&self) -> stratagem_core::ToolKind {
        self.0.kind()
    }

    fn description(&self) -> &str {
        self.0.description()
    }

    async fn execute(
        &self,
        input: &str,
        ctx: &stratagem_core::ToolContext,
    ) -> stratagem_core::ToolOutput {
        self.0.execute(input, ctx).await
    }
}
