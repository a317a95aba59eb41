//! Tool trait — the abstraction over the external lookups a strategy may use.
//!
//! The set of tools is closed: [`ToolKind`] enumerates every behaviorally
//! distinct tool and owns the name → kind mapping, aliases included. Tools
//! take a free-form text input and always answer with text; failures are
//! rendered as `"Error: ..."` strings rather than raised, so strategies can
//! reason about them inline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::provider::{Credential, Usage};

/// Every behaviorally distinct tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Encyclopedia search with a summary of the top hit.
    KnowledgeLookup,
    /// Search-capable model, falling back to the knowledge lookup.
    WebSearch,
    /// Arithmetic expression evaluator.
    Calculator,
    /// Current date and time.
    Clock,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::KnowledgeLookup,
        ToolKind::WebSearch,
        ToolKind::Calculator,
        ToolKind::Clock,
    ];

    /// Every name this tool answers to. The first entry is the primary name.
    pub fn names(&self) -> &'static [&'static str] {
        match self {
            ToolKind::KnowledgeLookup => &["wikipedia"],
            ToolKind::WebSearch => &["search", "websearch"],
            ToolKind::Calculator => &["calculate", "calculator"],
            ToolKind::Clock => &["current_datetime", "datetime"],
        }
    }

    pub fn primary_name(&self) -> &'static str {
        self.names()[0]
    }

    /// Case-insensitive lookup by name or alias.
    pub fn from_name(name: &str) -> Option<ToolKind> {
        let wanted = name.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.names().iter().any(|n| *n == wanted))
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.primary_name())
    }
}

/// Per-call context handed to every tool.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Credential for tools that call a model; read-only.
    pub credential: Option<Credential>,

    /// The run's shared cancellation token.
    pub cancel: CancellationToken,
}

/// The text produced by a tool, plus any model usage it incurred.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Result text; `"Error: ..."` / `"Calculation error: ..."` on failure.
    pub text: String,

    /// Model calls issued while executing the tool, failed ones included.
    pub llm_calls: u32,

    /// Usage of those calls.
    pub usage: Usage,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            llm_calls: 0,
            usage: Usage::default(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.text.starts_with("Error:")
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Which kind of tool this is (determines its names).
    fn kind(&self) -> ToolKind;

    /// A one-line description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// Execute the tool. Never fails: errors come back as text.
    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolOutput;
}

/// A registry of available tools, keyed by kind.
pub struct ToolRegistry {
    tools: BTreeMap<ToolKind, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool of the same kind.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.kind(), tool);
    }

    /// Resolve a tool by (case-insensitive) name or alias.
    pub fn resolve(&self, name: &str) -> std::result::Result<&dyn Tool, ToolError> {
        ToolKind::from_name(name)
            .and_then(|kind| self.tools.get(&kind))
            .map(|t| t.as_ref())
            .ok_or_else(|| ToolError::NotFound {
                name: name.trim().to_string(),
                available: self.names().join(", "),
            })
    }

    /// Dispatch by name. Unknown names come back as an `"Error: ..."` string.
    pub async fn execute(&self, name: &str, input: &str, ctx: &ToolContext) -> ToolOutput {
        match self.resolve(name) {
            Ok(tool) => tool.execute(input, ctx).await,
            Err(e) => {
                tracing::warn!(tool = %name, "Unknown tool requested");
                ToolOutput::text(format!("Error: {e}"))
            }
        }
    }

    /// Every registered name, aliases included.
    pub fn names(&self) -> Vec<&'static str> {
        self.tools
            .keys()
            .flat_map(|kind| kind.names().iter().copied())
            .collect()
    }

    /// One line per distinct tool, for inclusion in strategy prompts.
    pub fn descriptions(&self) -> String {
        self.tools
            .values()
            .map(|t| format!("- {}: {}", t.kind().primary_name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
