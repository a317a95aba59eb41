//! Reasoning strategies.
//!
//! 1. **CoT / Self-Consistency** — N sampled reasoning paths, then a vote or a synthesis
//! 2. **ReAct** — Thought → Action → Observation loop
//! 3. **ReWOO** — plan every tool call up front, execute, then solve once
//! 4. **Plan-Execute** — plan, execute one step at a time, replan after each
//!
//! Every engine implements [`Strategy`]. A run never fails for convergence
//! or tool problems: those come back inside the [`StrategyResult`]. A fatal
//! model error ends the run with its error text and the calls already made.
//! Cancellation yields a partial result marked `cancelled`. The orchestrator
//! still turns any `Err` from a strategy into a failed result.

pub mod cot;
pub mod plan_execute;
pub mod react;
pub mod rewoo;

pub use cot::CotEngine;
pub use plan_execute::PlanExecuteEngine;
pub use react::ReactEngine;
pub use rewoo::RewooEngine;

use async_trait::async_trait;
use stratagem_core::Result;
use stratagem_core::provider::Credential;
use stratagem_core::tool::ToolContext;
use stratagem_providers::CompletionOptions;
use tokio_util::sync::CancellationToken;

use crate::result::{StrategyKind, StrategyResult};
use crate::stream_event::ProgressSink;

/// Per-run options shared by every engine.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Read-only credential for every model call and model-backed tool.
    pub credential: Option<Credential>,
    pub model: String,
    /// Shared by every engine of one comparison.
    pub cancel: CancellationToken,
}

impl RunOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            credential: None,
            model: model.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn completion(&self, temperature: f32, max_tokens: u32) -> CompletionOptions {
        CompletionOptions::new(self.model.clone())
            .with_credential(self.credential.clone())
            .with_temperature(temperature)
            .with_max_tokens(max_tokens)
            .with_cancel(self.cancel.clone())
    }

    pub(crate) fn tool_context(&self) -> ToolContext {
        ToolContext {
            credential: self.credential.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// `Err(Cancelled)` once the token fired; checked after tool calls.
    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(stratagem_core::LlmError::Cancelled.into());
        }
        Ok(())
    }
}

/// The common engine entry point.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn run(
        &self,
        question: &str,
        opts: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<StrategyResult>;
}

#[cfg(test)]
pub(crate) mod test_helpers;
