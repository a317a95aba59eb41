//! Runs several strategies side by side on one question.
//!
//! ```text
//!            question
//!               │
//!   ┌───────┬───┴───┬────────────┐
//!   ▼       ▼       ▼            ▼
//!  CoT    ReAct   ReWOO    Plan-Execute   ← concurrent, one task
//!   │       │       │            │
//!   └───────┴───┬───┴────────────┘
//!               ▼
//!       ComparisonReport
//! ```
//!
//! Engines share only the credential and the cancellation token. A fatal
//! error in one engine becomes that engine's failed result; siblings are
//! unaffected.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use stratagem_config::AppConfig;
use stratagem_core::tool::ToolRegistry;
use stratagem_providers::LlmClient;
use tracing::{info, warn};

use crate::patterns::{CotEngine, PlanExecuteEngine, ReactEngine, RewooEngine, RunOptions, Strategy};
use crate::result::{StrategyKind, StrategyResult};
use crate::stream_event::ProgressEvent;

/// A progress event labelled with the engine that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedEvent {
    pub strategy: StrategyKind,
    pub event: ProgressEvent,
}

/// Every requested strategy's result, in request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub question: String,
    pub results: Vec<StrategyResult>,
}

impl ComparisonReport {
    pub fn result(&self, kind: StrategyKind) -> Option<&StrategyResult> {
        self.results
            .iter()
            .find(|r| r.framework == kind.display_name())
    }

    pub fn total_llm_calls(&self) -> u32 {
        self.results.iter().map(|r| r.llm_calls).sum()
    }
}

/// Holds one engine per strategy kind.
#[derive(Default)]
pub struct Orchestrator {
    engines: BTreeMap<StrategyKind, Box<dyn Strategy>>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// All four engines, configured from `config`.
    pub fn from_config(config: &AppConfig, llm: LlmClient, tools: Arc<ToolRegistry>) -> Self {
        let mut orchestrator = Self::new();
        orchestrator.register(Box::new(CotEngine::new(llm.clone(), config.cot.clone())));
        orchestrator.register(Box::new(ReactEngine::new(
            llm.clone(),
            tools.clone(),
            config.react.clone(),
        )));
        orchestrator.register(Box::new(RewooEngine::new(
            llm.clone(),
            tools.clone(),
            config.rewoo.clone(),
        )));
        orchestrator.register(Box::new(PlanExecuteEngine::new(
            llm,
            tools,
            config.plan_execute.clone(),
        )));
        orchestrator
    }

    /// Replaces any engine of the same kind.
    pub fn register(&mut self, engine: Box<dyn Strategy>) {
        self.engines.insert(engine.kind(), engine);
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.engines.keys().copied().collect()
    }

    async fn run_tagged(
        &self,
        kind: StrategyKind,
        question: &str,
        opts: &RunOptions,
        sink: &(dyn Fn(TaggedEvent) + Send + Sync),
    ) -> StrategyResult {
        let started = Instant::now();
        let Some(engine) = self.engines.get(&kind) else {
            return StrategyResult::failed(kind, format!("Strategy '{kind}' is not registered"), 0);
        };

        let tagged = |event: ProgressEvent| {
            sink(TaggedEvent {
                strategy: kind,
                event,
            })
        };

        match engine.run(question, opts, &tagged).await {
            Ok(result) => result,
            Err(e) => {
                warn!(strategy = %kind, error = %e, "Strategy failed");
                StrategyResult::failed(kind, e.to_string(), started.elapsed().as_millis() as u64)
            }
        }
    }

    /// Run `kinds` concurrently and collect their results in request order.
    pub async fn compare(
        &self,
        question: &str,
        kinds: &[StrategyKind],
        opts: &RunOptions,
        sink: &(dyn Fn(TaggedEvent) + Send + Sync),
    ) -> ComparisonReport {
        info!(strategies = kinds.len(), model = %opts.model, "Comparison starting");

        let results = join_all(
            kinds
                .iter()
                .map(|kind| self.run_tagged(*kind, question, opts, sink)),
        )
        .await;

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(succeeded, total = results.len(), "Comparison finished");

        ComparisonReport {
            question: question.to_string(),
            results,
        }
    }
}
