//! Strategy results — one immutable record per engine run.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use stratagem_core::error::LlmError;
use stratagem_core::provider::Usage;
use stratagem_core::tool::ToolOutput;
use stratagem_providers::Completion;

use crate::aggregator::VoteOutcome;
use crate::classifier::QuestionType;
use crate::parsers::PlanStep;

/// Error text of a run stopped through the cancellation token.
pub const STOPPED_BY_USER: &str = "Stopped by user";

/// The four reasoning strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Cot,
    React,
    Rewoo,
    PlanExecute,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Cot,
        StrategyKind::React,
        StrategyKind::Rewoo,
        StrategyKind::PlanExecute,
    ];

    /// Display name, used as `framework` in results.
    pub fn display_name(&self) -> &'static str {
        match self {
            StrategyKind::Cot => "CoT",
            StrategyKind::React => "ReAct",
            StrategyKind::Rewoo => "ReWOO",
            StrategyKind::PlanExecute => "Plan-Execute",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "cot" | "self-consistency" => Ok(StrategyKind::Cot),
            "react" => Ok(StrategyKind::React),
            "rewoo" => Ok(StrategyKind::Rewoo),
            "plan-execute" | "planexecute" => Ok(StrategyKind::PlanExecute),
            other => Err(format!(
                "Unknown strategy '{other}'. Expected one of: cot, react, rewoo, plan-execute"
            )),
        }
    }
}

/// One ReAct trajectory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrajectoryEntry {
    pub role: TrajectoryRole,
    pub content: String,
    /// 1-based LLM exchange this entry belongs to.
    pub turn: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrajectoryRole {
    Assistant,
    Observation,
}

/// Strategy-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum StrategyDetails {
    Cot {
        question_type: Option<QuestionType>,
        classified_via_llm: bool,
        /// Successful reasoning paths, in sample order.
        reasoning_paths: Vec<String>,
        /// Extraction per reasoning path; empty for open-ended questions.
        extracted_answers: Vec<Option<String>>,
        vote: Option<VoteOutcome>,
        /// `winner count / samples`; `None` for open-ended questions.
        confidence: Option<f64>,
        n_samples: usize,
        failed_samples: usize,
    },
    React {
        trajectory: Vec<TrajectoryEntry>,
        turns: u32,
        truncated: bool,
    },
    Rewoo {
        planner_output: String,
        plan: Vec<PlanStep>,
        /// Variable → resolved value, in resolution order.
        evidence: Vec<(String, String)>,
    },
    PlanExecute {
        planner_output: String,
        initial_plan: Vec<String>,
        past_steps: Vec<(String, String)>,
        replans: u32,
    },
    /// The engine failed before producing anything of its own.
    Failed,
}

/// What one engine run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyResult {
    pub framework: String,
    pub answer: Option<String>,
    pub usage: Usage,
    pub llm_calls: u32,
    pub time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
    pub details: StrategyDetails,
}

impl StrategyResult {
    /// Result for an engine that raised a fatal error.
    pub fn failed(kind: StrategyKind, error: impl Into<String>, time_ms: u64) -> Self {
        Self {
            framework: kind.display_name().to_string(),
            answer: None,
            usage: Usage::default(),
            llm_calls: 0,
            time_ms,
            error: Some(error.into()),
            cancelled: false,
            details: StrategyDetails::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.answer.is_some() && self.error.is_none()
    }
}

/// Running totals for one engine invocation.
#[derive(Debug)]
pub(crate) struct Tally {
    started: Instant,
    pub usage: Usage,
    pub llm_calls: u32,
}

impl Tally {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            usage: Usage::default(),
            llm_calls: 0,
        }
    }

    fn completion(&mut self, completion: &Completion) {
        self.llm_calls += 1;
        self.usage += completion.usage;
    }

    /// Count an issued call, successful or not. A cancelled call is not
    /// counted.
    pub fn record(
        &mut self,
        outcome: std::result::Result<Completion, LlmError>,
    ) -> std::result::Result<Completion, LlmError> {
        match &outcome {
            Ok(completion) => self.completion(completion),
            Err(LlmError::Cancelled) => {}
            Err(_) => self.llm_calls += 1,
        }
        outcome
    }

    pub fn tool(&mut self, output: &ToolOutput) {
        self.llm_calls += output.llm_calls;
        self.usage += output.usage;
    }

    pub fn calls(&mut self, llm_calls: u32, usage: Usage) {
        self.llm_calls += llm_calls;
        self.usage += usage;
    }

    pub fn finish(
        &self,
        kind: StrategyKind,
        answer: Option<String>,
        error: Option<String>,
        cancelled: bool,
        details: StrategyDetails,
    ) -> StrategyResult {
        StrategyResult {
            framework: kind.display_name().to_string(),
            answer,
            usage: self.usage,
            llm_calls: self.llm_calls,
            time_ms: self.started.elapsed().as_millis() as u64,
            error,
            cancelled,
            details,
        }
    }
}
