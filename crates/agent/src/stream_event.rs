//! Progress events.
//!
//! Every engine reports what it is doing through a [`ProgressSink`], one
//! event per meaningful sub-step, in causal order. Events are for display
//! only: nothing downstream should drive control flow from them.
//!
//! Serialized as `{"phase": "...", "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::classifier::QuestionType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "data", rename_all = "kebab-case")]
pub enum ProgressEvent {
    // --- CoT ---
    /// One reasoning path finished. Fired in completion order.
    Sample { index: usize, content: String },

    /// One reasoning path failed; it is left out of the vote.
    SampleFailed { index: usize, error: String },

    Classified {
        question_type: QuestionType,
        via_llm: bool,
    },

    Synthesize { answer: String },

    Vote {
        winner: Option<String>,
        count: usize,
        distribution: Vec<(String, usize)>,
    },

    // --- ReAct (and Plan-Execute step executors) ---
    Llm { turn: u32, content: String },

    Action {
        turn: u32,
        name: String,
        input: String,
    },

    Observation { turn: u32, content: String },

    /// The reply had neither an answer nor an action; a nudge was sent.
    Confused { turn: u32 },

    // --- ReWOO / Plan-Execute ---
    Plan { steps: Vec<String> },

    Evidence {
        variable: String,
        tool: String,
        input: String,
        result: String,
    },

    Solve { answer: String },

    ExecuteStart { index: usize, step: String },

    ExecuteDone {
        index: usize,
        step: String,
        result: String,
    },

    Replan { steps: Vec<String> },

    Done { answer: Option<String> },
}

impl ProgressEvent {
    /// Phase name, as serialized.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Sample { .. } => "sample",
            Self::SampleFailed { .. } => "sample-failed",
            Self::Classified { .. } => "classified",
            Self::Synthesize { .. } => "synthesize",
            Self::Vote { .. } => "vote",
            Self::Llm { .. } => "llm",
            Self::Action { .. } => "action",
            Self::Observation { .. } => "observation",
            Self::Confused { .. } => "confused",
            Self::Plan { .. } => "plan",
            Self::Evidence { .. } => "evidence",
            Self::Solve { .. } => "solve",
            Self::ExecuteStart { .. } => "execute-start",
            Self::ExecuteDone { .. } => "execute-done",
            Self::Replan { .. } => "replan",
            Self::Done { .. } => "done",
        }
    }
}

/// Receives progress events. Called synchronously, in causal order.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn emit(&self, _event: ProgressEvent) {}
}
