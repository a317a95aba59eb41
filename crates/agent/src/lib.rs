//! Reasoning strategies for comparing how an LLM answers one question.
//!
//! Four engines share the `run(question, options, sink)` shape:
//!
//! 1. **CoT / Self-Consistency** — sample N reasoning paths, then vote or synthesize
//! 2. **ReAct** — interleave reasoning with tool calls until an answer
//! 3. **ReWOO** — plan every tool call, execute, solve once
//! 4. **Plan-Execute** — execute a plan step by step, replanning after each
//!
//! The [`Orchestrator`] runs any subset concurrently and collects a
//! [`ComparisonReport`].

pub mod aggregator;
pub mod classifier;
pub mod orchestrator;
pub mod parsers;
pub mod patterns;
pub mod prompts;
pub mod result;
pub mod stream_event;

pub use aggregator::{AnswerAggregator, VoteOutcome};
pub use classifier::{Classification, QuestionClassifier, QuestionType};
pub use orchestrator::{ComparisonReport, Orchestrator, TaggedEvent};
pub use patterns::{CotEngine, PlanExecuteEngine, ReactEngine, RewooEngine, RunOptions, Strategy};
pub use result::{StrategyDetails, StrategyKind, StrategyResult, TrajectoryEntry, TrajectoryRole};
pub use stream_event::{NoopSink, ProgressEvent, ProgressSink};
