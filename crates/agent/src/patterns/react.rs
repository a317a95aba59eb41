//! ReAct pattern — Thought → Action → Observation loop.
//!
//! The model reasons step by step, choosing tools to gather information,
//! until it replies with `Answer:`. Every exchange is recorded in the
//! trajectory.
//!
//! The loop terminates on an answer, or when the turn budget runs out
//! (a non-fatal, truncated result). A parsed action on the last permitted
//! turn is not executed.

use async_trait::async_trait;
use std::sync::Arc;
use stratagem_config::ReactConfig;
use stratagem_core::error::Result;
use stratagem_core::message::Message;
use stratagem_core::tool::ToolRegistry;
use stratagem_providers::LlmClient;
use tracing::{debug, info, warn};

use super::{RunOptions, Strategy};
use crate::parsers::{extract_answer, parse_action, parse_final_answer};
use crate::prompts;
use crate::result::{
    STOPPED_BY_USER, StrategyDetails, StrategyKind, StrategyResult, Tally, TrajectoryEntry,
    TrajectoryRole,
};
use crate::stream_event::{ProgressEvent, ProgressSink};

pub struct ReactEngine {
    llm: LlmClient,
    tools: Arc<ToolRegistry>,
    config: ReactConfig,
    /// Rendered once, tool listing included.
    system_prompt: String,
}

#[derive(Default)]
struct Loop {
    trajectory: Vec<TrajectoryEntry>,
    turns: u32,
    last_text: String,
}

impl ReactEngine {
    pub fn new(llm: LlmClient, tools: Arc<ToolRegistry>, config: ReactConfig) -> Self {
        let system_prompt = prompts::react_system(&tools);
        Self {
            llm,
            tools,
            config,
            system_prompt,
        }
    }

    fn details(state: Loop, truncated: bool) -> StrategyDetails {
        StrategyDetails::React {
            trajectory: state.trajectory,
            turns: state.turns,
            truncated,
        }
    }

    /// Runs turns until an answer; `Ok(None)` when the budget ran out.
    async fn drive(
        &self,
        question: &str,
        opts: &RunOptions,
        sink: &dyn ProgressSink,
        tally: &mut Tally,
        state: &mut Loop,
    ) -> Result<Option<String>> {
        let completion_opts = opts.completion(self.config.temperature, self.config.max_tokens);
        let ctx = opts.tool_context();
        let mut messages = vec![
            Message::system(self.system_prompt.as_str()),
            Message::user(question),
        ];

        for turn in 1..=self.config.max_turns {
            let completion = tally.record(self.llm.complete(&messages, &completion_opts).await)?;
            state.turns = turn;

            let text = completion.text;
            sink.emit(ProgressEvent::Llm {
                turn,
                content: text.clone(),
            });
            state.trajectory.push(TrajectoryEntry {
                role: TrajectoryRole::Assistant,
                content: text.clone(),
                turn,
            });
            messages.push(Message::assistant(text.as_str()));
            state.last_text = text;

            if let Some(answer) = parse_final_answer(&state.last_text) {
                debug!(strategy = "react", turn, "Final answer reached");
                return Ok(Some(answer));
            }

            if turn == self.config.max_turns {
                break;
            }

            match parse_action(&state.last_text) {
                Some(action) => {
                    debug!(strategy = "react", turn, tool = %action.name, "Executing action");
                    sink.emit(ProgressEvent::Action {
                        turn,
                        name: action.name.clone(),
                        input: action.input.clone(),
                    });

                    let output = self.tools.execute(&action.name, &action.input, &ctx).await;
                    tally.tool(&output);
                    opts.check_cancelled()?;

                    sink.emit(ProgressEvent::Observation {
                        turn,
                        content: output.text.clone(),
                    });
                    let observation = prompts::observation(&output.text);
                    state.trajectory.push(TrajectoryEntry {
                        role: TrajectoryRole::Observation,
                        content: observation.clone(),
                        turn,
                    });
                    messages.push(Message::user(observation));
                }
                None => {
                    debug!(strategy = "react", turn, "Reply had neither answer nor action");
                    sink.emit(ProgressEvent::Confused { turn });
                    messages.push(Message::user(prompts::REACT_NUDGE));
                }
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl Strategy for ReactEngine {
    fn kind(&self) -> StrategyKind {
        StrategyKind::React
    }

    async fn run(
        &self,
        question: &str,
        opts: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<StrategyResult> {
        let mut tally = Tally::start();
        let mut state = Loop::default();
        info!(strategy = "react", max_turns = self.config.max_turns, "ReAct run starting");

        match self.drive(question, opts, sink, &mut tally, &mut state).await {
            Ok(Some(answer)) => {
                info!(strategy = "react", turns = state.turns, "ReAct run completed");
                Ok(tally.finish(
                    StrategyKind::React,
                    Some(answer),
                    None,
                    false,
                    Self::details(state, false),
                ))
            }
            Ok(None) => {
                warn!(
                    strategy = "react",
                    max_turns = self.config.max_turns,
                    "Turn budget exhausted without a final answer"
                );
                let partial = extract_answer(&state.last_text);
                Ok(tally.finish(
                    StrategyKind::React,
                    partial,
                    Some(format!(
                        "ReAct reached the maximum number of turns ({}) without a final answer.",
                        self.config.max_turns
                    )),
                    false,
                    Self::details(state, true),
                ))
            }
            Err(e) if e.is_cancelled() => {
                info!(strategy = "react", turns = state.turns, "ReAct run cancelled");
                Ok(tally.finish(
                    StrategyKind::React,
                    None,
                    Some(STOPPED_BY_USER.into()),
                    true,
                    Self::details(state, false),
                ))
            }
            Err(e) => {
                warn!(strategy = "react", turns = state.turns, error = %e, "ReAct run failed");
                Ok(tally.finish(
                    StrategyKind::React,
                    None,
                    Some(e.to_string()),
                    false,
                    Self::details(state, false),
                ))
            }
        }
    }
}
