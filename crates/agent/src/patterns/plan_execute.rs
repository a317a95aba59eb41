//! Plan-and-Execute with replanning.
//!
//! One call drafts a numbered plan. Each step then runs in its own bounded
//! Thought/Action/Observation sub-loop, and after every step a replanning
//! call either finishes with `DONE: <answer>` or supplies the remaining
//! steps. Step failures are recorded as `[Error: ...]` and the loop carries
//! on.

use async_trait::async_trait;
use regex_lite::Regex;
use std::collections::VecDeque;
use std::sync::{Arc, LazyLock};
use stratagem_config::PlanExecuteConfig;
use stratagem_core::error::{LlmError, Result};
use stratagem_core::message::Message;
use stratagem_core::tool::ToolRegistry;
use stratagem_providers::LlmClient;
use tracing::{debug, info, warn};

use super::{RunOptions, Strategy};
use crate::parsers::{parse_action, parse_final_answer, parse_numbered_or_bulleted_steps};
use crate::prompts;
use crate::result::{STOPPED_BY_USER, StrategyDetails, StrategyKind, StrategyResult, Tally};
use crate::stream_event::{ProgressEvent, ProgressSink};

static DONE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)DONE:\s*(.*)").unwrap());

const STEP_ERROR_PREFIX: &str = "[Error:";

pub const NO_FINAL_ANSWER: &str =
    "Plan-Execute did not produce a final answer within the allowed steps.";

pub struct PlanExecuteEngine {
    llm: LlmClient,
    tools: Arc<ToolRegistry>,
    config: PlanExecuteConfig,
    executor_prompt: String,
}

#[derive(Default)]
struct Progress {
    planner_output: String,
    initial_plan: Vec<String>,
    past_steps: Vec<(String, String)>,
    replans: u32,
}

impl Progress {
    fn into_details(self) -> StrategyDetails {
        StrategyDetails::PlanExecute {
            planner_output: self.planner_output,
            initial_plan: self.initial_plan,
            past_steps: self.past_steps,
            replans: self.replans,
        }
    }

    /// Most recent step result that is not an `[Error: ...]` marker.
    fn last_good_result(&self) -> Option<String> {
        self.past_steps
            .iter()
            .rev()
            .map(|(_, result)| result)
            .find(|result| !result.starts_with(STEP_ERROR_PREFIX))
            .cloned()
    }
}

enum StepOutcome {
    Completed(String),
    Failed(String),
}

impl StepOutcome {
    fn into_record(self) -> String {
        match self {
            StepOutcome::Completed(text) => text,
            StepOutcome::Failed(reason) => format!("{STEP_ERROR_PREFIX} {reason}]"),
        }
    }
}

impl PlanExecuteEngine {
    pub fn new(llm: LlmClient, tools: Arc<ToolRegistry>, config: PlanExecuteConfig) -> Self {
        let executor_prompt = prompts::executor_system(&tools);
        Self {
            llm,
            tools,
            config,
            executor_prompt,
        }
    }

    /// Bounded Thought/Action/Observation loop scoped to one step.
    #[allow(clippy::too_many_arguments)]
    async fn execute_step(
        &self,
        question: &str,
        remaining: &[String],
        past_steps: &[(String, String)],
        step: &str,
        opts: &RunOptions,
        sink: &dyn ProgressSink,
        tally: &mut Tally,
    ) -> Result<StepOutcome> {
        let completion_opts = opts.completion(self.config.temperature, self.config.max_tokens);
        let ctx = opts.tool_context();
        let mut messages = vec![
            Message::system(self.executor_prompt.as_str()),
            Message::user(prompts::executor_request(
                question, remaining, past_steps, step,
            )),
        ];

        for turn in 1..=self.config.max_step_turns {
            let outcome = self.llm.complete(&messages, &completion_opts).await;
            let completion = match tally.record(outcome) {
                Ok(completion) => completion,
                Err(LlmError::Cancelled) => return Err(LlmError::Cancelled.into()),
                Err(e) => {
                    warn!(strategy = "plan-execute", turn, error = %e, "Step executor call failed");
                    return Ok(StepOutcome::Failed(e.to_string()));
                }
            };

            let text = completion.text;
            sink.emit(ProgressEvent::Llm {
                turn,
                content: text.clone(),
            });
            messages.push(Message::assistant(text.as_str()));

            if let Some(answer) = parse_final_answer(&text) {
                return Ok(StepOutcome::Completed(answer));
            }
            let Some(action) = parse_action(&text) else {
                // Plain prose is taken as the step's result.
                return Ok(StepOutcome::Completed(text.trim().to_string()));
            };
            if turn == self.config.max_step_turns {
                break;
            }

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
            messages.push(Message::user(prompts::observation(&output.text)));
        }

        warn!(
            strategy = "plan-execute",
            max_step_turns = self.config.max_step_turns,
            "Step exceeded its turn budget"
        );
        Ok(StepOutcome::Failed(format!(
            "Step execution exceeded maximum turns ({})",
            self.config.max_step_turns
        )))
    }

    async fn drive(
        &self,
        question: &str,
        opts: &RunOptions,
        sink: &dyn ProgressSink,
        tally: &mut Tally,
        progress: &mut Progress,
    ) -> Result<Option<String>> {
        let completion_opts = opts.completion(self.config.temperature, self.config.max_tokens);

        let messages = [
            Message::system(prompts::PLANNER_SYSTEM),
            Message::user(question),
        ];
        let completion = tally.record(self.llm.complete(&messages, &completion_opts).await)?;
        progress.planner_output = completion.text;
        progress.initial_plan = parse_numbered_or_bulleted_steps(&progress.planner_output);
        if progress.initial_plan.is_empty() {
            debug!(strategy = "plan-execute", "Unstructured plan, using it as a single step");
            progress.initial_plan = vec![progress.planner_output.trim().to_string()];
        }
        sink.emit(ProgressEvent::Plan {
            steps: progress.initial_plan.clone(),
        });

        let mut remaining: VecDeque<String> = progress.initial_plan.iter().cloned().collect();
        let mut answer = None;
        let mut index = 0;

        while progress.replans < self.config.max_replans {
            let Some(step) = remaining.pop_front() else {
                break;
            };
            debug!(strategy = "plan-execute", step = index, "Executing step");
            sink.emit(ProgressEvent::ExecuteStart {
                index,
                step: step.clone(),
            });

            let rest: Vec<String> = remaining.iter().cloned().collect();
            let result = self
                .execute_step(question, &rest, &progress.past_steps, &step, opts, sink, tally)
                .await?
                .into_record();

            sink.emit(ProgressEvent::ExecuteDone {
                index,
                step: step.clone(),
                result: result.clone(),
            });
            progress.past_steps.push((step, result));
            index += 1;

            let messages = [
                Message::system(prompts::REPLANNER_SYSTEM),
                Message::user(prompts::replan_request(
                    question,
                    &progress.initial_plan,
                    &progress.past_steps,
                )),
            ];
            let completion = tally.record(self.llm.complete(&messages, &completion_opts).await)?;

            if let Some(caps) = DONE_RE.captures(&completion.text) {
                let done = caps[1].trim();
                answer = (!done.is_empty()).then(|| done.to_string());
                break;
            }

            let steps = parse_numbered_or_bulleted_steps(&completion.text);
            if steps.is_empty() {
                warn!(strategy = "plan-execute", "Replanner reply was neither DONE nor a plan");
                answer = progress.last_good_result();
                break;
            }

            progress.replans += 1;
            sink.emit(ProgressEvent::Replan {
                steps: steps.clone(),
            });
            remaining = steps.into();
        }

        if answer.is_none() {
            answer = progress.last_good_result();
        }
        sink.emit(ProgressEvent::Done {
            answer: answer.clone(),
        });
        Ok(answer)
    }
}

#[async_trait]
impl Strategy for PlanExecuteEngine {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PlanExecute
    }

    async fn run(
        &self,
        question: &str,
        opts: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<StrategyResult> {
        let mut tally = Tally::start();
        let mut progress = Progress::default();
        info!(
            strategy = "plan-execute",
            max_replans = self.config.max_replans,
            "Plan-Execute run starting"
        );

        match self
            .drive(question, opts, sink, &mut tally, &mut progress)
            .await
        {
            Ok(answer) => {
                info!(
                    strategy = "plan-execute",
                    steps = progress.past_steps.len(),
                    replans = progress.replans,
                    "Plan-Execute run completed"
                );
                let error = answer.is_none().then(|| NO_FINAL_ANSWER.to_string());
                Ok(tally.finish(
                    StrategyKind::PlanExecute,
                    answer,
                    error,
                    false,
                    progress.into_details(),
                ))
            }
            Err(e) if e.is_cancelled() => {
                info!(strategy = "plan-execute", "Plan-Execute run cancelled");
                Ok(tally.finish(
                    StrategyKind::PlanExecute,
                    None,
                    Some(STOPPED_BY_USER.into()),
                    true,
                    progress.into_details(),
                ))
            }
            Err(e) => {
                warn!(strategy = "plan-execute", error = %e, "Plan-Execute run failed");
                Ok(tally.finish(
                    StrategyKind::PlanExecute,
                    None,
                    Some(e.to_string()),
                    false,
                    progress.into_details(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::test_helpers::{
        ScriptedProvider, client, registry, run_options, text_response,
    };
    use crate::stream_event::NoopSink;
    use std::sync::Mutex;
    use stratagem_core::ProviderError;

    fn engine(provider: Arc<ScriptedProvider>, config: PlanExecuteConfig) -> PlanExecuteEngine {
        let (tools, _) = registry();
        PlanExecuteEngine::new(client(provider), tools, config)
    }

    fn progress(result: &StrategyResult) -> (&Vec<String>, &Vec<(String, String)>, u32) {
        match &result.details {
            StrategyDetails::PlanExecute {
                initial_plan,
                past_steps,
                replans,
                ..
            } => (initial_plan, past_steps, *replans),
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[tokio::test]
    async fn plan_execute_replan_done() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("1. Search for the capital of France\n2. Report it"),
            text_response("Thought: search\nAction: search: capital of France\nPAUSE"),
            text_response("Thought: got it\nAnswer: Paris"),
            text_response("1. Report it"),
            text_response("Answer: The capital is Paris"),
            text_response("DONE: Paris"),
        ]));
        let engine = engine(provider.clone(), PlanExecuteConfig::default());

        let phases = Mutex::new(Vec::new());
        let sink = |e: ProgressEvent| phases.lock().unwrap().push(e.phase());
        let result = engine
            .run("What is the capital of France?", &run_options(), &sink)
            .await
            .unwrap();

        assert_eq!(result.answer.as_deref(), Some("Paris"));
        assert_eq!(result.llm_calls, 6);
        let (initial_plan, past_steps, replans) = progress(&result);
        assert_eq!(initial_plan.len(), 2);
        assert_eq!(replans, 1);
        assert_eq!(past_steps[0].1, "Paris");
        assert_eq!(past_steps[1].1, "The capital is Paris");

        let outer: Vec<&str> = phases
            .lock()
            .unwrap()
            .iter()
            .copied()
            .filter(|p| !matches!(*p, "llm" | "action" | "observation"))
            .collect();
        assert_eq!(
            outer,
            vec![
                "plan",
                "execute-start",
                "execute-done",
                "replan",
                "execute-start",
                "execute-done",
                "done"
            ]
        );

        // The second executor sees the first step's result; the replanner
        // always sees the original plan.
        let requests = provider.requests();
        assert!(requests[4].messages[1].content.contains("Result: Paris"));
        assert!(
            requests[5].messages[1]
                .content
                .contains("1. Search for the capital of France\n2. Report it")
        );
    }

    #[tokio::test]
    async fn unstructured_plan_is_a_single_step() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("  Just add the numbers.  "),
            text_response("Answer: 4"),
            text_response("DONE: 4"),
        ]));
        let result = engine(provider, PlanExecuteConfig::default())
            .run("What is 2 + 2?", &run_options(), &NoopSink)
            .await
            .unwrap();

        assert_eq!(result.answer.as_deref(), Some("4"));
        let (initial_plan, _, _) = progress(&result);
        assert_eq!(initial_plan, &vec!["Just add the numbers.".to_string()]);
    }

    #[tokio::test]
    async fn prose_step_reply_is_the_result() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("1. Think"),
            text_response("The result is 12."),
            text_response("Hmm, not sure."),
        ]));
        let result = engine(provider, PlanExecuteConfig::default())
            .run("q", &run_options(), &NoopSink)
            .await
            .unwrap();

        // Unparseable replan ends the run with the last good step result.
        assert_eq!(result.answer.as_deref(), Some("The result is 12."));
        assert_eq!(progress(&result).2, 0);
        assert_eq!(result.llm_calls, 3);
    }

    #[tokio::test]
    async fn step_turn_budget_is_recorded_as_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("1. Compute"),
            text_response("Action: calculate: 1 + 1\nPAUSE"),
            text_response("Action: calculate: 2 + 2\nPAUSE"),
            text_response("no idea"),
        ]));
        let config = PlanExecuteConfig {
            max_step_turns: 2,
            ..PlanExecuteConfig::default()
        };
        let result = engine(provider, config)
            .run("q", &run_options(), &NoopSink)
            .await
            .unwrap();

        let (_, past_steps, _) = progress(&result);
        assert_eq!(
            past_steps[0].1,
            "[Error: Step execution exceeded maximum turns (2)]"
        );
        assert_eq!(result.answer, None);
        assert_eq!(result.error.as_deref(), Some(NO_FINAL_ANSWER));
        assert_eq!(result.llm_calls, 4);
    }

    #[tokio::test]
    async fn step_llm_failure_does_not_abort() {
        let provider = Arc::new(ScriptedProvider::with_outcomes(vec![
            Ok(text_response("1. Look it up")),
            Err(ProviderError::ApiError {
                status_code: 400,
                message: "bad request".into(),
            }),
            Ok(text_response("DONE: Paris")),
        ]));
        let result = engine(provider, PlanExecuteConfig::default())
            .run("q", &run_options(), &NoopSink)
            .await
            .unwrap();

        let (_, past_steps, _) = progress(&result);
        assert_eq!(past_steps[0].1, "[Error: bad request]");
        assert_eq!(result.answer.as_deref(), Some("Paris"));
        // plan + failed executor turn + replan
        assert_eq!(result.llm_calls, 3);
        assert_eq!(result.usage.total_tokens, 30);
    }

    #[tokio::test]
    async fn replanner_failure_keeps_past_steps_and_calls() {
        let provider = Arc::new(ScriptedProvider::with_outcomes(vec![
            Ok(text_response("1. Look it up")),
            Ok(text_response("Answer: Paris")),
            Err(ProviderError::ApiError {
                status_code: 401,
                message: "Invalid API key".into(),
            }),
        ]));
        let result = engine(provider, PlanExecuteConfig::default())
            .run("q", &run_options(), &NoopSink)
            .await
            .unwrap();

        assert_eq!(result.answer, None);
        assert!(!result.cancelled);
        assert!(result.error.as_deref().unwrap().contains("Invalid API key"));
        assert_eq!(result.llm_calls, 3);
        assert_eq!(result.usage.total_tokens, 30);
        let (_, past_steps, _) = progress(&result);
        assert_eq!(past_steps[0].1, "Paris");
    }

    #[tokio::test]
    async fn replan_budget_falls_back_to_last_result() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("1. First"),
            text_response("Answer: partial result"),
            text_response("1. Second"),
        ]));
        let config = PlanExecuteConfig {
            max_replans: 1,
            ..PlanExecuteConfig::default()
        };
        let result = engine(provider.clone(), config)
            .run("q", &run_options(), &NoopSink)
            .await
            .unwrap();

        assert_eq!(result.answer.as_deref(), Some("partial result"));
        assert_eq!(progress(&result).2, 1);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn cancellation_mid_step() {
        let opts = run_options();
        let provider = Arc::new(
            ScriptedProvider::new(vec![text_response("1. a\n2. b")])
                .cancel_on_call(2, opts.cancel.clone()),
        );
        let result = engine(provider.clone(), PlanExecuteConfig::default())
            .run("q", &opts, &NoopSink)
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.error.as_deref(), Some(STOPPED_BY_USER));
        assert_eq!(result.llm_calls, 1);
        assert_eq!(provider.call_count(), 2);
        assert_eq!(progress(&result).0.len(), 2);
    }
}
