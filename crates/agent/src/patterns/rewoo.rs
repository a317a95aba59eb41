//! ReWOO — Reasoning WithOut Observation.
//!
//! Three fixed phases: one planning call lays out every tool call with
//! `#E<n>` evidence variables, the worker resolves them in plan order, and
//! one solving call answers from the plan-with-evidence transcript. No
//! replanning.

use async_trait::async_trait;
use std::sync::Arc;
use stratagem_config::RewooConfig;
use stratagem_core::error::{LlmError, Result};
use stratagem_core::message::Message;
use stratagem_core::tool::ToolRegistry;
use stratagem_providers::LlmClient;
use tracing::{debug, info, warn};

use super::{RunOptions, Strategy};
use crate::parsers::{PlanStep, parse_plan};
use crate::prompts;
use crate::result::{STOPPED_BY_USER, StrategyDetails, StrategyKind, StrategyResult, Tally};
use crate::stream_event::{ProgressEvent, ProgressSink};

/// Tool name of the isolated one-turn model call.
const LLM_PSEUDO_TOOL: &str = "LLM";

pub struct RewooEngine {
    llm: LlmClient,
    tools: Arc<ToolRegistry>,
    config: RewooConfig,
}

#[derive(Default)]
struct Work {
    planner_output: String,
    plan: Vec<PlanStep>,
    evidence: Vec<(String, String)>,
}

impl Work {
    fn into_details(self) -> StrategyDetails {
        StrategyDetails::Rewoo {
            planner_output: self.planner_output,
            plan: self.plan,
            evidence: self.evidence,
        }
    }

    /// Replace every resolved variable inside `input`.
    fn substitute(&self, input: &str) -> String {
        self.evidence
            .iter()
            .fold(input.to_string(), |acc, (variable, value)| {
                acc.replace(variable.as_str(), value)
            })
    }

    fn resolve(&mut self, variable: &str, value: String) {
        match self.evidence.iter_mut().find(|(v, _)| v == variable) {
            Some(slot) => slot.1 = value,
            None => self.evidence.push((variable.to_string(), value)),
        }
    }

    fn value_of(&self, variable: &str) -> &str {
        self.evidence
            .iter()
            .find(|(v, _)| v == variable)
            .map_or("", |(_, value)| value.as_str())
    }

    /// `Plan: ...` / `#E = tool[input]` / `Evidence: ...` per step.
    fn transcript(&self) -> String {
        if self.plan.is_empty() {
            return self.planner_output.trim().to_string();
        }
        self.plan
            .iter()
            .map(|step| {
                format!(
                    "Plan: {}\n{} = {}[{}]\nEvidence: {}",
                    step.description,
                    step.variable,
                    step.tool,
                    self.substitute(&step.tool_input),
                    self.value_of(&step.variable)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn render_step(step: &PlanStep) -> String {
    format!(
        "{} {} = {}[{}]",
        step.description, step.variable, step.tool, step.tool_input
    )
}

impl RewooEngine {
    pub fn new(llm: LlmClient, tools: Arc<ToolRegistry>, config: RewooConfig) -> Self {
        Self { llm, tools, config }
    }

    async fn drive(
        &self,
        question: &str,
        opts: &RunOptions,
        sink: &dyn ProgressSink,
        tally: &mut Tally,
        work: &mut Work,
    ) -> Result<String> {
        let completion_opts = opts.completion(self.config.temperature, self.config.max_tokens);

        // Plan
        let messages = [
            Message::system(prompts::REWOO_PLANNER),
            Message::user(prompts::rewoo_task(question)),
        ];
        let completion = tally.record(self.llm.complete(&messages, &completion_opts).await)?;
        work.planner_output = completion.text;
        work.plan = parse_plan(&work.planner_output);
        if work.plan.is_empty() {
            warn!(strategy = "rewoo", "Planner output contained no steps");
        }
        sink.emit(ProgressEvent::Plan {
            steps: work.plan.iter().map(render_step).collect(),
        });

        // Work
        let ctx = opts.tool_context();
        for step in work.plan.clone() {
            let input = work.substitute(&step.tool_input);
            debug!(strategy = "rewoo", variable = %step.variable, tool = %step.tool, "Resolving evidence");

            let result = if step.tool.eq_ignore_ascii_case(LLM_PSEUDO_TOOL) {
                let outcome = self
                    .llm
                    .complete(&[Message::user(input.as_str())], &completion_opts)
                    .await;
                match tally.record(outcome) {
                    Ok(completion) => completion.text.trim().to_string(),
                    Err(LlmError::Cancelled) => return Err(LlmError::Cancelled.into()),
                    Err(e) => {
                        warn!(strategy = "rewoo", variable = %step.variable, error = %e, "LLM step failed");
                        format!("[FAILED: Error: {e}]")
                    }
                }
            } else {
                let output = self.tools.execute(&step.tool, &input, &ctx).await;
                tally.tool(&output);
                opts.check_cancelled()?;
                if output.is_error() {
                    format!("[FAILED: {}]", output.text)
                } else {
                    output.text
                }
            };

            sink.emit(ProgressEvent::Evidence {
                variable: step.variable.clone(),
                tool: step.tool.clone(),
                input,
                result: result.clone(),
            });
            work.resolve(&step.variable, result);
        }

        // Solve
        let messages = [
            Message::system(prompts::REWOO_SOLVER),
            Message::user(prompts::rewoo_solve_request(question, &work.transcript())),
        ];
        let completion = tally.record(self.llm.complete(&messages, &completion_opts).await)?;
        let answer = completion.text.trim().to_string();
        sink.emit(ProgressEvent::Solve {
            answer: answer.clone(),
        });
        Ok(answer)
    }
}

#[async_trait]
impl Strategy for RewooEngine {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Rewoo
    }

    async fn run(
        &self,
        question: &str,
        opts: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<StrategyResult> {
        let mut tally = Tally::start();
        let mut work = Work::default();
        info!(strategy = "rewoo", "ReWOO run starting");

        match self.drive(question, opts, sink, &mut tally, &mut work).await {
            Ok(answer) => {
                info!(
                    strategy = "rewoo",
                    steps = work.plan.len(),
                    llm_calls = tally.llm_calls,
                    "ReWOO run completed"
                );
                Ok(tally.finish(
                    StrategyKind::Rewoo,
                    Some(answer),
                    None,
                    false,
                    work.into_details(),
                ))
            }
            Err(e) if e.is_cancelled() => {
                info!(strategy = "rewoo", "ReWOO run cancelled");
                Ok(tally.finish(
                    StrategyKind::Rewoo,
                    None,
                    Some(STOPPED_BY_USER.into()),
                    true,
                    work.into_details(),
                ))
            }
            Err(e) => {
                warn!(strategy = "rewoo", error = %e, "ReWOO run failed");
                Ok(tally.finish(
                    StrategyKind::Rewoo,
                    None,
                    Some(e.to_string()),
                    false,
                    work.into_details(),
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

    const PLAN: &str = "\
Plan: Find the population of France. #E1 = search[population of France]
Plan: Double it with the model. #E2 = LLM[What is twice #E1?]
Plan: Compute a product. #E3 = calculate[6 * 7]";

    fn engine(provider: Arc<ScriptedProvider>) -> (RewooEngine, Arc<Mutex<Vec<String>>>) {
        let (tools, inputs) = registry();
        (
            RewooEngine::new(client(provider), tools, RewooConfig::default()),
            inputs,
        )
    }

    fn evidence(result: &StrategyResult) -> &Vec<(String, String)> {
        match &result.details {
            StrategyDetails::Rewoo { evidence, .. } => evidence,
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[tokio::test]
    async fn plan_work_solve() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response(PLAN),
            text_response("About 136 million."),
            text_response("  136 million  "),
        ]));
        let (engine, inputs) = engine(provider.clone());

        let phases = Mutex::new(Vec::new());
        let sink = |e: ProgressEvent| phases.lock().unwrap().push(e.phase());
        let result = engine.run("q", &run_options(), &sink).await.unwrap();

        assert_eq!(result.answer.as_deref(), Some("136 million"));
        // plan + one LLM step + solve
        assert_eq!(result.llm_calls, 3);
        assert_eq!(
            *phases.lock().unwrap(),
            vec!["plan", "evidence", "evidence", "evidence", "solve"]
        );
        assert_eq!(*inputs.lock().unwrap(), vec!["population of France"]);

        let evidence = evidence(&result);
        assert_eq!(evidence[0].1, "Paris is the capital of France.");
        assert_eq!(evidence[2], ("#E3".to_string(), "42".to_string()));

        // Earlier evidence is substituted into the pseudo-tool input.
        let llm_step = &provider.requests()[1];
        assert_eq!(llm_step.messages.len(), 1);
        assert_eq!(
            llm_step.messages[0].content,
            "What is twice Paris is the capital of France.?"
        );

        let solve = &provider.requests()[2].messages[1].content;
        assert!(solve.contains("Plan: Compute a product.\n#E3 = calculate[6 * 7]\nEvidence: 42"));
        assert!(solve.contains("Evidence: About 136 million.\n\nPlan: Compute"));
    }

    #[tokio::test]
    async fn tool_errors_become_failed_evidence() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("Plan: Look it up. #E1 = wikipedia[Rust]\nPlan: Bad tool. #E2 = shell[ls]"),
            text_response("unknown"),
        ]));
        let (engine, _) = engine(provider);
        let result = engine.run("q", &run_options(), &NoopSink).await.unwrap();

        let evidence = evidence(&result);
        assert_eq!(evidence[0].1, "[FAILED: Error: Search request failed: offline]");
        assert!(evidence[1].1.starts_with("[FAILED: Error: Unknown tool 'shell'"));
        assert_eq!(result.answer.as_deref(), Some("unknown"));
        assert_eq!(result.llm_calls, 2);
    }

    #[tokio::test]
    async fn failed_llm_step_is_recorded() {
        let provider = Arc::new(ScriptedProvider::with_outcomes(vec![
            Ok(text_response("#E1 = llm[think]")),
            Err(ProviderError::ApiError {
                status_code: 400,
                message: "bad request".into(),
            }),
            Ok(text_response("fine")),
        ]));
        let (engine, _) = engine(provider);
        let result = engine.run("q", &run_options(), &NoopSink).await.unwrap();

        assert_eq!(evidence(&result)[0].1, "[FAILED: Error: bad request]");
        assert_eq!(result.answer.as_deref(), Some("fine"));
        // plan + failed step + solve
        assert_eq!(result.llm_calls, 3);
        assert_eq!(result.usage.total_tokens, 30);
    }

    #[tokio::test]
    async fn empty_plan_still_solves() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("I can answer this directly."),
            text_response("Paris"),
        ]));
        let (engine, _) = engine(provider.clone());
        let result = engine.run("q", &run_options(), &NoopSink).await.unwrap();

        assert_eq!(result.answer.as_deref(), Some("Paris"));
        assert!(evidence(&result).is_empty());
        assert!(
            provider.requests()[1].messages[1]
                .content
                .starts_with("I can answer this directly.")
        );
    }

    #[tokio::test]
    async fn solve_failure_keeps_evidence_and_calls() {
        let provider = Arc::new(ScriptedProvider::with_outcomes(vec![
            Ok(text_response("Plan: Compute. #E1 = calculate[6 * 7]")),
            Err(ProviderError::ApiError {
                status_code: 401,
                message: "Invalid API key".into(),
            }),
        ]));
        let (engine, _) = engine(provider);
        let result = engine.run("q", &run_options(), &NoopSink).await.unwrap();

        assert_eq!(result.answer, None);
        assert!(result.error.as_deref().unwrap().contains("Invalid API key"));
        assert_eq!(result.llm_calls, 2);
        assert_eq!(result.usage.total_tokens, 15);
        assert_eq!(evidence(&result)[0], ("#E1".to_string(), "42".to_string()));
    }

    #[tokio::test]
    async fn cancellation_keeps_partial_evidence() {
        let opts = run_options();
        let provider = Arc::new(
            ScriptedProvider::new(vec![text_response(PLAN)]).cancel_on_call(2, opts.cancel.clone()),
        );
        let (engine, _) = engine(provider.clone());
        let result = engine.run("q", &opts, &NoopSink).await.unwrap();

        assert!(result.cancelled);
        assert_eq!(result.answer, None);
        assert_eq!(evidence(&result).len(), 1);
        assert_eq!(provider.call_count(), 2);
    }
}
