//! Chain-of-Thought with Self-Consistency.
//!
//! Samples N independent reasoning paths concurrently, classifies the
//! question, then either votes over the answers extracted from each path
//! (factual) or asks the model for one synthesized answer (open-ended).

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use stratagem_config::CotConfig;
use stratagem_core::error::{Error, LlmError, Result};
use stratagem_core::message::Message;
use stratagem_providers::LlmClient;
use tracing::{info, warn};

use super::{RunOptions, Strategy};
use crate::aggregator::{AnswerAggregator, VoteOutcome};
use crate::classifier::{Classification, QuestionClassifier, QuestionType};
use crate::parsers::extract_answer;
use crate::prompts;
use crate::result::{STOPPED_BY_USER, StrategyDetails, StrategyKind, StrategyResult, Tally};
use crate::stream_event::{ProgressEvent, ProgressSink};

/// Final answer when no path yielded an extractable answer.
pub const EXTRACTION_FAILED: &str = "[Extraction failed — see reasoning paths]";

pub struct CotEngine {
    llm: LlmClient,
    config: CotConfig,
    /// Skip classification and treat every question as this type.
    forced_type: Option<QuestionType>,
}

#[derive(Default)]
struct CotState {
    question_type: Option<QuestionType>,
    classified_via_llm: bool,
    reasoning_paths: Vec<String>,
    extracted_answers: Vec<Option<String>>,
    vote: Option<VoteOutcome>,
    confidence: Option<f64>,
    failed_samples: usize,
}

impl CotState {
    fn into_details(self, n_samples: usize) -> StrategyDetails {
        StrategyDetails::Cot {
            question_type: self.question_type,
            classified_via_llm: self.classified_via_llm,
            reasoning_paths: self.reasoning_paths,
            extracted_answers: self.extracted_answers,
            vote: self.vote,
            confidence: self.confidence,
            n_samples,
            failed_samples: self.failed_samples,
        }
    }
}

impl CotEngine {
    pub fn new(llm: LlmClient, config: CotConfig) -> Self {
        Self {
            llm,
            config,
            forced_type: None,
        }
    }

    pub fn with_question_type(mut self, question_type: QuestionType) -> Self {
        self.forced_type = Some(question_type);
        self
    }

    fn n_samples(&self) -> usize {
        self.config.samples.max(1)
    }

    fn stopped(&self, tally: &Tally, state: CotState) -> StrategyResult {
        info!(strategy = "cot", "CoT run cancelled");
        tally.finish(
            StrategyKind::Cot,
            None,
            Some(STOPPED_BY_USER.into()),
            true,
            state.into_details(self.n_samples()),
        )
    }

    /// Fan out N sampling calls; report each in completion order.
    async fn sample(
        &self,
        question: &str,
        opts: &RunOptions,
        sink: &dyn ProgressSink,
        tally: &mut Tally,
        state: &mut CotState,
    ) -> Result<()> {
        let system = if self.config.few_shot {
            prompts::COT_FEW_SHOT
        } else {
            prompts::COT_ZERO_SHOT
        };
        let messages = vec![
            Message::system(system),
            Message::user(prompts::cot_question(question)),
        ];
        let completion_opts = opts.completion(self.config.temperature, self.config.max_tokens);

        let mut pending: FuturesUnordered<_> = (0..self.n_samples())
            .map(|index| {
                let messages = &messages;
                let completion_opts = &completion_opts;
                async move { (index, self.llm.complete(messages, completion_opts).await) }
            })
            .collect();

        let mut paths: Vec<Option<String>> = vec![None; self.n_samples()];
        let mut first_error: Option<LlmError> = None;

        while let Some((index, outcome)) = pending.next().await {
            match tally.record(outcome) {
                Ok(completion) => {
                    sink.emit(ProgressEvent::Sample {
                        index,
                        content: completion.text.clone(),
                    });
                    paths[index] = Some(completion.text);
                }
                Err(LlmError::Cancelled) => {
                    state.reasoning_paths = paths.into_iter().flatten().collect();
                    return Err(LlmError::Cancelled.into());
                }
                Err(e) => {
                    warn!(strategy = "cot", sample = index, error = %e, "Sample failed");
                    sink.emit(ProgressEvent::SampleFailed {
                        index,
                        error: e.to_string(),
                    });
                    state.failed_samples += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        state.reasoning_paths = paths.into_iter().flatten().collect();
        if state.reasoning_paths.is_empty() {
            return Err(first_error
                .map(Error::from)
                .unwrap_or_else(|| Error::Internal("No reasoning paths sampled".into())));
        }
        Ok(())
    }

    async fn drive(
        &self,
        question: &str,
        opts: &RunOptions,
        sink: &dyn ProgressSink,
        tally: &mut Tally,
        state: &mut CotState,
    ) -> Result<String> {
        self.sample(question, opts, sink, tally, state).await?;

        let classification = match self.forced_type {
            Some(question_type) => Classification {
                question_type,
                via_llm: false,
                llm_calls: 0,
                usage: Default::default(),
            },
            None => {
                QuestionClassifier::new(self.llm.clone(), opts.model.clone())
                    .classify(question, opts.credential.as_ref(), &opts.cancel)
                    .await?
            }
        };
        tally.calls(classification.llm_calls, classification.usage);
        state.question_type = Some(classification.question_type);
        state.classified_via_llm = classification.via_llm;
        sink.emit(ProgressEvent::Classified {
            question_type: classification.question_type,
            via_llm: classification.via_llm,
        });

        if classification.question_type == QuestionType::OpenEnded {
            let messages = [
                Message::system(prompts::COT_SYNTHESIS),
                Message::user(prompts::cot_synthesis_request(
                    question,
                    &state.reasoning_paths,
                )),
            ];
            let completion = tally.record(
                self.llm
                    .complete(&messages, &opts.completion(0.0, self.config.max_tokens))
                    .await,
            )?;
            let answer = completion.text.trim().to_string();
            sink.emit(ProgressEvent::Synthesize {
                answer: answer.clone(),
            });
            return Ok(answer);
        }

        state.extracted_answers = state
            .reasoning_paths
            .iter()
            .map(|path| extract_answer(path))
            .collect();

        let vote = AnswerAggregator::new(self.llm.clone(), opts.model.clone())
            .vote(
                &state.extracted_answers,
                opts.credential.as_ref(),
                &opts.cancel,
            )
            .await?;
        tally.calls(vote.llm_calls, vote.usage);
        sink.emit(ProgressEvent::Vote {
            winner: vote.winner.clone(),
            count: vote.count,
            distribution: vote.distribution.clone(),
        });

        let answer = match &vote.winner {
            Some(winner) => {
                state.confidence = Some(vote.count as f64 / self.n_samples() as f64);
                winner.clone()
            }
            None => {
                warn!(strategy = "cot", "No answer could be extracted from any path");
                state.confidence = Some(0.0);
                EXTRACTION_FAILED.to_string()
            }
        };
        state.vote = Some(vote);
        Ok(answer)
    }
}

#[async_trait]
impl Strategy for CotEngine {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Cot
    }

    async fn run(
        &self,
        question: &str,
        opts: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<StrategyResult> {
        let mut tally = Tally::start();
        let mut state = CotState::default();
        info!(strategy = "cot", samples = self.n_samples(), "CoT run starting");

        match self.drive(question, opts, sink, &mut tally, &mut state).await {
            Ok(answer) => {
                info!(strategy = "cot", llm_calls = tally.llm_calls, "CoT run completed");
                Ok(tally.finish(
                    StrategyKind::Cot,
                    Some(answer),
                    None,
                    false,
                    state.into_details(self.n_samples()),
                ))
            }
            Err(e) if e.is_cancelled() => Ok(self.stopped(&tally, state)),
            Err(e) => {
                warn!(strategy = "cot", error = %e, "CoT run failed");
                Ok(tally.finish(
                    StrategyKind::Cot,
                    None,
                    Some(e.to_string()),
                    false,
                    state.into_details(self.n_samples()),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::test_helpers::{ScriptedProvider, client, run_options, text_response};
    use crate::stream_event::NoopSink;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use stratagem_core::ProviderError;

    fn config(samples: usize) -> CotConfig {
        CotConfig {
            samples,
            ..CotConfig::default()
        }
    }

    fn details(result: &StrategyResult) -> (&Option<f64>, &Vec<Option<String>>, usize) {
        match &result.details {
            StrategyDetails::Cot {
                confidence,
                extracted_answers,
                failed_samples,
                ..
            } => (confidence, extracted_answers, *failed_samples),
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unanimous_paths_have_full_confidence() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("6 times 7 is 42. The answer is 42."),
            text_response("Six sevens make 42. The answer is 42."),
            text_response("7 * 6 = 42. The answer is 42."),
        ]));
        let engine = CotEngine::new(client(provider.clone()), config(3))
            .with_question_type(QuestionType::Factual);

        let events = Mutex::new(Vec::new());
        let sink = |e: ProgressEvent| events.lock().unwrap().push(e);
        let result = engine
            .run("Multiply six by seven", &run_options(), &sink)
            .await
            .unwrap();

        assert_eq!(result.answer.as_deref(), Some("42"));
        assert_eq!(result.llm_calls, 3);
        assert_eq!(result.usage.total_tokens, 45);
        assert_eq!(details(&result).0, &Some(1.0));

        let events = events.lock().unwrap();
        let samples = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Sample { .. }))
            .count();
        assert_eq!(samples, 3);
        assert!(matches!(events.last(), Some(ProgressEvent::Vote { count: 3, .. })));
        assert!((provider.requests()[0].temperature - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn majority_with_heuristic_classification() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("The answer is 42."),
            text_response("The answer is 41."),
            text_response("The answer is 42."),
        ]));
        let engine = CotEngine::new(client(provider.clone()), config(3));

        // No credential: no canonicalization call.
        let result = engine
            .run("What is 6 * 7?", &RunOptions::new("m"), &NoopSink)
            .await
            .unwrap();

        assert_eq!(result.answer.as_deref(), Some("42"));
        assert_eq!(result.llm_calls, 3);
        let confidence = details(&result).0.unwrap();
        assert!((confidence - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_extractable_answer_uses_placeholder() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("I am not sure."),
            text_response("Hard to tell."),
        ]));
        let engine = CotEngine::new(client(provider), config(2))
            .with_question_type(QuestionType::Factual);

        let result = engine.run("q", &run_options(), &NoopSink).await.unwrap();
        assert_eq!(result.answer.as_deref(), Some(EXTRACTION_FAILED));
        let (confidence, extracted, _) = details(&result);
        assert_eq!(confidence, &Some(0.0));
        assert_eq!(extracted, &vec![None, None]);
    }

    #[tokio::test]
    async fn open_ended_synthesizes() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("Day 1: Colosseum."),
            text_response("Day 1: Vatican."),
            text_response("Day 1: Colosseum. Day 2: Vatican."),
        ]));
        let engine = CotEngine::new(client(provider.clone()), config(2));

        let result = engine
            .run("Plan a weekend in Rome", &run_options(), &NoopSink)
            .await
            .unwrap();

        assert_eq!(result.answer.as_deref(), Some("Day 1: Colosseum. Day 2: Vatican."));
        assert_eq!(result.llm_calls, 3);
        let (confidence, extracted, _) = details(&result);
        assert_eq!(confidence, &None);
        assert!(extracted.is_empty());

        let synthesis = &provider.requests()[2];
        assert!(synthesis.messages[1].content.contains("--- Path 2 ---"));
    }

    #[tokio::test(start_paused = true)]
    async fn samples_are_reported_in_completion_order() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![
                text_response("slow path. The answer is 5."),
                text_response("fast path. The answer is 5."),
                text_response("middle path. The answer is 5."),
            ])
            .with_delays(vec![
                Duration::from_millis(300),
                Duration::from_millis(100),
                Duration::from_millis(200),
            ]),
        );
        let engine = CotEngine::new(client(provider), config(3))
            .with_question_type(QuestionType::Factual);

        let samples = Mutex::new(Vec::new());
        let sink = |e: ProgressEvent| {
            if let ProgressEvent::Sample { index, content } = e {
                samples.lock().unwrap().push((index, content));
            }
        };
        let result = engine.run("q", &run_options(), &sink).await.unwrap();
        assert_eq!(result.answer.as_deref(), Some("5"));

        let samples = samples.lock().unwrap();
        let order: Vec<usize> = samples.iter().map(|(index, _)| *index).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert!(samples[0].1.starts_with("fast"));
        assert!(samples[2].1.starts_with("slow"));

        // Paths are still stored in sample order.
        match &result.details {
            StrategyDetails::Cot {
                reasoning_paths, ..
            } => assert!(reasoning_paths[0].starts_with("slow")),
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_samples_are_excluded() {
        let provider = Arc::new(ScriptedProvider::with_outcomes(vec![
            Ok(text_response("The answer is 9.")),
            Err(ProviderError::ApiError {
                status_code: 400,
                message: "context too long".into(),
            }),
        ]));
        let engine = CotEngine::new(client(provider), config(2))
            .with_question_type(QuestionType::Factual);

        let result = engine.run("q", &run_options(), &NoopSink).await.unwrap();
        assert_eq!(result.answer.as_deref(), Some("9"));
        // The failed sample was still issued.
        assert_eq!(result.llm_calls, 2);
        assert_eq!(result.usage.total_tokens, 15);
        let (confidence, _, failed) = details(&result);
        assert_eq!(failed, 1);
        assert_eq!(confidence, &Some(0.5));
    }

    #[tokio::test]
    async fn all_samples_failing_is_fatal() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::ApiError {
            status_code: 400,
            message: "Invalid model".into(),
        }));
        let engine = CotEngine::new(client(provider.clone()), config(3));
        let result = engine.run("q", &run_options(), &NoopSink).await.unwrap();
        assert_eq!(result.answer, None);
        assert!(!result.cancelled);
        assert!(result.error.as_deref().unwrap().contains("Invalid model"));
        assert_eq!(result.llm_calls, 3);
        assert_eq!(provider.call_count(), 3);
        assert_eq!(details(&result).2, 3);
    }

    #[tokio::test]
    async fn cancellation_returns_partial_result() {
        let opts = run_options();
        let provider = Arc::new(
            ScriptedProvider::new(vec![
                text_response("The answer is 1."),
                text_response("The answer is 1."),
                text_response("The answer is 1."),
            ])
            .cancel_on_call(2, opts.cancel.clone()),
        );
        let engine = CotEngine::new(client(provider.clone()), config(3));

        let result = engine.run("q", &opts, &NoopSink).await.unwrap();
        assert!(result.cancelled);
        assert_eq!(result.answer, None);
        assert_eq!(result.error.as_deref(), Some(STOPPED_BY_USER));
        assert!(provider.call_count() <= 2);
    }
}
