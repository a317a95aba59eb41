//! Shared test helpers for pattern tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stratagem_core::error::ProviderError;
use stratagem_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use stratagem_core::tool::{Tool, ToolContext, ToolKind, ToolOutput, ToolRegistry};
use stratagem_providers::{LlmClient, RetryPolicy};
use tokio_util::sync::CancellationToken;

use super::RunOptions;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue.
/// Panics if more calls are made than responses provided, unless built
/// with [`ScriptedProvider::failing`].
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    repeat_error: Option<ProviderError>,
    cancel_on_call: Option<(usize, CancellationToken)>,
    /// Per-call latency, indexed by call order.
    delays: Vec<Duration>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::with_outcomes(responses.into_iter().map(Ok).collect())
    }

    pub fn with_outcomes(outcomes: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(outcomes.into()),
            repeat_error: None,
            cancel_on_call: None,
            delays: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            repeat_error: Some(error),
            ..Self::with_outcomes(vec![])
        }
    }

    /// Call number `call` (1-based) trips `token` and never answers.
    pub fn cancel_on_call(mut self, call: usize, token: CancellationToken) -> Self {
        self.cancel_on_call = Some((call, token));
        self
    }

    /// Call `n` (0-based) answers after `delays[n]`; its reply is still
    /// taken from the queue in call order.
    pub fn with_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };

        if let Some((at, token)) = &self.cancel_on_call {
            if call == *at {
                token.cancel();
                return std::future::pending().await;
            }
        }

        if let Some(error) = &self.repeat_error {
            return Err(error.clone());
        }

        let next = self.responses.lock().unwrap().pop_front();
        if let Some(delay) = self.delays.get(call - 1) {
            tokio::time::sleep(*delay).await;
        }
        match next {
            Some(outcome) => outcome,
            None => panic!("ScriptedProvider: no more responses (call #{call})"),
        }
    }
}

/// Create a simple text response.
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        text: Some(text.into()),
        finish_reason: Some("stop".into()),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Client without backoff, so retry tests don't need a paused clock.
pub fn client(provider: Arc<ScriptedProvider>) -> LlmClient {
    LlmClient::new(provider).with_retry(RetryPolicy {
        max_retries: 0,
        base_delay: Duration::ZERO,
    })
}

pub fn run_options() -> RunOptions {
    RunOptions::new("mock-model").with_credential(Some(stratagem_core::Credential::new("sk-test")))
}

/// A tool that answers with a fixed string and records its inputs.
pub struct CannedTool {
    kind: ToolKind,
    reply: String,
    pub inputs: Arc<Mutex<Vec<String>>>,
}

impl CannedTool {
    pub fn new(kind: ToolKind, reply: &str) -> Self {
        Self {
            kind,
            reply: reply.into(),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait::async_trait]
impl Tool for CannedTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn description(&self) -> &str {
        "Canned test tool"
    }

    async fn execute(&self, input: &str, _ctx: &ToolContext) -> ToolOutput {
        self.inputs.lock().unwrap().push(input.to_string());
        ToolOutput::text(self.reply.clone())
    }
}

/// A registry holding the real calculator plus canned search tools.
pub fn registry() -> (Arc<ToolRegistry>, Arc<Mutex<Vec<String>>>) {
    let search = CannedTool::new(ToolKind::WebSearch, "Paris is the capital of France.");
    let inputs = search.inputs.clone();
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(search));
    registry.register(Box::new(CannedTool::new(
        ToolKind::KnowledgeLookup,
        "Error: Search request failed: offline",
    )));
    registry.register(Box::new(stratagem_tools::calculator::CalculatorTool));
    (Arc::new(registry), inputs)
}
