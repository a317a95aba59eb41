//! Resilient LLM client — retry with exponential backoff, cancellation and
//! truncation detection layered over a single [`Provider`].
//!
//! Every strategy, the classifier, the aggregator and the web search tool
//! share one client. The client itself holds no per-run state: credential,
//! model and the cancellation token travel with each call.

use std::sync::Arc;
use std::time::Duration;

use stratagem_core::error::{LlmError, ProviderError};
use stratagem_core::message::Message;
use stratagem_core::provider::{Credential, FinishReason, Provider, ProviderRequest, Usage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How many times to retry a transient failure, and how long to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry. Doubles for every retry after that.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

/// Per-call parameters.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub credential: Option<Credential>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub cancel: CancellationToken,
}

impl CompletionOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            credential: None,
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A successful completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub finish_reason: FinishReason,
    /// Zero when the backend did not report usage.
    pub usage: Usage,
    /// The model stopped because it ran out of output tokens.
    pub truncated: bool,
}

/// The shared LLM client.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn Provider>,
    retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Send `messages` and wait for one completion.
    ///
    /// Rate limiting and 5xx responses are retried up to
    /// `max_retries` times; anything else fails on the spot. Cancellation is
    /// observed before every attempt, while a request is in flight and
    /// during backoff, and is never retried.
    pub async fn complete(
        &self,
        messages: &[Message],
        opts: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        let request = ProviderRequest {
            model: opts.model.clone(),
            messages: messages.to_vec(),
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            credential: opts.credential.clone(),
        };

        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..=self.retry.max_retries {
            if opts.cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }

            if attempt > 0 {
                let delay = self.retry.delay_for(attempt);
                debug!(
                    provider = %self.provider.name(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before retry"
                );
                tokio::select! {
                    _ = opts.cancel.cancelled() => return Err(LlmError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let outcome = tokio::select! {
                biased;
                _ = opts.cancel.cancelled() => return Err(LlmError::Cancelled),
                outcome = self.provider.complete(request.clone()) => outcome,
            };

            match outcome {
                Ok(response) => {
                    let finish_reason = FinishReason::parse(response.finish_reason.as_deref());
                    let text = response.text.ok_or(LlmError::NoCompletion)?;
                    let truncated = finish_reason == FinishReason::Length;
                    if truncated {
                        warn!(
                            model = %opts.model,
                            "Completion truncated at the output token limit"
                        );
                    }
                    return Ok(Completion {
                        text,
                        finish_reason,
                        usage: response.usage.unwrap_or_default(),
                        truncated,
                    });
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        provider = %self.provider.name(),
                        attempt = attempt + 1,
                        total = self.retry.max_retries + 1,
                        error = %e,
                        "Transient LLM failure"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_error
            .map(LlmError::from)
            .unwrap_or(LlmError::Provider(ProviderError::NotConfigured(
                "No attempts were made".into(),
            ))))
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.provider.name())
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use stratagem_core::provider::ProviderResponse;

    /// Replays a fixed list of outcomes; the last one repeats.
    struct ScriptedProvider {
        outcomes: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedProvider {
        fn new(outcomes: Vec<Result<ProviderResponse, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.len() > 1 {
                outcomes.pop_front().unwrap()
            } else {
                outcomes.front().cloned().unwrap()
            }
        }
    }

    /// Never answers.
    struct HangingProvider;

    #[async_trait]
    impl Provider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            std::future::pending().await
        }
    }

    fn ok(text: &str) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse {
            text: Some(text.into()),
            finish_reason: Some("stop".into()),
            usage: Some(Usage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5,
            }),
            model: "m".into(),
        })
    }

    fn status(code: u16) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::ApiError {
            status_code: code,
            message: String::new(),
        })
    }

    fn opts() -> CompletionOptions {
        CompletionOptions::new("m")
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limits_then_succeeds() {
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::RateLimited { retry_after_secs: 0 }),
            Err(ProviderError::RateLimited { retry_after_secs: 0 }),
            Err(ProviderError::RateLimited { retry_after_secs: 0 }),
            ok("done"),
        ]);
        let client = LlmClient::new(provider.clone());

        let started = tokio::time::Instant::now();
        let completion = client
            .complete(&[Message::user("q")], &opts())
            .await
            .unwrap();

        assert_eq!(completion.text, "done");
        assert_eq!(completion.usage.total_tokens, 5);
        assert_eq!(provider.calls(), 4);
        // 1s + 2s + 4s of backoff
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_report_last_error() {
        let provider = ScriptedProvider::new(vec![status(503), status(500)]);
        let client = LlmClient::new(provider.clone());

        let err = client
            .complete(&[Message::user("q")], &opts())
            .await
            .unwrap_err();

        assert_eq!(provider.calls(), 4);
        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "LLM API error: 500");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_fail_immediately() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::ApiError {
            status_code: 400,
            message: "Invalid model".into(),
        })]);
        let client = LlmClient::new(provider.clone());

        let err = client
            .complete(&[Message::user("q")], &opts())
            .await
            .unwrap_err();

        assert_eq!(provider.calls(), 1);
        assert_eq!(err.to_string(), "Invalid model");
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_are_not_retried() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Network("reset".into()))]);
        let client = LlmClient::new(provider.clone());

        let err = client
            .complete(&[Message::user("q")], &opts())
            .await
            .unwrap_err();

        assert_eq!(provider.calls(), 1);
        assert!(matches!(err, LlmError::Provider(ProviderError::Network(_))));
    }

    #[tokio::test]
    async fn missing_body_is_no_completion() {
        let provider = ScriptedProvider::new(vec![Ok(ProviderResponse {
            text: None,
            finish_reason: Some("stop".into()),
            usage: None,
            model: "m".into(),
        })]);
        let client = LlmClient::new(provider);

        let err = client
            .complete(&[Message::user("q")], &opts())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::NoCompletion));
    }

    #[tokio::test]
    async fn length_finish_is_accepted_and_flagged() {
        let provider = ScriptedProvider::new(vec![Ok(ProviderResponse {
            text: Some("partial".into()),
            finish_reason: Some("length".into()),
            usage: None,
            model: "m".into(),
        })]);
        let client = LlmClient::new(provider);

        let completion = client
            .complete(&[Message::user("q")], &opts())
            .await
            .unwrap();
        assert!(completion.truncated);
        assert_eq!(completion.usage, Usage::default());
    }

    #[tokio::test]
    async fn cancelled_before_first_attempt() {
        let provider = ScriptedProvider::new(vec![ok("never")]);
        let client = LlmClient::new(provider.clone());
        let options = opts();
        options.cancel.cancel();

        let err = client
            .complete(&[Message::user("q")], &options)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Cancelled));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_stops_retrying() {
        let provider = ScriptedProvider::new(vec![status(503)]);
        let client = LlmClient::new(provider.clone());
        let options = opts();

        let token = options.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            token.cancel();
            // Idempotent.
            token.cancel();
        });

        let err = client
            .complete(&[Message::user("q")], &options)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Cancelled));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_in_flight_request() {
        let client = LlmClient::new(Arc::new(HangingProvider));
        let options = opts();

        let token = options.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            token.cancel();
        });

        let err = client
            .complete(&[Message::user("q")], &options)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Cancelled));
    }
}
