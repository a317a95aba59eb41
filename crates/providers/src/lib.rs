//! Completion backends for stratagem.
//!
//! All backends implement the `stratagem_core::Provider` trait. Engines never
//! talk to a backend directly: they go through [`LlmClient`], which adds
//! retry with exponential backoff and cooperative cancellation.

pub mod client;
pub mod openai_compat;

use std::sync::Arc;
use std::time::Duration;

use stratagem_config::AppConfig;
use stratagem_core::Credential;

pub use client::{Completion, CompletionOptions, LlmClient, RetryPolicy};
pub use openai_compat::OpenAiCompatProvider;

/// Build the shared LLM client described by the configuration.
pub fn build_from_config(config: &AppConfig) -> LlmClient {
    let provider = OpenAiCompatProvider::new(
        "openai-compat",
        config.api_url.clone(),
        Credential::from_optional(config.api_key.as_deref()),
    );
    let retry = RetryPolicy {
        max_retries: config.retry.max_retries,
        base_delay: Duration::from_millis(config.retry.base_delay_ms),
    };
    LlmClient::new(Arc::new(provider)).with_retry(retry)
}
