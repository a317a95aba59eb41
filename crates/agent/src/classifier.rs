//! Question classifier — factual vs open-ended.
//!
//! Two tiers: an ordered battery of regex heuristics, then (only if the
//! heuristics are inconclusive) a single low-temperature model call. If the
//! model is unavailable the verdict defaults to factual.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use stratagem_core::error::{LlmError, Result};
use stratagem_core::message::Message;
use stratagem_core::provider::{Credential, Usage};
use stratagem_providers::{CompletionOptions, LlmClient};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    /// One short, checkable answer.
    Factual,
    /// Plans, advice, creative or multi-faceted answers.
    OpenEnded,
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuestionType::Factual => f.write_str("factual"),
            QuestionType::OpenEnded => f.write_str("open-ended"),
        }
    }
}

/// The verdict and what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub question_type: QuestionType,
    /// The model tier answered.
    pub via_llm: bool,
    pub llm_calls: u32,
    pub usage: Usage,
}

static IMPERATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:plan|design|create|write|develop|build|suggest|recommend|propose|outline|draft|compose|brainstorm|generate|describe|explain|compare|devise|imagine|give|tell|show|provide|help|make|come up with)\b",
    )
    .unwrap()
});
static FACT_REQUEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:give|tell|show|provide)\b.*\b(?:number|count|name|date|year|capital|population|answer|result|value|price|cost)\s+of\b",
    )
    .unwrap()
});
static CREATIVE_DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:itinerary|itineraries|strategy|strategies|planning|roadmap|schedule|recipe|recipes|essay|story|poem|brainstorm|pros and cons|advice|tips|ideas|proposal|business plan|marketing|workout|curriculum|lesson plan|vacation|trip)\b",
    )
    .unwrap()
});
static HOW_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^how (?:can|do|should|would|could|to)\b").unwrap());
static BEST_OF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^what (?:are|would be) (?:the |some )?(?:best|top|good|great|ideal|most effective|recommended)\b",
    )
    .unwrap()
});
static BUDGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:on a budget|budget of|with a budget|within (?:a |my |our )?budget|under \$\d|less than \$\d|no more than \$\d)",
    )
    .unwrap()
});
static WH_FACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:what|who|when|where)(?:\s+(?:is|was)\b|'s\b)").unwrap());
static QUANTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^how (?:many|much|old|tall|long|far|big|large|high|deep|fast|heavy|wide|often)\b",
    )
    .unwrap()
});
static ARITHMETIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?\s*[-+*/^%x]\s*\d").unwrap());
static COMPUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:calculate|compute|solve|find the value)\b").unwrap()
});
static YES_NO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:is|was|are|were|did|does|true or false)\b").unwrap()
});

/// Heuristic tier. `None` means inconclusive.
pub fn classify_heuristic(question: &str) -> Option<QuestionType> {
    let q = question.trim().to_lowercase();

    if IMPERATIVE_RE.is_match(&q) {
        return Some(if FACT_REQUEST_RE.is_match(&q) {
            QuestionType::Factual
        } else {
            QuestionType::OpenEnded
        });
    }

    let ordered: [(&Regex, QuestionType); 9] = [
        (&CREATIVE_DOMAIN_RE, QuestionType::OpenEnded),
        (&HOW_OPEN_RE, QuestionType::OpenEnded),
        (&BEST_OF_RE, QuestionType::OpenEnded),
        (&BUDGET_RE, QuestionType::OpenEnded),
        (&WH_FACT_RE, QuestionType::Factual),
        (&QUANTITY_RE, QuestionType::Factual),
        (&ARITHMETIC_RE, QuestionType::Factual),
        (&COMPUTE_RE, QuestionType::Factual),
        (&YES_NO_RE, QuestionType::Factual),
    ];

    ordered
        .into_iter()
        .find(|(re, _)| re.is_match(&q))
        .map(|(_, verdict)| verdict)
}

/// Two-tier classifier.
#[derive(Debug, Clone)]
pub struct QuestionClassifier {
    llm: LlmClient,
    model: String,
}

impl QuestionClassifier {
    pub fn new(llm: LlmClient, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// Classify `question`. Only cancellation is an error.
    pub async fn classify(
        &self,
        question: &str,
        credential: Option<&Credential>,
        cancel: &CancellationToken,
    ) -> Result<Classification> {
        if let Some(question_type) = classify_heuristic(question) {
            debug!(%question_type, "Heuristic classification");
            return Ok(Classification {
                question_type,
                via_llm: false,
                llm_calls: 0,
                usage: Usage::default(),
            });
        }

        let fallback = Classification {
            question_type: QuestionType::Factual,
            via_llm: false,
            llm_calls: 0,
            usage: Usage::default(),
        };

        let Some(credential) = credential else {
            warn!("No credential for question classification, defaulting to factual");
            return Ok(fallback);
        };

        let opts = CompletionOptions::new(self.model.clone())
            .with_credential(Some(credential.clone()))
            .with_temperature(0.0)
            .with_max_tokens(10)
            .with_cancel(cancel.clone());
        let messages = [
            Message::system(prompts::CLASSIFIER_SYSTEM),
            Message::user(question),
        ];

        match self.llm.complete(&messages, &opts).await {
            Ok(completion) => {
                let question_type = if completion.text.to_lowercase().contains("open") {
                    QuestionType::OpenEnded
                } else {
                    QuestionType::Factual
                };
                debug!(%question_type, "Model classification");
                Ok(Classification {
                    question_type,
                    via_llm: true,
                    llm_calls: 1,
                    usage: completion.usage,
                })
            }
            Err(LlmError::Cancelled) => Err(LlmError::Cancelled.into()),
            Err(e) => {
                warn!(error = %e, "Question classification failed, defaulting to factual");
                Ok(Classification {
                    llm_calls: 1,
                    ..fallback
                })
            }
        }
    }
}
