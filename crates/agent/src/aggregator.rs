//! Answer aggregator — majority vote over sampled answers.
//!
//! Candidates are normalized, grouped, merged when one is a whole-word
//! substring of another, optionally re-grouped by model-assigned canonical
//! labels, and the largest group wins. Each group is displayed as its most
//! frequent original string.

use std::collections::HashMap;
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

/// The vote result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteOutcome {
    /// Display string of the largest group; `None` when nothing was voted.
    pub winner: Option<String>,
    pub count: usize,
    /// Display label → count, in group order.
    pub distribution: Vec<(String, usize)>,
    /// Groups came from model-assigned canonical labels.
    pub canonicalized: bool,
    #[serde(skip)]
    pub llm_calls: u32,
    #[serde(skip)]
    pub usage: Usage,
}

/// A cluster of equivalent answers. Exists only during one vote.
#[derive(Debug, Clone)]
struct VoteGroup {
    key: String,
    count: usize,
    /// Original string → occurrences, in first-seen order.
    originals: Vec<(String, usize)>,
}

impl VoteGroup {
    fn new(key: String) -> Self {
        Self {
            key,
            count: 0,
            originals: Vec::new(),
        }
    }

    fn add(&mut self, original: &str, times: usize) {
        self.count += times;
        match self.originals.iter_mut().find(|(o, _)| o == original) {
            Some((_, n)) => *n += times,
            None => self.originals.push((original.to_string(), times)),
        }
    }

    fn absorb(&mut self, other: VoteGroup) {
        for (original, n) in other.originals {
            self.add(&original, n);
        }
    }

    /// Most frequent original; ties go to the first seen.
    fn representative(&self) -> String {
        let mut best: Option<&(String, usize)> = None;
        for entry in &self.originals {
            if best.is_none_or(|b| entry.1 > b.1) {
                best = Some(entry);
            }
        }
        best.map(|(o, _)| o.clone()).unwrap_or_else(|| self.key.clone())
    }
}

static TRAILING_ANSWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*[.,;:]?\s*the answer is\b.*$").unwrap());
static LEADING_ARTICLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:the|a|an)\s+").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static MAPPING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(\d+)\s*[.):]?\s*->\s*(.+?)\s*$").unwrap());

fn is_edge_noise(c: char) -> bool {
    c.is_whitespace() || "\"'`()[]{}.,;:!?\u{201c}\u{201d}\u{2018}\u{2019}".contains(c)
}

/// Lowercase, drop a trailing "the answer is ...", one leading article,
/// edge punctuation/quotes/parentheses, and collapse whitespace.
pub fn normalize(answer: &str) -> String {
    let lower = answer.trim().to_lowercase();
    let without_suffix = TRAILING_ANSWER_RE.replace(&lower, "");
    let without_article =
        LEADING_ARTICLE_RE.replace(without_suffix.trim_matches(is_edge_noise), "");
    let trimmed = without_article.trim_matches(is_edge_noise);
    WHITESPACE_RE.replace_all(trimmed, " ").into_owned()
}

/// `needle` occurs in `haystack` bounded by non-alphanumerics on both sides.
fn contains_whole_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Steps 1–4: drop empties, normalize, group, merge by containment.
fn substring_groups(candidates: &[Option<String>]) -> Vec<VoteGroup> {
    let mut groups: Vec<VoteGroup> = Vec::new();
    for original in candidates.iter().flatten() {
        let original = original.trim();
        let normalized = normalize(original);
        let key = if normalized.is_empty() {
            original.to_lowercase()
        } else {
            normalized
        };
        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.add(original, 1),
            None => {
                let mut group = VoteGroup::new(key);
                group.add(original, 1);
                groups.push(group);
            }
        }
    }

    // Stable: equal counts keep first-seen order.
    groups.sort_by(|a, b| b.count.cmp(&a.count));

    let mut canonical: Vec<VoteGroup> = Vec::new();
    for group in groups {
        match canonical.iter_mut().find(|c| {
            contains_whole_word(&c.key, &group.key) || contains_whole_word(&group.key, &c.key)
        }) {
            Some(target) => target.absorb(group),
            None => canonical.push(group),
        }
    }
    canonical
}

/// Step 6: pick the winner and expose the distribution.
fn tally(groups: &[VoteGroup], canonicalized: bool) -> VoteOutcome {
    let mut winner: Option<&VoteGroup> = None;
    for group in groups {
        if winner.is_none_or(|w| group.count > w.count) {
            winner = Some(group);
        }
    }

    VoteOutcome {
        winner: winner.map(VoteGroup::representative),
        count: winner.map_or(0, |w| w.count),
        distribution: groups
            .iter()
            .map(|g| (g.representative(), g.count))
            .collect(),
        canonicalized,
        llm_calls: 0,
        usage: Usage::default(),
    }
}

/// Majority vote without model help. Deterministic.
pub fn majority_vote(candidates: &[Option<String>]) -> VoteOutcome {
    tally(&substring_groups(candidates), false)
}

/// Parse `N -> label` lines into 0-based index → label.
fn parse_mappings(text: &str, len: usize) -> HashMap<usize, String> {
    MAPPING_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let n: usize = caps[1].parse().ok()?;
            let label = caps[2].trim().to_string();
            (n >= 1 && n <= len && !label.is_empty()).then(|| (n - 1, label))
        })
        .collect()
}

/// Regroup every candidate by the model's canonical label.
fn canonical_groups(
    candidates: &[Option<String>],
    distinct: &[String],
    mappings: &HashMap<usize, String>,
) -> Vec<VoteGroup> {
    let mut groups: Vec<VoteGroup> = Vec::new();
    for original in candidates.iter().flatten() {
        let original = original.trim();
        let label = distinct
            .iter()
            .position(|d| d == original)
            .and_then(|i| mappings.get(&i))
            .map(String::as_str)
            .unwrap_or(original);
        let key = label.trim().to_lowercase();
        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.add(original, 1),
            None => {
                let mut group = VoteGroup::new(key);
                group.add(original, 1);
                groups.push(group);
            }
        }
    }
    groups
}

/// Majority vote with optional model-assisted canonicalization.
#[derive(Debug, Clone)]
pub struct AnswerAggregator {
    llm: LlmClient,
    model: String,
}

impl AnswerAggregator {
    pub fn new(llm: LlmClient, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// Vote over `candidates`. Only cancellation is an error.
    pub async fn vote(
        &self,
        candidates: &[Option<String>],
        credential: Option<&Credential>,
        cancel: &CancellationToken,
    ) -> Result<VoteOutcome> {
        let merged = substring_groups(candidates);
        if merged.len() <= 1 {
            return Ok(tally(&merged, false));
        }
        let Some(credential) = credential else {
            return Ok(tally(&merged, false));
        };

        let mut distinct: Vec<String> = Vec::new();
        for original in candidates.iter().flatten() {
            let original = original.trim().to_string();
            if !distinct.contains(&original) {
                distinct.push(original);
            }
        }

        let opts = CompletionOptions::new(self.model.clone())
            .with_credential(Some(credential.clone()))
            .with_temperature(0.0)
            .with_max_tokens(512)
            .with_cancel(cancel.clone());
        let messages = [
            Message::system(prompts::CANONICALIZE_SYSTEM),
            Message::user(prompts::canonicalize_request(&distinct)),
        ];

        let completion = match self.llm.complete(&messages, &opts).await {
            Ok(completion) => completion,
            Err(LlmError::Cancelled) => return Err(LlmError::Cancelled.into()),
            Err(e) => {
                warn!(error = %e, "Answer canonicalization failed, keeping merged groups");
                return Ok(VoteOutcome {
                    llm_calls: 1,
                    ..tally(&merged, false)
                });
            }
        };

        // Any index the reply leaves unmapped is grouped under its original.
        let mappings = parse_mappings(&completion.text, distinct.len());
        if mappings.is_empty() {
            warn!("Canonicalization reply had no usable mappings");
        } else {
            debug!(mapped = mappings.len(), total = distinct.len(), "Canonicalized answers");
        }
        let mut outcome = tally(
            &canonical_groups(candidates, &distinct, &mappings),
            !mappings.is_empty(),
        );
        outcome.llm_calls = 1;
        outcome.usage = completion.usage;
        Ok(outcome)
    }
}
