//! Knowledge lookup tool — keyword search against an encyclopedia index.
//!
//! Fetches the top snippets for a query and, when available, a summary of
//! the highest-ranked page, which is placed first in the output.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex_lite::Regex;
use stratagem_config::KnowledgeConfig;
use stratagem_core::tool::{Tool, ToolContext, ToolKind, ToolOutput};
use tracing::{debug, warn};

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
}

/// The search capability behind the knowledge lookup tool.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Ranked hits for `query`, at most `limit`. Zero hits is not an error.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, String>;

    /// Plain-text summary of the page titled `title`, if the index has one.
    async fn summary(&self, title: &str) -> Option<String>;
}

/// MediaWiki search API plus the REST page-summary endpoint.
pub struct WikipediaIndex {
    client: reqwest::Client,
    endpoint: String,
    summary_endpoint: String,
}

impl WikipediaIndex {
    pub fn new(endpoint: impl Into<String>, summary_endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!("stratagem/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            client,
            endpoint: endpoint.into(),
            summary_endpoint: summary_endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    fn summary_url(&self, title: &str) -> Option<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.summary_endpoint).ok()?;
        url.path_segments_mut().ok()?.push(&title.replace(' ', "_"));
        Some(url)
    }
}

#[async_trait]
impl SearchIndex for WikipediaIndex {
    fn name(&self) -> &str {
        "wikipedia"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, String> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", &limit.to_string()),
                ("format", "json"),
                ("utf8", "1"),
            ])
            .send()
            .await
            .map_err(|e| format!("Search request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("Search API error ({})", status.as_u16()));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse search response: {e}"))?;

        Ok(parse_search_hits(&data, limit))
    }

    async fn summary(&self, title: &str) -> Option<String> {
        let url = self.summary_url(title)?;
        let response = self.client.get(url).send().await.ok()?;
        if !response.status().is_success() {
            debug!(title, status = response.status().as_u16(), "No summary available");
            return None;
        }
        let data: serde_json::Value = response.json().await.ok()?;
        data.get("extract")
            .and_then(|e| e.as_str())
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
    }
}

fn parse_search_hits(data: &serde_json::Value, limit: usize) -> Vec<SearchHit> {
    data.get("query")
        .and_then(|q| q.get("search"))
        .and_then(|s| s.as_array())
        .map(|arr| {
            arr.iter()
                .take(limit)
                .map(|item| SearchHit {
                    title: item
                        .get("title")
                        .and_then(|t| t.as_str())
                        .unwrap_or("")
                        .to_string(),
                    snippet: strip_markup(
                        item.get("snippet").and_then(|s| s.as_str()).unwrap_or(""),
                    ),
                })
                .collect()
        })
        .unwrap_or_default()
}

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Drop HTML tags and decode the handful of entities search snippets carry.
pub fn strip_markup(text: &str) -> String {
    TAG_RE
        .replace_all(text, "")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

pub struct KnowledgeLookupTool {
    index: Arc<dyn SearchIndex>,
    max_results: usize,
    summary_chars: usize,
}

impl KnowledgeLookupTool {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self {
            index,
            max_results: 3,
            summary_chars: 800,
        }
    }

    pub fn from_config(config: &KnowledgeConfig) -> Self {
        let index = WikipediaIndex::new(config.endpoint.clone(), config.summary_endpoint.clone());
        Self {
            index: Arc::new(index),
            max_results: config.max_results,
            summary_chars: config.summary_chars,
        }
    }

    /// Run the lookup. Shared with the web search fallback.
    pub async fn lookup(&self, query: &str) -> String {
        let query = query.trim();
        let hits = match self.index.search(query, self.max_results).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(index = %self.index.name(), error = %e, "Knowledge lookup failed");
                return format!("Error: {e}");
            }
        };

        let Some(top) = hits.first() else {
            return "No results found.".to_string();
        };

        let mut sections = Vec::with_capacity(hits.len() + 1);
        if let Some(summary) = self.index.summary(&top.title).await {
            let summary: String = summary.chars().take(self.summary_chars).collect();
            sections.push(format!("Summary ({}): {}\n", top.title, summary));
        }
        sections.extend(hits.iter().map(|h| format!("{}: {}", h.title, h.snippet)));
        sections.join("\n")
    }
}

#[async_trait]
impl Tool for KnowledgeLookupTool {
    fn kind(&self) -> ToolKind {
        ToolKind::KnowledgeLookup
    }

    fn description(&self) -> &str {
        "Search Wikipedia for factual information. Input: a short keyword query, e.g. Eiffel Tower height"
    }

    async fn execute(&self, input: &str, _ctx: &ToolContext) -> ToolOutput {
        ToolOutput::text(self.lookup(input).await)
    }
}
