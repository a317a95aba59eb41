//! Output parsers — pure text → structure extractors.
//!
//! Every function here is total: a miss is `None` or an empty `Vec`, never
//! an error. Callers own the fallback.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// A tool invocation parsed from a model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAction {
    pub name: String,
    pub input: String,
}

/// One step of a ReWOO plan: `Plan: <description> #E<n> = <tool>[<input>]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub description: String,
    /// `#E<n>`, unique within a plan.
    pub variable: String,
    pub tool: String,
    /// May reference earlier variables.
    pub tool_input: String,
}

macro_rules! regex {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($re).unwrap());
    };
}

regex!(ANSWER_IS_RE, r"(?im)the answer is[:\s]+(.+)$");
regex!(HASHES_RE, r"(?m)^####\s*(.+)$");
regex!(
    CONNECTIVE_RE,
    r"(?i)\b(?:therefore|thus|so|hence)\b[,:]?\s*(?:the answer is[:\s]*)?([^\n]+?)[\s.]*\z"
);
regex!(ANSWER_LABEL_RE, r"(?im)(?:final\s+)?answer:\s*(.+)$");
regex!(EMBEDDED_ANSWER_RE, r"(?i)[\s.,;:]*the answer is\b");

regex!(
    ACTION_RE,
    r"(?m)^[ \t]*Action:[ \t]*(\w+)[ \t]*:[ \t]*((?s:.*?))\s*(?:^[ \t]*PAUSE|\z)"
);
regex!(FINAL_ANSWER_RE, r"(?s)Answer:\s*(.*)");
regex!(THOUGHT_RE, r"(?m)^[ \t]*Thought:[ \t]*(.+)$");

regex!(
    STRICT_PLAN_RE,
    r"Plan:[ \t]*([^\n]*?)\s*(#E\d+)\s*=\s*(\w+)\s*\[([^\]]*)\]"
);
regex!(LOOSE_PLAN_RE, r"(#E\d+)\s*=\s*(\w+)\s*\[([^\]]*)\]");
regex!(PLAN_MARKER_RE, r"(?i)^(?:plan\s*:|step\s*\d+\s*[:.)]?)\s*");

regex!(NUMBERED_RE, r"(?m)^\s*\d+[.)]\s+(.+)$");
regex!(BULLETED_RE, r"(?m)^\s*[-*]\s+(.+)$");

/// Pull a final answer out of a free-form reasoning path.
///
/// Tried in order: "the answer is X" (last occurrence), a `#### X` line,
/// a trailing "therefore/thus/so/hence X", an "(final) answer: X" label.
pub fn extract_answer(text: &str) -> Option<String> {
    if let Some(caps) = ANSWER_IS_RE.captures_iter(text).last() {
        return clean_answer(&caps[1], true);
    }
    if let Some(caps) = HASHES_RE.captures(text) {
        return clean_answer(&caps[1], false);
    }
    if let Some(caps) = CONNECTIVE_RE.captures(text) {
        return clean_answer(&caps[1], false);
    }
    if let Some(caps) = ANSWER_LABEL_RE.captures_iter(text).last() {
        return clean_answer(&caps[1], false);
    }
    None
}

fn clean_answer(raw: &str, strip_commas: bool) -> Option<String> {
    let mut answer = raw.trim().to_string();

    // "42. The answer is 42." → "42."
    if let Some(m) = EMBEDDED_ANSWER_RE.find(&answer) {
        if m.start() > 0 {
            answer.truncate(m.start());
        }
    }

    if strip_commas {
        answer = answer.replace(',', "");
    }

    let answer = answer.trim().trim_end_matches('.').trim();
    (!answer.is_empty()).then(|| answer.to_string())
}

/// `Action: <name>: <input>`, input running to a `PAUSE` line or the end.
pub fn parse_action(text: &str) -> Option<ParsedAction> {
    let caps = ACTION_RE.captures(text)?;
    Some(ParsedAction {
        name: caps[1].to_string(),
        input: caps[2].trim().to_string(),
    })
}

/// Everything after `Answer:`, trimmed. Check this before [`parse_action`].
pub fn parse_final_answer(text: &str) -> Option<String> {
    let caps = FINAL_ANSWER_RE.captures(text)?;
    let answer = caps[1].trim();
    (!answer.is_empty()).then(|| answer.to_string())
}

/// The `Thought:` line, for display only.
pub fn parse_thought(text: &str) -> Option<String> {
    THOUGHT_RE
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
}

/// Parse a ReWOO plan. Strict `Plan: ... #E1 = tool[input]` grammar first,
/// then bare `#E1 = tool[input]` assignments anywhere in the text.
pub fn parse_plan(text: &str) -> Vec<PlanStep> {
    let strict: Vec<PlanStep> = STRICT_PLAN_RE
        .captures_iter(text)
        .map(|caps| PlanStep {
            description: caps[1].trim().to_string(),
            variable: caps[2].to_string(),
            tool: caps[3].to_string(),
            tool_input: caps[4].trim().to_string(),
        })
        .collect();

    if !strict.is_empty() {
        return strict;
    }

    LOOSE_PLAN_RE
        .captures_iter(text)
        .map(|caps| {
            let start = caps.get(0).map_or(0, |m| m.start());
            PlanStep {
                description: describe_from_preceding_line(&text[..start]),
                variable: caps[1].to_string(),
                tool: caps[2].to_string(),
                tool_input: caps[3].trim().to_string(),
            }
        })
        .collect()
}

fn describe_from_preceding_line(before: &str) -> String {
    before
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .filter(|line| !LOOSE_PLAN_RE.is_match(line))
        .map(|line| PLAN_MARKER_RE.replace(line, "").trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| "Step".to_string())
}

/// `1. text` / `1) text` lines, else `- text` / `* text` lines, else empty.
pub fn parse_numbered_or_bulleted_steps(text: &str) -> Vec<String> {
    let collect = |re: &Regex| -> Vec<String> {
        re.captures_iter(text)
            .map(|caps| caps[1].trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };

    let numbered = collect(&NUMBERED_RE);
    if !numbered.is_empty() {
        return numbered;
    }
    collect(&BULLETED_RE)
}
