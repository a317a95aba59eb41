//! `stratagem ask` — Run strategies on one question and compare the results.

use std::sync::Arc;
use stratagem_agent::{
    ComparisonReport, Orchestrator, ProgressEvent, RunOptions, StrategyKind, StrategyResult,
    TaggedEvent,
};
use stratagem_config::AppConfig;
use stratagem_core::Credential;

const PREVIEW_CHARS: usize = 100;

pub async fn run(
    question: String,
    strategies: Vec<String>,
    model: Option<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early — give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export OPENROUTER_API_KEY='sk-or-v1-...'   (recommended)");
        eprintln!("    export OPENAI_API_KEY='sk-...'             (for OpenAI direct)");
        eprintln!("    export STRATAGEM_API_KEY='sk-...'          (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let kinds = resolve_strategies(&strategies)?;
    tracing::debug!(?kinds, "Resolved strategies");
    let llm = stratagem_providers::build_from_config(&config);
    let tools = Arc::new(stratagem_tools::default_registry(&llm, &config));
    let orchestrator = Orchestrator::from_config(&config, llm, tools);

    let opts = RunOptions::new(model.unwrap_or_else(|| config.default_model.clone()))
        .with_credential(Credential::from_optional(config.api_key.as_deref()));

    // Ctrl+C stops every engine at its next suspension point
    let cancel = opts.cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Stopping... partial results follow.");
            cancel.cancel();
        }
    });

    if !json {
        println!();
        println!("  Question:   {question}");
        println!("  Model:      {}", opts.model);
        println!(
            "  Strategies: {}",
            kinds
                .iter()
                .map(|k| k.display_name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!();
    }

    let sink = |tagged: TaggedEvent| {
        if json {
            if let Ok(line) = serde_json::to_string(&tagged) {
                println!("{line}");
            }
        } else {
            println!("  [{}] {}", tagged.strategy, describe(&tagged.event));
        }
    };

    let report = orchestrator.compare(&question, &kinds, &opts, &sink).await;
    ctrl_c.abort();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(())
}

/// Resolve `-s` values; none (or `all`) selects every strategy.
pub fn resolve_strategies(values: &[String]) -> Result<Vec<StrategyKind>, String> {
    if values.is_empty() {
        return Ok(StrategyKind::ALL.to_vec());
    }

    let mut kinds = Vec::new();
    for value in values {
        let selected = if value.trim().eq_ignore_ascii_case("all") {
            StrategyKind::ALL.to_vec()
        } else {
            vec![value.parse::<StrategyKind>()?]
        };
        for kind in selected {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
    }
    Ok(kinds)
}

/// One display line per progress event.
pub fn describe(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::Sample { index, content } => {
            format!("sample {}: {}", index + 1, preview(content))
        }
        ProgressEvent::SampleFailed { index, error } => {
            format!("sample {} failed: {error}", index + 1)
        }
        ProgressEvent::Classified {
            question_type,
            via_llm,
        } => format!(
            "classified as {question_type}{}",
            if *via_llm { " (model)" } else { "" }
        ),
        ProgressEvent::Synthesize { answer } => format!("synthesized: {}", preview(answer)),
        ProgressEvent::Vote { winner, count, .. } => format!(
            "vote: {} ({count} votes)",
            winner.as_deref().unwrap_or("no answer")
        ),
        ProgressEvent::Llm { turn, content } => format!("turn {turn}: {}", preview(content)),
        ProgressEvent::Action { turn, name, input } => {
            format!("turn {turn} action: {name}: {}", preview(input))
        }
        ProgressEvent::Observation { turn, content } => {
            format!("turn {turn} observation: {}", preview(content))
        }
        ProgressEvent::Confused { turn } => format!("turn {turn}: unrecognized reply, nudging"),
        ProgressEvent::Plan { steps } => {
            let mut out = format!("plan with {} steps", steps.len());
            for (i, step) in steps.iter().enumerate() {
                out.push_str(&format!("\n      {}. {}", i + 1, preview(step)));
            }
            out
        }
        ProgressEvent::Evidence {
            variable,
            tool,
            input,
            result,
        } => format!("{variable} = {tool}[{}] → {}", preview(input), preview(result)),
        ProgressEvent::Solve { answer } => format!("solved: {}", preview(answer)),
        ProgressEvent::ExecuteStart { index, step } => {
            format!("step {}: {}", index + 1, preview(step))
        }
        ProgressEvent::ExecuteDone { index, result, .. } => {
            format!("step {} done: {}", index + 1, preview(result))
        }
        ProgressEvent::Replan { steps } => format!("replanned, {} steps remaining", steps.len()),
        ProgressEvent::Done { answer } => {
            format!("done: {}", answer.as_deref().map_or("no answer".into(), preview))
        }
    }
}

/// First non-empty line, cut to a fixed number of characters.
fn preview(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    let more_lines = text.trim().lines().count() > 1;
    if line.chars().count() > PREVIEW_CHARS {
        let cut: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    } else if more_lines {
        format!("{line} …")
    } else {
        line.to_string()
    }
}

fn print_summary(report: &ComparisonReport) {
    println!();
    println!("  ══════════════════════ Results ══════════════════════");
    for result in &report.results {
        print_result(result);
    }
    println!();
}

fn print_result(result: &StrategyResult) {
    println!();
    println!("  {}", result.framework);
    match &result.answer {
        Some(answer) => {
            for (i, line) in answer.trim().lines().enumerate() {
                let label = if i == 0 { "Answer:" } else { "" };
                println!("    {label:<8}{line}");
            }
        }
        None => println!("    Answer: (none)"),
    }
    println!(
        "    Calls:  {}   Tokens: {}   Time: {:.1}s",
        result.llm_calls,
        result.usage.total_tokens,
        result.time_ms as f64 / 1000.0
    );
    if let Some(error) = &result.error {
        let marker = if result.cancelled { "Stopped:" } else { "Error:" };
        println!("    {marker} {error}");
    }
}
