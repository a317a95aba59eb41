//! `stratagem classify` — Show how a question would be classified.

use stratagem_agent::QuestionClassifier;
use stratagem_agent::classifier::classify_heuristic;
use stratagem_config::AppConfig;
use stratagem_core::Credential;
use tokio_util::sync::CancellationToken;

pub async fn run(question: String) -> Result<(), Box<dyn std::error::Error>> {
    let heuristic = classify_heuristic(&question);
    println!();
    println!("  Question:   {question}");
    match heuristic {
        Some(question_type) => println!("  Heuristic:  {question_type}"),
        None => println!("  Heuristic:  inconclusive"),
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if heuristic.is_some() {
        println!();
        return Ok(());
    }

    let credential = Credential::from_optional(config.api_key.as_deref());
    if credential.is_none() {
        println!("  Model:      skipped (no API key), defaulting to factual");
        println!();
        return Ok(());
    }

    let llm = stratagem_providers::build_from_config(&config);
    let classification = QuestionClassifier::new(llm, config.default_model.clone())
        .classify(&question, credential.as_ref(), &CancellationToken::new())
        .await?;

    let source = if classification.via_llm {
        "model"
    } else {
        "fallback"
    };
    println!("  Verdict:    {} ({source})", classification.question_type);
    println!();
    Ok(())
}
