//! `stratagem tools` — List the tools available to the strategies.

use stratagem_config::AppConfig;
use stratagem_core::ToolKind;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let llm = stratagem_providers::build_from_config(&config);
    let registry = stratagem_tools::default_registry(&llm, &config);

    println!("🧰 Available Tools");
    println!("==================");
    println!();
    println!("{}", registry.descriptions());
    println!();
    println!("  Names and aliases:");
    for kind in ToolKind::ALL {
        println!("    {:<18} {}", kind.to_string(), kind.names().join(", "));
    }
    println!();
    println!("  ReWOO plans may also use LLM[input] for pure reasoning steps.");
    println!("  Web search uses model: {}", config.search_model);

    Ok(())
}
