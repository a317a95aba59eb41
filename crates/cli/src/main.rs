//! stratagem CLI — the main entry point.
//!
//! Commands:
//! - `ask`      — Run reasoning strategies on a question and compare them
//! - `classify` — Show how a question is classified (factual / open-ended)
//! - `tools`    — List the tools available to the strategies
//! - `config`   — Show the effective configuration or write a default file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "stratagem",
    about = "stratagem — compare LLM reasoning strategies side by side",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question with one or more strategies
    Ask {
        /// The question to answer
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Strategy to run (cot, react, rewoo, plan-execute, all); repeatable
        #[arg(short, long = "strategy", value_name = "STRATEGY")]
        strategies: Vec<String>,

        /// Override the configured model
        #[arg(short, long)]
        model: Option<String>,

        /// Emit progress events and the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify a question as factual or open-ended
    Classify {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// List the available tools
    Tools,

    /// Show the effective configuration
    Config {
        /// Write a default config file instead
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file with --init
        #[arg(long, requires = "init")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ask {
            question,
            strategies,
            model,
            json,
        } => commands::ask::run(question.join(" "), strategies, model, json).await?,
        Commands::Classify { question } => commands::classify::run(question.join(" ")).await?,
        Commands::Tools => commands::tools::run().await?,
        Commands::Config { init, force } => {
            if init {
                commands::config_cmd::init(force).await?
            } else {
                commands::config_cmd::show().await?
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ask_collects_repeated_strategies() {
        let cli = Cli::try_parse_from([
            "stratagem", "ask", "-s", "cot", "--strategy", "react", "What", "is", "2+2?",
        ])
        .unwrap();
        match cli.command {
            Commands::Ask {
                question,
                strategies,
                ..
            } => {
                assert_eq!(question.join(" "), "What is 2+2?");
                assert_eq!(strategies, vec!["cot", "react"]);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn force_requires_init() {
        assert!(Cli::try_parse_from(["stratagem", "config", "--force"]).is_err());
    }
}
