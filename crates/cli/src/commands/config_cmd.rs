//! `stratagem config` — Show or initialize the configuration.

use stratagem_config::AppConfig;

/// Print the effective configuration, credential redacted.
pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let config_path = AppConfig::config_dir().join("config.toml");

    println!("# {}", config_path.display());
    if !config_path.exists() {
        println!("# (no file; defaults plus environment overrides)");
    }
    println!("{}", render_redacted(&config)?);
    Ok(())
}

/// Write the default configuration file.
pub async fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if config_path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        )
        .into());
    }

    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Wrote {}", config_path.display());
    println!("   Set OPENROUTER_API_KEY (or add api_key to the file) to get started.");
    Ok(())
}

fn render_redacted(config: &AppConfig) -> Result<String, toml::ser::Error> {
    let mut redacted = config.clone();
    if redacted.api_key.is_some() {
        redacted.api_key = Some("[REDACTED]".into());
    }
    toml::to_string_pretty(&redacted)
}
