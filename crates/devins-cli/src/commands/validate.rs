//! Validate configuration and instruction files

use anyhow::{Context, Result};
use std::path::Path;

use devins_core::Config;

/// Run the validate command
pub async fn run(config_path: &str, file: Option<&str>) -> Result<()> {
    if Path::new(config_path).exists() {
        tracing::info!("Validating configuration: {}", config_path);
        let config = Config::load(config_path).context("Failed to load configuration")?;
        config
            .variables()
            .context("Failed to convert project variables")?;

        tracing::info!("✓ Project: {}", config.project.name);
        tracing::info!("✓ Agents: {}", config.project.agents.len());
        tracing::info!("✓ Commands directory: {}", config.project.commands_dir);
    } else if file.is_none() {
        anyhow::bail!("Configuration file '{}' not found", config_path);
    }

    let Some(file) = file else {
        tracing::info!("✓ Configuration is valid");
        return Ok(());
    };

    tracing::info!("Validating instruction: {}", file);
    let source = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {file}"))?;
    let validation = devins_compiler::validate(&source);

    for warning in &validation.warnings {
        tracing::warn!("{}", warning);
    }
    if !validation.is_valid {
        for error in &validation.errors {
            tracing::error!("{}", error);
        }
        anyhow::bail!(
            "{} is invalid: {}",
            file,
            validation.errors.join("; ")
        );
    }

    tracing::info!("✓ {} is valid", file);
    Ok(())
}
