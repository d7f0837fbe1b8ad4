//! Print the parsed form of an instruction file

use anyhow::{Context, Result};

/// Run the parse command
pub async fn run(file: &str) -> Result<()> {
    let source = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {file}"))?;
    let document = devins_core::parse(&source).with_context(|| format!("Failed to parse {file}"))?;

    for diagnostic in document.diagnostics() {
        tracing::warn!("{}", diagnostic);
    }
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}
