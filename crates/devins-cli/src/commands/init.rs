//! Initialize a new DevIns project

use anyhow::Result;
use std::fs;
use std::path::Path;

use devins_core::CONFIG_FILE;

/// Run the init command
pub async fn run(path: &str, name: Option<&str>) -> Result<()> {
    let project_dir = Path::new(path);

    if !project_dir.exists() {
        fs::create_dir_all(project_dir)?;
    }

    let abs_path = project_dir.canonicalize()?;

    let project_name = match name {
        Some(n) => n.to_string(),
        None => abs_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Could not determine project name from path"))?,
    };

    if project_dir.join(CONFIG_FILE).exists() {
        anyhow::bail!(
            "Directory '{}' already contains a {}",
            project_dir.display(),
            CONFIG_FILE
        );
    }

    tracing::info!("Creating new DevIns project: {}", project_name);

    fs::create_dir_all(project_dir.join("prompts"))?;
    fs::create_dir_all(project_dir.join(".devins/commands"))?;
    fs::create_dir_all(project_dir.join(".devins/agents"))?;

    let config = format!(
        r#"# DevIns Project Configuration
name: {project_name}

options:
  strict: false
  max_recursion_depth: 10

# Variables available to every instruction as $name
vars:
  project: {project_name}

agents:
  - name: reviewer
    description: Review the text that follows
    type: instruction
    file: .devins/agents/reviewer.devin

shell:
  timeout_secs: 30
"#
    );
    fs::write(project_dir.join(CONFIG_FILE), config)?;

    let hello = r#"---
audience: "world"
---
Hello, $audience! Welcome to $project
"#;
    fs::write(project_dir.join("prompts/hello.devin"), hello)?;

    let summary = r#"Summarize $input in three bullet points.
"#;
    fs::write(project_dir.join(".devins/commands/summary.devin"), summary)?;

    let reviewer = r#"You are reviewing the following for $project: $input
"#;
    fs::write(project_dir.join(".devins/agents/reviewer.devin"), reviewer)?;

    tracing::info!(
        "✓ Created project '{}' at {}",
        project_name,
        abs_path.display()
    );
    tracing::info!("");
    tracing::info!("Next steps:");
    if path != "." {
        tracing::info!("  cd {}", project_dir.display());
    }
    tracing::info!("  devins validate                       # Check configuration");
    tracing::info!("  devins compile prompts/hello.devin    # Compile the sample");

    Ok(())
}
