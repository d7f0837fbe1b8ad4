//! Compile an instruction file

use anyhow::{Context, Result};
use serde_json::Value;

use devins_compiler::{CancellationToken, VariableTable};
use devins_runtime::Workspace;

/// Output and behaviour switches of the compile command
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    /// Skip template substitution
    pub raw: bool,
    /// Strict mode
    pub strict: bool,
    /// Debug mode
    pub debug: bool,
    /// Print JSON instead of text
    pub json: bool,
}

/// Parse `name=value`. Values that are valid JSON keep their type; anything
/// else is a string.
pub fn parse_var(input: &str) -> Result<(String, Value), String> {
    let (name, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{input}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("variable name is empty in '{input}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

/// Run the compile command
pub async fn run(
    config_path: &str,
    file: &str,
    vars: Vec<(String, Value)>,
    flags: Flags,
) -> Result<()> {
    let workspace = Workspace::open_or_default(config_path)?;

    let mut options = workspace.options();
    options.strict |= flags.strict;
    options.debug |= flags.debug;
    if flags.raw {
        options.enable_template_compilation = false;
    }

    let path = std::path::absolute(file).with_context(|| format!("Invalid path {file}"))?;
    let variables: VariableTable = vars.into_iter().collect();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling compilation");
            on_interrupt.cancel();
        }
    });

    tracing::debug!("Compiling {}", path.display());
    let result = workspace
        .compile_file(&path, options, &variables, cancel)
        .await?;

    if flags.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.output);
    }

    for (id, background) in workspace.threads().wait_all().await {
        match background {
            Ok(thread) if thread.is_success() => {
                tracing::info!("Thread {} finished", id);
                println!("{}", thread.output);
            }
            Ok(thread) => tracing::error!(
                "Thread {} failed: {}",
                id,
                thread.error_message.unwrap_or_default()
            ),
            Err(err) => tracing::error!("Thread {} failed: {:#}", id, err),
        }
    }

    if result.has_error {
        anyhow::bail!(
            "Compilation of {} failed: {}",
            file,
            result.error_message.unwrap_or_default()
        );
    }
    tracing::debug!(
        "{} variables, {} commands, {} agents",
        result.statistics.variable_count,
        result.statistics.command_count,
        result.statistics.agent_count
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("name=Ada", "name", json!("Ada"))]
    #[case("n=3", "n", json!(3))]
    #[case("flag=true", "flag", json!(true))]
    #[case("list=[1,2]", "list", json!([1, 2]))]
    #[case("eq=a=b", "eq", json!("a=b"))]
    #[case("empty=", "empty", json!(""))]
    fn test_parse_var(#[case] input: &str, #[case] name: &str, #[case] value: Value) {
        assert_eq!(parse_var(input).unwrap(), (name.to_string(), value));
    }

    #[rstest]
    #[case("novalue")]
    #[case("=x")]
    fn test_parse_var_rejects(#[case] input: &str) {
        assert!(parse_var(input).is_err());
    }
}
