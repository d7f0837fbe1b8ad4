//! Integration tests for loading `devins.yaml`

use devins_core::{AgentKind, CONFIG_FILE, Config, Error};
use serde_json::json;
use tempfile::TempDir;

fn write_config(contents: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE), contents).unwrap();
    dir
}

#[test]
fn test_load_from_directory() {
    let dir = write_config(
        r#"
name: assistant
options:
  strict: true
  max_recursion_depth: 4
vars:
  team: platform
  retries: 3
agents:
  - name: lint
    type: shell
    command: echo linted
"#,
    );

    let config = Config::load(dir.path()).unwrap();
    assert_eq!(config.project.name, "assistant");
    assert!(config.project.options.strict);
    assert_eq!(config.project.options.max_recursion_depth, 4);
    assert!(config.project.options.enable_template_compilation);
    assert_eq!(config.base_path, dir.path());
    assert_eq!(
        config.project.agents[0].kind,
        AgentKind::Shell {
            command: "echo linted".to_string()
        }
    );

    let vars = config.variables().unwrap();
    assert_eq!(vars.get("team"), Some(&json!("platform")));
    assert_eq!(vars.get("retries"), Some(&json!(3)));
}

#[test]
fn test_load_from_file_path() {
    let dir = write_config("name: direct\n");
    let config = Config::load(dir.path().join("devins.yaml")).unwrap();
    assert_eq!(config.project.name, "direct");
    assert_eq!(config.base_path, dir.path());
}

#[test]
fn test_missing_config() {
    let dir = TempDir::new().unwrap();
    match Config::load(dir.path()) {
        Err(Error::ConfigNotFound { path }) => assert!(path.ends_with("devins.yaml")),
        other => panic!("Expected ConfigNotFound, got {other:?}"),
    }
}

#[test]
fn test_malformed_yaml() {
    let dir = write_config("name: [unclosed\n");
    assert!(matches!(Config::load(dir.path()), Err(Error::ConfigParse(_))));
}

#[test]
fn test_duplicate_agents_rejected() {
    let dir = write_config(
        "agents:\n  - name: a\n    type: shell\n    command: x\n  - name: a\n    type: shell\n    command: y\n",
    );
    assert!(matches!(Config::load(dir.path()), Err(Error::ConfigInvalid { .. })));
}
