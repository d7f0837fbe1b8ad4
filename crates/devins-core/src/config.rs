//! Configuration parsing
//!
//! Projects may carry a `devins.yaml` at their root:
//!
//! ```yaml
//! name: my-assistant
//! options:
//!   strict: false
//!   max_recursion_depth: 8
//! vars:
//!   team: platform
//! agents:
//!   - name: reviewer
//!     description: Reviews a diff
//!     type: instruction
//!     file: .devins/agents/reviewer.devin
//!   - name: lint
//!     type: shell
//!     command: cargo clippy --message-format short
//! shell:
//!   timeout_secs: 60
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::variables::{VariableScope, VariableTable};

/// File name looked up when a directory is given to [`Config::load`]
pub const CONFIG_FILE: &str = "devins.yaml";

/// Per-compile options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerOptions {
    /// Record extra detail in warnings and logs
    #[serde(default)]
    pub debug: bool,

    /// Treat processor failures and unresolved variables as errors
    #[serde(default)]
    pub strict: bool,

    /// Deepest nested compile allowed
    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: usize,

    /// Run the `$name` substitution pass over the output
    #[serde(default = "default_true")]
    pub enable_template_compilation: bool,

    /// Keep the output as it was before template substitution
    #[serde(default)]
    pub keep_raw_output: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            debug: false,
            strict: false,
            max_recursion_depth: default_max_recursion_depth(),
            enable_template_compilation: true,
            keep_raw_output: false,
        }
    }
}

fn default_max_recursion_depth() -> usize {
    10
}

fn default_true() -> bool {
    true
}

/// Root project configuration from `devins.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    #[serde(default = "default_name")]
    pub name: String,

    /// Default compiler options
    #[serde(default)]
    pub options: CompilerOptions,

    /// Variables available to every instruction
    #[serde(default)]
    pub vars: HashMap<String, serde_yaml::Value>,

    /// Agents that `@name` references resolve to
    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    /// Shell execution settings
    #[serde(default)]
    pub shell: ShellConfig,

    /// Directory holding custom command files (`<name>.devin`)
    #[serde(default = "default_commands_dir")]
    pub commands_dir: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            options: CompilerOptions::default(),
            vars: HashMap::new(),
            agents: Vec::new(),
            shell: ShellConfig::default(),
            commands_dir: default_commands_dir(),
        }
    }
}

fn default_name() -> String {
    "devins".to_string()
}

fn default_commands_dir() -> String {
    ".devins/commands".to_string()
}

/// Agent definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Name used after `@`
    pub name: String,

    /// Short description
    #[serde(default)]
    pub description: String,

    /// How the agent runs
    #[serde(flatten)]
    pub kind: AgentKind,
}

/// Agent implementations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentKind {
    /// Compile another instruction file with `$input` bound
    Instruction {
        /// Instruction file, relative to the project root
        file: String,
    },
    /// Run a shell command with the input in `DEVINS_INPUT`
    Shell {
        /// Command line
        command: String,
    },
}

/// Shell execution settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShellConfig {
    /// Timeout applied to each command
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Main configuration container
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Base path of the project
    pub base_path: PathBuf,
}

impl Config {
    /// Load configuration from a directory or a `devins.yaml` path
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = Config::load("./my-project")?;
    /// println!("Project: {}", config.project.name);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_path) = if path.is_dir() {
            (path.join(CONFIG_FILE), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let project: ProjectConfig = serde_yaml::from_str(&contents)?;
        project.validate()?;

        tracing::debug!(
            "Loaded project '{}' from {}",
            project.name,
            config_path.display()
        );

        Ok(Self { project, base_path })
    }

    /// Default configuration rooted at `base_path`
    pub fn with_defaults(base_path: impl Into<PathBuf>) -> Self {
        Self {
            project: ProjectConfig::default(),
            base_path: base_path.into(),
        }
    }

    /// Project variables as a `UserDefined` table
    pub fn variables(&self) -> Result<VariableTable> {
        let mut table = VariableTable::new();
        for (name, value) in &self.project.vars {
            table.set(name.clone(), serde_json::to_value(value)?, VariableScope::UserDefined);
        }
        Ok(table)
    }
}

impl ProjectConfig {
    fn validate(&self) -> Result<()> {
        if self.options.max_recursion_depth == 0 {
            return Err(Error::ConfigInvalid {
                message: "options.max_recursion_depth must be at least 1".to_string(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.name.as_str()) {
                return Err(Error::ConfigInvalid {
                    message: format!("agent '{}' is defined twice", agent.name),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiler_options_defaults() {
        let options = CompilerOptions::default();
        assert!(!options.debug);
        assert!(!options.strict);
        assert_eq!(options.max_recursion_depth, 10);
        assert!(options.enable_template_compilation);
        assert!(!options.keep_raw_output);
    }

    #[test]
    fn test_parse_minimal_config() {
        let project: ProjectConfig = serde_yaml::from_str("name: demo\n").unwrap();
        assert_eq!(project.name, "demo");
        assert_eq!(project.commands_dir, ".devins/commands");
        assert_eq!(project.shell.timeout_secs, 30);
        assert!(project.options.enable_template_compilation);
    }

    #[test]
    fn test_parse_agents() {
        let yaml = r#"
agents:
  - name: reviewer
    type: instruction
    file: agents/reviewer.devin
  - name: lint
    description: Run the linter
    type: shell
    command: echo ok
"#;
        let project: ProjectConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(project.agents.len(), 2);
        assert_eq!(
            project.agents[0].kind,
            AgentKind::Instruction {
                file: "agents/reviewer.devin".to_string()
            }
        );
        assert_eq!(project.agents[1].description, "Run the linter");
    }

    #[test]
    fn test_config_not_found() {
        let dir = std::env::temp_dir().join("devins_config_missing_test");
        let _ = std::fs::create_dir_all(&dir);
        let _ = std::fs::remove_file(dir.join(CONFIG_FILE));
        let result = Config::load(&dir);
        assert!(matches!(result, Err(Error::ConfigNotFound { .. })));
    }

    #[test]
    fn test_zero_recursion_depth_is_invalid() {
        let project: ProjectConfig =
            serde_yaml::from_str("options:\n  max_recursion_depth: 0\n").unwrap();
        assert!(matches!(project.validate(), Err(Error::ConfigInvalid { .. })));
    }
}
