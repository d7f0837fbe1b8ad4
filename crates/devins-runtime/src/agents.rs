//! Agents declared in `devins.yaml`

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use devins_compiler::{
    Agent, AgentRegistry, AgentReply, CancellationToken, CapabilityError, CapabilityResult,
    FileSystem, ShellExecutor, ShellRequest,
};
use devins_core::{AgentConfig, AgentKind};

/// Environment variable holding the agent input for shell agents
pub const INPUT_ENV: &str = "DEVINS_INPUT";

/// Agent that compiles an instruction file with `$input` bound
pub struct InstructionAgent {
    name: String,
    description: String,
    file: String,
    fs: Arc<dyn FileSystem>,
}

impl InstructionAgent {
    /// Agent reading `file` through `fs`
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        file: impl Into<String>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            file: file.into(),
            fs,
        }
    }
}

#[async_trait]
impl Agent for InstructionAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, input: &str, _cancel: &CancellationToken) -> CapabilityResult<AgentReply> {
        let handle = self
            .fs
            .resolve(&self.file)
            .ok_or_else(|| CapabilityError::FileNotFound {
                path: self.file.clone(),
            })?;
        let source = self.fs.read(&handle).await?;
        Ok(AgentReply::Instruction {
            name: self.file.clone(),
            source,
            variables: vec![("input".to_string(), Value::String(input.to_string()))],
        })
    }
}

/// Agent that runs a command line with the input in [`INPUT_ENV`]
pub struct ShellAgent {
    name: String,
    description: String,
    command: String,
    shell: Arc<dyn ShellExecutor>,
    timeout: Duration,
}

impl ShellAgent {
    /// Agent running `command` through `shell`
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        command: impl Into<String>,
        shell: Arc<dyn ShellExecutor>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            command: command.into(),
            shell,
            timeout,
        }
    }
}

#[async_trait]
impl Agent for ShellAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, input: &str, cancel: &CancellationToken) -> CapabilityResult<AgentReply> {
        let request = ShellRequest::new(&self.command, self.timeout).env(INPUT_ENV, input);
        let output = self.shell.execute(request, cancel).await?;
        if !output.success() {
            let status = output
                .exit_code
                .map_or_else(|| "signal".to_string(), |code| code.to_string());
            return Err(CapabilityError::CommandFailed {
                message: format!("agent '{}' exited with status {status}: {}", self.name, output.text()),
            });
        }
        Ok(AgentReply::Text(output.text()))
    }
}

/// Build a registry from configured agents
pub fn registry_from_config(
    agents: &[AgentConfig],
    fs: Arc<dyn FileSystem>,
    shell: Arc<dyn ShellExecutor>,
    timeout: Duration,
) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    for agent in agents {
        match &agent.kind {
            AgentKind::Instruction { file } => registry.register(InstructionAgent::new(
                &agent.name,
                &agent.description,
                file,
                fs.clone(),
            )),
            AgentKind::Shell { command } => registry.register(ShellAgent::new(
                &agent.name,
                &agent.description,
                command,
                shell.clone(),
                timeout,
            )),
        };
        tracing::debug!(agent = %agent.name, "registered agent");
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use devins_compiler::{MemoryFileSystem, ShellOutput};

    struct FixedShell(ShellOutput);

    #[async_trait]
    impl ShellExecutor for FixedShell {
        async fn execute(
            &self,
            request: ShellRequest,
            _cancel: &CancellationToken,
        ) -> CapabilityResult<ShellOutput> {
            assert_eq!(request.env, vec![(INPUT_ENV.to_string(), "hi".to_string())]);
            Ok(self.0.clone())
        }
    }

    fn shell(exit_code: i32, stdout: &str) -> Arc<dyn ShellExecutor> {
        Arc::new(FixedShell(ShellOutput {
            exit_code: Some(exit_code),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }))
    }

    #[tokio::test]
    async fn test_instruction_agent() {
        let fs = Arc::new(MemoryFileSystem::with_files([("agents/r.devin", "Review $input")]));
        let agent = InstructionAgent::new("r", "", "agents/r.devin", fs);
        let reply = agent.invoke("diff", &CancellationToken::new()).await.unwrap();
        assert_eq!(
            reply,
            AgentReply::Instruction {
                name: "agents/r.devin".into(),
                source: "Review $input".into(),
                variables: vec![("input".into(), Value::String("diff".into()))],
            }
        );
    }

    #[tokio::test]
    async fn test_instruction_agent_missing_file() {
        let agent = InstructionAgent::new("r", "", "nope.devin", Arc::new(MemoryFileSystem::new()));
        let err = agent.invoke("", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CapabilityError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_shell_agent() {
        let agent = ShellAgent::new("lint", "", "lint", shell(0, "clean\n"), Duration::from_secs(1));
        let reply = agent.invoke("hi", &CancellationToken::new()).await.unwrap();
        assert_eq!(reply, AgentReply::Text("clean".into()));

        let failing = ShellAgent::new("lint", "", "lint", shell(1, "bad"), Duration::from_secs(1));
        assert!(failing.invoke("hi", &CancellationToken::new()).await.is_err());
    }

    #[test]
    fn test_registry_from_config() {
        let configs: Vec<AgentConfig> = serde_yaml::from_str(
            "- name: a\n  type: instruction\n  file: a.devin\n- name: b\n  description: B\n  type: shell\n  command: echo\n",
        )
        .unwrap();
        let registry = registry_from_config(
            &configs,
            Arc::new(MemoryFileSystem::new()),
            shell(0, ""),
            Duration::from_secs(1),
        );
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(registry.get("b").unwrap().description(), "B");
    }
}
