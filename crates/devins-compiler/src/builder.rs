//! Fluent compile setup
//!
//! ```rust,ignore
//! let result = devins_compiler::builder()
//!     .debug(true)
//!     .variable("x", "1")
//!     .compile("x is $x")
//!     .await;
//! ```

use serde_json::Value;
use std::sync::Arc;

use devins_core::{CompilerOptions, VariableScope, VariableTable};

use crate::cancel::CancellationToken;
use crate::capability::{
    AgentRegistry, Capabilities, FileSystem, ShellExecutor, TaskSpawner, WebCrawler,
};
use crate::compiler::DevInsCompiler;
use crate::error::CompilationError;
use crate::facade::into_output;
use crate::result::CompiledResult;

/// Collects options, variables and capabilities for one compile
#[derive(Debug, Clone, Default)]
pub struct CompilerBuilder {
    options: CompilerOptions,
    variables: VariableTable,
    capabilities: Capabilities,
    cancel: CancellationToken,
}

impl CompilerBuilder {
    /// Builder with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `debug`
    pub fn debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    /// Set `strict`
    pub fn strict(mut self, strict: bool) -> Self {
        self.options.strict = strict;
        self
    }

    /// Set `max_recursion_depth`
    pub fn max_recursion_depth(mut self, depth: usize) -> Self {
        self.options.max_recursion_depth = depth;
        self
    }

    /// Set `enable_template_compilation`
    pub fn enable_template_compilation(mut self, enable: bool) -> Self {
        self.options.enable_template_compilation = enable;
        self
    }

    /// Set `keep_raw_output`
    pub fn keep_raw_output(mut self, keep: bool) -> Self {
        self.options.keep_raw_output = keep;
        self
    }

    /// Replace all options
    pub fn options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    /// Add a user variable
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.set(name, value, VariableScope::UserDefined);
        self
    }

    /// Add every entry of `variables`, keeping their scopes
    pub fn variables(mut self, variables: &VariableTable) -> Self {
        self.variables.extend(variables);
        self
    }

    /// Use `fs` for file access
    pub fn file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.capabilities = self.capabilities.with_file_system(fs);
        self
    }

    /// Use `shell` for command execution
    pub fn shell(mut self, shell: Arc<dyn ShellExecutor>) -> Self {
        self.capabilities = self.capabilities.with_shell(shell);
        self
    }

    /// Use `agents` for `@name` references
    pub fn agents(mut self, agents: AgentRegistry) -> Self {
        self.capabilities = self.capabilities.with_agents(agents);
        self
    }

    /// Use `crawler` for web fetches
    pub fn crawler(mut self, crawler: Arc<dyn WebCrawler>) -> Self {
        self.capabilities = self.capabilities.with_crawler(crawler);
        self
    }

    /// Use `spawner` for `/thread`
    pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
        self.capabilities = self.capabilities.with_spawner(spawner);
        self
    }

    /// Replace all capabilities
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Compile under `cancel`
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build a reusable compiler. Variables and the cancellation token only
    /// apply to [`CompilerBuilder::compile`].
    pub fn build(&self) -> DevInsCompiler {
        DevInsCompiler::new(self.options).with_capabilities(self.capabilities.clone())
    }

    /// Compile `source` with everything collected so far
    pub async fn compile(self, source: &str) -> CompiledResult {
        let compiler = self.build();
        compiler
            .compile_at(source, self.options, self.variables, 0, self.cancel)
            .await
    }

    /// Compile `source` and return its output
    pub async fn compile_to_string(self, source: &str) -> Result<String, CompilationError> {
        into_output(self.compile(source).await)
    }
}
