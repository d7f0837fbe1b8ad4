//! Capability interfaces
//!
//! Everything the compiler does outside of string processing goes through
//! the handles in [`Capabilities`]: file access, shell execution, agents,
//! web fetches and background tasks. They are injected when a compile is
//! set up; the compiler never looks up a global workspace.
//!
//! `devins-runtime` provides implementations backed by the local machine.
//! [`EmptyFileSystem`] and [`MemoryFileSystem`] live here so the compiler is
//! usable (and testable) without it.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use devins_core::{CompilerOptions, VariableTable};

use crate::cancel::CancellationToken;
use crate::compiler::DevInsCompiler;
use crate::error::CapabilityError;

/// Capability call result
pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

// =============================================================================
// File system
// =============================================================================

/// A resolved file location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    /// Normalized path relative to the file-system root
    pub path: String,
    /// Backing location (an absolute path for on-disk file systems)
    pub location: PathBuf,
}

/// File access used by file-based commands
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Map a document path to a handle. `None` when the path cannot be
    /// addressed at all, e.g. it escapes the root.
    fn resolve(&self, path: &str) -> Option<FileHandle>;

    /// Read a whole file
    async fn read(&self, handle: &FileHandle) -> CapabilityResult<String>;

    /// Create or replace a file
    async fn write(&self, handle: &FileHandle, text: &str) -> CapabilityResult<()>;

    /// Whether a file or directory exists at `path`
    async fn exists(&self, path: &str) -> bool;

    /// List paths under `dir` (`""` is the root). Non-recursive listings
    /// mark directories with a trailing `/`.
    async fn list(&self, dir: &str, recursive: bool) -> CapabilityResult<Vec<String>> {
        let _ = (dir, recursive);
        Ok(Vec::new())
    }
}

/// File system with no files, used when no workspace is available
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyFileSystem;

#[async_trait]
impl FileSystem for EmptyFileSystem {
    fn resolve(&self, _path: &str) -> Option<FileHandle> {
        None
    }

    async fn read(&self, handle: &FileHandle) -> CapabilityResult<String> {
        Err(CapabilityError::FileNotFound {
            path: handle.path.clone(),
        })
    }

    async fn write(&self, handle: &FileHandle, _text: &str) -> CapabilityResult<()> {
        Err(CapabilityError::Unavailable {
            capability: format!("writing {}", handle.path),
        })
    }

    async fn exists(&self, _path: &str) -> bool {
        false
    }
}

/// In-memory file system keyed by normalized path
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RwLock<BTreeMap<String, String>>,
}

impl MemoryFileSystem {
    /// Create an empty file system
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a file system holding `files`
    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<String>,
    {
        let files = files
            .into_iter()
            .filter_map(|(path, contents)| {
                normalize_path(path.as_ref()).map(|path| (path, contents.into()))
            })
            .collect();
        Self {
            files: RwLock::new(files),
        }
    }

    /// Current contents of `path`
    pub async fn get(&self, path: &str) -> Option<String> {
        let path = normalize_path(path)?;
        self.files.read().await.get(&path).cloned()
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    fn resolve(&self, path: &str) -> Option<FileHandle> {
        let path = normalize_path(path)?;
        Some(FileHandle {
            location: PathBuf::from(&path),
            path,
        })
    }

    async fn read(&self, handle: &FileHandle) -> CapabilityResult<String> {
        self.files
            .read()
            .await
            .get(&handle.path)
            .cloned()
            .ok_or_else(|| CapabilityError::FileNotFound {
                path: handle.path.clone(),
            })
    }

    async fn write(&self, handle: &FileHandle, text: &str) -> CapabilityResult<()> {
        self.files
            .write()
            .await
            .insert(handle.path.clone(), text.to_string());
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        let Some(path) = normalize_path(path) else {
            return false;
        };
        let dir = format!("{path}/");
        let files = self.files.read().await;
        files.contains_key(&path) || files.keys().any(|key| key.starts_with(&dir))
    }

    async fn list(&self, dir: &str, recursive: bool) -> CapabilityResult<Vec<String>> {
        let prefix = match normalize_path(dir) {
            Some(dir) => format!("{dir}/"),
            None => String::new(),
        };
        let files = self.files.read().await;
        let mut out = BTreeSet::new();
        for path in files.keys() {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child, _)) if !recursive => out.insert(format!("{prefix}{child}/")),
                _ => out.insert(path.clone()),
            };
        }
        Ok(out.into_iter().collect())
    }
}

/// Normalize a relative path: strip `./` and duplicate slashes. `None` for
/// empty paths and paths containing `..`.
pub fn normalize_path(path: &str) -> Option<String> {
    let parts: Vec<&str> = path
        .trim()
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    if parts.is_empty() || parts.contains(&"..") {
        return None;
    }
    Some(parts.join("/"))
}

// =============================================================================
// Shell
// =============================================================================

/// A command line to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRequest {
    /// Command line passed to the shell
    pub command: String,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Per-command timeout
    pub timeout: Duration,
}

impl ShellRequest {
    /// Request with no extra environment
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            env: Vec::new(),
            timeout,
        }
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Captured result of a shell command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShellOutput {
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl ShellOutput {
    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Text inlined into the output: stdout, then stderr when present
    pub fn text(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();
        match (stdout.is_empty(), stderr.is_empty()) {
            (_, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }
}

/// Runs OS-level commands
#[async_trait]
pub trait ShellExecutor: Send + Sync {
    /// Execute `request`, honouring its timeout and `cancel`
    async fn execute(
        &self,
        request: ShellRequest,
        cancel: &CancellationToken,
    ) -> CapabilityResult<ShellOutput>;
}

// =============================================================================
// Agents
// =============================================================================

/// What an agent hands back
#[derive(Debug, Clone, PartialEq)]
pub enum AgentReply {
    /// Text inlined as-is
    Text(String),
    /// Instruction source the compiler compiles in place, with extra
    /// variables bound
    Instruction {
        /// Name used in logs and errors
        name: String,
        /// Source text to compile
        source: String,
        /// Variables bound for the nested compile
        variables: Vec<(String, Value)>,
    },
}

/// An invokable sub-agent or tool
#[async_trait]
pub trait Agent: Send + Sync {
    /// Name used after `@`
    fn name(&self) -> &str;

    /// One-line description
    fn description(&self) -> &str {
        ""
    }

    /// Run the agent on `input` (the rest of the line after the reference)
    async fn invoke(&self, input: &str, cancel: &CancellationToken) -> CapabilityResult<AgentReply>;
}

/// Name to agent directory
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its own name
    pub fn register(&mut self, agent: impl Agent + 'static) -> &mut Self {
        self.register_arc(Arc::new(agent))
    }

    /// Register a shared agent
    pub fn register_arc(&mut self, agent: Arc<dyn Agent>) -> &mut Self {
        self.agents.insert(agent.name().to_string(), agent);
        self
    }

    /// Look up an agent
    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// Registered names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }

    /// Number of agents
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agent is registered
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.agents.keys()).finish()
    }
}

// =============================================================================
// Web, background tasks, workspace
// =============================================================================

/// Fetches web pages for `/browse` and `/crawl`
#[async_trait]
pub trait WebCrawler: Send + Sync {
    /// Fetch `url` and return its text content
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> CapabilityResult<String>;
}

/// A background compile requested by `/thread`
pub struct SpawnRequest {
    /// Instruction file being compiled
    pub name: String,
    /// Its source
    pub source: String,
    /// Compiler to run it with
    pub compiler: DevInsCompiler,
    /// Options in effect at the spawn point
    pub options: CompilerOptions,
    /// Variables in effect at the spawn point
    pub variables: VariableTable,
    /// Nesting depth the spawned compile starts at
    pub depth: usize,
    /// Token of the spawning compile
    pub cancel: CancellationToken,
}

impl fmt::Debug for SpawnRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnRequest")
            .field("name", &self.name)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

/// Runs compiles in the background
#[async_trait]
pub trait TaskSpawner: Send + Sync {
    /// Start `request` and return a task id without waiting for it
    async fn spawn(&self, request: SpawnRequest) -> CapabilityResult<String>;
}

/// Supplies the file system of the current workspace
pub trait WorkspaceProvider: Send + Sync {
    /// File system of the current workspace, if one is open
    fn current_file_system(&self) -> Option<Arc<dyn FileSystem>>;

    /// Display name of the workspace root, exposed as `$workspace`
    fn root(&self) -> Option<String> {
        None
    }
}

// =============================================================================
// Capabilities
// =============================================================================

/// Default per-command shell timeout
pub const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default location of custom command files
pub const DEFAULT_COMMANDS_DIR: &str = ".devins/commands";

/// Capability handles for one compiler
#[derive(Clone)]
pub struct Capabilities {
    /// File access
    pub file_system: Arc<dyn FileSystem>,
    /// Shell execution
    pub shell: Option<Arc<dyn ShellExecutor>>,
    /// Agent directory
    pub agents: Option<AgentRegistry>,
    /// Web fetches
    pub crawler: Option<Arc<dyn WebCrawler>>,
    /// Background compiles
    pub spawner: Option<Arc<dyn TaskSpawner>>,
    /// Directory searched for custom commands
    pub commands_dir: String,
    /// Timeout applied to each shell command
    pub shell_timeout: Duration,
    /// Workspace root shown as `$workspace`
    pub workspace: Option<String>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            file_system: Arc::new(EmptyFileSystem),
            shell: None,
            agents: None,
            crawler: None,
            spawner: None,
            commands_dir: DEFAULT_COMMANDS_DIR.to_string(),
            shell_timeout: DEFAULT_SHELL_TIMEOUT,
            workspace: None,
        }
    }
}

impl Capabilities {
    /// Capabilities with the workspace's file system, or an empty one when
    /// no workspace is open
    pub fn from_workspace(workspace: &dyn WorkspaceProvider) -> Self {
        let mut capabilities = Self::default();
        if let Some(fs) = workspace.current_file_system() {
            capabilities.file_system = fs;
        }
        capabilities.workspace = workspace.root();
        capabilities
    }

    /// Use `fs` for file access
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.file_system = fs;
        self
    }

    /// Use `shell` for command execution
    pub fn with_shell(mut self, shell: Arc<dyn ShellExecutor>) -> Self {
        self.shell = Some(shell);
        self
    }

    /// Use `agents` for `@name` references
    pub fn with_agents(mut self, agents: AgentRegistry) -> Self {
        self.agents = Some(agents);
        self
    }

    /// Use `crawler` for web fetches
    pub fn with_crawler(mut self, crawler: Arc<dyn WebCrawler>) -> Self {
        self.crawler = Some(crawler);
        self
    }

    /// Use `spawner` for `/thread`
    pub fn with_spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Look for custom commands in `dir`
    pub fn with_commands_dir(mut self, dir: impl Into<String>) -> Self {
        self.commands_dir = dir.into();
        self
    }

    /// Per-command shell timeout
    pub fn with_shell_timeout(mut self, timeout: Duration) -> Self {
        self.shell_timeout = timeout;
        self
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("shell", &self.shell.is_some())
            .field("agents", &self.agents)
            .field("crawler", &self.crawler.is_some())
            .field("spawner", &self.spawner.is_some())
            .field("commands_dir", &self.commands_dir)
            .field("shell_timeout", &self.shell_timeout)
            .field("workspace", &self.workspace)
            .finish_non_exhaustive()
    }
}
