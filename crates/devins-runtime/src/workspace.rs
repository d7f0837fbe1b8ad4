//! Workspace: a project directory with its configuration and capabilities

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use devins_compiler::{
    Capabilities, CancellationToken, CompiledResult, DevInsCompiler, FileSystem, ShellExecutor,
    TaskSpawner, WebCrawler, WorkspaceProvider,
};
use devins_core::{CONFIG_FILE, CompilerOptions, Config, VariableTable};

use crate::agents::registry_from_config;
use crate::cache::DocumentCache;
use crate::crawler::HttpCrawler;
use crate::error::Result;
use crate::fs::LocalFileSystem;
use crate::shell::ProcessShellExecutor;
use crate::threads::ThreadManager;

/// An opened project directory
pub struct Workspace {
    config: Config,
    root: PathBuf,
    capabilities: Capabilities,
    threads: ThreadManager,
    cache: DocumentCache,
}

impl Workspace {
    /// Open the project at `path` (a directory or a `devins.yaml` file)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        Ok(Self::from_config(config))
    }

    /// Open `path`, falling back to default settings when it has no
    /// `devins.yaml`
    pub fn open_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let dir = if path.is_dir() {
            path.to_path_buf()
        } else {
            path.parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
                .to_path_buf()
        };
        let config_path = if path.is_dir() {
            path.join(CONFIG_FILE)
        } else {
            path.to_path_buf()
        };
        if config_path.exists() {
            Self::open(&config_path)
        } else {
            tracing::debug!("No {} found in {}, using defaults", CONFIG_FILE, dir.display());
            Ok(Self::from_config(Config::with_defaults(dir)))
        }
    }

    /// Workspace for an already loaded configuration
    pub fn from_config(config: Config) -> Self {
        let root = std::fs::canonicalize(&config.base_path).unwrap_or_else(|_| config.base_path.clone());
        let threads = ThreadManager::new();
        let timeout = Duration::from_secs(config.project.shell.timeout_secs);

        let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new(&root));
        let shell: Arc<dyn ShellExecutor> = Arc::new(ProcessShellExecutor::new(&root));
        let agents = registry_from_config(&config.project.agents, fs.clone(), shell.clone(), timeout);

        let mut capabilities = Capabilities::default()
            .with_file_system(fs)
            .with_shell(shell)
            .with_agents(agents)
            .with_spawner(Arc::new(threads.clone()) as Arc<dyn TaskSpawner>)
            .with_commands_dir(&config.project.commands_dir)
            .with_shell_timeout(timeout);
        match HttpCrawler::new(timeout) {
            Ok(crawler) => {
                capabilities = capabilities.with_crawler(Arc::new(crawler) as Arc<dyn WebCrawler>);
            }
            Err(err) => tracing::warn!(error = %err, "web fetches disabled"),
        }
        capabilities.workspace = Some(display_name(&root));

        tracing::info!(
            project = %config.project.name,
            root = %root.display(),
            agents = config.project.agents.len(),
            "opened workspace"
        );

        Self {
            config,
            root,
            capabilities,
            threads,
            cache: DocumentCache::default(),
        }
    }

    /// Loaded configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Absolute project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Capability handles backed by this workspace
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Background compiles started by `/thread`
    pub fn threads(&self) -> &ThreadManager {
        &self.threads
    }

    /// Parsed document cache
    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    /// Compiler options from the configuration
    pub fn options(&self) -> CompilerOptions {
        self.config.project.options
    }

    /// Project variables from the configuration
    pub fn variables(&self) -> Result<VariableTable> {
        self.config
            .variables()
            .context("Failed to convert project variables")
    }

    /// Compiler for this workspace using `options`
    pub fn compiler(&self, options: CompilerOptions) -> DevInsCompiler {
        DevInsCompiler::new(options).with_capabilities(self.capabilities.clone())
    }

    /// Compile `source` with project variables, then `variables` on top
    pub async fn compile_source(
        &self,
        source: &str,
        options: CompilerOptions,
        variables: &VariableTable,
        cancel: CancellationToken,
    ) -> Result<CompiledResult> {
        let mut table = self.variables()?;
        table.extend(variables);

        let document = match self.cache.get_or_parse(source) {
            Ok(document) => document,
            Err(err) => {
                tracing::warn!(error = %err, "failed to parse instruction");
                return Ok(CompiledResult::failed(source, err.to_string()));
            }
        };
        Ok(self
            .compiler(options)
            .compile_with(&document, table, cancel)
            .await)
    }

    /// Read and compile an instruction file relative to the root (or
    /// absolute)
    pub async fn compile_file(
        &self,
        path: impl AsRef<Path>,
        options: CompilerOptions,
        variables: &VariableTable,
        cancel: CancellationToken,
    ) -> Result<CompiledResult> {
        let path = self.root.join(path.as_ref());
        let source = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        tracing::debug!(file = %path.display(), "compiling instruction file");
        self.compile_source(&source, options, variables, cancel).await
    }
}

impl WorkspaceProvider for Workspace {
    fn current_file_system(&self) -> Option<Arc<dyn FileSystem>> {
        Some(self.capabilities.file_system.clone())
    }

    fn root(&self) -> Option<String> {
        Some(display_name(&self.root))
    }
}

fn display_name(root: &Path) -> String {
    root.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}

/// Holds the currently open workspace, if any
#[derive(Default)]
pub struct WorkspaceManager {
    current: RwLock<Option<Arc<Workspace>>>,
}

impl WorkspaceManager {
    /// Manager with nothing open
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `path` and make it current
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Arc<Workspace>> {
        let workspace = Arc::new(Workspace::open_or_default(path)?);
        *self.write() = Some(workspace.clone());
        Ok(workspace)
    }

    /// Currently open workspace
    pub fn current(&self) -> Option<Arc<Workspace>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Close the current workspace
    pub fn close(&self) {
        *self.write() = None;
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Arc<Workspace>>> {
        self.current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl WorkspaceProvider for WorkspaceManager {
    fn current_file_system(&self) -> Option<Arc<dyn FileSystem>> {
        self.current()
            .and_then(|workspace| workspace.current_file_system())
    }

    fn root(&self) -> Option<String> {
        self.current().and_then(|workspace| WorkspaceProvider::root(workspace.as_ref()))
    }
}
