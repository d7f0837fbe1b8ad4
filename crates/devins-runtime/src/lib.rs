//! DevIns Runtime
//!
//! Local-machine implementations of the compiler's capabilities, and the
//! workspace that wires them together from `devins.yaml`.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Workspace                         │
//! │  devins.yaml ──► Config ──► Capabilities                 │
//! │                               ├─ LocalFileSystem         │
//! │                               ├─ ProcessShellExecutor    │
//! │                               ├─ AgentRegistry (config)  │
//! │                               ├─ HttpCrawler             │
//! │                               └─ ThreadManager           │
//! │  DocumentCache ──► DevInsCompiler ──► CompiledResult     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use devins_runtime::Workspace;
//!
//! let workspace = Workspace::open_or_default(".")?;
//! let result = workspace
//!     .compile_file("prompts/review.devin", workspace.options(), &vars, cancel)
//!     .await?;
//! println!("{}", result.output);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agents;
pub mod cache;
pub mod crawler;
pub mod error;
pub mod fs;
pub mod shell;
pub mod threads;
pub mod workspace;

pub use agents::{InstructionAgent, ShellAgent, registry_from_config};
pub use cache::DocumentCache;
pub use crawler::HttpCrawler;
pub use error::{Error, Result};
pub use fs::LocalFileSystem;
pub use shell::ProcessShellExecutor;
pub use threads::{ThreadInfo, ThreadManager};
pub use workspace::{Workspace, WorkspaceManager};
