//! DevIns Compiler
//!
//! This crate turns instruction documents into text for an agent:
//! - Capability traits for files, shell, agents, web fetches and background
//!   compiles, injected per compiler
//! - The node processor pipeline (`/commands`, `$variables`, `@agents`,
//!   front matter, `#if`/`#set`)
//! - The two-phase compiler core and the residual `$name` template pass
//! - A facade and a builder for callers that start from source text
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Source    │────▶│   Parser    │────▶│  Processors │────▶│  Template   │──▶ CompiledResult
//! │   (text)    │     │ (devins-core│     │  (phase 1)  │     │  (phase 2)  │
//! └─────────────┘     └─────────────┘     └──────┬──────┘     └─────────────┘
//!                                                │
//!                                         ┌──────▼──────┐
//!                                         │ Capabilities│
//!                                         │ fs / shell /│
//!                                         │ agents / web│
//!                                         └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use devins_compiler::DevIns;
//!
//! let result = DevIns::new()
//!     .compile_with_variables("Hello, $name!", [("name", "World")])
//!     .await;
//! assert_eq!(result.output, "Hello, World!");
//! assert_eq!(result.statistics.variable_count, 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod cancel;
pub mod capability;
pub mod compiler;
pub mod context;
pub mod error;
pub mod facade;
pub mod processors;
pub mod result;
pub mod template;

pub use builder::CompilerBuilder;
pub use cancel::CancellationToken;
pub use capability::{
    Agent, AgentRegistry, AgentReply, Capabilities, CapabilityResult, EmptyFileSystem,
    FileHandle, FileSystem, MemoryFileSystem, ShellExecutor, ShellOutput, ShellRequest,
    SpawnRequest, TaskSpawner, WebCrawler, WorkspaceProvider,
};
pub use compiler::DevInsCompiler;
pub use context::CompilerContext;
pub use error::{CapabilityError, CompilationError, DEVINS_ERROR, Error, Result};
pub use facade::{DevIns, builder, compile, compile_to_string, validate};
pub use processors::NodeProcessor;
pub use result::{CompiledResult, CompilerState, ProcessResult, Statistics, ValidationResult};
pub use template::TemplateCompiler;

pub use devins_core::{CompilerOptions, VariableScope, VariableTable};
