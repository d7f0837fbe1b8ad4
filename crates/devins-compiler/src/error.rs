//! Error types for the compiler
//!
//! The compiler core never returns these to its caller: every failure ends
//! up in a [`CompiledResult`](crate::CompiledResult). They are used inside
//! the pipeline, by capability implementations and by the facade's
//! `compile_to_string` convenience.

use thiserror::Error;

/// Fixed prefix of every error inlined into compiled output
pub const DEVINS_ERROR: &str = "<DevInsError>";

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while compiling
#[derive(Error, Debug)]
pub enum Error {
    /// Nested compilation went deeper than `max_recursion_depth`
    #[error("maximum recursion depth {max} exceeded")]
    RecursionLimit {
        /// Configured limit
        max: usize,
    },

    /// Compilation was cancelled by the caller
    #[error("compilation cancelled")]
    Cancelled,

    /// A nested compile failed
    #[error("nested compilation of '{source_name}' failed: {message}")]
    Nested {
        /// File or agent whose source was compiled
        source_name: String,
        /// Error message of the nested result
        message: String,
    },

    /// Command argument is missing or malformed
    #[error("/{command}: {message}")]
    InvalidArgument {
        /// Command name
        command: String,
        /// What is wrong with the argument
        message: String,
    },

    /// Error from the language layer
    #[error(transparent)]
    Core(#[from] devins_core::Error),

    /// Error from a capability
    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

/// Failures reported by capability implementations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// Path could not be resolved or read
    #[error("file not found: {path}")]
    FileNotFound {
        /// Requested path
        path: String,
    },

    /// Reading or writing failed
    #[error("IO error on {path}: {message}")]
    Io {
        /// Path involved
        path: String,
        /// Underlying error
        message: String,
    },

    /// Capability is not configured for this compile
    #[error("{capability} is not available")]
    Unavailable {
        /// Capability name
        capability: String,
    },

    /// External command exited unsuccessfully or could not start
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description including exit status or stderr
        message: String,
    },

    /// Operation exceeded its timeout
    #[error("timed out after {seconds}s: {operation}")]
    Timeout {
        /// What was running
        operation: String,
        /// Timeout in seconds
        seconds: u64,
    },

    /// Agent name is not registered
    #[error("agent not found: {name}")]
    AgentNotFound {
        /// Requested agent
        name: String,
    },

    /// Network request failed
    #[error("request to {url} failed: {message}")]
    Network {
        /// Requested URL
        url: String,
        /// Error message
        message: String,
    },

    /// Cancelled while the operation was in flight
    #[error("cancelled")]
    Cancelled,

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl CapabilityError {
    /// Inline form written into compiled output
    pub fn to_sentinel(&self) -> String {
        sentinel(self)
    }
}

/// Format a message with the [`DEVINS_ERROR`] prefix
pub fn sentinel(message: impl std::fmt::Display) -> String {
    format!("{DEVINS_ERROR} {message}")
}

/// Raised by `compile_to_string` when the compiled result failed
#[derive(Error, Debug, Clone, PartialEq)]
#[error("compilation failed: {message}")]
pub struct CompilationError {
    /// Error message of the failed result
    pub message: String,
    /// Output produced before the failure
    pub partial_output: String,
}
