//! Error types for devins-core

use thiserror::Error;

use crate::span::Position;

/// Result type alias for devins-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in devins-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// Source text could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Expression could not be compiled or evaluated
    #[error("expression error in '{expression}': {message}")]
    Expression {
        /// Expression source as written in the document
        expression: String,
        /// Description of the error
        message: String,
    },

    /// Pattern-action pipeline failed
    #[error("pipeline error in '{function}': {message}")]
    Pipeline {
        /// Name of the pipeline function
        function: String,
        /// Description of the error
        message: String,
    },

    /// Invalid regex pattern
    #[error("invalid regex pattern '{pattern}': {message}")]
    InvalidRegex {
        /// The pattern that failed
        pattern: String,
        /// Error message
        message: String,
    },

    /// Unified diff could not be applied
    #[error("patch failed: {message}")]
    Patch {
        /// Description of the failing hunk
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Unrecoverable parse failure with the position where it was detected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parse error at {position}: {message}")]
pub struct ParseError {
    /// Description of the failure
    pub message: String,
    /// Where the failure was detected
    pub position: Position,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}
