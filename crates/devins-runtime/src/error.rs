//! Runtime error types

/// Result type for runtime operations
pub type Result<T> = anyhow::Result<T>;

/// Runtime error (anyhow for application-level errors)
pub type Error = anyhow::Error;
