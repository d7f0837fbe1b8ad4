//! Convenience API over [`DevInsCompiler`]

use serde_json::Value;

use devins_core::{CompilerOptions, FrontMatterValue, VariableTable};

use crate::builder::CompilerBuilder;
use crate::cancel::CancellationToken;
use crate::capability::{Capabilities, WorkspaceProvider};
use crate::compiler::DevInsCompiler;
use crate::error::CompilationError;
use crate::processors::option_override;
use crate::result::{CompiledResult, ValidationResult};

/// Entry point for callers that compile source text
///
/// # Example
///
/// ```rust,ignore
/// let devins = DevIns::new();
/// let result = devins
///     .compile_with_variables("Hello, $name!", [("name", "World")])
///     .await;
/// assert_eq!(result.output, "Hello, World!");
/// ```
#[derive(Debug, Clone, Default)]
pub struct DevIns {
    compiler: DevInsCompiler,
}

impl DevIns {
    /// Facade with default options and no capabilities
    pub fn new() -> Self {
        Self::default()
    }

    /// Facade over explicit capabilities
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            compiler: DevInsCompiler::default().with_capabilities(capabilities),
        }
    }

    /// Facade over the current workspace of `provider`
    pub fn with_workspace(provider: &dyn WorkspaceProvider) -> Self {
        Self::with_capabilities(Capabilities::from_workspace(provider))
    }

    /// Replace the default options
    pub fn with_options(self, options: CompilerOptions) -> Self {
        let capabilities = self.compiler.capabilities().clone();
        Self {
            compiler: DevInsCompiler::new(options).with_capabilities(capabilities),
        }
    }

    /// Underlying compiler
    pub fn compiler(&self) -> &DevInsCompiler {
        &self.compiler
    }

    /// Default options
    pub fn options(&self) -> CompilerOptions {
        *self.compiler.options()
    }

    /// Compile `source`
    pub async fn compile(&self, source: &str) -> CompiledResult {
        self.compile_with(source, self.options(), VariableTable::new())
            .await
    }

    /// Compile `source` with user variables
    pub async fn compile_with_variables<I, K, V>(&self, source: &str, variables: I) -> CompiledResult
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.compile_with(source, self.options(), variables.into_iter().collect())
            .await
    }

    /// Compile `source` with explicit options and variables
    pub async fn compile_with(
        &self,
        source: &str,
        options: CompilerOptions,
        variables: VariableTable,
    ) -> CompiledResult {
        self.compile_cancellable(source, options, variables, CancellationToken::new())
            .await
    }

    /// Compile `source`; cancelling `cancel` stops the walk and fails the
    /// result
    pub async fn compile_cancellable(
        &self,
        source: &str,
        options: CompilerOptions,
        variables: VariableTable,
        cancel: CancellationToken,
    ) -> CompiledResult {
        self.compiler
            .compile_at(source, options, variables, 0, cancel)
            .await
    }

    /// Compile without the template pass, leaving residual `$name` tokens
    pub async fn compile_raw(&self, source: &str) -> CompiledResult {
        let options = CompilerOptions {
            enable_template_compilation: false,
            ..self.options()
        };
        self.compile_with(source, options, VariableTable::new())
            .await
    }

    /// Compile and return the output, or an error when the result failed
    pub async fn compile_to_string(&self, source: &str) -> Result<String, CompilationError> {
        into_output(self.compile(source).await)
    }

    /// Check `source` without running anything
    pub fn validate(&self, source: &str) -> ValidationResult {
        validate(source)
    }

    /// Builder sharing this facade's options and capabilities
    pub fn builder(&self) -> CompilerBuilder {
        CompilerBuilder::new()
            .options(self.options())
            .capabilities(self.compiler.capabilities().clone())
    }
}

pub(crate) fn into_output(result: CompiledResult) -> Result<String, CompilationError> {
    if result.is_success() {
        return Ok(result.output);
    }
    Err(CompilationError {
        message: result
            .error_message
            .unwrap_or_else(|| "compilation failed".to_string()),
        partial_output: result.output,
    })
}

/// Compile `source` with default options and no capabilities
pub async fn compile(source: &str) -> CompiledResult {
    DevIns::new().compile(source).await
}

/// Compile `source` and return its output
pub async fn compile_to_string(source: &str) -> Result<String, CompilationError> {
    DevIns::new().compile_to_string(source).await
}

/// Parse `source` and check its front-matter options
pub fn validate(source: &str) -> ValidationResult {
    let document = match devins_core::parse(source) {
        Ok(document) => document,
        Err(err) => {
            return ValidationResult {
                is_valid: false,
                errors: vec![err.to_string()],
                warnings: Vec::new(),
            };
        }
    };

    let warnings = document
        .diagnostics()
        .iter()
        .map(ToString::to_string)
        .collect();
    let mut errors = Vec::new();
    if let Some(front_matter) = document.front_matter() {
        let mut options = CompilerOptions::default();
        for entry in &front_matter.entries {
            if let Some(Err(message)) = option_override(&entry.key, &entry.value, &mut options) {
                errors.push(format!("{}: {message}", entry.span.start));
            }
            if entry.key == "variables" && !matches!(entry.value, FrontMatterValue::Object(_)) {
                errors.push(format!(
                    "{}: 'variables' must be an object, got {}",
                    entry.span.start,
                    entry.value.type_name()
                ));
            }
        }
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// Start a [`CompilerBuilder`]
pub fn builder() -> CompilerBuilder {
    CompilerBuilder::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reports_bad_option() {
        let result = validate("---\nstrict: maybe\n---\nbody");
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("strict"));
    }

    #[test]
    fn test_validate_collects_diagnostics_as_warnings() {
        let result = validate("a #end b");
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_validate_parse_error() {
        let result = validate("---\nwhen: { $a\n---\nbody");
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_into_output_failure_keeps_partial_output() {
        let mut result = CompiledResult::new("x");
        result.output = "partial".to_string();
        result.fail("boom");
        let err = into_output(result).unwrap_err();
        assert_eq!(err.message, "boom");
        assert_eq!(err.partial_output, "partial");
    }
}
