//! Result values produced by the compiler

use serde::Serialize;

use devins_core::FrontMatter;

/// Compiler state machine
///
/// `Idle -> Parsing -> NodeProcessing -> (TemplateCompiling)? -> Done | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompilerState {
    /// Nothing started yet
    #[default]
    Idle,
    /// Parsing source text
    Parsing,
    /// Walking the document
    NodeProcessing,
    /// Substituting residual `$name` tokens
    TemplateCompiling,
    /// Finished successfully
    Done,
    /// Finished with an error
    Failed,
}

impl CompilerState {
    /// Whether the state machine allows moving from `self` to `next`.
    /// `Parsing` is skipped when the caller hands over a parsed document.
    pub fn can_advance_to(self, next: CompilerState) -> bool {
        use CompilerState::*;
        matches!(
            (self, next),
            (Idle, Parsing | NodeProcessing | Failed)
                | (Parsing, NodeProcessing | Failed)
                | (NodeProcessing, TemplateCompiling | Done | Failed)
                | (TemplateCompiling, Done | Failed)
        )
    }
}

/// Counters updated by the processors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Statistics {
    /// Variable references seen
    pub variable_count: usize,
    /// Commands executed
    pub command_count: usize,
    /// Agents invoked
    pub agent_count: usize,
}

/// Outcome of one compile call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledResult {
    /// Source text that was compiled
    pub input: String,
    /// Compiled text
    pub output: String,
    /// Output before template substitution, when `keep_raw_output` is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    /// Whether compilation failed
    pub has_error: bool,
    /// Why compilation failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Whether the caller cancelled the compile
    pub cancelled: bool,
    /// Counters
    pub statistics: Statistics,
    /// Recovered problems, in the order they happened
    pub warnings: Vec<String>,
    /// Parsed header, kept for the orchestration layer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front_matter: Option<FrontMatter>,
    /// Names of the agents invoked
    pub agents: Vec<String>,
    /// Final state
    pub state: CompilerState,
}

impl CompiledResult {
    /// Empty result for `input`
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: String::new(),
            raw_output: None,
            has_error: false,
            error_message: None,
            cancelled: false,
            statistics: Statistics::default(),
            warnings: Vec::new(),
            front_matter: None,
            agents: Vec::new(),
            state: CompilerState::Idle,
        }
    }

    /// Failed result carrying `input`
    pub fn failed(input: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = Self::new(input);
        result.fail(message);
        result.advance(CompilerState::Failed);
        result
    }

    /// Move to `next`, logging transitions the state machine does not allow
    pub fn advance(&mut self, next: CompilerState) {
        if !self.state.can_advance_to(next) {
            tracing::warn!(from = ?self.state, to = ?next, "unexpected compiler state transition");
        }
        tracing::trace!(from = ?self.state, to = ?next, "compiler state");
        self.state = next;
    }

    /// Mark the result failed. The first message is kept.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.has_error = true;
        if self.error_message.is_none() {
            self.error_message = Some(message.into());
        }
    }

    /// Whether compilation succeeded
    pub fn is_success(&self) -> bool {
        !self.has_error
    }
}

/// Outcome of a processor invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// Whether the node was handled
    pub success: bool,
    /// Whether the walk proceeds to the next sibling
    pub should_continue: bool,
    /// Failure description
    pub error_message: Option<String>,
}

impl ProcessResult {
    /// Handled, keep going
    pub fn ok() -> Self {
        Self {
            success: true,
            should_continue: true,
            error_message: None,
        }
    }

    /// Handled, skip the rest of the document
    pub fn stop() -> Self {
        Self {
            success: true,
            should_continue: false,
            error_message: None,
        }
    }

    /// Failed but recoverable: a warning, or an error in strict mode
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            should_continue: true,
            error_message: Some(message.into()),
        }
    }

    /// Failed, the result is marked failed and the walk stops
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            success: false,
            should_continue: false,
            error_message: Some(message.into()),
        }
    }
}

/// Outcome of `validate`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationResult {
    /// Whether the source parses
    pub is_valid: bool,
    /// Unrecoverable problems
    pub errors: Vec<String>,
    /// Tolerated problems
    pub warnings: Vec<String>,
}
