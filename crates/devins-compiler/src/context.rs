//! Per-compile state

use std::ops::Range;

use chrono::Local;
use serde_json::Value;

use devins_core::{CodeBlock, CompilerOptions, Evaluator, Node, NodeKind, VariableScope, VariableTable};

use crate::cancel::CancellationToken;
use crate::capability::Capabilities;
use crate::compiler::DevInsCompiler;
use crate::error::{Error, Result};
use crate::result::CompiledResult;
use crate::template::TemplateCompiler;

/// What follows the node being processed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lookahead {
    /// Next sibling code block, skipping whitespace-only text
    pub next_code_block: Option<CodeBlock>,
    /// Text after the node up to the end of its line, trimmed
    pub rest_of_line: String,
}

impl Lookahead {
    /// Compute the lookahead for the siblings that follow a node
    pub fn after(following: &[Node]) -> Self {
        let next_code_block = following
            .iter()
            .find(|node| !(node.is_text() && node.source_text().trim().is_empty()))
            .and_then(|node| match &node.kind {
                NodeKind::CodeBlock(block) => Some(block.clone()),
                _ => None,
            });
        let rest_of_line = following
            .first()
            .filter(|node| node.is_text())
            .map(|node| {
                let text = node.source_text();
                text[..text.find('\n').unwrap_or(text.len())].trim().to_string()
            })
            .unwrap_or_default();
        Self {
            next_code_block,
            rest_of_line,
        }
    }
}

/// State owned by one compile invocation
///
/// Holds the effective options, the variable table, the result being built
/// and the output buffer. Two compiles never share a context.
pub struct CompilerContext {
    /// Effective options (front matter may override them)
    pub options: CompilerOptions,
    /// Variables visible to this compile
    pub variables: VariableTable,
    /// Result being built
    pub result: CompiledResult,
    /// Output accumulated so far
    pub output: String,
    compiler: DevInsCompiler,
    cancel: CancellationToken,
    depth: usize,
    ceiling: usize,
    pub(crate) protected: Vec<Range<usize>>,
    pub(crate) lookahead: Lookahead,
    pub(crate) skip_next_code_block: bool,
}

impl CompilerContext {
    pub(crate) fn new(
        compiler: DevInsCompiler,
        options: CompilerOptions,
        variables: VariableTable,
        input: &str,
        cancel: CancellationToken,
        depth: usize,
    ) -> Self {
        let mut context = Self {
            ceiling: options.max_recursion_depth,
            options,
            variables: system_variables(compiler.capabilities()),
            result: CompiledResult::new(input),
            output: String::new(),
            compiler,
            cancel,
            depth,
            protected: Vec::new(),
            lookahead: Lookahead::default(),
            skip_next_code_block: false,
        };
        context.variables.extend(&variables);
        context
    }

    /// Capability handles
    pub fn capabilities(&self) -> &Capabilities {
        self.compiler.capabilities()
    }

    /// Compiler running this context
    pub fn compiler(&self) -> &DevInsCompiler {
        &self.compiler
    }

    /// Expression evaluator
    pub fn evaluator(&self) -> &Evaluator {
        self.compiler.evaluator()
    }

    /// Cancellation token of this compile
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Nesting depth, 0 for a top-level compile
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Append to the output
    pub fn emit(&mut self, text: &str) {
        self.output.push_str(text);
    }

    /// Append text the template pass must leave alone, such as a substituted
    /// value or the output of a nested compile
    pub fn emit_verbatim(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let start = self.output.len();
        self.output.push_str(text);
        self.protected.push(start..self.output.len());
    }

    /// Highest recursion depth this compile may configure. Front matter can
    /// lower `options.max_recursion_depth` but never raise it above this.
    pub fn recursion_ceiling(&self) -> usize {
        self.ceiling
    }

    /// Record a recovered problem
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(depth = self.depth, "{message}");
        self.result.warnings.push(message);
    }

    /// Code block following the current node, if any
    pub fn next_code_block(&self) -> Option<&CodeBlock> {
        self.lookahead.next_code_block.as_ref()
    }

    /// Take the following code block; it will not be emitted on its own
    pub fn take_next_code_block(&mut self) -> Option<CodeBlock> {
        let block = self.lookahead.next_code_block.take();
        if block.is_some() {
            self.skip_next_code_block = true;
        }
        block
    }

    /// Rest of the line after the current node
    pub fn rest_of_line(&self) -> &str {
        &self.lookahead.rest_of_line
    }

    /// Substitute `$name` references in `text` with the current variables
    pub fn substitute(&self, text: &str) -> String {
        TemplateCompiler::compile(text, &self.variables)
    }

    /// Walk `nodes` in this context one level deeper, as for the selected
    /// branch of a conditional. Returns whether the walk ran to the end.
    pub async fn compile_branch(&mut self, nodes: &[Node]) -> Result<bool> {
        self.enter()?;
        let compiler = self.compiler.clone();
        let completed = compiler.walk(nodes, self).await;
        self.depth -= 1;
        Ok(completed)
    }

    /// Compile `source` in a child context one level deeper and return its
    /// output. `bindings` are registered as user variables on top of the
    /// current ones. Statistics, warnings and agents of the child are merged
    /// into this result; a failed child is an error.
    pub async fn compile_nested(
        &mut self,
        name: &str,
        source: &str,
        bindings: Vec<(String, Value)>,
    ) -> Result<String> {
        let depth = self.depth + 1;
        if depth > self.options.max_recursion_depth {
            return Err(Error::RecursionLimit {
                max: self.options.max_recursion_depth,
            });
        }
        let document = devins_core::parse(source).map_err(|e| Error::Nested {
            source_name: name.to_string(),
            message: e.to_string(),
        })?;

        let mut variables = self.variables.clone();
        for (key, value) in bindings {
            variables.set(key, value, VariableScope::UserDefined);
        }
        tracing::debug!(name, depth, "compiling nested instruction");

        let compiler = self.compiler.clone();
        let mut child = CompilerContext::new(
            compiler.clone(),
            self.options,
            variables,
            source,
            self.cancel.clone(),
            depth,
        );
        child.ceiling = self.options.max_recursion_depth.min(self.ceiling);
        compiler.run(&document, &mut child).await;
        let child = child.result;

        let stats = &mut self.result.statistics;
        stats.variable_count += child.statistics.variable_count;
        stats.command_count += child.statistics.command_count;
        stats.agent_count += child.statistics.agent_count;
        self.result
            .warnings
            .extend(child.warnings.into_iter().map(|w| format!("{name}: {w}")));
        self.result.agents.extend(child.agents);

        if child.cancelled {
            return Err(Error::Cancelled);
        }
        if child.has_error {
            return Err(Error::Nested {
                source_name: name.to_string(),
                message: child.error_message.unwrap_or_default(),
            });
        }
        Ok(child.output)
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth + 1 > self.options.max_recursion_depth {
            return Err(Error::RecursionLimit {
                max: self.options.max_recursion_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn into_result(self) -> CompiledResult {
        self.result
    }
}

/// `date`, `time`, `os` and `workspace`
fn system_variables(capabilities: &Capabilities) -> VariableTable {
    let now = Local::now();
    let mut table = VariableTable::new();
    table.set("date", now.format("%Y-%m-%d").to_string(), VariableScope::System);
    table.set("time", now.format("%H:%M:%S").to_string(), VariableScope::System);
    table.set("os", std::env::consts::OS, VariableScope::System);
    table.set(
        "workspace",
        capabilities.workspace.clone().unwrap_or_default(),
        VariableScope::System,
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use devins_core::parse;

    #[test]
    fn test_lookahead_finds_code_block_after_newline() {
        let doc = parse("/write:a.txt\n```\nhello\n```\n").unwrap();
        let lookahead = Lookahead::after(&doc.nodes()[1..]);
        assert_eq!(
            lookahead.next_code_block.map(|b| b.body),
            Some("hello\n".to_string())
        );
    }

    #[test]
    fn test_lookahead_rest_of_line() {
        let doc = parse("@bot review this diff\nnext line").unwrap();
        let lookahead = Lookahead::after(&doc.nodes()[1..]);
        assert_eq!(lookahead.rest_of_line, "review this diff");
        assert!(lookahead.next_code_block.is_none());
    }

    #[test]
    fn test_system_variables() {
        let table = system_variables(&Capabilities::default());
        assert_eq!(table.get("os"), Some(&Value::from(std::env::consts::OS)));
        assert_eq!(table.entry("date").unwrap().scope, VariableScope::System);
        assert!(table.contains("workspace"));
    }
}
