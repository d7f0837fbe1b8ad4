//! Compiler core
//!
//! ```text
//!   source ──parse──▶ SourceDocument
//!                          │
//!                          ▼
//!            ┌──────── node walk ────────┐
//!            │ first processor whose     │   phase 1: side effects,
//!            │ can_process() accepts     │   output in document order
//!            └─────────────┬─────────────┘
//!                          ▼
//!              TemplateCompiler::render      phase 2: residual `$name`
//!                          │
//!                          ▼
//!                   CompiledResult
//! ```
//!
//! Every entry point returns a [`CompiledResult`]; parse errors, processor
//! failures and panics inside a processor all end up as a failed result.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use devins_core::{CompilerOptions, Evaluator, Node, SourceDocument, VariableTable};

use crate::cancel::CancellationToken;
use crate::capability::Capabilities;
use crate::context::{CompilerContext, Lookahead};
use crate::processors::{NodeProcessor, default_processors};
use crate::result::{CompiledResult, CompilerState};
use crate::template::TemplateCompiler;

/// Compiles instruction documents
///
/// Cheap to clone: processors and capabilities are shared. Every compile
/// call builds its own [`CompilerContext`], so one compiler can run any
/// number of compiles concurrently.
#[derive(Clone)]
pub struct DevInsCompiler {
    options: CompilerOptions,
    capabilities: Capabilities,
    processors: Arc<Vec<Box<dyn NodeProcessor>>>,
    evaluator: Arc<Evaluator>,
}

impl Default for DevInsCompiler {
    fn default() -> Self {
        Self::new(CompilerOptions::default())
    }
}

impl fmt::Debug for DevInsCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let processors: Vec<&str> = self.processors.iter().map(|p| p.name()).collect();
        f.debug_struct("DevInsCompiler")
            .field("options", &self.options)
            .field("capabilities", &self.capabilities)
            .field("processors", &processors)
            .finish()
    }
}

impl DevInsCompiler {
    /// Compiler with the default processors and no capabilities
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            capabilities: Capabilities::default(),
            processors: Arc::new(default_processors()),
            evaluator: Arc::new(Evaluator::new()),
        }
    }

    /// Replace the capabilities
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Replace the processor pipeline. Order matters: the first processor
    /// that accepts a node handles it.
    pub fn with_processors(mut self, processors: Vec<Box<dyn NodeProcessor>>) -> Self {
        self.processors = Arc::new(processors);
        self
    }

    /// Options used when a compile call does not pass its own
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Capability handles
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub(crate) fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Compile a parsed document
    pub async fn compile(&self, document: &SourceDocument) -> CompiledResult {
        self.compile_with(document, VariableTable::new(), CancellationToken::new())
            .await
    }

    /// Compile a parsed document with caller variables and a cancellation
    /// token
    pub async fn compile_with(
        &self,
        document: &SourceDocument,
        variables: VariableTable,
        cancel: CancellationToken,
    ) -> CompiledResult {
        let result = CompiledResult::new(document.source());
        self.compile_document(document, self.options, variables, 0, cancel, result)
            .await
    }

    /// Parse and compile `source`
    pub async fn compile_from_source(&self, source: &str) -> CompiledResult {
        self.compile_source_with(source, VariableTable::new(), CancellationToken::new())
            .await
    }

    /// Parse and compile `source` with caller variables and a cancellation
    /// token
    pub async fn compile_source_with(
        &self,
        source: &str,
        variables: VariableTable,
        cancel: CancellationToken,
    ) -> CompiledResult {
        self.compile_at(source, self.options, variables, 0, cancel)
            .await
    }

    /// Parse and compile `source` at a given nesting depth. Used for
    /// background compiles started by `/thread`.
    pub async fn compile_at(
        &self,
        source: &str,
        options: CompilerOptions,
        variables: VariableTable,
        depth: usize,
        cancel: CancellationToken,
    ) -> CompiledResult {
        let mut result = CompiledResult::new(source);
        result.advance(CompilerState::Parsing);
        match devins_core::parse(source) {
            Ok(document) => {
                self.compile_document(&document, options, variables, depth, cancel, result)
                    .await
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to parse instruction");
                result.fail(err.to_string());
                result.advance(CompilerState::Failed);
                result
            }
        }
    }

    async fn compile_document(
        &self,
        document: &SourceDocument,
        options: CompilerOptions,
        variables: VariableTable,
        depth: usize,
        cancel: CancellationToken,
        result: CompiledResult,
    ) -> CompiledResult {
        let mut ctx = CompilerContext::new(
            self.clone(),
            options,
            variables,
            document.source(),
            cancel,
            depth,
        );
        ctx.result = result;

        let outcome = AssertUnwindSafe(self.run(document, &mut ctx))
            .catch_unwind()
            .await;
        if outcome.is_err() {
            tracing::error!(depth, "processor panicked, returning a failed result");
            ctx.result.output = std::mem::take(&mut ctx.output);
            ctx.result.fail("internal error: a processor panicked");
            ctx.result.advance(CompilerState::Failed);
        }

        let result = ctx.into_result();
        tracing::debug!(
            success = result.is_success(),
            variables = result.statistics.variable_count,
            commands = result.statistics.command_count,
            agents = result.statistics.agent_count,
            warnings = result.warnings.len(),
            "compile finished"
        );
        result
    }

    /// Walk `document` in `ctx` and finish the result
    pub(crate) async fn run(&self, document: &SourceDocument, ctx: &mut CompilerContext) {
        for diagnostic in document.diagnostics() {
            ctx.warn(diagnostic.to_string());
        }

        ctx.result.advance(CompilerState::NodeProcessing);
        self.walk(document.nodes(), ctx).await;
        self.finish(ctx);
    }

    /// Dispatch `nodes` in order. Returns `false` when the walk stopped
    /// before the last node.
    pub(crate) fn walk<'a>(
        &'a self,
        nodes: &'a [Node],
        ctx: &'a mut CompilerContext,
    ) -> BoxFuture<'a, bool> {
        async move {
            for (idx, node) in nodes.iter().enumerate() {
                if ctx.cancellation().is_cancelled() {
                    ctx.result.cancelled = true;
                    ctx.result.fail("compilation cancelled");
                    return false;
                }
                ctx.lookahead = Lookahead::after(&nodes[idx + 1..]);

                let Some(processor) = self.processors.iter().find(|p| p.can_process(node))
                else {
                    ctx.emit(node.source_text());
                    let message = format!(
                        "no processor for {} node at {}",
                        node.kind_name(),
                        node.span.start
                    );
                    if ctx.options.strict {
                        ctx.result.fail(message);
                        return false;
                    }
                    ctx.warn(message);
                    continue;
                };

                if ctx.options.debug {
                    tracing::debug!(
                        processor = processor.name(),
                        node = node.kind_name(),
                        at = %node.span.start,
                        "dispatch"
                    );
                }

                let outcome = processor.process(node, ctx).await;
                let message = || {
                    outcome
                        .error_message
                        .clone()
                        .unwrap_or_else(|| format!("{} processor failed", processor.name()))
                };
                match (outcome.success, outcome.should_continue) {
                    (true, true) => {}
                    (true, false) => {
                        tracing::debug!(processor = processor.name(), "walk stopped early");
                        return false;
                    }
                    (false, true) if !ctx.options.strict => ctx.warn(message()),
                    (false, _) => {
                        ctx.result.fail(message());
                        return false;
                    }
                }
            }
            true
        }
        .boxed()
    }

    fn finish(&self, ctx: &mut CompilerContext) {
        let raw = std::mem::take(&mut ctx.output);
        if ctx.options.keep_raw_output {
            ctx.result.raw_output = Some(raw.clone());
        }

        let output = if ctx.options.enable_template_compilation && !ctx.result.cancelled {
            ctx.result.advance(CompilerState::TemplateCompiling);
            let protected = std::mem::take(&mut ctx.protected);
            let rendered = TemplateCompiler::render_protected(&raw, &ctx.variables, &protected);
            ctx.result.statistics.variable_count += rendered.substitutions;
            if !rendered.unresolved.is_empty() {
                ctx.warn(format!(
                    "unresolved variables left as written: {}",
                    rendered.unresolved.join(", ")
                ));
            }
            rendered.text
        } else {
            raw
        };

        ctx.result.output = output;
        ctx.result.advance(if ctx.result.has_error {
            CompilerState::Failed
        } else {
            CompilerState::Done
        });
    }
}
