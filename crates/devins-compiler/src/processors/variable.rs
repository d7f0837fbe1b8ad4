use async_trait::async_trait;

use devins_core::{Node, NodeKind, UsedKind};

use super::NodeProcessor;
use crate::context::CompilerContext;
use crate::result::ProcessResult;
use crate::template::interpolate;

/// Resolves `$name` references against the variable table. The value is
/// inserted once and the template pass does not expand it again. An
/// unresolved reference keeps its literal text and reports a failure, which
/// is a warning unless the compile is strict.
#[derive(Debug, Clone, Copy, Default)]
pub struct VariableProcessor;

#[async_trait]
impl NodeProcessor for VariableProcessor {
    fn name(&self) -> &'static str {
        "variable"
    }

    fn can_process(&self, node: &Node) -> bool {
        matches!(&node.kind, NodeKind::Used(used) if used.kind == UsedKind::Variable)
    }

    async fn process(&self, node: &Node, ctx: &mut CompilerContext) -> ProcessResult {
        let NodeKind::Used(used) = &node.kind else {
            return ProcessResult::failure("variable processor got a non-variable node");
        };
        match interpolate(&used.name, &used.accessors, &ctx.variables) {
            Some(text) => {
                ctx.result.statistics.variable_count += 1;
                ctx.emit_verbatim(&text);
                ProcessResult::ok()
            }
            None => {
                ctx.emit_verbatim(node.source_text());
                ProcessResult::failure(format!(
                    "unresolved variable '{}' at {}",
                    used.name, node.span.start
                ))
            }
        }
    }
}
