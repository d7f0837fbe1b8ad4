use async_trait::async_trait;

use devins_core::{Node, NodeKind};

use super::NodeProcessor;
use crate::context::CompilerContext;
use crate::result::ProcessResult;

/// Re-emits fenced code blocks as written, language tag included. A block
/// already consumed by the preceding command (`/write`, `/patch`,
/// `/shell`) is skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeBlockProcessor;

#[async_trait]
impl NodeProcessor for CodeBlockProcessor {
    fn name(&self) -> &'static str {
        "code-block"
    }

    fn can_process(&self, node: &Node) -> bool {
        matches!(node.kind, NodeKind::CodeBlock(_))
    }

    async fn process(&self, node: &Node, ctx: &mut CompilerContext) -> ProcessResult {
        if std::mem::take(&mut ctx.skip_next_code_block) {
            return ProcessResult::ok();
        }
        ctx.emit(node.source_text());
        ProcessResult::ok()
    }
}
