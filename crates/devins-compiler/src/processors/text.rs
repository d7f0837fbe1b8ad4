use async_trait::async_trait;

use devins_core::{Node, NodeKind};

use super::NodeProcessor;
use crate::context::CompilerContext;
use crate::result::ProcessResult;

/// Emits literal text verbatim
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSegmentProcessor;

#[async_trait]
impl NodeProcessor for TextSegmentProcessor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn can_process(&self, node: &Node) -> bool {
        matches!(node.kind, NodeKind::Text)
    }

    async fn process(&self, node: &Node, ctx: &mut CompilerContext) -> ProcessResult {
        ctx.emit(node.source_text());
        ProcessResult::ok()
    }
}
