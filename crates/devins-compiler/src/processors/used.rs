use async_trait::async_trait;

use devins_core::{Node, NodeKind};

use super::{AgentProcessor, CommandProcessor, NodeProcessor, VariableProcessor};
use crate::context::CompilerContext;
use crate::result::ProcessResult;

/// Dispatches `/command`, `$variable` and `@agent` nodes to their leaf
/// processors by sigil
pub struct UsedProcessor {
    leaves: Vec<Box<dyn NodeProcessor>>,
}

impl Default for UsedProcessor {
    fn default() -> Self {
        Self {
            leaves: vec![
                Box::new(CommandProcessor),
                Box::new(VariableProcessor),
                Box::new(AgentProcessor),
            ],
        }
    }
}

#[async_trait]
impl NodeProcessor for UsedProcessor {
    fn name(&self) -> &'static str {
        "used"
    }

    fn can_process(&self, node: &Node) -> bool {
        matches!(node.kind, NodeKind::Used(_))
    }

    async fn process(&self, node: &Node, ctx: &mut CompilerContext) -> ProcessResult {
        match self.leaves.iter().find(|leaf| leaf.can_process(node)) {
            Some(leaf) => {
                tracing::trace!(processor = leaf.name(), "dispatching used construct");
                leaf.process(node, ctx).await
            }
            None => ProcessResult::failure(format!(
                "no processor for {} '{}'",
                node.kind_name(),
                node.source_text()
            )),
        }
    }
}
