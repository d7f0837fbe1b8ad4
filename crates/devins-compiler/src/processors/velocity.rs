use async_trait::async_trait;

use devins_core::{ExpressionNode, Node, NodeKind, VariableScope};

use super::NodeProcessor;
use super::agent::nested_failure;
use crate::context::CompilerContext;
use crate::result::ProcessResult;

/// Evaluates `#if` blocks and `#set` assignments
///
/// The first branch whose condition holds (or the `#else` body) is compiled
/// one level deeper in the current context.
#[derive(Debug, Clone, Copy, Default)]
pub struct VelocityExpressionProcessor;

#[async_trait]
impl NodeProcessor for VelocityExpressionProcessor {
    fn name(&self) -> &'static str {
        "velocity"
    }

    fn can_process(&self, node: &Node) -> bool {
        matches!(node.kind, NodeKind::Expression(_))
    }

    async fn process(&self, node: &Node, ctx: &mut CompilerContext) -> ProcessResult {
        match &node.kind {
            NodeKind::Expression(ExpressionNode::Conditional {
                branches,
                otherwise,
            }) => {
                let mut selected = None;
                for branch in branches {
                    match ctx
                        .evaluator()
                        .evaluate_condition(&branch.condition, &ctx.variables)
                    {
                        Ok(true) => {
                            selected = Some(&branch.body);
                            break;
                        }
                        Ok(false) => {}
                        Err(err) => {
                            return ProcessResult::failure(format!(
                                "condition at {}: {err}",
                                node.span.start
                            ));
                        }
                    }
                }
                let Some(body) = selected.or(otherwise.as_ref()) else {
                    return ProcessResult::ok();
                };
                match ctx.compile_branch(body).await {
                    Ok(true) => ProcessResult::ok(),
                    Ok(false) => ProcessResult::stop(),
                    Err(err) => nested_failure(ctx, err),
                }
            }
            NodeKind::Expression(ExpressionNode::Assign { name, expression }) => {
                match ctx.evaluator().evaluate(expression, &ctx.variables) {
                    Ok(value) => {
                        tracing::debug!(name = %name, value = %value, "#set");
                        ctx.variables.set(name.clone(), value, VariableScope::Computed);
                        ProcessResult::ok()
                    }
                    Err(err) => ProcessResult::failure(format!("#set(${name}) failed: {err}")),
                }
            }
            _ => ProcessResult::failure("velocity processor got a non-expression node"),
        }
    }
}
