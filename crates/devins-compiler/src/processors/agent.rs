use async_trait::async_trait;

use devins_core::{Node, NodeKind, UsedKind};

use super::NodeProcessor;
use crate::capability::AgentReply;
use crate::context::CompilerContext;
use crate::error::{CapabilityError, Error};
use crate::result::ProcessResult;

/// Invokes `@name` agents and inlines their reply
///
/// The agent receives the rest of the line after the reference as input.
/// Without an agent registry the reference is left as written.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentProcessor;

#[async_trait]
impl NodeProcessor for AgentProcessor {
    fn name(&self) -> &'static str {
        "agent"
    }

    fn can_process(&self, node: &Node) -> bool {
        matches!(&node.kind, NodeKind::Used(used) if used.kind == UsedKind::Agent)
    }

    async fn process(&self, node: &Node, ctx: &mut CompilerContext) -> ProcessResult {
        let NodeKind::Used(used) = &node.kind else {
            return ProcessResult::failure("agent processor got a non-agent node");
        };

        let lookup = ctx
            .capabilities()
            .agents
            .as_ref()
            .map(|registry| registry.get(&used.name));
        let agent = match lookup {
            None => {
                ctx.emit(node.source_text());
                ctx.warn(format!(
                    "no agent registry configured, '@{}' left as written",
                    used.name
                ));
                return ProcessResult::ok();
            }
            Some(None) => {
                ctx.result.statistics.agent_count += 1;
                let err = CapabilityError::AgentNotFound {
                    name: used.name.clone(),
                };
                ctx.emit(&err.to_sentinel());
                ctx.warn(err.to_string());
                return ProcessResult::ok();
            }
            Some(Some(agent)) => agent,
        };

        ctx.result.statistics.agent_count += 1;
        ctx.result.agents.push(used.name.clone());
        let input = ctx.rest_of_line().to_string();
        let cancel = ctx.cancellation().clone();
        tracing::info!(agent = %used.name, "invoking agent");

        match agent.invoke(&input, &cancel).await {
            Ok(AgentReply::Text(text)) => {
                ctx.emit(&text);
                ProcessResult::ok()
            }
            Ok(AgentReply::Instruction {
                name,
                source,
                variables,
            }) => match ctx.compile_nested(&name, &source, variables).await {
                Ok(output) => {
                    ctx.emit_verbatim(&output);
                    ProcessResult::ok()
                }
                Err(err) => nested_failure(ctx, err),
            },
            Err(CapabilityError::Cancelled) => nested_failure(ctx, Error::Cancelled),
            Err(err) => {
                ctx.emit(&err.to_sentinel());
                ctx.warn(format!("agent '{}' failed: {err}", used.name));
                ProcessResult::ok()
            }
        }
    }
}

/// Nested compile failures stop the walk and fail the result
pub(crate) fn nested_failure(ctx: &mut CompilerContext, err: Error) -> ProcessResult {
    match err {
        Error::Cancelled => {
            ctx.result.cancelled = true;
            ProcessResult::fatal(Error::Cancelled.to_string())
        }
        Error::Capability(err) => {
            ctx.emit(&err.to_sentinel());
            ctx.warn(err.to_string());
            ProcessResult::ok()
        }
        other => ProcessResult::fatal(other.to_string()),
    }
}
