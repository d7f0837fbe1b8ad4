//! Node processors
//!
//! The compiler walks the document and hands each node to the first
//! processor whose [`NodeProcessor::can_process`] accepts it. The default
//! pipeline, in order:
//!
//! | Processor | Nodes |
//! |-----------|-------|
//! | [`FrontMatterProcessor`] | leading front-matter block |
//! | [`TextSegmentProcessor`] | literal text |
//! | [`CodeBlockProcessor`] | fenced code blocks |
//! | [`UsedProcessor`] | `/command`, `$variable`, `@agent` (dispatches further) |
//! | [`VelocityExpressionProcessor`] | `#if` / `#set` |

use async_trait::async_trait;

use devins_core::Node;

use crate::context::CompilerContext;
use crate::result::ProcessResult;

mod agent;
mod code_block;
mod command;
mod front_matter;
mod text;
mod used;
mod variable;
mod velocity;

pub use agent::AgentProcessor;
pub use code_block::CodeBlockProcessor;
pub use command::{BuiltinCommand, CommandProcessor};
pub use front_matter::{FrontMatterProcessor, option_override};
pub use text::TextSegmentProcessor;
pub use used::UsedProcessor;
pub use variable::VariableProcessor;
pub use velocity::VelocityExpressionProcessor;

/// One stage of the compile pipeline
#[async_trait]
pub trait NodeProcessor: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Whether this processor handles `node`
    fn can_process(&self, node: &Node) -> bool;

    /// Process `node`, appending to the context output
    async fn process(&self, node: &Node, ctx: &mut CompilerContext) -> ProcessResult;
}

/// The default processor pipeline
pub fn default_processors() -> Vec<Box<dyn NodeProcessor>> {
    vec![
        Box::new(FrontMatterProcessor),
        Box::new(TextSegmentProcessor),
        Box::new(CodeBlockProcessor),
        Box::new(UsedProcessor::default()),
        Box::new(VelocityExpressionProcessor),
    ]
}
