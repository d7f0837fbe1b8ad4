//! DevIns Core Library
//!
//! This crate provides the language half of DevIns:
//! - Lexing and parsing instruction documents into a [`SourceDocument`]
//! - The front-matter value model and its parser
//! - The scoped [`VariableTable`]
//! - Expression evaluation for `when`, `#if` and `#set`
//! - Pattern-action pipeline functions and unified diff application
//! - Project configuration (`devins.yaml`)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Source    │────▶│    Lexer    │────▶│   Parser    │──▶ SourceDocument
//! │   (text)    │     │  (tokens)   │     │   (nodes)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use devins_core::{parse, NodeKind};
//!
//! let doc = parse("Explain /file:src/main.rs to $audience")?;
//! for node in doc.nodes() {
//!     println!("{}: {:?}", node.kind_name(), node.source_text());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod config;
pub mod error;
pub mod expr;
pub mod frontmatter;
pub mod lexer;
pub mod parser;
pub mod patch;
pub mod pattern;
pub mod span;
pub mod variables;

pub use ast::{
    Accessor, CodeBlock, ConditionalBranch, Diagnostic, ExpressionNode, Node, NodeKind,
    SourceDocument, UsedConstruct, UsedKind,
};
pub use config::{
    AgentConfig, AgentKind, CONFIG_FILE, CompilerOptions, Config, ProjectConfig, ShellConfig,
};
pub use error::{Error, ParseError, Result};
pub use expr::Evaluator;
pub use frontmatter::{FrontMatter, FrontMatterEntry, FrontMatterValue, PatternAction};
pub use parser::{ParseResult, parse};
pub use pattern::{CaseArm, CaseKey, CaseMatch, PipelineFunc};
pub use span::{Position, Span};
pub use variables::{VariableEntry, VariableScope, VariableTable, VariableType};
