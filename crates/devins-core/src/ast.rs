//! Abstract syntax tree for instruction documents
//!
//! A [`SourceDocument`] owns the original text and the ordered list of
//! top-level [`Node`]s. Output order is the order of the nodes, so the
//! parser never reorders children.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::frontmatter::FrontMatter;
use crate::span::{Position, Span};

/// Parsed instruction document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceDocument {
    source: String,
    nodes: Vec<Node>,
    diagnostics: Vec<Diagnostic>,
}

impl SourceDocument {
    /// Assemble a document from its parts
    pub fn new(source: impl Into<String>, nodes: Vec<Node>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            source: source.into(),
            nodes,
            diagnostics,
        }
    }

    /// Original input text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Top-level nodes in document order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Problems the parser tolerated
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The leading front-matter block, if the document has one
    pub fn front_matter(&self) -> Option<&FrontMatter> {
        self.nodes.first().and_then(|node| match &node.kind {
            NodeKind::FrontMatter(fm) => Some(fm),
            _ => None,
        })
    }

    /// Whether the document has no nodes at all
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Stable hash of the source text, used as a cache key
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Visit every node depth-first, including branch bodies of expressions
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        walk_nodes(&self.nodes, visit);
    }
}

fn walk_nodes<'a>(nodes: &'a [Node], visit: &mut impl FnMut(&'a Node)) {
    for node in nodes {
        visit(node);
        if let NodeKind::Expression(ExpressionNode::Conditional {
            branches,
            otherwise,
        }) = &node.kind
        {
            for branch in branches {
                walk_nodes(&branch.body, visit);
            }
            if let Some(body) = otherwise {
                walk_nodes(body, visit);
            }
        }
    }
}

/// A problem the parser recovered from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Human readable description
    pub message: String,
    /// Where the problem starts
    pub position: Position,
}

impl Diagnostic {
    /// Create a diagnostic
    pub fn new(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.position, self.message)
    }
}

/// A node of the syntax tree together with its source text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    /// What kind of construct this is
    pub kind: NodeKind,
    /// Location in the source
    pub span: Span,
    /// The exact source text the node was parsed from
    pub text: String,
}

impl Node {
    /// Create a node
    pub fn new(kind: NodeKind, span: Span, text: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            text: text.into(),
        }
    }

    /// Source text this node was parsed from
    pub fn source_text(&self) -> &str {
        &self.text
    }

    /// Short kind name used in logs and diagnostics
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Text => "text",
            NodeKind::Used(used) => used.kind.name(),
            NodeKind::CodeBlock(_) => "code",
            NodeKind::FrontMatter(_) => "front-matter",
            NodeKind::Expression(_) => "expression",
        }
    }

    /// Whether this is a plain text node
    pub fn is_text(&self) -> bool {
        matches!(self.kind, NodeKind::Text)
    }
}

/// Node variants
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum NodeKind {
    /// Literal text, emitted verbatim
    Text,
    /// `$variable`, `/command` or `@agent`
    Used(UsedConstruct),
    /// Fenced code block
    CodeBlock(CodeBlock),
    /// Leading configuration block
    FrontMatter(FrontMatter),
    /// `#if` / `#set` directive
    Expression(ExpressionNode),
}

/// Which sigil introduced a used construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsedKind {
    /// `/name:argument`
    Command,
    /// `$name`
    Variable,
    /// `@name`
    Agent,
}

impl UsedKind {
    /// The sigil character
    pub fn sigil(self) -> char {
        match self {
            UsedKind::Command => '/',
            UsedKind::Variable => '$',
            UsedKind::Agent => '@',
        }
    }

    /// Lowercase name of the kind
    pub fn name(self) -> &'static str {
        match self {
            UsedKind::Command => "command",
            UsedKind::Variable => "variable",
            UsedKind::Agent => "agent",
        }
    }
}

/// Shared shape of command, variable and agent references
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsedConstruct {
    /// Sigil kind
    pub kind: UsedKind,
    /// Name following the sigil
    pub name: String,
    /// Command argument after `:`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argument: Option<String>,
    /// Property/index accessors of a variable reference
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub accessors: Vec<Accessor>,
}

impl UsedConstruct {
    /// A command reference
    pub fn command(name: impl Into<String>, argument: Option<String>) -> Self {
        Self {
            kind: UsedKind::Command,
            name: name.into(),
            argument,
            accessors: Vec::new(),
        }
    }

    /// A variable reference
    pub fn variable(name: impl Into<String>, accessors: Vec<Accessor>) -> Self {
        Self {
            kind: UsedKind::Variable,
            name: name.into(),
            argument: None,
            accessors,
        }
    }

    /// An agent reference
    pub fn agent(name: impl Into<String>) -> Self {
        Self {
            kind: UsedKind::Agent,
            name: name.into(),
            argument: None,
            accessors: Vec::new(),
        }
    }
}

/// Variable accessor: `.prop`, `[0]` or `["key"]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessor {
    /// `.name`
    Property(String),
    /// `[3]`
    Index(usize),
    /// `["name"]`
    Key(String),
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Property(name) => write!(f, ".{name}"),
            Accessor::Index(idx) => write!(f, "[{idx}]"),
            Accessor::Key(key) => write!(f, "[\"{key}\"]"),
        }
    }
}

/// Fenced code block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeBlock {
    /// Language tag after the opening fence
    pub language: Option<String>,
    /// Literal body between the fences, including its trailing newline
    pub body: String,
}

impl CodeBlock {
    /// Render the block back into fenced form
    pub fn to_fenced(&self) -> String {
        format!(
            "```{}\n{}```",
            self.language.as_deref().unwrap_or_default(),
            self.body
        )
    }
}

/// Velocity-style directive
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum ExpressionNode {
    /// `#if(..) .. #elseif(..) .. #else .. #end`
    Conditional {
        /// Guarded branches in source order
        branches: Vec<ConditionalBranch>,
        /// `#else` body
        otherwise: Option<Vec<Node>>,
    },
    /// `#set($name = expression)`
    Assign {
        /// Variable being assigned
        name: String,
        /// Expression source
        expression: String,
    },
}

/// One guarded branch of a conditional
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionalBranch {
    /// Condition source text
    pub condition: String,
    /// Nodes compiled when the condition holds
    pub body: Vec<Node>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        let a = SourceDocument::new("hello", Vec::new(), Vec::new());
        let b = SourceDocument::new("hello", Vec::new(), Vec::new());
        let c = SourceDocument::new("hello!", Vec::new(), Vec::new());
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }

    #[test]
    fn test_code_block_to_fenced() {
        let block = CodeBlock {
            language: Some("rust".to_string()),
            body: "fn main() {}\n".to_string(),
        };
        assert_eq!(block.to_fenced(), "```rust\nfn main() {}\n```");
    }

    #[test]
    fn test_accessor_display() {
        assert_eq!(Accessor::Property("a".into()).to_string(), ".a");
        assert_eq!(Accessor::Index(2).to_string(), "[2]");
        assert_eq!(Accessor::Key("k".into()).to_string(), "[\"k\"]");
    }
}
