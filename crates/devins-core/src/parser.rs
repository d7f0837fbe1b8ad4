//! Instruction document parser
//!
//! Turns the token stream from the [`lexer`](crate::lexer) into a
//! [`SourceDocument`]. The parser is tolerant: stray `#else`/`#end`
//! directives and `#if` blocks that never close become literal text, and
//! problems are recorded as diagnostics on the document. Only unrecoverable
//! states inside front matter produce a [`ParseError`].

use crate::ast::{
    CodeBlock, ConditionalBranch, Diagnostic, ExpressionNode, Node, NodeKind, SourceDocument,
    UsedConstruct,
};
use crate::error::ParseError;
use crate::frontmatter::{MAX_NESTING, parse_front_matter};
use crate::lexer::{Directive, Token, TokenKind, tokenize};
use crate::span::Span;

/// Outcome of [`parse`]
pub type ParseResult = std::result::Result<SourceDocument, ParseError>;

/// Parse an instruction document
///
/// # Example
///
/// ```rust,ignore
/// let doc = devins_core::parse("Hello, $name!")?;
/// assert_eq!(doc.nodes().len(), 3);
/// ```
pub fn parse(source: &str) -> ParseResult {
    let (tokens, diagnostics) = tokenize(source);
    let closing = match_conditionals(&tokens);
    let mut parser = Parser {
        tokens,
        closing,
        idx: 0,
        diagnostics,
    };
    let nodes = parser.parse_document()?;
    tracing::debug!(
        nodes = nodes.len(),
        diagnostics = parser.diagnostics.len(),
        "parsed instruction document"
    );
    Ok(SourceDocument::new(source, nodes, parser.diagnostics))
}

/// Where the body of the next branch goes
enum Slot {
    Branch(String),
    Else,
    Ignored,
}

/// Why a block body stopped
enum Terminator {
    ElseIf(String),
    Else,
    End,
}

struct Parser {
    tokens: Vec<Token>,
    /// For each `#if` token, the index of its `#end`
    closing: Vec<Option<usize>>,
    idx: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    fn parse_document(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();
        while let Some(token) = self.next() {
            match token.kind {
                TokenKind::Directive(Directive::ElseIf(_) | Directive::Else | Directive::End) => {
                    self.diagnostics.push(Diagnostic::new(
                        format!("'{}' without a matching #if", token.text),
                        token.span.start,
                    ));
                    nodes.push(text_node(&token));
                }
                _ => nodes.push(self.convert(token, 0)?),
            }
        }
        Ok(merge_text(nodes))
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.idx).cloned();
        if token.is_some() {
            self.idx += 1;
        }
        token
    }

    fn convert(&mut self, token: Token, depth: usize) -> Result<Node, ParseError> {
        let kind = match token.kind.clone() {
            TokenKind::Text => NodeKind::Text,
            TokenKind::FrontMatter { body, body_start } => {
                let (front_matter, diagnostics) = parse_front_matter(&body, body_start)?;
                self.diagnostics.extend(diagnostics);
                NodeKind::FrontMatter(front_matter)
            }
            TokenKind::Command { name, argument } => {
                NodeKind::Used(UsedConstruct::command(name, argument))
            }
            TokenKind::Agent { name } => NodeKind::Used(UsedConstruct::agent(name)),
            TokenKind::Variable { name, accessors } => {
                NodeKind::Used(UsedConstruct::variable(name, accessors))
            }
            TokenKind::CodeBlock { language, body } => {
                NodeKind::CodeBlock(CodeBlock { language, body })
            }
            TokenKind::Directive(Directive::Set { name, expression }) => {
                NodeKind::Expression(ExpressionNode::Assign { name, expression })
            }
            TokenKind::Directive(Directive::If(condition)) => {
                return self.parse_conditional(token, condition, depth);
            }
            TokenKind::Directive(_) => NodeKind::Text,
        };
        Ok(Node::new(kind, token.span, token.text))
    }

    /// Parse `#if ... #end`. When the block never closes, the `#if` token is
    /// kept as text and parsing resumes right after it.
    fn parse_conditional(
        &mut self,
        if_token: Token,
        condition: String,
        depth: usize,
    ) -> Result<Node, ParseError> {
        let start = self.idx - 1;
        let Some(end_idx) = self.closing.get(start).copied().flatten() else {
            self.diagnostics.push(Diagnostic::new(
                "#if without a matching #end, treating it as text",
                if_token.span.start,
            ));
            return Ok(text_node(&if_token));
        };
        if depth >= MAX_NESTING {
            return Err(ParseError::new(
                format!("#if blocks nest deeper than {MAX_NESTING} levels"),
                if_token.span.start,
            ));
        }
        let mut branches = Vec::new();
        let mut otherwise = None;
        let mut slot = Slot::Branch(condition);

        loop {
            let (body, terminator) = self.parse_block(depth + 1)?;
            let in_else = !matches!(slot, Slot::Branch(_));
            match slot {
                Slot::Branch(condition) => branches.push(ConditionalBranch { condition, body }),
                Slot::Else => otherwise = Some(body),
                Slot::Ignored => {}
            }
            slot = match terminator {
                Terminator::End => break,
                Terminator::ElseIf(next) if !in_else => Slot::Branch(next),
                Terminator::Else if !in_else => Slot::Else,
                Terminator::ElseIf(_) | Terminator::Else => {
                    self.diagnostics.push(Diagnostic::new(
                        "branch after #else is ignored",
                        if_token.span.start,
                    ));
                    Slot::Ignored
                }
            };
        }

        let text: String = self.tokens[start..=end_idx]
            .iter()
            .map(|t| t.text.as_str())
            .collect();
        Ok(Node::new(
            NodeKind::Expression(ExpressionNode::Conditional {
                branches,
                otherwise,
            }),
            Span::new(if_token.span.start, self.tokens[end_idx].span.end),
            text,
        ))
    }

    /// Parse nodes until a branch terminator. Only called inside an `#if`
    /// whose `#end` is known, so running out of tokens ends the block.
    fn parse_block(&mut self, depth: usize) -> Result<(Vec<Node>, Terminator), ParseError> {
        let mut nodes = Vec::new();
        while let Some(token) = self.next() {
            let terminator = match &token.kind {
                TokenKind::Directive(Directive::ElseIf(cond)) => Terminator::ElseIf(cond.clone()),
                TokenKind::Directive(Directive::Else) => Terminator::Else,
                TokenKind::Directive(Directive::End) => Terminator::End,
                _ => {
                    nodes.push(self.convert(token, depth)?);
                    continue;
                }
            };
            return Ok((merge_text(nodes), terminator));
        }
        Ok((merge_text(nodes), Terminator::End))
    }
}

/// Pair every `#if` with its `#end` in one pass. Unclosed `#if`s and
/// tokens that are not `#if` map to `None`.
fn match_conditionals(tokens: &[Token]) -> Vec<Option<usize>> {
    let mut closing = vec![None; tokens.len()];
    let mut open = Vec::new();
    for (idx, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Directive(Directive::If(_)) => open.push(idx),
            TokenKind::Directive(Directive::End) => {
                if let Some(start) = open.pop() {
                    closing[start] = Some(idx);
                }
            }
            _ => {}
        }
    }
    closing
}

fn text_node(token: &Token) -> Node {
    Node::new(NodeKind::Text, token.span, token.text.clone())
}

/// Join neighbouring text nodes
fn merge_text(nodes: Vec<Node>) -> Vec<Node> {
    let mut merged: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        match merged.last_mut() {
            Some(last) if last.is_text() && node.is_text() => {
                last.text.push_str(&node.text);
                last.span.end = node.span.end;
            }
            _ => merged.push(node),
        }
    }
    merged
}
