//! Tokenizer for instruction documents
//!
//! The lexer works on whole constructs: a `$variable` with its accessors, a
//! `/command:argument`, a fenced code block or a front-matter region each
//! come out as a single [`Token`]. Everything that is not recognised as a
//! construct is collected into [`TokenKind::Text`] tokens, so the lexer can
//! never fail. Unterminated fences and front matter are reported as
//! diagnostics and fall back to text.
//!
//! Sigils only start a construct at a word boundary, which keeps URLs,
//! paths and e-mail addresses in prose intact:
//!
//! ```text
//! see https://example.com/docs   -> Text
//! run /file:src/main.rs          -> Text, Command { name: "file", argument: "src/main.rs" }
//! mail bob@example.com           -> Text
//! ask @reviewer                  -> Text, Agent { name: "reviewer" }
//! ```

use crate::ast::{Accessor, Diagnostic};
use crate::span::{Position, Span};

/// Token kinds produced by the [`Lexer`]
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Front-matter region, without its `---` fences
    FrontMatter {
        /// Text between the fences
        body: String,
        /// Position of the first body character
        body_start: Position,
    },
    /// Literal text
    Text,
    /// `/name` or `/name:argument`
    Command {
        /// Command name
        name: String,
        /// Argument after the colon
        argument: Option<String>,
    },
    /// `@name` or `@"name"`
    Agent {
        /// Agent name
        name: String,
    },
    /// `$name`, `${name}` with accessors
    Variable {
        /// Variable name
        name: String,
        /// Property and index accessors
        accessors: Vec<Accessor>,
    },
    /// Complete fenced code block
    CodeBlock {
        /// Language tag
        language: Option<String>,
        /// Body between the fences
        body: String,
    },
    /// `#if`, `#elseif`, `#else`, `#end` or `#set`
    Directive(Directive),
}

/// Velocity-style directives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `#if(condition)`
    If(String),
    /// `#elseif(condition)`
    ElseIf(String),
    /// `#else`
    Else,
    /// `#end`
    End,
    /// `#set($name = expression)`
    Set {
        /// Assigned variable
        name: String,
        /// Expression source
        expression: String,
    },
}

/// A token with its location and source text
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Kind and payload
    pub kind: TokenKind,
    /// Location in the source
    pub span: Span,
    /// Exact source text
    pub text: String,
}

/// Construct-level lexer
pub struct Lexer<'a> {
    source: &'a str,
    pos: Position,
    text_start: Option<Position>,
    tokens: Vec<Token>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over `source`
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: Position::START,
            text_start: None,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Tokenize the whole input
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        let source = self.source;

        if let Some((body_offset, total)) = scan_front_matter(source) {
            let kind = TokenKind::FrontMatter {
                body: source[body_offset..total]
                    .lines()
                    .take_while(|line| line.trim_end() != "---")
                    .collect::<Vec<_>>()
                    .join("\n"),
                body_start: Position::locate(source, body_offset),
            };
            self.push(kind, total);
        } else if source.starts_with("---\n") || source.starts_with("---\r\n") {
            self.diagnostics.push(Diagnostic::new(
                "front matter is never closed, treating it as text",
                Position::START,
            ));
        }

        while self.pos.offset < source.len() {
            let rest = &source[self.pos.offset..];

            if let Some((kind, len)) = self.scan_construct(rest) {
                self.flush_text();
                self.push(kind, len);
                continue;
            }

            if self.at_line_start() && rest.starts_with("```") {
                self.diagnostics.push(Diagnostic::new(
                    "code block is never closed, treating the rest as text",
                    self.pos,
                ));
                self.begin_text();
                for ch in rest.chars() {
                    self.pos.advance(ch);
                }
                break;
            }

            self.begin_text();
            if let Some(ch) = rest.chars().next() {
                self.pos.advance(ch);
            }
        }

        self.flush_text();
        (self.tokens, self.diagnostics)
    }

    fn scan_construct(&self, rest: &str) -> Option<(TokenKind, usize)> {
        let prev = self.source[..self.pos.offset].chars().next_back();
        match rest.chars().next()? {
            '`' if self.at_line_start() => scan_code_block(rest),
            '$' if may_start_variable(prev) => {
                scan_variable(rest)
                    .map(|(name, accessors, len)| (TokenKind::Variable { name, accessors }, len))
            }
            '/' if is_boundary(prev) => scan_command(rest),
            '@' if is_boundary(prev) => scan_agent(rest),
            '#' if is_boundary(prev) => scan_directive(rest),
            _ => None,
        }
    }

    fn at_line_start(&self) -> bool {
        self.pos.offset == 0 || self.source.as_bytes()[self.pos.offset - 1] == b'\n'
    }

    fn begin_text(&mut self) {
        if self.text_start.is_none() {
            self.text_start = Some(self.pos);
        }
    }

    fn flush_text(&mut self) {
        if let Some(start) = self.text_start.take()
            && start.offset < self.pos.offset
        {
            self.tokens.push(Token {
                kind: TokenKind::Text,
                span: Span::new(start, self.pos),
                text: self.source[start.offset..self.pos.offset].to_string(),
            });
        }
    }

    fn push(&mut self, kind: TokenKind, len: usize) {
        let start = self.pos;
        let text = &self.source[start.offset..start.offset + len];
        for ch in text.chars() {
            self.pos.advance(ch);
        }
        self.tokens.push(Token {
            kind,
            span: Span::new(start, self.pos),
            text: text.to_string(),
        });
    }
}

/// Tokenize `source` in one call
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    Lexer::new(source).tokenize()
}

/// Characters allowed in variable identifiers after the first one
pub fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Whether a `$` preceded by `prev` may start a variable reference
pub fn may_start_variable(prev: Option<char>) -> bool {
    !prev.is_some_and(|c| is_ident_char(c) || c == '$' || c == '\\')
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.')
}

/// Whether a `/`, `@` or `#` preceded by `prev` may start a construct
pub fn is_boundary(prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(ch) => ch.is_whitespace() || matches!(ch, '(' | '[' | '{' | '"' | '\'' | '>'),
    }
}

fn take_ident(s: &str) -> Option<usize> {
    if !s.chars().next().is_some_and(is_ident_start) {
        return None;
    }
    Some(s.find(|c: char| !is_ident_char(c)).unwrap_or(s.len()))
}

fn take_name(s: &str) -> Option<&str> {
    if !s.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
        return None;
    }
    let end = s.find(|c: char| !is_name_char(c)).unwrap_or(s.len());
    Some(s[..end].trim_end_matches(['.', '-']))
}

/// Scan a variable reference at the start of `input` (which must begin with
/// `$`). Returns the name, the accessors and the number of bytes consumed.
pub fn scan_variable(input: &str) -> Option<(String, Vec<Accessor>, usize)> {
    let body = input.strip_prefix('$')?;
    if let Some(braced) = body.strip_prefix('{') {
        let close = braced.find('}')?;
        let inner = &braced[..close];
        let (name, accessors, used) = scan_path(inner)?;
        if used != inner.len() {
            return None;
        }
        return Some((name, accessors, close + 3));
    }
    let (name, accessors, used) = scan_path(body)?;
    Some((name, accessors, used + 1))
}

fn scan_path(s: &str) -> Option<(String, Vec<Accessor>, usize)> {
    let name_len = take_ident(s)?;
    let mut accessors = Vec::new();
    let mut i = name_len;

    loop {
        let rest = &s[i..];
        if let Some(after) = rest.strip_prefix('.') {
            match take_ident(after) {
                Some(n) => {
                    accessors.push(Accessor::Property(after[..n].to_string()));
                    i += 1 + n;
                    continue;
                }
                None => break,
            }
        }
        if let Some(after) = rest.strip_prefix('[')
            && let Some(close) = after.find(']')
        {
            let inner = &after[..close];
            if !inner.is_empty() && inner.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(idx) = inner.parse() {
                    accessors.push(Accessor::Index(idx));
                    i += close + 2;
                    continue;
                }
            } else if inner.len() >= 2
                && ((inner.starts_with('"') && inner.ends_with('"'))
                    || (inner.starts_with('\'') && inner.ends_with('\'')))
            {
                accessors.push(Accessor::Key(inner[1..inner.len() - 1].to_string()));
                i += close + 2;
                continue;
            }
        }
        break;
    }

    Some((s[..name_len].to_string(), accessors, i))
}

fn scan_command(rest: &str) -> Option<(TokenKind, usize)> {
    let name = take_name(&rest[1..])?;
    let mut len = 1 + name.len();
    let mut argument = None;
    if let Some(arg) = rest[len..].strip_prefix(':') {
        let end = arg.find(char::is_whitespace).unwrap_or(arg.len());
        if end > 0 {
            argument = Some(arg[..end].to_string());
            len += 1 + end;
        }
    }
    Some((
        TokenKind::Command {
            name: name.to_string(),
            argument,
        },
        len,
    ))
}

fn scan_agent(rest: &str) -> Option<(TokenKind, usize)> {
    let body = &rest[1..];
    if let Some(quoted) = body.strip_prefix('"') {
        let close = quoted.find(['"', '\n'])?;
        if !quoted[close..].starts_with('"') || close == 0 {
            return None;
        }
        return Some((
            TokenKind::Agent {
                name: quoted[..close].to_string(),
            },
            close + 3,
        ));
    }
    let name = take_name(body)?;
    Some((
        TokenKind::Agent {
            name: name.to_string(),
        },
        1 + name.len(),
    ))
}

fn scan_directive(rest: &str) -> Option<(TokenKind, usize)> {
    let body = &rest[1..];
    let ends_word = |n: usize| !body[n..].chars().next().is_some_and(is_ident_char);

    if let Some(args) = body.strip_prefix("elseif") {
        let (inner, len) = balanced_parens(args)?;
        return Some((
            TokenKind::Directive(Directive::ElseIf(inner.trim().to_string())),
            1 + "elseif".len() + len,
        ));
    }
    if let Some(args) = body.strip_prefix("if") {
        let (inner, len) = balanced_parens(args)?;
        return Some((
            TokenKind::Directive(Directive::If(inner.trim().to_string())),
            1 + "if".len() + len,
        ));
    }
    if body.starts_with("else") && ends_word(4) {
        return Some((TokenKind::Directive(Directive::Else), 5));
    }
    if body.starts_with("end") && ends_word(3) {
        return Some((TokenKind::Directive(Directive::End), 4));
    }
    if let Some(args) = body.strip_prefix("set") {
        let (inner, len) = balanced_parens(args)?;
        let eq = inner.find('=')?;
        let name = inner[..eq].trim();
        let name = name.strip_prefix('$').unwrap_or(name);
        let expression = inner[eq + 1..].trim();
        if take_ident(name) != Some(name.len()) || expression.is_empty() {
            return None;
        }
        return Some((
            TokenKind::Directive(Directive::Set {
                name: name.to_string(),
                expression: expression.to_string(),
            }),
            1 + "set".len() + len,
        ));
    }
    None
}

/// Match `( ... )` on a single line, skipping quoted strings. Returns the
/// inner text and the length including both parentheses.
fn balanced_parens(s: &str) -> Option<(&str, usize)> {
    if !s.starts_with('(') {
        return None;
    }
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (idx, ch) in s.char_indices() {
        match (quote, ch) {
            (_, '\n') => return None,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    return Some((&s[1..idx], idx + 1));
                }
            }
            _ => {}
        }
    }
    None
}

fn scan_code_block(rest: &str) -> Option<(TokenKind, usize)> {
    if !rest.starts_with("```") {
        return None;
    }
    let line_end = rest.find('\n')?;
    let language = rest[3..line_end].trim();
    let language = (!language.is_empty()).then(|| language.to_string());
    let body_start = line_end + 1;
    let mut cursor = body_start;

    loop {
        let line = &rest[cursor..];
        if line.starts_with("```") {
            let close_end = line.find('\n').map(|i| cursor + i).unwrap_or(rest.len());
            let close_end = if rest[..close_end].ends_with('\r') {
                close_end - 1
            } else {
                close_end
            };
            return Some((
                TokenKind::CodeBlock {
                    language,
                    body: rest[body_start..cursor].to_string(),
                },
                close_end,
            ));
        }
        cursor += line.find('\n')? + 1;
    }
}

/// Locate a front-matter region at the start of `source`. Returns the body
/// offset and the total length including the closing fence line.
fn scan_front_matter(source: &str) -> Option<(usize, usize)> {
    let first_line_end = source.find('\n')?;
    if source[..first_line_end].trim_end() != "---" {
        return None;
    }
    let body_start = first_line_end + 1;
    let mut cursor = body_start;
    loop {
        let line_end = source[cursor..].find('\n').map(|i| cursor + i);
        let line = &source[cursor..line_end.unwrap_or(source.len())];
        if line.trim_end() == "---" {
            return Some((body_start, line_end.map(|e| e + 1).unwrap_or(source.len())));
        }
        cursor = line_end? + 1;
    }
}
