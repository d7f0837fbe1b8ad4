//! Front-matter value model and parser
//!
//! Front matter is the `---` delimited header of an instruction document. It
//! reads like YAML (`key: value`, nested objects by indentation, `- item`
//! arrays) but values may also be regex pattern-actions, `case` blocks,
//! expressions and variable references, so it has its own parser.
//!
//! ```text
//! ---
//! name: "Summarize"
//! when: { $lang == "rust" }
//! variables:
//!   "sources": /.*\.rs$/ { grep("src") | sort | head(5) }
//!   "kind": /(\w+)\.rs$/ {
//!     case "$1" {
//!       "main" { print("binary") }
//!       default { print("library") }
//!     }
//!   }
//! ---
//! ```

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::ast::Diagnostic;
use crate::error::ParseError;
use crate::pattern::{CaseArm, CaseKey, CaseMatch, PipelineFunc, display_pipeline};
use crate::span::{Position, Span};

/// Deepest brace nesting accepted inside front matter
pub const MAX_NESTING: usize = 64;

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][\w\-.]*$").unwrap());
static VAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$\{?([A-Za-z_]\w*)\}?$").unwrap());

/// Parsed front-matter block
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FrontMatter {
    /// Top-level entries in source order
    pub entries: Vec<FrontMatterEntry>,
}

impl FrontMatter {
    /// Look up a top-level entry
    pub fn get(&self, key: &str) -> Option<&FrontMatterValue> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    /// Number of top-level entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the block has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `key: value`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrontMatterEntry {
    /// Entry key, quotes removed
    pub key: String,
    /// Typed value
    pub value: FrontMatterValue,
    /// Location of the entry line
    pub span: Span,
}

/// Regex pattern with an action pipeline. Lifecycle hooks such as
/// `onStreamingEnd: { parseCode | saveFile }` have no pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternAction {
    /// Regex source without slashes
    pub pattern: Option<String>,
    /// Stages applied in order
    pub pipeline: Vec<PipelineFunc>,
}

/// Typed front-matter value
#[derive(Debug, Clone, PartialEq)]
pub enum FrontMatterValue {
    /// Quoted or free text
    String(String),
    /// Integer or float
    Number(serde_json::Number),
    /// `true` / `false`
    Boolean(bool),
    /// `YYYY-MM-DD`
    Date(NaiveDate),
    /// `[a, b]` or `- item` lines
    Array(Vec<FrontMatterValue>),
    /// Nested entries
    Object(Vec<FrontMatterEntry>),
    /// `/regex/ { pipeline }`
    PatternAction(PatternAction),
    /// `{ case "subject" { ... } }`
    CaseMatch(CaseMatch),
    /// `$name`
    VariableRef(String),
    /// `{ $a == "b" }`
    Expression(String),
    /// Bare word
    Identifier(String),
    /// `{ from { ... } where { ... } select { ... } }`
    Query(String),
}

impl FrontMatterValue {
    /// Variant name, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            FrontMatterValue::String(_) => "string",
            FrontMatterValue::Number(_) => "number",
            FrontMatterValue::Boolean(_) => "boolean",
            FrontMatterValue::Date(_) => "date",
            FrontMatterValue::Array(_) => "array",
            FrontMatterValue::Object(_) => "object",
            FrontMatterValue::PatternAction(_) => "pattern-action",
            FrontMatterValue::CaseMatch(_) => "case-match",
            FrontMatterValue::VariableRef(_) => "variable-ref",
            FrontMatterValue::Expression(_) => "expression",
            FrontMatterValue::Identifier(_) => "identifier",
            FrontMatterValue::Query(_) => "query",
        }
    }

    /// Convert to a JSON value. Scalars keep their type; the structured
    /// variants that only make sense at compile time become their display
    /// text.
    pub fn to_value(&self) -> Value {
        match self {
            FrontMatterValue::String(s) | FrontMatterValue::Identifier(s) => Value::String(s.clone()),
            FrontMatterValue::Number(n) => Value::Number(n.clone()),
            FrontMatterValue::Boolean(b) => Value::Bool(*b),
            FrontMatterValue::Array(items) => {
                Value::Array(items.iter().map(FrontMatterValue::to_value).collect())
            }
            FrontMatterValue::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|e| (e.key.clone(), e.value.to_value()))
                    .collect::<Map<_, _>>(),
            ),
            other => Value::String(other.to_string()),
        }
    }

    /// Boolean view used for option overrides
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FrontMatterValue::Boolean(b) => Some(*b),
            FrontMatterValue::String(s) | FrontMatterValue::Identifier(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Non-negative integer view used for option overrides
    pub fn as_usize(&self) -> Option<usize> {
        match self {
            FrontMatterValue::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
            FrontMatterValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for FrontMatterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrontMatterValue::String(s)
            | FrontMatterValue::Identifier(s)
            | FrontMatterValue::Query(s) => write!(f, "{s}"),
            FrontMatterValue::Number(n) => write!(f, "{n}"),
            FrontMatterValue::Boolean(b) => write!(f, "{b}"),
            FrontMatterValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FrontMatterValue::Array(items) => {
                let items: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            FrontMatterValue::Object(entries) => {
                let entries: Vec<String> = entries
                    .iter()
                    .map(|e| format!("{}: {}", e.key, e.value))
                    .collect();
                write!(f, "{{{}}}", entries.join(", "))
            }
            FrontMatterValue::PatternAction(action) => {
                if let Some(pattern) = &action.pattern {
                    write!(f, "/{pattern}/ ")?;
                }
                write!(f, "{{ {} }}", display_pipeline(&action.pipeline))
            }
            FrontMatterValue::CaseMatch(case) => write!(f, "{{ {case} }}"),
            FrontMatterValue::VariableRef(name) => write!(f, "${name}"),
            FrontMatterValue::Expression(expr) => write!(f, "{expr}"),
        }
    }
}

impl Serialize for FrontMatterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

// =============================================================================
// Parser
// =============================================================================

#[derive(Debug)]
struct Line {
    indent: usize,
    text: String,
    position: Position,
}

impl Line {
    fn content(&self) -> &str {
        self.text.trim()
    }
}

/// Parse a front-matter body (without its fences). `base` is the position
/// of the first body character in the full document.
pub fn parse_front_matter(
    body: &str,
    base: Position,
) -> std::result::Result<(FrontMatter, Vec<Diagnostic>), ParseError> {
    let lines = logical_lines(body, base)?;
    let mut parser = EntryParser {
        lines,
        idx: 0,
        diagnostics: Vec::new(),
    };
    let indent = parser.lines.first().map(|l| l.indent).unwrap_or(0);
    let entries = parser.parse_object(indent);
    Ok((FrontMatter { entries }, parser.diagnostics))
}

/// Split the body into logical lines, joining physical lines while a `{`
/// block is open.
fn logical_lines(body: &str, base: Position) -> std::result::Result<Vec<Line>, ParseError> {
    let mut lines: Vec<Line> = Vec::new();
    let mut pending: Option<(Line, i64)> = None;
    let mut pos = base;

    for raw in body.split('\n') {
        let line_pos = pos;
        for ch in raw.chars() {
            pos.advance(ch);
        }
        pos.advance('\n');
        let raw = raw.trim_end_matches('\r');

        if let Some((mut line, depth)) = pending.take() {
            line.text.push('\n');
            line.text.push_str(raw);
            let (delta, max) = brace_depth(raw, line_pos)?;
            if depth + max > MAX_NESTING as i64 {
                return Err(ParseError::new(
                    format!("front matter nests deeper than {MAX_NESTING} levels"),
                    line_pos,
                ));
            }
            let depth = depth + delta;
            if depth <= 0 {
                lines.push(line);
            } else {
                pending = Some((line, depth));
            }
            continue;
        }

        let trimmed = raw.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let line = Line {
            indent: raw.chars().take_while(|c| c.is_whitespace()).count(),
            text: raw.to_string(),
            position: line_pos,
        };
        let (delta, _) = brace_depth(raw, line_pos)?;
        if delta > 0 {
            pending = Some((line, delta));
        } else {
            lines.push(line);
        }
    }

    match pending {
        Some((line, _)) => Err(ParseError::new(
            "unterminated '{' block in front matter",
            line.position,
        )),
        None => Ok(lines),
    }
}

/// Net brace depth change of a line and its maximum running depth, skipping
/// quoted strings and `/regex/` literals.
fn brace_depth(line: &str, position: Position) -> std::result::Result<(i64, i64), ParseError> {
    let mut depth = 0i64;
    let mut max = 0i64;
    let mut quote: Option<char> = None;
    let mut prev_sig: Option<char> = None;
    let mut escaped = false;

    for ch in line.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
                prev_sig = Some(ch);
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '/' if matches!(prev_sig, None | Some(':' | '(' | ',' | '|')) => quote = Some('/'),
            '{' => {
                depth += 1;
                max = max.max(depth);
                if max > MAX_NESTING as i64 {
                    return Err(ParseError::new(
                        format!("front matter nests deeper than {MAX_NESTING} levels"),
                        position,
                    ));
                }
            }
            '}' => depth -= 1,
            _ => {}
        }
        if !ch.is_whitespace() {
            prev_sig = Some(ch);
        }
    }
    Ok((depth, max))
}

struct EntryParser {
    lines: Vec<Line>,
    idx: usize,
    diagnostics: Vec<Diagnostic>,
}

impl EntryParser {
    fn peek(&self) -> Option<&Line> {
        self.lines.get(self.idx)
    }

    fn parse_object(&mut self, indent: usize) -> Vec<FrontMatterEntry> {
        let mut entries = Vec::new();
        while let Some(line) = self.peek() {
            if line.indent < indent {
                break;
            }
            let position = line.position;
            if line.indent > indent {
                self.warn("unexpected indentation, line skipped", position);
                self.idx += 1;
                continue;
            }
            let Some((key, rest)) = split_key(line.content()) else {
                self.warn("expected 'key: value', line skipped", position);
                self.idx += 1;
                continue;
            };
            let (key, rest) = (key.to_string(), rest.to_string());
            let end = line_end(line);
            self.idx += 1;

            let value = if rest.trim().is_empty() {
                self.parse_nested(indent)
            } else {
                parse_inline(&rest)
            };
            entries.push(FrontMatterEntry {
                key,
                value,
                span: Span::new(position, end),
            });
        }
        entries
    }

    fn parse_nested(&mut self, parent_indent: usize) -> FrontMatterValue {
        let next = self
            .peek()
            .map(|line| (line.indent, line.content().starts_with('-')));
        match next {
            Some((indent, true)) if indent > parent_indent => self.parse_array(indent),
            Some((indent, false)) if indent > parent_indent => {
                FrontMatterValue::Object(self.parse_object(indent))
            }
            _ => FrontMatterValue::String(String::new()),
        }
    }

    fn parse_array(&mut self, indent: usize) -> FrontMatterValue {
        let mut items = Vec::new();
        while let Some(line) = self.peek() {
            if line.indent != indent {
                break;
            }
            let Some(item) = line.content().strip_prefix('-') else {
                break;
            };
            let item = item.trim().to_string();
            self.idx += 1;
            if item.is_empty() {
                items.push(self.parse_nested(indent));
            } else {
                items.push(parse_inline(&item));
            }
        }
        FrontMatterValue::Array(items)
    }

    fn warn(&mut self, message: &str, position: Position) {
        self.diagnostics.push(Diagnostic::new(message, position));
    }
}

fn line_end(line: &Line) -> Position {
    let mut pos = line.position;
    for ch in line.text.chars() {
        pos.advance(ch);
    }
    pos
}

/// Split `key: rest`. Keys may be quoted, `/regex/` or bare names.
fn split_key(content: &str) -> Option<(&str, &str)> {
    let (key, rest) = if let Some(q @ ('"' | '\'')) = content.chars().next() {
        let close = content[1..].find(q)? + 1;
        (&content[1..close], &content[close + 1..])
    } else if content.starts_with('/') {
        let close = find_unescaped(&content[1..], '/')? + 1;
        (&content[..=close], &content[close + 1..])
    } else {
        let colon = content.find(':')?;
        let key = content[..colon].trim_end();
        if !IDENT_RE.is_match(key) {
            return None;
        }
        (key, &content[colon..])
    };
    let rest = rest.trim_start().strip_prefix(':')?;
    if !(rest.is_empty() || rest.starts_with(char::is_whitespace)) {
        return None;
    }
    Some((key, rest))
}

fn find_unescaped(s: &str, target: char) -> Option<usize> {
    let mut escaped = false;
    for (idx, ch) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == target {
            return Some(idx);
        }
    }
    None
}

/// Parse a single-line (or brace-joined) value
pub fn parse_inline(text: &str) -> FrontMatterValue {
    let t = text.trim();
    match t.chars().next() {
        Some(q @ ('"' | '\'')) => match unquote(t, q) {
            Some((s, _)) => FrontMatterValue::String(s),
            None => FrontMatterValue::String(t.to_string()),
        },
        Some('/') => parse_pattern_action(t),
        Some('{') if t.ends_with('}') => classify_block(&t[1..t.len() - 1]),
        Some('[') if t.ends_with(']') => FrontMatterValue::Array(
            split_top_level(&t[1..t.len() - 1])
                .into_iter()
                .filter(|item| !item.trim().is_empty())
                .map(parse_inline)
                .collect(),
        ),
        Some('$') if VAR_RE.is_match(t) => {
            let name = VAR_RE
                .captures(t)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            FrontMatterValue::VariableRef(name)
        }
        _ => parse_scalar(t),
    }
}

fn parse_scalar(t: &str) -> FrontMatterValue {
    if DATE_RE.is_match(t)
        && let Ok(date) = NaiveDate::parse_from_str(t, "%Y-%m-%d")
    {
        return FrontMatterValue::Date(date);
    }
    match t {
        "true" | "TRUE" => return FrontMatterValue::Boolean(true),
        "false" | "FALSE" => return FrontMatterValue::Boolean(false),
        _ => {}
    }
    if let Ok(n) = t.parse::<i64>() {
        return FrontMatterValue::Number(n.into());
    }
    if t.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.')
        && let Ok(f) = t.parse::<f64>()
        && let Some(n) = serde_json::Number::from_f64(f)
    {
        return FrontMatterValue::Number(n);
    }
    if IDENT_RE.is_match(t) {
        return FrontMatterValue::Identifier(t.to_string());
    }
    FrontMatterValue::String(t.to_string())
}

/// Read a quoted string starting at the first char of `s`, handling
/// `\n`, `\t`, `\\` and escaped quotes. Returns the text and bytes consumed.
fn unquote(s: &str, q: char) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut chars = s.char_indices().skip(1);
    while let Some((idx, ch)) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, other)) => out.push(other),
                None => return None,
            },
            c if c == q => return Some((out, idx + c.len_utf8())),
            c => out.push(c),
        }
    }
    None
}

fn parse_pattern_action(t: &str) -> FrontMatterValue {
    let Some(close) = find_unescaped(&t[1..], '/').map(|i| i + 1) else {
        return FrontMatterValue::String(t.to_string());
    };
    let pattern = t[1..close].to_string();
    let rest = t[close + 1..].trim();
    let pipeline = if rest.starts_with('{') && rest.ends_with('}') {
        let tokens = block_tokens(&rest[1..rest.len() - 1]);
        let mut idx = 0;
        match parse_pipeline(&tokens, &mut idx) {
            Some(funcs) if idx == tokens.len() => funcs,
            _ => vec![PipelineFunc::Call {
                name: rest[1..rest.len() - 1].trim().to_string(),
                args: Vec::new(),
            }],
        }
    } else {
        Vec::new()
    };
    FrontMatterValue::PatternAction(PatternAction {
        pattern: Some(pattern),
        pipeline,
    })
}

/// Decide what a `{ ... }` block holds: case, query, pipeline or expression
fn classify_block(inner: &str) -> FrontMatterValue {
    let tokens = block_tokens(inner);
    match tokens.first() {
        Some(BlockToken::Ident(word)) if word == "case" => {
            let mut idx = 0;
            if let Some(case) = parse_case(&tokens, &mut idx)
                && idx == tokens.len()
            {
                return FrontMatterValue::CaseMatch(case);
            }
        }
        Some(BlockToken::Ident(word)) if word == "from" => {
            return FrontMatterValue::Query(inner.trim().to_string());
        }
        Some(_) => {
            let mut idx = 0;
            if let Some(pipeline) = parse_pipeline(&tokens, &mut idx)
                && idx == tokens.len()
            {
                return FrontMatterValue::PatternAction(PatternAction {
                    pattern: None,
                    pipeline,
                });
            }
        }
        None => {}
    }
    FrontMatterValue::Expression(inner.trim().to_string())
}

fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (idx, ch) in s.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '[' | '{' | '(') => depth += 1,
            (None, ']' | '}' | ')') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(&s[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

// =============================================================================
// Block tokens
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum BlockToken {
    Ident(String),
    Str(String),
    Number(String),
    Var(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Pipe,
    Other(char),
}

fn block_tokens(s: &str) -> Vec<BlockToken> {
    let mut tokens = Vec::new();
    let mut idx = 0;
    while idx < s.len() {
        let rest = &s[idx..];
        let Some(ch) = rest.chars().next() else {
            break;
        };
        if ch.is_whitespace() {
            idx += ch.len_utf8();
            continue;
        }
        let (token, len) = match ch {
            '"' | '\'' => match unquote(rest, ch) {
                Some((text, len)) => (BlockToken::Str(text), len),
                None => (BlockToken::Other(ch), 1),
            },
            '$' => {
                let len = 1 + rest[1..]
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(rest.len() - 1);
                if len == 1 {
                    (BlockToken::Other('$'), 1)
                } else {
                    (BlockToken::Var(rest[..len].to_string()), len)
                }
            }
            c if c.is_ascii_digit() => {
                let len = rest
                    .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                    .unwrap_or(rest.len());
                (BlockToken::Number(rest[..len].to_string()), len)
            }
            c if c.is_alphabetic() || c == '_' => {
                let len = rest
                    .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                    .unwrap_or(rest.len());
                (BlockToken::Ident(rest[..len].to_string()), len)
            }
            '(' => (BlockToken::LParen, 1),
            ')' => (BlockToken::RParen, 1),
            '{' => (BlockToken::LBrace, 1),
            '}' => (BlockToken::RBrace, 1),
            ',' => (BlockToken::Comma, 1),
            '|' => (BlockToken::Pipe, 1),
            other => (BlockToken::Other(other), other.len_utf8()),
        };
        tokens.push(token);
        idx += len;
    }
    tokens
}

fn parse_pipeline(tokens: &[BlockToken], idx: &mut usize) -> Option<Vec<PipelineFunc>> {
    let mut funcs = vec![parse_call(tokens, idx)?];
    while tokens.get(*idx) == Some(&BlockToken::Pipe) {
        *idx += 1;
        funcs.push(parse_call(tokens, idx)?);
    }
    Some(funcs)
}

fn parse_call(tokens: &[BlockToken], idx: &mut usize) -> Option<PipelineFunc> {
    let BlockToken::Ident(name) = tokens.get(*idx)? else {
        return None;
    };
    if name == "case" {
        return parse_case(tokens, idx).map(PipelineFunc::Case);
    }
    *idx += 1;
    let mut args = Vec::new();
    if tokens.get(*idx) == Some(&BlockToken::LParen) {
        *idx += 1;
        loop {
            match tokens.get(*idx)? {
                BlockToken::RParen => {
                    *idx += 1;
                    break;
                }
                BlockToken::Comma => *idx += 1,
                BlockToken::Str(s)
                | BlockToken::Number(s)
                | BlockToken::Var(s)
                | BlockToken::Ident(s) => {
                    args.push(s.clone());
                    *idx += 1;
                }
                _ => return None,
            }
        }
    }
    Some(PipelineFunc::from_call(name, args))
}

fn parse_case(tokens: &[BlockToken], idx: &mut usize) -> Option<CaseMatch> {
    *idx += 1;
    let subject = match tokens.get(*idx)? {
        BlockToken::Str(s) | BlockToken::Var(s) => s.clone(),
        _ => return None,
    };
    *idx += 1;
    expect(tokens, idx, &BlockToken::LBrace)?;

    let mut arms = Vec::new();
    loop {
        let key = match tokens.get(*idx)? {
            BlockToken::RBrace => {
                *idx += 1;
                break;
            }
            BlockToken::Ident(word) if word == "default" => CaseKey::Default,
            BlockToken::Str(s) | BlockToken::Number(s) | BlockToken::Ident(s) => {
                CaseKey::Literal(s.clone())
            }
            _ => return None,
        };
        *idx += 1;
        expect(tokens, idx, &BlockToken::LBrace)?;
        let pipeline = parse_pipeline(tokens, idx)?;
        expect(tokens, idx, &BlockToken::RBrace)?;
        arms.push(CaseArm { key, pipeline });
    }
    Some(CaseMatch { subject, arms })
}

fn expect(tokens: &[BlockToken], idx: &mut usize, token: &BlockToken) -> Option<()> {
    if tokens.get(*idx) == Some(token) {
        *idx += 1;
        Some(())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> FrontMatter {
        parse_front_matter(body, Position::START).unwrap().0
    }

    #[test]
    fn test_scalar_types() {
        let fm = parse(
            "name: \"Summary\"\ncount: 3\nratio: 0.5\nenabled: true\nloud: FALSE\nday: 2024-01-15\nmode: fast\n",
        );
        assert_eq!(fm.get("name"), Some(&FrontMatterValue::String("Summary".into())));
        assert_eq!(fm.get("count"), Some(&FrontMatterValue::Number(3.into())));
        assert!(matches!(fm.get("ratio"), Some(FrontMatterValue::Number(_))));
        assert_eq!(fm.get("enabled"), Some(&FrontMatterValue::Boolean(true)));
        assert_eq!(fm.get("loud"), Some(&FrontMatterValue::Boolean(false)));
        assert_eq!(
            fm.get("day"),
            Some(&FrontMatterValue::Date(
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
            ))
        );
        assert_eq!(fm.get("mode"), Some(&FrontMatterValue::Identifier("fast".into())));
    }

    #[test]
    fn test_quoted_escapes() {
        let fm = parse(r#"text: "line\n\"quoted\"""#);
        assert_eq!(
            fm.get("text"),
            Some(&FrontMatterValue::String("line\n\"quoted\"".into()))
        );
    }

    #[test]
    fn test_nested_object_and_arrays() {
        let fm = parse("variables:\n  \"a\": 1\n  b: $other\ntags: [x, \"y z\"]\nlist:\n  - one\n  - 2\n");
        match fm.get("variables") {
            Some(FrontMatterValue::Object(entries)) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].key, "a");
                assert_eq!(entries[1].value, FrontMatterValue::VariableRef("other".into()));
            }
            other => panic!("Expected object, got {other:?}"),
        }
        assert_eq!(
            fm.get("tags"),
            Some(&FrontMatterValue::Array(vec![
                FrontMatterValue::Identifier("x".into()),
                FrontMatterValue::String("y z".into()),
            ]))
        );
        assert_eq!(
            fm.get("list").map(|v| v.to_value()),
            Some(serde_json::json!(["one", 2]))
        );
    }

    #[test]
    fn test_pattern_action_with_pipeline() {
        let fm = parse(r#"files: /.*\.rs$/ { grep("src") | sort | head(2) }"#);
        match fm.get("files") {
            Some(FrontMatterValue::PatternAction(action)) => {
                assert_eq!(action.pattern.as_deref(), Some(r".*\.rs$"));
                assert_eq!(
                    action.pipeline,
                    vec![
                        PipelineFunc::Grep(vec!["src".into()]),
                        PipelineFunc::Sort,
                        PipelineFunc::Head(2),
                    ]
                );
            }
            other => panic!("Expected pattern action, got {other:?}"),
        }
    }

    #[test]
    fn test_multiline_case_block() {
        let fm = parse(
            "kind: /(\\w+)\\.rs$/ {\n  case \"$1\" {\n    \"main\" { print(\"binary\") }\n    default { print(\"library\") }\n  }\n}\nafter: 1\n",
        );
        match fm.get("kind") {
            Some(FrontMatterValue::PatternAction(action)) => match &action.pipeline[0] {
                PipelineFunc::Case(case) => {
                    assert_eq!(case.subject, "$1");
                    assert_eq!(case.arms.len(), 2);
                    assert_eq!(case.arms[1].key, CaseKey::Default);
                }
                other => panic!("Expected case, got {other:?}"),
            },
            other => panic!("Expected pattern action, got {other:?}"),
        }
        assert_eq!(fm.get("after"), Some(&FrontMatterValue::Number(1.into())));
    }

    #[test]
    fn test_braced_block_classification() {
        let fm = parse(
            "when: { $lang == \"rust\" && $count > 2 }\nonStreamingEnd: { parseCode | saveFile(\"out.rs\") }\nq: { from { Files } select { name } }\nroute: { case $mode { \"a\" { print(\"x\") } } }\n",
        );
        assert_eq!(
            fm.get("when"),
            Some(&FrontMatterValue::Expression(
                "$lang == \"rust\" && $count > 2".into()
            ))
        );
        assert!(matches!(
            fm.get("onStreamingEnd"),
            Some(FrontMatterValue::PatternAction(PatternAction { pattern: None, .. }))
        ));
        assert!(matches!(fm.get("q"), Some(FrontMatterValue::Query(_))));
        assert!(matches!(fm.get("route"), Some(FrontMatterValue::CaseMatch(_))));
    }

    #[test]
    fn test_regex_braces_do_not_open_blocks() {
        let fm = parse("date: /\\d{4}-\\d{2}/\nnext: 1\n");
        assert!(matches!(fm.get("date"), Some(FrontMatterValue::PatternAction(_))));
        assert_eq!(fm.len(), 2);
    }

    #[test]
    fn test_unterminated_block_is_a_failure() {
        let err = parse_front_matter("when: { $a == 1\nname: x\n", Position::START).unwrap_err();
        assert!(err.message.contains("unterminated"));
        assert_eq!(err.position.line, 1);
    }

    #[test]
    fn test_excessive_nesting_is_a_failure() {
        let body = format!("deep: {}{}\n", "{".repeat(70), "}".repeat(70));
        assert!(parse_front_matter(&body, Position::START).is_err());
    }

    #[test]
    fn test_malformed_lines_are_diagnostics() {
        let (fm, diagnostics) =
            parse_front_matter("name: ok\nthis is not an entry\n", Position::START).unwrap();
        assert_eq!(fm.len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].position.line, 2);
    }

    #[test]
    fn test_comments_are_skipped() {
        let fm = parse("# a comment\nname: x\n");
        assert_eq!(fm.len(), 1);
    }

    #[test]
    fn test_display_round_trips_shape() {
        let fm = parse(r#"files: /\.md$/ { sort | head(1) }"#);
        assert_eq!(
            fm.get("files").unwrap().to_string(),
            r#"/\.md$/ { sort | head(1) }"#
        );
    }
}
