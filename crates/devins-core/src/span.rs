//! Source positions

use serde::Serialize;
use std::fmt;

/// A point in the source text.
///
/// `offset` is a byte offset; `line` and `column` are 1-based and count
/// characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    /// Byte offset into the source
    pub offset: usize,
    /// 1-based line number
    pub line: usize,
    /// 1-based column number
    pub column: usize,
}

impl Position {
    /// Position of the first character of a document
    pub const START: Position = Position {
        offset: 0,
        line: 1,
        column: 1,
    };

    /// Compute the position of a byte offset by scanning `source`.
    pub fn locate(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let mut line = 1;
        let mut column = 1;
        for (idx, ch) in source.char_indices() {
            if idx >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Self {
            offset,
            line,
            column,
        }
    }

    /// Advance past `ch`.
    pub fn advance(&mut self, ch: char) {
        self.offset += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::START
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Half-open byte range `[start, end)` of a node in its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    /// First position covered
    pub start: Position,
    /// Position just past the node
    pub end: Position,
}

impl Span {
    /// Create a span
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.end.offset - self.start.offset
    }

    /// Whether the span covers nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shift a span parsed from a sub-slice so it is relative to the parent.
    pub fn rebase(self, base: Position) -> Self {
        Self {
            start: rebase_position(self.start, base),
            end: rebase_position(self.end, base),
        }
    }
}

fn rebase_position(pos: Position, base: Position) -> Position {
    Position {
        offset: base.offset + pos.offset,
        line: base.line + pos.line - 1,
        column: if pos.line == 1 {
            base.column + pos.column - 1
        } else {
            pos.column
        },
    }
}
