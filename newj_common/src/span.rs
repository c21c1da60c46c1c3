//! Source location tracking for the NewJ compiler

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in source code, tracked as line/column for humans and as a
/// byte offset for slicing the original source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: u32) -> Self {
        Self { line, column, offset }
    }

    pub fn start() -> Self {
        Self::new(1, 1, 0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A span of source code from start to end position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
    pub file_id: u32,
}

impl Span {
    pub fn new(start: Position, end: Position, file_id: u32) -> Self {
        Self { start, end, file_id }
    }

    pub fn single(pos: Position, file_id: u32) -> Self {
        Self::new(pos, pos, file_id)
    }

    /// The smallest span covering both `self` and `other`.
    pub fn combine(self, other: Span) -> Span {
        debug_assert_eq!(self.file_id, other.file_id);
        Span::new(
            if self.start.offset <= other.start.offset { self.start } else { other.start },
            if self.end.offset >= other.end.offset { self.end } else { other.end },
            self.file_id,
        )
    }

    /// Slice the original source text covered by this span.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start.offset as usize..self.end.offset as usize]
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line {
            write!(f, "{}:{}-{}", self.start.line, self.start.column, self.end.column)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// A value with associated source location information.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Spanned<T> {
    pub value: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(value: T, span: Span) -> Self {
        Self { value, span }
    }

    pub fn map<U, F>(self, f: F) -> Spanned<U>
    where
        F: FnOnce(T) -> U,
    {
        Spanned::new(f(self.value), self.span)
    }
}

impl<T: fmt::Display> fmt::Display for Spanned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.value, self.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn combine_picks_outermost_offsets() {
        let a = Span::new(Position::new(1, 1, 0), Position::new(1, 4, 3), 0);
        let b = Span::new(Position::new(1, 6, 5), Position::new(1, 9, 8), 0);
        let c = a.combine(b);
        assert_eq!(c.start.offset, 0);
        assert_eq!(c.end.offset, 8);
    }

    #[test]
    fn text_slices_by_byte_offset() {
        let source = "let x = 5";
        let span = Span::new(Position::new(1, 5, 4), Position::new(1, 6, 5), 0);
        assert_eq!(span.text(source), "x");
    }
}
