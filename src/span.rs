//! Source locations attached to AST nodes and diagnostics.

use serde::Serialize;

/// A line/column range within a source file.
///
/// Lines and columns are 1-based; a default span (all zeros) marks nodes
/// synthesized by the pipeline rather than read from source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub file: u16,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            file: 0,
            line,
            column,
            end_line,
            end_column,
        }
    }

    /// Point span covering a single position.
    pub fn at(line: u32, column: u32) -> Self {
        Self::new(line, column, line, column)
    }

    /// Smallest span covering both inputs.
    pub fn merge(self, other: Span) -> Span {
        let (line, column) = if (self.line, self.column) <= (other.line, other.column) {
            (self.line, self.column)
        } else {
            (other.line, other.column)
        };
        let (end_line, end_column) =
            if (self.end_line, self.end_column) >= (other.end_line, other.end_column) {
                (self.end_line, self.end_column)
            } else {
                (other.end_line, other.end_column)
            };
        Span {
            file: self.file,
            line,
            column,
            end_line,
            end_column,
        }
    }

    /// True for spans that never came from source text.
    pub fn is_synthetic(self) -> bool {
        self.line == 0
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_takes_outer_bounds() {
        let a = Span::new(1, 5, 1, 9);
        let b = Span::new(1, 2, 2, 3);
        let m = a.merge(b);
        assert_eq!((m.line, m.column), (1, 2));
        assert_eq!((m.end_line, m.end_column), (2, 3));
    }

    #[test]
    fn default_is_synthetic() {
        assert!(Span::default().is_synthetic());
        assert!(!Span::at(3, 1).is_synthetic());
    }
}
