//! Diagnostics collection.
//!
//! Passes log coded diagnostics against source spans and keep going; the
//! logger owns severity counts, duplicate suppression (the optimizer re-runs
//! passes to fixpoint, and a re-run must not double-report), and the
//! assertion-comment filter used by the golden test corpus.

use serde::Serialize;

use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

/// Stable diagnostic codes. The numeric ids are part of the tool's contract:
/// golden tests and `ASSERT` comments match on them, so they never change
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagCode {
    // errors
    SyntaxError,
    DuplicateDeclaration,
    UndefinedSymbol,
    InvalidEvent,
    DeclarationInvalidHere,
    TypeMismatch,
    InvalidOperator,
    InvalidMember,
    WrongTypeArgument,
    TooManyArguments,
    TooFewArguments,
    ArgumentWrongTypeEvent,
    TooManyArgumentsEvent,
    TooFewArgumentsEvent,
    NotAllPathsReturn,
    ReturnValueMismatch,
    AssertionFailed,
    // warnings
    ConditionAlwaysTrue,
    ConditionAlwaysFalse,
    AssignmentInComparison,
    MultipleEventHandlers,
    UnusedVariable,
    UnusedFunction,
    UnusedLabel,
    DuplicateLabelName,
    JumpToWrongLabel,
    DivisionByZero,
}

impl DiagCode {
    pub fn id(self) -> u16 {
        match self {
            DiagCode::SyntaxError => 10001,
            DiagCode::DuplicateDeclaration => 10002,
            DiagCode::UndefinedSymbol => 10003,
            DiagCode::InvalidEvent => 10004,
            DiagCode::DeclarationInvalidHere => 10005,
            DiagCode::TypeMismatch => 10006,
            DiagCode::InvalidOperator => 10007,
            DiagCode::InvalidMember => 10008,
            DiagCode::WrongTypeArgument => 10009,
            DiagCode::TooManyArguments => 10010,
            DiagCode::TooFewArguments => 10011,
            DiagCode::ArgumentWrongTypeEvent => 10012,
            DiagCode::TooManyArgumentsEvent => 10013,
            DiagCode::TooFewArgumentsEvent => 10014,
            DiagCode::NotAllPathsReturn => 10015,
            DiagCode::ReturnValueMismatch => 10016,
            DiagCode::AssertionFailed => 10017,
            DiagCode::ConditionAlwaysTrue => 20001,
            DiagCode::ConditionAlwaysFalse => 20002,
            DiagCode::AssignmentInComparison => 20003,
            DiagCode::MultipleEventHandlers => 20004,
            DiagCode::UnusedVariable => 20005,
            DiagCode::UnusedFunction => 20006,
            DiagCode::UnusedLabel => 20007,
            DiagCode::DuplicateLabelName => 20008,
            DiagCode::JumpToWrongLabel => 20009,
            DiagCode::DivisionByZero => 20010,
        }
    }

    pub fn severity(self) -> Severity {
        if self.id() < 20000 {
            Severity::Error
        } else {
            Severity::Warning
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagCode,
    pub id: u16,
    pub span: Span,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN",
        };
        write!(
            f,
            "{}:: {} E{}: {}",
            tag, self.span, self.id, self.message
        )
    }
}

/// An `// ASSERT: error E10006 at line 4` comment gathered by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assertion {
    pub id: u16,
    pub line: u32,
    pub span: Span,
}

#[derive(Debug, Default)]
pub struct Logger {
    diags: Vec<Diagnostic>,
    assertions: Vec<Assertion>,
    check_assertions: bool,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_check_assertions(&mut self, on: bool) {
        self.check_assertions = on;
    }

    pub fn add_assertions(&mut self, asserts: impl IntoIterator<Item = Assertion>) {
        self.assertions.extend(asserts);
    }

    pub fn log(&mut self, code: DiagCode, span: Span, message: impl Into<String>) {
        // passes run to fixpoint; an identical re-report is not new information
        if self
            .diags
            .iter()
            .any(|d| d.code == code && d.span == span)
        {
            return;
        }
        self.diags.push(Diagnostic {
            severity: code.severity(),
            code,
            id: code.id(),
            span,
            message: message.into(),
        });
    }

    pub fn error(&mut self, code: DiagCode, span: Span, message: impl Into<String>) {
        debug_assert_eq!(code.severity(), Severity::Error);
        self.log(code, span, message);
    }

    pub fn warn(&mut self, code: DiagCode, span: Span, message: impl Into<String>) {
        debug_assert_eq!(code.severity(), Severity::Warning);
        self.log(code, span, message);
    }

    pub fn errors(&self) -> usize {
        self.diags
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn warnings(&self) -> usize {
        self.diags
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diags
    }

    pub fn has_code(&self, code: DiagCode) -> bool {
        self.diags.iter().any(|d| d.code == code)
    }

    /// Drop every diagnostic matched by an assertion comment; any assertion
    /// left unmatched becomes an error of its own. No-op unless assertion
    /// checking was requested.
    pub fn filter_assertions(&mut self) {
        if !self.check_assertions {
            return;
        }
        let mut unmatched = Vec::new();
        for a in std::mem::take(&mut self.assertions) {
            let before = self.diags.len();
            self.diags
                .retain(|d| !(d.id == a.id && d.span.line == a.line));
            if self.diags.len() == before {
                unmatched.push(a);
            }
        }
        for a in unmatched {
            self.log(
                DiagCode::AssertionFailed,
                a.span,
                format!("asserted diagnostic E{} at line {} was not produced", a.id, a.line),
            );
        }
        self.check_assertions = false;
    }

    pub fn report(&self) -> String {
        let mut out = String::new();
        for d in &self.diags {
            out.push_str(&d.to_string());
            out.push('\n');
        }
        out.push_str(&format!(
            "TOTAL:: Errors: {}  Warnings: {}\n",
            self.errors(),
            self.warnings()
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_reports_are_suppressed() {
        let mut log = Logger::new();
        let span = Span::at(3, 1);
        log.error(DiagCode::UndefinedSymbol, span, "`x` is undefined");
        log.error(DiagCode::UndefinedSymbol, span, "`x` is undefined");
        assert_eq!(log.errors(), 1);
    }

    #[test]
    fn assertion_filter_consumes_matches() {
        let mut log = Logger::new();
        log.set_check_assertions(true);
        log.add_assertions([Assertion {
            id: DiagCode::TypeMismatch.id(),
            line: 4,
            span: Span::at(3, 1),
        }]);
        log.error(DiagCode::TypeMismatch, Span::at(4, 9), "bad type");
        log.filter_assertions();
        assert_eq!(log.errors(), 0, "matched diagnostic should be removed");
    }

    #[test]
    fn unmatched_assertion_fails_the_compile() {
        let mut log = Logger::new();
        log.set_check_assertions(true);
        log.add_assertions([Assertion {
            id: DiagCode::TypeMismatch.id(),
            line: 4,
            span: Span::at(3, 1),
        }]);
        log.filter_assertions();
        assert_eq!(log.errors(), 1);
        assert!(log.has_code(DiagCode::AssertionFailed));
    }
}
