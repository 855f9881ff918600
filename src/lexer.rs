//! Hand-rolled scanner producing the token stream the parser consumes.
//!
//! Comments are skipped, except `// ASSERT:` comments which are collected
//! for the diagnostic-assertion filter.

use crate::diag::{Assertion, DiagCode, Logger};
use crate::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // literals
    IntLit(i32),
    FloatLit(f32),
    StrLit(String),

    Ident(String),

    // type keywords
    IntegerTy,
    FloatTy,
    StringTy,
    KeyTy,
    VectorTy,
    RotationTy,
    ListTy,

    // keywords
    Default,
    State,
    If,
    Else,
    For,
    Do,
    While,
    Return,
    Jump,

    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    At,
    Dot,

    // operators
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Tilde,
    Incr,
    Decr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tok {
    pub kind: Token,
    pub span: Span,
}

#[derive(Debug, Default)]
pub struct LexOutput {
    pub tokens: Vec<Tok>,
    pub assertions: Vec<Assertion>,
}

pub fn lex(source: &str, logger: &mut Logger) -> LexOutput {
    Lexer::new(source).run(logger)
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn run(mut self, logger: &mut Logger) -> LexOutput {
        let mut out = LexOutput::default();
        while let Some(c) = self.peek() {
            let (line, col) = (self.line, self.col);
            match c {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b'/' if self.peek_at(1) == Some(b'/') => {
                    let comment = self.line_comment();
                    if let Some(a) = parse_assert_comment(&comment, line, col) {
                        out.assertions.push(a);
                    }
                }
                b'/' if self.peek_at(1) == Some(b'*') => {
                    self.block_comment(logger);
                }
                b'"' => {
                    if let Some(tok) = self.string(logger) {
                        out.tokens.push(tok);
                    }
                }
                b'0'..=b'9' => out.tokens.push(self.number()),
                b'.' if matches!(self.peek_at(1), Some(b'0'..=b'9')) => {
                    out.tokens.push(self.number())
                }
                c if c.is_ascii_alphabetic() || c == b'_' => out.tokens.push(self.word()),
                _ => match self.operator() {
                    Some(tok) => out.tokens.push(tok),
                    None => {
                        logger.error(
                            DiagCode::SyntaxError,
                            Span::at(line, col),
                            format!("unexpected character `{}`", c as char),
                        );
                        self.bump();
                    }
                },
            }
        }
        out
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<u8> {
        self.src.get(self.pos + off).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn span_from(&self, line: u32, col: u32) -> Span {
        Span::new(line, col, self.line, self.col.saturating_sub(1).max(1))
    }

    fn line_comment(&mut self) -> String {
        let start = self.pos + 2;
        while let Some(c) = self.peek() {
            if c == b'\n' {
                break;
            }
            self.bump();
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn block_comment(&mut self, logger: &mut Logger) {
        let (line, col) = (self.line, self.col);
        self.bump();
        self.bump();
        loop {
            match self.peek() {
                None => {
                    logger.error(
                        DiagCode::SyntaxError,
                        Span::at(line, col),
                        "unterminated block comment",
                    );
                    return;
                }
                Some(b'*') if self.peek_at(1) == Some(b'/') => {
                    self.bump();
                    self.bump();
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn string(&mut self, logger: &mut Logger) -> Option<Tok> {
        let (line, col) = (self.line, self.col);
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some(b'\n') => {
                    logger.error(
                        DiagCode::SyntaxError,
                        Span::at(line, col),
                        "unterminated string literal",
                    );
                    return None;
                }
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'n') => value.push('\n'),
                    Some(b't') => value.push('\t'),
                    Some(b'"') => value.push('"'),
                    Some(b'\\') => value.push('\\'),
                    Some(other) => value.push(other as char),
                    None => {}
                },
                Some(c) => value.push(c as char),
            }
        }
        Some(Tok {
            kind: Token::StrLit(value),
            span: self.span_from(line, col),
        })
    }

    fn number(&mut self) -> Tok {
        let (line, col) = (self.line, self.col);
        let start = self.pos;

        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.bump();
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.bump();
            }
            let text = &self.src[start + 2..self.pos];
            let mut acc: u32 = 0;
            for &c in text {
                acc = acc
                    .wrapping_mul(16)
                    .wrapping_add((c as char).to_digit(16).unwrap_or(0));
            }
            return Tok {
                kind: Token::IntLit(acc as i32),
                span: self.span_from(line, col),
            };
        }

        let mut is_float = false;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.bump();
        }
        if self.peek() == Some(b'.') && !matches!(self.peek_at(1), Some(b'.')) {
            is_float = true;
            self.bump();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let mut off = 1;
            if matches!(self.peek_at(1), Some(b'+') | Some(b'-')) {
                off = 2;
            }
            if matches!(self.peek_at(off), Some(b'0'..=b'9')) {
                is_float = true;
                for _ in 0..off {
                    self.bump();
                }
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.bump();
                }
            }
        }

        let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        let kind = if is_float {
            Token::FloatLit(text.parse::<f32>().unwrap_or(0.0))
        } else {
            // decimal literals wrap like the legacy compiler's strtoul
            let mut acc: u32 = 0;
            for c in text.bytes() {
                acc = acc.wrapping_mul(10).wrapping_add(u32::from(c - b'0'));
            }
            Token::IntLit(acc as i32)
        };
        Tok {
            kind,
            span: self.span_from(line, col),
        }
    }

    fn word(&mut self) -> Tok {
        let (line, col) = (self.line, self.col);
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.bump();
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        let kind = match text.as_str() {
            "integer" => Token::IntegerTy,
            "float" => Token::FloatTy,
            "string" => Token::StringTy,
            "key" => Token::KeyTy,
            "vector" => Token::VectorTy,
            "rotation" | "quaternion" => Token::RotationTy,
            "list" => Token::ListTy,
            "default" => Token::Default,
            "state" => Token::State,
            "if" => Token::If,
            "else" => Token::Else,
            "for" => Token::For,
            "do" => Token::Do,
            "while" => Token::While,
            "return" => Token::Return,
            "jump" => Token::Jump,
            _ => Token::Ident(text),
        };
        Tok {
            kind,
            span: self.span_from(line, col),
        }
    }

    fn operator(&mut self) -> Option<Tok> {
        let (line, col) = (self.line, self.col);
        let two = |a: u8, b: u8, this: &Self| this.peek() == Some(a) && this.peek_at(1) == Some(b);
        let kind = if two(b'+', b'=', self) {
            self.bump();
            self.bump();
            Token::PlusAssign
        } else if two(b'-', b'=', self) {
            self.bump();
            self.bump();
            Token::MinusAssign
        } else if two(b'*', b'=', self) {
            self.bump();
            self.bump();
            Token::StarAssign
        } else if two(b'/', b'=', self) {
            self.bump();
            self.bump();
            Token::SlashAssign
        } else if two(b'%', b'=', self) {
            self.bump();
            self.bump();
            Token::PercentAssign
        } else if two(b'=', b'=', self) {
            self.bump();
            self.bump();
            Token::EqEq
        } else if two(b'!', b'=', self) {
            self.bump();
            self.bump();
            Token::NotEq
        } else if two(b'<', b'=', self) {
            self.bump();
            self.bump();
            Token::LtEq
        } else if two(b'>', b'=', self) {
            self.bump();
            self.bump();
            Token::GtEq
        } else if two(b'&', b'&', self) {
            self.bump();
            self.bump();
            Token::AndAnd
        } else if two(b'|', b'|', self) {
            self.bump();
            self.bump();
            Token::OrOr
        } else if two(b'<', b'<', self) {
            self.bump();
            self.bump();
            Token::Shl
        } else if two(b'>', b'>', self) {
            self.bump();
            self.bump();
            Token::Shr
        } else if two(b'+', b'+', self) {
            self.bump();
            self.bump();
            Token::Incr
        } else if two(b'-', b'-', self) {
            self.bump();
            self.bump();
            Token::Decr
        } else {
            let single = match self.peek()? {
                b'(' => Token::LParen,
                b')' => Token::RParen,
                b'{' => Token::LBrace,
                b'}' => Token::RBrace,
                b'[' => Token::LBracket,
                b']' => Token::RBracket,
                b';' => Token::Semicolon,
                b',' => Token::Comma,
                b'@' => Token::At,
                b'.' => Token::Dot,
                b'=' => Token::Assign,
                b'<' => Token::Lt,
                b'>' => Token::Gt,
                b'&' => Token::Amp,
                b'|' => Token::Pipe,
                b'^' => Token::Caret,
                b'+' => Token::Plus,
                b'-' => Token::Minus,
                b'*' => Token::Star,
                b'/' => Token::Slash,
                b'%' => Token::Percent,
                b'!' => Token::Bang,
                b'~' => Token::Tilde,
                _ => return None,
            };
            self.bump();
            single
        };
        Some(Tok {
            kind,
            span: self.span_from(line, col),
        })
    }
}

/// `ASSERT: error E10006 at line 4` (inside a `//` comment).
fn parse_assert_comment(comment: &str, line: u32, col: u32) -> Option<Assertion> {
    let rest = comment.trim().strip_prefix("ASSERT:")?.trim();
    let rest = rest.strip_prefix("error")?.trim();
    let rest = rest.strip_prefix('E')?;
    let id_end = rest.find(|c: char| !c.is_ascii_digit())?;
    let id: u16 = rest[..id_end].parse().ok()?;
    let rest = rest[id_end..].trim().strip_prefix("at line")?.trim();
    let line_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let target: u32 = rest[..line_end].parse().ok()?;
    Some(Assertion {
        id,
        line: target,
        span: Span::at(line, col),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(src: &str) -> Vec<Token> {
        let mut logger = Logger::new();
        let out = lex(src, &mut logger);
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        out.tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_declaration() {
        let toks = lex_ok("integer x = 42;");
        assert_eq!(
            toks,
            vec![
                Token::IntegerTy,
                Token::Ident("x".into()),
                Token::Assign,
                Token::IntLit(42),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn scans_floats_and_hex() {
        let toks = lex_ok("1.5 .25 2e3 0x1F");
        assert_eq!(
            toks,
            vec![
                Token::FloatLit(1.5),
                Token::FloatLit(0.25),
                Token::FloatLit(2000.0),
                Token::IntLit(31),
            ]
        );
    }

    #[test]
    fn oversized_decimal_wraps() {
        let toks = lex_ok("4294967295");
        assert_eq!(toks, vec![Token::IntLit(-1)]);
    }

    #[test]
    fn string_escapes() {
        let toks = lex_ok(r#""a\nb\"c""#);
        assert_eq!(toks, vec![Token::StrLit("a\nb\"c".into())]);
    }

    #[test]
    fn compound_operators_win_over_singles() {
        let toks = lex_ok("a += b << 2 && !c");
        assert_eq!(
            toks,
            vec![
                Token::Ident("a".into()),
                Token::PlusAssign,
                Token::Ident("b".into()),
                Token::Shl,
                Token::IntLit(2),
                Token::AndAnd,
                Token::Bang,
                Token::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn comments_are_skipped_and_asserts_collected() {
        let mut logger = Logger::new();
        let out = lex(
            "integer x; // ASSERT: error E10006 at line 3\n/* block\n */ float y;",
            &mut logger,
        );
        assert_eq!(logger.errors(), 0);
        assert_eq!(out.assertions.len(), 1);
        assert_eq!(out.assertions[0].id, 10006);
        assert_eq!(out.assertions[0].line, 3);
        let has_float = out.tokens.iter().any(|t| t.kind == Token::FloatTy);
        assert!(has_float, "tokens after comments survive");
    }

    #[test]
    fn spans_track_lines() {
        let mut logger = Logger::new();
        let out = lex("a\n  b", &mut logger);
        assert_eq!(out.tokens[0].span.line, 1);
        assert_eq!(out.tokens[1].span.line, 2);
        assert_eq!(out.tokens[1].span.column, 3);
    }

    #[test]
    fn bad_character_is_reported_once() {
        let mut logger = Logger::new();
        let _ = lex("integer x $ y;", &mut logger);
        assert_eq!(logger.errors(), 1);
    }
}
