//! Recursive-descent parser producing the arena AST.
//!
//! The parser only shapes the tree: every expression leaves here with type
//! `void` and unresolved identifiers; the pipeline passes fill in the rest.
//! On a syntax error it reports once and bails, matching the driver contract
//! that analysis only runs on a fully parsed tree.

use crate::ast::{Arena, BinOp, ExprKind, Ident, NodeId, NodeKind, StmtKind, UnOp};
use crate::diag::{DiagCode, Logger};
use crate::lexer::{Tok, Token};
use crate::span::Span;
use crate::types::ScriptType;
use crate::value::Value;

pub fn parse(tokens: Vec<Tok>, arena: &mut Arena, logger: &mut Logger) -> Option<NodeId> {
    let mut parser = Parser {
        toks: tokens,
        pos: 0,
        arena,
        logger,
    };
    parser.script().ok()
}

/// Diagnostic already logged; unwind to the entry point.
type PResult<T> = Result<T, ()>;

struct Parser<'a> {
    toks: Vec<Tok>,
    pos: usize,
    arena: &'a mut Arena,
    logger: &'a mut Logger,
}

impl<'a> Parser<'a> {
    // ── token plumbing ──────────────────────────────────────────────────

    fn peek(&self) -> Option<&Token> {
        self.toks.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, off: usize) -> Option<&Token> {
        self.toks.get(self.pos + off).map(|t| &t.kind)
    }

    fn span(&self) -> Span {
        self.toks
            .get(self.pos)
            .map(|t| t.span)
            .or_else(|| self.toks.last().map(|t| t.span))
            .unwrap_or_default()
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Token, what: &str) -> PResult<Span> {
        if self.peek() == Some(tok) {
            let span = self.span();
            self.pos += 1;
            Ok(span)
        } else {
            self.error_here(format!("expected {what}"));
            Err(())
        }
    }

    fn error_here(&mut self, message: String) {
        let span = self.span();
        self.logger.error(DiagCode::SyntaxError, span, message);
    }

    fn type_token(&self) -> Option<ScriptType> {
        match self.peek()? {
            Token::IntegerTy => Some(ScriptType::Integer),
            Token::FloatTy => Some(ScriptType::Float),
            Token::StringTy => Some(ScriptType::Str),
            Token::KeyTy => Some(ScriptType::Key),
            Token::VectorTy => Some(ScriptType::Vector),
            Token::RotationTy => Some(ScriptType::Rotation),
            Token::ListTy => Some(ScriptType::List),
            _ => None,
        }
    }

    fn ident(&mut self, what: &str) -> PResult<NodeId> {
        let span = self.span();
        match self.bump().map(|t| t.kind) {
            Some(Token::Ident(name)) => Ok(self
                .arena
                .new_node(NodeKind::Identifier(Ident::new(name)), span)),
            _ => {
                self.logger
                    .error(DiagCode::SyntaxError, span, format!("expected {what}"));
                Err(())
            }
        }
    }

    // ── script structure ────────────────────────────────────────────────

    fn script(&mut self) -> PResult<NodeId> {
        let root = self.arena.new_node(NodeKind::Script, Span::at(1, 1));
        let mut saw_state = false;
        while self.peek().is_some() {
            let item = if self.peek() == Some(&Token::Default) {
                saw_state = true;
                self.state(true)?
            } else if self.peek() == Some(&Token::State) {
                saw_state = true;
                self.state(false)?
            } else if saw_state {
                self.error_here("expected a state after the first state definition".into());
                return Err(());
            } else {
                self.global()?
            };
            self.arena.push_child(root, item);
        }
        if !saw_state {
            self.logger.error(
                DiagCode::SyntaxError,
                self.span(),
                "script must define a default state",
            );
            return Err(());
        }
        Ok(root)
    }

    /// A global variable or function, with or without a return type.
    fn global(&mut self) -> PResult<NodeId> {
        let start = self.span();
        let declared = self.type_token();
        if declared.is_some() {
            self.bump();
        }
        let ident = self.ident("a global name")?;
        if let Some(ty) = declared {
            self.arena.get_mut(ident).ty = ty;
        }

        if self.peek() == Some(&Token::LParen) {
            // function; a missing return type means void
            let params = self.param_list()?;
            let body = self.compound()?;
            return Ok(self
                .arena
                .node(NodeKind::GlobalFunction, start, vec![ident, params, body]));
        }

        let init = if self.eat(&Token::Assign) {
            self.expression()?
        } else {
            self.arena.null_node()
        };
        self.expect(&Token::Semicolon, "`;` after global variable")?;
        if declared.is_none() {
            self.error_here("global variables need a type".into());
            return Err(());
        }
        Ok(self
            .arena
            .node(NodeKind::GlobalVariable, start, vec![ident, init]))
    }

    fn param_list(&mut self) -> PResult<NodeId> {
        let start = self.expect(&Token::LParen, "`(`")?;
        let list = self.arena.new_node(NodeKind::ParamList, start);
        if !self.eat(&Token::RParen) {
            loop {
                let ty = match self.type_token() {
                    Some(t) => {
                        self.bump();
                        t
                    }
                    None => {
                        self.error_here("expected a parameter type".into());
                        return Err(());
                    }
                };
                let ident = self.ident("a parameter name")?;
                self.arena.get_mut(ident).ty = ty;
                self.arena.push_child(list, ident);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen, "`)` after parameters")?;
        }
        Ok(list)
    }

    fn state(&mut self, is_default: bool) -> PResult<NodeId> {
        let start = self.span();
        self.bump(); // `default` or `state`
        let ident = if is_default {
            self.arena
                .new_node(NodeKind::Identifier(Ident::new("default")), start)
        } else {
            self.ident("a state name")?
        };
        self.expect(&Token::LBrace, "`{` to open the state")?;
        let node = self
            .arena
            .node(NodeKind::State { is_default }, start, vec![ident]);
        while !self.eat(&Token::RBrace) {
            if self.peek().is_none() {
                self.error_here("unterminated state body".into());
                return Err(());
            }
            let handler = self.event_handler()?;
            self.arena.push_child(node, handler);
        }
        Ok(node)
    }

    fn event_handler(&mut self) -> PResult<NodeId> {
        let start = self.span();
        let ident = self.ident("an event name")?;
        let params = self.param_list()?;
        let body = self.compound()?;
        Ok(self
            .arena
            .node(NodeKind::EventHandler, start, vec![ident, params, body]))
    }

    // ── statements ──────────────────────────────────────────────────────

    fn compound(&mut self) -> PResult<NodeId> {
        let start = self.expect(&Token::LBrace, "`{`")?;
        let node = self.arena.new_node(NodeKind::Stmt(StmtKind::Compound), start);
        while !self.eat(&Token::RBrace) {
            if self.peek().is_none() {
                self.error_here("unterminated compound statement".into());
                return Err(());
            }
            let stmt = self.statement()?;
            self.arena.push_child(node, stmt);
        }
        Ok(node)
    }

    /// A single statement used as the body of a conditional or loop; a
    /// declaration there has no scope to live in, which the resolution pass
    /// reports.
    fn controlled_statement(&mut self) -> PResult<NodeId> {
        let stmt = self.statement()?;
        if !matches!(
            self.arena.get(stmt).kind,
            NodeKind::Stmt(StmtKind::Compound)
        ) {
            self.arena.get_mut(stmt).declaration_allowed = false;
        }
        Ok(stmt)
    }

    fn statement(&mut self) -> PResult<NodeId> {
        let start = self.span();
        match self.peek() {
            Some(Token::LBrace) => self.compound(),
            Some(Token::Semicolon) => {
                self.bump();
                Ok(self.arena.new_node(NodeKind::Stmt(StmtKind::Nop), start))
            }
            Some(Token::At) => {
                self.bump();
                let ident = self.ident("a label name")?;
                self.expect(&Token::Semicolon, "`;` after label")?;
                Ok(self
                    .arena
                    .node(NodeKind::Stmt(StmtKind::Label), start, vec![ident]))
            }
            Some(Token::Jump) => {
                self.bump();
                let ident = self.ident("a label name")?;
                self.expect(&Token::Semicolon, "`;` after jump")?;
                Ok(self
                    .arena
                    .node(NodeKind::Stmt(StmtKind::Jump), start, vec![ident]))
            }
            Some(Token::State) => {
                self.bump();
                let ident = if self.peek() == Some(&Token::Default) {
                    let span = self.span();
                    self.bump();
                    self.arena
                        .new_node(NodeKind::Identifier(Ident::new("default")), span)
                } else {
                    self.ident("a state name")?
                };
                self.expect(&Token::Semicolon, "`;` after state change")?;
                Ok(self
                    .arena
                    .node(NodeKind::Stmt(StmtKind::StateChange), start, vec![ident]))
            }
            Some(Token::Return) => {
                self.bump();
                let value = if self.peek() == Some(&Token::Semicolon) {
                    self.arena.null_node()
                } else {
                    self.expression()?
                };
                self.expect(&Token::Semicolon, "`;` after return")?;
                Ok(self
                    .arena
                    .node(NodeKind::Stmt(StmtKind::Return), start, vec![value]))
            }
            Some(Token::If) => {
                self.bump();
                self.expect(&Token::LParen, "`(` after if")?;
                let cond = self.expression()?;
                self.expect(&Token::RParen, "`)` after condition")?;
                let then = self.controlled_statement()?;
                let els = if self.eat(&Token::Else) {
                    self.controlled_statement()?
                } else {
                    self.arena.null_node()
                };
                Ok(self
                    .arena
                    .node(NodeKind::Stmt(StmtKind::If), start, vec![cond, then, els]))
            }
            Some(Token::While) => {
                self.bump();
                self.expect(&Token::LParen, "`(` after while")?;
                let cond = self.expression()?;
                self.expect(&Token::RParen, "`)` after condition")?;
                let body = self.controlled_statement()?;
                Ok(self
                    .arena
                    .node(NodeKind::Stmt(StmtKind::While), start, vec![cond, body]))
            }
            Some(Token::Do) => {
                self.bump();
                let body = self.controlled_statement()?;
                self.expect(&Token::While, "`while` after do body")?;
                self.expect(&Token::LParen, "`(`")?;
                let cond = self.expression()?;
                self.expect(&Token::RParen, "`)`")?;
                self.expect(&Token::Semicolon, "`;` after do-while")?;
                Ok(self
                    .arena
                    .node(NodeKind::Stmt(StmtKind::DoWhile), start, vec![body, cond]))
            }
            Some(Token::For) => {
                self.bump();
                self.expect(&Token::LParen, "`(` after for")?;
                let init = self.expr_list(&Token::Semicolon)?;
                self.expect(&Token::Semicolon, "`;` in for header")?;
                let cond = if self.peek() == Some(&Token::Semicolon) {
                    self.arena.null_node()
                } else {
                    self.expression()?
                };
                self.expect(&Token::Semicolon, "`;` in for header")?;
                let update = self.expr_list(&Token::RParen)?;
                self.expect(&Token::RParen, "`)` after for header")?;
                let body = self.controlled_statement()?;
                Ok(self.arena.node(
                    NodeKind::Stmt(StmtKind::For),
                    start,
                    vec![init, cond, update, body],
                ))
            }
            _ => {
                if let Some(ty) = self.type_token() {
                    self.bump();
                    let ident = self.ident("a variable name")?;
                    self.arena.get_mut(ident).ty = ty;
                    let init = if self.eat(&Token::Assign) {
                        self.expression()?
                    } else {
                        self.arena.null_node()
                    };
                    self.expect(&Token::Semicolon, "`;` after declaration")?;
                    return Ok(self
                        .arena
                        .node(NodeKind::Stmt(StmtKind::Decl), start, vec![ident, init]));
                }
                let expr = self.expression()?;
                self.expect(&Token::Semicolon, "`;` after expression")?;
                Ok(self
                    .arena
                    .node(NodeKind::Stmt(StmtKind::Expr), start, vec![expr]))
            }
        }
    }

    /// Comma-separated expressions inside a `for` header; `stop` marks an
    /// allowed empty list.
    fn expr_list(&mut self, stop: &Token) -> PResult<NodeId> {
        let start = self.span();
        let node = self.arena.new_node(NodeKind::ExprList, start);
        if self.peek() == Some(stop) {
            return Ok(node);
        }
        loop {
            let e = self.expression()?;
            self.arena.push_child(node, e);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(node)
    }

    // ── expressions ─────────────────────────────────────────────────────

    fn expression(&mut self) -> PResult<NodeId> {
        self.assignment()
    }

    fn assignment(&mut self) -> PResult<NodeId> {
        let lhs = self.logical_or()?;
        let op = match self.peek() {
            Some(Token::Assign) => BinOp::Assign,
            Some(Token::PlusAssign) => BinOp::AddAssign,
            Some(Token::MinusAssign) => BinOp::SubAssign,
            Some(Token::StarAssign) => BinOp::MulAssign,
            Some(Token::SlashAssign) => BinOp::DivAssign,
            Some(Token::PercentAssign) => BinOp::ModAssign,
            _ => return Ok(lhs),
        };
        let span = self.span();
        self.bump();
        if !matches!(self.arena.get(lhs).kind, NodeKind::Expr(ExprKind::LValue)) {
            self.logger.error(
                DiagCode::SyntaxError,
                span,
                "left side of an assignment must be a variable",
            );
            return Err(());
        }
        let rhs = self.assignment()?;
        let loc = self.arena.get(lhs).loc.merge(self.arena.get(rhs).loc);
        Ok(self
            .arena
            .node(NodeKind::Expr(ExprKind::Binary(op)), loc, vec![lhs, rhs]))
    }

    fn binary_tier(
        &mut self,
        next: fn(&mut Self) -> PResult<NodeId>,
        ops: &[(Token, BinOp)],
    ) -> PResult<NodeId> {
        let mut lhs = next(self)?;
        loop {
            let Some(current) = self.peek() else { break };
            let Some(&(_, op)) = ops.iter().find(|(t, _)| t == current) else {
                break;
            };
            self.bump();
            let rhs = next(self)?;
            let loc = self.arena.get(lhs).loc.merge(self.arena.get(rhs).loc);
            lhs = self
                .arena
                .node(NodeKind::Expr(ExprKind::Binary(op)), loc, vec![lhs, rhs]);
        }
        Ok(lhs)
    }

    fn logical_or(&mut self) -> PResult<NodeId> {
        self.binary_tier(Self::logical_and, &[(Token::OrOr, BinOp::Or)])
    }

    fn logical_and(&mut self) -> PResult<NodeId> {
        self.binary_tier(Self::bit_or, &[(Token::AndAnd, BinOp::And)])
    }

    fn bit_or(&mut self) -> PResult<NodeId> {
        self.binary_tier(Self::bit_xor, &[(Token::Pipe, BinOp::BitOr)])
    }

    fn bit_xor(&mut self) -> PResult<NodeId> {
        self.binary_tier(Self::bit_and, &[(Token::Caret, BinOp::BitXor)])
    }

    fn bit_and(&mut self) -> PResult<NodeId> {
        self.binary_tier(Self::equality, &[(Token::Amp, BinOp::BitAnd)])
    }

    fn equality(&mut self) -> PResult<NodeId> {
        self.binary_tier(
            Self::relational,
            &[(Token::EqEq, BinOp::Eq), (Token::NotEq, BinOp::Neq)],
        )
    }

    fn relational(&mut self) -> PResult<NodeId> {
        self.binary_tier(
            Self::shift,
            &[
                (Token::Lt, BinOp::Lt),
                (Token::LtEq, BinOp::Leq),
                (Token::Gt, BinOp::Gt),
                (Token::GtEq, BinOp::Geq),
            ],
        )
    }

    fn shift(&mut self) -> PResult<NodeId> {
        self.binary_tier(
            Self::additive,
            &[(Token::Shl, BinOp::Shl), (Token::Shr, BinOp::Shr)],
        )
    }

    fn additive(&mut self) -> PResult<NodeId> {
        self.binary_tier(
            Self::multiplicative,
            &[(Token::Plus, BinOp::Add), (Token::Minus, BinOp::Sub)],
        )
    }

    fn multiplicative(&mut self) -> PResult<NodeId> {
        self.binary_tier(
            Self::unary,
            &[
                (Token::Star, BinOp::Mul),
                (Token::Slash, BinOp::Div),
                (Token::Percent, BinOp::Mod),
            ],
        )
    }

    fn unary(&mut self) -> PResult<NodeId> {
        let start = self.span();
        let op = match self.peek() {
            Some(Token::Minus) => Some(UnOp::Neg),
            Some(Token::Bang) => Some(UnOp::Not),
            Some(Token::Tilde) => Some(UnOp::BitNot),
            Some(Token::Incr) => Some(UnOp::PreIncr),
            Some(Token::Decr) => Some(UnOp::PreDecr),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.unary()?;
            return Ok(self.arena.node(
                NodeKind::Expr(ExprKind::Unary(op)),
                start,
                vec![operand],
            ));
        }

        // a cast: `(` type `)` unary
        if self.peek() == Some(&Token::LParen) {
            if let Some(target) = self.type_token_at(1) {
                if self.peek_at(2) == Some(&Token::RParen) {
                    self.bump();
                    self.bump();
                    self.bump();
                    let operand = self.unary()?;
                    return Ok(self.arena.node(
                        NodeKind::Expr(ExprKind::Typecast(target)),
                        start,
                        vec![operand],
                    ));
                }
            }
        }

        self.postfix()
    }

    fn type_token_at(&self, off: usize) -> Option<ScriptType> {
        match self.peek_at(off)? {
            Token::IntegerTy => Some(ScriptType::Integer),
            Token::FloatTy => Some(ScriptType::Float),
            Token::StringTy => Some(ScriptType::Str),
            Token::KeyTy => Some(ScriptType::Key),
            Token::VectorTy => Some(ScriptType::Vector),
            Token::RotationTy => Some(ScriptType::Rotation),
            Token::ListTy => Some(ScriptType::List),
            _ => None,
        }
    }

    fn postfix(&mut self) -> PResult<NodeId> {
        let mut expr = self.primary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Incr) => UnOp::PostIncr,
                Some(Token::Decr) => UnOp::PostDecr,
                _ => break,
            };
            let span = self.span();
            self.bump();
            expr = self
                .arena
                .node(NodeKind::Expr(ExprKind::Unary(op)), span, vec![expr]);
        }
        Ok(expr)
    }

    fn primary(&mut self) -> PResult<NodeId> {
        let start = self.span();
        match self.peek().cloned() {
            Some(Token::IntLit(v)) => {
                self.bump();
                Ok(self.constant(Value::Integer(v), start))
            }
            Some(Token::FloatLit(v)) => {
                self.bump();
                Ok(self.constant(Value::Float(v), start))
            }
            Some(Token::StrLit(s)) => {
                self.bump();
                Ok(self.constant(Value::Str(s), start))
            }
            Some(Token::LParen) => {
                self.bump();
                let inner = self.expression()?;
                self.expect(&Token::RParen, "`)`")?;
                Ok(self
                    .arena
                    .node(NodeKind::Expr(ExprKind::Paren), start, vec![inner]))
            }
            Some(Token::LBracket) => {
                self.bump();
                let node = self.arena.new_node(NodeKind::Expr(ExprKind::ListLit), start);
                if !self.eat(&Token::RBracket) {
                    loop {
                        let e = self.expression()?;
                        self.arena.push_child(node, e);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(&Token::RBracket, "`]` to close the list")?;
                }
                Ok(node)
            }
            Some(Token::Lt) => self.angle_literal(start),
            Some(Token::Ident(name)) => {
                self.bump();
                let ident = self
                    .arena
                    .new_node(NodeKind::Identifier(Ident::new(name)), start);
                if self.peek() == Some(&Token::LParen) {
                    self.bump();
                    let call = self
                        .arena
                        .node(NodeKind::Expr(ExprKind::Call), start, vec![ident]);
                    if !self.eat(&Token::RParen) {
                        loop {
                            let arg = self.expression()?;
                            self.arena.push_child(call, arg);
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                        }
                        self.expect(&Token::RParen, "`)` after arguments")?;
                    }
                    return Ok(call);
                }
                let member = if self.eat(&Token::Dot) {
                    self.ident("a member name")?
                } else {
                    self.arena.null_node()
                };
                Ok(self
                    .arena
                    .node(NodeKind::Expr(ExprKind::LValue), start, vec![ident, member]))
            }
            _ => {
                self.error_here("expected an expression".into());
                Err(())
            }
        }
    }

    fn constant(&mut self, value: Value, span: Span) -> NodeId {
        let id = self
            .arena
            .new_node(NodeKind::Expr(ExprKind::Constant), span);
        self.arena.set_constant(id, Some(value));
        id
    }

    /// `<a, b, c>` or `<a, b, c, d>`. Components parse at additive
    /// precedence so the closing `>` is never eaten as a comparison;
    /// parenthesize to compare inside a component.
    fn angle_literal(&mut self, start: Span) -> PResult<NodeId> {
        self.expect(&Token::Lt, "`<`")?;
        let mut comps = vec![self.additive()?];
        while self.eat(&Token::Comma) {
            comps.push(self.additive()?);
            if comps.len() > 4 {
                self.error_here("too many components in a vector or rotation literal".into());
                return Err(());
            }
        }
        self.close_angle()?;
        match comps.len() {
            3 => Ok(self
                .arena
                .node(NodeKind::Expr(ExprKind::VectorLit), start, comps)),
            4 => Ok(self
                .arena
                .node(NodeKind::Expr(ExprKind::RotationLit), start, comps)),
            _ => {
                self.error_here(
                    "vector literals take 3 components, rotations take 4".into(),
                );
                Err(())
            }
        }
    }

    /// Consume a closing `>`, splitting a `>>` token when the literal is
    /// immediately followed by another `>`.
    fn close_angle(&mut self) -> PResult<()> {
        match self.peek() {
            Some(Token::Gt) => {
                self.bump();
                Ok(())
            }
            Some(Token::Shr) => {
                let span = self.toks[self.pos].span;
                self.toks[self.pos] = Tok {
                    kind: Token::Gt,
                    span,
                };
                Ok(())
            }
            _ => {
                self.error_here("expected `>` to close the literal".into());
                Err(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_ok(src: &str) -> (Arena, NodeId) {
        let mut arena = Arena::new();
        let mut logger = Logger::new();
        let toks = lex(src, &mut logger);
        let root = parse(toks.tokens, &mut arena, &mut logger);
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        (arena, root.expect("parse should succeed"))
    }

    fn parse_err(src: &str) -> Logger {
        let mut arena = Arena::new();
        let mut logger = Logger::new();
        let toks = lex(src, &mut logger);
        let root = parse(toks.tokens, &mut arena, &mut logger);
        assert!(root.is_none() || logger.errors() > 0, "expected a parse error");
        logger
    }

    #[test]
    fn minimal_script() {
        let (arena, root) = parse_ok("default { state_entry() { } }");
        assert_eq!(arena.child_count(root), 1);
        let state = arena.child(root, 0);
        assert!(matches!(
            arena.get(state).kind,
            NodeKind::State { is_default: true }
        ));
        assert!(arena.verify_links(root));
    }

    #[test]
    fn globals_functions_and_states() {
        let (arena, root) = parse_ok(
            "integer count = 3;\n\
             float half(float x) { return x / 2.0; }\n\
             default { touch_start(integer n) { count = n; } }\n\
             state idle { state_entry() { } }",
        );
        assert_eq!(arena.child_count(root), 4);
        assert!(matches!(
            arena.get(arena.child(root, 0)).kind,
            NodeKind::GlobalVariable
        ));
        assert!(matches!(
            arena.get(arena.child(root, 1)).kind,
            NodeKind::GlobalFunction
        ));
        // the function identifier carries the declared return type
        let f = arena.child(root, 1);
        assert_eq!(arena.get(arena.child(f, 0)).ty, ScriptType::Float);
    }

    #[test]
    fn vector_vs_comparison() {
        let (arena, root) = parse_ok(
            "default { state_entry() { vector v = <1, 2, 3>; integer b = 1 < 2; } }",
        );
        let body = arena.child(arena.child(arena.child(root, 0), 0), 2);
        let decl_v = arena.child(body, 0);
        let init_v = arena.child(decl_v, 1);
        assert!(matches!(
            arena.get(init_v).kind,
            NodeKind::Expr(ExprKind::VectorLit)
        ));
        let decl_b = arena.child(body, 1);
        let init_b = arena.child(decl_b, 1);
        assert!(matches!(
            arena.get(init_b).kind,
            NodeKind::Expr(ExprKind::Binary(BinOp::Lt))
        ));
    }

    #[test]
    fn rotation_literal_has_four_components() {
        let (arena, root) =
            parse_ok("default { state_entry() { rotation r = <0, 0, 0, 1>; } }");
        let body = arena.child(arena.child(arena.child(root, 0), 0), 2);
        let init = arena.child(arena.child(body, 0), 1);
        assert!(matches!(
            arena.get(init).kind,
            NodeKind::Expr(ExprKind::RotationLit)
        ));
        assert_eq!(arena.child_count(init), 4);
    }

    #[test]
    fn precedence_builds_expected_shape() {
        let (arena, root) = parse_ok("default { state_entry() { integer x = 1 + 2 * 3; } }");
        let body = arena.child(arena.child(arena.child(root, 0), 0), 2);
        let init = arena.child(arena.child(body, 0), 1);
        // `+` at the top, `*` underneath
        assert!(matches!(
            arena.get(init).kind,
            NodeKind::Expr(ExprKind::Binary(BinOp::Add))
        ));
        let rhs = arena.child(init, 1);
        assert!(matches!(
            arena.get(rhs).kind,
            NodeKind::Expr(ExprKind::Binary(BinOp::Mul))
        ));
    }

    #[test]
    fn cast_and_member_access() {
        let (arena, root) = parse_ok(
            "vector v = <1,2,3>;\ndefault { state_entry() { float x = (float)1 + v.x; } }",
        );
        let body = arena.child(arena.child(arena.child(root, 1), 0), 2);
        let init = arena.child(arena.child(body, 0), 1);
        let cast = arena.child(init, 0);
        assert!(matches!(
            arena.get(cast).kind,
            NodeKind::Expr(ExprKind::Typecast(ScriptType::Float))
        ));
        let member = arena.child(init, 1);
        assert!(matches!(
            arena.get(member).kind,
            NodeKind::Expr(ExprKind::LValue)
        ));
        let member_ident = arena.child(member, 1);
        assert_eq!(arena.get(member_ident).ident().unwrap().name, "x");
    }

    #[test]
    fn single_statement_bodies_forbid_declarations() {
        let (arena, root) = parse_ok(
            "default { state_entry() { if (1) sleep(0.1); else { integer ok; } } }",
        );
        let body = arena.child(arena.child(arena.child(root, 0), 0), 2);
        let if_stmt = arena.child(body, 0);
        let then = arena.child(if_stmt, 1);
        assert!(!arena.get(then).declaration_allowed);
        let els = arena.child(if_stmt, 2);
        assert!(arena.get(els).declaration_allowed, "compounds open a scope");
    }

    #[test]
    fn for_loop_shape() {
        let (arena, root) = parse_ok(
            "default { state_entry() { integer i; for (i = 0; i < 3; i++) sleep(0.1); } }",
        );
        let body = arena.child(arena.child(arena.child(root, 0), 0), 2);
        let for_stmt = arena.child(body, 1);
        assert!(matches!(
            arena.get(for_stmt).kind,
            NodeKind::Stmt(StmtKind::For)
        ));
        assert_eq!(arena.child_count(for_stmt), 4);
        assert!(matches!(
            arena.get(arena.child(for_stmt, 0)).kind,
            NodeKind::ExprList
        ));
    }

    #[test]
    fn labels_and_jumps() {
        let (arena, root) = parse_ok(
            "default { state_entry() { jump skip; sleep(1.0); @skip; } }",
        );
        let body = arena.child(arena.child(arena.child(root, 0), 0), 2);
        assert!(matches!(
            arena.get(arena.child(body, 0)).kind,
            NodeKind::Stmt(StmtKind::Jump)
        ));
        assert!(matches!(
            arena.get(arena.child(body, 2)).kind,
            NodeKind::Stmt(StmtKind::Label)
        ));
    }

    #[test]
    fn assignment_needs_lvalue() {
        let logger = parse_err("default { state_entry() { 1 = 2; } }");
        assert!(logger.has_code(DiagCode::SyntaxError));
    }

    #[test]
    fn missing_default_state_is_an_error() {
        let logger = parse_err("integer x;");
        assert!(logger.has_code(DiagCode::SyntaxError));
    }

    #[test]
    fn compound_assignment_parses() {
        let (arena, root) = parse_ok(
            "default { state_entry() { integer a; a += 1; } }",
        );
        let body = arena.child(arena.child(arena.child(root, 0), 0), 2);
        let stmt = arena.child(body, 1);
        let expr = arena.child(stmt, 0);
        assert!(matches!(
            arena.get(expr).kind,
            NodeKind::Expr(ExprKind::Binary(BinOp::AddAssign))
        ));
    }
}
