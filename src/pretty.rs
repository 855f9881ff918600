//! Pretty-printing the AST back to compilable source.
//!
//! The printer is precedence-aware so rewritten trees (whose children no
//! longer carry the parenthesis nodes the parser would have produced) still
//! print to source that parses back to the same shape. Mangled names are
//! used whenever a symbol carries one; numeric obfuscation prints integer
//! literals in hex.

use crate::ast::{Arena, BinOp, ExprKind, NodeId, NodeKind, StmtKind};
use crate::types::ScriptType;
use crate::value::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct PrettyOptions {
    pub obfuscate_numbers: bool,
    pub minify: bool,
}

pub fn print(arena: &Arena, root: NodeId, opts: &PrettyOptions) -> String {
    let mut p = Printer {
        arena,
        opts: *opts,
        out: String::new(),
        indent: 0,
    };
    p.script(root);
    p.out
}

struct Printer<'a> {
    arena: &'a Arena,
    opts: PrettyOptions,
    out: String,
    indent: usize,
}

fn binop_prec(op: BinOp) -> u8 {
    match op {
        BinOp::Assign
        | BinOp::AddAssign
        | BinOp::SubAssign
        | BinOp::MulAssign
        | BinOp::DivAssign
        | BinOp::ModAssign => 1,
        BinOp::Or => 2,
        BinOp::And => 3,
        BinOp::BitOr => 4,
        BinOp::BitXor => 5,
        BinOp::BitAnd => 6,
        BinOp::Eq | BinOp::Neq => 7,
        BinOp::Lt | BinOp::Leq | BinOp::Gt | BinOp::Geq => 8,
        BinOp::Shl | BinOp::Shr => 9,
        BinOp::Add | BinOp::Sub => 10,
        BinOp::Mul | BinOp::Div | BinOp::Mod => 11,
    }
}

impl<'a> Printer<'a> {
    fn newline(&mut self) {
        if self.opts.minify {
            if !self.out.ends_with(|c: char| matches!(c, ' ' | '{' | '}' | ';')) {
                self.out.push(' ');
            }
        } else {
            self.out.push('\n');
            for _ in 0..self.indent {
                self.out.push_str("    ");
            }
        }
    }

    fn name_of(&self, ident: NodeId) -> String {
        let node = self.arena.get(ident);
        if let Some(i) = node.ident() {
            if let Some(sid) = i.symbol {
                if let Some(m) = &self.arena.symbol(sid).mangled {
                    return m.clone();
                }
            }
            return i.name.clone();
        }
        String::new()
    }

    fn script(&mut self, root: NodeId) {
        let mut first = true;
        for i in 0..self.arena.child_count(root) {
            let child = self.arena.child(root, i);
            if !first {
                self.newline();
            }
            first = false;
            match self.arena.get(child).kind.clone() {
                NodeKind::GlobalVariable => self.global_variable(child),
                NodeKind::GlobalFunction => self.function(child),
                NodeKind::State { .. } => self.state(child),
                _ => {}
            }
        }
        if !self.opts.minify {
            self.out.push('\n');
        }
    }

    fn global_variable(&mut self, id: NodeId) {
        let ident = self.arena.child(id, 0);
        let ty = self.arena.get(ident).ty;
        self.out.push_str(ty.name());
        self.out.push(' ');
        self.out.push_str(&self.name_of(ident));
        let init = self.arena.child(id, 1);
        if !matches!(self.arena.get(init).kind, NodeKind::Null) {
            self.out.push_str(" = ");
            self.expr(init);
        }
        self.out.push(';');
    }

    fn function(&mut self, id: NodeId) {
        let ident = self.arena.child(id, 0);
        let ret = self.arena.get(ident).ty;
        if ret != ScriptType::Null {
            self.out.push_str(ret.name());
            self.out.push(' ');
        }
        self.out.push_str(&self.name_of(ident));
        self.param_list(self.arena.child(id, 1));
        self.out.push(' ');
        self.statement(self.arena.child(id, 2));
    }

    fn param_list(&mut self, id: NodeId) {
        self.out.push('(');
        for i in 0..self.arena.child_count(id) {
            if i > 0 {
                self.out.push_str(", ");
            }
            let p = self.arena.child(id, i);
            self.out.push_str(self.arena.get(p).ty.name());
            self.out.push(' ');
            self.out.push_str(&self.name_of(p));
        }
        self.out.push(')');
    }

    fn state(&mut self, id: NodeId) {
        if matches!(self.arena.get(id).kind, NodeKind::State { is_default: true }) {
            self.out.push_str("default");
        } else {
            self.out.push_str("state ");
            self.out.push_str(&self.name_of(self.arena.child(id, 0)));
        }
        self.out.push_str(" {");
        self.indent += 1;
        for i in 1..self.arena.child_count(id) {
            self.newline();
            let handler = self.arena.child(id, i);
            self.out.push_str(&self.name_of(self.arena.child(handler, 0)));
            self.param_list(self.arena.child(handler, 1));
            self.out.push(' ');
            self.statement(self.arena.child(handler, 2));
        }
        self.indent -= 1;
        self.newline();
        self.out.push('}');
    }

    fn statement(&mut self, id: NodeId) {
        match self.arena.get(id).kind.clone() {
            NodeKind::Stmt(StmtKind::Compound) => {
                self.out.push('{');
                self.indent += 1;
                for i in 0..self.arena.child_count(id) {
                    self.newline();
                    self.statement(self.arena.child(id, i));
                }
                self.indent -= 1;
                self.newline();
                self.out.push('}');
            }
            NodeKind::Stmt(StmtKind::Nop) => self.out.push(';'),
            NodeKind::Stmt(StmtKind::Expr) => {
                self.expr(self.arena.child(id, 0));
                self.out.push(';');
            }
            NodeKind::Stmt(StmtKind::Return) => {
                self.out.push_str("return");
                let value = self.arena.child(id, 0);
                if !matches!(self.arena.get(value).kind, NodeKind::Null) {
                    self.out.push(' ');
                    self.expr(value);
                }
                self.out.push(';');
            }
            NodeKind::Stmt(StmtKind::Label) => {
                self.out.push('@');
                self.out.push_str(&self.name_of(self.arena.child(id, 0)));
                self.out.push(';');
            }
            NodeKind::Stmt(StmtKind::Jump) => {
                self.out.push_str("jump ");
                self.out.push_str(&self.name_of(self.arena.child(id, 0)));
                self.out.push(';');
            }
            NodeKind::Stmt(StmtKind::StateChange) => {
                self.out.push_str("state ");
                self.out.push_str(&self.name_of(self.arena.child(id, 0)));
                self.out.push(';');
            }
            NodeKind::Stmt(StmtKind::Decl) => {
                let ident = self.arena.child(id, 0);
                self.out.push_str(self.arena.get(ident).ty.name());
                self.out.push(' ');
                self.out.push_str(&self.name_of(ident));
                let init = self.arena.child(id, 1);
                if !matches!(self.arena.get(init).kind, NodeKind::Null) {
                    self.out.push_str(" = ");
                    self.expr(init);
                }
                self.out.push(';');
            }
            NodeKind::Stmt(StmtKind::If) => {
                self.out.push_str("if (");
                self.expr(self.arena.child(id, 0));
                self.out.push(')');
                self.body(self.arena.child(id, 1));
                let els = self.arena.child(id, 2);
                if !matches!(self.arena.get(els).kind, NodeKind::Null) {
                    self.newline();
                    self.out.push_str("else");
                    self.body(els);
                }
            }
            NodeKind::Stmt(StmtKind::While) => {
                self.out.push_str("while (");
                self.expr(self.arena.child(id, 0));
                self.out.push(')');
                self.body(self.arena.child(id, 1));
            }
            NodeKind::Stmt(StmtKind::DoWhile) => {
                self.out.push_str("do");
                self.body(self.arena.child(id, 0));
                self.newline();
                self.out.push_str("while (");
                self.expr(self.arena.child(id, 1));
                self.out.push_str(");");
            }
            NodeKind::Stmt(StmtKind::For) => {
                self.out.push_str("for (");
                self.expr_list(self.arena.child(id, 0));
                self.out.push_str("; ");
                let cond = self.arena.child(id, 1);
                if !matches!(self.arena.get(cond).kind, NodeKind::Null) {
                    self.expr(cond);
                }
                self.out.push_str("; ");
                self.expr_list(self.arena.child(id, 2));
                self.out.push(')');
                self.body(self.arena.child(id, 3));
            }
            _ => {}
        }
    }

    /// Print a conditional/loop body: compounds inline, single statements
    /// indented on their own line.
    fn body(&mut self, id: NodeId) {
        if matches!(self.arena.get(id).kind, NodeKind::Stmt(StmtKind::Compound)) {
            self.out.push(' ');
            self.statement(id);
        } else {
            self.indent += 1;
            self.newline();
            self.statement(id);
            self.indent -= 1;
        }
    }

    fn expr_list(&mut self, id: NodeId) {
        for i in 0..self.arena.child_count(id) {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(self.arena.child(id, i));
        }
    }

    fn expr(&mut self, id: NodeId) {
        match self.arena.get(id).kind.clone() {
            NodeKind::Expr(ExprKind::Constant) => {
                if let Some(v) = self.arena.get(id).constant() {
                    self.value(v);
                }
            }
            NodeKind::Expr(ExprKind::LValue) => {
                self.out.push_str(&self.name_of(self.arena.child(id, 0)));
                let member = self.arena.child(id, 1);
                if !matches!(self.arena.get(member).kind, NodeKind::Null) {
                    self.out.push('.');
                    self.out.push_str(
                        &self
                            .arena
                            .get(member)
                            .ident()
                            .map(|i| i.name.clone())
                            .unwrap_or_default(),
                    );
                }
            }
            NodeKind::Expr(ExprKind::Paren) => {
                self.out.push('(');
                self.expr(self.arena.child(id, 0));
                self.out.push(')');
            }
            NodeKind::Expr(ExprKind::Binary(op)) => {
                let prec = binop_prec(op);
                let lhs = self.arena.child(id, 0);
                let rhs = self.arena.child(id, 1);
                self.child_expr(lhs, |p| p < prec);
                self.out.push(' ');
                self.out.push_str(op.token());
                self.out.push(' ');
                if op.is_assignment() {
                    self.expr(rhs);
                } else {
                    self.child_expr(rhs, |p| p <= prec);
                }
            }
            NodeKind::Expr(ExprKind::Unary(op)) => {
                let operand = self.arena.child(id, 0);
                if op.is_postfix() {
                    self.child_expr(operand, |_| true);
                    self.out.push_str(op.token());
                } else {
                    self.out.push_str(op.token());
                    self.child_expr(operand, |_| true);
                }
            }
            NodeKind::Expr(ExprKind::Typecast(target)) => {
                self.out.push('(');
                self.out.push_str(target.name());
                self.out.push(')');
                self.child_expr(self.arena.child(id, 0), |_| true);
            }
            NodeKind::Expr(ExprKind::VectorLit) | NodeKind::Expr(ExprKind::RotationLit) => {
                self.out.push('<');
                for i in 0..self.arena.child_count(id) {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(self.arena.child(id, i));
                }
                self.out.push('>');
            }
            NodeKind::Expr(ExprKind::ListLit) => {
                self.out.push('[');
                for i in 0..self.arena.child_count(id) {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(self.arena.child(id, i));
                }
                self.out.push(']');
            }
            NodeKind::Expr(ExprKind::Call) => {
                self.out.push_str(&self.name_of(self.arena.child(id, 0)));
                self.out.push('(');
                for i in 1..self.arena.child_count(id) {
                    if i > 1 {
                        self.out.push_str(", ");
                    }
                    self.expr(self.arena.child(id, i));
                }
                self.out.push(')');
            }
            _ => {}
        }
    }

    /// Print a subexpression, parenthesizing binary children whose
    /// precedence makes the flat rendering ambiguous.
    fn child_expr(&mut self, id: NodeId, needs_parens: impl Fn(u8) -> bool) {
        let wrap = match self.arena.get(id).kind {
            NodeKind::Expr(ExprKind::Binary(op)) => needs_parens(binop_prec(op)),
            _ => false,
        };
        if wrap {
            self.out.push('(');
            self.expr(id);
            self.out.push(')');
        } else {
            self.expr(id);
        }
    }

    fn value(&mut self, v: &Value) {
        match v {
            Value::Integer(i) => {
                if self.opts.obfuscate_numbers {
                    self.out.push_str(&format!("0x{:X}", *i as u32));
                } else {
                    self.out.push_str(&i.to_string());
                }
            }
            Value::Float(f) => self.out.push_str(&format!("{f:?}")),
            Value::Str(s) => {
                self.out.push('"');
                for c in s.chars() {
                    match c {
                        '\n' => self.out.push_str("\\n"),
                        '\t' => self.out.push_str("\\t"),
                        '"' => self.out.push_str("\\\""),
                        '\\' => self.out.push_str("\\\\"),
                        other => self.out.push(other),
                    }
                }
                self.out.push('"');
            }
            Value::Key(s) => {
                self.out.push_str("(key)\"");
                self.out.push_str(s);
                self.out.push('"');
            }
            Value::Vector(v) => {
                self.out
                    .push_str(&format!("<{:?}, {:?}, {:?}>", v.x, v.y, v.z));
            }
            Value::Rotation(q) => {
                self.out
                    .push_str(&format!("<{:?}, {:?}, {:?}, {:?}>", q.x, q.y, q.z, q.s));
            }
            Value::List(items) => {
                self.out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.value(item);
                }
                self.out.push(']');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Logger;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn print_src(src: &str) -> String {
        let mut arena = Arena::new();
        let mut logger = Logger::new();
        let toks = lex(src, &mut logger);
        let root = parse(toks.tokens, &mut arena, &mut logger).expect("parse");
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        print(&arena, root, &PrettyOptions::default())
    }

    #[test]
    fn print_parse_print_is_stable() {
        let sources = [
            "integer g = 4;\nfloat half(float x) { return x / 2.0; }\n\
             default { state_entry() { float y = half(g); say(0, (string)y); } }",
            "default { touch_start(integer n) { if (n > 2) sleep(0.5); else { sleep(1.0); } } }",
            "default { state_entry() { vector v = <1.0, 2.0, 3.0>; list l = [1, \"a\"]; } }",
            "default { state_entry() { integer i; for (i = 0; i < 3; i++) say(0, \"x\"); } }",
            "default { state_entry() { jump out; do sleep(0.1); while (0); @out; } }",
        ];
        for src in sources {
            let once = print_src(src);
            let twice = print_src(&once);
            assert_eq!(once, twice, "printer not stable for:\n{src}");
        }
    }

    #[test]
    fn floats_keep_their_point() {
        let out = print_src("default { state_entry() { float x = 1.0; } }");
        assert!(out.contains("1.0"), "float literal must reparse as float: {out}");
    }

    #[test]
    fn string_escapes_round_trip() {
        let src = "default { state_entry() { string s = \"a\\nb\\\"c\\\\d\"; } }";
        let once = print_src(src);
        let twice = print_src(&once);
        assert_eq!(once, twice);
        assert!(once.contains("\\n"));
    }

    #[test]
    fn obfuscated_integers_print_as_hex() {
        let mut arena = Arena::new();
        let mut logger = Logger::new();
        let toks = lex(
            "integer g = 255;\ndefault { state_entry() { } }",
            &mut logger,
        );
        let root = parse(toks.tokens, &mut arena, &mut logger).expect("parse");
        let out = print(
            &arena,
            root,
            &PrettyOptions {
                obfuscate_numbers: true,
                ..Default::default()
            },
        );
        assert!(out.contains("0xFF"), "{out}");
    }

    #[test]
    fn minified_output_still_parses() {
        let mut arena = Arena::new();
        let mut logger = Logger::new();
        let toks = lex(
            "integer g = 4;\ndefault { state_entry() { g = g + 1; } }",
            &mut logger,
        );
        let root = parse(toks.tokens, &mut arena, &mut logger).expect("parse");
        let out = print(
            &arena,
            root,
            &PrettyOptions {
                minify: true,
                ..Default::default()
            },
        );
        assert!(!out.contains('\n'));
        let mut arena2 = Arena::new();
        let mut logger2 = Logger::new();
        let toks2 = lex(&out, &mut logger2);
        let reparsed = parse(toks2.tokens, &mut arena2, &mut logger2);
        assert!(reparsed.is_some(), "minified output failed to parse: {out}");
        assert_eq!(logger2.errors(), 0, "{}", logger2.report());
    }
}
