//! Constant propagation.
//!
//! Bottom-up folding of operations whose operands are statically known,
//! member extraction from single-assignment vector/rotation symbols, and
//! constructor folding for vector/rotation/list literals. The gating hook
//! invalidates stale constants on every run (static nodes and literals keep
//! theirs), so the pass can be re-run to fixpoint after the tree is
//! rewritten.
//!
//! Script nodes are walked globals-first so global initializers are known by
//! the time function and handler bodies are visited.

use std::collections::HashMap;

use log::debug;

use crate::ast::{Arena, BinOp, ExprKind, NodeId, NodeKind, StmtKind};
use crate::diag::{DiagCode, Logger};
use crate::passes::{walk, Visitor};
use crate::types::ScriptType;
use crate::value::{self, FoldError, Quat, Value, Vec3};

/// Returns true if any node's constant slot changed, so the optimizer knows
/// another round might pay off.
pub fn run(arena: &mut Arena, logger: &mut Logger, root: NodeId, legacy: bool) -> bool {
    let mut fold = Fold {
        legacy,
        changed: false,
        stash: HashMap::new(),
    };
    walk(&mut fold, arena, logger, root);
    debug!("constant propagation (changed={})", fold.changed);
    fold.changed
}

struct Fold {
    legacy: bool,
    changed: bool,
    /// Constant slots as they were before this run cleared them.
    stash: HashMap<NodeId, Option<Value>>,
}

/// Constant equality for change detection; NaN compares equal to itself so
/// a folded NaN does not look fresh on every run.
fn const_eq(a: Option<&Value>, b: Option<&Value>) -> bool {
    fn feq(a: f32, b: f32) -> bool {
        a.to_bits() == b.to_bits() || a == b
    }
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Float(x), Value::Float(y)) => feq(*x, *y),
            (Value::Vector(x), Value::Vector(y)) => {
                feq(x.x, y.x) && feq(x.y, y.y) && feq(x.z, y.z)
            }
            (Value::Rotation(x), Value::Rotation(y)) => {
                feq(x.x, y.x) && feq(x.y, y.y) && feq(x.z, y.z) && feq(x.s, y.s)
            }
            _ => a == b,
        },
        _ => false,
    }
}

impl Fold {
    fn finish(&mut self, arena: &Arena, id: NodeId) {
        if let Some(old) = self.stash.get(&id) {
            if !const_eq(old.as_ref(), arena.get(id).constant()) {
                self.changed = true;
            }
        }
    }

    fn copy_from_child(&mut self, arena: &mut Arena, id: NodeId, child: NodeId) {
        let cv = arena.get(child).constant().cloned();
        let precluded = arena.get(child).constant_precluded();
        arena.set_constant(id, cv);
        if precluded {
            arena.set_constant_precluded(id, true);
        }
    }

    fn fold_binary(&mut self, arena: &mut Arena, logger: &mut Logger, id: NodeId, op: BinOp) {
        if op == BinOp::Assign {
            // an assignment's value is its right side's value
            let rhs = arena.child(id, 1);
            self.copy_from_child(arena, id, rhs);
            return;
        }
        if op.is_compound() {
            // desugaring decouples these; nothing to do yet
            return;
        }
        let lhs = arena.get(arena.child(id, 0)).constant().cloned();
        let rhs = arena.get(arena.child(id, 1)).constant().cloned();
        let (Some(l), Some(r)) = (lhs, rhs) else {
            return;
        };
        match value::fold_binary(op, &l, &r) {
            Ok(v) => arena.set_constant(id, Some(v)),
            Err(FoldError::DivisionByZero) => {
                let (loc, synthesized) = {
                    let n = arena.get(id);
                    (n.loc, n.synthesized)
                };
                if !synthesized {
                    logger.warn(DiagCode::DivisionByZero, loc, "division by zero");
                }
            }
            Err(FoldError::Unsupported) => {}
        }
    }

    fn fold_lvalue(&mut self, arena: &mut Arena, id: NodeId) {
        let Some(sid) = arena.ident_symbol(id, 0) else {
            arena.set_constant_precluded(id, true);
            return;
        };
        let (assignments, sym_const, sym_precluded) = {
            let sym = arena.symbol(sid);
            (sym.assignments, sym.constant.clone(), sym.constant_precluded)
        };
        // a symbol is a constant source only while its declaration is the
        // one and only assignment
        if assignments > 1 {
            return;
        }
        let Some(cv) = sym_const else {
            if sym_precluded {
                arena.set_constant_precluded(id, true);
            }
            return;
        };
        let member = arena.child(id, 1);
        let member_name = arena.get(member).ident().map(|i| i.name.clone());
        let result = match member_name {
            None => Some(cv),
            Some(name) => match (&cv, name.as_str()) {
                (Value::Vector(v), "x") => Some(Value::Float(v.x)),
                (Value::Vector(v), "y") => Some(Value::Float(v.y)),
                (Value::Vector(v), "z") => Some(Value::Float(v.z)),
                (Value::Rotation(q), "x") => Some(Value::Float(q.x)),
                (Value::Rotation(q), "y") => Some(Value::Float(q.y)),
                (Value::Rotation(q), "z") => Some(Value::Float(q.z)),
                (Value::Rotation(q), "s") => Some(Value::Float(q.s)),
                _ => None,
            },
        };
        arena.set_constant(id, result);
    }

    fn fold_coordinates(&mut self, arena: &mut Arena, id: NodeId, want: usize) {
        let mut comps = [0.0f32; 4];
        for i in 0..want.min(arena.child_count(id)) {
            let child = arena.child(id, i);
            match arena.get(child).constant() {
                Some(v) => match v.as_float() {
                    Some(f) => comps[i] = f,
                    None => {
                        arena.set_constant_precluded(id, true);
                        return;
                    }
                },
                None => {
                    let p = arena.get(child).constant_precluded();
                    arena.set_constant_precluded(id, p);
                    return;
                }
            }
        }
        let v = if want == 3 {
            Value::Vector(Vec3::new(comps[0], comps[1], comps[2]))
        } else {
            Value::Rotation(Quat::new(comps[0], comps[1], comps[2], comps[3]))
        };
        arena.set_constant(id, Some(v));
    }

    fn fold_list(&mut self, arena: &mut Arena, id: NodeId) {
        let mut items = Vec::with_capacity(arena.child_count(id));
        for i in 0..arena.child_count(id) {
            let child = arena.child(id, i);
            match arena.get(child).constant() {
                Some(v) => items.push(v.clone()),
                None => {
                    let p = arena.get(child).constant_precluded();
                    arena.set_constant_precluded(id, p);
                    return;
                }
            }
        }
        arena.set_constant(id, Some(Value::List(items)));
    }

    /// Recompute a declared symbol's constant from its (possibly rewritten)
    /// initializer.
    fn refresh_symbol(&mut self, arena: &mut Arena, id: NodeId) {
        let Some(sid) = arena.ident_symbol(id, 0) else {
            return;
        };
        let init = arena.child(id, 1);
        let (cv, precluded) = if matches!(arena.get(init).kind, NodeKind::Null) {
            (None, false)
        } else {
            (
                arena.get(init).constant().cloned(),
                arena.get(init).constant_precluded(),
            )
        };
        let sym = arena.symbol_mut(sid);
        sym.constant = cv;
        sym.constant_precluded = precluded;
    }
}

impl Visitor for Fold {
    fn before_descend(&mut self, arena: &mut Arena, _logger: &mut Logger, id: NodeId) -> bool {
        let (is_static, is_literal, ty) = {
            let n = arena.get(id);
            (n.static_value, n.is_literal(), n.ty)
        };
        if !is_static && !is_literal {
            self.stash.insert(id, arena.get(id).constant().cloned());
            arena.set_constant(id, None);
            arena.set_constant_precluded(id, false);
        }
        if ty == ScriptType::Error {
            // no chance of a value below a type failure
            arena.set_constant_precluded(id, true);
            self.finish(arena, id);
            return false;
        }
        true
    }

    fn enter(&mut self, arena: &mut Arena, logger: &mut Logger, id: NodeId) -> bool {
        if !matches!(arena.get(id).kind, NodeKind::Script) {
            return true;
        }
        // globals first: their values feed every body
        let mut i = 0;
        while i < arena.child_count(id) {
            let child = arena.child(id, i);
            if matches!(arena.get(child).kind, NodeKind::GlobalVariable) {
                walk(self, arena, logger, child);
            }
            i += 1;
        }
        let mut i = 0;
        while i < arena.child_count(id) {
            let child = arena.child(id, i);
            if !matches!(arena.get(child).kind, NodeKind::GlobalVariable) {
                walk(self, arena, logger, child);
            }
            i += 1;
        }
        false
    }

    fn leave(&mut self, arena: &mut Arena, logger: &mut Logger, id: NodeId) {
        match arena.get(id).kind.clone() {
            NodeKind::Expr(ExprKind::Paren) => {
                let child = arena.child(id, 0);
                self.copy_from_child(arena, id, child);
            }
            NodeKind::Expr(ExprKind::Binary(op)) => self.fold_binary(arena, logger, id, op),
            NodeKind::Expr(ExprKind::Unary(op)) => {
                let cv = arena.get(arena.child(id, 0)).constant().cloned();
                if let Some(v) = cv {
                    if let Ok(folded) = value::fold_unary(op, &v) {
                        arena.set_constant(id, Some(folded));
                    }
                }
            }
            NodeKind::Expr(ExprKind::Typecast(target)) => {
                let child = arena.child(id, 0);
                match arena.get(child).constant().cloned() {
                    Some(v) => {
                        let folded = value::cast(target, &v, self.legacy);
                        arena.set_constant(id, folded);
                    }
                    None => {
                        let p = arena.get(child).constant_precluded();
                        arena.set_constant_precluded(id, p);
                    }
                }
            }
            NodeKind::Expr(ExprKind::LValue) => self.fold_lvalue(arena, id),
            NodeKind::Expr(ExprKind::VectorLit) => self.fold_coordinates(arena, id, 3),
            NodeKind::Expr(ExprKind::RotationLit) => self.fold_coordinates(arena, id, 4),
            NodeKind::Expr(ExprKind::ListLit) => self.fold_list(arena, id),
            NodeKind::Stmt(StmtKind::Decl) | NodeKind::GlobalVariable => {
                self.refresh_symbol(arena, id);
            }
            _ => {}
        }
        self.finish(arena, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::passes::{infer, lint, resolve};

    fn fold_src(src: &str, legacy: bool) -> (Arena, Logger, NodeId) {
        let mut arena = Arena::new();
        let mut logger = Logger::new();
        let toks = lex(src, &mut logger);
        let root = parse(toks.tokens, &mut arena, &mut logger).expect("parse");
        resolve::run(&mut arena, &mut logger, root, legacy);
        infer::run(&mut arena, &mut logger, root);
        lint::recount_references(&mut arena, root);
        run(&mut arena, &mut logger, root, legacy);
        (arena, logger, root)
    }

    /// Constant on the initializer of local #`n` in the last state's first
    /// handler.
    fn local_init_const(arena: &Arena, root: NodeId, n: usize) -> Option<Value> {
        let state = arena.child(root, arena.child_count(root) - 1);
        let handler = arena.child(state, 1);
        let body = arena.child(handler, 2);
        let decl = arena.child(body, n);
        arena.get(arena.child(decl, 1)).constant().cloned()
    }

    #[test]
    fn arithmetic_folds() {
        let (arena, logger, root) =
            fold_src("default { state_entry() { integer x = 1 + 2 * 3; } }", false);
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        assert_eq!(local_init_const(&arena, root, 0), Some(Value::Integer(7)));
    }

    #[test]
    fn overflow_wraps_silently() {
        let (arena, logger, root) = fold_src(
            "default { state_entry() { integer x = 2147483647 + 1; } }",
            false,
        );
        assert_eq!(logger.warnings(), 0);
        assert_eq!(
            local_init_const(&arena, root, 0),
            Some(Value::Integer(i32::MIN))
        );
    }

    #[test]
    fn division_by_zero_warns_and_does_not_fold() {
        let (arena, logger, root) =
            fold_src("default { state_entry() { float x = 1.0 / 0.0; } }", false);
        assert!(logger.has_code(DiagCode::DivisionByZero));
        assert_eq!(local_init_const(&arena, root, 0), None);
    }

    #[test]
    fn global_constants_reach_bodies() {
        let (arena, logger, root) = fold_src(
            "integer g = 4;\ndefault { state_entry() { integer x = g + 1; } }",
            false,
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        assert_eq!(local_init_const(&arena, root, 0), Some(Value::Integer(5)));
    }

    #[test]
    fn vector_member_extraction() {
        let (arena, logger, root) = fold_src(
            "default { state_entry() { vector v = <1, 2, 3>; float x = v.x; } }",
            false,
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        assert_eq!(local_init_const(&arena, root, 1), Some(Value::Float(1.0)));
    }

    #[test]
    fn reassigned_symbol_is_not_a_constant_source() {
        let (arena, logger, root) = fold_src(
            "default { state_entry() { integer a = 1; a = 2; integer b = a; } }",
            false,
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        assert_eq!(local_init_const(&arena, root, 2), None);
    }

    #[test]
    fn empty_list_folds_to_empty_list_constant() {
        let (arena, logger, root) =
            fold_src("default { state_entry() { list l = []; } }", false);
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        assert_eq!(
            local_init_const(&arena, root, 0),
            Some(Value::List(Vec::new()))
        );
    }

    #[test]
    fn list_constant_promotes_elements() {
        let (arena, logger, root) = fold_src(
            "default { state_entry() { list l = [1, 2.0] + \"x\"; } }",
            false,
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        assert_eq!(
            local_init_const(&arena, root, 0),
            Some(Value::List(vec![
                Value::Integer(1),
                Value::Float(2.0),
                Value::Str("x".into())
            ]))
        );
    }

    #[test]
    fn runtime_values_do_not_fold() {
        let (arena, logger, root) = fold_src(
            "default { state_entry() { float x = getTime() + 1.0; } }",
            false,
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        assert_eq!(local_init_const(&arena, root, 0), None);
    }

    #[test]
    fn cast_folding_realizes_string_conversions() {
        let (arena, logger, root) = fold_src(
            "default { state_entry() { string s = (string)<1,2,3>; } }",
            false,
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        assert_eq!(
            local_init_const(&arena, root, 0),
            Some(Value::Str("<1.00000, 2.00000, 3.00000>".into()))
        );
    }

    #[test]
    fn legacy_int_min_cast_produces_nan() {
        let (arena, logger, root) = fold_src(
            "default { state_entry() { float x = (float)((integer)-2147483648); } }",
            true,
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        match local_init_const(&arena, root, 0) {
            Some(Value::Float(f)) => assert!(f.is_nan()),
            other => panic!("expected folded NaN, got {other:?}"),
        }
    }

    #[test]
    fn error_subtree_is_precluded_not_folded() {
        let (arena, _logger, root) = fold_src(
            "default { state_entry() { vector v = <1, \"two\", 3>; } }",
            false,
        );
        let state = arena.child(root, 0);
        let handler = arena.child(state, 1);
        let body = arena.child(handler, 2);
        let init = arena.child(arena.child(body, 0), 1);
        assert!(arena.get(init).constant().is_none());
        assert!(arena.get(init).constant_precluded());
    }

    #[test]
    fn second_run_changes_nothing() {
        let src = "integer g = 2 + 2;\ndefault { state_entry() { integer x = g * 2; } }";
        let mut arena = Arena::new();
        let mut logger = Logger::new();
        let toks = lex(src, &mut logger);
        let root = parse(toks.tokens, &mut arena, &mut logger).expect("parse");
        resolve::run(&mut arena, &mut logger, root, false);
        infer::run(&mut arena, &mut logger, root);
        lint::recount_references(&mut arena, root);
        let first = run(&mut arena, &mut logger, root, false);
        assert!(first, "first run discovers constants");
        let second = run(&mut arena, &mut logger, root, false);
        assert!(!second, "folding is idempotent after the first run");
    }
}
