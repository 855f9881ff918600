//! Desugaring.
//!
//! Rewrites the surface forms the backend does not want to see: compound
//! assignments become `lhs = lhs op rhs` (except the `int *= float` family,
//! which the VM handles with dedicated opcodes), pre-increment/decrement
//! become explicit assignments, legal implicit coercions become explicit
//! typecasts, and builtin constant references are inlined as constant
//! expressions. Vector and rotation builtins inline as coordinate
//! expressions instead, because the backend serializes those differently
//! from plain constants.

use log::debug;

use crate::ast::{Arena, BinOp, ExprKind, NodeId, NodeKind, StmtKind, UnOp};
use crate::diag::Logger;
use crate::passes::{walk, Visitor};
use crate::symtab::{SymbolKind, SymbolSubKind};
use crate::types::ScriptType;
use crate::value::Value;

/// Returns true when any rewrite happened.
pub fn run(arena: &mut Arena, logger: &mut Logger, root: NodeId) -> bool {
    let mut pass = Desugar { changed: false };
    walk(&mut pass, arena, logger, root);
    debug!("desugaring (changed={})", pass.changed);
    pass.changed
}

struct Desugar {
    changed: bool,
}

impl Desugar {
    /// Wrap `expr` in an explicit typecast to `to` when the implicit
    /// coercion is legal; replacement goes through a null placeholder so the
    /// parent/sibling links never dangle.
    fn inject_cast(&mut self, arena: &mut Arena, expr: NodeId, to: ScriptType) {
        let from = arena.get(expr).ty;
        if from == to || from == ScriptType::Error || !from.can_coerce(to) {
            return;
        }
        let loc = arena.get(expr).loc;
        let placeholder = arena.null_node();
        arena.replace(expr, placeholder);
        let cast = arena.new_node(NodeKind::Expr(ExprKind::Typecast(to)), loc);
        arena.get_mut(cast).ty = to;
        arena.get_mut(cast).synthesized = true;
        arena.push_child(cast, expr);
        arena.replace(placeholder, cast);
        self.changed = true;
    }

    fn desugar_binary(&mut self, arena: &mut Arena, id: NodeId, op: BinOp) {
        let lhs = arena.child(id, 0);
        let rhs = arena.child(id, 1);
        let (lty, rty) = (arena.get(lhs).ty, arena.get(rhs).ty);
        if lty == ScriptType::Error || rty == ScriptType::Error {
            return;
        }

        if op == BinOp::Assign {
            self.inject_cast(arena, rhs, lty);
            return;
        }
        if !op.is_compound() {
            return;
        }
        // `int * float` and `float * int` compile to dedicated opcodes, not
        // to a cast-and-multiply, so the compound form survives
        if op == BinOp::MulAssign
            && ((lty == ScriptType::Integer && rty == ScriptType::Float)
                || (lty == ScriptType::Float && rty == ScriptType::Integer))
        {
            return;
        }

        // `lhs op= rhs`  ==>  `lhs = lhs op rhs`
        let node_ty = arena.get(id).ty;
        let node_loc = arena.get(id).loc;
        let rhs = arena.take_child(id, 1);
        let lhs_copy = arena.clone_subtree(lhs);
        let new_rhs = arena.node(
            NodeKind::Expr(ExprKind::Binary(op.decoupled())),
            node_loc,
            vec![lhs_copy, rhs],
        );
        arena.get_mut(new_rhs).ty = node_ty;
        arena.get_mut(new_rhs).synthesized = true;
        let placeholder = arena.child(id, 1);
        arena.replace(placeholder, new_rhs);
        arena.get_mut(id).kind = NodeKind::Expr(ExprKind::Binary(BinOp::Assign));
        self.changed = true;
    }

    fn desugar_incr_decr(&mut self, arena: &mut Arena, id: NodeId, op: UnOp) {
        if arena.get(id).ty == ScriptType::Error {
            return;
        }
        // post-forms are not sugar: their value is the old one
        let step = match op {
            UnOp::PreIncr => BinOp::Add,
            UnOp::PreDecr => BinOp::Sub,
            _ => return,
        };

        let node_ty = arena.get(id).ty;
        let node_loc = arena.get(id).loc;
        let lvalue = arena.take_child(id, 0);
        let lvalue_copy = arena.clone_subtree(lvalue);

        let one = node_ty.one_value();
        let one_ty = one.type_of();
        let one_node = arena.new_node(NodeKind::Expr(ExprKind::Constant), node_loc);
        arena.set_constant(one_node, Some(one));
        arena.get_mut(one_node).ty = one_ty;
        arena.get_mut(one_node).synthesized = true;

        // `++lhs`  ==>  `lhs = lhs + 1`
        let new_rhs = arena.node(
            NodeKind::Expr(ExprKind::Binary(step)),
            node_loc,
            vec![lvalue_copy, one_node],
        );
        arena.get_mut(new_rhs).ty = node_ty;
        arena.get_mut(new_rhs).synthesized = true;
        let assign = arena.node(
            NodeKind::Expr(ExprKind::Binary(BinOp::Assign)),
            node_loc,
            vec![lvalue, new_rhs],
        );
        arena.get_mut(assign).ty = node_ty;
        arena.get_mut(assign).synthesized = true;
        arena.replace(id, assign);
        self.changed = true;
    }

    /// Replace a reference to a builtin constant with its value. Vector and
    /// rotation constants become coordinate expressions built from float
    /// constants; everything else becomes a constant expression.
    fn inline_builtin(&mut self, arena: &mut Arena, id: NodeId) {
        let Some(sid) = arena.ident_symbol(id, 0) else {
            return;
        };
        {
            let sym = arena.symbol(sid);
            if sym.kind != SymbolKind::Variable || sym.sub != SymbolSubKind::Builtin {
                return;
            }
        }
        let Some(cv) = arena.get(id).constant().cloned() else {
            return;
        };
        // never rewrite an assignment target
        if let Some(p) = arena.parent(id) {
            if let NodeKind::Expr(ExprKind::Binary(op)) = arena.get(p).kind {
                if op.is_assignment() && arena.child(p, 0) == id {
                    return;
                }
            }
        }
        let loc = arena.get(id).loc;

        let new_expr = match &cv {
            Value::Vector(v) => {
                let comps = [v.x, v.y, v.z];
                self.coordinate_expr(arena, ExprKind::VectorLit, &comps, loc)
            }
            Value::Rotation(q) => {
                let comps = [q.x, q.y, q.z, q.s];
                self.coordinate_expr(arena, ExprKind::RotationLit, &comps, loc)
            }
            _ => {
                let n = arena.new_node(NodeKind::Expr(ExprKind::Constant), loc);
                arena.get_mut(n).ty = cv.type_of();
                n
            }
        };
        arena.get_mut(new_expr).ty = cv.type_of();
        arena.get_mut(new_expr).synthesized = true;
        arena.get_mut(new_expr).static_value = true;
        arena.set_constant(new_expr, Some(cv));
        arena.replace(id, new_expr);
        self.changed = true;
    }

    fn coordinate_expr(
        &mut self,
        arena: &mut Arena,
        kind: ExprKind,
        comps: &[f32],
        loc: crate::span::Span,
    ) -> NodeId {
        let node = arena.new_node(NodeKind::Expr(kind), loc);
        for &c in comps {
            let child = arena.new_node(NodeKind::Expr(ExprKind::Constant), loc);
            arena.get_mut(child).ty = ScriptType::Float;
            arena.get_mut(child).synthesized = true;
            arena.set_constant(child, Some(Value::Float(c)));
            arena.push_child(node, child);
        }
        node
    }
}

impl Visitor for Desugar {
    fn leave(&mut self, arena: &mut Arena, _logger: &mut Logger, id: NodeId) {
        match arena.get(id).kind.clone() {
            NodeKind::Expr(ExprKind::Binary(op)) => self.desugar_binary(arena, id, op),
            NodeKind::Expr(ExprKind::Unary(op)) => self.desugar_incr_decr(arena, id, op),
            NodeKind::Expr(ExprKind::LValue) => self.inline_builtin(arena, id),
            NodeKind::Stmt(StmtKind::Decl) | NodeKind::GlobalVariable => {
                let init = arena.child(id, 1);
                if !matches!(arena.get(init).kind, NodeKind::Null) {
                    let declared = arena.get(arena.child(id, 0)).ty;
                    self.inject_cast(arena, init, declared);
                }
            }
            NodeKind::Expr(ExprKind::Call) => {
                let Some(sid) = arena.ident_symbol(id, 0) else {
                    return;
                };
                let params = arena.symbol(sid).params.clone().unwrap_or_default();
                for (i, param) in params.iter().enumerate() {
                    if i + 1 >= arena.child_count(id) {
                        break;
                    }
                    let arg = arena.child(id, i + 1);
                    self.inject_cast(arena, arg, param.ty);
                }
            }
            NodeKind::Stmt(StmtKind::Return) => {
                let value = arena.child(id, 0);
                if matches!(arena.get(value).kind, NodeKind::Null) {
                    return;
                }
                // cast to the enclosing function's return type
                let mut cursor = arena.parent(id);
                while let Some(node) = cursor {
                    if matches!(arena.get(node).kind, NodeKind::GlobalFunction) {
                        let ret_ty = arena.get(arena.child(node, 0)).ty;
                        self.inject_cast(arena, value, ret_ty);
                        return;
                    }
                    cursor = arena.parent(node);
                }
            }
            NodeKind::Expr(ExprKind::VectorLit) | NodeKind::Expr(ExprKind::RotationLit) => {
                let mut i = 0;
                while i < arena.child_count(id) {
                    let comp = arena.child(id, i);
                    self.inject_cast(arena, comp, ScriptType::Float);
                    i += 1;
                }
            }
            _ => {}
        }
    }
}
