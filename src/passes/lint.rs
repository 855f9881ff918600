//! Reference accounting and best-practice warnings.
//!
//! The recount walk rebuilds every symbol's reference/assignment counters
//! from scratch; the optimizer re-runs it after each rewrite round, and the
//! fold pass trusts the counters when deciding whether a symbol is a
//! constant source. The warning walk never touches the tree.

use crate::ast::{Arena, BinOp, ExprKind, NodeId, NodeKind, StmtKind, UnOp};
use crate::diag::{DiagCode, Logger};
use crate::passes::{walk, Visitor};
use crate::symtab::{SymbolKind, SymbolSubKind};
use crate::value::Value;

/// Reset and recount references and assignments for every symbol.
pub fn recount_references(arena: &mut Arena, root: NodeId) {
    for sid in arena.symbol_ids().collect::<Vec<_>>() {
        arena.symbol_mut(sid).reset_tracking();
    }
    let mut logger = Logger::new(); // counting never reports
    walk(&mut Recount, arena, &mut logger, root);
}

struct Recount;

impl Recount {
    fn add_reference(arena: &mut Arena, parent: NodeId, ident_slot: usize) {
        if let Some(sid) = arena.ident_symbol(parent, ident_slot) {
            arena.symbol_mut(sid).references += 1;
        }
    }

    fn add_assignment_to_lvalue(arena: &mut Arena, lvalue: NodeId) {
        if !matches!(arena.get(lvalue).kind, NodeKind::Expr(ExprKind::LValue)) {
            return;
        }
        if let Some(sid) = arena.ident_symbol(lvalue, 0) {
            arena.symbol_mut(sid).assignments += 1;
        }
    }
}

impl Visitor for Recount {
    fn enter(&mut self, arena: &mut Arena, _logger: &mut Logger, id: NodeId) -> bool {
        match arena.get(id).kind.clone() {
            NodeKind::Expr(ExprKind::LValue) => Self::add_reference(arena, id, 0),
            NodeKind::Expr(ExprKind::Call) => Self::add_reference(arena, id, 0),
            NodeKind::Stmt(StmtKind::Jump) | NodeKind::Stmt(StmtKind::StateChange) => {
                Self::add_reference(arena, id, 0)
            }
            NodeKind::Expr(ExprKind::Binary(op)) if op.is_assignment() => {
                let lhs = arena.child(id, 0);
                Self::add_assignment_to_lvalue(arena, lhs);
            }
            NodeKind::Expr(ExprKind::Unary(
                UnOp::PreIncr | UnOp::PreDecr | UnOp::PostIncr | UnOp::PostDecr,
            )) => {
                let operand = arena.child(id, 0);
                Self::add_assignment_to_lvalue(arena, operand);
            }
            NodeKind::Stmt(StmtKind::Decl) | NodeKind::GlobalVariable => {
                let init = arena.child(id, 1);
                if !matches!(arena.get(init).kind, NodeKind::Null) {
                    if let Some(sid) = arena.ident_symbol(id, 0) {
                        arena.symbol_mut(sid).assignments += 1;
                    }
                }
            }
            _ => {}
        }
        true
    }
}

/// Suspicious-construct warnings: constant conditions, assignment used as a
/// condition, duplicated event handlers.
pub fn run_best_practices(arena: &mut Arena, logger: &mut Logger, root: NodeId) {
    walk(&mut BestPractices, arena, logger, root);
}

struct BestPractices;

impl Visitor for BestPractices {
    fn enter(&mut self, arena: &mut Arena, logger: &mut Logger, id: NodeId) -> bool {
        match arena.get(id).kind.clone() {
            NodeKind::Stmt(StmtKind::If) => {
                let cond = arena.child(id, 0);
                if let Some(Value::Integer(i)) = arena.get(cond).constant() {
                    let loc = arena.get(cond).loc;
                    if *i != 0 {
                        logger.warn(
                            DiagCode::ConditionAlwaysTrue,
                            loc,
                            "condition is always true",
                        );
                    } else {
                        logger.warn(
                            DiagCode::ConditionAlwaysFalse,
                            loc,
                            "condition is always false",
                        );
                    }
                }
                if let NodeKind::Expr(ExprKind::Binary(BinOp::Assign)) = arena.get(cond).kind {
                    if !arena.get(cond).synthesized {
                        let loc = arena.get(cond).loc;
                        logger.warn(
                            DiagCode::AssignmentInComparison,
                            loc,
                            "assignment used where a comparison was probably meant",
                        );
                    }
                }
            }
            NodeKind::EventHandler => {
                // duplicate handlers in a state; reported on the last one
                let Some(state) = arena.parent(id) else {
                    return true;
                };
                let name = arena
                    .get(arena.child(id, 0))
                    .ident()
                    .map(|i| i.name.clone())
                    .unwrap_or_default();
                let mut found = 0;
                let mut last = id;
                for i in 1..arena.child_count(state) {
                    let other = arena.child(state, i);
                    if !matches!(arena.get(other).kind, NodeKind::EventHandler) {
                        continue;
                    }
                    let other_name = arena
                        .get(arena.child(other, 0))
                        .ident()
                        .map(|i| i.name.clone())
                        .unwrap_or_default();
                    if other_name == name {
                        found += 1;
                        last = other;
                    }
                }
                if found > 1 && last == id {
                    let loc = arena.get(id).loc;
                    logger.warn(
                        DiagCode::MultipleEventHandlers,
                        loc,
                        format!("state has more than one `{name}` handler"),
                    );
                }
            }
            _ => {}
        }
        true
    }
}

/// Unused-symbol warnings over the current scope tree. Pruned symbols are
/// already out of their tables and stay silent; script-level globals and
/// functions that survive pruning are exported surface and stay silent too,
/// so only locals and labels warn.
pub fn warn_unused(arena: &mut Arena, logger: &mut Logger, root: NodeId) {
    let Some(root_table) = arena.get(root).table else {
        return;
    };
    let mut tables = vec![root_table];
    tables.extend_from_slice(arena.table(root_table).descendants());
    for t in tables {
        for &sid in arena.table(t).symbols().to_vec().iter() {
            let (name, kind, sub, refs, loc) = {
                let sym = arena.symbol(sid);
                (sym.name.clone(), sym.kind, sym.sub, sym.references, sym.loc)
            };
            if sub == SymbolSubKind::Builtin || refs > 0 {
                continue;
            }
            match kind {
                SymbolKind::Variable if sub != SymbolSubKind::Global => logger.warn(
                    DiagCode::UnusedVariable,
                    loc,
                    format!("variable `{name}` is never used"),
                ),
                SymbolKind::Label => logger.warn(
                    DiagCode::UnusedLabel,
                    loc,
                    format!("label `{name}` is never jumped to"),
                ),
                _ => {}
            }
        }
    }
}
