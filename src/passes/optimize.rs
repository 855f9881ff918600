//! The pipeline driver.
//!
//! Orders the passes, repeats them until the tree stops changing (bounded,
//! in case folding oscillates), prunes unreferenced symbols when asked to,
//! and runs the final validations. Pruning never runs on a tree that has
//! errors; validation always does, to surface as much as possible.

use log::debug;

use crate::ast::{Arena, NodeId};
use crate::diag::Logger;
use crate::passes::{desugar, fold, infer, lint, resolve};
use crate::symtab::{SymbolKind, SymbolSubKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeOptions {
    pub fold_constants: bool,
    pub prune_unused_locals: bool,
    pub prune_unused_globals: bool,
    pub prune_unused_functions: bool,
}

impl OptimizeOptions {
    pub fn all() -> Self {
        Self {
            fold_constants: true,
            prune_unused_locals: true,
            prune_unused_globals: true,
            prune_unused_functions: true,
        }
    }

    pub fn any_prune(self) -> bool {
        self.prune_unused_locals || self.prune_unused_globals || self.prune_unused_functions
    }
}

/// Convergence bound; real scripts settle in two or three rounds.
const MAX_ROUNDS: usize = 8;

pub fn run(
    arena: &mut Arena,
    logger: &mut Logger,
    root: NodeId,
    opts: OptimizeOptions,
    legacy: bool,
) {
    let mut round = 0;
    loop {
        round += 1;
        debug!("optimizer round {round}");

        resolve::run(arena, logger, root, legacy);
        infer::run(arena, logger, root);
        lint::recount_references(arena, root);

        let mut changed = false;
        if opts.fold_constants {
            changed |= fold::run(arena, logger, root, legacy);
        }
        changed |= desugar::run(arena, logger, root);
        if opts.fold_constants {
            changed |= fold::run(arena, logger, root, legacy);
        }
        lint::recount_references(arena, root);

        let mut pruned = false;
        if logger.errors() == 0 && opts.any_prune() {
            pruned = prune(arena, root, opts);
        }

        if !(changed || pruned) || round >= MAX_ROUNDS {
            debug!("optimizer settled after {round} round(s)");
            break;
        }
    }

    lint::run_best_practices(arena, logger, root);
    lint::warn_unused(arena, logger, root);
}

/// Drop declarations of unreferenced symbols in the requested categories.
/// Returns true if anything was removed; the caller re-analyzes, since a
/// pruned function releases references of its own.
fn prune(arena: &mut Arena, root: NodeId, opts: OptimizeOptions) -> bool {
    let Some(root_table) = arena.get(root).table else {
        return false;
    };
    let mut tables = vec![root_table];
    tables.extend_from_slice(arena.table(root_table).descendants());

    let mut removed_any = false;
    for t in tables {
        for sid in arena.table(t).symbols().to_vec() {
            let (kind, sub, refs, decl) = {
                let sym = arena.symbol(sid);
                (sym.kind, sym.sub, sym.references, sym.decl)
            };
            if refs > 0 || sub == SymbolSubKind::Builtin {
                continue;
            }
            let wanted = match (kind, sub) {
                (SymbolKind::Variable, SymbolSubKind::Global) => opts.prune_unused_globals,
                (SymbolKind::Variable, SymbolSubKind::Local) => opts.prune_unused_locals,
                (SymbolKind::Function, _) => opts.prune_unused_functions,
                _ => false,
            };
            if !wanted {
                continue;
            }
            let Some(decl) = decl else { continue };
            let Some(parent) = arena.parent(decl) else {
                continue;
            };
            debug!("pruning {} `{}`", kind.name(), arena.symbol(sid).name);
            arena.remove_child(parent, decl);
            arena.table_mut(t).remove(sid);
            removed_any = true;
        }
    }
    removed_any
}

/// True when `name` is still declared somewhere under `root`.
#[cfg(test)]
fn tree_declares(arena: &Arena, id: NodeId, name: &str) -> bool {
    use crate::ast::{NodeKind, StmtKind};
    let node = arena.get(id);
    if matches!(
        node.kind,
        NodeKind::GlobalVariable | NodeKind::GlobalFunction | NodeKind::Stmt(StmtKind::Decl)
    ) {
        if let Some(ident) = arena.get(arena.child(id, 0)).ident() {
            if ident.name == name {
                return true;
            }
        }
    }
    (0..arena.child_count(id)).any(|i| tree_declares(arena, arena.child(id, i), name))
}
