//! Symbol resolution.
//!
//! Two nested phases: the global phase walks only the script root's direct
//! children so globals, functions and states become visible everywhere
//! before any body is entered; the body phase then resolves function and
//! handler interiors. Jumps are deferred per body and fixed up on exit,
//! since a jump may target a label declared after it.

use log::debug;

use crate::ast::{Arena, ExprKind, NodeId, NodeKind, StmtKind};
use crate::builtins;
use crate::diag::{DiagCode, Logger};
use crate::symtab::{
    self, find_in_table, Param, Symbol, SymbolKind, SymbolSubKind, TableId,
};
use crate::passes::{walk, Visitor};

pub fn run(arena: &mut Arena, logger: &mut Logger, root: NodeId, legacy_jumps: bool) {
    debug!("symbol resolution (legacy_jumps={legacy_jumps})");

    // fresh root scope with the builtin registry installed
    let root_table = arena.new_table();
    arena.get_mut(root).table = Some(root_table);
    builtins::install(arena, root_table);

    let mut resolver = Resolver {
        root_table,
        pending_jumps: Vec::new(),
        labels: Vec::new(),
        legacy_jumps,
    };

    // global phase: direct children only
    let mut i = 0;
    while i < arena.child_count(root) {
        let child = arena.child(root, i);
        resolver.resolve_global(arena, logger, child);
        i += 1;
    }

    // body phase
    walk(&mut resolver, arena, logger, root);
}

struct Resolver {
    root_table: TableId,
    /// Identifier nodes of jumps awaiting the end of the enclosing body.
    pending_jumps: Vec<NodeId>,
    /// Label identifier nodes of the enclosing body, in source order.
    labels: Vec<NodeId>,
    legacy_jumps: bool,
}

impl Resolver {
    fn fresh_scope(&mut self, arena: &mut Arena, node: NodeId) -> TableId {
        let table = arena.new_table();
        arena.get_mut(node).table = Some(table);
        arena.table_mut(self.root_table).register_descendant(table);
        table
    }

    /// Define `sym` in the innermost scope at `at`; duplicate names in the
    /// same scope are an error except for labels, which stay legal (with a
    /// warning later, in legacy mode).
    fn define(
        &mut self,
        arena: &mut Arena,
        logger: &mut Logger,
        at: NodeId,
        sym: Symbol,
    ) -> Option<crate::symtab::SymbolId> {
        let scope = symtab::nearest_scope(arena, at)?;
        let table = arena.get(scope).table?;
        // labels may repeat (warned about in legacy mode) and duplicate
        // event handlers get their own warning later
        if matches!(
            sym.kind,
            SymbolKind::Variable | SymbolKind::Function | SymbolKind::State
        ) {
            if let Some(prev) = find_in_table(arena, table, &sym.name, None) {
                let prev_sub = arena.symbol(prev).sub;
                if prev_sub != SymbolSubKind::Builtin {
                    logger.error(
                        DiagCode::DuplicateDeclaration,
                        sym.loc,
                        format!("`{}` is already declared in this scope", sym.name),
                    );
                }
            }
        }
        let name = sym.name.clone();
        let sid = arena.new_symbol(sym);
        arena.symbol_mut(sid).table = Some(table);
        arena.table_mut(table).insert(sid);
        debug!("defined {} `{}`", arena.symbol(sid).kind.name(), name);
        Some(sid)
    }

    fn set_ident_symbol(arena: &mut Arena, ident: NodeId, sid: crate::symtab::SymbolId) {
        if let NodeKind::Identifier(i) = &mut arena.get_mut(ident).kind {
            i.symbol = Some(sid);
        }
    }

    /// Look the identifier up through the scope chain and bind it, or report
    /// it undefined.
    fn resolve_ident(
        &mut self,
        arena: &mut Arena,
        logger: &mut Logger,
        ident: NodeId,
        kind: SymbolKind,
    ) {
        let name = match arena.get(ident).ident() {
            Some(i) => i.name.clone(),
            None => return,
        };
        match symtab::lookup(arena, ident, &name, Some(kind)) {
            Some(sid) => {
                Self::set_ident_symbol(arena, ident, sid);
                // identifiers bound to a symbol pick up its declared type
                let ty = arena.symbol(sid).ty;
                arena.get_mut(ident).ty = ty;
            }
            None => {
                let loc = arena.get(ident).loc;
                logger.error(
                    DiagCode::UndefinedSymbol,
                    loc,
                    format!("{} `{}` is undefined", kind.name(), name),
                );
            }
        }
    }

    fn params_of(arena: &Arena, param_list: NodeId) -> Vec<Param> {
        (0..arena.child_count(param_list))
            .map(|i| {
                let p = arena.child(param_list, i);
                Param {
                    name: arena
                        .get(p)
                        .ident()
                        .map(|i| i.name.clone())
                        .unwrap_or_default(),
                    ty: arena.get(p).ty,
                }
            })
            .collect()
    }

    fn define_params(
        &mut self,
        arena: &mut Arena,
        logger: &mut Logger,
        owner: NodeId,
        param_list: NodeId,
        sub: SymbolSubKind,
    ) {
        let mut i = 0;
        while i < arena.child_count(param_list) {
            let p = arena.child(param_list, i);
            let (name, ty, loc) = {
                let node = arena.get(p);
                (
                    node.ident().map(|id| id.name.clone()).unwrap_or_default(),
                    node.ty,
                    node.loc,
                )
            };
            let sym = Symbol::new(name, ty, SymbolKind::Variable, sub, loc);
            if let Some(sid) = self.define(arena, logger, owner, sym) {
                Self::set_ident_symbol(arena, p, sid);
            }
            i += 1;
        }
    }

    // ── global phase ────────────────────────────────────────────────────

    fn resolve_global(&mut self, arena: &mut Arena, logger: &mut Logger, node: NodeId) {
        match arena.get(node).kind.clone() {
            NodeKind::GlobalVariable => {
                // descend into the initializer first, so `string foo = foo;`
                // fails to resolve
                let init = arena.child(node, 1);
                walk(self, arena, logger, init);

                let ident = arena.child(node, 0);
                let (name, ty, loc) = {
                    let n = arena.get(ident);
                    (
                        n.ident().map(|i| i.name.clone()).unwrap_or_default(),
                        n.ty,
                        n.loc,
                    )
                };
                let sym = Symbol::new(name, ty, SymbolKind::Variable, SymbolSubKind::Global, loc)
                    .with_decl(node);
                if let Some(sid) = self.define(arena, logger, node, sym) {
                    Self::set_ident_symbol(arena, ident, sid);
                }
            }
            NodeKind::GlobalFunction => {
                self.fresh_scope(arena, node);
                let ident = arena.child(node, 0);
                let params = Self::params_of(arena, arena.child(node, 1));
                let (name, ty, loc) = {
                    let n = arena.get(ident);
                    (
                        n.ident().map(|i| i.name.clone()).unwrap_or_default(),
                        n.ty,
                        n.loc,
                    )
                };
                // the function's own scope must not hold its name; define in
                // the parent (script) scope and don't descend into the body
                let parent = arena.parent(node).unwrap_or(node);
                let sym = Symbol::new(name, ty, SymbolKind::Function, SymbolSubKind::Global, loc)
                    .with_params(params)
                    .with_decl(node);
                if let Some(sid) = self.define(arena, logger, parent, sym) {
                    Self::set_ident_symbol(arena, ident, sid);
                }
            }
            NodeKind::State { .. } => {
                self.fresh_scope(arena, node);
                let ident = arena.child(node, 0);
                let (name, loc) = {
                    let n = arena.get(ident);
                    (n.ident().map(|i| i.name.clone()).unwrap_or_default(), n.loc)
                };
                let parent = arena.parent(node).unwrap_or(node);
                let sym = Symbol::new(
                    name,
                    crate::types::ScriptType::Null,
                    SymbolKind::State,
                    SymbolSubKind::Global,
                    loc,
                )
                .with_decl(node);
                if let Some(sid) = self.define(arena, logger, parent, sym) {
                    Self::set_ident_symbol(arena, ident, sid);
                }
            }
            _ => {}
        }
    }

    // ── jump fixup ──────────────────────────────────────────────────────

    fn resolve_pending_jumps(&mut self, arena: &mut Arena, logger: &mut Logger) {
        let pending = std::mem::take(&mut self.pending_jumps);
        for ident in pending {
            if !self.legacy_jumps {
                // clean mode: lexical resolution only
                self.resolve_ident(arena, logger, ident, SymbolKind::Label);
                continue;
            }

            // legacy jumps land on the *last* label of that name anywhere in
            // the containing body, crossing scope boundaries
            let name = match arena.get(ident).ident() {
                Some(i) => i.name.clone(),
                None => continue,
            };
            let lexical = symtab::lookup(arena, ident, &name, Some(SymbolKind::Label));
            let target = self.labels.iter().rev().find_map(|&lid| {
                let sid = arena.get(lid).ident().and_then(|i| i.symbol)?;
                (arena.symbol(sid).name == name).then_some(sid)
            });
            match target {
                Some(target) => {
                    if Some(target) != lexical {
                        let loc = arena.get(ident).loc;
                        logger.warn(
                            DiagCode::JumpToWrongLabel,
                            loc,
                            format!("jump targets the last `{name}` label, not the one in scope"),
                        );
                    }
                    Self::set_ident_symbol(arena, ident, target);
                }
                None => {
                    let loc = arena.get(ident).loc;
                    logger.error(
                        DiagCode::UndefinedSymbol,
                        loc,
                        format!("label `{name}` is undefined"),
                    );
                }
            }
        }

        if self.legacy_jumps {
            let mut seen = std::collections::HashSet::new();
            for &lid in &self.labels {
                let Some(name) = arena.get(lid).ident().map(|i| i.name.clone()) else {
                    continue;
                };
                if !seen.insert(name.clone()) {
                    let loc = arena.get(lid).loc;
                    logger.warn(
                        DiagCode::DuplicateLabelName,
                        loc,
                        format!("label `{name}` is declared more than once in this function"),
                    );
                }
            }
        }
        self.labels.clear();
    }
}

impl Visitor for Resolver {
    fn enter(&mut self, arena: &mut Arena, logger: &mut Logger, id: NodeId) -> bool {
        match arena.get(id).kind.clone() {
            // already handled in the global phase
            NodeKind::GlobalVariable => false,
            NodeKind::GlobalFunction => {
                debug_assert!(self.pending_jumps.is_empty());
                let params = arena.child(id, 1);
                self.define_params(arena, logger, id, params, SymbolSubKind::FunctionParameter);
                let body = arena.child(id, 2);
                walk(self, arena, logger, body);
                self.resolve_pending_jumps(arena, logger);
                false
            }
            NodeKind::EventHandler => {
                self.fresh_scope(arena, id);
                let ident = arena.child(id, 0);
                let (name, loc) = {
                    let n = arena.get(ident);
                    (n.ident().map(|i| i.name.clone()).unwrap_or_default(), n.loc)
                };

                match builtins::lookup_event(&name) {
                    None => {
                        logger.error(
                            DiagCode::InvalidEvent,
                            loc,
                            format!("`{name}` is not an event"),
                        );
                    }
                    Some(proto) => {
                        let params = arena.child(id, 1);
                        let got = arena.child_count(params);
                        if got > proto.params.len() {
                            logger.error(
                                DiagCode::TooManyArgumentsEvent,
                                loc,
                                format!("too many parameters for event `{name}`"),
                            );
                        } else if got < proto.params.len() {
                            logger.error(
                                DiagCode::TooFewArgumentsEvent,
                                loc,
                                format!("too few parameters for event `{name}`"),
                            );
                        } else {
                            for (i, &(pname, pty)) in proto.params.iter().enumerate() {
                                let pnode = arena.child(params, i);
                                let declared = arena.get(pnode).ty;
                                if !declared.can_coerce(pty) {
                                    let ploc = arena.get(pnode).loc;
                                    logger.error(
                                        DiagCode::ArgumentWrongTypeEvent,
                                        ploc,
                                        format!(
                                            "parameter {} of `{name}` is `{declared}`, the prototype wants `{pty}` ({pname})",
                                            i + 1
                                        ),
                                    );
                                }
                            }
                        }
                        // bind the handler name in the state's scope
                        let sym = Symbol::new(
                            name,
                            crate::types::ScriptType::Null,
                            SymbolKind::Event,
                            SymbolSubKind::Builtin,
                            loc,
                        )
                        .with_params(
                            proto
                                .params
                                .iter()
                                .map(|&(n, t)| Param {
                                    name: n.to_string(),
                                    ty: t,
                                })
                                .collect(),
                        );
                        let state = arena.parent(id).unwrap_or(id);
                        if let Some(sid) = self.define(arena, logger, state, sym) {
                            Self::set_ident_symbol(arena, ident, sid);
                        }
                    }
                }

                debug_assert!(self.pending_jumps.is_empty());
                let params = arena.child(id, 1);
                self.define_params(arena, logger, id, params, SymbolSubKind::EventParameter);
                let body = arena.child(id, 2);
                walk(self, arena, logger, body);
                self.resolve_pending_jumps(arena, logger);
                false
            }
            NodeKind::Stmt(StmtKind::Compound) => {
                self.fresh_scope(arena, id);
                true
            }
            NodeKind::Stmt(StmtKind::Decl) => {
                // rvalue first, so `string foo = foo;` errors
                let init = arena.child(id, 1);
                walk(self, arena, logger, init);

                let ident = arena.child(id, 0);
                let (name, ty, loc) = {
                    let n = arena.get(ident);
                    (
                        n.ident().map(|i| i.name.clone()).unwrap_or_default(),
                        n.ty,
                        n.loc,
                    )
                };
                let sym = Symbol::new(
                    name.clone(),
                    ty,
                    SymbolKind::Variable,
                    SymbolSubKind::Local,
                    loc,
                )
                .with_decl(id);
                if let Some(sid) = self.define(arena, logger, id, sym) {
                    Self::set_ident_symbol(arena, ident, sid);
                }

                // `if (x) integer y;` has no scope for `y` to live in
                if !arena.get(id).declaration_allowed {
                    let loc = arena.get(id).loc;
                    logger.error(
                        DiagCode::DeclarationInvalidHere,
                        loc,
                        format!("`{name}` cannot be declared here"),
                    );
                }
                false
            }
            NodeKind::Stmt(StmtKind::Label) => {
                let ident = arena.child(id, 0);
                let (name, loc) = {
                    let n = arena.get(ident);
                    (n.ident().map(|i| i.name.clone()).unwrap_or_default(), n.loc)
                };
                let sym = Symbol::new(
                    name,
                    crate::types::ScriptType::Null,
                    SymbolKind::Label,
                    SymbolSubKind::Local,
                    loc,
                );
                if let Some(sid) = self.define(arena, logger, id, sym) {
                    Self::set_ident_symbol(arena, ident, sid);
                }
                self.labels.push(ident);
                false
            }
            NodeKind::Stmt(StmtKind::Jump) => {
                // forward jumps resolve after the body closes
                self.pending_jumps.push(arena.child(id, 0));
                false
            }
            NodeKind::Stmt(StmtKind::StateChange) => {
                let ident = arena.child(id, 0);
                self.resolve_ident(arena, logger, ident, SymbolKind::State);
                false
            }
            NodeKind::Expr(ExprKind::LValue) => {
                let ident = arena.child(id, 0);
                self.resolve_ident(arena, logger, ident, SymbolKind::Variable);
                false
            }
            NodeKind::Expr(ExprKind::Call) => {
                let ident = arena.child(id, 0);
                self.resolve_ident(arena, logger, ident, SymbolKind::Function);
                // arguments still need resolving
                let mut i = 1;
                while i < arena.child_count(id) {
                    let arg = arena.child(id, i);
                    walk(self, arena, logger, arg);
                    i += 1;
                }
                false
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn resolve_src(src: &str, legacy: bool) -> (Arena, Logger, NodeId) {
        let mut arena = Arena::new();
        let mut logger = Logger::new();
        let toks = lex(src, &mut logger);
        let root = parse(toks.tokens, &mut arena, &mut logger).expect("parse");
        run(&mut arena, &mut logger, root, legacy);
        (arena, logger, root)
    }

    #[test]
    fn globals_are_visible_in_bodies() {
        let (_, logger, _) = resolve_src(
            "integer total;\ndefault { state_entry() { total = 3; } }",
            false,
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
    }

    #[test]
    fn functions_are_forward_visible() {
        let (_, logger, _) = resolve_src(
            "f() { g(); }\ng() { f(); }\ndefault { state_entry() { f(); } }",
            false,
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
    }

    #[test]
    fn self_referential_global_initializer_fails() {
        let (_, logger, _) = resolve_src(
            "string foo = foo;\ndefault { state_entry() { } }",
            false,
        );
        assert!(logger.has_code(DiagCode::UndefinedSymbol));
    }

    #[test]
    fn duplicate_declaration_in_scope() {
        let (_, logger, _) = resolve_src(
            "default { state_entry() { integer x; integer x; } }",
            false,
        );
        assert!(logger.has_code(DiagCode::DuplicateDeclaration));
    }

    #[test]
    fn shadowing_in_nested_scope_is_fine() {
        let (_, logger, _) = resolve_src(
            "default { state_entry() { integer x; { integer x; } } }",
            false,
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
    }

    #[test]
    fn declaration_in_single_statement_if_body() {
        let (_, logger, _) = resolve_src(
            "default { state_entry() { if (1) integer x; } }",
            false,
        );
        assert!(logger.has_code(DiagCode::DeclarationInvalidHere));
    }

    #[test]
    fn unknown_event_name() {
        let (_, logger, _) = resolve_src("default { not_an_event() { } }", false);
        assert!(logger.has_code(DiagCode::InvalidEvent));
    }

    #[test]
    fn event_parameter_type_mismatch() {
        let (_, logger, _) = resolve_src("default { touch_start(string s) { } }", false);
        assert!(logger.has_code(DiagCode::ArgumentWrongTypeEvent));
    }

    #[test]
    fn event_arity_mismatch() {
        let (_, logger, _) =
            resolve_src("default { touch_start(integer a, integer b) { } }", false);
        assert!(logger.has_code(DiagCode::TooManyArgumentsEvent));
        let (_, logger, _) = resolve_src("default { touch_start() { } }", false);
        assert!(logger.has_code(DiagCode::TooFewArgumentsEvent));
    }

    #[test]
    fn forward_jump_resolves() {
        let (_, logger, _) = resolve_src(
            "default { state_entry() { jump out; sleep(1.0); @out; } }",
            false,
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
    }

    #[test]
    fn clean_mode_rejects_jump_into_nested_scope() {
        let (_, logger, _) = resolve_src(
            "f() { jump inner; { @inner; } }\ndefault { state_entry() { f(); } }",
            false,
        );
        // `inner` lives in the nested compound's scope; the jump cannot see it
        assert!(logger.has_code(DiagCode::UndefinedSymbol));
    }

    #[test]
    fn legacy_mode_accepts_jump_into_nested_scope() {
        let (_, logger, _) = resolve_src(
            "f() { jump inner; { @inner; } }\ndefault { state_entry() { f(); } }",
            true,
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        assert!(logger.has_code(DiagCode::JumpToWrongLabel));
    }

    #[test]
    fn legacy_mode_retargets_to_last_label() {
        let (_, logger, _) = resolve_src(
            "f() { @l; jump l; { @l; } }\ndefault { state_entry() { f(); } }",
            true,
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        assert!(logger.has_code(DiagCode::JumpToWrongLabel));
        assert!(logger.has_code(DiagCode::DuplicateLabelName));
    }

    #[test]
    fn undefined_variable_reported_once() {
        let (_, logger, _) = resolve_src(
            "default { state_entry() { mystery = 1; } }",
            false,
        );
        assert!(logger.has_code(DiagCode::UndefinedSymbol));
        assert_eq!(logger.errors(), 1);
    }

    #[test]
    fn builtin_constants_resolve() {
        let (_, logger, _) = resolve_src(
            "default { state_entry() { float f = PI; } }",
            false,
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
    }

    #[test]
    fn state_change_targets_resolve() {
        let (_, logger, _) = resolve_src(
            "default { state_entry() { state other; } }\nstate other { state_entry() { } }",
            false,
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
    }
}
