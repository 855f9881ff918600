//! Symbols and scope tables.
//!
//! A scope stack is implicit in the AST: looking a name up at a node walks
//! that node's ancestors and consults each scope-opening ancestor's table,
//! ending at the script root whose table also holds the builtins. Tables are
//! insertion-ordered multimaps — duplicate names are representable (labels
//! need them) and mangling depends on the declaration order being
//! reconstructible.

use crate::ast::{Arena, NodeId};
use crate::span::Span;
use crate::types::ScriptType;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(u32);

impl SymbolId {
    pub fn from_index(i: usize) -> Self {
        Self(i as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(u32);

impl TableId {
    pub fn from_index(i: usize) -> Self {
        Self(i as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
    State,
    Label,
    Event,
}

impl SymbolKind {
    pub fn name(self) -> &'static str {
        match self {
            SymbolKind::Variable => "variable",
            SymbolKind::Function => "function",
            SymbolKind::State => "state",
            SymbolKind::Label => "label",
            SymbolKind::Event => "event",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolSubKind {
    Local,
    Global,
    Builtin,
    FunctionParameter,
    EventParameter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: ScriptType,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub ty: ScriptType,
    pub kind: SymbolKind,
    pub sub: SymbolSubKind,
    pub loc: Span,
    /// Declared parameters, for functions and events.
    pub params: Option<Vec<Param>>,
    /// Declaration node back-link, for variables and functions.
    pub decl: Option<NodeId>,
    /// Table this symbol was defined into.
    pub table: Option<TableId>,
    pub constant: Option<Value>,
    pub constant_precluded: bool,
    pub references: u32,
    pub assignments: u32,
    pub mangled: Option<String>,
}

impl Symbol {
    pub fn new(
        name: impl Into<String>,
        ty: ScriptType,
        kind: SymbolKind,
        sub: SymbolSubKind,
        loc: Span,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            kind,
            sub,
            loc,
            params: None,
            decl: None,
            table: None,
            constant: None,
            constant_precluded: false,
            references: 0,
            assignments: 0,
            mangled: None,
        }
    }

    pub fn with_params(mut self, params: Vec<Param>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_decl(mut self, decl: NodeId) -> Self {
        self.decl = Some(decl);
        self
    }

    pub fn with_constant(mut self, v: Value) -> Self {
        self.constant = Some(v);
        self
    }

    pub fn reset_tracking(&mut self) {
        self.references = 0;
        self.assignments = 0;
    }
}

/// One scope's symbols, in definition order. Case-sensitive; duplicates are
/// representable and reported by the resolution pass as it defines them.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: Vec<SymbolId>,
    /// Populated on the root table only, in creation order, so the root can
    /// walk every scope for reference accounting and mangling.
    descendants: Vec<TableId>,
}

impl SymbolTable {
    pub fn insert(&mut self, sym: SymbolId) {
        self.entries.push(sym);
    }

    pub fn remove(&mut self, sym: SymbolId) {
        self.entries.retain(|&s| s != sym);
    }

    pub fn symbols(&self) -> &[SymbolId] {
        &self.entries
    }

    pub fn register_descendant(&mut self, table: TableId) {
        self.descendants.push(table);
    }

    pub fn descendants(&self) -> &[TableId] {
        &self.descendants
    }
}

/// Find `name` in one table, newest entry first (shadowing within a scope is
/// not legal, but label duplicates resolve to the latest definition).
pub fn find_in_table(
    arena: &Arena,
    table: TableId,
    name: &str,
    kind: Option<SymbolKind>,
) -> Option<SymbolId> {
    arena
        .table(table)
        .symbols()
        .iter()
        .rev()
        .copied()
        .find(|&sid| {
            let sym = arena.symbol(sid);
            sym.name == name && kind.map_or(true, |k| sym.kind == k)
        })
}

/// Hierarchical lookup starting at `at` and walking outward through
/// scope-opening ancestors; the root table (builtins included) is consulted
/// last.
pub fn lookup(arena: &Arena, at: NodeId, name: &str, kind: Option<SymbolKind>) -> Option<SymbolId> {
    let mut cursor = Some(at);
    while let Some(node) = cursor {
        if let Some(table) = arena.get(node).table {
            if let Some(found) = find_in_table(arena, table, name, kind) {
                return Some(found);
            }
        }
        cursor = arena.parent(node);
    }
    None
}

/// The innermost scope-opening node at or above `at`.
pub fn nearest_scope(arena: &Arena, at: NodeId) -> Option<NodeId> {
    let mut cursor = Some(at);
    while let Some(node) = cursor {
        if arena.get(node).table.is_some() {
            return Some(node);
        }
        cursor = arena.parent(node);
    }
    None
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MangleOptions {
    pub globals: bool,
    pub locals: bool,
    pub functions: bool,
}

impl MangleOptions {
    pub fn any(self) -> bool {
        self.globals || self.locals || self.functions
    }
}

/// Assign short alphabet-encoded replacement names in declaration order:
/// root-table symbols first, then each descendant scope in creation order.
/// Candidates that collide with a surviving (unmangled or builtin) name are
/// skipped, so the output never captures an existing identifier.
pub fn set_mangled_names(arena: &mut Arena, root: TableId, opts: MangleOptions) {
    if !opts.any() {
        return;
    }

    let wants = |arena: &Arena, sid: SymbolId| -> bool {
        let sym = arena.symbol(sid);
        if sym.sub == SymbolSubKind::Builtin {
            return false;
        }
        match sym.kind {
            SymbolKind::Function => opts.functions,
            SymbolKind::Variable => match sym.sub {
                SymbolSubKind::Global => opts.globals,
                SymbolSubKind::Local
                | SymbolSubKind::FunctionParameter
                | SymbolSubKind::EventParameter => opts.locals,
                SymbolSubKind::Builtin => false,
            },
            // states, labels and events keep their names: the VM addresses
            // states by name and labels are function-internal anyway
            _ => false,
        }
    };

    let mut tables = vec![root];
    tables.extend_from_slice(arena.table(root).descendants());

    let mut ordered = Vec::new();
    let mut kept = std::collections::HashSet::new();
    for &t in &tables {
        for &sid in arena.table(t).symbols() {
            if wants(arena, sid) {
                ordered.push(sid);
            } else {
                kept.insert(arena.symbol(sid).name.clone());
            }
        }
    }

    let mut stream = 0usize;
    for sid in ordered {
        let prefix = match arena.symbol(sid).sub {
            SymbolSubKind::Global => "g",
            _ if arena.symbol(sid).kind == SymbolKind::Function => "g",
            _ => "l",
        };
        loop {
            let candidate = format!("{prefix}{}", alphabet_encode(stream));
            stream += 1;
            if !kept.contains(&candidate) {
                arena.symbol_mut(sid).mangled = Some(candidate);
                break;
            }
        }
    }
}

/// 0 -> "a", 25 -> "z", 26 -> "aa", ...
fn alphabet_encode(mut n: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'a' + (n % 26) as u8);
        n /= 26;
        if n == 0 {
            break;
        }
        n -= 1;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{NodeKind, StmtKind};

    #[test]
    fn alphabet_encoding_rolls_over() {
        assert_eq!(alphabet_encode(0), "a");
        assert_eq!(alphabet_encode(25), "z");
        assert_eq!(alphabet_encode(26), "aa");
        assert_eq!(alphabet_encode(27), "ab");
        assert_eq!(alphabet_encode(26 + 26 * 26), "aaa");
    }

    #[test]
    fn lookup_walks_outward() {
        let mut arena = Arena::new();
        let root = arena.new_node(NodeKind::Script, Span::at(1, 1));
        let inner = arena.new_node(NodeKind::Stmt(StmtKind::Compound), Span::at(2, 1));
        arena.push_child(root, inner);

        let root_table = arena.new_table();
        arena.get_mut(root).table = Some(root_table);
        let inner_table = arena.new_table();
        arena.get_mut(inner).table = Some(inner_table);

        let global = arena.new_symbol(Symbol::new(
            "x",
            ScriptType::Integer,
            SymbolKind::Variable,
            SymbolSubKind::Global,
            Span::at(1, 1),
        ));
        arena.table_mut(root_table).insert(global);
        let local = arena.new_symbol(Symbol::new(
            "x",
            ScriptType::Float,
            SymbolKind::Variable,
            SymbolSubKind::Local,
            Span::at(2, 5),
        ));
        arena.table_mut(inner_table).insert(local);

        assert_eq!(lookup(&arena, inner, "x", None), Some(local));
        assert_eq!(lookup(&arena, root, "x", None), Some(global));
        assert_eq!(lookup(&arena, inner, "y", None), None);
    }

    #[test]
    fn kind_filter_skips_mismatches() {
        let mut arena = Arena::new();
        let root = arena.new_node(NodeKind::Script, Span::at(1, 1));
        let table = arena.new_table();
        arena.get_mut(root).table = Some(table);
        let f = arena.new_symbol(Symbol::new(
            "go",
            ScriptType::Null,
            SymbolKind::Function,
            SymbolSubKind::Global,
            Span::at(1, 1),
        ));
        arena.table_mut(table).insert(f);
        assert_eq!(lookup(&arena, root, "go", Some(SymbolKind::Variable)), None);
        assert_eq!(lookup(&arena, root, "go", Some(SymbolKind::Function)), Some(f));
    }

    #[test]
    fn mangling_is_declaration_ordered_and_collision_free() {
        let mut arena = Arena::new();
        let root_table = arena.new_table();
        // a builtin that must keep its name, two globals, one named `ga`
        // already taken by an unmangled symbol kind (a state)
        let b = arena.new_symbol(Symbol::new(
            "sqrt",
            ScriptType::Float,
            SymbolKind::Function,
            SymbolSubKind::Builtin,
            Span::default(),
        ));
        let g1 = arena.new_symbol(Symbol::new(
            "speed",
            ScriptType::Float,
            SymbolKind::Variable,
            SymbolSubKind::Global,
            Span::at(1, 1),
        ));
        let st = arena.new_symbol(Symbol::new(
            "ga",
            ScriptType::Null,
            SymbolKind::State,
            SymbolSubKind::Global,
            Span::at(2, 1),
        ));
        let g2 = arena.new_symbol(Symbol::new(
            "count",
            ScriptType::Integer,
            SymbolKind::Variable,
            SymbolSubKind::Global,
            Span::at(3, 1),
        ));
        for s in [b, g1, st, g2] {
            arena.table_mut(root_table).insert(s);
        }

        set_mangled_names(
            &mut arena,
            root_table,
            MangleOptions {
                globals: true,
                locals: true,
                functions: true,
            },
        );

        assert_eq!(arena.symbol(b).mangled, None, "builtins are never mangled");
        // declaration order: `speed` would take `ga`, but that name is held
        // by the (unmangled) state symbol, so the stream skips to `gb`
        assert_eq!(arena.symbol(g1).mangled.as_deref(), Some("gb"));
        assert_eq!(arena.symbol(g2).mangled.as_deref(), Some("gc"));
    }
}
