//! The AST arena: every node, symbol and symbol table of one compilation
//! lives here and is released in one step when the arena drops.
//!
//! Nodes are addressed by copyable ids, so parent links and the
//! symbol-table back-references form no ownership cycles. Passes rewrite the
//! tree in place through [`Arena::replace`] / [`Arena::take_child`], which
//! keep the parent/child links consistent; sibling order is positional, so
//! walking children by index stays valid across rewrites of the current
//! child.

use serde::Serialize;

use crate::span::Span;
use crate::symtab::{Symbol, SymbolId, SymbolTable, TableId};
use crate::types::ScriptType;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
}

impl BinOp {
    /// Strip the assignment half of a compound operator; plain `=` maps to
    /// itself, as do non-assignment operators.
    pub fn decoupled(self) -> BinOp {
        match self {
            BinOp::AddAssign => BinOp::Add,
            BinOp::SubAssign => BinOp::Sub,
            BinOp::MulAssign => BinOp::Mul,
            BinOp::DivAssign => BinOp::Div,
            BinOp::ModAssign => BinOp::Mod,
            other => other,
        }
    }

    pub fn is_compound(self) -> bool {
        self != BinOp::Assign && self.decoupled() != self
    }

    /// `=` or any compound form.
    pub fn is_assignment(self) -> bool {
        self == BinOp::Assign || self.is_compound()
    }

    pub fn token(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Leq => "<=",
            BinOp::Gt => ">",
            BinOp::Geq => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Assign => "=",
            BinOp::AddAssign => "+=",
            BinOp::SubAssign => "-=",
            BinOp::MulAssign => "*=",
            BinOp::DivAssign => "/=",
            BinOp::ModAssign => "%=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
    PreIncr,
    PreDecr,
    PostIncr,
    PostDecr,
}

impl UnOp {
    pub fn token(self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "!",
            UnOp::BitNot => "~",
            UnOp::PreIncr | UnOp::PostIncr => "++",
            UnOp::PreDecr | UnOp::PostDecr => "--",
        }
    }

    pub fn is_postfix(self) -> bool {
        matches!(self, UnOp::PostIncr | UnOp::PostDecr)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub symbol: Option<SymbolId>,
}

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtKind {
    /// `{ ... }` — opens a scope.
    Compound,
    /// Bare `;`.
    Nop,
    /// Expression statement; children: `[expr]`.
    Expr,
    /// `return [expr];` children: `[expr | null]`.
    Return,
    /// `@name;` children: `[ident]`.
    Label,
    /// `jump name;` children: `[ident]`.
    Jump,
    /// children: `[cond, then, else | null]`.
    If,
    /// children: `[init expr-list, cond | null, update expr-list, body]`.
    For,
    /// children: `[body, cond]`.
    DoWhile,
    /// children: `[cond, body]`.
    While,
    /// Local declaration; children: `[ident, init | null]`.
    Decl,
    /// `state name;` children: `[ident]`.
    StateChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprKind {
    /// Literal leaf. The value lives in the node's constant slot and is
    /// never invalidated by the fold pass.
    Constant,
    /// Variable reference; children: `[ident, member-ident | null]`.
    LValue,
    Binary(BinOp),
    Unary(UnOp),
    /// `(expr)`; children: `[expr]`.
    Paren,
    /// `(type)expr`; the payload is the target type. children: `[expr]`.
    Typecast(ScriptType),
    /// `<x, y, z>`; children: three exprs.
    VectorLit,
    /// `<x, y, z, s>`; children: four exprs.
    RotationLit,
    /// `[a, b, ...]`.
    ListLit,
    /// children: `[ident, arg*]`.
    Call,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Detached placeholder; also the "no child here" marker.
    Null,
    /// Root; children: globals, functions and states in source order.
    Script,
    /// children: `[ident, init | null]`.
    GlobalVariable,
    /// children: `[ident, param-list, body]`. The return type lives on the
    /// identifier node.
    GlobalFunction,
    /// children: identifiers, each typed with its declared parameter type.
    ParamList,
    /// children: `[ident, handler*]`.
    State { is_default: bool },
    /// children: `[ident, param-list, body]`.
    EventHandler,
    Identifier(Ident),
    /// Comma expression list inside `for` headers.
    ExprList,
    Stmt(StmtKind),
    Expr(ExprKind),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Null => "null",
            NodeKind::Script => "script",
            NodeKind::GlobalVariable => "global variable",
            NodeKind::GlobalFunction => "global function",
            NodeKind::ParamList => "parameter list",
            NodeKind::State { .. } => "state",
            NodeKind::EventHandler => "event handler",
            NodeKind::Identifier(_) => "identifier",
            NodeKind::ExprList => "expression list",
            NodeKind::Stmt(s) => match s {
                StmtKind::Compound => "compound statement",
                StmtKind::Nop => "nop statement",
                StmtKind::Expr => "expression statement",
                StmtKind::Return => "return statement",
                StmtKind::Label => "label",
                StmtKind::Jump => "jump statement",
                StmtKind::If => "if statement",
                StmtKind::For => "for statement",
                StmtKind::DoWhile => "do-while statement",
                StmtKind::While => "while statement",
                StmtKind::Decl => "declaration",
                StmtKind::StateChange => "state change",
            },
            NodeKind::Expr(e) => match e {
                ExprKind::Constant => "constant expression",
                ExprKind::LValue => "lvalue expression",
                ExprKind::Binary(_) => "binary expression",
                ExprKind::Unary(_) => "unary expression",
                ExprKind::Paren => "parenthesis expression",
                ExprKind::Typecast(_) => "typecast expression",
                ExprKind::VectorLit => "vector expression",
                ExprKind::RotationLit => "rotation expression",
                ExprKind::ListLit => "list expression",
                ExprKind::Call => "call expression",
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub loc: Span,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Present on scope-opening nodes only.
    pub table: Option<TableId>,
    pub ty: ScriptType,
    constant: Option<Value>,
    constant_precluded: bool,
    /// Inserted by a pass; never reports source-level diagnostics.
    pub synthesized: bool,
    /// Constant slot survives fold-pass invalidation.
    pub static_value: bool,
    /// False inside single-statement conditional bodies, where a declaration
    /// would have no scope to live in.
    pub declaration_allowed: bool,
}

impl Node {
    fn new(kind: NodeKind, loc: Span) -> Self {
        Self {
            kind,
            loc,
            parent: None,
            children: Vec::new(),
            table: None,
            ty: ScriptType::Null,
            constant: None,
            constant_precluded: false,
            synthesized: false,
            static_value: false,
            declaration_allowed: true,
        }
    }

    pub fn constant(&self) -> Option<&Value> {
        self.constant.as_ref()
    }

    pub fn constant_precluded(&self) -> bool {
        self.constant_precluded
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, NodeKind::Expr(ExprKind::Constant))
    }

    /// The identifier payload, if this node is one.
    pub fn ident(&self) -> Option<&Ident> {
        match &self.kind {
            NodeKind::Identifier(id) => Some(id),
            _ => None,
        }
    }
}

/// Serializable tree-dump record for `--show-tree --json`.
#[derive(Debug, Serialize)]
pub struct DumpNode {
    pub kind: &'static str,
    pub ty: ScriptType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constant: Option<Value>,
    pub children: Vec<DumpNode>,
}

#[derive(Debug, Default)]
pub struct Arena {
    nodes: Vec<Node>,
    symbols: Vec<Symbol>,
    tables: Vec<SymbolTable>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    // ── node allocation and links ───────────────────────────────────────

    pub fn new_node(&mut self, kind: NodeKind, loc: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(kind, loc));
        id
    }

    /// Allocate a node and attach children in order.
    pub fn node(&mut self, kind: NodeKind, loc: Span, children: Vec<NodeId>) -> NodeId {
        let id = self.new_node(kind, loc);
        for c in children {
            self.push_child(id, c);
        }
        id
    }

    pub fn null_node(&mut self) -> NodeId {
        self.new_node(NodeKind::Null, Span::default())
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).parent
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.get(id).children.len()
    }

    pub fn child(&self, id: NodeId, i: usize) -> NodeId {
        self.get(id).children[i]
    }

    pub fn try_child(&self, id: NodeId, i: usize) -> Option<NodeId> {
        self.get(id).children.get(i).copied()
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.get(id).children.clone()
    }

    pub fn push_child(&mut self, parent: NodeId, child: NodeId) {
        self.get_mut(child).parent = Some(parent);
        self.get_mut(parent).children.push(child);
    }

    /// Position of `id` within its parent's children.
    pub fn slot_in_parent(&self, id: NodeId) -> Option<usize> {
        let p = self.parent(id)?;
        self.get(p).children.iter().position(|&c| c == id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let p = self.parent(id)?;
        let i = self.slot_in_parent(id)?;
        self.try_child(p, i + 1)
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let p = self.parent(id)?;
        let i = self.slot_in_parent(id)?;
        if i == 0 {
            None
        } else {
            Some(self.child(p, i - 1))
        }
    }

    /// Replace `old` with `new` in `old`'s parent slot. `old` is detached,
    /// not freed; the arena keeps owning it.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        let parent = self.get(old).parent;
        if let Some(p) = parent {
            let slot = self
                .slot_in_parent(old)
                .expect("parent does not list this child");
            self.get_mut(p).children[slot] = new;
        }
        self.get_mut(old).parent = None;
        self.get_mut(new).parent = parent;
    }

    /// Remove the child at `i`, leaving a fresh null node in its place, and
    /// return the detached child.
    pub fn take_child(&mut self, parent: NodeId, i: usize) -> NodeId {
        let old = self.child(parent, i);
        let placeholder = self.null_node();
        self.get_mut(parent).children[i] = placeholder;
        self.get_mut(placeholder).parent = Some(parent);
        self.get_mut(old).parent = None;
        old
    }

    /// Drop a child entirely, shifting later siblings up. Used by pruning.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        self.get_mut(parent).children.retain(|&c| c != child);
        self.get_mut(child).parent = None;
    }

    /// Deep copy of a subtree, links included. Symbol references inside the
    /// copied identifiers are kept (a clone of an lvalue still names the
    /// same symbol).
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let src = self.get(id).clone();
        let copy = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            ..src
        });
        for i in 0..self.child_count(id) {
            let c = self.child(id, i);
            let cc = self.clone_subtree(c);
            self.push_child(copy, cc);
        }
        copy
    }

    // ── constant slots ──────────────────────────────────────────────────

    pub fn set_constant(&mut self, id: NodeId, v: Option<Value>) {
        let node = self.get_mut(id);
        if v.is_some() {
            node.constant_precluded = false;
        }
        node.constant = v;
    }

    pub fn set_constant_precluded(&mut self, id: NodeId, precluded: bool) {
        let node = self.get_mut(id);
        if precluded {
            node.constant = None;
        }
        node.constant_precluded = precluded;
    }

    // ── symbols and tables ──────────────────────────────────────────────

    pub fn new_symbol(&mut self, sym: Symbol) -> SymbolId {
        let id = SymbolId::from_index(self.symbols.len());
        self.symbols.push(sym);
        id
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn symbol_ids(&self) -> impl Iterator<Item = SymbolId> {
        (0..self.symbols.len()).map(SymbolId::from_index)
    }

    pub fn new_table(&mut self) -> TableId {
        let id = TableId::from_index(self.tables.len());
        self.tables.push(SymbolTable::default());
        id
    }

    pub fn table(&self, id: TableId) -> &SymbolTable {
        &self.tables[id.index()]
    }

    pub fn table_mut(&mut self, id: TableId) -> &mut SymbolTable {
        &mut self.tables[id.index()]
    }

    /// Resolved symbol of the identifier child at `slot`, if any.
    pub fn ident_symbol(&self, parent: NodeId, slot: usize) -> Option<SymbolId> {
        let id = self.try_child(parent, slot)?;
        self.get(id).ident().and_then(|i| i.symbol)
    }

    // ── structural checks and dumping ───────────────────────────────────

    /// Verify the parent/child invariants over the subtree at `root`.
    pub fn verify_links(&self, root: NodeId) -> bool {
        let node = self.get(root);
        for &c in &node.children {
            if self.get(c).parent != Some(root) {
                return false;
            }
            if !self.verify_links(c) {
                return false;
            }
        }
        true
    }

    pub fn dump(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.dump_into(id, 0, &mut out);
        out
    }

    fn dump_into(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.get(id);
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(node.kind.name());
        if let Some(ident) = node.ident() {
            out.push_str(&format!(" `{}`", ident.name));
        }
        if node.ty != ScriptType::Null {
            out.push_str(&format!(" [{}]", node.ty));
        }
        if let Some(cv) = node.constant() {
            out.push_str(&format!(" = {cv:?}"));
        }
        out.push('\n');
        for &c in &node.children {
            self.dump_into(c, depth + 1, out);
        }
    }

    pub fn dump_record(&self, id: NodeId) -> DumpNode {
        let node = self.get(id);
        DumpNode {
            kind: node.kind.name(),
            ty: node.ty,
            name: node.ident().map(|i| i.name.clone()),
            constant: node.constant.clone(),
            children: node.children.iter().map(|&c| self.dump_record(c)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_lit(arena: &mut Arena, v: i32) -> NodeId {
        let id = arena.new_node(NodeKind::Expr(ExprKind::Constant), Span::at(1, 1));
        arena.set_constant(id, Some(Value::Integer(v)));
        id
    }

    #[test]
    fn replace_preserves_links() {
        let mut arena = Arena::new();
        let a = int_lit(&mut arena, 1);
        let b = int_lit(&mut arena, 2);
        let parent = arena.node(
            NodeKind::Expr(ExprKind::Binary(BinOp::Add)),
            Span::at(1, 1),
            vec![a, b],
        );
        let c = int_lit(&mut arena, 3);
        arena.replace(b, c);
        assert_eq!(arena.child(parent, 1), c);
        assert_eq!(arena.parent(c), Some(parent));
        assert_eq!(arena.parent(b), None);
        assert!(arena.verify_links(parent));
    }

    #[test]
    fn take_child_leaves_null_placeholder() {
        let mut arena = Arena::new();
        let a = int_lit(&mut arena, 1);
        let parent = arena.node(NodeKind::Stmt(StmtKind::Return), Span::at(1, 1), vec![a]);
        let taken = arena.take_child(parent, 0);
        assert_eq!(taken, a);
        assert_eq!(arena.parent(a), None);
        assert!(matches!(arena.get(arena.child(parent, 0)).kind, NodeKind::Null));
        assert!(arena.verify_links(parent));
    }

    #[test]
    fn clone_subtree_is_deep() {
        let mut arena = Arena::new();
        let a = int_lit(&mut arena, 1);
        let b = int_lit(&mut arena, 2);
        let add = arena.node(
            NodeKind::Expr(ExprKind::Binary(BinOp::Add)),
            Span::at(1, 1),
            vec![a, b],
        );
        let copy = arena.clone_subtree(add);
        assert_ne!(copy, add);
        assert_eq!(arena.child_count(copy), 2);
        assert_ne!(arena.child(copy, 0), a);
        assert_eq!(
            arena.get(arena.child(copy, 0)).constant(),
            Some(&Value::Integer(1))
        );
        assert!(arena.verify_links(copy));
    }

    #[test]
    fn constant_slot_invariants() {
        let mut arena = Arena::new();
        let n = arena.new_node(NodeKind::Expr(ExprKind::Binary(BinOp::Add)), Span::at(1, 1));
        arena.set_constant_precluded(n, true);
        assert!(arena.get(n).constant_precluded());
        assert!(arena.get(n).constant().is_none());
        arena.set_constant(n, Some(Value::Integer(7)));
        assert!(!arena.get(n).constant_precluded(), "setting a value clears precluded");
        arena.set_constant_precluded(n, true);
        assert!(arena.get(n).constant().is_none(), "precluding clears the value");
    }

    #[test]
    fn sibling_queries_are_consistent() {
        let mut arena = Arena::new();
        let a = int_lit(&mut arena, 1);
        let b = int_lit(&mut arena, 2);
        let c = int_lit(&mut arena, 3);
        let parent = arena.node(NodeKind::ExprList, Span::at(1, 1), vec![a, b, c]);
        assert_eq!(arena.next_sibling(a), Some(b));
        assert_eq!(arena.prev_sibling(b), Some(a));
        assert_eq!(arena.next_sibling(c), None);
        assert_eq!(arena.prev_sibling(a), None);
        assert_eq!(arena.parent(b), Some(parent));
    }
}
