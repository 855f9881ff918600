//! Big-endian stack-VM image emitter.
//!
//! Consumes the finished AST: every expression carries a resolved type,
//! constant-expression leaves serialize from the heap, and vector/rotation
//! expressions always serialize componentwise even when their value is
//! statically known. Vectors are written `z,y,x` and rotations `s,z,y,x`,
//! matching the legacy VM's layout.

use crate::ast::{Arena, BinOp, ExprKind, NodeId, NodeKind, StmtKind, UnOp};
use crate::builtins;
use crate::symtab::{SymbolId, SymbolSubKind};
use crate::types::ScriptType;
use crate::value::Value;

pub const MAGIC: [u8; 4] = *b"SLBC";
pub const VERSION: u16 = 2;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Nop = 0x00,
    /// u32 heap index.
    PushConst = 0x01,
    /// u32 global frame offset.
    PushGlobal = 0x02,
    /// u16 local slot.
    PushLocal = 0x03,
    /// u32 offset; pops the stored value.
    StoreGlobal = 0x04,
    /// u16 slot; pops the stored value.
    StoreLocal = 0x05,
    /// u32 offset + u8 axis.
    StoreGlobalMember = 0x06,
    /// u16 slot + u8 axis.
    StoreLocalMember = 0x07,
    Dup = 0x08,
    Pop = 0x09,
    /// u8 axis; replaces a vector/rotation on the stack with one component.
    Member = 0x0A,

    /// Binary operators carry a packed operand-type byte; `int * float`
    /// keeps its integer result through the typed dispatch, which is why
    /// the compound form needs no separate rewrite.
    Add = 0x10,
    Sub = 0x11,
    Mul = 0x12,
    Div = 0x13,
    Mod = 0x14,
    Eq = 0x15,
    Neq = 0x16,
    Lt = 0x17,
    Leq = 0x18,
    Gt = 0x19,
    Geq = 0x1A,
    BitAnd = 0x1B,
    BitOr = 0x1C,
    BitXor = 0x1D,
    Shl = 0x1E,
    Shr = 0x1F,
    BoolAnd = 0x20,
    BoolOr = 0x21,

    Neg = 0x30,
    BoolNot = 0x31,
    BitNot = 0x32,
    /// u8 target type.
    Cast = 0x33,

    BuildVector = 0x38,
    BuildRotation = 0x39,
    /// u16 element count.
    BuildList = 0x3A,

    /// u32 absolute offset within the current code block.
    Jump = 0x40,
    /// u32 absolute offset; pops the condition.
    JumpIfFalse = 0x41,
    /// u16 function table index.
    Call = 0x42,
    /// u16 builtin table index.
    CallBuiltin = 0x43,
    Return = 0x44,
    /// u16 state table index.
    StateChange = 0x45,
}

fn type_tag(ty: ScriptType) -> u8 {
    match ty {
        ScriptType::Null => 0,
        ScriptType::Integer => 1,
        ScriptType::Float => 2,
        ScriptType::Str => 3,
        ScriptType::Key => 4,
        ScriptType::Vector => 5,
        ScriptType::Rotation => 6,
        ScriptType::List => 7,
        ScriptType::Error => 8,
    }
}

fn frame_size(ty: ScriptType) -> u32 {
    match ty {
        ScriptType::Vector => 12,
        ScriptType::Rotation => 16,
        // scalars and heap references
        _ => 4,
    }
}

fn axis_index(member: &str) -> u8 {
    match member {
        "x" => 0,
        "y" => 1,
        "z" => 2,
        _ => 3,
    }
}

// ── big-endian writer ───────────────────────────────────────────────────

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn str16(&mut self, s: &str) {
        self.u16(s.len() as u16);
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn op(&mut self, op: Op) {
        self.buf.push(op as u8);
    }

    fn len(&self) -> usize {
        self.buf.len()
    }

    /// Reserve a u32 slot and return its position for later patching.
    fn reserve_u32(&mut self) -> usize {
        let at = self.buf.len();
        self.u32(0);
        at
    }

    fn patch_u32(&mut self, at: usize, v: u32) {
        self.buf[at..at + 4].copy_from_slice(&v.to_be_bytes());
    }
}

// ── heap ────────────────────────────────────────────────────────────────

/// Typed constant pool. Each entry serializes with a type/size header; a
/// structurally equal value is stored once.
#[derive(Default)]
struct Heap {
    values: Vec<Value>,
}

impl Heap {
    fn intern(&mut self, v: &Value) -> u32 {
        if let Some(i) = self.values.iter().position(|x| x == v) {
            return i as u32;
        }
        self.values.push(v.clone());
        (self.values.len() - 1) as u32
    }

    fn serialize(&self) -> Writer {
        let mut w = Writer::default();
        w.u32(self.values.len() as u32);
        for v in &self.values {
            Self::entry(&mut w, v);
        }
        w
    }

    fn entry(w: &mut Writer, v: &Value) {
        let mut payload = Writer::default();
        match v {
            Value::Integer(i) => payload.i32(*i),
            Value::Float(f) => payload.f32(*f),
            Value::Str(s) | Value::Key(s) => {
                payload.buf.extend_from_slice(s.as_bytes());
                payload.u8(0);
            }
            Value::Vector(vec) => {
                // reverse component order
                payload.f32(vec.z);
                payload.f32(vec.y);
                payload.f32(vec.x);
            }
            Value::Rotation(q) => {
                payload.f32(q.s);
                payload.f32(q.z);
                payload.f32(q.y);
                payload.f32(q.x);
            }
            Value::List(items) => {
                payload.u32(items.len() as u32);
                for item in items {
                    Self::entry(&mut payload, item);
                }
            }
        }
        w.u8(type_tag(v.type_of()));
        w.u32(payload.buf.len() as u32);
        w.buf.extend_from_slice(&payload.buf);
    }
}

// ── emitter ─────────────────────────────────────────────────────────────

pub fn emit(arena: &Arena, root: NodeId) -> Vec<u8> {
    Emitter::new(arena, root).emit()
}

struct Emitter<'a> {
    arena: &'a Arena,
    root: NodeId,
    heap: Heap,
    global_offsets: Vec<(SymbolId, u32)>,
    functions: Vec<NodeId>,
    states: Vec<NodeId>,
}

impl<'a> Emitter<'a> {
    fn new(arena: &'a Arena, root: NodeId) -> Self {
        let mut functions = Vec::new();
        let mut states = Vec::new();
        for i in 0..arena.child_count(root) {
            let child = arena.child(root, i);
            match arena.get(child).kind {
                NodeKind::GlobalFunction => functions.push(child),
                NodeKind::State { .. } => states.push(child),
                _ => {}
            }
        }
        Self {
            arena,
            root,
            heap: Heap::default(),
            global_offsets: Vec::new(),
            functions,
            states,
        }
    }

    fn emit(mut self) -> Vec<u8> {
        let globals = self.emit_globals();
        let functions = self.emit_functions();
        let states = self.emit_states();
        let heap = self.heap.serialize();

        let mut out = Writer::default();
        out.buf.extend_from_slice(&MAGIC);
        out.u16(VERSION);
        out.u16(0); // reserved flags
        out.buf.extend_from_slice(&globals.buf);
        out.buf.extend_from_slice(&functions.buf);
        out.buf.extend_from_slice(&states.buf);
        out.buf.extend_from_slice(&heap.buf);
        out.buf
    }

    // globals section: type, frame offset, initial heap value
    fn emit_globals(&mut self) -> Writer {
        let mut entries = Vec::new();
        let mut offset = 0u32;
        for i in 0..self.arena.child_count(self.root) {
            let child = self.arena.child(self.root, i);
            if !matches!(self.arena.get(child).kind, NodeKind::GlobalVariable) {
                continue;
            }
            let Some(sid) = self.arena.ident_symbol(child, 0) else {
                continue;
            };
            let ty = self.arena.symbol(sid).ty;
            let init = self.arena.child(child, 1);
            let heap_index = self
                .arena
                .get(init)
                .constant()
                .map(|v| self.heap.intern(v))
                .unwrap_or(u32::MAX);
            entries.push((ty, offset, heap_index));
            self.global_offsets.push((sid, offset));
            offset += frame_size(ty);
        }

        let mut w = Writer::default();
        w.u16(entries.len() as u16);
        for (ty, offset, heap_index) in entries {
            w.u8(type_tag(ty));
            w.u32(offset);
            w.u32(heap_index);
        }
        w
    }

    fn emit_functions(&mut self) -> Writer {
        let mut w = Writer::default();
        w.u16(self.functions.len() as u16);
        for i in 0..self.functions.len() {
            let f = self.functions[i];
            let ident = self.arena.child(f, 0);
            let name = self.wire_name(ident);
            let ret = self.arena.get(ident).ty;
            let params = self.arena.child(f, 1);

            w.str16(&name);
            w.u8(type_tag(ret));
            w.u8(self.arena.child_count(params) as u8);
            for p in 0..self.arena.child_count(params) {
                w.u8(type_tag(self.arena.get(self.arena.child(params, p)).ty));
            }

            let code = self.emit_body(f);
            w.u32(code.buf.len() as u32);
            w.buf.extend_from_slice(&code.buf);
        }
        w
    }

    fn emit_states(&mut self) -> Writer {
        let mut w = Writer::default();
        w.u16(self.states.len() as u16);
        for i in 0..self.states.len() {
            let s = self.states[i];
            let name = self.wire_name(self.arena.child(s, 0));
            w.str16(&name);
            let handlers: Vec<NodeId> = (1..self.arena.child_count(s))
                .map(|h| self.arena.child(s, h))
                .filter(|&h| matches!(self.arena.get(h).kind, NodeKind::EventHandler))
                .collect();
            w.u16(handlers.len() as u16);
            for h in handlers {
                let ev_name = self
                    .arena
                    .get(self.arena.child(h, 0))
                    .ident()
                    .map(|i| i.name.clone())
                    .unwrap_or_default();
                let ev = builtins::event_index(&ev_name).unwrap_or(0xFF) as u8;
                w.u8(ev);
                w.u8(self.arena.child_count(self.arena.child(h, 1)) as u8);
                let code = self.emit_body(h);
                w.u32(code.buf.len() as u32);
                w.buf.extend_from_slice(&code.buf);
            }
        }
        w
    }

    fn wire_name(&self, ident: NodeId) -> String {
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

    /// Compile one function or handler body (children: ident, params, body).
    fn emit_body(&mut self, owner: NodeId) -> Writer {
        let mut ctx = BodyCtx {
            code: Writer::default(),
            locals: Vec::new(),
            labels: Vec::new(),
            pending_jumps: Vec::new(),
        };
        // parameters take the first slots
        let params = self.arena.child(owner, 1);
        for p in 0..self.arena.child_count(params) {
            if let Some(sid) = self.arena.ident_symbol(params, p) {
                ctx.locals.push(sid);
            }
        }
        let body = self.arena.child(owner, 2);
        self.stmt(&mut ctx, body);
        ctx.code.op(Op::Return);

        // user labels may be jumped to from before their definition
        for (at, name) in std::mem::take(&mut ctx.pending_jumps) {
            let target = ctx
                .labels
                .iter()
                .rev()
                .find(|(n, _)| *n == name)
                .map(|&(_, off)| off)
                .unwrap_or(0);
            ctx.code.patch_u32(at, target);
        }
        ctx.code
    }

    fn stmt(&mut self, ctx: &mut BodyCtx, id: NodeId) {
        match self.arena.get(id).kind.clone() {
            NodeKind::Stmt(StmtKind::Compound) => {
                for i in 0..self.arena.child_count(id) {
                    self.stmt(ctx, self.arena.child(id, i));
                }
            }
            NodeKind::Stmt(StmtKind::Nop) | NodeKind::Null => {}
            NodeKind::Stmt(StmtKind::Expr) => {
                let e = self.arena.child(id, 0);
                self.expr(ctx, e);
                if self.arena.get(e).ty != ScriptType::Null {
                    ctx.code.op(Op::Pop);
                }
            }
            NodeKind::Stmt(StmtKind::Decl) => {
                if let Some(sid) = self.arena.ident_symbol(id, 0) {
                    ctx.locals.push(sid);
                    let slot = (ctx.locals.len() - 1) as u16;
                    let init = self.arena.child(id, 1);
                    if !matches!(self.arena.get(init).kind, NodeKind::Null) {
                        self.expr(ctx, init);
                        ctx.code.op(Op::StoreLocal);
                        ctx.code.u16(slot);
                    }
                }
            }
            NodeKind::Stmt(StmtKind::Return) => {
                let value = self.arena.child(id, 0);
                if !matches!(self.arena.get(value).kind, NodeKind::Null) {
                    self.expr(ctx, value);
                }
                ctx.code.op(Op::Return);
            }
            NodeKind::Stmt(StmtKind::Label) => {
                let name = self.ident_name(id);
                let off = ctx.code.len() as u32;
                ctx.labels.push((name, off));
            }
            NodeKind::Stmt(StmtKind::Jump) => {
                let name = self.ident_name(id);
                ctx.code.op(Op::Jump);
                let at = ctx.code.reserve_u32();
                ctx.pending_jumps.push((at, name));
            }
            NodeKind::Stmt(StmtKind::StateChange) => {
                let name = self.ident_name(id);
                let index = self
                    .states
                    .iter()
                    .position(|&s| {
                        self.arena
                            .get(self.arena.child(s, 0))
                            .ident()
                            .map(|i| i.name == name)
                            .unwrap_or(false)
                    })
                    .unwrap_or(0);
                ctx.code.op(Op::StateChange);
                ctx.code.u16(index as u16);
            }
            NodeKind::Stmt(StmtKind::If) => {
                self.expr(ctx, self.arena.child(id, 0));
                ctx.code.op(Op::JumpIfFalse);
                let to_else = ctx.code.reserve_u32();
                self.stmt(ctx, self.arena.child(id, 1));
                let els = self.arena.child(id, 2);
                if matches!(self.arena.get(els).kind, NodeKind::Null) {
                    let end = ctx.code.len() as u32;
                    ctx.code.patch_u32(to_else, end);
                } else {
                    ctx.code.op(Op::Jump);
                    let to_end = ctx.code.reserve_u32();
                    let else_at = ctx.code.len() as u32;
                    ctx.code.patch_u32(to_else, else_at);
                    self.stmt(ctx, els);
                    let end = ctx.code.len() as u32;
                    ctx.code.patch_u32(to_end, end);
                }
            }
            NodeKind::Stmt(StmtKind::While) => {
                let top = ctx.code.len() as u32;
                self.expr(ctx, self.arena.child(id, 0));
                ctx.code.op(Op::JumpIfFalse);
                let out = ctx.code.reserve_u32();
                self.stmt(ctx, self.arena.child(id, 1));
                ctx.code.op(Op::Jump);
                ctx.code.u32(top);
                let end = ctx.code.len() as u32;
                ctx.code.patch_u32(out, end);
            }
            NodeKind::Stmt(StmtKind::DoWhile) => {
                let top = ctx.code.len() as u32;
                self.stmt(ctx, self.arena.child(id, 0));
                self.expr(ctx, self.arena.child(id, 1));
                // loop while the condition holds: invert with BoolNot + JumpIfFalse
                ctx.code.op(Op::BoolNot);
                ctx.code.op(Op::JumpIfFalse);
                ctx.code.u32(top);
            }
            NodeKind::Stmt(StmtKind::For) => {
                let init = self.arena.child(id, 0);
                for i in 0..self.arena.child_count(init) {
                    let e = self.arena.child(init, i);
                    self.expr(ctx, e);
                    if self.arena.get(e).ty != ScriptType::Null {
                        ctx.code.op(Op::Pop);
                    }
                }
                let top = ctx.code.len() as u32;
                let cond = self.arena.child(id, 1);
                let out = if matches!(self.arena.get(cond).kind, NodeKind::Null) {
                    None
                } else {
                    self.expr(ctx, cond);
                    ctx.code.op(Op::JumpIfFalse);
                    Some(ctx.code.reserve_u32())
                };
                self.stmt(ctx, self.arena.child(id, 3));
                let update = self.arena.child(id, 2);
                for i in 0..self.arena.child_count(update) {
                    let e = self.arena.child(update, i);
                    self.expr(ctx, e);
                    if self.arena.get(e).ty != ScriptType::Null {
                        ctx.code.op(Op::Pop);
                    }
                }
                ctx.code.op(Op::Jump);
                ctx.code.u32(top);
                if let Some(out) = out {
                    let end = ctx.code.len() as u32;
                    ctx.code.patch_u32(out, end);
                }
            }
            _ => {}
        }
    }

    fn ident_name(&self, parent: NodeId) -> String {
        self.arena
            .get(self.arena.child(parent, 0))
            .ident()
            .map(|i| i.name.clone())
            .unwrap_or_default()
    }

    fn expr(&mut self, ctx: &mut BodyCtx, id: NodeId) {
        match self.arena.get(id).kind.clone() {
            NodeKind::Expr(ExprKind::Constant) => {
                if let Some(v) = self.arena.get(id).constant() {
                    let idx = self.heap.intern(&v.clone());
                    ctx.code.op(Op::PushConst);
                    ctx.code.u32(idx);
                }
            }
            NodeKind::Expr(ExprKind::Paren) => self.expr(ctx, self.arena.child(id, 0)),
            NodeKind::Expr(ExprKind::LValue) => {
                self.load_lvalue(ctx, id);
            }
            NodeKind::Expr(ExprKind::Binary(op)) => self.binary(ctx, id, op),
            NodeKind::Expr(ExprKind::Unary(op)) => self.unary(ctx, id, op),
            NodeKind::Expr(ExprKind::Typecast(target)) => {
                self.expr(ctx, self.arena.child(id, 0));
                ctx.code.op(Op::Cast);
                ctx.code.u8(type_tag(target));
            }
            NodeKind::Expr(ExprKind::VectorLit) => {
                for i in 0..self.arena.child_count(id) {
                    self.expr(ctx, self.arena.child(id, i));
                }
                ctx.code.op(Op::BuildVector);
            }
            NodeKind::Expr(ExprKind::RotationLit) => {
                for i in 0..self.arena.child_count(id) {
                    self.expr(ctx, self.arena.child(id, i));
                }
                ctx.code.op(Op::BuildRotation);
            }
            NodeKind::Expr(ExprKind::ListLit) => {
                let count = self.arena.child_count(id);
                for i in 0..count {
                    self.expr(ctx, self.arena.child(id, i));
                }
                ctx.code.op(Op::BuildList);
                ctx.code.u16(count as u16);
            }
            NodeKind::Expr(ExprKind::Call) => {
                for i in 1..self.arena.child_count(id) {
                    self.expr(ctx, self.arena.child(id, i));
                }
                let Some(sid) = self.arena.ident_symbol(id, 0) else {
                    return;
                };
                let sym = self.arena.symbol(sid);
                if sym.sub == SymbolSubKind::Builtin {
                    let index = builtins::FUNCTIONS
                        .iter()
                        .position(|f| f.name == sym.name)
                        .unwrap_or(0);
                    ctx.code.op(Op::CallBuiltin);
                    ctx.code.u16(index as u16);
                } else {
                    let decl = sym.decl;
                    let index = decl
                        .and_then(|d| self.functions.iter().position(|&f| f == d))
                        .unwrap_or(0);
                    ctx.code.op(Op::Call);
                    ctx.code.u16(index as u16);
                }
            }
            _ => {}
        }
    }

    fn load_lvalue(&mut self, ctx: &mut BodyCtx, id: NodeId) {
        let Some(sid) = self.arena.ident_symbol(id, 0) else {
            return;
        };
        if let Some(slot) = ctx.locals.iter().position(|&s| s == sid) {
            ctx.code.op(Op::PushLocal);
            ctx.code.u16(slot as u16);
        } else if let Some(&(_, off)) = self.global_offsets.iter().find(|&&(s, _)| s == sid) {
            ctx.code.op(Op::PushGlobal);
            ctx.code.u32(off);
        } else {
            // builtin constant that survived without inlining
            let cv = self.arena.symbol(sid).constant.clone();
            if let Some(v) = cv {
                let idx = self.heap.intern(&v);
                ctx.code.op(Op::PushConst);
                ctx.code.u32(idx);
            } else {
                ctx.code.op(Op::Nop);
            }
        }
        let member = self.arena.child(id, 1);
        if let Some(m) = self.arena.get(member).ident().map(|i| i.name.clone()) {
            ctx.code.op(Op::Member);
            ctx.code.u8(axis_index(&m));
        }
    }

    fn store_lvalue(&mut self, ctx: &mut BodyCtx, id: NodeId) {
        let Some(sid) = self.arena.ident_symbol(id, 0) else {
            return;
        };
        let member = self.arena.child(id, 1);
        let axis = self
            .arena
            .get(member)
            .ident()
            .map(|i| axis_index(&i.name));
        if let Some(slot) = ctx.locals.iter().position(|&s| s == sid) {
            match axis {
                None => {
                    ctx.code.op(Op::StoreLocal);
                    ctx.code.u16(slot as u16);
                }
                Some(a) => {
                    ctx.code.op(Op::StoreLocalMember);
                    ctx.code.u16(slot as u16);
                    ctx.code.u8(a);
                }
            }
        } else if let Some(&(_, off)) = self.global_offsets.iter().find(|&&(s, _)| s == sid) {
            match axis {
                None => {
                    ctx.code.op(Op::StoreGlobal);
                    ctx.code.u32(off);
                }
                Some(a) => {
                    ctx.code.op(Op::StoreGlobalMember);
                    ctx.code.u32(off);
                    ctx.code.u8(a);
                }
            }
        }
    }

    fn binary(&mut self, ctx: &mut BodyCtx, id: NodeId, op: BinOp) {
        let lhs = self.arena.child(id, 0);
        let rhs = self.arena.child(id, 1);

        if op == BinOp::Assign {
            self.expr(ctx, rhs);
            // an assignment is also an expression; keep a copy of the value
            ctx.code.op(Op::Dup);
            self.store_lvalue(ctx, lhs);
            return;
        }
        if op.is_compound() {
            // only the `int *= float` family reaches the emitter in
            // compound form; the typed Mul dispatch preserves the
            // integer-in-place semantics
            self.expr(ctx, lhs);
            self.expr(ctx, rhs);
            ctx.code.op(Op::Mul);
            ctx.code
                .u8(pack_types(self.arena.get(lhs).ty, self.arena.get(rhs).ty));
            ctx.code.op(Op::Dup);
            self.store_lvalue(ctx, lhs);
            return;
        }

        self.expr(ctx, lhs);
        self.expr(ctx, rhs);
        let opcode = match op {
            BinOp::Add => Op::Add,
            BinOp::Sub => Op::Sub,
            BinOp::Mul => Op::Mul,
            BinOp::Div => Op::Div,
            BinOp::Mod => Op::Mod,
            BinOp::Eq => Op::Eq,
            BinOp::Neq => Op::Neq,
            BinOp::Lt => Op::Lt,
            BinOp::Leq => Op::Leq,
            BinOp::Gt => Op::Gt,
            BinOp::Geq => Op::Geq,
            BinOp::BitAnd => Op::BitAnd,
            BinOp::BitOr => Op::BitOr,
            BinOp::BitXor => Op::BitXor,
            BinOp::Shl => Op::Shl,
            BinOp::Shr => Op::Shr,
            BinOp::And => Op::BoolAnd,
            BinOp::Or => Op::BoolOr,
            _ => Op::Nop,
        };
        ctx.code.op(opcode);
        ctx.code
            .u8(pack_types(self.arena.get(lhs).ty, self.arena.get(rhs).ty));
    }

    fn unary(&mut self, ctx: &mut BodyCtx, id: NodeId, op: UnOp) {
        let operand = self.arena.child(id, 0);
        match op {
            UnOp::Neg => {
                self.expr(ctx, operand);
                ctx.code.op(Op::Neg);
            }
            UnOp::Not => {
                self.expr(ctx, operand);
                ctx.code.op(Op::BoolNot);
            }
            UnOp::BitNot => {
                self.expr(ctx, operand);
                ctx.code.op(Op::BitNot);
            }
            // post-forms: the expression's value is the old one
            UnOp::PostIncr | UnOp::PostDecr => {
                self.expr(ctx, operand);
                ctx.code.op(Op::Dup);
                let one = self.arena.get(operand).ty.one_value();
                let idx = self.heap.intern(&one);
                ctx.code.op(Op::PushConst);
                ctx.code.u32(idx);
                let step = if op == UnOp::PostIncr { Op::Add } else { Op::Sub };
                ctx.code.op(step);
                let ty = self.arena.get(operand).ty;
                ctx.code.u8(pack_types(ty, ty));
                self.store_lvalue(ctx, operand);
            }
            // pre-forms are desugared away before emission
            UnOp::PreIncr | UnOp::PreDecr => {
                self.expr(ctx, operand);
            }
        }
    }
}

fn pack_types(l: ScriptType, r: ScriptType) -> u8 {
    (type_tag(l) << 4) | type_tag(r)
}

struct BodyCtx {
    code: Writer,
    /// Slot-indexed local symbols; parameters first.
    locals: Vec<SymbolId>,
    /// Label offsets in definition order.
    labels: Vec<(String, u32)>,
    /// (patch position, label name) for forward jumps.
    pending_jumps: Vec<(usize, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Logger;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::passes::optimize::{self, OptimizeOptions};

    fn compile(src: &str) -> Vec<u8> {
        let mut arena = Arena::new();
        let mut logger = Logger::new();
        let toks = lex(src, &mut logger);
        let root = parse(toks.tokens, &mut arena, &mut logger).expect("parse");
        optimize::run(
            &mut arena,
            &mut logger,
            root,
            OptimizeOptions {
                fold_constants: true,
                ..Default::default()
            },
            false,
        );
        assert_eq!(logger.errors(), 0, "{}", logger.report());
        emit(&arena, root)
    }

    fn read_u16(b: &[u8], at: usize) -> u16 {
        u16::from_be_bytes([b[at], b[at + 1]])
    }

    fn read_u32(b: &[u8], at: usize) -> u32 {
        u32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
    }

    #[test]
    fn header_and_sections() {
        let img = compile("default { state_entry() { } }");
        assert_eq!(&img[0..4], &MAGIC);
        assert_eq!(read_u16(&img, 4), VERSION);
        // no globals
        assert_eq!(read_u16(&img, 8), 0);
        // no functions
        assert_eq!(read_u16(&img, 10), 0);
        // one state
        assert_eq!(read_u16(&img, 12), 1);
    }

    #[test]
    fn global_frame_offsets_accumulate_by_size() {
        let img = compile(
            "integer a;\nvector v;\nfloat f;\n\
             default { state_entry() { a = 1; v = <1,1,1>; f = 0.5; } }",
        );
        // globals section starts after magic+version+flags
        let mut at = 8;
        assert_eq!(read_u16(&img, at), 3);
        at += 2;
        // integer at offset 0
        assert_eq!(img[at], 1);
        assert_eq!(read_u32(&img, at + 1), 0);
        at += 9;
        // vector at offset 4
        assert_eq!(img[at], 5);
        assert_eq!(read_u32(&img, at + 1), 4);
        at += 9;
        // float after the 12-byte vector
        assert_eq!(img[at], 2);
        assert_eq!(read_u32(&img, at + 1), 16);
    }

    #[test]
    fn vector_heap_entry_is_reversed() {
        let img = compile(
            "vector g = <1.0, 2.0, 3.0>;\ndefault { state_entry() { g = g; } }",
        );
        // the folded initializer lands in the heap; find the 12-byte vector
        // payload and check z,y,x order
        let z = 3.0f32.to_be_bytes();
        let y = 2.0f32.to_be_bytes();
        let x = 1.0f32.to_be_bytes();
        let mut expected = Vec::new();
        expected.extend_from_slice(&z);
        expected.extend_from_slice(&y);
        expected.extend_from_slice(&x);
        assert!(
            img.windows(12).any(|w| w == expected.as_slice()),
            "vector payload must serialize z,y,x"
        );
    }

    #[test]
    fn handler_records_carry_event_ids() {
        let img = compile(
            "default { state_entry() { } touch_start(integer n) { } }",
        );
        let entry_id = builtins::event_index("state_entry").unwrap() as u8;
        let touch_id = builtins::event_index("touch_start").unwrap() as u8;
        // both ids must appear in the state section, in order
        let entry_pos = img.iter().position(|&b| b == entry_id);
        assert!(entry_pos.is_some());
        assert!(img.contains(&touch_id));
    }

    #[test]
    fn constants_serialize_from_the_heap() {
        let img = compile("default { state_entry() { say(0, \"hi\"); } }");
        // the string constant lives in the heap with a NUL terminator
        let needle = b"hi\0";
        assert!(
            img.windows(needle.len()).any(|w| w == needle),
            "heap should hold the string constant"
        );
    }

    #[test]
    fn jump_forward_is_patched() {
        let img = compile(
            "default { state_entry() { jump out; sleep(1.0); @out; } }",
        );
        // a Jump opcode must exist and never target offset 0 when it jumps
        // forward past the sleep call
        let mut found = false;
        for i in 0..img.len().saturating_sub(5) {
            if img[i] == Op::Jump as u8 {
                let target = read_u32(&img, i + 1);
                if target > 0 {
                    found = true;
                }
            }
        }
        assert!(found, "forward jump should be patched to a nonzero offset");
    }
}
