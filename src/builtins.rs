//! Builtin functions, events and constants.
//!
//! Single source of truth: the resolution pass materializes these into the
//! root symbol table of every compilation, the desugaring pass inlines the
//! constants, and the event prototype checks read the parameter lists. The
//! registry is process-wide, built once, and read-only afterwards.

use std::sync::OnceLock;

use crate::ast::Arena;
use crate::symtab::{Param, Symbol, SymbolKind, SymbolSubKind, TableId};
use crate::types::ScriptType;
use crate::value::{Quat, Value, Vec3, NULL_KEY};

pub struct BuiltinFn {
    pub name: &'static str,
    pub ret: ScriptType,
    pub params: &'static [(&'static str, ScriptType)],
}

pub struct BuiltinEvent {
    pub name: &'static str,
    pub params: &'static [(&'static str, ScriptType)],
}

use ScriptType::{Float, Integer, Key, List, Null, Rotation, Str, Vector};

pub static FUNCTIONS: &[BuiltinFn] = &[
    // chat and world interaction
    BuiltinFn { name: "say", ret: Null, params: &[("channel", Integer), ("message", Str)] },
    BuiltinFn { name: "whisper", ret: Null, params: &[("channel", Integer), ("message", Str)] },
    BuiltinFn { name: "sleep", ret: Null, params: &[("seconds", Float)] },
    BuiltinFn { name: "setText", ret: Null, params: &[("text", Str), ("color", Vector), ("alpha", Float)] },
    BuiltinFn { name: "getPos", ret: Vector, params: &[] },
    BuiltinFn { name: "setPos", ret: Null, params: &[("pos", Vector)] },
    BuiltinFn { name: "getRot", ret: Rotation, params: &[] },
    BuiltinFn { name: "setRot", ret: Null, params: &[("rot", Rotation)] },
    BuiltinFn { name: "setTimer", ret: Null, params: &[("interval", Float)] },
    BuiltinFn { name: "key2Name", ret: Str, params: &[("id", Key)] },
    // math
    BuiltinFn { name: "sqrt", ret: Float, params: &[("x", Float)] },
    BuiltinFn { name: "pow", ret: Float, params: &[("base", Float), ("exponent", Float)] },
    BuiltinFn { name: "fabs", ret: Float, params: &[("x", Float)] },
    BuiltinFn { name: "abs", ret: Integer, params: &[("x", Integer)] },
    BuiltinFn { name: "floor", ret: Integer, params: &[("x", Float)] },
    BuiltinFn { name: "ceil", ret: Integer, params: &[("x", Float)] },
    BuiltinFn { name: "round", ret: Integer, params: &[("x", Float)] },
    BuiltinFn { name: "sin", ret: Float, params: &[("theta", Float)] },
    BuiltinFn { name: "cos", ret: Float, params: &[("theta", Float)] },
    BuiltinFn { name: "frand", ret: Float, params: &[("mag", Float)] },
    BuiltinFn { name: "getTime", ret: Float, params: &[] },
    // vector and rotation helpers
    BuiltinFn { name: "vecMag", ret: Float, params: &[("v", Vector)] },
    BuiltinFn { name: "vecNorm", ret: Vector, params: &[("v", Vector)] },
    BuiltinFn { name: "vecDist", ret: Float, params: &[("a", Vector), ("b", Vector)] },
    BuiltinFn { name: "euler2Rot", ret: Rotation, params: &[("v", Vector)] },
    BuiltinFn { name: "rot2Euler", ret: Vector, params: &[("q", Rotation)] },
    // strings and lists
    BuiltinFn { name: "stringLength", ret: Integer, params: &[("s", Str)] },
    BuiltinFn { name: "getSubString", ret: Str, params: &[("s", Str), ("start", Integer), ("end", Integer)] },
    BuiltinFn { name: "listLength", ret: Integer, params: &[("l", List)] },
    BuiltinFn { name: "list2String", ret: Str, params: &[("l", List), ("index", Integer)] },
];

pub static EVENTS: &[BuiltinEvent] = &[
    BuiltinEvent { name: "state_entry", params: &[] },
    BuiltinEvent { name: "state_exit", params: &[] },
    BuiltinEvent { name: "touch_start", params: &[("count", Integer)] },
    BuiltinEvent { name: "touch_end", params: &[("count", Integer)] },
    BuiltinEvent { name: "timer", params: &[] },
    BuiltinEvent { name: "listen", params: &[("channel", Integer), ("name", Str), ("id", Key), ("message", Str)] },
    BuiltinEvent { name: "collision", params: &[("count", Integer)] },
    BuiltinEvent { name: "on_rez", params: &[("start_param", Integer)] },
    BuiltinEvent { name: "changed", params: &[("change", Integer)] },
    BuiltinEvent { name: "at_target", params: &[("handle", Integer), ("target", Vector), ("ours", Vector)] },
];

pub struct BuiltinConst {
    pub name: &'static str,
    pub value: Value,
}

fn build_constants() -> Vec<BuiltinConst> {
    vec![
        BuiltinConst { name: "TRUE", value: Value::Integer(1) },
        BuiltinConst { name: "FALSE", value: Value::Integer(0) },
        BuiltinConst { name: "PI", value: Value::Float(std::f32::consts::PI) },
        BuiltinConst { name: "TWO_PI", value: Value::Float(std::f32::consts::TAU) },
        BuiltinConst { name: "PI_BY_TWO", value: Value::Float(std::f32::consts::FRAC_PI_2) },
        BuiltinConst { name: "DEG_TO_RAD", value: Value::Float(std::f32::consts::PI / 180.0) },
        BuiltinConst { name: "RAD_TO_DEG", value: Value::Float(180.0 / std::f32::consts::PI) },
        BuiltinConst { name: "SQRT2", value: Value::Float(std::f32::consts::SQRT_2) },
        BuiltinConst { name: "NULL_KEY", value: Value::Key(NULL_KEY.to_string()) },
        BuiltinConst { name: "EOF", value: Value::Str("\n\n\n".to_string()) },
        BuiltinConst { name: "ZERO_VECTOR", value: Value::Vector(Vec3::ZERO) },
        BuiltinConst { name: "ZERO_ROTATION", value: Value::Rotation(Quat::IDENTITY) },
    ]
}

pub fn constants() -> &'static [BuiltinConst] {
    static CONSTANTS: OnceLock<Vec<BuiltinConst>> = OnceLock::new();
    CONSTANTS.get_or_init(build_constants)
}

pub fn lookup_function(name: &str) -> Option<&'static BuiltinFn> {
    FUNCTIONS.iter().find(|f| f.name == name)
}

pub fn lookup_event(name: &str) -> Option<&'static BuiltinEvent> {
    EVENTS.iter().find(|e| e.name == name)
}

pub fn lookup_constant(name: &str) -> Option<&'static BuiltinConst> {
    constants().iter().find(|c| c.name == name)
}

/// Index of an event in the prototype table; the bytecode emitter uses this
/// as the wire id of a handler.
pub fn event_index(name: &str) -> Option<usize> {
    EVENTS.iter().position(|e| e.name == name)
}

fn to_params(params: &'static [(&'static str, ScriptType)]) -> Vec<Param> {
    params
        .iter()
        .map(|&(name, ty)| Param {
            name: name.to_string(),
            ty,
        })
        .collect()
}

/// Materialize the builtin registry into a compilation's root table.
pub fn install(arena: &mut Arena, root: TableId) {
    for f in FUNCTIONS {
        let sym = Symbol::new(
            f.name,
            f.ret,
            SymbolKind::Function,
            SymbolSubKind::Builtin,
            Default::default(),
        )
        .with_params(to_params(f.params));
        let sid = arena.new_symbol(sym);
        arena.symbol_mut(sid).table = Some(root);
        arena.table_mut(root).insert(sid);
    }
    for e in EVENTS {
        let sym = Symbol::new(
            e.name,
            ScriptType::Null,
            SymbolKind::Event,
            SymbolSubKind::Builtin,
            Default::default(),
        )
        .with_params(to_params(e.params));
        let sid = arena.new_symbol(sym);
        arena.symbol_mut(sid).table = Some(root);
        arena.table_mut(root).insert(sid);
    }
    for c in constants() {
        let sym = Symbol::new(
            c.name,
            c.value.type_of(),
            SymbolKind::Variable,
            SymbolSubKind::Builtin,
            Default::default(),
        )
        .with_constant(c.value.clone());
        let sid = arena.new_symbol(sym);
        arena.symbol_mut(sid).table = Some(root);
        arena.table_mut(root).insert(sid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_prototypes() {
        let listen = lookup_event("listen").unwrap();
        assert_eq!(listen.params.len(), 4);
        assert_eq!(listen.params[2].1, ScriptType::Key);
        assert!(lookup_event("no_such_event").is_none());

        let f = lookup_function("vecDist").unwrap();
        assert_eq!(f.ret, ScriptType::Float);
        assert_eq!(f.params.len(), 2);
    }

    #[test]
    fn constants_carry_values() {
        assert_eq!(lookup_constant("TRUE").unwrap().value, Value::Integer(1));
        match &lookup_constant("ZERO_VECTOR").unwrap().value {
            Value::Vector(v) => assert_eq!(*v, Vec3::ZERO),
            other => panic!("expected vector, got {other:?}"),
        }
    }

    #[test]
    fn install_populates_root_table() {
        let mut arena = Arena::new();
        let root = arena.new_table();
        install(&mut arena, root);
        let total = FUNCTIONS.len() + EVENTS.len() + constants().len();
        assert_eq!(arena.table(root).symbols().len(), total);
    }
}
