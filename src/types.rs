//! The Slate type lattice: coercion rules and operator result tables.
//!
//! These tables are the language's type definition. `Error` is the poison
//! type: it is produced whenever a lookup fails and silently absorbs any
//! operation it participates in, so one broken subexpression yields exactly
//! one diagnostic.

use serde::Serialize;

use crate::ast::{BinOp, UnOp};
use crate::value::{Quat, Value, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScriptType {
    /// Absence of type: void functions, untyped nodes fresh from the parser.
    Null,
    Integer,
    Float,
    Str,
    Key,
    Vector,
    Rotation,
    List,
    /// Poison produced on any type failure.
    Error,
}

impl ScriptType {
    /// Source-level spelling, as used in declarations and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ScriptType::Null => "void",
            ScriptType::Integer => "integer",
            ScriptType::Float => "float",
            ScriptType::Str => "string",
            ScriptType::Key => "key",
            ScriptType::Vector => "vector",
            ScriptType::Rotation => "rotation",
            ScriptType::List => "list",
            ScriptType::Error => "<error>",
        }
    }

    /// Implicit coercion: `integer -> float`, `string <-> key`, identity.
    pub fn can_coerce(self, to: ScriptType) -> bool {
        if self == to {
            return true;
        }
        matches!(
            (self, to),
            (ScriptType::Integer, ScriptType::Float)
                | (ScriptType::Str, ScriptType::Key)
                | (ScriptType::Key, ScriptType::Str)
        )
    }

    /// Explicit cast legality (the `(type)expr` form).
    pub fn can_cast(self, to: ScriptType) -> bool {
        if self == to || to == ScriptType::List {
            return true;
        }
        match (self, to) {
            (ScriptType::Integer, ScriptType::Float | ScriptType::Str) => true,
            (ScriptType::Float, ScriptType::Integer | ScriptType::Str) => true,
            (
                ScriptType::Str,
                ScriptType::Integer
                | ScriptType::Float
                | ScriptType::Key
                | ScriptType::Vector
                | ScriptType::Rotation,
            ) => true,
            (ScriptType::Key, ScriptType::Str) => true,
            (ScriptType::Vector, ScriptType::Str) => true,
            (ScriptType::Rotation, ScriptType::Str) => true,
            _ => false,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ScriptType::Integer | ScriptType::Float)
    }

    /// The multiplicative identity for numeric types, the empty/zero value
    /// elsewhere. Used when desugaring `++x` into `x = x + 1`.
    pub fn one_value(self) -> Value {
        match self {
            ScriptType::Float => Value::Float(1.0),
            ScriptType::Vector => Value::Vector(Vec3::new(1.0, 1.0, 1.0)),
            ScriptType::Rotation => Value::Rotation(Quat::new(0.0, 0.0, 0.0, 1.0)),
            ScriptType::Str => Value::Str(String::new()),
            ScriptType::Key => Value::Key(String::new()),
            ScriptType::List => Value::List(Vec::new()),
            _ => Value::Integer(1),
        }
    }
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result type of a binary operation, or `None` when the pairing is illegal.
///
/// Compound assignments are resolved by the caller through
/// [`BinOp::decoupled`] before consulting this table; plain `=` never reaches
/// it either.
pub fn result_type(op: BinOp, lhs: ScriptType, rhs: ScriptType) -> Option<ScriptType> {
    use ScriptType::*;
    if lhs == Error || rhs == Error {
        return Some(Error);
    }
    match op {
        BinOp::Add => match (lhs, rhs) {
            (Integer, Integer) => Some(Integer),
            (l, r) if l.is_numeric() && r.is_numeric() => Some(Float),
            (Str, Str) | (Str, Key) | (Key, Str) => Some(Str),
            (Vector, Vector) => Some(Vector),
            (Rotation, Rotation) => Some(Rotation),
            // list concatenation promotes the non-list side to a one-element list
            (List, _) | (_, List) => Some(List),
            _ => None,
        },
        BinOp::Sub => match (lhs, rhs) {
            (Integer, Integer) => Some(Integer),
            (l, r) if l.is_numeric() && r.is_numeric() => Some(Float),
            (Vector, Vector) => Some(Vector),
            (Rotation, Rotation) => Some(Rotation),
            _ => None,
        },
        BinOp::Mul => match (lhs, rhs) {
            (Integer, Integer) => Some(Integer),
            (l, r) if l.is_numeric() && r.is_numeric() => Some(Float),
            (Vector, Integer | Float) | (Integer | Float, Vector) => Some(Vector),
            // dot product
            (Vector, Vector) => Some(Float),
            // rotation of a vector
            (Vector, Rotation) => Some(Vector),
            (Rotation, Rotation) => Some(Rotation),
            _ => None,
        },
        BinOp::Div => match (lhs, rhs) {
            (Integer, Integer) => Some(Integer),
            (l, r) if l.is_numeric() && r.is_numeric() => Some(Float),
            (Vector, Integer | Float) => Some(Vector),
            (Vector, Rotation) => Some(Vector),
            (Rotation, Rotation) => Some(Rotation),
            _ => None,
        },
        BinOp::Mod => match (lhs, rhs) {
            (Integer, Integer) => Some(Integer),
            // cross product
            (Vector, Vector) => Some(Vector),
            _ => None,
        },
        BinOp::Eq | BinOp::Neq => {
            if lhs.can_coerce(rhs) || rhs.can_coerce(lhs) {
                Some(Integer)
            } else {
                None
            }
        }
        BinOp::Lt | BinOp::Leq | BinOp::Gt | BinOp::Geq => {
            if lhs.is_numeric() && rhs.is_numeric() {
                Some(Integer)
            } else {
                None
            }
        }
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => {
            if lhs == Integer && rhs == Integer {
                Some(Integer)
            } else {
                None
            }
        }
        BinOp::And | BinOp::Or => {
            if lhs == Integer && rhs == Integer {
                Some(Integer)
            } else {
                None
            }
        }
        BinOp::Assign
        | BinOp::AddAssign
        | BinOp::SubAssign
        | BinOp::MulAssign
        | BinOp::DivAssign
        | BinOp::ModAssign => None,
    }
}

/// Result type of a unary operation.
pub fn unary_result_type(op: UnOp, operand: ScriptType) -> Option<ScriptType> {
    use ScriptType::*;
    if operand == Error {
        return Some(Error);
    }
    match op {
        UnOp::Neg => match operand {
            Integer | Float | Vector | Rotation => Some(operand),
            _ => None,
        },
        UnOp::Not | UnOp::BitNot => {
            if operand == Integer {
                Some(Integer)
            } else {
                None
            }
        }
        UnOp::PreIncr | UnOp::PreDecr | UnOp::PostIncr | UnOp::PostDecr => {
            if operand.is_numeric() {
                Some(operand)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercion_lattice() {
        assert!(ScriptType::Integer.can_coerce(ScriptType::Float));
        assert!(!ScriptType::Float.can_coerce(ScriptType::Integer));
        assert!(ScriptType::Str.can_coerce(ScriptType::Key));
        assert!(ScriptType::Key.can_coerce(ScriptType::Str));
        assert!(!ScriptType::Integer.can_coerce(ScriptType::Str));
        assert!(!ScriptType::Vector.can_coerce(ScriptType::Rotation));
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        assert_eq!(
            result_type(BinOp::Mul, ScriptType::Integer, ScriptType::Float),
            Some(ScriptType::Float)
        );
        assert_eq!(
            result_type(BinOp::Add, ScriptType::Integer, ScriptType::Integer),
            Some(ScriptType::Integer)
        );
    }

    #[test]
    fn vector_algebra() {
        assert_eq!(
            result_type(BinOp::Mul, ScriptType::Vector, ScriptType::Float),
            Some(ScriptType::Vector)
        );
        assert_eq!(
            result_type(BinOp::Mul, ScriptType::Vector, ScriptType::Vector),
            Some(ScriptType::Float),
            "v * v is the dot product"
        );
        assert_eq!(
            result_type(BinOp::Mul, ScriptType::Vector, ScriptType::Rotation),
            Some(ScriptType::Vector),
            "v * q rotates the vector"
        );
        assert_eq!(
            result_type(BinOp::Mod, ScriptType::Vector, ScriptType::Vector),
            Some(ScriptType::Vector),
            "v % v is the cross product"
        );
    }

    #[test]
    fn list_concat_promotes_either_side() {
        assert_eq!(
            result_type(BinOp::Add, ScriptType::List, ScriptType::Integer),
            Some(ScriptType::List)
        );
        assert_eq!(
            result_type(BinOp::Add, ScriptType::Str, ScriptType::List),
            Some(ScriptType::List)
        );
    }

    #[test]
    fn error_is_contagious() {
        assert_eq!(
            result_type(BinOp::Add, ScriptType::Error, ScriptType::Integer),
            Some(ScriptType::Error)
        );
        assert_eq!(
            unary_result_type(UnOp::Neg, ScriptType::Error),
            Some(ScriptType::Error)
        );
    }

    #[test]
    fn illegal_pairings_fail() {
        assert_eq!(
            result_type(BinOp::Sub, ScriptType::Str, ScriptType::Str),
            None
        );
        assert_eq!(
            result_type(BinOp::Lt, ScriptType::Str, ScriptType::Str),
            None
        );
        assert_eq!(unary_result_type(UnOp::Not, ScriptType::Float), None);
    }
}
