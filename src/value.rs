//! Compile-time constant values and the arithmetic used to fold them.
//!
//! Integer arithmetic wraps (two's complement), floats are IEEE-754 single
//! precision, and a handful of legacy VM quirks are reproduced behind the
//! `legacy` flag so folded output matches what the historical compiler
//! produced.

use serde::Serialize;
use uuid::Uuid;

use crate::ast::{BinOp, UnOp};
use crate::types::ScriptType;

pub const NULL_KEY: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    fn dot(self, o: Vec3) -> f32 {
        self.x * o.x + self.y * o.y + self.z * o.z
    }

    fn cross(self, o: Vec3) -> Vec3 {
        Vec3::new(
            self.y * o.z - self.z * o.y,
            self.z * o.x - self.x * o.z,
            self.x * o.y - self.y * o.x,
        )
    }

    fn scale(self, f: f32) -> Vec3 {
        Vec3::new(self.x * f, self.y * f, self.z * f)
    }

    fn add(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }

    fn sub(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }

    /// Rotate by a quaternion: v' = v + 2q×(q×v + sv).
    fn rotate(self, q: Quat) -> Vec3 {
        let u = Vec3::new(q.x, q.y, q.z);
        let t = u.cross(self).add(self.scale(q.s)).scale(2.0);
        self.add(u.cross(t))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub s: f32,
}

impl Quat {
    pub fn new(x: f32, y: f32, z: f32, s: f32) -> Self {
        Self { x, y, z, s }
    }

    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        s: 1.0,
    };

    fn conjugate(self) -> Quat {
        Quat::new(-self.x, -self.y, -self.z, self.s)
    }

    fn multiply(self, o: Quat) -> Quat {
        Quat::new(
            self.s * o.x + self.x * o.s + self.y * o.z - self.z * o.y,
            self.s * o.y + self.y * o.s + self.z * o.x - self.x * o.z,
            self.s * o.z + self.z * o.s + self.x * o.y - self.y * o.x,
            self.s * o.s - self.x * o.x - self.y * o.y - self.z * o.z,
        )
    }
}

/// A statically-known value. Lists hold non-list values only; the parser and
/// the fold pass both enforce that before constructing one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Integer(i32),
    Float(f32),
    Str(String),
    Key(String),
    Vector(Vec3),
    Rotation(Quat),
    List(Vec<Value>),
}

impl Value {
    pub fn type_of(&self) -> ScriptType {
        match self {
            Value::Integer(_) => ScriptType::Integer,
            Value::Float(_) => ScriptType::Float,
            Value::Str(_) => ScriptType::Str,
            Value::Key(_) => ScriptType::Key,
            Value::Vector(_) => ScriptType::Vector,
            Value::Rotation(_) => ScriptType::Rotation,
            Value::List(_) => ScriptType::List,
        }
    }

    /// A key value, normalized: anything that is not UUID-shaped collapses
    /// to `NULL_KEY`.
    pub fn key(s: &str) -> Value {
        if Uuid::parse_str(s).is_ok() {
            Value::Key(s.to_string())
        } else {
            Value::Key(NULL_KEY.to_string())
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value widened to f32, if the value is numeric at all.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Integer(i) => Some(*i as f32),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// Why a fold on constant operands produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldError {
    /// Integer or float division/modulo by a zero constant.
    DivisionByZero,
    /// The operand pairing has no compile-time evaluation.
    Unsupported,
}

/// Fold a binary operation on two constants. Compound assignment operators
/// never reach here; the desugaring pass decouples them first.
pub fn fold_binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, FoldError> {
    use Value::*;
    match (lhs, rhs) {
        (Integer(a), Integer(b)) => fold_int(op, *a, *b),
        // int/float mixes promote to float arithmetic
        (Integer(_), Float(_)) | (Float(_), Integer(_)) | (Float(_), Float(_)) => {
            let a = lhs.as_float().ok_or(FoldError::Unsupported)?;
            let b = rhs.as_float().ok_or(FoldError::Unsupported)?;
            fold_float(op, a, b)
        }
        (Str(a), Str(b)) => fold_str(op, a, b),
        (Str(a), Key(b)) | (Key(a), Str(b)) => fold_str(op, a, b),
        (Key(a), Key(b)) => match op {
            BinOp::Eq => Ok(Integer((a == b) as i32)),
            BinOp::Neq => Ok(Integer((a != b) as i32)),
            _ => Err(FoldError::Unsupported),
        },
        (Vector(a), Vector(b)) => fold_vector(op, *a, *b),
        (Vector(v), Integer(_) | Float(_)) => {
            let f = rhs.as_float().ok_or(FoldError::Unsupported)?;
            match op {
                BinOp::Mul => Ok(Vector(v.scale(f))),
                BinOp::Div => {
                    if f == 0.0 {
                        Err(FoldError::DivisionByZero)
                    } else {
                        Ok(Vector(v.scale(1.0 / f)))
                    }
                }
                _ => Err(FoldError::Unsupported),
            }
        }
        (Integer(_) | Float(_), Vector(v)) => {
            let f = lhs.as_float().ok_or(FoldError::Unsupported)?;
            match op {
                BinOp::Mul => Ok(Vector(v.scale(f))),
                _ => Err(FoldError::Unsupported),
            }
        }
        (Vector(v), Rotation(q)) => match op {
            BinOp::Mul => Ok(Vector(v.rotate(*q))),
            BinOp::Div => Ok(Vector(v.rotate(q.conjugate()))),
            _ => Err(FoldError::Unsupported),
        },
        (Rotation(a), Rotation(b)) => match op {
            BinOp::Add => Ok(Rotation(Quat::new(
                a.x + b.x,
                a.y + b.y,
                a.z + b.z,
                a.s + b.s,
            ))),
            BinOp::Sub => Ok(Rotation(Quat::new(
                a.x - b.x,
                a.y - b.y,
                a.z - b.z,
                a.s - b.s,
            ))),
            BinOp::Mul => Ok(Rotation(a.multiply(*b))),
            BinOp::Div => Ok(Rotation(a.multiply(b.conjugate()))),
            BinOp::Eq => Ok(Integer((a == b) as i32)),
            BinOp::Neq => Ok(Integer((a != b) as i32)),
            _ => Err(FoldError::Unsupported),
        },
        // list concatenation promotes the non-list operand to a one-element list
        (List(a), List(b)) => match op {
            BinOp::Add => {
                let mut out = a.clone();
                out.extend(b.iter().cloned());
                Ok(List(out))
            }
            // the legacy VM compares lists by length
            BinOp::Eq => Ok(Integer((a.len() == b.len()) as i32)),
            BinOp::Neq => Ok(Integer((a.len() != b.len()) as i32)),
            _ => Err(FoldError::Unsupported),
        },
        (List(a), b) => match op {
            BinOp::Add => {
                let mut out = a.clone();
                out.push(b.clone());
                Ok(List(out))
            }
            _ => Err(FoldError::Unsupported),
        },
        (a, List(b)) => match op {
            BinOp::Add => {
                let mut out = vec![a.clone()];
                out.extend(b.iter().cloned());
                Ok(List(out))
            }
            _ => Err(FoldError::Unsupported),
        },
        _ => Err(FoldError::Unsupported),
    }
}

fn fold_int(op: BinOp, a: i32, b: i32) -> Result<Value, FoldError> {
    let v = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(FoldError::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(FoldError::DivisionByZero);
            }
            a.wrapping_rem(b)
        }
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::Shl => a.wrapping_shl(b as u32 & 31),
        BinOp::Shr => a.wrapping_shr(b as u32 & 31),
        BinOp::And => ((a != 0) && (b != 0)) as i32,
        BinOp::Or => ((a != 0) || (b != 0)) as i32,
        BinOp::Eq => (a == b) as i32,
        BinOp::Neq => (a != b) as i32,
        BinOp::Lt => (a < b) as i32,
        BinOp::Leq => (a <= b) as i32,
        BinOp::Gt => (a > b) as i32,
        BinOp::Geq => (a >= b) as i32,
        _ => return Err(FoldError::Unsupported),
    };
    Ok(Value::Integer(v))
}

fn fold_float(op: BinOp, a: f32, b: f32) -> Result<Value, FoldError> {
    let v = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(FoldError::DivisionByZero);
            }
            a / b
        }
        BinOp::Eq => return Ok(Value::Integer((a == b) as i32)),
        BinOp::Neq => return Ok(Value::Integer((a != b) as i32)),
        BinOp::Lt => return Ok(Value::Integer((a < b) as i32)),
        BinOp::Leq => return Ok(Value::Integer((a <= b) as i32)),
        BinOp::Gt => return Ok(Value::Integer((a > b) as i32)),
        BinOp::Geq => return Ok(Value::Integer((a >= b) as i32)),
        _ => return Err(FoldError::Unsupported),
    };
    Ok(Value::Float(v))
}

fn fold_str(op: BinOp, a: &str, b: &str) -> Result<Value, FoldError> {
    match op {
        BinOp::Add => Ok(Value::Str(format!("{a}{b}"))),
        BinOp::Eq => Ok(Value::Integer((a == b) as i32)),
        BinOp::Neq => Ok(Value::Integer((a != b) as i32)),
        _ => Err(FoldError::Unsupported),
    }
}

fn fold_vector(op: BinOp, a: Vec3, b: Vec3) -> Result<Value, FoldError> {
    match op {
        BinOp::Add => Ok(Value::Vector(a.add(b))),
        BinOp::Sub => Ok(Value::Vector(a.sub(b))),
        BinOp::Mul => Ok(Value::Float(a.dot(b))),
        BinOp::Mod => Ok(Value::Vector(a.cross(b))),
        BinOp::Eq => Ok(Value::Integer((a == b) as i32)),
        BinOp::Neq => Ok(Value::Integer((a != b) as i32)),
        _ => Err(FoldError::Unsupported),
    }
}

/// Fold a unary operation on a constant. Increment/decrement forms are
/// assignments in disguise and never fold.
pub fn fold_unary(op: UnOp, v: &Value) -> Result<Value, FoldError> {
    match (op, v) {
        (UnOp::Neg, Value::Integer(i)) => Ok(Value::Integer(i.wrapping_neg())),
        (UnOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnOp::Neg, Value::Vector(v)) => Ok(Value::Vector(v.scale(-1.0))),
        (UnOp::Neg, Value::Rotation(q)) => Ok(Value::Rotation(Quat::new(-q.x, -q.y, -q.z, -q.s))),
        (UnOp::Not, Value::Integer(i)) => Ok(Value::Integer((*i == 0) as i32)),
        (UnOp::BitNot, Value::Integer(i)) => Ok(Value::Integer(!i)),
        _ => Err(FoldError::Unsupported),
    }
}

/// Realize an explicit typecast on a constant. Returns `None` when the cast
/// has no compile-time realization (the legality check happened during type
/// determination).
pub fn cast(to: ScriptType, v: &Value, legacy: bool) -> Option<Value> {
    if v.type_of() == to {
        return Some(v.clone());
    }
    match (v, to) {
        (Value::Integer(i), ScriptType::Float) => {
            // the historical VM routed this through an s32 reinterpretation
            // that turns INT_MIN into a NaN
            if legacy && *i == i32::MIN {
                Some(Value::Float(f32::NAN))
            } else {
                Some(Value::Float(*i as f32))
            }
        }
        (Value::Integer(i), ScriptType::Str) => Some(Value::Str(i.to_string())),
        (Value::Float(f), ScriptType::Integer) => Some(Value::Integer(float_to_int(*f))),
        (Value::Float(f), ScriptType::Str) => Some(Value::Str(format_float(*f))),
        (Value::Str(s), ScriptType::Integer) => Some(Value::Integer(parse_int_prefix(s))),
        (Value::Str(s), ScriptType::Float) => Some(Value::Float(parse_float_prefix(s))),
        (Value::Str(s), ScriptType::Key) => Some(Value::key(s)),
        (Value::Str(s), ScriptType::Vector) => Some(Value::Vector(
            parse_vector(s).unwrap_or(Vec3::ZERO),
        )),
        (Value::Str(s), ScriptType::Rotation) => Some(Value::Rotation(
            parse_rotation(s).unwrap_or(Quat::IDENTITY),
        )),
        (Value::Key(s), ScriptType::Str) => Some(Value::Str(s.clone())),
        (Value::Vector(v), ScriptType::Str) => Some(Value::Str(format!(
            "<{}, {}, {}>",
            format_component(v.x),
            format_component(v.y),
            format_component(v.z)
        ))),
        (Value::Rotation(q), ScriptType::Str) => Some(Value::Str(format!(
            "<{}, {}, {}, {}>",
            format_component(q.x),
            format_component(q.y),
            format_component(q.z),
            format_component(q.s)
        ))),
        (val, ScriptType::List) => Some(Value::List(vec![val.clone()])),
        _ => None,
    }
}

fn float_to_int(f: f32) -> i32 {
    if f.is_nan() || f >= 2147483648.0 || f < -2147483648.0 {
        i32::MIN
    } else {
        f as i32
    }
}

/// Fixed six-decimal formatting, matching the runtime's float-to-string.
pub fn format_float(f: f32) -> String {
    format!("{f:.6}")
}

/// Vector/rotation components print with five decimals.
fn format_component(f: f32) -> String {
    format!("{f:.5}")
}

/// Parse a decimal or `0x` integer prefix; garbage yields 0.
fn parse_int_prefix(s: &str) -> i32 {
    let t = s.trim_start();
    let (neg, t) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let (digits, radix) = if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        (hex, 16u32)
    } else {
        (t, 10u32)
    };
    let end = digits
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(digits.len());
    if end == 0 {
        return 0;
    }
    // accumulate wrapping, like the C library strtoul path the VM used
    let mut acc: i64 = 0;
    for c in digits[..end].chars() {
        acc = acc
            .wrapping_mul(i64::from(radix))
            .wrapping_add(i64::from(c.to_digit(radix).unwrap_or(0)));
        if acc > u32::MAX as i64 {
            acc = u32::MAX as i64;
        }
    }
    let v = acc as u32 as i32;
    if neg {
        v.wrapping_neg()
    } else {
        v
    }
}

fn parse_float_prefix(s: &str) -> f32 {
    let t = s.trim_start();
    let mut end = 0;
    let bytes = t.as_bytes();
    let mut seen_dot = false;
    let mut seen_exp = false;
    while end < bytes.len() {
        let c = bytes[end] as char;
        let ok = c.is_ascii_digit()
            || (end == 0 && (c == '-' || c == '+'))
            || (c == '.' && !seen_dot && !seen_exp)
            || ((c == 'e' || c == 'E') && !seen_exp && end > 0)
            || ((c == '-' || c == '+')
                && end > 0
                && (bytes[end - 1] == b'e' || bytes[end - 1] == b'E'));
        if !ok {
            break;
        }
        seen_dot |= c == '.';
        seen_exp |= c == 'e' || c == 'E';
        end += 1;
    }
    t[..end].parse::<f32>().unwrap_or(0.0)
}

fn parse_vector(s: &str) -> Option<Vec3> {
    let parts = parse_angle_components(s, 3)?;
    Some(Vec3::new(parts[0], parts[1], parts[2]))
}

fn parse_rotation(s: &str) -> Option<Quat> {
    let parts = parse_angle_components(s, 4)?;
    Some(Quat::new(parts[0], parts[1], parts[2], parts[3]))
}

fn parse_angle_components(s: &str, n: usize) -> Option<Vec<f32>> {
    let t = s.trim();
    let inner = t.strip_prefix('<')?.strip_suffix('>')?;
    let parts: Vec<&str> = inner.split(',').collect();
    if parts.len() != n {
        return None;
    }
    let mut out = Vec::with_capacity(n);
    for p in parts {
        out.push(p.trim().parse::<f32>().ok()?);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_overflow_wraps() {
        assert_eq!(
            fold_binary(BinOp::Add, &Value::Integer(i32::MAX), &Value::Integer(1)),
            Ok(Value::Integer(i32::MIN))
        );
        assert_eq!(
            fold_binary(BinOp::Div, &Value::Integer(i32::MIN), &Value::Integer(-1)),
            Ok(Value::Integer(i32::MIN))
        );
    }

    #[test]
    fn division_by_zero_is_reported_not_folded() {
        assert_eq!(
            fold_binary(BinOp::Div, &Value::Float(1.0), &Value::Float(0.0)),
            Err(FoldError::DivisionByZero)
        );
        assert_eq!(
            fold_binary(BinOp::Mod, &Value::Integer(3), &Value::Integer(0)),
            Err(FoldError::DivisionByZero)
        );
    }

    #[test]
    fn mixed_arithmetic_promotes() {
        assert_eq!(
            fold_binary(BinOp::Mul, &Value::Integer(2), &Value::Float(1.5)),
            Ok(Value::Float(3.0))
        );
    }

    #[test]
    fn list_concat_promotes_scalar() {
        let l = Value::List(vec![Value::Integer(1)]);
        let got = fold_binary(BinOp::Add, &l, &Value::Str("x".into())).unwrap();
        assert_eq!(
            got,
            Value::List(vec![Value::Integer(1), Value::Str("x".into())])
        );
    }

    #[test]
    fn list_equality_compares_lengths() {
        let a = Value::List(vec![Value::Integer(1), Value::Integer(2)]);
        let b = Value::List(vec![Value::Str("a".into()), Value::Str("b".into())]);
        assert_eq!(fold_binary(BinOp::Eq, &a, &b), Ok(Value::Integer(1)));
    }

    #[test]
    fn vector_dot_and_cross() {
        let a = Value::Vector(Vec3::new(1.0, 0.0, 0.0));
        let b = Value::Vector(Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(fold_binary(BinOp::Mul, &a, &b), Ok(Value::Float(0.0)));
        assert_eq!(
            fold_binary(BinOp::Mod, &a, &b),
            Ok(Value::Vector(Vec3::new(0.0, 0.0, 1.0)))
        );
    }

    #[test]
    fn legacy_int_min_to_float_is_nan() {
        let got = cast(ScriptType::Float, &Value::Integer(i32::MIN), true).unwrap();
        match got {
            Value::Float(f) => assert!(f.is_nan()),
            other => panic!("expected float, got {other:?}"),
        }
        let clean = cast(ScriptType::Float, &Value::Integer(i32::MIN), false).unwrap();
        assert_eq!(clean, Value::Float(i32::MIN as f32));
    }

    #[test]
    fn string_casts() {
        assert_eq!(
            cast(ScriptType::Integer, &Value::Str("  42abc".into()), false),
            Some(Value::Integer(42))
        );
        assert_eq!(
            cast(ScriptType::Integer, &Value::Str("0x1F".into()), false),
            Some(Value::Integer(31))
        );
        assert_eq!(
            cast(ScriptType::Float, &Value::Str("2.5e2x".into()), false),
            Some(Value::Float(250.0))
        );
        assert_eq!(
            cast(ScriptType::Str, &Value::Float(1.0), false),
            Some(Value::Str("1.000000".into()))
        );
    }

    #[test]
    fn vector_to_string_fixed_formatting() {
        let v = Value::Vector(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(
            cast(ScriptType::Str, &v, false),
            Some(Value::Str("<1.00000, 2.00000, 3.00000>".into()))
        );
    }

    #[test]
    fn invalid_key_collapses_to_null_key() {
        assert_eq!(Value::key("not-a-uuid"), Value::Key(NULL_KEY.to_string()));
        let real = "12345678-1234-1234-1234-123456789abc";
        assert_eq!(Value::key(real), Value::Key(real.to_string()));
    }

    #[test]
    fn string_to_vector_falls_back_to_zero() {
        assert_eq!(
            cast(ScriptType::Vector, &Value::Str("<1, 2, 3>".into()), false),
            Some(Value::Vector(Vec3::new(1.0, 2.0, 3.0)))
        );
        assert_eq!(
            cast(ScriptType::Vector, &Value::Str("junk".into()), false),
            Some(Value::Vector(Vec3::ZERO))
        );
    }
}
