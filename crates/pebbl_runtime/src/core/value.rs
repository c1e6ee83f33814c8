//! Runtime values.
//!
//! A `Value` is a NaN-boxed 64-bit word. Words whose exponent bits do not
//! form the quiet-NaN pattern are plain IEEE-754 doubles; boxed words carry a
//! three-bit tag in bits 50-48 and a 48-bit payload. Heap values store an
//! [`ObjectId`] slot index in the payload, never a raw address, so the
//! encoding involves no pointer punning.

use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use ahash::RandomState;
use hashbrown::HashMap;
use pebbl_ir::FuncDecl;

use super::chunk::FunctionProto;
use super::env::Env;
use super::gc::ObjectId;
use crate::errors::RuntimeError;

/// Hash map with a fixed-seed hasher. Iteration order is a pure function of
/// the insertion sequence, which keeps dict iteration identical between the
/// tree-walker and the VM.
pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;

pub fn fast_hasher() -> RandomState {
    RandomState::with_seeds(0, 0, 0, 0)
}

pub fn fast_map_new<K: Eq + Hash, V>() -> FastHashMap<K, V> {
    HashMap::with_hasher(fast_hasher())
}

pub fn fast_map_with_capacity<K: Eq + Hash, V>(cap: usize) -> FastHashMap<K, V> {
    HashMap::with_capacity_and_hasher(cap, fast_hasher())
}

// NaN-boxing constants
pub const EXP_MASK: u64 = 0x7ff0_0000_0000_0000;
pub const QNAN_MASK: u64 = 0x0008_0000_0000_0000;
pub const BOXED_BASE: u64 = EXP_MASK | QNAN_MASK;
pub const TAG_MASK: u64 = 0x0007_0000_0000_0000;
pub const TAG_SHIFT: u32 = 48;
pub const PAYLOAD_MASK: u64 = 0x0000_ffff_ffff_ffff;

pub const TAG_GC_PTR: u64 = 1;
pub const TAG_INT32: u64 = 2;
pub const TAG_BOOL: u64 = 3;
pub const TAG_NIL: u64 = 4;
pub const TAG_UNDEFINED: u64 = 5;

/// The canonical quiet NaN. Tag bits are zero, so it reads back as a double.
const CANONICAL_NAN: u64 = BOXED_BASE;

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Value(u64);

impl Default for Value {
    fn default() -> Self {
        Self::NIL
    }
}

impl Value {
    pub const NIL: Value = Value(BOXED_BASE | (TAG_NIL << TAG_SHIFT));
    pub const UNDEFINED: Value = Value(BOXED_BASE | (TAG_UNDEFINED << TAG_SHIFT));
    pub const TRUE: Value = Value(BOXED_BASE | (TAG_BOOL << TAG_SHIFT) | 1);
    pub const FALSE: Value = Value(BOXED_BASE | (TAG_BOOL << TAG_SHIFT));

    #[inline(always)]
    pub fn from_f64(f: f64) -> Self {
        // Every NaN input collapses to the canonical pattern so hardware
        // NaNs can never alias a tag.
        if f.is_nan() {
            return Self(CANONICAL_NAN);
        }
        Self(f.to_bits())
    }

    #[inline(always)]
    pub fn from_i32(i: i32) -> Self {
        // Sign-extend into the 48-bit payload so equal ints are bit-equal.
        Self(BOXED_BASE | (TAG_INT32 << TAG_SHIFT) | (i as i64 as u64 & PAYLOAD_MASK))
    }

    #[inline(always)]
    pub fn from_bool(b: bool) -> Self {
        if b { Self::TRUE } else { Self::FALSE }
    }

    #[inline(always)]
    pub fn gc_ptr(id: ObjectId) -> Self {
        Self(BOXED_BASE | (TAG_GC_PTR << TAG_SHIFT) | (id.0 as u64 & PAYLOAD_MASK))
    }

    #[inline(always)]
    pub fn bits(self) -> u64 {
        self.0
    }

    #[inline(always)]
    fn tag(self) -> u64 {
        (self.0 & TAG_MASK) >> TAG_SHIFT
    }

    #[inline(always)]
    pub fn is_double(self) -> bool {
        (self.0 & BOXED_BASE) != BOXED_BASE || self.tag() == 0
    }

    #[inline(always)]
    fn is_boxed(self) -> bool {
        !self.is_double()
    }

    #[inline(always)]
    pub fn is_int32(self) -> bool {
        self.is_boxed() && self.tag() == TAG_INT32
    }

    #[inline(always)]
    pub fn is_bool(self) -> bool {
        self.is_boxed() && self.tag() == TAG_BOOL
    }

    #[inline(always)]
    pub fn is_nil(self) -> bool {
        self.is_boxed() && self.tag() == TAG_NIL
    }

    #[inline(always)]
    pub fn is_undefined(self) -> bool {
        self.is_boxed() && self.tag() == TAG_UNDEFINED
    }

    #[inline(always)]
    pub fn is_gc_ptr(self) -> bool {
        self.is_boxed() && self.tag() == TAG_GC_PTR
    }

    /// True for int32 and double alike.
    #[inline(always)]
    pub fn is_number(self) -> bool {
        self.is_double() || self.is_int32()
    }

    #[inline(always)]
    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    #[inline(always)]
    pub fn as_i32(self) -> i32 {
        self.0 as u32 as i32
    }

    #[inline(always)]
    pub fn as_bool(self) -> bool {
        (self.0 & PAYLOAD_MASK) != 0
    }

    #[inline(always)]
    pub fn as_object_id(self) -> ObjectId {
        ObjectId((self.0 & PAYLOAD_MASK) as usize)
    }

    /// Conditionals: false, nil, 0 and 0.0 are falsy; everything else is
    /// truthy (including NaN, empty strings and empty containers).
    pub fn is_truthy(self) -> bool {
        if self.is_bool() {
            self.as_bool()
        } else if self.is_nil() {
            false
        } else if self.is_int32() {
            self.as_i32() != 0
        } else if self.is_double() {
            self.as_f64() != 0.0
        } else {
            true
        }
    }

    /// Equality: int32 and double cross-compare numerically, nil equals nil,
    /// heap values compare by identity. Mismatched variants are unequal.
    pub fn equals(self, other: Value) -> bool {
        if self.is_nil() && other.is_nil() {
            return true;
        }
        if self.is_nil() || other.is_nil() {
            return false;
        }
        if self.is_bool() && other.is_bool() {
            return self.as_bool() == other.as_bool();
        }
        if self.is_int32() && other.is_int32() {
            return self.as_i32() == other.as_i32();
        }
        if self.is_number() && other.is_number() {
            return self.widen() == other.widen();
        }
        if self.is_gc_ptr() && other.is_gc_ptr() {
            return self.as_object_id() == other.as_object_id();
        }
        false
    }

    #[inline(always)]
    fn widen(self) -> f64 {
        if self.is_int32() {
            self.as_i32() as f64
        } else {
            self.as_f64()
        }
    }

    pub fn add(self, other: Value) -> Result<Value, RuntimeError> {
        if self.is_int32() && other.is_int32() {
            return Ok(Value::from_i32(self.as_i32().wrapping_add(other.as_i32())));
        }
        let (a, b) = self.numeric_pair(other, "+")?;
        Ok(Value::from_f64(a + b))
    }

    pub fn sub(self, other: Value) -> Result<Value, RuntimeError> {
        if self.is_int32() && other.is_int32() {
            return Ok(Value::from_i32(self.as_i32().wrapping_sub(other.as_i32())));
        }
        let (a, b) = self.numeric_pair(other, "-")?;
        Ok(Value::from_f64(a - b))
    }

    pub fn mul(self, other: Value) -> Result<Value, RuntimeError> {
        if self.is_int32() && other.is_int32() {
            return Ok(Value::from_i32(self.as_i32().wrapping_mul(other.as_i32())));
        }
        let (a, b) = self.numeric_pair(other, "*")?;
        Ok(Value::from_f64(a * b))
    }

    /// Division always produces a double, even for int32 operands.
    pub fn div(self, other: Value) -> Result<Value, RuntimeError> {
        let (a, b) = self.numeric_pair(other, "/")?;
        if b == 0.0 {
            return Err(RuntimeError::DivisionByZero);
        }
        Ok(Value::from_f64(a / b))
    }

    pub fn neg(self) -> Result<Value, RuntimeError> {
        if self.is_int32() {
            Ok(Value::from_i32(self.as_i32().wrapping_neg()))
        } else if self.is_double() {
            Ok(Value::from_f64(-self.as_f64()))
        } else {
            Err(RuntimeError::TypeError(
                "Invalid operand for negation".to_string(),
            ))
        }
    }

    /// Numeric ordering for `<`, `>`, `<=`, `>=`.
    pub fn compare(self, other: Value, op: pebbl_ir::BinaryOp) -> Result<Value, RuntimeError> {
        use pebbl_ir::BinaryOp;
        if self.is_int32() && other.is_int32() {
            let a = self.as_i32();
            let b = other.as_i32();
            let res = match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Gt => a > b,
                BinaryOp::Le => a <= b,
                BinaryOp::Ge => a >= b,
                _ => return Err(invalid_comparison(op)),
            };
            return Ok(Value::from_bool(res));
        }
        let sym = comparison_symbol(op)?;
        let (a, b) = self.numeric_pair(other, sym)?;
        let res = match op {
            BinaryOp::Lt => a < b,
            BinaryOp::Gt => a > b,
            BinaryOp::Le => a <= b,
            BinaryOp::Ge => a >= b,
            _ => return Err(invalid_comparison(op)),
        };
        Ok(Value::from_bool(res))
    }

    fn numeric_pair(self, other: Value, sym: &str) -> Result<(f64, f64), RuntimeError> {
        if !self.is_number() || !other.is_number() {
            return Err(RuntimeError::TypeError(format!(
                "Invalid operands for {sym}"
            )));
        }
        Ok((self.widen(), other.widen()))
    }
}

fn comparison_symbol(op: pebbl_ir::BinaryOp) -> Result<&'static str, RuntimeError> {
    use pebbl_ir::BinaryOp;
    match op {
        BinaryOp::Lt => Ok("<"),
        BinaryOp::Gt => Ok(">"),
        BinaryOp::Le => Ok("<="),
        BinaryOp::Ge => Ok(">="),
        _ => Err(invalid_comparison(op)),
    }
}

fn invalid_comparison(op: pebbl_ir::BinaryOp) -> RuntimeError {
    RuntimeError::TypeError(format!("Invalid comparison operator {op:?}"))
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_double() {
            write!(f, "Double({})", self.as_f64())
        } else if self.is_int32() {
            write!(f, "Int32({})", self.as_i32())
        } else if self.is_bool() {
            write!(f, "Bool({})", self.as_bool())
        } else if self.is_nil() {
            write!(f, "Nil")
        } else if self.is_undefined() {
            write!(f, "Undefined")
        } else {
            write!(f, "Obj({})", self.as_object_id().0)
        }
    }
}

/// A callable heap object.
#[derive(Clone)]
pub enum Function {
    /// Declared under the tree-walking evaluator; the body is syntax.
    User(Rc<UserFunction>),
    /// Declared under the VM; the body is a compiled chunk.
    Bytecode(Rc<BytecodeFunction>),
    Builtin(BuiltinFunction),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::User(f) => &f.decl.name,
            Function::Bytecode(f) => &f.proto.name,
            Function::Builtin(f) => f.name,
        }
    }
}

pub struct UserFunction {
    pub decl: FuncDecl,
    /// Environment chain captured at declaration time.
    pub env: Env,
}

pub struct BytecodeFunction {
    pub proto: Rc<FunctionProto>,
    pub env: Env,
}

/// Native callable. Arity `None` means variadic.
#[derive(Clone, Copy)]
pub struct BuiltinFunction {
    pub name: &'static str,
    pub arity: Option<usize>,
    pub func: BuiltinFn,
}

pub type BuiltinFn =
    fn(&mut crate::Interpreter, &[Value]) -> Result<Value, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int32_payload_is_sign_extended_and_canonical() {
        for i in [0, 1, -1, i32::MIN, i32::MAX, 123_456, -123_456] {
            let v = Value::from_i32(i);
            assert!(v.is_int32());
            assert_eq!(v.as_i32(), i);
            assert_eq!(v.bits(), Value::from_i32(i).bits());
        }
    }

    #[test]
    fn nan_inputs_normalize_to_a_double() {
        let v = Value::from_f64(f64::NAN);
        assert!(v.is_double());
        assert!(v.as_f64().is_nan());
        let v = Value::from_f64(-f64::NAN);
        assert!(v.is_double());
    }

    #[test]
    fn infinities_stay_doubles() {
        assert!(Value::from_f64(f64::INFINITY).is_double());
        assert!(Value::from_f64(f64::NEG_INFINITY).is_double());
        assert_eq!(Value::from_f64(f64::INFINITY).as_f64(), f64::INFINITY);
    }

    #[test]
    fn division_widens_and_checks_zero() {
        let r = Value::from_i32(7).div(Value::from_i32(2)).unwrap();
        assert!(r.is_double());
        assert_eq!(r.as_f64(), 3.5);
        assert_eq!(
            Value::from_i32(1).div(Value::from_i32(0)),
            Err(RuntimeError::DivisionByZero)
        );
        assert_eq!(
            Value::from_f64(1.0).div(Value::from_f64(0.0)),
            Err(RuntimeError::DivisionByZero)
        );
    }

    #[test]
    fn nan_is_truthy_and_unequal_to_itself() {
        let nan = Value::from_f64(f64::NAN);
        assert!(nan.is_truthy());
        assert!(!nan.equals(nan));
    }
}
