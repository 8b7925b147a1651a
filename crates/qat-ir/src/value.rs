//! Value handles and constants.

use std::fmt;

use crate::instruction::CastOp;
use crate::types::Type;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Index of this handle within its arena.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Handle to a function owned by a [`Module`](crate::Module).
    FuncId,
    "fn"
);
arena_id!(
    /// Handle to a basic block owned by a [`Module`](crate::Module).
    BlockId,
    "bb"
);
arena_id!(
    /// Handle to an instruction owned by a [`Module`](crate::Module).
    InstrId,
    "inst"
);
arena_id!(
    /// Handle to a global variable owned by a [`Module`](crate::Module).
    GlobalId,
    "global"
);

/// An operand: anything an instruction can refer to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Result of an instruction.
    Instruction(InstrId),
    /// Formal argument of a function.
    Argument {
        /// Owning function.
        function: FuncId,
        /// Position in the parameter list.
        index: u32,
    },
    /// A basic block used as a branch target.
    Block(BlockId),
    /// Address of a function.
    Function(FuncId),
    /// Address of a global variable.
    Global(GlobalId),
    /// A compile-time constant.
    Constant(Constant),
}

/// Compile-time constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Integer constant. The value is stored sign-extended from the type width.
    Int {
        /// Integer type.
        ty: Type,
        /// Sign-extended value.
        value: i64,
    },
    /// Floating point constant stored as the bits of an `f64`.
    Float {
        /// Float type.
        ty: Type,
        /// Bit pattern of the value widened to `f64`.
        bits: u64,
    },
    /// Null pointer.
    Null(Type),
    /// Undefined value.
    Undef(Type),
    /// All-zero aggregate.
    ZeroInit(Type),
    /// Byte string, e.g. `c"hello\00"`.
    CString(Vec<u8>),
    /// Constant array.
    Array {
        /// The array type.
        ty: Type,
        /// Element values.
        elements: Vec<Value>,
    },
    /// Constant structure.
    Struct {
        /// The structure type.
        ty: Type,
        /// Field values.
        fields: Vec<Value>,
    },
    /// Constant expression.
    Expr(Box<ConstExpr>),
}

/// Constant expressions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstExpr {
    /// `bitcast (T v to U)` and friends.
    Cast {
        /// Cast operation.
        op: CastOp,
        /// Operand.
        value: Value,
        /// Destination type.
        to: Type,
    },
    /// `getelementptr inbounds (T, T* base, idx...)`.
    GetElementPtr {
        /// Whether `inbounds` was given.
        inbounds: bool,
        /// Source element type.
        source: Type,
        /// Base pointer.
        base: Value,
        /// Indices.
        indices: Vec<Value>,
        /// Resulting pointer type.
        ty: Type,
    },
}

impl Value {
    /// Integer constant of the given width.
    pub fn const_int(bits: u32, value: i64) -> Self {
        Value::Constant(Constant::Int {
            ty: Type::Int(bits),
            value: normalize_int(value, bits),
        })
    }

    /// `i64` constant.
    pub fn i64(value: i64) -> Self {
        Self::const_int(64, value)
    }

    /// `i1` constant.
    pub fn bool(value: bool) -> Self {
        Self::const_int(1, i64::from(value))
    }

    /// Undefined value of the given type.
    pub fn undef(ty: Type) -> Self {
        Value::Constant(Constant::Undef(ty))
    }

    /// Null pointer of the given type.
    pub fn null(ty: Type) -> Self {
        Value::Constant(Constant::Null(ty))
    }

    /// The integer payload, if this is an integer constant.
    pub fn as_const_int(&self) -> Option<i64> {
        match self {
            Value::Constant(Constant::Int { value, .. }) => Some(*value),
            _ => None,
        }
    }

    /// The instruction handle, if this value is an instruction result.
    pub fn as_instruction(&self) -> Option<InstrId> {
        match self {
            Value::Instruction(id) => Some(*id),
            _ => None,
        }
    }

    /// The block handle, if this value is a block.
    pub fn as_block(&self) -> Option<BlockId> {
        match self {
            Value::Block(id) => Some(*id),
            _ => None,
        }
    }

    /// The function handle, if this value is a function.
    pub fn as_function(&self) -> Option<FuncId> {
        match self {
            Value::Function(id) => Some(*id),
            _ => None,
        }
    }

    /// Check whether this value is a compile-time constant.
    pub fn is_constant(&self) -> bool {
        matches!(self, Value::Constant(_))
    }

    /// Check whether this value is undefined.
    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Constant(Constant::Undef(_)))
    }

    /// Operands of a constant expression. Other values expose none.
    pub fn constant_operands(&self) -> Vec<Value> {
        match self {
            Value::Constant(Constant::Expr(expr)) => match expr.as_ref() {
                ConstExpr::Cast { value, .. } => vec![value.clone()],
                ConstExpr::GetElementPtr { base, indices, .. } => {
                    let mut operands = Vec::with_capacity(indices.len() + 1);
                    operands.push(base.clone());
                    operands.extend(indices.iter().cloned());
                    operands
                }
            },
            _ => Vec::new(),
        }
    }

    /// Replace every occurrence of `old` within this value, including values
    /// nested inside constants. Returns true if anything changed.
    pub(crate) fn replace_nested(&mut self, old: &Value, new: &Value) -> bool {
        if self == old {
            *self = new.clone();
            return true;
        }
        let Value::Constant(constant) = self else {
            return false;
        };
        match constant {
            Constant::Array { elements, .. } => replace_all(elements, old, new),
            Constant::Struct { fields, .. } => replace_all(fields, old, new),
            Constant::Expr(expr) => match expr.as_mut() {
                ConstExpr::Cast { value, .. } => value.replace_nested(old, new),
                ConstExpr::GetElementPtr { base, indices, .. } => {
                    let changed = base.replace_nested(old, new);
                    replace_all(indices, old, new) || changed
                }
            },
            _ => false,
        }
    }

    /// Check whether `needle` occurs in this value, including nested constants.
    pub(crate) fn references(&self, needle: &Value) -> bool {
        if self == needle {
            return true;
        }
        match self {
            Value::Constant(Constant::Array { elements, .. }) => {
                elements.iter().any(|e| e.references(needle))
            }
            Value::Constant(Constant::Struct { fields, .. }) => {
                fields.iter().any(|e| e.references(needle))
            }
            Value::Constant(Constant::Expr(expr)) => match expr.as_ref() {
                ConstExpr::Cast { value, .. } => value.references(needle),
                ConstExpr::GetElementPtr { base, indices, .. } => {
                    base.references(needle) || indices.iter().any(|i| i.references(needle))
                }
            },
            _ => false,
        }
    }
}

fn replace_all(values: &mut [Value], old: &Value, new: &Value) -> bool {
    let mut changed = false;
    for value in values {
        changed |= value.replace_nested(old, new);
    }
    changed
}

impl Constant {
    /// Type of the constant.
    pub fn ty(&self) -> Type {
        match self {
            Constant::Int { ty, .. }
            | Constant::Float { ty, .. }
            | Constant::Null(ty)
            | Constant::Undef(ty)
            | Constant::ZeroInit(ty)
            | Constant::Array { ty, .. }
            | Constant::Struct { ty, .. } => ty.clone(),
            Constant::CString(bytes) => Type::Array(bytes.len() as u64, Box::new(Type::i8())),
            Constant::Expr(expr) => match expr.as_ref() {
                ConstExpr::Cast { to, .. } => to.clone(),
                ConstExpr::GetElementPtr { ty, .. } => ty.clone(),
            },
        }
    }

    /// The floating point value, if this is a float constant.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Constant::Float { bits, .. } => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }
}

/// Truncate `value` to `bits` and sign-extend it back to 64 bits.
pub fn normalize_int(value: i64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return value;
    }
    let shift = 64 - bits;
    (value << shift) >> shift
}

/// Reinterpret a normalized integer as unsigned at the given width.
pub fn unsigned_int(value: i64, bits: u32) -> u64 {
    if bits == 0 || bits >= 64 {
        return value as u64;
    }
    (value as u64) & ((1_u64 << bits) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_int() {
        assert_eq!(normalize_int(1, 1), -1);
        assert_eq!(normalize_int(0, 1), 0);
        assert_eq!(normalize_int(255, 8), -1);
        assert_eq!(normalize_int(128, 8), -128);
        assert_eq!(normalize_int(127, 8), 127);
        assert_eq!(normalize_int(-5, 64), -5);
    }

    #[test]
    fn test_unsigned_int() {
        assert_eq!(unsigned_int(-1, 8), 255);
        assert_eq!(unsigned_int(-1, 1), 1);
        assert_eq!(unsigned_int(7, 64), 7);
    }

    #[test]
    fn test_bool_constant_is_sign_extended() {
        assert_eq!(Value::bool(true).as_const_int(), Some(-1));
        assert_eq!(Value::bool(false).as_const_int(), Some(0));
    }

    #[test]
    fn test_replace_nested_in_constant_expression() {
        let f = Value::Function(FuncId(0));
        let mut cast = Value::Constant(Constant::Expr(Box::new(ConstExpr::Cast {
            op: CastOp::BitCast,
            value: f.clone(),
            to: Type::i8().ptr(),
        })));
        assert!(cast.references(&f));
        assert!(cast.replace_nested(&f, &Value::undef(Type::i8().ptr())));
        assert!(!cast.references(&f));
    }
}
