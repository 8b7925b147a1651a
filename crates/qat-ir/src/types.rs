//! Type system of the program representation.

use std::fmt;

/// A first-class IR type.
///
/// Pointers are typed, matching the QIR convention where runtime handles are
/// pointers to opaque named structures (`%Qubit*`, `%Result*`, `%Array*`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// The empty type of calls that produce no value.
    Void,
    /// Integer with the given bit width.
    Int(u32),
    /// 16-bit float.
    Half,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Basic block label.
    Label,
    /// Metadata.
    Metadata,
    /// Typed pointer.
    Ptr(Box<Type>),
    /// Reference to a named type such as `%Qubit`.
    Named(String),
    /// Fixed-size array.
    Array(u64, Box<Type>),
    /// Literal structure.
    Struct(Vec<Type>),
    /// Function signature.
    Function(Box<FunctionType>),
}

/// Signature of a function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    /// Return type.
    pub ret: Type,
    /// Parameter types.
    pub params: Vec<Type>,
    /// Whether the function accepts additional variadic arguments.
    pub var_arg: bool,
}

impl FunctionType {
    /// Create a non-variadic signature.
    pub fn new(ret: Type, params: Vec<Type>) -> Self {
        Self {
            ret,
            params,
            var_arg: false,
        }
    }
}

impl Type {
    /// `i1`.
    pub fn bool() -> Self {
        Type::Int(1)
    }

    /// `i8`.
    pub fn i8() -> Self {
        Type::Int(8)
    }

    /// `i32`.
    pub fn i32() -> Self {
        Type::Int(32)
    }

    /// `i64`.
    pub fn i64() -> Self {
        Type::Int(64)
    }

    /// A pointer to this type.
    #[must_use]
    pub fn ptr(self) -> Self {
        Type::Ptr(Box::new(self))
    }

    /// A pointer to the named type, e.g. `%Qubit*`.
    pub fn named_ptr(name: impl Into<String>) -> Self {
        Type::Named(name.into()).ptr()
    }

    /// Check whether this is an integer type.
    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    /// Bit width of an integer type.
    pub fn int_width(&self) -> Option<u32> {
        match self {
            Type::Int(bits) => Some(*bits),
            _ => None,
        }
    }

    /// Check whether this is a pointer type.
    pub fn is_ptr(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }

    /// Check whether this is the void type.
    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// The type a pointer points to.
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    /// Check whether this is one of the floating point types.
    pub fn is_float(&self) -> bool {
        matches!(self, Type::Half | Type::Float | Type::Double)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Half => write!(f, "half"),
            Type::Float => write!(f, "float"),
            Type::Double => write!(f, "double"),
            Type::Label => write!(f, "label"),
            Type::Metadata => write!(f, "metadata"),
            Type::Ptr(inner) => write!(f, "{inner}*"),
            Type::Named(name) => write!(f, "%{}", crate::quote_name(name)),
            Type::Array(len, elem) => write!(f, "[{len} x {elem}]"),
            Type::Struct(fields) => {
                if fields.is_empty() {
                    return write!(f, "{{}}");
                }
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, " }}")
            }
            Type::Function(sig) => write!(f, "{sig}"),
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        if self.var_arg {
            if self.params.is_empty() {
                write!(f, "...")?;
            } else {
                write!(f, ", ...")?;
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_pointer_types() {
        assert_eq!(Type::named_ptr("Qubit").to_string(), "%Qubit*");
        assert_eq!(Type::named_ptr("Qubit").ptr().to_string(), "%Qubit**");
        assert_eq!(Type::i8().ptr().to_string(), "i8*");
    }

    #[test]
    fn test_display_aggregates() {
        let array = Type::Array(3, Box::new(Type::i8()));
        assert_eq!(array.to_string(), "[3 x i8]");

        let tuple = Type::Struct(vec![Type::i64(), Type::named_ptr("Array")]);
        assert_eq!(tuple.to_string(), "{ i64, %Array* }");
    }

    #[test]
    fn test_display_function_pointer() {
        let sig = FunctionType::new(Type::Void, vec![Type::named_ptr("Tuple"), Type::i64()]);
        let ptr = Type::Function(Box::new(sig)).ptr();
        assert_eq!(ptr.to_string(), "void (%Tuple*, i64)*");
    }

    #[test]
    fn test_int_helpers() {
        assert_eq!(Type::bool().int_width(), Some(1));
        assert!(Type::i64().is_int());
        assert!(!Type::Double.is_int());
        assert_eq!(Type::named_ptr("Result").pointee(), Some(&Type::Named("Result".into())));
    }
}
