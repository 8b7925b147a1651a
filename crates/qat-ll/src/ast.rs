//! Abstract syntax tree of a textual IR module.
//!
//! The tree stays close to the source: names are still symbols and values
//! are unresolved. [`crate::parse`] lowers it to a [`qat_ir::Module`].

use qat_ir::{Attribute, BinaryOp, CastOp, IntPredicate, TailMarker, Type};

/// A whole module.
#[derive(Debug, Clone, Default)]
pub struct ModuleAst {
    pub source_filename: Option<String>,
    pub data_layout: Option<String>,
    pub target_triple: Option<String>,
    pub named_types: Vec<(String, Option<Type>)>,
    pub globals: Vec<GlobalAst>,
    pub functions: Vec<FunctionAst>,
    /// `attributes #N = { ... }` groups.
    pub attribute_groups: Vec<(u32, Vec<Attribute>)>,
}

/// A local or global symbol, either named or numbered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    Named(String),
    Numbered(u32),
}

impl Symbol {
    /// The name to store on the IR node. Numbered symbols are unnamed.
    pub fn ir_name(&self) -> Option<String> {
        match self {
            Symbol::Named(name) => Some(name.clone()),
            Symbol::Numbered(_) => None,
        }
    }

    /// Key used for lookup tables.
    pub fn key(&self) -> String {
        match self {
            Symbol::Named(name) => name.clone(),
            Symbol::Numbered(n) => n.to_string(),
        }
    }
}

/// A global variable definition.
#[derive(Debug, Clone)]
pub struct GlobalAst {
    pub name: Symbol,
    pub ty: Type,
    pub linkage: Option<String>,
    pub unnamed_addr: Option<String>,
    pub constant: bool,
    pub initializer: Option<ValueAst>,
    pub align: Option<u32>,
}

/// A function definition or declaration.
#[derive(Debug, Clone)]
pub struct FunctionAst {
    pub name: String,
    pub ret: Type,
    pub params: Vec<(Type, Option<Symbol>)>,
    pub var_arg: bool,
    pub linkage: Option<String>,
    pub unnamed_addr: Option<String>,
    pub attributes: Vec<Attribute>,
    pub attribute_groups: Vec<u32>,
    /// Empty for a declaration.
    pub blocks: Vec<BlockAst>,
}

/// A basic block. The entry block may have no label.
#[derive(Debug, Clone)]
pub struct BlockAst {
    pub label: Option<Symbol>,
    pub instructions: Vec<InstructionAst>,
}

/// A value with its type.
#[derive(Debug, Clone)]
pub struct TypedValue {
    pub ty: Type,
    pub value: ValueAst,
}

/// An unresolved value.
#[derive(Debug, Clone)]
pub enum ValueAst {
    Local(Symbol),
    Global(Symbol),
    Const(ConstAst),
}

/// A constant literal or constant expression.
#[derive(Debug, Clone)]
pub enum ConstAst {
    Int(i128),
    Bool(bool),
    /// Bit pattern of the value as an `f64`.
    Float(u64),
    Null,
    Undef,
    ZeroInit,
    CString(Vec<u8>),
    Array(Vec<TypedValue>),
    Struct(Vec<TypedValue>),
    Cast {
        op: CastOp,
        value: Box<TypedValue>,
        to: Type,
    },
    GetElementPtr {
        inbounds: bool,
        source: Type,
        base: Box<TypedValue>,
        indices: Vec<TypedValue>,
    },
}

/// One instruction with its optional result symbol.
#[derive(Debug, Clone)]
pub struct InstructionAst {
    pub result: Option<Symbol>,
    pub op: OpAst,
    pub line: usize,
}

/// Instruction operations.
#[derive(Debug, Clone)]
pub enum OpAst {
    Ret(Option<TypedValue>),
    Br(Symbol),
    CondBr {
        cond: TypedValue,
        if_true: Symbol,
        if_false: Symbol,
    },
    Switch {
        cond: TypedValue,
        default: Symbol,
        cases: Vec<(TypedValue, Symbol)>,
    },
    Unreachable,
    Call {
        tail: TailMarker,
        ret: Type,
        callee: ValueAst,
        args: Vec<TypedValue>,
    },
    Invoke {
        ret: Type,
        callee: ValueAst,
        args: Vec<TypedValue>,
        normal: Symbol,
        unwind: Symbol,
    },
    Binary {
        op: BinaryOp,
        ty: Type,
        lhs: ValueAst,
        rhs: ValueAst,
    },
    ICmp {
        pred: IntPredicate,
        ty: Type,
        lhs: ValueAst,
        rhs: ValueAst,
    },
    Cast {
        op: CastOp,
        value: TypedValue,
        to: Type,
    },
    Load {
        ty: Type,
        ptr: TypedValue,
        align: Option<u32>,
    },
    Store {
        value: TypedValue,
        ptr: TypedValue,
        align: Option<u32>,
    },
    Alloca {
        ty: Type,
        align: Option<u32>,
    },
    GetElementPtr {
        inbounds: bool,
        source: Type,
        base: TypedValue,
        indices: Vec<TypedValue>,
    },
    Select {
        cond: TypedValue,
        if_true: TypedValue,
        if_false: TypedValue,
    },
    Phi {
        ty: Type,
        incoming: Vec<(ValueAst, Symbol)>,
    },
}
