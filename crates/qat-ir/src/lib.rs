//! QAT Program Representation
//!
//! This crate provides the mutable, graph-structured program representation
//! that the QIR adaptor tool rewrites. It models the subset of LLVM IR that
//! QIR programs use: functions made of basic blocks, instructions with operand
//! edges to other values, globals, and typed pointers to opaque runtime types.
//!
//! # Overview
//!
//! Every node is owned by a [`Module`] arena and referred to by a copyable
//! handle ([`FuncId`], [`BlockId`], [`InstrId`], [`GlobalId`]). Operands are
//! [`Value`]s, a closed sum of instruction results, arguments, blocks,
//! functions, globals and constants. Erased nodes stay in the arena as
//! tombstones, so a stale handle is detected rather than silently aliasing a
//! newer node.
//!
//! # Core Components
//!
//! - **Types**: [`Type`] and [`FunctionType`]
//! - **Values**: [`Value`], [`Constant`], [`ConstExpr`]
//! - **Instructions**: [`Instruction`] with an [`InstructionKind`] opcode
//! - **Functions**: [`Function`], [`BasicBlock`], [`Global`], [`Attribute`]
//! - **Module**: [`Module`] with use replacement, erasure and cloning
//! - **Builder**: [`Builder`] for creating instructions at an insertion point
//! - **Folding**: [`constant_fold_function`] and [`fold_instruction`]
//! - **Verification**: [`verify_module`]
//!
//! # Example: Building a Function
//!
//! ```rust
//! use qat_ir::{Builder, FunctionType, Module, Type, Value, verify_module};
//!
//! let mut module = Module::new("example");
//! let qubit = Type::named_ptr("Qubit");
//! let alloc = module
//!     .add_function("__quantum__rt__qubit_allocate", FunctionType::new(qubit, vec![]))
//!     .unwrap();
//! let main = module
//!     .add_function("Main", FunctionType::new(Type::Void, vec![]))
//!     .unwrap();
//! let entry = module.append_block(main, Some("entry".into()));
//!
//! let mut builder = Builder::new(&mut module);
//! builder.position_at_end(entry);
//! builder.call(alloc, vec![], Some("q".into())).unwrap();
//! builder.ret(None).unwrap();
//!
//! assert!(verify_module(&module).is_ok());
//! assert_eq!(module.function_instructions(main).len(), 2);
//! ```
//!
//! # Operand Layout
//!
//! | Instruction | Operands |
//! |-------------|----------|
//! | `call` | arguments..., callee |
//! | `br` | condition, false dest, true dest |
//! | `store` | value, pointer |
//! | `phi` | incoming values |

pub mod builder;
pub mod error;
pub mod fold;
pub mod function;
pub mod instruction;
pub mod module;
pub mod types;
pub mod value;
pub mod verify;

use std::borrow::Cow;

pub use builder::{Builder, InsertPoint};
pub use error::{IrError, IrResult};
pub use fold::{constant_fold_function, fold_binary, fold_icmp, fold_instruction};
pub use function::{Attribute, BasicBlock, Function, Global, Param};
pub use instruction::{
    BinaryOp, CastOp, Instruction, InstructionKind, IntPredicate, TailMarker,
};
pub use module::{Module, User};
pub use types::{FunctionType, Type};
pub use value::{
    BlockId, ConstExpr, Constant, FuncId, GlobalId, InstrId, Value, normalize_int, unsigned_int,
};
pub use verify::verify_module;

/// Quote a symbol name if it cannot be written bare after `%` or `@`.
pub fn quote_name(name: &str) -> Cow<'_, str> {
    let bare = name.chars().enumerate().all(|(i, c)| {
        c.is_ascii_alphabetic()
            || matches!(c, '-' | '$' | '.' | '_')
            || (i > 0 && c.is_ascii_digit())
    });
    if bare && !name.is_empty() {
        Cow::Borrowed(name)
    } else {
        let escaped: String = name
            .bytes()
            .map(|b| {
                if b == b'"' || b == b'\\' || !(0x20..0x7f).contains(&b) {
                    format!("\\{b:02X}")
                } else {
                    (b as char).to_string()
                }
            })
            .collect();
        Cow::Owned(format!("\"{escaped}\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_name() {
        assert_eq!(quote_name("Qubit"), "Qubit");
        assert_eq!(quote_name("Microsoft__Quantum__Main.body"), "Microsoft__Quantum__Main.body");
        assert_eq!(quote_name("0abc"), "\"0abc\"");
        assert_eq!(quote_name("with space"), "\"with space\"");
    }
}
