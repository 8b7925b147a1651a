//! Textual LLVM IR Reader and Writer for QAT
//!
//! This crate reads the human-readable form of LLVM IR into a
//! [`qat_ir::Module`] and writes a module back out. It covers the subset of
//! the language that QIR programs use.
//!
//! # Supported Syntax
//!
//! | Feature | Example |
//! |---------|---------|
//! | Opaque and literal named types | `%Qubit = type opaque` |
//! | Globals with initializers | `@0 = internal constant [3 x i8] c"hi\00"` |
//! | Definitions and declarations | `define void @Main() #0 { ... }` |
//! | Attribute groups | `attributes #0 = { "EntryPoint" }` |
//! | Numbered and named values | `%0`, `%q`, `%"quoted name"` |
//! | Constant expressions | `inttoptr (i64 1 to %Qubit*)` |
//! | Metadata | parsed and dropped |
//!
//! # Example: Round-Trip
//!
//! ```rust
//! use qat_ll::{emit, parse};
//!
//! let source = r#"
//! %Qubit = type opaque
//!
//! define void @Main() #0 {
//! entry:
//!   %q = call %Qubit* @__quantum__rt__qubit_allocate()
//!   call void @__quantum__qis__h__body(%Qubit* %q)
//!   ret void
//! }
//!
//! declare %Qubit* @__quantum__rt__qubit_allocate()
//! declare void @__quantum__qis__h__body(%Qubit*)
//!
//! attributes #0 = { "EntryPoint" }
//! "#;
//!
//! let module = parse(source).unwrap();
//! let text = emit(&module);
//! assert!(text.contains("call void @__quantum__qis__h__body(%Qubit* %q)"));
//!
//! let reparsed = parse(&text).unwrap();
//! assert_eq!(reparsed.num_functions(), module.num_functions());
//! ```

mod ast;
mod emitter;
mod error;
mod lexer;
mod parser;

pub use emitter::{emit, emit_function, emit_instruction};
pub use error::{ParseError, ParseResult};
pub use parser::{parse, parse_ast};

// Re-export AST types for advanced users
pub mod syntax {
    pub use crate::ast::*;
}
