//! Shorthand for building patterns and common replacers.
//!
//! ```
//! use qat_compile::rules::notation::*;
//!
//! // %2 = call i1 @__quantum__rt__result_equal(%Result* %r, %Result* %one)
//! let get_one = call("__quantum__rt__result_get_one", vec![]);
//! let pattern = call(
//!     "__quantum__rt__result_equal",
//!     vec![capture("result", &any()), capture("one", &get_one)],
//! );
//! assert_eq!(pattern.children().len(), 3);
//! ```

use std::rc::Rc;

use qat_ir::Value;

use super::pattern::{Pattern, PatternKind, PatternPtr};
use super::rule::{ReplaceFn, Replacement};

fn node(kind: PatternKind, children: Vec<PatternPtr>) -> PatternPtr {
    Rc::new(Pattern::new(kind, children))
}

/// Wildcard.
pub fn any() -> PatternPtr {
    node(PatternKind::Any, vec![])
}

/// A call of `name` with the given argument patterns.
///
/// An empty argument list still requires the call to take no arguments; the
/// callee operand is matched by an implicit wildcard.
pub fn call(name: &str, mut args: Vec<PatternPtr>) -> PatternPtr {
    args.push(any());
    node(PatternKind::Call(name.to_string()), args)
}

/// A call of `name` with any arguments.
pub fn call_by_name_only(name: &str) -> PatternPtr {
    node(PatternKind::Call(name.to_string()), vec![])
}

/// `load` from `pointer`.
pub fn load(pointer: PatternPtr) -> PatternPtr {
    node(PatternKind::Load, vec![pointer])
}

/// `store` of `value` to `pointer`.
pub fn store(value: PatternPtr, pointer: PatternPtr) -> PatternPtr {
    node(PatternKind::Store, vec![value, pointer])
}

/// `bitcast` of `value`.
pub fn bit_cast(value: PatternPtr) -> PatternPtr {
    node(PatternKind::BitCast, vec![value])
}

/// `inttoptr` of `value`.
pub fn int_to_ptr(value: PatternPtr) -> PatternPtr {
    node(PatternKind::IntToPtr, vec![value])
}

/// Any integer constant.
pub fn const_int() -> PatternPtr {
    node(PatternKind::ConstInt, vec![])
}

/// Conditional branch with operands in `[cond, false, true]` order.
pub fn branch(cond: PatternPtr, if_false: PatternPtr, if_true: PatternPtr) -> PatternPtr {
    node(PatternKind::Branch, vec![cond, if_false, if_true])
}

/// `select cond, a, b`.
pub fn select(cond: PatternPtr, if_true: PatternPtr, if_false: PatternPtr) -> PatternPtr {
    node(PatternKind::Select, vec![cond, if_true, if_false])
}

/// A phi over the given incoming value patterns.
pub fn phi(incoming: Vec<PatternPtr>) -> PatternPtr {
    node(PatternKind::Phi, incoming)
}

/// Any basic block.
pub fn basic_block() -> PatternPtr {
    node(PatternKind::BasicBlock, vec![])
}

/// A `switch`; operand patterns are optional.
pub fn switch(operands: Vec<PatternPtr>) -> PatternPtr {
    node(PatternKind::Switch, operands)
}

/// Any `invoke`.
pub fn unnamed_invoke() -> PatternPtr {
    node(PatternKind::UnnamedInvoke, vec![])
}

/// A copy of `pattern` that captures its match as `name`.
///
/// The shared original is left untouched, so the same template can be
/// captured under different names in different rules.
pub fn capture(name: &str, pattern: &PatternPtr) -> PatternPtr {
    Rc::new(pattern.with_capture(name))
}

/// Replacer that schedules the matched instruction for deletion.
pub fn delete_instruction() -> ReplaceFn {
    Rc::new(|_builder, instruction, _captures, replacements| {
        replacements.push(Replacement::delete(instruction));
        Ok(true)
    })
}

/// Replacer that schedules the matched instruction for deletion only if
/// nothing uses its result.
pub fn delete_unused_instruction() -> ReplaceFn {
    Rc::new(|builder, instruction, _captures, replacements| {
        if builder.module().has_uses(&Value::Instruction(instruction)) {
            return Ok(false);
        }
        replacements.push(Replacement::delete(instruction));
        Ok(true)
    })
}
