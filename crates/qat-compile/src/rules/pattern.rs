//! Structural patterns over program values.
//!
//! A [`Pattern`] is a tree: each node tests one value and its children are
//! matched positionally against the operands of that value. Nodes can carry
//! a capture name, in which case the matched value is recorded in the
//! [`Captures`] table for the replacer to use.

use std::rc::Rc;

use qat_ir::{CastOp, ConstExpr, Constant, InstructionKind, Module, Value};
use rustc_hash::FxHashMap;

/// Values recorded by named pattern nodes during a match.
pub type Captures = FxHashMap<String, Value>;

/// Shared handle to an immutable pattern.
pub type PatternPtr = Rc<Pattern>;

/// The shape a pattern node tests for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternKind {
    /// Matches anything.
    Any,
    /// A `call` or `invoke` of the named function.
    Call(String),
    /// A `load` instruction.
    Load,
    /// A `store` instruction.
    Store,
    /// A `bitcast` instruction or constant expression.
    BitCast,
    /// An `inttoptr` instruction or constant expression.
    IntToPtr,
    /// An integer constant.
    ConstInt,
    /// A `br` instruction.
    Branch,
    /// A `select` instruction.
    Select,
    /// A `phi` instruction.
    Phi,
    /// A basic block.
    BasicBlock,
    /// A `switch` instruction.
    Switch,
    /// An `invoke` instruction.
    UnnamedInvoke,
}

/// A node of a pattern tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    kind: PatternKind,
    capture: Option<String>,
    children: Vec<PatternPtr>,
}

impl Pattern {
    /// Create a pattern node without capture.
    pub fn new(kind: PatternKind, children: Vec<PatternPtr>) -> Self {
        Self {
            kind,
            capture: None,
            children,
        }
    }

    /// The tested shape.
    pub fn kind(&self) -> &PatternKind {
        &self.kind
    }

    /// The capture name, if any.
    pub fn capture_name(&self) -> Option<&str> {
        self.capture.as_deref()
    }

    /// Child patterns in operand order.
    pub fn children(&self) -> &[PatternPtr] {
        &self.children
    }

    /// A copy of this node, sharing the children.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// A copy of this node that captures its match under `name`.
    pub fn with_capture(&self, name: impl Into<String>) -> Self {
        let mut copy = self.copy();
        copy.capture = Some(name.into());
        copy
    }

    /// Match `value` against this pattern.
    ///
    /// On success the captures of every named node in the tree are recorded.
    /// On failure `captures` is left exactly as it was before the call.
    pub fn matches(&self, module: &Module, value: &Value, captures: &mut Captures) -> bool {
        let mut journal = Vec::new();
        self.match_recorded(module, value, captures, &mut journal)
    }

    fn match_recorded(
        &self,
        module: &Module,
        value: &Value,
        captures: &mut Captures,
        journal: &mut Journal,
    ) -> bool {
        if !self.test_shape(module, value) {
            return false;
        }
        self.success(module, value, captures, journal)
    }

    fn test_shape(&self, module: &Module, value: &Value) -> bool {
        match &self.kind {
            PatternKind::Any => true,
            PatternKind::Call(name) => {
                instruction_kind(module, value).is_some_and(|kind| {
                    matches!(kind, InstructionKind::Call { .. } | InstructionKind::Invoke)
                }) && called_name(module, value).is_some_and(|callee| callee == name)
            }
            PatternKind::Load => {
                matches!(instruction_kind(module, value), Some(InstructionKind::Load { .. }))
            }
            PatternKind::Store => {
                matches!(instruction_kind(module, value), Some(InstructionKind::Store { .. }))
            }
            PatternKind::BitCast => is_cast(module, value, CastOp::BitCast),
            PatternKind::IntToPtr => is_cast(module, value, CastOp::IntToPtr),
            PatternKind::ConstInt => value.as_const_int().is_some(),
            PatternKind::Branch => matches!(instruction_kind(module, value), Some(InstructionKind::Br)),
            PatternKind::Select => {
                matches!(instruction_kind(module, value), Some(InstructionKind::Select))
            }
            PatternKind::Phi => {
                matches!(instruction_kind(module, value), Some(InstructionKind::Phi { .. }))
            }
            PatternKind::BasicBlock => value.as_block().is_some(),
            PatternKind::Switch => {
                matches!(instruction_kind(module, value), Some(InstructionKind::Switch))
            }
            PatternKind::UnnamedInvoke => {
                matches!(instruction_kind(module, value), Some(InstructionKind::Invoke))
            }
        }
    }

    /// Record the capture, then match the children. If a child fails, every
    /// capture recorded since entering this node is undone.
    fn success(
        &self,
        module: &Module,
        value: &Value,
        captures: &mut Captures,
        journal: &mut Journal,
    ) -> bool {
        let mark = journal.len();
        if let Some(name) = &self.capture {
            let previous = captures.insert(name.clone(), value.clone());
            journal.push((name.clone(), previous));
        }

        if self.match_children(module, value, captures, journal) {
            return true;
        }

        while journal.len() > mark {
            let Some((name, previous)) = journal.pop() else {
                break;
            };
            match previous {
                Some(old) => {
                    captures.insert(name, old);
                }
                None => {
                    captures.remove(&name);
                }
            }
        }
        false
    }

    fn match_children(
        &self,
        module: &Module,
        value: &Value,
        captures: &mut Captures,
        journal: &mut Journal,
    ) -> bool {
        if self.children.is_empty() {
            return true;
        }

        let operands = operands_of(module, value);
        if operands.len() != self.children.len() {
            return false;
        }

        self.children
            .iter()
            .zip(&operands)
            .all(|(child, operand)| child.match_recorded(module, operand, captures, journal))
    }
}

/// Capture insertions in order, with the value each one overwrote.
type Journal = Vec<(String, Option<Value>)>;

fn instruction_kind<'m>(module: &'m Module, value: &Value) -> Option<&'m InstructionKind> {
    let id = value.as_instruction()?;
    let inst = module.instruction(id);
    (!inst.is_erased()).then(|| inst.kind())
}

fn called_name<'m>(module: &'m Module, value: &Value) -> Option<&'m str> {
    let id = value.as_instruction()?;
    let callee = module.instruction(id).called_function()?;
    Some(module.function(callee).name())
}

fn is_cast(module: &Module, value: &Value, op: CastOp) -> bool {
    match value {
        Value::Instruction(_) => {
            matches!(instruction_kind(module, value), Some(InstructionKind::Cast(found)) if *found == op)
        }
        Value::Constant(Constant::Expr(expr)) => {
            matches!(expr.as_ref(), ConstExpr::Cast { op: found, .. } if *found == op)
        }
        _ => false,
    }
}

/// Operands a pattern's children are matched against.
pub(crate) fn operands_of(module: &Module, value: &Value) -> Vec<Value> {
    match value {
        Value::Instruction(id) => module.instruction(*id).operands().to_vec(),
        Value::Constant(_) => value.constant_operands(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use qat_ll::parse;

    use super::*;
    use crate::rules::notation::*;

    const SOURCE: &str = r"
%Qubit = type opaque
%Result = type opaque
%Array = type opaque

define void @Main(%Result* %r) {
entry:
  %one = call %Result* @__quantum__rt__result_get_one()
  %eq = call i1 @__quantum__rt__result_equal(%Result* %r, %Result* %one)
  %arr = call %Array* @__quantum__rt__qubit_allocate_array(i64 3)
  %0 = call i8* @__quantum__rt__array_get_element_ptr_1d(%Array* %arr, i64 1)
  %1 = bitcast i8* %0 to %Qubit**
  %q = load %Qubit*, %Qubit** %1
  call void @__quantum__qis__h__body(%Qubit* inttoptr (i64 4 to %Qubit*))
  br i1 %eq, label %then, label %else

then:
  ret void

else:
  ret void
}

declare %Result* @__quantum__rt__result_get_one()
declare i1 @__quantum__rt__result_equal(%Result*, %Result*)
declare %Array* @__quantum__rt__qubit_allocate_array(i64)
declare i8* @__quantum__rt__array_get_element_ptr_1d(%Array*, i64)
declare void @__quantum__qis__h__body(%Qubit*)
";

    fn instruction(module: &Module, index: usize) -> Value {
        let main = module.get_function("Main").unwrap();
        Value::Instruction(module.function_instructions(main)[index])
    }

    #[test]
    fn test_nested_match_records_captures() {
        let module = parse(SOURCE).unwrap();
        let eq = instruction(&module, 1);
        let pattern = call(
            "__quantum__rt__result_equal",
            vec![
                capture("result", &any()),
                capture("one", &call("__quantum__rt__result_get_one", vec![])),
            ],
        );

        let mut captures = Captures::default();
        assert!(pattern.matches(&module, &eq, &mut captures));
        assert_eq!(captures.len(), 2);
        assert_eq!(captures["one"], instruction(&module, 0));
        assert!(matches!(captures["result"], Value::Argument { index: 0, .. }));
    }

    #[test]
    fn test_failed_match_restores_captures() {
        let module = parse(SOURCE).unwrap();
        let eq = instruction(&module, 1);
        // The first argument matches and is captured before the second fails.
        let pattern = call(
            "__quantum__rt__result_equal",
            vec![
                capture("result", &any()),
                capture("one", &call("__quantum__rt__result_get_zero", vec![])),
            ],
        );

        let mut captures = Captures::default();
        captures.insert("result".into(), Value::i64(7));
        assert!(!pattern.matches(&module, &eq, &mut captures));
        assert_eq!(captures.len(), 1);
        assert_eq!(captures["result"], Value::i64(7));
    }

    #[test]
    fn test_operand_count_must_agree() {
        let module = parse(SOURCE).unwrap();
        let eq = instruction(&module, 1);
        let mut captures = Captures::default();

        let too_few = call("__quantum__rt__result_equal", vec![any()]);
        assert!(!too_few.matches(&module, &eq, &mut captures));
        assert!(call_by_name_only("__quantum__rt__result_equal").matches(&module, &eq, &mut captures));
        assert!(captures.is_empty());
    }

    #[test]
    fn test_array_access_chain() {
        let module = parse(SOURCE).unwrap();
        let load_value = instruction(&module, 5);
        let get_element = call(
            "__quantum__rt__array_get_element_ptr_1d",
            vec![capture("array", &any()), capture("index", &const_int())],
        );
        let pattern = load(capture("cast", &bit_cast(capture("getElement", &get_element))));

        let mut captures = Captures::default();
        assert!(pattern.matches(&module, &load_value, &mut captures));
        assert_eq!(captures["index"], Value::i64(1));
        assert_eq!(captures["getElement"], instruction(&module, 3));
        assert_eq!(captures["array"], instruction(&module, 2));
    }

    #[test]
    fn test_constant_expression_cast() {
        let module = parse(SOURCE).unwrap();
        let h = instruction(&module, 6);
        let pattern = call(
            "__quantum__qis__h__body",
            vec![int_to_ptr(capture("address", &const_int()))],
        );
        let mut captures = Captures::default();
        assert!(pattern.matches(&module, &h, &mut captures));
        assert_eq!(captures["address"], Value::i64(4));
    }

    #[test]
    fn test_branch_operand_order() {
        let module = parse(SOURCE).unwrap();
        let br = instruction(&module, 7);
        let pattern = branch(
            capture("cond", &any()),
            capture("if_false", &basic_block()),
            capture("if_true", &basic_block()),
        );
        let mut captures = Captures::default();
        assert!(pattern.matches(&module, &br, &mut captures));

        let main = module.get_function("Main").unwrap();
        let blocks = module.function(main).blocks();
        assert_eq!(captures["if_true"], Value::Block(blocks[1]));
        assert_eq!(captures["if_false"], Value::Block(blocks[2]));

        let mut captures = Captures::default();
        assert!(!branch(const_int(), any(), any()).matches(&module, &br, &mut captures));
    }
}
