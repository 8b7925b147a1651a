//! Replacement rules: a pattern paired with a replacer.

use std::fmt;
use std::rc::Rc;

use qat_ir::{Builder, InstrId, Module, Value};
use rustc_hash::FxHashSet;
use tracing::trace;

use super::pattern::{Captures, PatternPtr};
use crate::error::{CompileError, CompileResult};

/// A scheduled change to an instruction.
///
/// `new` is a detached instruction that takes the place of `old`; `None`
/// deletes `old`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replacement {
    /// Instruction to replace or delete.
    pub old: InstrId,
    /// Detached replacement, if any.
    pub new: Option<InstrId>,
}

impl Replacement {
    /// Replace `old` with the detached instruction `new`.
    pub fn replace(old: InstrId, new: InstrId) -> Self {
        Self {
            old,
            new: Some(new),
        }
    }

    /// Delete `old`.
    pub fn delete(old: InstrId) -> Self {
        Self { old, new: None }
    }
}

/// Changes accumulated during a traversal, applied afterwards in reverse.
pub type Replacements = Vec<Replacement>;

/// Apply scheduled replacements, last scheduled first.
///
/// A replacement splices the new instruction into the old one's place. A
/// deletion first points any remaining uses at `undef`. Scheduling the same
/// instruction twice is a [`CompileError::ReplacementConflict`]; nothing is
/// changed in that case. Returns the number of instructions removed.
pub fn apply_replacements(module: &mut Module, replacements: Replacements) -> CompileResult<usize> {
    let mut seen = FxHashSet::default();
    for replacement in &replacements {
        if !seen.insert(replacement.old) {
            return Err(CompileError::ReplacementConflict(replacement.old));
        }
    }

    let mut removed = 0;
    for replacement in replacements.into_iter().rev() {
        let old = replacement.old;
        if module.instruction(old).is_erased() {
            continue;
        }
        match replacement.new {
            Some(new) => {
                trace!("replacing {old} with {new}");
                module.replace_instruction_with(old, new)?;
            }
            None => {
                trace!("deleting {old}");
                let value = Value::Instruction(old);
                if module.has_uses(&value) {
                    let undef = Value::undef(module.instruction(old).ty().clone());
                    module.replace_all_uses_with(&value, &undef);
                }
                module.erase_instruction(old)?;
            }
        }
        removed += 1;
    }
    Ok(removed)
}

/// A replacer receives a builder positioned before the matched instruction.
///
/// It returns `Ok(false)` when the match turns out not to be usable, in
/// which case the next rule is tried. Errors abort the transformation.
pub type ReplaceFn =
    Rc<dyn Fn(&mut Builder<'_>, InstrId, &mut Captures, &mut Replacements) -> CompileResult<bool>>;

/// A pattern and the replacer applied to its matches.
#[derive(Clone, Default)]
pub struct ReplacementRule {
    pattern: Option<PatternPtr>,
    replacer: Option<ReplaceFn>,
}

impl ReplacementRule {
    /// Create a rule.
    pub fn new(pattern: PatternPtr, replacer: ReplaceFn) -> Self {
        Self {
            pattern: Some(pattern),
            replacer: Some(replacer),
        }
    }

    /// Set the pattern.
    pub fn set_pattern(&mut self, pattern: PatternPtr) {
        self.pattern = Some(pattern);
    }

    /// Set the replacer.
    pub fn set_replacer(&mut self, replacer: ReplaceFn) {
        self.replacer = Some(replacer);
    }

    /// The pattern, if set.
    pub fn pattern(&self) -> Option<&PatternPtr> {
        self.pattern.as_ref()
    }

    /// Match an instruction. A rule without a pattern matches nothing.
    pub fn matches(&self, module: &Module, instruction: InstrId, captures: &mut Captures) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|pattern| pattern.matches(module, &Value::Instruction(instruction), captures))
    }

    /// Run the replacer. A rule without a replacer never replaces.
    pub fn replace(
        &self,
        builder: &mut Builder<'_>,
        instruction: InstrId,
        captures: &mut Captures,
        replacements: &mut Replacements,
    ) -> CompileResult<bool> {
        match &self.replacer {
            Some(replacer) => replacer(builder, instruction, captures, replacements),
            None => Ok(false),
        }
    }
}

impl fmt::Debug for ReplacementRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplacementRule")
            .field("pattern", &self.pattern)
            .field("has_replacer", &self.replacer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use qat_ir::{CastOp, InstructionKind, Type};
    use qat_ll::{emit_function, parse};

    use super::*;

    const SOURCE: &str = r"
%Qubit = type opaque

define void @Main() {
entry:
  %q = call %Qubit* @__quantum__rt__qubit_allocate()
  call void @__quantum__qis__h__body(%Qubit* %q)
  call void @__quantum__rt__qubit_release(%Qubit* %q)
  ret void
}

declare %Qubit* @__quantum__rt__qubit_allocate()
declare void @__quantum__qis__h__body(%Qubit*)
declare void @__quantum__rt__qubit_release(%Qubit*)
";

    #[test]
    fn test_apply_replacements_in_reverse() {
        let mut module = parse(SOURCE).unwrap();
        let main = module.get_function("Main").unwrap();
        let body = module.function_instructions(main);
        let (alloc, release) = (body[0], body[2]);

        let cast = module.create_instruction(
            InstructionKind::Cast(CastOp::IntToPtr),
            Type::named_ptr("Qubit"),
            vec![Value::i64(0)],
        );
        let replacements = vec![Replacement::replace(alloc, cast), Replacement::delete(release)];
        assert_eq!(apply_replacements(&mut module, replacements).unwrap(), 2);

        let text = emit_function(&module, main);
        assert!(text.contains("%q = inttoptr i64 0 to %Qubit*"));
        assert!(text.contains("call void @__quantum__qis__h__body(%Qubit* %q)"));
        assert!(!text.contains("qubit_release"));
    }

    #[test]
    fn test_duplicate_replacement_is_a_conflict() {
        let mut module = parse(SOURCE).unwrap();
        let main = module.get_function("Main").unwrap();
        let release = module.function_instructions(main)[2];

        let replacements = vec![Replacement::delete(release), Replacement::delete(release)];
        let err = apply_replacements(&mut module, replacements).unwrap_err();
        assert!(matches!(err, CompileError::ReplacementConflict(id) if id == release));
        assert_eq!(module.function_instructions(main).len(), 4);
    }

    #[test]
    fn test_deleting_used_value_leaves_undef() {
        let mut module = parse(SOURCE).unwrap();
        let main = module.get_function("Main").unwrap();
        let body = module.function_instructions(main);

        apply_replacements(&mut module, vec![Replacement::delete(body[0])]).unwrap();
        let h = module.instruction(body[1]);
        assert!(h.operands()[0].is_undef());
    }
}
