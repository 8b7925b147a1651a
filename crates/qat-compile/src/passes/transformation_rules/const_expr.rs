//! Folding of control flow that depends only on constants.
//!
//! After a function has been specialised on constant arguments, branches
//! on constant conditions become unconditional. With `assume_no_except`,
//! `invoke` instructions are lowered to plain calls followed by a branch to
//! the normal destination.

use std::rc::Rc;

use qat_ir::{constant_fold_function, BlockId, Builder, FuncId, InstrId, InstructionKind, Module, Value};
use tracing::debug;

use crate::error::CompileResult;
use crate::rules::notation::{basic_block, branch, capture, const_int, unnamed_invoke};
use crate::rules::{apply_replacements, Captures, Replacement, ReplacementRule, Replacements, RuleSet};

/// Build the rules that fold constant control flow.
pub fn const_expr_rules(assume_no_except: bool) -> RuleSet {
    let mut rules = RuleSet::new();

    let pattern = branch(
        capture("cond", &const_int()),
        capture("if_false", &basic_block()),
        capture("if_true", &basic_block()),
    );
    rules.add_rule(Rc::new(ReplacementRule::new(pattern, Rc::new(fold_branch))));

    if assume_no_except {
        rules.add_rule(Rc::new(ReplacementRule::new(unnamed_invoke(), Rc::new(lower_invoke))));
    }
    rules
}

fn fold_branch(
    builder: &mut Builder<'_>,
    instruction: InstrId,
    captures: &mut Captures,
    replacements: &mut Replacements,
) -> CompileResult<bool> {
    let cond = captures.get("cond").and_then(Value::as_const_int);
    let if_true = captures.get("if_true").and_then(Value::as_block);
    let if_false = captures.get("if_false").and_then(Value::as_block);
    let (Some(cond), Some(if_true), Some(if_false)) = (cond, if_true, if_false) else {
        return Ok(false);
    };
    let (taken, dropped) = if cond != 0 { (if_true, if_false) } else { (if_false, if_true) };

    builder.br(taken)?;
    if taken != dropped {
        if let Some(from) = builder.module().instruction(instruction).parent() {
            drop_incoming(builder.module_mut(), dropped, from)?;
        }
    }
    replacements.push(Replacement::delete(instruction));
    Ok(true)
}

fn lower_invoke(
    builder: &mut Builder<'_>,
    instruction: InstrId,
    _captures: &mut Captures,
    replacements: &mut Replacements,
) -> CompileResult<bool> {
    let inst = builder.module().instruction(instruction);
    let (Some(callee), Some((normal, unwind))) = (inst.called_function(), inst.invoke_destinations())
    else {
        return Ok(false);
    };
    let args = inst.call_arguments().to_vec();
    let from = inst.parent();

    let call = builder.call(callee, args, None)?;
    builder.br(normal)?;

    let module = builder.module_mut();
    module.take_name(instruction, call);
    module.replace_all_uses_with(&Value::Instruction(instruction), &Value::Instruction(call));
    if let (Some(from), true) = (from, unwind != normal) {
        drop_incoming(module, unwind, from)?;
    }
    replacements.push(Replacement::delete(instruction));
    Ok(true)
}

/// Remove the incoming edge from `from` in every phi node of `block`.
pub fn drop_incoming(module: &mut Module, block: BlockId, from: BlockId) -> CompileResult<()> {
    if module.block(block).is_erased() {
        return Ok(());
    }
    for id in module.block(block).instructions().to_vec() {
        let inst = module.instruction(id);
        let InstructionKind::Phi { blocks } = inst.kind() else {
            continue;
        };
        let (values, blocks): (Vec<Value>, Vec<BlockId>) = inst
            .operands()
            .iter()
            .cloned()
            .zip(blocks.iter().copied())
            .filter(|(_, incoming)| *incoming != from)
            .unzip();
        module.set_instruction_kind(id, InstructionKind::Phi { blocks })?;
        module.set_operands(id, values)?;
    }
    Ok(())
}

/// Fold constants and constant control flow in `function` until nothing
/// changes. Returns the number of instructions removed.
pub fn fold_function(module: &mut Module, function: FuncId, rules: &RuleSet) -> CompileResult<usize> {
    let mut removed = 0;
    loop {
        removed += constant_fold_function(module, function)?;

        let mut replacements = Replacements::new();
        for id in module.function_instructions(function) {
            rules.match_and_replace(module, id, &mut replacements)?;
        }
        if replacements.is_empty() {
            break;
        }
        removed += apply_replacements(module, replacements)?;
    }
    debug!("folded {removed} instructions in @{}", module.function(function).name());
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use qat_ll::{emit_function, parse};

    use super::*;

    fn fold(source: &str, assume_no_except: bool) -> String {
        let mut module = parse(source).unwrap();
        let main = module.get_function("Main").unwrap();
        fold_function(&mut module, main, &const_expr_rules(assume_no_except)).unwrap();
        emit_function(&module, main)
    }

    #[test]
    fn test_constant_branch_becomes_unconditional() {
        let source = r"
define i64 @Main() {
entry:
  %c = icmp eq i64 1, 1
  br i1 %c, label %then, label %else

then:
  br label %done

else:
  br label %done

done:
  %r = phi i64 [ 1, %then ], [ 2, %else ]
  ret i64 %r
}
";
        let text = fold(source, false);
        assert!(text.contains("br label %then"), "{text}");
        assert!(!text.contains("icmp"), "{text}");
        assert!(!text.contains("br i1"), "{text}");
    }

    #[test]
    fn test_folded_branch_prunes_phi_edge() {
        let source = r"
define i64 @Main() {
entry:
  br i1 false, label %done, label %other

other:
  br label %done

done:
  %r = phi i64 [ 1, %entry ], [ 2, %other ]
  ret i64 %r
}
";
        let text = fold(source, false);
        assert!(text.contains("br label %other"), "{text}");
        // The remaining single-input phi folds to its value.
        assert!(text.contains("ret i64 2"), "{text}");
    }

    #[test]
    fn test_invoke_lowered_when_no_except_assumed() {
        let source = r"
define i64 @Main() {
entry:
  %v = invoke i64 @Callee(i64 3) to label %ok unwind label %bad

ok:
  ret i64 %v

bad:
  ret i64 0
}

declare i64 @Callee(i64)
";
        let kept = fold(source, false);
        assert!(kept.contains("invoke"), "{kept}");

        let lowered = fold(source, true);
        assert!(!lowered.contains("invoke"), "{lowered}");
        assert!(lowered.contains("%v = call i64 @Callee(i64 3)"), "{lowered}");
        assert!(lowered.contains("br label %ok"), "{lowered}");
        assert!(lowered.contains("ret i64 %v"), "{lowered}");
    }
}
