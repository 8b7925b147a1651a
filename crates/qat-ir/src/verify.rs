//! Structural verification of a module.

use crate::error::{IrError, IrResult};
use crate::instruction::InstructionKind;
use crate::module::Module;
use crate::value::{ConstExpr, Constant, FuncId, Value};

/// Check the structural invariants of every function in the module.
///
/// The checks cover block termination, references to erased nodes, phi
/// shape, and cross-function block or argument references. All problems are
/// collected before reporting.
pub fn verify_module(module: &Module) -> IrResult<()> {
    let mut problems = Vec::new();
    for function in module.functions() {
        verify_function(module, function, &mut problems);
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(IrError::Verification(problems))
    }
}

fn verify_function(module: &Module, id: FuncId, problems: &mut Vec<String>) {
    let function = module.function(id);
    let fname = function.name();

    for &block in function.blocks() {
        let bb = module.block(block);
        let label = module.value_label(&Value::Block(block));
        let Some(&last) = bb.instructions().last() else {
            problems.push(format!("@{fname}: block {label} is empty"));
            continue;
        };
        if !module.instruction(last).is_terminator() {
            problems.push(format!("@{fname}: block {label} does not end with a terminator"));
        }

        let mut seen_non_phi = false;
        for &inst_id in bb.instructions() {
            let inst = module.instruction(inst_id);
            let what = format!("@{fname}: {}", module.value_label(&Value::Instruction(inst_id)));

            if inst.parent() != Some(block) {
                problems.push(format!("{what} has an inconsistent parent"));
            }
            if inst.is_terminator() && inst_id != last {
                problems.push(format!("{what} is a terminator in the middle of block {label}"));
            }
            if let InstructionKind::Phi { blocks } = inst.kind() {
                if seen_non_phi {
                    problems.push(format!("{what} is not grouped at the top of block {label}"));
                }
                if blocks.len() != inst.num_operands() {
                    problems.push(format!("{what} has mismatched incoming values and blocks"));
                }
                for &incoming in blocks {
                    let b = module.block(incoming);
                    if b.is_erased() || b.parent() != Some(id) {
                        problems.push(format!("{what} refers to a block outside the function"));
                    }
                }
            } else {
                seen_non_phi = true;
            }

            for operand in inst.operands() {
                if let Some(problem) = check_operand(module, id, operand) {
                    problems.push(format!("{what} {problem}"));
                }
            }
        }
    }
}

fn check_operand(module: &Module, function: FuncId, operand: &Value) -> Option<String> {
    match operand {
        Value::Instruction(id) => {
            let inst = module.instruction(*id);
            if inst.is_erased() {
                return Some(format!("uses erased instruction {id}"));
            }
            if module.instruction_function(*id) != Some(function) {
                return Some(format!("uses instruction {id} from another function"));
            }
            None
        }
        Value::Block(id) => {
            let block = module.block(*id);
            if block.is_erased() {
                return Some(format!("uses erased block {id}"));
            }
            (block.parent() != Some(function)).then(|| format!("branches to foreign block {id}"))
        }
        Value::Argument { function: owner, .. } => {
            (*owner != function).then(|| "uses an argument of another function".to_string())
        }
        Value::Function(id) => module
            .function(*id)
            .is_erased()
            .then(|| format!("uses erased function {id}")),
        Value::Global(id) => module
            .global(*id)
            .is_erased()
            .then(|| format!("uses erased global {id}")),
        Value::Constant(Constant::Expr(expr)) => match expr.as_ref() {
            ConstExpr::Cast { value, .. } => check_operand(module, function, value),
            ConstExpr::GetElementPtr { base, .. } => check_operand(module, function, base),
        },
        Value::Constant(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::instruction::BinaryOp;
    use crate::types::{FunctionType, Type};

    #[test]
    fn test_verify_well_formed() {
        let mut module = Module::new("test");
        let f = module
            .add_function("main", FunctionType::new(Type::Void, vec![]))
            .unwrap();
        let entry = module.append_block(f, Some("entry".into()));
        let mut builder = Builder::new(&mut module);
        builder.position_at_end(entry);
        builder.ret(None).unwrap();

        assert!(verify_module(&module).is_ok());
    }

    #[test]
    fn test_verify_reports_missing_terminator_and_erased_use() {
        let mut module = Module::new("test");
        let f = module
            .add_function("main", FunctionType::new(Type::Void, vec![]))
            .unwrap();
        let entry = module.append_block(f, Some("entry".into()));
        let mut builder = Builder::new(&mut module);
        builder.position_at_end(entry);
        let a = builder
            .binary(BinaryOp::Add, Value::i64(1), Value::i64(1), Some("a".into()))
            .unwrap();
        builder
            .binary(BinaryOp::Add, Value::Instruction(a), Value::i64(1), Some("b".into()))
            .unwrap();
        module.erase_instruction(a).unwrap();

        let Err(IrError::Verification(problems)) = verify_module(&module) else {
            panic!("expected verification failure");
        };
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.contains("terminator")));
        assert!(problems.iter().any(|p| p.contains("erased instruction")));
    }
}
