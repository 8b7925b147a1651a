//! Constant folding.
//!
//! Folding replaces an instruction whose result is known at compile time by
//! that result. Only integer arithmetic, integer comparisons, integer width
//! changes, `select` on a constant condition and trivially uniform `phi`
//! nodes are folded. Pointer casts are left alone since static addresses are
//! expressed as `inttoptr` instructions.

use crate::error::IrResult;
use crate::instruction::{BinaryOp, CastOp, InstructionKind, IntPredicate};
use crate::module::Module;
use crate::value::{normalize_int, unsigned_int, Constant, FuncId, InstrId, Value};

/// Compute the folded value of an instruction, if it has one.
pub fn fold_instruction(module: &Module, id: InstrId) -> Option<Value> {
    let inst = module.instruction(id);
    if inst.is_erased() {
        return None;
    }
    let ops = inst.operands();
    match inst.kind() {
        InstructionKind::Binary(op) => {
            let bits = inst.ty().int_width()?;
            let lhs = ops.first()?.as_const_int()?;
            let rhs = ops.get(1)?.as_const_int()?;
            fold_binary(*op, bits, lhs, rhs).map(|v| Value::const_int(bits, v))
        }
        InstructionKind::ICmp(pred) => {
            let lhs = ops.first()?;
            let rhs = ops.get(1)?;
            let result = match (lhs, rhs) {
                (Value::Constant(Constant::Null(_)), Value::Constant(Constant::Null(_))) => {
                    match pred {
                        IntPredicate::Eq | IntPredicate::Uge | IntPredicate::Ule => true,
                        IntPredicate::Ne | IntPredicate::Ugt | IntPredicate::Ult => false,
                        _ => return None,
                    }
                }
                _ => {
                    let bits = module.value_type(lhs).int_width()?;
                    fold_icmp(*pred, bits, lhs.as_const_int()?, rhs.as_const_int()?)
                }
            };
            Some(Value::bool(result))
        }
        InstructionKind::Cast(op) => {
            let value = ops.first()?.as_const_int()?;
            let from = module.value_type(ops.first()?).int_width()?;
            let to = inst.ty().int_width()?;
            let folded = match op {
                CastOp::Trunc | CastOp::SExt => value,
                CastOp::ZExt => i64::try_from(unsigned_int(value, from)).ok()?,
                _ => return None,
            };
            Some(Value::const_int(to, folded))
        }
        InstructionKind::Select => {
            let cond = ops.first()?.as_const_int()?;
            let chosen = if cond != 0 { ops.get(1)? } else { ops.get(2)? };
            (*chosen != Value::Instruction(id)).then(|| chosen.clone())
        }
        InstructionKind::Phi { .. } => {
            let first = ops.first()?;
            let uniform = ops.iter().all(|v| v == first);
            (uniform && *first != Value::Instruction(id)).then(|| first.clone())
        }
        _ => None,
    }
}

/// Fold an integer binary operation at the given width.
pub fn fold_binary(op: BinaryOp, bits: u32, lhs: i64, rhs: i64) -> Option<i64> {
    let ul = unsigned_int(lhs, bits);
    let ur = unsigned_int(rhs, bits);
    let shift_ok = ur < u64::from(bits.min(64));
    let result = match op {
        BinaryOp::Add => lhs.wrapping_add(rhs),
        BinaryOp::Sub => lhs.wrapping_sub(rhs),
        BinaryOp::Mul => lhs.wrapping_mul(rhs),
        BinaryOp::UDiv => (ul.checked_div(ur)?) as i64,
        BinaryOp::SDiv => lhs.checked_div(rhs)?,
        BinaryOp::URem => (ul.checked_rem(ur)?) as i64,
        BinaryOp::SRem => lhs.checked_rem(rhs)?,
        BinaryOp::Shl if shift_ok => lhs.wrapping_shl(ur as u32),
        BinaryOp::LShr if shift_ok => (ul >> ur) as i64,
        BinaryOp::AShr if shift_ok => lhs >> ur,
        BinaryOp::And => lhs & rhs,
        BinaryOp::Or => lhs | rhs,
        BinaryOp::Xor => lhs ^ rhs,
        _ => return None,
    };
    Some(normalize_int(result, bits))
}

/// Evaluate an integer comparison at the given width.
pub fn fold_icmp(pred: IntPredicate, bits: u32, lhs: i64, rhs: i64) -> bool {
    let ul = unsigned_int(lhs, bits);
    let ur = unsigned_int(rhs, bits);
    match pred {
        IntPredicate::Eq => lhs == rhs,
        IntPredicate::Ne => lhs != rhs,
        IntPredicate::Ugt => ul > ur,
        IntPredicate::Uge => ul >= ur,
        IntPredicate::Ult => ul < ur,
        IntPredicate::Ule => ul <= ur,
        IntPredicate::Sgt => lhs > rhs,
        IntPredicate::Sge => lhs >= rhs,
        IntPredicate::Slt => lhs < rhs,
        IntPredicate::Sle => lhs <= rhs,
    }
}

/// Fold every foldable instruction of a function until nothing changes.
///
/// Folded instructions have their uses replaced and are erased. Returns the
/// number of instructions removed.
pub fn constant_fold_function(module: &mut Module, function: FuncId) -> IrResult<usize> {
    let mut removed = 0;
    loop {
        let mut changed = false;
        for id in module.function_instructions(function) {
            if module.instruction(id).is_erased() {
                continue;
            }
            if let Some(value) = fold_instruction(module, id) {
                module.replace_all_uses_with(&Value::Instruction(id), &value);
                module.erase_instruction(id)?;
                removed += 1;
                changed = true;
            }
        }
        if !changed {
            return Ok(removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::types::{FunctionType, Type};

    #[test]
    fn test_fold_binary_wraps_at_width() {
        assert_eq!(fold_binary(BinaryOp::Add, 8, 127, 1), Some(-128));
        assert_eq!(fold_binary(BinaryOp::Sub, 64, 0, 1), Some(-1));
        assert_eq!(fold_binary(BinaryOp::UDiv, 64, 1, 0), None);
        assert_eq!(fold_binary(BinaryOp::LShr, 8, -1, 4), Some(15));
        assert_eq!(fold_binary(BinaryOp::Xor, 1, -1, -1), Some(0));
    }

    #[test]
    fn test_fold_icmp_signedness() {
        assert!(fold_icmp(IntPredicate::Slt, 64, -1, 0));
        assert!(!fold_icmp(IntPredicate::Ult, 64, -1, 0));
        assert!(fold_icmp(IntPredicate::Ne, 64, 1, 0));
    }

    #[test]
    fn test_constant_fold_function_chains() {
        let mut module = Module::new("test");
        let f = module
            .add_function("main", FunctionType::new(Type::bool(), vec![]))
            .unwrap();
        let entry = module.append_block(f, Some("entry".into()));

        let mut builder = Builder::new(&mut module);
        builder.position_at_end(entry);
        let n = builder
            .binary(BinaryOp::Add, Value::i64(0), Value::i64(1), Some("n".into()))
            .unwrap();
        let cmp = builder
            .insert(
                InstructionKind::ICmp(IntPredicate::Ne),
                Type::bool(),
                vec![Value::Instruction(n), Value::i64(0)],
                None,
            )
            .unwrap();
        let ret = builder.ret(Some(Value::Instruction(cmp))).unwrap();

        let removed = constant_fold_function(&mut module, f).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(module.block(entry).instructions(), &[ret]);
        assert_eq!(module.instruction(ret).operands()[0], Value::bool(true));
    }
}
