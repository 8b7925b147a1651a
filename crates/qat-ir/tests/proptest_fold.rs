//! Property-based tests for integer constant folding.
//!
//! Folding must agree with two's complement arithmetic at the operand width.

use proptest::prelude::*;
use qat_ir::{BinaryOp, IntPredicate, fold_binary, fold_icmp, normalize_int, unsigned_int};

/// Widths that appear in typical programs.
fn arb_width() -> impl Strategy<Value = u32> {
    prop_oneof![Just(1_u32), Just(8), Just(16), Just(32), Just(64)]
}

/// A width together with two operands already normalized to it.
fn arb_operands() -> impl Strategy<Value = (u32, i64, i64)> {
    arb_width().prop_flat_map(|bits| {
        (
            Just(bits),
            any::<i64>().prop_map(move |v| normalize_int(v, bits)),
            any::<i64>().prop_map(move |v| normalize_int(v, bits)),
        )
    })
}

proptest! {
    #[test]
    fn add_sub_mul_wrap_at_64_bits(lhs in any::<i64>(), rhs in any::<i64>()) {
        prop_assert_eq!(fold_binary(BinaryOp::Add, 64, lhs, rhs), Some(lhs.wrapping_add(rhs)));
        prop_assert_eq!(fold_binary(BinaryOp::Sub, 64, lhs, rhs), Some(lhs.wrapping_sub(rhs)));
        prop_assert_eq!(fold_binary(BinaryOp::Mul, 64, lhs, rhs), Some(lhs.wrapping_mul(rhs)));
    }

    #[test]
    fn results_stay_normalized((bits, lhs, rhs) in arb_operands()) {
        for op in [BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul, BinaryOp::And, BinaryOp::Or, BinaryOp::Xor] {
            let folded = fold_binary(op, bits, lhs, rhs).unwrap();
            prop_assert_eq!(folded, normalize_int(folded, bits));
        }
    }

    #[test]
    fn division_by_zero_does_not_fold((bits, lhs, _rhs) in arb_operands()) {
        prop_assert_eq!(fold_binary(BinaryOp::UDiv, bits, lhs, 0), None);
        prop_assert_eq!(fold_binary(BinaryOp::SDiv, bits, lhs, 0), None);
        prop_assert_eq!(fold_binary(BinaryOp::URem, bits, lhs, 0), None);
        prop_assert_eq!(fold_binary(BinaryOp::SRem, bits, lhs, 0), None);
    }

    #[test]
    fn equality_predicates_are_complementary((bits, lhs, rhs) in arb_operands()) {
        prop_assert_ne!(
            fold_icmp(IntPredicate::Eq, bits, lhs, rhs),
            fold_icmp(IntPredicate::Ne, bits, lhs, rhs)
        );
        prop_assert!(fold_icmp(IntPredicate::Eq, bits, lhs, lhs));
    }

    #[test]
    fn signed_and_unsigned_orderings((bits, lhs, rhs) in arb_operands()) {
        prop_assert_eq!(fold_icmp(IntPredicate::Slt, bits, lhs, rhs), lhs < rhs);
        prop_assert_eq!(
            fold_icmp(IntPredicate::Ult, bits, lhs, rhs),
            unsigned_int(lhs, bits) < unsigned_int(rhs, bits)
        );
        prop_assert_ne!(
            fold_icmp(IntPredicate::Sge, bits, lhs, rhs),
            fold_icmp(IntPredicate::Slt, bits, lhs, rhs)
        );
    }
}
