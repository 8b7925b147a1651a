//! Property-based tests for textual IR roundtrip conversion.
//!
//! Tests that text → module → text reaches a fixpoint after one emission and
//! that the module structure survives.

use proptest::prelude::*;
use qat_ir::verify_module;
use qat_ll::{emit, parse};

/// Gate operations that end up as QIR intrinsic calls.
#[derive(Debug, Clone)]
enum GateOp {
    H(u32),
    X(u32),
    Cnot(u32, u32),
    Rz(u32, f64),
    Measure(u32, u32),
}

impl GateOp {
    fn to_ir(&self) -> String {
        let q = |i: &u32| format!("%Qubit* inttoptr (i64 {i} to %Qubit*)");
        match self {
            GateOp::H(a) => format!("call void @__quantum__qis__h__body({})", q(a)),
            GateOp::X(a) => format!("call void @__quantum__qis__x__body({})", q(a)),
            GateOp::Cnot(a, b) => format!(
                "call void @__quantum__qis__cnot__body({}, {})",
                q(a),
                q(b)
            ),
            GateOp::Rz(a, angle) => format!(
                "call void @__quantum__qis__rz__body(double {angle:.3}, {})",
                q(a)
            ),
            GateOp::Measure(a, r) => format!(
                "call void @__quantum__qis__mz__body({}, %Result* inttoptr (i64 {r} to %Result*))",
                q(a)
            ),
        }
    }
}

fn arb_gate_op(num_qubits: u32) -> impl Strategy<Value = GateOp> {
    prop_oneof![
        (0..num_qubits).prop_map(GateOp::H),
        (0..num_qubits).prop_map(GateOp::X),
        (0..num_qubits, 0..num_qubits).prop_map(|(a, b)| GateOp::Cnot(a, b)),
        (0..num_qubits, -3.0_f64..3.0).prop_map(|(a, t)| GateOp::Rz(a, t)),
        (0..num_qubits, 0_u32..4).prop_map(|(a, r)| GateOp::Measure(a, r)),
    ]
}

fn program(ops: &[GateOp]) -> String {
    let body: String = ops.iter().map(|op| format!("  {}\n", op.to_ir())).collect();
    format!(
        r#"
%Qubit = type opaque
%Result = type opaque

define void @Main() #0 {{
entry:
{body}  ret void
}}

declare void @__quantum__qis__h__body(%Qubit*)
declare void @__quantum__qis__x__body(%Qubit*)
declare void @__quantum__qis__cnot__body(%Qubit*, %Qubit*)
declare void @__quantum__qis__rz__body(double, %Qubit*)
declare void @__quantum__qis__mz__body(%Qubit*, %Result*)

attributes #0 = {{ "EntryPoint" "requiredQubits"="5" }}
"#
    )
}

proptest! {
    #[test]
    fn prop_emit_is_a_fixpoint(ops in prop::collection::vec(arb_gate_op(5), 0..=12)) {
        let source = program(&ops);
        let module = parse(&source).unwrap();
        verify_module(&module).unwrap();

        let first = emit(&module);
        let reparsed = parse(&first).unwrap();
        let second = emit(&reparsed);
        prop_assert_eq!(first, second);

        let main = reparsed.get_function("Main").unwrap();
        // One call per gate plus the return.
        prop_assert_eq!(reparsed.function_instructions(main).len(), ops.len() + 1);
    }
}

#[test]
fn test_control_flow_round_trip() {
    let source = r"
%Result = type opaque

define i64 @Choose(%Result* %r) {
entry:
  %one = call %Result* @__quantum__rt__result_get_one()
  %eq = call i1 @__quantum__rt__result_equal(%Result* %r, %Result* %one)
  br i1 %eq, label %then0__1, label %continue__1

then0__1:
  br label %continue__1

continue__1:
  %v = phi i64 [ 1, %then0__1 ], [ 0, %entry ]
  ret i64 %v
}

declare %Result* @__quantum__rt__result_get_one()
declare i1 @__quantum__rt__result_equal(%Result*, %Result*)
";
    let module = parse(source).unwrap();
    let text = emit(&module);
    assert!(text.contains("br i1 %eq, label %then0__1, label %continue__1"));
    assert!(text.contains("%v = phi i64 [ 1, %then0__1 ], [ 0, %entry ]"));
    assert!(text.contains("define i64 @Choose(%Result* %r) {"));
    assert!(text.contains("declare i1 @__quantum__rt__result_equal(%Result*, %Result*)"));
    assert_eq!(emit(&parse(&text).unwrap()), text);
}

#[test]
fn test_unnamed_values_are_renumbered() {
    let source = "define i64 @f(i64) {\n  %2 = add i64 %0, 1\n  %3 = mul i64 %2, 2\n  ret i64 %3\n}\n";
    let text = emit(&parse(source).unwrap());
    // The entry block takes slot 1, so the numbering is unchanged.
    assert!(text.contains("define i64 @f(i64 %0) {"));
    assert!(text.contains("%2 = add i64 %0, 1"));
    assert!(text.contains("%3 = mul i64 %2, 2"));
}

#[test]
fn test_strings_and_constant_expressions() {
    let source = r#"
@0 = internal constant [6 x i8] c"hello\00"

define void @f() {
entry:
  call void @print(i8* getelementptr inbounds ([6 x i8], [6 x i8]* @0, i64 0, i64 0))
  ret void
}

declare void @print(i8*)
"#;
    let text = emit(&parse(source).unwrap());
    assert!(text.contains(r#"@0 = internal constant [6 x i8] c"hello\00""#));
    assert!(text.contains(
        "call void @print(i8* getelementptr inbounds ([6 x i8], [6 x i8]* @0, i64 0, i64 0))"
    ));
}
