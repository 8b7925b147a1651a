//! End-to-end tests of the `qat` binary.
//!
//! Each test writes a program to a temporary directory, runs the binary on
//! it and checks the exit status and output.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const PROGRAM: &str = r#"
%Qubit = type opaque
%Result = type opaque

define void @Main() #0 {
entry:
  %a = call %Qubit* @__quantum__rt__qubit_allocate()
  %b = call %Qubit* @__quantum__rt__qubit_allocate()
  call void @__quantum__qis__h__body(%Qubit* %a)
  call void @__quantum__qis__cnot__body(%Qubit* %a, %Qubit* %b)
  %r = call %Result* @__quantum__qis__m__body(%Qubit* %b)
  call void @__quantum__rt__qubit_release(%Qubit* %b)
  call void @__quantum__rt__qubit_release(%Qubit* %a)
  ret void
}

declare %Qubit* @__quantum__rt__qubit_allocate()
declare void @__quantum__rt__qubit_release(%Qubit*)
declare void @__quantum__qis__h__body(%Qubit*)
declare void @__quantum__qis__cnot__body(%Qubit*, %Qubit*)
declare %Result* @__quantum__qis__m__body(%Qubit*)

attributes #0 = { "EntryPoint" }
"#;

fn qat(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_qat"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run qat")
}

fn write_program(dir: &Path) -> String {
    let path = dir.join("program.ll");
    fs::write(&path, PROGRAM).unwrap();
    path.to_string_lossy().into_owned()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ============================================================================
// Generation
// ============================================================================

#[test]
fn test_generate_base_profile_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_program(dir.path());

    let output = qat(&["--generate", "--validate", "--profile", "base", "-S", &input]);
    assert!(output.status.success(), "{}", stderr(&output));

    let text = stdout(&output);
    assert!(text.contains("call void @__quantum__qis__h__body(%Qubit* inttoptr (i64 0 to %Qubit*))"));
    assert!(text.contains(
        "call void @__quantum__qis__cnot__body(%Qubit* inttoptr (i64 0 to %Qubit*), %Qubit* inttoptr (i64 1 to %Qubit*))"
    ));
    assert!(text.contains(
        "call void @__quantum__qis__mz__body(%Qubit* inttoptr (i64 1 to %Qubit*), %Result* inttoptr (i64 0 to %Result*))"
    ));
    assert!(!text.contains("qubit_allocate"));
    assert!(text.contains("\"requiredQubits\"=\"2\""), "{text}");
}

#[test]
fn test_generate_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_program(dir.path());
    let out = dir.path().join("out.ll");

    let output = qat(&["--generate", "-o", out.to_str().unwrap(), &input]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).is_empty());

    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("define void @Main()"));
}

#[test]
fn test_disabled_static_allocation_keeps_calls() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_program(dir.path());

    let output = qat(&[
        "--generate",
        "--no-use-static-qubit-allocation",
        "-S",
        &input,
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("call %Qubit* @__quantum__rt__qubit_allocate()"));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_validation_failure_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_program(dir.path());

    let output = qat(&["--validate", "--profile", "base", &input]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("Error:"), "{err}");
    assert!(err.contains("__quantum__rt__qubit_allocate"), "{err}");
}

#[test]
fn test_validation_report_saved() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_program(dir.path());
    let report = dir.path().join("report.json");

    let output = qat(&[
        "--generate",
        "--validate",
        "--profile",
        "base",
        "--save-report-to",
        report.to_str().unwrap(),
        &input,
    ]);
    assert!(output.status.success(), "{}", stderr(&output));

    let json = fs::read_to_string(&report).unwrap();
    assert!(json.contains("\"profile\": \"base\""), "{json}");
    assert!(json.contains("__quantum__qis__mz__body"), "{json}");
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_dump_config_lists_parameters() {
    let output = qat(&["--dump-config", "--max-recursion", "12"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let text = stdout(&output);
    assert!(text.contains("max-recursion"));
    assert!(text.contains("12"));
    assert!(text.contains("disable-reference-counting"));
    assert!(text.contains("component 'transformation-rules' is enabled"));
}

#[test]
fn test_save_and_load_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("qat.yaml");

    let output = qat(&[
        "--no-reuse-qubits",
        "--disable-ir-passes",
        "--save-config",
        config.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", stderr(&output));

    let input = write_program(dir.path());
    let output = qat(&[
        "--load-config",
        config.to_str().unwrap(),
        "--generate",
        "-S",
        &input,
    ]);
    assert!(output.status.success(), "{}", stderr(&output));

    // Without ir-passes the static addresses stay instructions.
    let text = stdout(&output);
    assert!(text.contains("inttoptr i64 1 to %Qubit*"), "{text}");
}

#[test]
fn test_missing_input_is_an_error() {
    let output = qat(&["--generate"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Expected exactly one input file"));
}

#[test]
fn test_unknown_flag_is_rejected() {
    let output = qat(&["--no-such-parameter"]);
    assert!(!output.status.success());
}
