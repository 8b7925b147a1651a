//! Shared harness for pipeline tests.
//!
//! Test programs are written as the body of an entry point. The harness
//! wraps them in a module with the runtime declarations they use, runs a
//! profile over it and checks the output for expected lines in order.

#![allow(dead_code)]

use qat_compile::{ConfigurationManager, Profile, ProfileGenerator};
use qat_ir::Module;
use qat_ll::{emit, parse};

const PRELUDE: &str = r"
%Qubit = type opaque
%Result = type opaque
%Array = type opaque
%String = type opaque
";

const DECLARATIONS: &str = r#"
declare %Qubit* @__quantum__rt__qubit_allocate()
declare void @__quantum__rt__qubit_release(%Qubit*)
declare %Array* @__quantum__rt__qubit_allocate_array(i64)
declare void @__quantum__rt__qubit_release_array(%Array*)
declare i8* @__quantum__rt__array_get_element_ptr_1d(%Array*, i64)
declare void @__quantum__rt__array_update_alias_count(%Array*, i32)
declare void @__quantum__rt__array_update_reference_count(%Array*, i32)
declare %Result* @__quantum__qis__m__body(%Qubit*)
declare %Result* @__quantum__rt__result_get_one()
declare %Result* @__quantum__rt__result_get_zero()
declare i1 @__quantum__rt__result_equal(%Result*, %Result*)
declare void @__quantum__rt__result_update_reference_count(%Result*, i32)
declare %String* @__quantum__rt__string_create(i8*)
declare void @__quantum__rt__string_update_reference_count(%String*, i32)
declare void @__quantum__rt__message(%String*)
declare void @__quantum__qis__h__body(%Qubit*)
declare void @__quantum__qis__x__body(%Qubit*)
declare void @__quantum__qis__cnot__body(%Qubit*, %Qubit*)

attributes #0 = { "EntryPoint" }
"#;

/// A module whose entry point `Main` has the given body, followed by
/// `extra` definitions.
pub fn entry_module(body: &str, extra: &str) -> String {
    format!("{PRELUDE}\ndefine void @Main() #0 {{\nentry:\n{body}\n}}\n\n{extra}\n{DECLARATIONS}")
}

/// Run the default profile over `source` and return the emitted module.
pub fn compile(source: &str) -> String {
    compile_with(source, |_| {})
}

/// Run a profile over `source` after adjusting its configuration.
pub fn compile_with(source: &str, configure: impl FnOnce(&mut ConfigurationManager)) -> String {
    let (module, _) = run_profile(source, "generic", configure);
    emit(&module)
}

/// Apply the named profile to `source`, returning the transformed module
/// and the profile for inspection.
pub fn run_profile(
    source: &str,
    profile: &str,
    configure: impl FnOnce(&mut ConfigurationManager),
) -> (Module, Profile) {
    let mut generator = ProfileGenerator::new().expect("generator");
    configure(generator.configuration_manager_mut());

    let mut module = parse(source).expect("test program parses");
    let mut profile = generator.new_profile(profile, true).expect("profile");
    profile.apply(&mut module).expect("profile applies");
    (module, profile)
}

/// Assert that every line of `expected` occurs in `text`, in order.
///
/// Lines are compared after trimming, so the expectation does not have to
/// reproduce indentation.
#[track_caller]
pub fn assert_contains_in_order(text: &str, expected: &[&str]) {
    let mut lines = text.lines().map(str::trim);
    for want in expected {
        assert!(
            lines.any(|line| line == *want),
            "expected line `{want}` (in order) in:\n{text}"
        );
    }
}

/// Assert that no line of `text` contains `needle`.
#[track_caller]
pub fn assert_absent(text: &str, needle: &str) {
    assert!(
        !text.lines().any(|line| line.contains(needle)),
        "unexpected `{needle}` in:\n{text}"
    );
}

/// The address expression of static qubit `n`.
pub fn qubit(n: u64) -> String {
    format!("%Qubit* inttoptr (i64 {n} to %Qubit*)")
}

/// The address expression of static result `n`.
pub fn result(n: u64) -> String {
    format!("%Result* inttoptr (i64 {n} to %Result*)")
}
