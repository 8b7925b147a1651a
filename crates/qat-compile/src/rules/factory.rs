//! Construction of the canonical rule catalogue.
//!
//! The [`RuleFactory`] appends rules to a [`RuleSet`]. Allocation rules share
//! the qubit and result [`AllocationManager`](crate::AllocationManager)s of
//! the profile, so that addresses stay consistent across the whole module.

use std::cell::RefCell;
use std::rc::Rc;

use qat_ir::{Builder, CastOp, FunctionType, InstrId, InstructionKind, Module, Type, User, Value};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::notation::{
    any, bit_cast, call, call_by_name_only, capture, const_int, delete_instruction, int_to_ptr, load,
};
use super::pattern::{Captures, PatternPtr};
use super::rule::{ReplaceFn, Replacement, ReplacementRule, Replacements};
use super::rule_set::RuleSet;
use crate::allocation::{Address, AllocationManagerPtr};
use crate::config::{Configuration, ParameterDoc};

const QUBIT_ALLOCATE: &str = "__quantum__rt__qubit_allocate";
const QUBIT_ALLOCATE_ARRAY: &str = "__quantum__rt__qubit_allocate_array";
const QUBIT_RELEASE: &str = "__quantum__rt__qubit_release";
const QUBIT_RELEASE_ARRAY: &str = "__quantum__rt__qubit_release_array";
const ARRAY_GET_ELEMENT_PTR_1D: &str = "__quantum__rt__array_get_element_ptr_1d";
const ARRAY_GET_SIZE_1D: &str = "__quantum__rt__array_get_size_1d";
const ARRAY_CREATE_1D: &str = "__quantum__rt__array_create_1d";
const RESULT_GET_ONE: &str = "__quantum__rt__result_get_one";
const RESULT_GET_ZERO: &str = "__quantum__rt__result_get_zero";
const RESULT_EQUAL: &str = "__quantum__rt__result_equal";
const MEASURE: &str = "__quantum__qis__m__body";
const MEASURE_Z: &str = "__quantum__qis__mz__body";
const READ_RESULT: &str = "__quantum__qis__read_result__body";

const REFERENCE_COUNT_CALLS: &[&str] = &[
    "__quantum__rt__string_update_reference_count",
    "__quantum__rt__result_update_reference_count",
    "__quantum__rt__array_update_reference_count",
];

const ALIAS_COUNT_CALLS: &[&str] = &[
    "__quantum__rt__string_update_alias_count",
    "__quantum__rt__result_update_alias_count",
    "__quantum__rt__array_update_alias_count",
];

const STRING_CALLS: &[&str] = &[
    "__quantum__rt__fail",
    "__quantum__rt__message",
    "__quantum__rt__string_update_alias_count",
    "__quantum__rt__string_create",
    "__quantum__rt__string_get_data",
    "__quantum__rt__string_get_length",
    "__quantum__rt__string_update_reference_count",
    "__quantum__rt__string_concatenate",
    "__quantum__rt__string_equal",
    "__quantum__rt__int_to_string",
    "__quantum__rt__double_to_string",
    "__quantum__rt__bool_to_string",
    "__quantum__rt__result_to_string",
    "__quantum__rt__pauli_to_string",
    "__quantum__rt__qubit_to_string",
    "__quantum__rt__range_to_string",
    "__quantum__rt__bigint_to_string",
];

/// Which rules [`RuleFactory::using_configuration`] installs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FactoryConfiguration {
    /// Remove reference count updates.
    pub disable_reference_counting: bool,
    /// Remove alias count updates.
    pub disable_alias_counting: bool,
    /// Remove string and message runtime calls.
    pub disable_string_support: bool,
    /// Replace comparisons against the one result with `read_result`.
    pub optimise_result_one: bool,
    /// Replace comparisons against the zero result with a negated `read_result`.
    pub optimise_result_zero: bool,
    /// Assign static addresses to qubit arrays.
    pub use_static_qubit_array_allocation: bool,
    /// Assign static addresses to single qubits.
    pub use_static_qubit_allocation: bool,
    /// Assign static addresses to measurement results.
    pub use_static_result_allocation: bool,
    /// Width of the integers that static addresses are cast from.
    pub default_integer_width: u32,
}

impl Default for FactoryConfiguration {
    fn default() -> Self {
        Self {
            disable_reference_counting: true,
            disable_alias_counting: true,
            disable_string_support: true,
            optimise_result_one: true,
            optimise_result_zero: true,
            use_static_qubit_array_allocation: true,
            use_static_qubit_allocation: true,
            use_static_result_allocation: true,
            default_integer_width: 64,
        }
    }
}

impl FactoryConfiguration {
    /// A configuration with every rule switched off.
    pub fn disabled() -> Self {
        Self {
            disable_reference_counting: false,
            disable_alias_counting: false,
            disable_string_support: false,
            optimise_result_one: false,
            optimise_result_zero: false,
            use_static_qubit_array_allocation: false,
            use_static_qubit_allocation: false,
            use_static_result_allocation: false,
            default_integer_width: 64,
        }
    }

    /// Check whether no rule is enabled.
    pub fn is_disabled(&self) -> bool {
        let disabled = Self {
            default_integer_width: self.default_integer_width,
            ..Self::disabled()
        };
        *self == disabled
    }
}

impl Configuration for FactoryConfiguration {
    const KEY: &'static str = "factory";

    fn section_name() -> &'static str {
        "Transformation rules"
    }

    fn section_description() -> &'static str {
        "Rules used to transform instruction sequences in the QIR."
    }

    fn parameters() -> &'static [ParameterDoc] {
        const PARAMETERS: &[ParameterDoc] = &[
            ParameterDoc::new(
                "disable-reference-counting",
                "Removes all reference counting instructions.",
            ),
            ParameterDoc::new("disable-alias-counting", "Removes all alias counting instructions."),
            ParameterDoc::new(
                "disable-string-support",
                "Removes string and message runtime calls.",
            ),
            ParameterDoc::new(
                "optimise-result-one",
                "Replaces branching on result equal to one with a read_result call.",
            ),
            ParameterDoc::new(
                "optimise-result-zero",
                "Replaces branching on result equal to zero with a negated read_result call.",
            ),
            ParameterDoc::new(
                "use-static-qubit-array-allocation",
                "Maps qubit array allocations and element accesses to static addresses.",
            ),
            ParameterDoc::new(
                "use-static-qubit-allocation",
                "Maps single qubit allocations to static addresses.",
            ),
            ParameterDoc::new(
                "use-static-result-allocation",
                "Maps measurement results to static addresses.",
            ),
            ParameterDoc::new(
                "default-integer-width",
                "Bit width of the integers static addresses are cast from.",
            ),
        ];
        PARAMETERS
    }
}

/// Builds rules into a [`RuleSet`].
///
/// # Example
///
/// ```
/// use qat_compile::{AllocationManager, FactoryConfiguration, RuleFactory, RuleSet};
///
/// let mut rules = RuleSet::new();
/// let mut factory = RuleFactory::new(
///     &mut rules,
///     AllocationManager::create_new(),
///     AllocationManager::create_new(),
/// );
/// factory.using_configuration(&FactoryConfiguration::default());
/// assert!(!rules.is_empty());
/// ```
pub struct RuleFactory<'a> {
    rule_set: &'a mut RuleSet,
    qubit_alloc_manager: AllocationManagerPtr,
    result_alloc_manager: AllocationManagerPtr,
    default_integer_width: u32,
}

impl<'a> RuleFactory<'a> {
    /// Create a factory adding to `rule_set`.
    pub fn new(
        rule_set: &'a mut RuleSet,
        qubit_alloc_manager: AllocationManagerPtr,
        result_alloc_manager: AllocationManagerPtr,
    ) -> Self {
        Self {
            rule_set,
            qubit_alloc_manager,
            result_alloc_manager,
            default_integer_width: 64,
        }
    }

    /// Install the rules enabled in `config`, most specific first.
    pub fn using_configuration(&mut self, config: &FactoryConfiguration) {
        self.set_default_integer_width(config.default_integer_width);

        if config.disable_reference_counting {
            self.disable_reference_counting();
        }
        if config.disable_alias_counting {
            self.disable_alias_counting();
        }
        if config.disable_string_support {
            self.disable_string_support();
        }
        if config.optimise_result_one {
            self.optimise_result_one();
        }
        if config.optimise_result_zero {
            self.optimise_result_zero();
        }
        if config.use_static_qubit_array_allocation {
            self.use_static_qubit_array_allocation();
        }
        if config.use_static_qubit_allocation {
            self.use_static_qubit_allocation();
        }
        if config.use_static_result_allocation {
            self.use_static_result_allocation();
        }
    }

    /// Width of the integer constants generated for static addresses.
    pub fn set_default_integer_width(&mut self, width: u32) {
        self.default_integer_width = width;
    }

    /// The qubit allocation manager.
    pub fn qubit_alloc_manager(&self) -> &AllocationManagerPtr {
        &self.qubit_alloc_manager
    }

    /// The result allocation manager.
    pub fn result_alloc_manager(&self) -> &AllocationManagerPtr {
        &self.result_alloc_manager
    }

    /// Add a prebuilt rule.
    pub fn add_rule(&mut self, rule: ReplacementRule) {
        self.rule_set.add_rule(Rc::new(rule));
    }

    fn add(&mut self, pattern: PatternPtr, replacer: ReplaceFn) {
        self.add_rule(ReplacementRule::new(pattern, replacer));
    }

    /// Remove every call of `name`.
    pub fn remove_function_call(&mut self, name: &str) {
        self.add(call_by_name_only(name), delete_instruction());
    }

    /// Remove reference count updates.
    pub fn disable_reference_counting(&mut self) {
        for name in REFERENCE_COUNT_CALLS {
            self.remove_function_call(name);
        }
    }

    /// Remove alias count updates.
    pub fn disable_alias_counting(&mut self) {
        for name in ALIAS_COUNT_CALLS {
            self.remove_function_call(name);
        }
    }

    /// Remove string and message runtime calls.
    pub fn disable_string_support(&mut self) {
        for name in STRING_CALLS {
            self.remove_function_call(name);
        }
    }

    /// Static addresses for qubit arrays of constant size, and for element
    /// accesses into them. Releases of static arrays give the addresses
    /// back to the qubit manager.
    ///
    /// Empty arrays hold no addresses. They are pointed at the next free
    /// address and their releases are removed without reaching the manager.
    pub fn use_static_qubit_array_allocation(&mut self) {
        let width = self.default_integer_width;
        let empty_arrays: Rc<RefCell<FxHashSet<InstrId>>> = Rc::default();

        // %array = call %Array* @__quantum__rt__qubit_allocate_array(i64 n)
        let qubits = self.qubit_alloc_manager.clone();
        let empty = empty_arrays.clone();
        let allocate: ReplaceFn = Rc::new(move |builder, val, captures, replacements| {
            let Some(size) = captured_int(captures, "size") else {
                return Ok(false);
            };
            let Ok(count) = u64::try_from(size) else {
                return Ok(false);
            };
            let ty = builder.module().instruction(val).ty().clone();
            if !ty.is_ptr() {
                return Ok(false);
            }

            let name = instruction_name(builder.module(), val);
            let offset = qubits.borrow_mut().allocate(&name, count)?;
            debug!("static array '{name}' of {count} qubits at {offset}");

            // Uses are rewired right away so that element accesses further
            // down the path see the constant address.
            let address = static_address(builder, width, offset, ty);
            if count == 0 {
                empty.borrow_mut().insert(address);
            }
            builder
                .module_mut()
                .replace_all_uses_with(&Value::Instruction(val), &Value::Instruction(address));
            replacements.push(Replacement::replace(val, address));
            Ok(true)
        });
        self.add(
            call(QUBIT_ALLOCATE_ARRAY, vec![capture("size", &any())]),
            allocate,
        );

        // %q = load %Qubit*, %Qubit** (bitcast (get_element_ptr_1d(inttoptr(a), i)))
        let get_element = call(
            ARRAY_GET_ELEMENT_PTR_1D,
            vec![
                int_to_ptr(capture("arrayName", &const_int())),
                capture("index", &const_int()),
            ],
        );
        let access_pattern = load(capture("cast", &bit_cast(capture("getElement", &get_element))));
        let access: ReplaceFn = Rc::new(move |builder, val, captures, replacements| {
            let (Some(offset), Some(index)) =
                (captured_int(captures, "arrayName"), captured_int(captures, "index"))
            else {
                return Ok(false);
            };
            let bits = captures
                .get("index")
                .and_then(|index| builder.module().value_type(index).int_width())
                .unwrap_or(width);

            let ty = builder.module().instruction(val).ty().clone();
            let address = builder.create_detached(
                InstructionKind::Cast(CastOp::IntToPtr),
                ty,
                vec![Value::const_int(bits, offset.wrapping_add(index))],
            );
            replacements.push(Replacement::replace(val, address));
            for key in ["getElement", "cast"] {
                if let Some(id) = captures.get(key).and_then(Value::as_instruction) {
                    if !is_scheduled(replacements, id) {
                        replacements.push(Replacement::delete(id));
                    }
                }
            }
            Ok(true)
        });
        self.add(access_pattern, access);

        let qubits = self.qubit_alloc_manager.clone();
        let release = release_static(qubits);
        let release_array: ReplaceFn = Rc::new(move |builder, val, captures, replacements| {
            let array = captures.get("array").and_then(Value::as_instruction);
            if array.is_some_and(|array| empty_arrays.borrow().contains(&array)) {
                debug!("removing release of empty array");
                replacements.push(Replacement::delete(val));
                return Ok(true);
            }
            release(builder, val, captures, replacements)
        });
        self.add(
            call(
                QUBIT_RELEASE_ARRAY,
                vec![capture("array", &int_to_ptr(capture("const", &const_int())))],
            ),
            release_array,
        );
    }

    /// Static addresses for single qubit allocations.
    pub fn use_static_qubit_allocation(&mut self) {
        let width = self.default_integer_width;

        let qubits = self.qubit_alloc_manager.clone();
        let allocate: ReplaceFn = Rc::new(move |builder, val, _captures, replacements| {
            let ty = builder.module().instruction(val).ty().clone();
            if !ty.is_ptr() {
                return Ok(false);
            }
            let name = instruction_name(builder.module(), val);
            let offset = qubits.borrow_mut().allocate(&name, 1)?;
            debug!("static qubit '{name}' at {offset}");

            let address = static_address(builder, width, offset, ty);
            builder
                .module_mut()
                .replace_all_uses_with(&Value::Instruction(val), &Value::Instruction(address));
            replacements.push(Replacement::replace(val, address));
            Ok(true)
        });
        self.add(call(QUBIT_ALLOCATE, vec![]), allocate);

        let qubits = self.qubit_alloc_manager.clone();
        self.add(
            call(QUBIT_RELEASE, vec![int_to_ptr(capture("const", &const_int()))]),
            release_static(qubits),
        );

        let fallback: ReplaceFn = Rc::new(|builder, val, captures, replacements| {
            let operand = captures
                .get("name")
                .map(|value| builder.module().value_label(value))
                .unwrap_or_default();
            error!("Attempted to release {operand} which was not allocated statically");
            error!("This is likely caused by a non-standard allocation");
            replacements.push(Replacement::delete(val));
            Ok(true)
        });
        self.add(call(QUBIT_RELEASE, vec![capture("name", &any())]), fallback);
    }

    /// Measurements write to static result addresses through `mz`.
    pub fn use_static_result_allocation(&mut self) {
        let width = self.default_integer_width;
        let results = self.result_alloc_manager.clone();

        // %r = call %Result* @__quantum__qis__m__body(%Qubit* q)
        //   becomes
        // call void @__quantum__qis__mz__body(%Qubit* q, %Result* inttoptr (i64 n to %Result*))
        let measure: ReplaceFn = Rc::new(move |builder, val, captures, replacements| {
            let Some(qubit) = captures.get("qubit").cloned() else {
                return Ok(false);
            };
            let result_ty = builder.module().instruction(val).ty().clone();
            if !result_ty.is_ptr() {
                return Ok(false);
            }

            let name = instruction_name(builder.module(), val);
            let offset = results.borrow_mut().allocate(&name, 1)?;
            let address = static_address(builder, width, offset, result_ty.clone());

            let qubit_ty = builder.module().value_type(&qubit);
            let mz = builder.module_mut().get_or_insert_function(
                MEASURE_Z,
                FunctionType::new(Type::Void, vec![qubit_ty, result_ty]),
            );
            builder.position_after(val);
            builder.call(mz, vec![qubit, Value::Instruction(address)], None)?;

            replacements.push(Replacement::replace(val, address));
            Ok(true)
        });
        self.add(call(MEASURE, vec![capture("qubit", &any())]), measure);
    }

    /// `result_equal(r, result_get_one())` becomes `read_result(r)`.
    pub fn optimise_result_one(&mut self) {
        self.optimise_result(RESULT_GET_ONE, false);
    }

    /// `result_equal(r, result_get_zero())` becomes `not(read_result(r))`.
    pub fn optimise_result_zero(&mut self) {
        self.optimise_result(RESULT_GET_ZERO, true);
    }

    fn optimise_result(&mut self, canonical: &str, negate: bool) {
        let get_canonical = call(canonical, vec![]);
        let replacer: ReplaceFn = Rc::new(move |builder, val, captures, replacements| {
            let Some(result) = captures.get("result").cloned() else {
                return Ok(false);
            };
            let result_ty = builder.module().value_type(&result);
            let read = builder.module_mut().get_or_insert_function(
                READ_RESULT,
                FunctionType::new(Type::bool(), vec![result_ty]),
            );

            let value = Value::Instruction(val);
            let mut replacement = builder.call(read, vec![result], None)?;
            if negate {
                replacement = builder.not(Value::Instruction(replacement), None)?;
            }
            let module = builder.module_mut();
            module.take_name(val, replacement);
            module.replace_all_uses_with(&value, &Value::Instruction(replacement));
            replacements.push(Replacement::delete(val));

            if let Some(canonical) = captures.get("one").and_then(Value::as_instruction) {
                if !is_scheduled(replacements, canonical)
                    && only_used_by_scheduled(builder.module(), canonical, replacements)
                {
                    replacements.push(Replacement::delete(canonical));
                }
            }
            Ok(true)
        });

        // The comparison is symmetric, so both operand orders are matched.
        self.add(
            call(
                RESULT_EQUAL,
                vec![capture("result", &any()), capture("one", &get_canonical)],
            ),
            replacer.clone(),
        );
        self.add(
            call(
                RESULT_EQUAL,
                vec![capture("one", &get_canonical), capture("result", &any())],
            ),
            replacer,
        );
    }

    /// `array_get_size_1d(array_create_1d(e, n))` with constant `n` becomes `n`.
    pub fn resolve_constant_array_sizes(&mut self) {
        let pattern = call(
            ARRAY_GET_SIZE_1D,
            vec![call(
                ARRAY_CREATE_1D,
                vec![capture("elementSize", &any()), capture("size", &any())],
            )],
        );
        let replacer: ReplaceFn = Rc::new(|builder, val, captures, replacements| {
            let Some(size) = captures.get("size").filter(|size| size.as_const_int().is_some()).cloned()
            else {
                return Ok(false);
            };
            builder
                .module_mut()
                .replace_all_uses_with(&Value::Instruction(val), &size);
            replacements.push(Replacement::delete(val));
            Ok(true)
        });
        self.add(pattern, replacer);
    }
}

/// Release the static address captured as `const` and drop the call.
fn release_static(manager: AllocationManagerPtr) -> ReplaceFn {
    Rc::new(move |_builder, val, captures, replacements| {
        let Some(address) = captured_int(captures, "const").and_then(|a| Address::try_from(a).ok())
        else {
            return Ok(false);
        };
        manager.borrow_mut().release(address)?;
        replacements.push(Replacement::delete(val));
        Ok(true)
    })
}

/// A detached `inttoptr` of `offset` to `ty`.
#[allow(clippy::cast_possible_wrap)]
fn static_address(builder: &mut Builder<'_>, width: u32, offset: Address, ty: Type) -> InstrId {
    builder.create_detached(
        InstructionKind::Cast(CastOp::IntToPtr),
        ty,
        vec![Value::const_int(width, offset as i64)],
    )
}

fn captured_int(captures: &Captures, name: &str) -> Option<i64> {
    captures.get(name).and_then(Value::as_const_int)
}

fn instruction_name(module: &Module, id: InstrId) -> String {
    module.instruction(id).name().unwrap_or_default().to_string()
}

fn is_scheduled(replacements: &Replacements, id: InstrId) -> bool {
    replacements.iter().any(|r| r.old == id)
}

fn only_used_by_scheduled(module: &Module, id: InstrId, replacements: &Replacements) -> bool {
    module
        .users_of(&Value::Instruction(id))
        .into_iter()
        .all(|user| match user {
            User::Instruction(user) => is_scheduled(replacements, user),
            User::Global(_) => false,
        })
}

#[cfg(test)]
mod tests {
    use qat_ll::{emit_function, parse};

    use super::*;
    use crate::allocation::AllocationManager;
    use crate::rules::rule::apply_replacements;

    fn run(source: &str, install: impl FnOnce(&mut RuleFactory<'_>)) -> (Module, String) {
        run_with(source, AllocationManager::create_new(), install)
    }

    fn run_with(
        source: &str,
        qubits: AllocationManagerPtr,
        install: impl FnOnce(&mut RuleFactory<'_>),
    ) -> (Module, String) {
        let mut module = parse(source).unwrap();
        let mut rules = RuleSet::new();
        let mut factory = RuleFactory::new(&mut rules, qubits, AllocationManager::create_new());
        install(&mut factory);

        let main = module.get_function("Main").unwrap();
        let mut replacements = Replacements::new();
        for id in module.function_instructions(main) {
            rules.match_and_replace(&mut module, id, &mut replacements).unwrap();
        }
        apply_replacements(&mut module, replacements).unwrap();
        let text = emit_function(&module, main);
        (module, text)
    }

    #[test]
    fn test_static_qubit_allocation() {
        let source = r"
%Qubit = type opaque

define void @Main() {
entry:
  %a = call %Qubit* @__quantum__rt__qubit_allocate()
  %b = call %Qubit* @__quantum__rt__qubit_allocate()
  call void @__quantum__qis__h__body(%Qubit* %b)
  call void @__quantum__rt__qubit_release(%Qubit* %b)
  call void @__quantum__rt__qubit_release(%Qubit* %a)
  ret void
}

declare %Qubit* @__quantum__rt__qubit_allocate()
declare void @__quantum__qis__h__body(%Qubit*)
declare void @__quantum__rt__qubit_release(%Qubit*)
";
        let (_, text) = run(source, |f: &mut RuleFactory<'_>| f.use_static_qubit_allocation());
        assert!(text.contains("%a = inttoptr i64 0 to %Qubit*"));
        assert!(text.contains("%b = inttoptr i64 1 to %Qubit*"));
        assert!(text.contains("call void @__quantum__qis__h__body(%Qubit* %b)"));
        assert!(!text.contains("qubit_release"));
    }

    #[test]
    fn test_array_access_uses_offset() {
        let source = r"
%Qubit = type opaque
%Array = type opaque

define void @Main() {
entry:
  %first = call %Array* @__quantum__rt__qubit_allocate_array(i64 2)
  %second = call %Array* @__quantum__rt__qubit_allocate_array(i64 3)
  %0 = call i8* @__quantum__rt__array_get_element_ptr_1d(%Array* %second, i64 1)
  %1 = bitcast i8* %0 to %Qubit**
  %q = load %Qubit*, %Qubit** %1
  call void @__quantum__qis__h__body(%Qubit* %q)
  call void @__quantum__rt__qubit_release_array(%Array* %second)
  ret void
}

declare %Array* @__quantum__rt__qubit_allocate_array(i64)
declare i8* @__quantum__rt__array_get_element_ptr_1d(%Array*, i64)
declare void @__quantum__qis__h__body(%Qubit*)
declare void @__quantum__rt__qubit_release_array(%Array*)
";
        let qubits = AllocationManager::create_new();
        let (_, text) = run_with(
            source,
            qubits.clone(),
            |f: &mut RuleFactory<'_>| f.use_static_qubit_array_allocation(),
        );
        assert!(text.contains("%first = inttoptr i64 0 to %Array*"));
        assert!(text.contains("%second = inttoptr i64 2 to %Array*"));
        assert!(text.contains("%q = inttoptr i64 3 to %Qubit*"));
        assert!(!text.contains("get_element_ptr"));
        assert!(!text.contains("bitcast"));
        assert!(!text.contains("release_array"));
        assert_eq!(qubits.borrow().allocations_in_use(), 2);
    }

    #[test]
    fn test_measurement_uses_static_result() {
        let source = r"
%Qubit = type opaque
%Result = type opaque

define void @Main(%Qubit* %q) {
entry:
  %r = call %Result* @__quantum__qis__m__body(%Qubit* %q)
  call void @__quantum__qis__x__body(%Qubit* %q)
  ret void
}

declare %Result* @__quantum__qis__m__body(%Qubit*)
declare void @__quantum__qis__x__body(%Qubit*)
";
        let (module, text) = run(source, |f: &mut RuleFactory<'_>| f.use_static_result_allocation());
        assert!(text.contains("%r = inttoptr i64 0 to %Result*"));
        assert!(text.contains("call void @__quantum__qis__mz__body(%Qubit* %q, %Result* %r)"));
        assert!(!text.contains("@__quantum__qis__m__body"));
        assert!(module.get_function(MEASURE_Z).is_some());
    }

    const RESULT_SOURCE: &str = r"
%Result = type opaque

define i1 @Main(%Result* %r) {
entry:
  %one = call %Result* @__quantum__rt__result_get_one()
  %eq = call i1 @__quantum__rt__result_equal(%Result* %one, %Result* %r)
  %zero = call %Result* @__quantum__rt__result_get_zero()
  %ne = call i1 @__quantum__rt__result_equal(%Result* %r, %Result* %zero)
  %both = and i1 %eq, %ne
  ret i1 %both
}

declare %Result* @__quantum__rt__result_get_one()
declare %Result* @__quantum__rt__result_get_zero()
declare i1 @__quantum__rt__result_equal(%Result*, %Result*)
";

    #[test]
    fn test_result_comparisons_become_reads() {
        let (_, text) = run(RESULT_SOURCE, |factory| {
            factory.optimise_result_one();
            factory.optimise_result_zero();
        });
        assert!(text.contains("%eq = call i1 @__quantum__qis__read_result__body(%Result* %r)"));
        assert!(text.contains("%ne = xor i1 %0, true") || text.contains("%ne = xor i1 %0, -1"));
        assert!(!text.contains("result_equal"));
        assert!(!text.contains("result_get_one"));
        assert!(!text.contains("result_get_zero"));
    }

    #[test]
    fn test_shared_canonical_result_survives_until_last_use() {
        let source = r"
%Result = type opaque

define i1 @Main(%Result* %a, %Result* %b) {
entry:
  %one = call %Result* @__quantum__rt__result_get_one()
  %x = call i1 @__quantum__rt__result_equal(%Result* %a, %Result* %one)
  %y = call i1 @__quantum__rt__result_equal(%Result* %b, %Result* %one)
  %both = and i1 %x, %y
  ret i1 %both
}

declare %Result* @__quantum__rt__result_get_one()
declare i1 @__quantum__rt__result_equal(%Result*, %Result*)
";
        let (_, text) = run(source, |f: &mut RuleFactory<'_>| f.optimise_result_one());
        assert!(text.contains("%x = call i1 @__quantum__qis__read_result__body(%Result* %a)"));
        assert!(text.contains("%y = call i1 @__quantum__qis__read_result__body(%Result* %b)"));
        assert!(!text.contains("result_get_one"));
    }

    #[test]
    fn test_reference_counting_removed() {
        let source = r"
%Array = type opaque
%String = type opaque

define void @Main() {
entry:
  %a = call %Array* @__quantum__rt__qubit_allocate_array(i64 2)
  call void @__quantum__rt__array_update_alias_count(%Array* %a, i32 1)
  call void @__quantum__rt__array_update_reference_count(%Array* %a, i32 -1)
  %s = call %String* @__quantum__rt__string_create(i8* null)
  call void @__quantum__rt__message(%String* %s)
  ret void
}

declare %Array* @__quantum__rt__qubit_allocate_array(i64)
declare void @__quantum__rt__array_update_alias_count(%Array*, i32)
declare void @__quantum__rt__array_update_reference_count(%Array*, i32)
declare %String* @__quantum__rt__string_create(i8*)
declare void @__quantum__rt__message(%String*)
";
        let (_, text) = run(source, |factory| {
            factory.disable_reference_counting();
            factory.disable_alias_counting();
            factory.disable_string_support();
        });
        assert!(text.contains("qubit_allocate_array"));
        assert!(!text.contains("update_alias_count"));
        assert!(!text.contains("update_reference_count"));
        assert!(!text.contains("string_create"));
        assert!(!text.contains("message"));
    }

    #[test]
    fn test_constant_array_size_resolved() {
        let source = r"
%Array = type opaque

define i64 @Main() {
entry:
  %a = call %Array* @__quantum__rt__array_create_1d(i32 8, i64 4)
  %n = call i64 @__quantum__rt__array_get_size_1d(%Array* %a)
  ret i64 %n
}

declare %Array* @__quantum__rt__array_create_1d(i32, i64)
declare i64 @__quantum__rt__array_get_size_1d(%Array*)
";
        let (_, text) = run(source, |f: &mut RuleFactory<'_>| f.resolve_constant_array_sizes());
        assert!(text.contains("ret i64 4"));
        assert!(!text.contains("array_get_size_1d"));
    }

    #[test]
    fn test_non_constant_array_size_is_kept() {
        let source = r"
%Qubit = type opaque
%Array = type opaque

define void @Main(i64 %n) {
entry:
  %a = call %Array* @__quantum__rt__qubit_allocate_array(i64 %n)
  ret void
}

declare %Array* @__quantum__rt__qubit_allocate_array(i64)
";
        let (_, text) = run(source, |f: &mut RuleFactory<'_>| f.use_static_qubit_array_allocation());
        assert!(text.contains("call %Array* @__quantum__rt__qubit_allocate_array(i64 %n)"));
    }

    #[test]
    fn test_factory_configuration_presets() {
        assert!(FactoryConfiguration::disabled().is_disabled());
        assert!(!FactoryConfiguration::default().is_disabled());

        let mut rules = RuleSet::new();
        let mut factory = RuleFactory::new(
            &mut rules,
            AllocationManager::create_new(),
            AllocationManager::create_new(),
        );
        factory.using_configuration(&FactoryConfiguration::disabled());
        assert!(rules.is_empty());
    }
}
