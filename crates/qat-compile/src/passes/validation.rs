//! Validation of a module against a target profile.
//!
//! The validator tallies every opcode, every call to a declared (external)
//! function and every call to a defined (internal) function. Depending on
//! the profile, opcodes and external calls must come from an allow list and
//! internal calls may be forbidden altogether.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use qat_ir::Module;

use crate::config::{Configuration, ParameterDoc};
use crate::error::{CompileError, CompileResult};
use crate::pass::{Pass, PassKind};
use crate::property::PropertySet;

/// Opcodes a base profile program may contain.
pub const BASE_OPCODES: &[&str] = &["br", "call", "unreachable", "ret", "phi", "select"];

/// Runtime and intrinsic functions a base profile program may call.
pub const BASE_EXTERNAL_CALLS: &[&str] = &[
    "__quantum__qis__mz__body",
    "__quantum__qis__read_result__body",
    "__quantum__qis__reset__body",
    "__quantum__qis__z__body",
    "__quantum__qis__s__adj",
    "__quantum__qis__dumpregister__body",
    "__quantum__qis__y__body",
    "__quantum__qis__x__body",
    "__quantum__qis__t__body",
    "__quantum__qis__cz__body",
    "__quantum__qis__s__body",
    "__quantum__qis__h__body",
    "__quantum__qis__cnot__body",
    "__quantum__qis__sqrt__body",
    "__quantum__qis__crz__body",
    "__quantum__qis__rz__body",
    "__quantum__qis__arcsin__body",
    "__quantum__qis__drawrandomint__body",
    "__quantum__qis__rx__body",
    "__quantum__qis__m__body",
    "__quantum__qis__t__adj",
];

/// Rules a module is validated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ValidationPassConfiguration {
    /// Permit calls to functions defined in the module.
    pub allow_internal_calls: bool,
    /// Restrict opcodes to `opcodes`.
    pub allowlist_opcodes: bool,
    /// Restrict calls to declared functions to `external-calls`.
    pub allowlist_external_calls: bool,
    /// Permitted opcodes.
    pub opcodes: Vec<String>,
    /// Permitted external functions.
    pub external_calls: Vec<String>,
    /// Write the JSON report here, if not empty.
    pub save_report_to: String,
}

impl Default for ValidationPassConfiguration {
    fn default() -> Self {
        Self {
            allow_internal_calls: true,
            allowlist_opcodes: false,
            allowlist_external_calls: false,
            opcodes: Vec::new(),
            external_calls: Vec::new(),
            save_report_to: String::new(),
        }
    }
}

impl ValidationPassConfiguration {
    /// The preset for a named profile: `generic` or `base`.
    pub fn from_profile_name(name: &str) -> CompileResult<Self> {
        match name {
            "generic" => Ok(Self::default()),
            "base" => Ok(Self {
                allow_internal_calls: false,
                allowlist_opcodes: true,
                allowlist_external_calls: true,
                opcodes: BASE_OPCODES.iter().map(|s| (*s).to_string()).collect(),
                external_calls: BASE_EXTERNAL_CALLS.iter().map(|s| (*s).to_string()).collect(),
                save_report_to: String::new(),
            }),
            other => Err(CompileError::InvalidConfiguration(format!("Invalid profile {other}"))),
        }
    }
}

impl Configuration for ValidationPassConfiguration {
    const KEY: &'static str = "validation";

    fn section_name() -> &'static str {
        "Validation configuration"
    }

    fn section_description() -> &'static str {
        "Rules the generated program is checked against."
    }

    fn parameters() -> &'static [ParameterDoc] {
        const PARAMETERS: &[ParameterDoc] = &[
            ParameterDoc::new("allow-internal-calls", "Whether or not internal calls are allowed."),
            ParameterDoc::new("allowlist-opcodes", "Restricts opcodes to the allowed list."),
            ParameterDoc::new(
                "allowlist-external-calls",
                "Restricts external calls to the allowed list.",
            ),
            ParameterDoc::new("opcodes", "Allowed opcodes, comma separated."),
            ParameterDoc::new("external-calls", "Allowed external functions, comma separated."),
            ParameterDoc::new(
                "save-report-to",
                "Saves the validation report to the specified file.",
            ),
        ];
        PARAMETERS
    }
}

/// Histograms and violations found by [`ValidationPass`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Profile the module was validated against.
    pub profile: String,
    /// Occurrences of each opcode.
    pub opcodes: BTreeMap<String, usize>,
    /// Calls to each declared function.
    pub external_calls: BTreeMap<String, usize>,
    /// Calls to each defined function.
    pub internal_calls: BTreeMap<String, usize>,
    /// Rule violations.
    pub violations: Vec<String>,
}

impl ValidationReport {
    /// Check whether no rule was violated.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Tally a module.
    pub fn collect(profile: &str, module: &Module) -> Self {
        let mut report = Self {
            profile: profile.to_string(),
            ..Self::default()
        };
        for function in module.functions() {
            for id in module.function_instructions(function) {
                let inst = module.instruction(id);
                *report.opcodes.entry(inst.opcode_name().to_string()).or_default() += 1;

                let Some(callee) = inst.called_function() else {
                    continue;
                };
                let callee = module.function(callee);
                let histogram = if callee.is_declaration() {
                    &mut report.external_calls
                } else {
                    &mut report.internal_calls
                };
                *histogram.entry(callee.name().to_string()).or_default() += 1;
            }
        }
        report
    }

    /// Record the violations of `config`.
    pub fn check(&mut self, config: &ValidationPassConfiguration) {
        if config.allowlist_opcodes {
            for opcode in self.opcodes.keys() {
                if !config.opcodes.contains(opcode) {
                    self.violations
                        .push(format!("'{opcode}' is not allowed for this profile."));
                }
            }
        }
        if config.allowlist_external_calls {
            for name in self.external_calls.keys() {
                if !config.external_calls.contains(name) {
                    self.violations.push(format!("'{name}' is not allowed for this profile."));
                }
            }
        }
        if !config.allow_internal_calls && !self.internal_calls.is_empty() {
            self.violations
                .push("Calls to custom defined functions not allowed.".to_string());
        }
    }

    /// Write the report as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> CompileResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Analysis pass that validates a module and stores a [`ValidationReport`].
///
/// Fails with [`CompileError::ValidationFailed`] if any rule is violated.
#[derive(Debug, Clone)]
pub struct ValidationPass {
    profile: String,
    config: ValidationPassConfiguration,
}

impl ValidationPass {
    /// Create a validator for the named profile.
    pub fn new(profile: impl Into<String>, config: ValidationPassConfiguration) -> Self {
        Self {
            profile: profile.into(),
            config,
        }
    }

    /// The rules applied.
    pub fn config(&self) -> &ValidationPassConfiguration {
        &self.config
    }
}

impl Pass for ValidationPass {
    fn name(&self) -> &'static str {
        "Validation"
    }

    fn kind(&self) -> PassKind {
        PassKind::Analysis
    }

    fn run(&self, module: &mut Module, properties: &mut PropertySet) -> CompileResult<()> {
        let mut report = ValidationReport::collect(&self.profile, module);
        report.check(&self.config);
        debug!(
            "validated {} opcodes, {} external and {} internal callees",
            report.opcodes.len(),
            report.external_calls.len(),
            report.internal_calls.len()
        );

        for violation in &report.violations {
            error!("{violation}");
        }
        if !self.config.save_report_to.is_empty() {
            report.save(&self.config.save_report_to)?;
            info!("validation report written to {}", self.config.save_report_to);
        }

        let violations = report.violations.clone();
        properties.insert(report);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(CompileError::ValidationFailed {
                profile: self.profile.clone(),
                violations,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use qat_ll::parse;

    use super::*;

    const SOURCE: &str = r#"
%Qubit = type opaque

define void @Main() #0 {
entry:
  call void @__quantum__qis__h__body(%Qubit* null)
  call void @Helper()
  %x = add i64 1, 2
  ret void
}

define internal void @Helper() {
entry:
  call void @__quantum__qis__h__body(%Qubit* null)
  ret void
}

declare void @__quantum__qis__h__body(%Qubit*)

attributes #0 = { "EntryPoint" }
"#;

    fn validate(profile: &str) -> (CompileResult<()>, ValidationReport) {
        let mut module = parse(SOURCE).unwrap();
        let config = ValidationPassConfiguration::from_profile_name(profile).unwrap();
        let mut properties = PropertySet::new();
        let result = ValidationPass::new(profile, config).run(&mut module, &mut properties);
        (result, properties.remove::<ValidationReport>().unwrap())
    }

    #[test]
    fn test_histograms() {
        let (result, report) = validate("generic");
        assert!(result.is_ok());
        assert!(report.is_valid());
        assert_eq!(report.opcodes["call"], 3);
        assert_eq!(report.opcodes["ret"], 2);
        assert_eq!(report.opcodes["add"], 1);
        assert_eq!(report.external_calls["__quantum__qis__h__body"], 2);
        assert_eq!(report.internal_calls["Helper"], 1);
    }

    #[test]
    fn test_base_profile_violations() {
        let (result, report) = validate("base");
        assert_eq!(report.violations.len(), 2);
        assert!(report.violations.iter().any(|v| v.contains("'add'")));
        assert!(report.violations.iter().any(|v| v.contains("custom defined functions")));
        match result {
            Err(CompileError::ValidationFailed { profile, violations }) => {
                assert_eq!(profile, "base");
                assert_eq!(violations, report.violations);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_profile() {
        let err = ValidationPassConfiguration::from_profile_name("adaptive").unwrap_err();
        assert!(matches!(err, CompileError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_report_is_saved_as_json() {
        let path = std::env::temp_dir().join(format!("qat-report-{}.json", std::process::id()));
        let mut module = parse(SOURCE).unwrap();
        let config = ValidationPassConfiguration {
            save_report_to: path.to_string_lossy().into_owned(),
            ..Default::default()
        };
        ValidationPass::new("generic", config)
            .run(&mut module, &mut PropertySet::new())
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let report: ValidationReport = serde_json::from_str(&text).unwrap();
        assert_eq!(report.profile, "generic");
        assert_eq!(report.internal_calls["Helper"], 1);
        std::fs::remove_file(path).unwrap();
    }
}
