//! QAT Transformation Framework
//!
//! This crate adapts generic QIR programs to the restrictions of a target
//! profile. It rewrites a [`qat_ir::Module`] with pattern-based replacement
//! rules, assigns static addresses to qubits and results, and validates the
//! outcome against the profile's allow lists.
//!
//! # Overview
//!
//! A [`Profile`] bundles a [`PassManager`], the [`AllocationManager`]s its
//! rules draw addresses from, and a [`ValidationPass`]. Profiles are built by
//! a [`ProfileGenerator`] from components whose settings live in a
//! [`ConfigurationManager`]. The central pass is the
//! [`TransformationRulesPass`], which
//! 1. **Specialises** calls with constant arguments into cloned functions
//! 2. **Detects** the code reachable from the entry points
//! 3. **Deletes** unreachable functions and blocks
//! 4. **Applies** the [`RuleSet`] along the execution path
//!
//! # Architecture
//!
//! ```text
//! ConfigurationManager ──► ProfileGenerator
//!                                │
//!                                ▼
//!                          ┌───────────┐
//!   Module ──────────────► │  Profile  │ ◄── AllocationManager (qubits, results)
//!                          └───────────┘
//!                                │
//!                                ├── ConstantFolding / DeadInstructionElimination
//!                                ├── TransformationRulesPass ◄── RuleSet (RuleFactory)
//!                                ├── InlineStaticAddresses / StripUnusedDeclarations
//!                                └── ValidationPass
//!                                │
//!                                ▼
//!                      Module (profile-compliant)
//! ```
//!
//! # Example: Static Qubit Allocation
//!
//! ```rust
//! use qat_compile::ProfileGenerator;
//!
//! let source = r#"
//! %Qubit = type opaque
//!
//! define void @Main() #0 {
//! entry:
//!   %q = call %Qubit* @__quantum__rt__qubit_allocate()
//!   call void @__quantum__qis__h__body(%Qubit* %q)
//!   call void @__quantum__rt__qubit_release(%Qubit* %q)
//!   ret void
//! }
//!
//! declare %Qubit* @__quantum__rt__qubit_allocate()
//! declare void @__quantum__rt__qubit_release(%Qubit*)
//! declare void @__quantum__qis__h__body(%Qubit*)
//!
//! attributes #0 = { "EntryPoint" }
//! "#;
//!
//! let mut module = qat_ll::parse(source).unwrap();
//! let generator = ProfileGenerator::new().unwrap();
//! let mut profile = generator.new_profile("generic", true).unwrap();
//! profile.apply(&mut module).unwrap();
//! profile.validate(&mut module).unwrap();
//!
//! let text = qat_ll::emit(&module);
//! assert!(text.contains("call void @__quantum__qis__h__body(%Qubit* inttoptr (i64 0 to %Qubit*))"));
//! assert!(!text.contains("qubit_allocate"));
//! ```
//!
//! # Custom Passes
//!
//! Components can add any [`Pass`] to a profile:
//!
//! ```rust
//! use qat_compile::{CompileResult, Pass, PassKind, PropertySet};
//! use qat_ir::Module;
//!
//! struct CountFunctions;
//!
//! impl Pass for CountFunctions {
//!     fn name(&self) -> &str { "CountFunctions" }
//!     fn kind(&self) -> PassKind { PassKind::Analysis }
//!
//!     fn run(&self, module: &mut Module, props: &mut PropertySet) -> CompileResult<()> {
//!         props.insert(module.num_functions());
//!         Ok(())
//!     }
//! }
//! ```

pub mod allocation;
pub mod config;
pub mod error;
pub mod generator;
pub mod manager;
pub mod pass;
pub mod profile;
pub mod property;
pub mod rules;

// Built-in passes
pub mod passes;

pub use allocation::{
    AllocatedBlock, Address, AllocationError, AllocationManager, AllocationManagerPtr,
    AllocationResult,
};
pub use config::{
    ComponentInfo, Configuration, ConfigurationManager, ParameterDoc, ParameterInfo, ParameterKind,
};
pub use error::{CompileError, CompileResult};
pub use generator::ProfileGenerator;
pub use manager::PassManager;
pub use pass::{Pass, PassKind};
pub use passes::{
    ConstantFolding, DeadInstructionElimination, InlineStaticAddresses, IrPassesConfiguration,
    StripUnusedDeclarations, TransformationRulesPass, TransformationRulesPassConfiguration,
    TransformationStatistics, ValidationPass, ValidationPassConfiguration, ValidationReport,
};
pub use profile::Profile;
pub use property::PropertySet;
pub use rules::{FactoryConfiguration, ReplacementRule, RuleFactory, RuleSet};
