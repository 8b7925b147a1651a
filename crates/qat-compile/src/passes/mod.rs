//! Built-in passes.
//!
//! - [`transformation_rules`]: execution path resolution and rule application
//! - [`ir_passes`]: general simplifications run around the transformation
//! - [`validation`]: checks a module against a target profile

pub mod ir_passes;
pub mod transformation_rules;
pub mod validation;

pub use ir_passes::{
    ConstantFolding, DeadInstructionElimination, InlineStaticAddresses, IrPassesConfiguration,
    StripUnusedDeclarations, ir_passes,
};
pub use transformation_rules::{
    REQUIRED_QUBITS_ATTR, REQUIRED_RESULTS_ATTR, TransformationRulesPass,
    TransformationRulesPassConfiguration, TransformationStatistics,
};
pub use validation::{ValidationPass, ValidationPassConfiguration, ValidationReport};
