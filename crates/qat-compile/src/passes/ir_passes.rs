//! General IR simplification passes.
//!
//! These run around the transformation rules pass: folding and dead
//! instruction removal simplify the program before rules are matched, and
//! afterwards static addresses are turned into constant expressions and
//! runtime declarations that are no longer called are dropped.

use serde::{Deserialize, Serialize};
use tracing::debug;

use qat_ir::{CastOp, ConstExpr, Constant, InstructionKind, Module, Value, constant_fold_function};

use crate::config::{Configuration, ParameterDoc};
use crate::error::CompileResult;
use crate::pass::{Pass, PassKind};
use crate::property::PropertySet;

/// Selects the passes of the `ir-passes` component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct IrPassesConfiguration {
    /// Fold constant instructions in every function.
    pub constant_folding: bool,
    /// Remove side-effect free instructions whose result is unused.
    pub eliminate_dead_instructions: bool,
    /// Remove declarations nothing refers to.
    pub strip_unused_declarations: bool,
    /// Turn casts of constants into constant expressions.
    pub inline_static_addresses: bool,
}

impl Default for IrPassesConfiguration {
    fn default() -> Self {
        Self {
            constant_folding: true,
            eliminate_dead_instructions: true,
            strip_unused_declarations: true,
            inline_static_addresses: true,
        }
    }
}

impl Configuration for IrPassesConfiguration {
    const KEY: &'static str = "ir-passes";

    fn section_name() -> &'static str {
        "IR passes"
    }

    fn section_description() -> &'static str {
        "Simplifications applied after the transformation."
    }

    fn parameters() -> &'static [ParameterDoc] {
        const PARAMETERS: &[ParameterDoc] = &[
            ParameterDoc::new("constant-folding", "Folds constant instructions."),
            ParameterDoc::new(
                "eliminate-dead-instructions",
                "Removes unused instructions without side effects.",
            ),
            ParameterDoc::new("strip-unused-declarations", "Removes unused function declarations."),
            ParameterDoc::new(
                "inline-static-addresses",
                "Replaces casts of constant addresses by constant expressions.",
            ),
        ];
        PARAMETERS
    }
}

/// Folds constant instructions in every defined function.
pub struct ConstantFolding;

impl Pass for ConstantFolding {
    fn name(&self) -> &'static str {
        "ConstantFolding"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, module: &mut Module, _properties: &mut PropertySet) -> CompileResult<()> {
        let mut folded = 0;
        for function in module.functions().collect::<Vec<_>>() {
            folded += constant_fold_function(module, function)?;
        }
        debug!("folded {folded} instructions");
        Ok(())
    }
}

/// Removes unused instructions that have no side effects, until none are left.
pub struct DeadInstructionElimination;

impl Pass for DeadInstructionElimination {
    fn name(&self) -> &'static str {
        "DeadInstructionElimination"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, module: &mut Module, _properties: &mut PropertySet) -> CompileResult<()> {
        let mut removed = 0;
        loop {
            let dead: Vec<_> = module
                .functions()
                .flat_map(|f| module.function_instructions(f))
                .filter(|&id| {
                    let inst = module.instruction(id);
                    !inst.kind().has_side_effects()
                        && !inst.ty().is_void()
                        && !module.has_uses(&Value::Instruction(id))
                })
                .collect();
            if dead.is_empty() {
                break;
            }
            for id in dead {
                module.erase_instruction(id)?;
                removed += 1;
            }
        }
        debug!("removed {removed} dead instructions");
        Ok(())
    }
}

/// Erases declarations that are neither called nor referenced.
pub struct StripUnusedDeclarations;

impl Pass for StripUnusedDeclarations {
    fn name(&self) -> &'static str {
        "StripUnusedDeclarations"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, module: &mut Module, _properties: &mut PropertySet) -> CompileResult<()> {
        let unused: Vec<_> = module
            .functions()
            .filter(|&f| {
                module.function(f).is_declaration() && !module.has_uses(&Value::Function(f))
            })
            .collect();
        for &f in &unused {
            debug!("stripping declaration @{}", module.function(f).name());
            module.erase_function(f)?;
        }
        Ok(())
    }
}

/// Replaces `inttoptr` and `bitcast` instructions on constants by the
/// equivalent constant expression.
///
/// Static allocation leaves addresses as `%q = inttoptr i64 3 to %Qubit*`;
/// after this pass the users refer to `inttoptr (i64 3 to %Qubit*)`
/// directly, as a base profile program expects.
pub struct InlineStaticAddresses;

impl Pass for InlineStaticAddresses {
    fn name(&self) -> &'static str {
        "InlineStaticAddresses"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, module: &mut Module, _properties: &mut PropertySet) -> CompileResult<()> {
        let mut inlined = 0;
        loop {
            let mut changed = false;
            for function in module.functions().collect::<Vec<_>>() {
                for id in module.function_instructions(function) {
                    let inst = module.instruction(id);
                    let InstructionKind::Cast(op @ (CastOp::IntToPtr | CastOp::BitCast)) = *inst.kind()
                    else {
                        continue;
                    };
                    let Some(value) = inst.operand(0).filter(|v| v.is_constant()).cloned() else {
                        continue;
                    };
                    let expr = Value::Constant(Constant::Expr(Box::new(ConstExpr::Cast {
                        op,
                        value,
                        to: inst.ty().clone(),
                    })));
                    module.replace_all_uses_with(&Value::Instruction(id), &expr);
                    module.erase_instruction(id)?;
                    inlined += 1;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        debug!("inlined {inlined} static addresses");
        Ok(())
    }
}

/// The passes selected by `config`, in execution order.
pub fn ir_passes(config: &IrPassesConfiguration) -> Vec<Box<dyn Pass>> {
    let mut passes: Vec<Box<dyn Pass>> = Vec::new();
    if config.inline_static_addresses {
        passes.push(Box::new(InlineStaticAddresses));
    }
    if config.constant_folding {
        passes.push(Box::new(ConstantFolding));
    }
    if config.eliminate_dead_instructions {
        passes.push(Box::new(DeadInstructionElimination));
    }
    if config.strip_unused_declarations {
        passes.push(Box::new(StripUnusedDeclarations));
    }
    passes
}
