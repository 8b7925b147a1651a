//! The transformation rules pass.
//!
//! This pass turns a generic program into one with a statically known
//! execution path and then applies a [`RuleSet`] along that path. It runs
//! in up to four phases, each selected by
//! [`TransformationRulesPassConfiguration`]:
//!
//! 1. **Copy and expand**: every call to a defined function on the path
//!    is redirected to a clone of the callee with the constant arguments
//!    baked in. The clone is folded, which resolves branches on those
//!    constants, and the walk continues into it.
//! 2. **Active code detection and phi replacement**: functions and blocks
//!    reachable from entry points (or referenced by globals) are marked
//!    active. Two-input phi nodes with one inactive incoming block are
//!    replaced by the value of the active edge.
//! 3. **Dead code deletion**: inactive functions and inactive blocks of
//!    active functions are removed.
//! 4. **Rule application**: rules are matched along the execution path (or
//!    across the module) and the collected replacements are applied in
//!    reverse. Entry points are then annotated with the number of qubits
//!    and results used.

mod config;
mod const_expr;
mod walker;

pub use config::TransformationRulesPassConfiguration;
pub use const_expr::{const_expr_rules, drop_incoming, fold_function};
pub use walker::{ExecutionPathWalker, Modifier};

use qat_ir::{Attribute, BlockId, Builder, FuncId, InstrId, InstructionKind, Module, User, Value};
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::allocation::AllocationManagerPtr;
use crate::error::CompileResult;
use crate::pass::{Pass, PassKind};
use crate::property::PropertySet;
use crate::rules::{apply_replacements, Replacements, RuleSet};

/// Attribute carrying the number of qubits an entry point uses.
pub const REQUIRED_QUBITS_ATTR: &str = "requiredQubits";
/// Attribute carrying the number of results an entry point uses.
pub const REQUIRED_RESULTS_ATTR: &str = "requiredResults";

/// What a run of [`TransformationRulesPass`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformationStatistics {
    /// Call sites redirected to specialised clones.
    pub functions_cloned: usize,
    /// Phi nodes replaced by the value of their active edge.
    pub phis_replaced: usize,
    /// Inactive functions removed.
    pub functions_deleted: usize,
    /// Inactive blocks removed from active functions.
    pub blocks_deleted: usize,
    /// Instructions matched by a rule.
    pub rules_applied: usize,
    /// Instructions removed while applying replacements.
    pub instructions_removed: usize,
    /// Qubit addresses used, if annotated.
    pub required_qubits: Option<u64>,
    /// Result addresses used, if annotated.
    pub required_results: Option<u64>,
}

/// Functions and blocks on the execution path.
#[derive(Debug, Default)]
struct ActiveCode {
    functions: FxHashSet<FuncId>,
    blocks: FxHashSet<BlockId>,
}

impl ActiveCode {
    fn record(&mut self, value: &Value) {
        match value {
            Value::Function(f) => {
                self.functions.insert(*f);
            }
            Value::Block(b) => {
                self.blocks.insert(*b);
            }
            _ => {}
        }
    }
}

/// Applies a rule set to a module after resolving its execution path.
pub struct TransformationRulesPass {
    rule_set: RuleSet,
    config: TransformationRulesPassConfiguration,
    qubit_alloc_manager: AllocationManagerPtr,
    result_alloc_manager: AllocationManagerPtr,
    const_expr_rules: RuleSet,
}

impl TransformationRulesPass {
    /// Create the pass.
    ///
    /// The allocation managers must be the ones the rules in `rule_set`
    /// were built with, since entry point annotation reads them.
    pub fn new(
        rule_set: RuleSet,
        config: TransformationRulesPassConfiguration,
        qubit_alloc_manager: AllocationManagerPtr,
        result_alloc_manager: AllocationManagerPtr,
    ) -> Self {
        let const_expr_rules = const_expr_rules(config.assume_no_except);
        Self {
            rule_set,
            config,
            qubit_alloc_manager,
            result_alloc_manager,
            const_expr_rules,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &TransformationRulesPassConfiguration {
        &self.config
    }

    fn walker(&self) -> ExecutionPathWalker {
        ExecutionPathWalker::new(self.config.max_recursion, self.config.assume_no_except)
    }

    fn entry_points(&self, module: &Module) -> Vec<FuncId> {
        module.functions_with_attribute(&self.config.entry_point_attr)
    }

    /// Specialise every call on the execution path. Returns the number of
    /// clones made.
    fn copy_and_expand(&self, module: &mut Module) -> CompileResult<usize> {
        let mut cloned = 0;
        let mut walker = self.walker();
        for entry in self.entry_points(module) {
            fold_function(module, entry, &self.const_expr_rules)?;
            let mut expand = |module: &mut Module, value: Value, scheduled: &mut Vec<InstrId>| {
                self.expand_call(module, value, scheduled, &mut cloned)
            };
            walker.walk(module, entry, &mut expand)?;
        }
        Ok(cloned)
    }

    fn expand_call(
        &self,
        module: &mut Module,
        value: Value,
        scheduled: &mut Vec<InstrId>,
        cloned: &mut usize,
    ) -> CompileResult<Option<Value>> {
        let Some(id) = value.as_instruction() else {
            return Ok(Some(value));
        };
        let inst = module.instruction(id);
        let (InstructionKind::Call { tail }, Some(callee)) = (inst.kind(), inst.called_function())
        else {
            return Ok(Some(value));
        };
        let tail = *tail;
        let function = module.function(callee);
        if function.is_declaration()
            || function.is_var_arg()
            || function.params().len() != inst.call_arguments().len()
        {
            return Ok(Some(value));
        }

        let mut constants = Vec::new();
        let mut remaining = Vec::new();
        for (index, arg) in inst.call_arguments().iter().enumerate() {
            if arg.as_const_int().is_some() {
                constants.push((index, arg.clone()));
            } else {
                remaining.push(arg.clone());
            }
        }

        let clone = module.clone_function_with_constants(callee, &constants)?;
        debug!(
            "specialised @{} as @{} with {} constant arguments",
            module.function(callee).name(),
            module.function(clone).name(),
            constants.len()
        );

        let call = Builder::before(module, id).call(clone, remaining, None)?;
        module.take_name(id, call);
        module.set_instruction_kind(call, InstructionKind::Call { tail })?;
        module.replace_all_uses_with(&Value::Instruction(id), &Value::Instruction(call));
        scheduled.push(id);
        *cloned += 1;

        fold_function(module, clone, &self.const_expr_rules)?;

        let unused = module.users_of(&Value::Function(callee)).iter().all(|user| match user {
            User::Instruction(i) => {
                scheduled.contains(i) || module.instruction_function(*i) == Some(callee)
            }
            User::Global(_) => false,
        });
        if unused && !module.function(callee).has_attribute(&self.config.entry_point_attr) {
            debug!("erasing @{}, all calls were specialised", module.function(callee).name());
            module.erase_function(callee)?;
        }

        Ok(Some(Value::Instruction(call)))
    }

    /// Mark the functions and blocks on the execution path.
    ///
    /// Entry points and functions referenced by globals are roots. A
    /// function referenced from an active block becomes a root as well, so
    /// the search repeats until no new root appears.
    fn detect_active_code(&self, module: &mut Module) -> CompileResult<ActiveCode> {
        let mut active = ActiveCode::default();
        let mut considered = FxHashSet::default();
        let mut walker = self.walker();

        loop {
            let roots: Vec<FuncId> = module
                .functions()
                .filter(|f| !considered.contains(f) && !walker.is_visited(*f))
                .filter(|&f| {
                    module.function(f).has_attribute(&self.config.entry_point_attr)
                        || module.users_of(&Value::Function(f)).iter().any(|user| match user {
                            User::Global(_) => true,
                            User::Instruction(i) => module
                                .instruction(*i)
                                .parent()
                                .is_some_and(|b| active.blocks.contains(&b)),
                        })
                })
                .collect();
            if roots.is_empty() {
                break;
            }

            for root in roots {
                considered.insert(root);
                active.functions.insert(root);
                let mut mark = |_: &mut Module, value: Value, _: &mut Vec<InstrId>| -> CompileResult<Option<Value>> {
                    active.record(&value);
                    Ok(Some(value))
                };
                walker.walk(module, root, &mut mark)?;
            }
        }

        debug!(
            "{} active functions, {} active blocks",
            active.functions.len(),
            active.blocks.len()
        );
        Ok(active)
    }

    /// Replace two-input phi nodes that have exactly one active incoming
    /// block by the value arriving along that block.
    fn replace_phi(&self, module: &mut Module, active: &ActiveCode) -> CompileResult<usize> {
        let mut replacements: Vec<(InstrId, Value)> = Vec::new();
        for function in module.functions() {
            for id in module.function_instructions(function) {
                let inst = module.instruction(id);
                let (InstructionKind::Phi { blocks }, [first, second]) = (inst.kind(), inst.operands())
                else {
                    continue;
                };
                let [block1, block2] = blocks.as_slice() else {
                    continue;
                };
                let value = match (active.blocks.contains(block1), active.blocks.contains(block2)) {
                    (false, true) => second.clone(),
                    (true, false) => first.clone(),
                    _ => continue,
                };
                replacements.push((id, value));
            }
        }

        for index in 0..replacements.len() {
            let (phi, value) = replacements[index].clone();
            let old = Value::Instruction(phi);
            if let Some(target) = value.as_instruction() {
                module.take_name(phi, target);
            }
            module.replace_all_uses_with(&old, &value);
            module.erase_instruction(phi)?;
            for (_, later) in &mut replacements[index + 1..] {
                if *later == old {
                    *later = value.clone();
                }
            }
        }
        Ok(replacements.len())
    }

    /// Delete inactive functions and the inactive blocks of active ones.
    /// Returns the number of functions and blocks deleted.
    fn delete_dead_code(&self, module: &mut Module, active: &ActiveCode) -> CompileResult<(usize, usize)> {
        let mut dead_functions = Vec::new();
        let mut dead_blocks = Vec::new();
        for f in module.functions() {
            let function = module.function(f);
            if active.functions.contains(&f) {
                dead_blocks.extend(function.blocks().iter().filter(|b| !active.blocks.contains(*b)));
            } else if !function.is_declaration() {
                dead_functions.push(f);
            }
        }

        for &f in &dead_functions {
            debug!("deleting inactive function @{}", module.function(f).name());
            let undef = Value::undef(module.value_type(&Value::Function(f)));
            module.replace_all_uses_with(&Value::Function(f), &undef);
            for block in module.function(f).blocks().iter().rev().copied().collect::<Vec<_>>() {
                clear_block(module, block)?;
            }
            module.erase_function(f)?;
        }

        for &block in &dead_blocks {
            if let Some(terminator) = module.block(block).terminator() {
                for successor in module.instruction(terminator).successors() {
                    drop_incoming(module, successor, block)?;
                }
            }
        }
        for &block in dead_blocks.iter().rev() {
            clear_block(module, block)?;
        }

        let mut blocks_deleted = 0;
        for &block in &dead_blocks {
            if module.has_uses(&Value::Block(block)) {
                let label = module.value_label(&Value::Block(block));
                let users = module.users_of(&Value::Block(block)).len();
                error!("block {label} was supposed to be unused but has {users} users");
                continue;
            }
            module.erase_block(block)?;
            blocks_deleted += 1;
        }

        Ok((dead_functions.len(), blocks_deleted))
    }

    /// Match rules and apply the collected replacements.
    fn apply_rules(&self, module: &mut Module, stats: &mut TransformationStatistics) -> CompileResult<()> {
        let mut replacements = Replacements::new();
        let mut applied = 0;

        if self.config.transform_execution_path_only {
            let mut walker = self.walker();
            let entries = self.entry_points(module);
            for &entry in &entries {
                let mut apply = |module: &mut Module,
                                 value: Value,
                                 _: &mut Vec<InstrId>|
                 -> CompileResult<Option<Value>> {
                    if let Some(id) = value.as_instruction() {
                        if self.rule_set.match_and_replace(module, id, &mut replacements)? {
                            applied += 1;
                        }
                    }
                    Ok(Some(value))
                };
                walker.walk(module, entry, &mut apply)?;
            }
            self.annotate(module, &entries, stats);
        } else {
            for function in module.functions().collect::<Vec<_>>() {
                for id in module.function_instructions(function) {
                    if self.rule_set.match_and_replace(module, id, &mut replacements)? {
                        applied += 1;
                    }
                }
            }
        }

        stats.rules_applied = applied;
        stats.instructions_removed = apply_replacements(module, replacements)?;
        Ok(())
    }

    /// Record the qubit and result needs on every entry point.
    ///
    /// The annotation is the address extent of each manager rather than the
    /// peak number of simultaneous allocations. The two differ once arrays
    /// and reuse interleave, and hardware needs every address that appears
    /// in the program.
    fn annotate(&self, module: &mut Module, entries: &[FuncId], stats: &mut TransformationStatistics) {
        let qubits = self.qubit_alloc_manager.borrow().address_extent();
        let results = self.result_alloc_manager.borrow().address_extent();
        for &entry in entries {
            let function = module.function_mut(entry);
            if self.config.annotate_qubit_use {
                function.add_attribute(Attribute::pair(REQUIRED_QUBITS_ATTR, qubits.to_string()));
                stats.required_qubits = Some(qubits);
            }
            if self.config.annotate_result_use {
                function.add_attribute(Attribute::pair(REQUIRED_RESULTS_ATTR, results.to_string()));
                stats.required_results = Some(results);
            }
        }
    }
}

/// Detach every instruction of a block, last first, pointing remaining
/// uses at `undef`.
fn clear_block(module: &mut Module, block: BlockId) -> CompileResult<()> {
    for id in module.block(block).instructions().iter().rev().copied().collect::<Vec<_>>() {
        let value = Value::Instruction(id);
        let undef = Value::undef(module.instruction(id).ty().clone());
        module.replace_all_uses_with(&value, &undef);
        module.erase_instruction(id)?;
    }
    Ok(())
}

impl Pass for TransformationRulesPass {
    fn name(&self) -> &str {
        "TransformationRules"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    #[instrument(skip(self, module, properties), fields(module = module.name()))]
    fn run(&self, module: &mut Module, properties: &mut PropertySet) -> CompileResult<()> {
        self.qubit_alloc_manager
            .borrow_mut()
            .set_reuse_registers(self.config.reuse_qubits);
        self.result_alloc_manager
            .borrow_mut()
            .set_reuse_registers(self.config.reuse_results);

        let mut stats = TransformationStatistics::default();

        if self.config.clone_functions {
            stats.functions_cloned = self.copy_and_expand(module)?;
        }

        if self.config.delete_dead_code {
            let active = self.detect_active_code(module)?;
            stats.phis_replaced = self.replace_phi(module, &active)?;
            let (functions, blocks) = self.delete_dead_code(module, &active)?;
            stats.functions_deleted = functions;
            stats.blocks_deleted = blocks;
        }

        self.apply_rules(module, &mut stats)?;

        info!(
            "transformation rules: {} clones, {} functions and {} blocks deleted, {} rules applied",
            stats.functions_cloned, stats.functions_deleted, stats.blocks_deleted, stats.rules_applied
        );
        properties.insert(stats);
        Ok(())
    }
}
