//! Traversal of the execution path.
//!
//! Starting from a function, blocks are visited breadth-first along branch
//! targets, and calls into defined functions are followed recursively. A
//! modifier is applied to the function, each reached block and each
//! instruction; it may rewrite the instruction and return its replacement,
//! or return `None` to stop further processing of it.

use std::collections::VecDeque;

use qat_ir::{BlockId, FuncId, InstrId, InstructionKind, Module, Value};
use rustc_hash::FxHashSet;
use tracing::{trace, warn};

use crate::error::{CompileError, CompileResult};

/// Callback applied to every value on the execution path.
///
/// Instructions pushed onto the deletion list are erased once the function
/// they belong to has been traversed.
pub type Modifier<'a> =
    dyn FnMut(&mut Module, Value, &mut Vec<InstrId>) -> CompileResult<Option<Value>> + 'a;

/// Walks execution paths, visiting each function at most once.
#[derive(Debug)]
pub struct ExecutionPathWalker {
    max_recursion: u64,
    assume_no_except: bool,
    depth: u64,
    visited: FxHashSet<FuncId>,
}

impl ExecutionPathWalker {
    /// Create a walker.
    pub fn new(max_recursion: u64, assume_no_except: bool) -> Self {
        Self {
            max_recursion,
            assume_no_except,
            depth: 0,
            visited: FxHashSet::default(),
        }
    }

    /// Check whether `function` has been traversed.
    pub fn is_visited(&self, function: FuncId) -> bool {
        self.visited.contains(&function)
    }

    /// Traverse `function` and everything it reaches.
    ///
    /// Returns `false` if the function was not traversed: it is a
    /// declaration, was already visited, or the recursion limit is reached.
    pub fn walk(
        &mut self,
        module: &mut Module,
        function: FuncId,
        modifier: &mut Modifier<'_>,
    ) -> CompileResult<bool> {
        {
            let f = module.function(function);
            if f.is_erased() || f.is_declaration() || self.visited.contains(&function) {
                return Ok(false);
            }
        }
        if self.depth >= self.max_recursion {
            warn!("Exceeded max recursion of {}", self.max_recursion);
            return Ok(false);
        }
        self.visited.insert(function);
        self.depth += 1;
        trace!("walking @{} at depth {}", module.function(function).name(), self.depth);

        let mut scheduled = Vec::new();
        let result = self.walk_blocks(module, function, modifier, &mut scheduled);
        self.depth -= 1;
        result?;

        for id in scheduled {
            if !module.instruction(id).is_erased() {
                module.erase_instruction(id)?;
            }
        }
        Ok(true)
    }

    fn walk_blocks(
        &mut self,
        module: &mut Module,
        function: FuncId,
        modifier: &mut Modifier<'_>,
        scheduled: &mut Vec<InstrId>,
    ) -> CompileResult<()> {
        let Some(entry) = module.function(function).entry_block() else {
            return Ok(());
        };
        let mut queue = VecDeque::from([entry]);
        let mut queued: FxHashSet<BlockId> = FxHashSet::from_iter([entry]);
        let mut enqueue = |queue: &mut VecDeque<BlockId>, block: BlockId| {
            if queued.insert(block) {
                queue.push_back(block);
            }
        };

        modifier(module, Value::Function(function), scheduled)?;

        while let Some(block) = queue.pop_front() {
            if module.block(block).is_erased() {
                continue;
            }
            modifier(module, Value::Block(block), scheduled)?;

            for id in module.block(block).instructions().to_vec() {
                if module.instruction(id).is_erased() {
                    continue;
                }
                let Some(current) = modifier(module, Value::Instruction(id), scheduled)? else {
                    continue;
                };

                if let Some(callee) = current
                    .as_instruction()
                    .and_then(|call| module.instruction(call).called_function())
                {
                    self.walk(module, callee, modifier)?;
                }

                let inst = module.instruction(id);
                match inst.kind() {
                    InstructionKind::Br => {
                        let targets: Vec<BlockId> =
                            inst.operands().iter().filter_map(Value::as_block).collect();
                        for target in targets {
                            enqueue(&mut queue, target);
                        }
                    }
                    InstructionKind::Switch => {
                        for target in inst.successors() {
                            enqueue(&mut queue, target);
                        }
                    }
                    InstructionKind::Invoke => {
                        if !self.assume_no_except {
                            return Err(CompileError::ExceptionPath {
                                function: module.function(function).name().to_string(),
                            });
                        }
                        if let Some((normal, _)) = inst.invoke_destinations() {
                            enqueue(&mut queue, normal);
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}
