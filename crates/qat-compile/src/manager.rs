//! Pass manager for running a profile's pipeline.

use tracing::{debug, info, instrument};

use qat_ir::Module;

use crate::error::CompileResult;
use crate::pass::Pass;
use crate::property::PropertySet;

/// Manages and executes a sequence of passes.
pub struct PassManager {
    /// The passes to execute, in order.
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    /// Create a new empty pass manager.
    pub fn new() -> Self {
        Self { passes: vec![] }
    }

    /// Add a pass to the manager.
    pub fn add_pass(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }

    /// Add an already boxed pass.
    pub fn add_boxed_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Run all passes on the given module.
    #[instrument(skip(self, module, properties))]
    pub fn run(&self, module: &mut Module, properties: &mut PropertySet) -> CompileResult<()> {
        info!(
            "Running pass manager with {} passes on module with {} functions",
            self.passes.len(),
            module.num_functions()
        );

        for pass in &self.passes {
            if pass.should_run(module, properties) {
                debug!("Running pass: {}", pass.name());
                pass.run(module, properties)?;
                debug!("Pass {} completed, functions: {}", pass.name(), module.num_functions());
            } else {
                debug!("Skipping pass: {}", pass.name());
            }
        }

        info!("Pass manager completed, functions: {}", module.num_functions());
        Ok(())
    }

    /// Names of the passes in execution order.
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Get the number of passes.
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Check if the manager has no passes.
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PassManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassManager")
            .field("passes", &self.pass_names())
            .finish()
    }
}
