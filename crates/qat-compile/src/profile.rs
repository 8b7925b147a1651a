//! A configured compilation profile.

use tracing::{debug, info, instrument};

use qat_ir::{Module, verify_module};

use crate::allocation::AllocationManagerPtr;
use crate::error::CompileResult;
use crate::manager::PassManager;
use crate::pass::Pass;
use crate::passes::{TransformationStatistics, ValidationPass, ValidationReport};
use crate::property::PropertySet;

/// A generation pipeline, the allocation managers its rules use, and an
/// optional validator.
///
/// Profiles are produced by [`ProfileGenerator::new_profile`](crate::ProfileGenerator::new_profile).
pub struct Profile {
    name: String,
    debug: bool,
    qubit_alloc_manager: AllocationManagerPtr,
    result_alloc_manager: AllocationManagerPtr,
    pass_manager: PassManager,
    validator: Option<ValidationPass>,
    properties: PropertySet,
}

impl Profile {
    /// Create an empty profile around the given allocation managers.
    pub fn new(
        name: impl Into<String>,
        debug: bool,
        qubit_alloc_manager: AllocationManagerPtr,
        result_alloc_manager: AllocationManagerPtr,
    ) -> Self {
        Self {
            name: name.into(),
            debug,
            qubit_alloc_manager,
            result_alloc_manager,
            pass_manager: PassManager::new(),
            validator: None,
            properties: PropertySet::new(),
        }
    }

    /// Name of the profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the module is verified around the pipeline.
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Manager assigning qubit addresses.
    pub fn qubit_alloc_manager(&self) -> &AllocationManagerPtr {
        &self.qubit_alloc_manager
    }

    /// Manager assigning result addresses.
    pub fn result_alloc_manager(&self) -> &AllocationManagerPtr {
        &self.result_alloc_manager
    }

    /// The generation pipeline.
    pub fn pass_manager(&self) -> &PassManager {
        &self.pass_manager
    }

    /// Mutable access to the generation pipeline.
    pub fn pass_manager_mut(&mut self) -> &mut PassManager {
        &mut self.pass_manager
    }

    /// Append a pass to the generation pipeline.
    pub fn add_pass(&mut self, pass: impl Pass + 'static) {
        self.pass_manager.add_pass(pass);
    }

    /// Set the validator.
    pub fn set_validator(&mut self, validator: ValidationPass) {
        self.validator = Some(validator);
    }

    /// The validator, if any.
    pub fn validator(&self) -> Option<&ValidationPass> {
        self.validator.as_ref()
    }

    /// Results left by the last run.
    pub fn properties(&self) -> &PropertySet {
        &self.properties
    }

    /// Statistics of the last transformation, if one ran.
    pub fn statistics(&self) -> Option<&TransformationStatistics> {
        self.properties.get()
    }

    /// Report of the last validation, if one ran.
    pub fn validation_report(&self) -> Option<&ValidationReport> {
        self.properties.get()
    }

    /// Run the generation pipeline on `module`.
    ///
    /// The allocation managers start from scratch, so applying a profile to
    /// several modules gives each the same addresses.
    #[instrument(skip(self, module), fields(profile = %self.name))]
    pub fn apply(&mut self, module: &mut Module) -> CompileResult<()> {
        self.qubit_alloc_manager.borrow_mut().reset();
        self.result_alloc_manager.borrow_mut().reset();
        self.properties = PropertySet::new();

        if self.debug {
            self.verify(module)?;
        }
        self.pass_manager.run(module, &mut self.properties)?;
        if self.debug {
            self.verify(module)?;
            debug!(
                "{} qubits and {} results mapped",
                self.qubit_alloc_manager.borrow().address_extent(),
                self.result_alloc_manager.borrow().address_extent()
            );
        }
        info!("profile '{}' applied", self.name);
        Ok(())
    }

    /// Check the structural invariants of `module`.
    pub fn verify(&self, module: &Module) -> CompileResult<()> {
        verify_module(module)?;
        Ok(())
    }

    /// Validate `module` against the profile.
    ///
    /// Without a validator every module is accepted.
    pub fn validate(&mut self, module: &mut Module) -> CompileResult<()> {
        match &self.validator {
            Some(validator) => validator.run(module, &mut self.properties),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("name", &self.name)
            .field("debug", &self.debug)
            .field("passes", &self.pass_manager.pass_names())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}
