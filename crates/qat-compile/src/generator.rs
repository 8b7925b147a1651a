//! Assembly of profiles from configurable components.
//!
//! A component is a configuration section plus a setup function that adds
//! passes to a [`Profile`]. Components run in registration order and can be
//! disabled individually through the [`ConfigurationManager`].
//!
//! # Example
//!
//! ```
//! use qat_compile::{ProfileGenerator, TransformationRulesPassConfiguration};
//!
//! let mut generator = ProfileGenerator::new().unwrap();
//! generator
//!     .configuration_manager_mut()
//!     .set_parameter_from_str("simplify-prior-transform", "false")
//!     .unwrap();
//!
//! let profile = generator.new_profile("generic", false).unwrap();
//! assert_eq!(
//!     profile.pass_manager().pass_names(),
//!     [
//!         "TransformationRules",
//!         "InlineStaticAddresses",
//!         "ConstantFolding",
//!         "DeadInstructionElimination",
//!         "StripUnusedDeclarations",
//!     ]
//! );
//! ```

use tracing::debug;

use crate::allocation::AllocationManager;
use crate::config::{Configuration, ConfigurationManager};
use crate::error::CompileResult;
use crate::passes::{
    ConstantFolding, DeadInstructionElimination, IrPassesConfiguration, TransformationRulesPass,
    TransformationRulesPassConfiguration, ValidationPass, ValidationPassConfiguration, ir_passes,
};
use crate::profile::Profile;
use crate::rules::{FactoryConfiguration, RuleFactory, RuleSet};

type ComponentSetup = Box<dyn Fn(&ConfigurationManager, &mut Profile) -> CompileResult<()>>;

/// Builds [`Profile`]s from registered components.
pub struct ProfileGenerator {
    configuration_manager: ConfigurationManager,
    components: Vec<(String, ComponentSetup)>,
}

impl ProfileGenerator {
    /// A generator with the default components: `transformation-rules`
    /// built from [`FactoryConfiguration`], followed by `ir-passes`.
    pub fn new() -> CompileResult<Self> {
        let mut generator = Self::bare()?;
        generator.configuration_manager.add_config::<FactoryConfiguration>()?;
        generator.register_transformation_rules(|factory, manager| {
            factory.using_configuration(manager.get::<FactoryConfiguration>()?);
            Ok(())
        })?;
        generator.register_ir_passes()?;
        Ok(generator)
    }

    /// A generator whose rules are installed by `configure` instead of
    /// from the factory configuration.
    pub fn with_rules(configure: impl Fn(&mut RuleFactory<'_>) + 'static) -> CompileResult<Self> {
        let mut generator = Self::bare()?;
        generator.register_transformation_rules(move |factory, _| {
            configure(factory);
            Ok(())
        })?;
        generator.register_ir_passes()?;
        Ok(generator)
    }

    /// A generator with no components. Only validation is configured.
    pub fn bare() -> CompileResult<Self> {
        let mut configuration_manager = ConfigurationManager::new();
        configuration_manager.add_config::<ValidationPassConfiguration>()?;
        Ok(Self {
            configuration_manager,
            components: Vec::new(),
        })
    }

    /// The configuration of all components.
    pub fn configuration_manager(&self) -> &ConfigurationManager {
        &self.configuration_manager
    }

    /// Mutable access to the configuration.
    pub fn configuration_manager_mut(&mut self) -> &mut ConfigurationManager {
        &mut self.configuration_manager
    }

    /// Ids of the registered components in execution order.
    pub fn component_ids(&self) -> Vec<&str> {
        self.components.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Register a component configured by the section `C`.
    ///
    /// `setup` is called by [`new_profile`](Self::new_profile) with the
    /// current value of `C`, unless the component has been disabled.
    pub fn register_profile_component<C: Configuration>(
        &mut self,
        id: &str,
        setup: impl Fn(&C, &ConfigurationManager, &mut Profile) -> CompileResult<()> + 'static,
    ) -> CompileResult<()> {
        self.configuration_manager.add_component_config::<C>(id)?;
        let wrapper = move |manager: &ConfigurationManager, profile: &mut Profile| {
            if !manager.is_active::<C>() {
                return Ok(());
            }
            setup(manager.get::<C>()?, manager, profile)
        };
        self.components.push((id.to_string(), Box::new(wrapper)));
        Ok(())
    }

    /// Build a profile from the current configuration.
    ///
    /// Each profile gets fresh allocation managers. The validator uses the
    /// current [`ValidationPassConfiguration`].
    pub fn new_profile(&self, name: &str, debug: bool) -> CompileResult<Profile> {
        let mut profile = Profile::new(
            name,
            debug,
            AllocationManager::create_new(),
            AllocationManager::create_new(),
        );
        for (id, setup) in &self.components {
            debug!("setting up component '{id}'");
            setup(&self.configuration_manager, &mut profile)?;
        }

        let validation = self.configuration_manager.get::<ValidationPassConfiguration>()?;
        profile.set_validator(ValidationPass::new(name, validation.clone()));
        Ok(profile)
    }

    fn register_transformation_rules(
        &mut self,
        install: impl Fn(&mut RuleFactory<'_>, &ConfigurationManager) -> CompileResult<()> + 'static,
    ) -> CompileResult<()> {
        self.register_profile_component::<TransformationRulesPassConfiguration>(
            "transformation-rules",
            move |config, manager, profile| {
                if config.simplify_prior_transform {
                    profile.add_pass(ConstantFolding);
                    profile.add_pass(DeadInstructionElimination);
                }

                let qubits = profile.qubit_alloc_manager().clone();
                let results = profile.result_alloc_manager().clone();
                let mut rule_set = RuleSet::new();
                let mut factory = RuleFactory::new(&mut rule_set, qubits.clone(), results.clone());
                install(&mut factory, manager)?;
                debug!("{} transformation rules", rule_set.len());

                profile.add_pass(TransformationRulesPass::new(rule_set, config.clone(), qubits, results));
                Ok(())
            },
        )
    }

    fn register_ir_passes(&mut self) -> CompileResult<()> {
        self.register_profile_component::<IrPassesConfiguration>("ir-passes", |config, _, profile| {
            for pass in ir_passes(config) {
                profile.pass_manager_mut().add_boxed_pass(pass);
            }
            Ok(())
        })
    }
}

impl std::fmt::Debug for ProfileGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileGenerator")
            .field("configuration_manager", &self.configuration_manager)
            .field("components", &self.component_ids())
            .finish()
    }
}
