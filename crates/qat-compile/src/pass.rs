//! Pass trait and types for module passes.

use qat_ir::Module;

use crate::error::CompileResult;
use crate::property::PropertySet;

/// The kind of pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Analysis pass that reads but does not modify the module.
    Analysis,
    /// Transformation pass that modifies the module.
    Transformation,
}

/// A pass that operates on a whole module.
///
/// Passes are the unit a profile's pipeline is made of. Each pass performs
/// one transformation or analysis and may leave results for later passes in
/// the [`PropertySet`].
pub trait Pass {
    /// Get the name of this pass.
    fn name(&self) -> &str;

    /// Get the kind of this pass.
    fn kind(&self) -> PassKind;

    /// Run the pass on the given module.
    ///
    /// Analysis passes should not modify the module but may write to the
    /// `PropertySet`.
    fn run(&self, module: &mut Module, properties: &mut PropertySet) -> CompileResult<()>;

    /// Check if this pass should run based on current state.
    fn should_run(&self, _module: &Module, _properties: &PropertySet) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestPass;

    impl Pass for TestPass {
        fn name(&self) -> &'static str {
            "test"
        }

        fn kind(&self) -> PassKind {
            PassKind::Transformation
        }

        fn run(&self, _module: &mut Module, _properties: &mut PropertySet) -> CompileResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_pass_kind() {
        let pass = TestPass;
        assert_eq!(pass.kind(), PassKind::Transformation);
        assert_eq!(pass.name(), "test");
        assert!(pass.should_run(&Module::new("m"), &PropertySet::new()));
    }
}
