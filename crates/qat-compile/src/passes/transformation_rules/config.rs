//! Configuration of the transformation rules pass.

use serde::{Deserialize, Serialize};

use crate::config::{Configuration, ParameterDoc};

/// Selects the phases of [`TransformationRulesPass`](super::TransformationRulesPass).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TransformationRulesPassConfiguration {
    /// Delete functions and blocks that are not on the execution path.
    pub delete_dead_code: bool,
    /// Specialise called functions on their constant arguments.
    pub clone_functions: bool,
    /// Apply rules to the execution path only instead of the whole module.
    pub transform_execution_path_only: bool,
    /// Maximum call depth followed while unrolling the execution path.
    pub max_recursion: u64,
    /// Treat every `invoke` as a call that returns normally.
    pub assume_no_except: bool,
    /// Allow released qubit addresses to be handed out again.
    pub reuse_qubits: bool,
    /// Annotate entry points with `requiredQubits`.
    pub annotate_qubit_use: bool,
    /// Allow released result addresses to be handed out again.
    pub reuse_results: bool,
    /// Annotate entry points with `requiredResults`.
    pub annotate_result_use: bool,
    /// Attribute that marks entry points.
    pub entry_point_attr: String,
    /// Simplify the module before transforming it.
    pub simplify_prior_transform: bool,
}

impl Default for TransformationRulesPassConfiguration {
    fn default() -> Self {
        Self {
            delete_dead_code: true,
            clone_functions: true,
            transform_execution_path_only: true,
            max_recursion: 512,
            assume_no_except: false,
            reuse_qubits: true,
            annotate_qubit_use: true,
            reuse_results: true,
            annotate_result_use: true,
            entry_point_attr: "EntryPoint".into(),
            simplify_prior_transform: true,
        }
    }
}

impl TransformationRulesPassConfiguration {
    /// A configuration that runs none of the optional phases.
    pub fn disabled() -> Self {
        Self {
            delete_dead_code: false,
            clone_functions: false,
            transform_execution_path_only: false,
            max_recursion: 512,
            simplify_prior_transform: false,
            reuse_qubits: false,
            annotate_qubit_use: false,
            ..Self::default()
        }
    }

    /// Check whether all optional phases are off.
    pub fn is_disabled(&self) -> bool {
        !self.delete_dead_code
            && !self.clone_functions
            && !self.simplify_prior_transform
            && !self.transform_execution_path_only
            && !self.reuse_qubits
    }
}

impl Configuration for TransformationRulesPassConfiguration {
    const KEY: &'static str = "transformation-rules-pass";

    fn section_name() -> &'static str {
        "Pass configuration"
    }

    fn section_description() -> &'static str {
        "Configuration of the pass and its corresponding optimisations."
    }

    fn parameters() -> &'static [ParameterDoc] {
        const PARAMETERS: &[ParameterDoc] = &[
            ParameterDoc::new("delete-dead-code", "Deletes dead code."),
            ParameterDoc::new(
                "clone-functions",
                "Clones functions to ensure correct qubit allocation.",
            ),
            ParameterDoc::new("transform-execution-path-only", "Transforms execution paths only."),
            ParameterDoc::new(
                "max-recursion",
                "Defines the maximum recursion when unrolling the execution path.",
            ),
            ParameterDoc::new(
                "assume-no-except",
                "Assumes that no exception will occur during runtime.",
            ),
            ParameterDoc::new("reuse-qubits", "Defines whether or not to reuse qubits."),
            ParameterDoc::new("annotate-qubit-use", "Annotates the number of qubits used."),
            ParameterDoc::new("reuse-results", "Defines whether or not to reuse results."),
            ParameterDoc::new("annotate-result-use", "Annotates the number of results used."),
            ParameterDoc::new(
                "entry-point-attr",
                "Specifies the attribute indicating the entry point.",
            ),
            ParameterDoc::new(
                "simplify-prior-transform",
                "Simplifies the IR before transformation.",
            ),
        ];
        PARAMETERS
    }
}
