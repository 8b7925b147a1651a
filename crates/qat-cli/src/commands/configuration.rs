//! Fixed options of the tool.

use std::path::PathBuf;

use clap::Args;

/// What the tool does with its input.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct QatConfiguration {
    /// Apply the profile's generation pipeline to the input
    #[arg(long)]
    pub generate: bool,

    /// Validate the (generated) program against the profile
    #[arg(long)]
    pub validate: bool,

    /// Target profile (generic, base)
    #[arg(long, default_value = "generic")]
    pub profile: String,

    /// Write the program as LLVM assembly
    #[arg(short = 'S', long)]
    pub emit_ll: bool,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Check the structural invariants of the program after generation
    #[arg(long)]
    pub verify_module: bool,

    /// Print every configuration parameter and its value
    #[arg(long)]
    pub dump_config: bool,

    /// Save the configuration as YAML
    #[arg(long, value_name = "FILE")]
    pub save_config: Option<PathBuf>,

    /// Load the configuration from YAML before applying command line parameters
    #[arg(long, value_name = "FILE")]
    pub load_config: Option<PathBuf>,

    /// Verify the program before and after each profile run
    #[arg(long)]
    pub debug: bool,

    /// Input file (LLVM assembly)
    pub input: Option<PathBuf>,
}

impl QatConfiguration {
    /// Whether a profile has to be built.
    pub fn needs_profile(&self) -> bool {
        self.generate || self.validate
    }

    /// Whether the module is written out.
    pub fn writes_module(&self) -> bool {
        self.emit_ll || self.output.is_some()
    }
}
