//! QIR Adaptor Tool
//!
//! Rewrites a QIR program so that it satisfies the restrictions of a target
//! profile, then optionally verifies and validates the result.
//!
//! ```text
//! qat --generate --profile base -S program.ll
//! qat --validate --profile base program.ll
//! qat --dump-config --no-reuse-qubits
//! ```
//!
//! Besides the fixed options below, every parameter of the registered
//! configuration sections is accepted as `--<name> <value>` (or `--<name>` /
//! `--no-<name>` for boolean parameters), and every profile component can be
//! switched off with `--disable-<id>`.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{CommandFactory, FromArgMatches, Parser};
use console::style;
use tracing_subscriber::EnvFilter;

use qat_compile::ProfileGenerator;

mod commands;

use commands::{QatConfiguration, generate, parameters};

/// QAT - adapts QIR programs to hardware profiles
#[derive(Parser, Debug)]
#[command(name = "qat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    config: QatConfiguration,
}

fn main() -> anyhow::Result<()> {
    let result = ProfileGenerator::new()
        .map_err(anyhow::Error::from)
        .and_then(|mut generator| {
            let command = parameters::augment(Cli::command(), generator.configuration_manager())?;
            let matches = command.get_matches();
            let cli = Cli::from_arg_matches(&matches)?;

            init_logging(cli.verbose);
            generate::execute(&cli.config, &matches, &mut generator)
        });

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        let generator = ProfileGenerator::new().unwrap();
        parameters::augment(Cli::command(), generator.configuration_manager())
            .unwrap()
            .debug_assert();
    }

    #[test]
    fn test_fixed_options() {
        let cli = Cli::try_parse_from([
            "qat",
            "--generate",
            "--profile",
            "base",
            "-S",
            "-o",
            "out.ll",
            "-vv",
            "in.ll",
        ])
        .unwrap();
        assert!(cli.config.generate);
        assert!(cli.config.emit_ll);
        assert_eq!(cli.config.profile, "base");
        assert_eq!(cli.config.output.as_deref(), Some(std::path::Path::new("out.ll")));
        assert_eq!(cli.config.input.as_deref(), Some(std::path::Path::new("in.ll")));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["qat"]).unwrap();
        assert_eq!(cli.config.profile, "generic");
        assert!(!cli.config.generate);
        assert!(!cli.config.validate);
        assert!(cli.config.input.is_none());
    }
}
