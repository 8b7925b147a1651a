//! Generation and validation driver.

use anyhow::{Context, Result};
use clap::ArgMatches;
use console::style;
use tracing::info;

use qat_compile::{ProfileGenerator, ValidationPassConfiguration};
use qat_ir::verify_module;

use super::common::{load_module, write_module, write_text};
use super::configuration::QatConfiguration;
use super::parameters;

/// Execute the tool with the parsed options.
///
/// The configuration is assembled in three layers: the validation preset of
/// the selected profile, the YAML file given by `--load-config`, and finally
/// the parameters given on the command line.
pub fn execute(
    config: &QatConfiguration,
    matches: &ArgMatches,
    generator: &mut ProfileGenerator,
) -> Result<()> {
    let manager = generator.configuration_manager_mut();
    manager.set_config(ValidationPassConfiguration::from_profile_name(&config.profile)?)?;
    if let Some(path) = &config.load_config {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration: {}", path.display()))?;
        manager
            .load_yaml(&text)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    }
    parameters::apply(matches, manager)?;

    if let Some(path) = &config.save_config {
        write_text(path, &manager.to_yaml()?)?;
        eprintln!(
            "{} Configuration saved to {}",
            style("✓").green().bold(),
            style(path.display()).green()
        );
    }
    if config.dump_config {
        print!("{}", manager.describe()?);
    }

    let Some(input) = &config.input else {
        if config.dump_config || config.save_config.is_some() {
            return Ok(());
        }
        anyhow::bail!("Expected exactly one input file");
    };

    let mut module = load_module(input)?;
    info!(
        "loaded {} with {} functions",
        input.display(),
        module.num_functions()
    );

    let mut profile = if config.needs_profile() {
        Some(generator.new_profile(&config.profile, config.debug)?)
    } else {
        None
    };

    if config.generate {
        if let Some(profile) = profile.as_mut() {
            profile.apply(&mut module)?;
            if let Some(stats) = profile.statistics() {
                info!(
                    "{} rules applied, {} functions cloned, {} qubits, {} results",
                    stats.rules_applied,
                    stats.functions_cloned,
                    stats.required_qubits.unwrap_or_default(),
                    stats.required_results.unwrap_or_default()
                );
            }
        }
    }

    if config.verify_module {
        verify_module(&module).context("Module verification failed")?;
    }

    if config.validate {
        if let Some(profile) = profile.as_mut() {
            profile.validate(&mut module)?;
            eprintln!(
                "{} Program is valid for the '{}' profile",
                style("✓").green().bold(),
                style(&config.profile).yellow()
            );
        }
    }

    if config.writes_module() {
        write_module(&module, config.output.as_deref())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Args {
        #[command(flatten)]
        config: QatConfiguration,
    }

    const PROGRAM: &str = r#"
%Qubit = type opaque

define void @Main() #0 {
entry:
  %q = call %Qubit* @__quantum__rt__qubit_allocate()
  call void @__quantum__qis__h__body(%Qubit* %q)
  call void @__quantum__rt__qubit_release(%Qubit* %q)
  ret void
}

declare %Qubit* @__quantum__rt__qubit_allocate()
declare void @__quantum__rt__qubit_release(%Qubit*)
declare void @__quantum__qis__h__body(%Qubit*)

attributes #0 = { "EntryPoint" }
"#;

    fn run(args: &[&str]) -> Result<ProfileGenerator> {
        let mut generator = ProfileGenerator::new()?;
        let command = parameters::augment(
            <Args as clap::CommandFactory>::command(),
            generator.configuration_manager(),
        )?;
        let matches =
            command.try_get_matches_from(std::iter::once("qat").chain(args.iter().copied()))?;
        let args = <Args as clap::FromArgMatches>::from_arg_matches(&matches)?;
        execute(&args.config, &matches, &mut generator)?;
        Ok(generator)
    }

    #[test]
    fn test_generate_writes_static_program() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.ll");
        let output = dir.path().join("out.ll");
        fs::write(&input, PROGRAM).unwrap();

        run(&[
            "--generate",
            "--validate",
            "--profile",
            "base",
            "--verify-module",
            "-S",
            "-o",
            output.to_str().unwrap(),
            input.to_str().unwrap(),
        ])
        .unwrap();

        let text = fs::read_to_string(&output).unwrap();
        assert!(text.contains("call void @__quantum__qis__h__body(%Qubit* inttoptr (i64 0 to %Qubit*))"));
        assert!(!text.contains("qubit_allocate"));
    }

    #[test]
    fn test_validation_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.ll");
        fs::write(&input, PROGRAM).unwrap();

        // Without generation the program still allocates dynamically.
        let err = run(&["--validate", "--profile", "base", input.to_str().unwrap()]).unwrap_err();
        assert!(err.to_string().contains("not valid within the 'base' profile"), "{err}");
    }

    #[test]
    fn test_missing_input() {
        let err = run(&["--generate"]).unwrap_err();
        assert!(err.to_string().contains("Expected exactly one input file"));
    }

    #[test]
    fn test_unknown_profile() {
        assert!(run(&["--profile", "adaptive", "--dump-config"]).is_err());
    }

    #[test]
    fn test_configuration_layers() {
        let dir = tempfile::tempdir().unwrap();
        let saved = dir.path().join("qat.yaml");

        run(&[
            "--max-recursion",
            "7",
            "--disable-ir-passes",
            "--save-config",
            saved.to_str().unwrap(),
        ])
        .unwrap();
        let yaml = fs::read_to_string(&saved).unwrap();
        assert!(yaml.contains("max-recursion: 7"), "{yaml}");
        assert!(yaml.contains("ir-passes"), "{yaml}");

        // The command line overrides the loaded file.
        let generator = run(&[
            "--load-config",
            saved.to_str().unwrap(),
            "--max-recursion",
            "9",
            "--dump-config",
        ])
        .unwrap();
        let manager = generator.configuration_manager();
        let config = manager
            .get::<qat_compile::TransformationRulesPassConfiguration>()
            .unwrap();
        assert_eq!(config.max_recursion, 9);
        assert!(!manager.is_active::<qat_compile::IrPassesConfiguration>());
    }

    #[test]
    fn test_profile_sets_validation_preset() {
        let generator = run(&["--profile", "base", "--dump-config"]).unwrap();
        let validation = generator
            .configuration_manager()
            .get::<ValidationPassConfiguration>()
            .unwrap();
        assert!(!validation.allow_internal_calls);
    }
}
