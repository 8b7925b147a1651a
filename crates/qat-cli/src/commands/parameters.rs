//! Command line binding of configuration parameters.
//!
//! Parameters are only known at run time, once the profile components have
//! registered their sections, so their arguments are added to the derived
//! command with the builder API.

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};

use qat_compile::{ConfigurationManager, ParameterKind};

/// Add an argument for every parameter and component of `manager`.
pub fn augment(mut command: Command, manager: &ConfigurationManager) -> Result<Command> {
    for parameter in manager.parameters()? {
        let heading = parameter.section;
        let default = display_default(&parameter.value);
        match parameter.kind {
            ParameterKind::Flag => {
                command = command
                    .arg(
                        Arg::new(parameter.name)
                            .long(parameter.name)
                            .action(ArgAction::SetTrue)
                            .help(format!("{} [default: {default}]", parameter.description))
                            .help_heading(heading),
                    )
                    .arg(
                        Arg::new(negated(parameter.name))
                            .long(negated(parameter.name))
                            .action(ArgAction::SetTrue)
                            .conflicts_with(parameter.name)
                            .hide(true),
                    );
            }
            ParameterKind::Integer | ParameterKind::Text | ParameterKind::List => {
                command = command.arg(
                    Arg::new(parameter.name)
                        .long(parameter.name)
                        .value_name("VALUE")
                        .num_args(1)
                        .help(format!("{} [default: {default}]", parameter.description))
                        .help_heading(heading),
                );
            }
        }
    }

    for component in manager.components() {
        command = command.arg(
            Arg::new(disabled(&component.id))
                .long(disabled(&component.id))
                .action(ArgAction::SetTrue)
                .help(format!("Disables the {} component", component.id))
                .help_heading("components"),
        );
    }
    Ok(command)
}

/// Copy the parameters given on the command line into `manager`.
///
/// Parameters that were not given keep their current value.
pub fn apply(matches: &ArgMatches, manager: &mut ConfigurationManager) -> Result<()> {
    for parameter in manager.parameters()? {
        match parameter.kind {
            ParameterKind::Flag => {
                if matches.get_flag(parameter.name) {
                    manager.set_parameter_from_str(parameter.name, "true")?;
                } else if matches.get_flag(&negated(parameter.name)) {
                    manager.set_parameter_from_str(parameter.name, "false")?;
                }
            }
            ParameterKind::Integer | ParameterKind::Text | ParameterKind::List => {
                if let Some(raw) = matches.get_one::<String>(parameter.name) {
                    manager.set_parameter_from_str(parameter.name, raw)?;
                }
            }
        }
    }

    for component in manager.components() {
        if matches.get_flag(&disabled(&component.id)) {
            tracing::debug!("component '{}' disabled", component.id);
            manager.set_component_active(&component.id, false)?;
        }
    }
    Ok(())
}

fn negated(name: &str) -> String {
    format!("no-{name}")
}

fn disabled(id: &str) -> String {
    format!("disable-{id}")
}

fn display_default(value: &impl std::fmt::Display) -> String {
    let text = value.to_string();
    text.trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qat_compile::{
        IrPassesConfiguration, ProfileGenerator, TransformationRulesPassConfiguration,
        ValidationPassConfiguration,
    };

    fn parse(args: &[&str]) -> ProfileGenerator {
        let mut generator = ProfileGenerator::new().unwrap();
        let command = augment(Command::new("qat"), generator.configuration_manager()).unwrap();
        let matches = command
            .try_get_matches_from(std::iter::once("qat").chain(args.iter().copied()))
            .unwrap();
        apply(&matches, generator.configuration_manager_mut()).unwrap();
        generator
    }

    #[test]
    fn test_untouched_parameters_keep_values() {
        let generator = parse(&[]);
        let config = generator
            .configuration_manager()
            .get::<TransformationRulesPassConfiguration>()
            .unwrap();
        assert_eq!(config, &TransformationRulesPassConfiguration::default());
    }

    #[test]
    fn test_flags_and_values() {
        let generator = parse(&[
            "--max-recursion",
            "64",
            "--no-delete-dead-code",
            "--assume-no-except",
            "--entry-point-attr",
            "main",
        ]);
        let config = generator
            .configuration_manager()
            .get::<TransformationRulesPassConfiguration>()
            .unwrap();
        assert_eq!(config.max_recursion, 64);
        assert!(!config.delete_dead_code);
        assert!(config.assume_no_except);
        assert_eq!(config.entry_point_attr, "main");
    }

    #[test]
    fn test_list_parameter() {
        let generator = parse(&["--opcodes", "call, ret,br"]);
        let config = generator
            .configuration_manager()
            .get::<ValidationPassConfiguration>()
            .unwrap();
        assert_eq!(config.opcodes, ["call", "ret", "br"]);
    }

    #[test]
    fn test_disable_component() {
        let generator = parse(&["--disable-ir-passes"]);
        let manager = generator.configuration_manager();
        assert!(!manager.is_active::<IrPassesConfiguration>());
        assert!(manager.is_active::<TransformationRulesPassConfiguration>());
    }

    #[test]
    fn test_flag_and_negation_conflict() {
        let generator = ProfileGenerator::new().unwrap();
        let command = augment(Command::new("qat"), generator.configuration_manager()).unwrap();
        let result =
            command.try_get_matches_from(["qat", "--reuse-qubits", "--no-reuse-qubits"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_integer_is_rejected() {
        let mut generator = ProfileGenerator::new().unwrap();
        let command = augment(Command::new("qat"), generator.configuration_manager()).unwrap();
        let matches = command
            .try_get_matches_from(["qat", "--max-recursion", "many"])
            .unwrap();
        assert!(apply(&matches, generator.configuration_manager_mut()).is_err());
    }
}
