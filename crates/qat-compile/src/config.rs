//! Configuration sections and their registry.
//!
//! Every configurable part of the tool declares a serde structure that
//! implements [`Configuration`]. A [`ConfigurationManager`] holds one value
//! per registered section and gives uniform access to the individual
//! parameters, so that they can be bound to command line flags and saved to
//! or loaded from YAML without the manager knowing the concrete types.
//!
//! # Example
//!
//! ```
//! use qat_compile::{ConfigurationManager, TransformationRulesPassConfiguration};
//!
//! let mut manager = ConfigurationManager::new();
//! manager
//!     .add_component_config::<TransformationRulesPassConfiguration>("transformation-rules")
//!     .unwrap();
//!
//! manager.set_parameter_from_str("max-recursion", "64").unwrap();
//! manager.set_parameter_from_str("clone-functions", "false").unwrap();
//!
//! let config = manager.get::<TransformationRulesPassConfiguration>().unwrap();
//! assert_eq!(config.max_recursion, 64);
//! assert!(!config.clone_functions);
//! ```

use std::any::{Any, TypeId};
use std::fmt::Write as _;

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

use crate::error::{CompileError, CompileResult};

/// Key under which disabled components are listed in saved configurations.
pub const DISABLED_COMPONENTS_KEY: &str = "disabled-components";

/// Documentation of one parameter of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterDoc {
    /// Parameter name, identical to the serialized field name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
}

impl ParameterDoc {
    /// Create a parameter description.
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self { name, description }
    }
}

/// A configuration section.
///
/// Implementations are plain serde structures whose serialized field names
/// match the documented parameters.
pub trait Configuration: Serialize + DeserializeOwned + Default + Clone + 'static {
    /// Key of the section in saved configurations.
    const KEY: &'static str;

    /// Human-readable section title.
    fn section_name() -> &'static str;

    /// Section description.
    fn section_description() -> &'static str;

    /// Parameters exposed by the section.
    fn parameters() -> &'static [ParameterDoc];
}

/// The value type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Boolean flag.
    Flag,
    /// Integer.
    Integer,
    /// Free text.
    Text,
    /// List of strings.
    List,
}

impl ParameterKind {
    fn of(value: &JsonValue) -> Self {
        match value {
            JsonValue::Bool(_) => ParameterKind::Flag,
            JsonValue::Number(_) => ParameterKind::Integer,
            JsonValue::Array(_) => ParameterKind::List,
            _ => ParameterKind::Text,
        }
    }
}

/// A parameter together with its current value.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    /// Key of the owning section.
    pub section: &'static str,
    /// Parameter name.
    pub name: &'static str,
    /// Description.
    pub description: &'static str,
    /// Value type.
    pub kind: ParameterKind,
    /// Current value.
    pub value: JsonValue,
}

/// A registered profile component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Component id, used for `--disable-<id>`.
    pub id: String,
    /// Key of the component's configuration section.
    pub section: &'static str,
    /// Whether the component is enabled.
    pub active: bool,
}

struct Section {
    key: &'static str,
    name: &'static str,
    description: &'static str,
    parameters: &'static [ParameterDoc],
    component: Option<String>,
    active: bool,
    value: Box<dyn Any>,
    encode: fn(&dyn Any) -> CompileResult<JsonValue>,
    decode: fn(JsonValue) -> CompileResult<Box<dyn Any>>,
}

impl Section {
    fn json(&self) -> CompileResult<JsonValue> {
        (self.encode)(self.value.as_ref())
    }
}

fn encode<C: Configuration>(value: &dyn Any) -> CompileResult<JsonValue> {
    let config = value.downcast_ref::<C>().ok_or_else(|| {
        CompileError::InvalidConfiguration(format!("section '{}' holds an unexpected type", C::KEY))
    })?;
    Ok(serde_json::to_value(config)?)
}

fn decode<C: Configuration>(value: JsonValue) -> CompileResult<Box<dyn Any>> {
    let config: C = serde_json::from_value(value)?;
    Ok(Box::new(config))
}

/// Registry of configuration sections.
#[derive(Default)]
pub struct ConfigurationManager {
    sections: Vec<Section>,
    index: FxHashMap<TypeId, usize>,
}

impl ConfigurationManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a section with its default value.
    pub fn add_config<C: Configuration>(&mut self) -> CompileResult<()> {
        self.register::<C>(None)
    }

    /// Register the section of a profile component. Components can be
    /// switched off as a whole.
    pub fn add_component_config<C: Configuration>(&mut self, id: &str) -> CompileResult<()> {
        self.register::<C>(Some(id.to_string()))
    }

    fn register<C: Configuration>(&mut self, component: Option<String>) -> CompileResult<()> {
        if self.index.contains_key(&TypeId::of::<C>()) {
            return Err(CompileError::InvalidConfiguration(format!(
                "section '{}' is already registered",
                C::KEY
            )));
        }
        if self.sections.iter().any(|s| s.key == C::KEY) {
            return Err(CompileError::InvalidConfiguration(format!(
                "section key '{}' is already taken",
                C::KEY
            )));
        }
        for parameter in C::parameters() {
            if self.find_parameter(parameter.name).is_some() {
                return Err(CompileError::InvalidConfiguration(format!(
                    "parameter '{}' is declared by more than one section",
                    parameter.name
                )));
            }
        }

        self.index.insert(TypeId::of::<C>(), self.sections.len());
        self.sections.push(Section {
            key: C::KEY,
            name: C::section_name(),
            description: C::section_description(),
            parameters: C::parameters(),
            component,
            active: true,
            value: Box::new(C::default()),
            encode: encode::<C>,
            decode: decode::<C>,
        });
        Ok(())
    }

    fn section<C: Configuration>(&self) -> CompileResult<&Section> {
        self.index
            .get(&TypeId::of::<C>())
            .map(|&i| &self.sections[i])
            .ok_or_else(|| not_registered(C::KEY))
    }

    fn section_mut<C: Configuration>(&mut self) -> CompileResult<&mut Section> {
        match self.index.get(&TypeId::of::<C>()) {
            Some(&i) => Ok(&mut self.sections[i]),
            None => Err(not_registered(C::KEY)),
        }
    }

    /// Check whether a section is registered.
    pub fn contains<C: Configuration>(&self) -> bool {
        self.index.contains_key(&TypeId::of::<C>())
    }

    /// Current value of a section.
    pub fn get<C: Configuration>(&self) -> CompileResult<&C> {
        self.section::<C>()?
            .value
            .downcast_ref::<C>()
            .ok_or_else(|| not_registered(C::KEY))
    }

    /// Mutable access to a section.
    pub fn get_mut<C: Configuration>(&mut self) -> CompileResult<&mut C> {
        self.section_mut::<C>()?
            .value
            .downcast_mut::<C>()
            .ok_or_else(|| not_registered(C::KEY))
    }

    /// Replace the value of a section.
    pub fn set_config<C: Configuration>(&mut self, config: C) -> CompileResult<()> {
        *self.get_mut::<C>()? = config;
        Ok(())
    }

    /// Whether the section is enabled. Plain sections are always enabled.
    pub fn is_active<C: Configuration>(&self) -> bool {
        self.section::<C>().is_ok_and(|s| s.active)
    }

    /// Enable or disable a component by id.
    pub fn set_component_active(&mut self, id: &str, active: bool) -> CompileResult<()> {
        let section = self
            .sections
            .iter_mut()
            .find(|s| s.component.as_deref() == Some(id))
            .ok_or_else(|| CompileError::InvalidConfiguration(format!("unknown component '{id}'")))?;
        section.active = active;
        Ok(())
    }

    /// Registered components in registration order.
    pub fn components(&self) -> Vec<ComponentInfo> {
        self.sections
            .iter()
            .filter_map(|s| {
                s.component.as_ref().map(|id| ComponentInfo {
                    id: id.clone(),
                    section: s.key,
                    active: s.active,
                })
            })
            .collect()
    }

    /// All parameters with their current values.
    pub fn parameters(&self) -> CompileResult<Vec<ParameterInfo>> {
        let mut parameters = Vec::new();
        for section in &self.sections {
            let json = section.json()?;
            for doc in section.parameters {
                let value = json.get(doc.name).cloned().unwrap_or(JsonValue::Null);
                parameters.push(ParameterInfo {
                    section: section.key,
                    name: doc.name,
                    description: doc.description,
                    kind: ParameterKind::of(&value),
                    value,
                });
            }
        }
        Ok(parameters)
    }

    fn find_parameter(&self, name: &str) -> Option<usize> {
        self.sections
            .iter()
            .position(|s| s.parameters.iter().any(|p| p.name == name))
    }

    /// Set a parameter to a JSON value of the matching type.
    pub fn set_parameter(&mut self, name: &str, value: JsonValue) -> CompileResult<()> {
        let index = self
            .find_parameter(name)
            .ok_or_else(|| CompileError::InvalidConfiguration(format!("unknown parameter '{name}'")))?;
        let section = &mut self.sections[index];
        let mut json = section.json()?;
        if let JsonValue::Object(fields) = &mut json {
            fields.insert(name.to_string(), value);
        }
        section.value = (section.decode)(json).map_err(|err| {
            CompileError::InvalidConfiguration(format!("invalid value for '{name}': {err}"))
        })?;
        Ok(())
    }

    /// Set a parameter from its textual command line form.
    pub fn set_parameter_from_str(&mut self, name: &str, raw: &str) -> CompileResult<()> {
        let kind = self
            .parameters()?
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| p.kind)
            .ok_or_else(|| CompileError::InvalidConfiguration(format!("unknown parameter '{name}'")))?;
        let value = parse_parameter(name, kind, raw)?;
        self.set_parameter(name, value)
    }

    /// Serialize all sections to YAML.
    pub fn to_yaml(&self) -> CompileResult<String> {
        let mut root = Map::new();
        for section in &self.sections {
            root.insert(section.key.to_string(), section.json()?);
        }
        let disabled: Vec<JsonValue> = self
            .components()
            .into_iter()
            .filter(|c| !c.active)
            .map(|c| JsonValue::String(c.id))
            .collect();
        if !disabled.is_empty() {
            root.insert(DISABLED_COMPONENTS_KEY.to_string(), JsonValue::Array(disabled));
        }
        Ok(serde_yaml_ng::to_string(&JsonValue::Object(root))?)
    }

    /// Load sections from YAML. Parameters missing from the document keep
    /// their current values.
    pub fn load_yaml(&mut self, text: &str) -> CompileResult<()> {
        let document: JsonValue = serde_yaml_ng::from_str(text)?;
        let JsonValue::Object(root) = document else {
            if document.is_null() {
                return Ok(());
            }
            return Err(CompileError::InvalidConfiguration(
                "configuration document must be a mapping".into(),
            ));
        };

        for (key, value) in root {
            if key == DISABLED_COMPONENTS_KEY {
                let ids: Vec<String> = serde_json::from_value(value)?;
                for id in ids {
                    self.set_component_active(&id, false)?;
                }
                continue;
            }

            let section = self
                .sections
                .iter_mut()
                .find(|s| s.key == key)
                .ok_or_else(|| CompileError::InvalidConfiguration(format!("unknown section '{key}'")))?;
            let mut json = section.json()?;
            match (&mut json, value) {
                (JsonValue::Object(current), JsonValue::Object(update)) => current.extend(update),
                (_, JsonValue::Null) => {}
                _ => {
                    return Err(CompileError::InvalidConfiguration(format!(
                        "section '{key}' must be a mapping"
                    )));
                }
            }
            section.value = (section.decode)(json)?;
        }
        Ok(())
    }

    /// Human-readable listing of every section and parameter.
    pub fn describe(&self) -> CompileResult<String> {
        let parameters = self.parameters()?;
        let width = parameters.iter().map(|p| p.name.len()).max().unwrap_or(0);
        let mut out = String::new();
        for section in &self.sections {
            let _ = writeln!(out, "; # {}", section.name);
            if !section.description.is_empty() {
                let _ = writeln!(out, "; {}", section.description);
            }
            if let Some(id) = &section.component {
                let state = if section.active { "enabled" } else { "disabled" };
                let _ = writeln!(out, "; component '{id}' is {state}");
            }
            for parameter in parameters.iter().filter(|p| p.section == section.key) {
                let _ = writeln!(
                    out,
                    "; {:<width$}  {}",
                    parameter.name,
                    display_value(&parameter.value),
                );
            }
            out.push_str(";\n");
        }
        Ok(out)
    }
}

fn not_registered(key: &str) -> CompileError {
    CompileError::InvalidConfiguration(format!("section '{key}' is not registered"))
}

fn display_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        JsonValue::Array(items) => items.iter().map(display_value).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

fn parse_parameter(name: &str, kind: ParameterKind, raw: &str) -> CompileResult<JsonValue> {
    let invalid = || CompileError::InvalidConfiguration(format!("invalid value '{raw}' for '{name}'"));
    match kind {
        ParameterKind::Flag => match raw.trim().to_ascii_lowercase().as_str() {
            "" | "true" | "1" | "yes" | "on" => Ok(JsonValue::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(JsonValue::Bool(false)),
            _ => Err(invalid()),
        },
        ParameterKind::Integer => raw
            .trim()
            .parse::<u64>()
            .map(JsonValue::from)
            .or_else(|_| raw.trim().parse::<i64>().map(JsonValue::from))
            .map_err(|_| invalid()),
        ParameterKind::Text => Ok(JsonValue::String(raw.to_string())),
        ParameterKind::List => Ok(JsonValue::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| JsonValue::String(item.to_string()))
                .collect(),
        )),
    }
}

impl std::fmt::Debug for ConfigurationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationManager")
            .field("sections", &self.sections.iter().map(|s| s.key).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case", default)]
    struct Sample {
        enable_thing: bool,
        limit: u64,
        label: String,
        names: Vec<String>,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                enable_thing: true,
                limit: 10,
                label: "x".into(),
                names: vec![],
            }
        }
    }

    impl Configuration for Sample {
        const KEY: &'static str = "sample";

        fn section_name() -> &'static str {
            "Sample"
        }

        fn section_description() -> &'static str {
            "A sample section."
        }

        fn parameters() -> &'static [ParameterDoc] {
            const PARAMETERS: &[ParameterDoc] = &[
                ParameterDoc::new("enable-thing", "Enables the thing."),
                ParameterDoc::new("limit", "An upper bound."),
                ParameterDoc::new("label", "A label."),
                ParameterDoc::new("names", "Some names."),
            ];
            PARAMETERS
        }
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case", default)]
    struct Clashing {
        limit: u64,
    }

    impl Configuration for Clashing {
        const KEY: &'static str = "clashing";

        fn section_name() -> &'static str {
            "Clashing"
        }

        fn section_description() -> &'static str {
            ""
        }

        fn parameters() -> &'static [ParameterDoc] {
            const PARAMETERS: &[ParameterDoc] = &[ParameterDoc::new("limit", "Same name.")];
            PARAMETERS
        }
    }

    #[test]
    fn test_parameters_report_kinds() {
        let mut manager = ConfigurationManager::new();
        manager.add_config::<Sample>().unwrap();
        let parameters = manager.parameters().unwrap();
        let kinds: Vec<_> = parameters.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ParameterKind::Flag,
                ParameterKind::Integer,
                ParameterKind::Text,
                ParameterKind::List
            ]
        );
    }

    #[test]
    fn test_set_parameter_from_str() {
        let mut manager = ConfigurationManager::new();
        manager.add_config::<Sample>().unwrap();
        manager.set_parameter_from_str("enable-thing", "false").unwrap();
        manager.set_parameter_from_str("limit", "42").unwrap();
        manager.set_parameter_from_str("names", "a, b,,c").unwrap();

        let sample = manager.get::<Sample>().unwrap();
        assert!(!sample.enable_thing);
        assert_eq!(sample.limit, 42);
        assert_eq!(sample.names, vec!["a", "b", "c"]);

        assert!(manager.set_parameter_from_str("limit", "many").is_err());
        assert!(manager.set_parameter_from_str("missing", "1").is_err());
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let mut manager = ConfigurationManager::new();
        manager.add_config::<Sample>().unwrap();
        assert!(manager.add_config::<Sample>().is_err());
        assert!(manager.add_config::<Clashing>().is_err());
    }

    #[test]
    fn test_yaml_round_trip_with_components() {
        let mut manager = ConfigurationManager::new();
        manager.add_component_config::<Sample>("sampling").unwrap();
        manager.set_parameter_from_str("label", "hello").unwrap();
        manager.set_component_active("sampling", false).unwrap();
        let yaml = manager.to_yaml().unwrap();
        assert!(yaml.contains("label: hello"));
        assert!(yaml.contains("sampling"));

        let mut loaded = ConfigurationManager::new();
        loaded.add_component_config::<Sample>("sampling").unwrap();
        loaded.load_yaml(&yaml).unwrap();
        assert_eq!(loaded.get::<Sample>().unwrap().label, "hello");
        assert!(!loaded.is_active::<Sample>());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let mut manager = ConfigurationManager::new();
        manager.add_config::<Sample>().unwrap();
        manager.load_yaml("sample:\n  limit: 3\n").unwrap();
        let sample = manager.get::<Sample>().unwrap();
        assert_eq!(sample.limit, 3);
        assert!(sample.enable_thing);

        assert!(manager.load_yaml("unknown:\n  a: 1\n").is_err());
    }

    #[test]
    fn test_describe_lists_parameters() {
        let mut manager = ConfigurationManager::new();
        manager.add_component_config::<Sample>("sampling").unwrap();
        let text = manager.describe().unwrap();
        assert!(text.contains("; # Sample"));
        assert!(text.contains("component 'sampling' is enabled"));
        assert!(text.contains("limit"));
    }
}
