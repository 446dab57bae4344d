//! Definition registry
//!
//! Holds every endpoint definition known to the process, keyed by
//! `(family, name)`. The registry is populated once at startup (from a
//! directory of JSON/YAML documents or programmatically) and is read-only
//! afterwards; share it behind an `Arc`.

use crate::error::{ErrorKind, ModuleError, Result};
use crate::schema::{EndpointDefinition, ParamType, ParameterSpec};
use crate::template::path_parameters;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A definition document holds one definition or a list of them
#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Many(Vec<EndpointDefinition>),
    One(Box<EndpointDefinition>),
}

/// One externally visible argument of a definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgumentDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Required by at least one operation
    pub required_somewhere: bool,
    /// Union of permitted literals, when every declaration restricts them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_type: Option<ParamType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Vec<ParameterSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Combined argument schema across all operations of a definition
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaDescriptor {
    pub arguments: Vec<ArgumentDescriptor>,
}

impl SchemaDescriptor {
    pub fn get(&self, name: &str) -> Option<&ArgumentDescriptor> {
        self.arguments.iter().find(|a| a.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().map(|a| a.name.as_str())
    }
}

/// Read-only store of endpoint definitions
#[derive(Debug, Clone, Default)]
pub struct DefinitionRegistry {
    definitions: HashMap<(String, String), Arc<EndpointDefinition>>,
}

impl DefinitionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from in-memory definitions
    pub fn from_definitions<I>(definitions: I) -> Result<Self>
    where
        I: IntoIterator<Item = EndpointDefinition>,
    {
        let mut registry = Self::new();
        for definition in definitions {
            registry.register(definition)?;
        }
        Ok(registry)
    }

    /// Validate and add a definition
    ///
    /// # Returns
    /// * `Err` with `DuplicateDefinition` if `(family, name)` is taken
    /// * `Err` with `InvalidDefinition` if the definition is malformed
    pub fn register(&mut self, definition: EndpointDefinition) -> Result<()> {
        validate_definition(&definition)?;

        let key = (definition.family.clone(), definition.name.clone());
        if self.definitions.contains_key(&key) {
            return Err(ModuleError::new(
                ErrorKind::DuplicateDefinition,
                format!("definition {} is already registered", definition.key()),
            ));
        }

        debug!(definition = %definition.key(), "registered endpoint definition");
        self.definitions.insert(key, Arc::new(definition));
        Ok(())
    }

    /// Parse a JSON or YAML document and register what it contains
    ///
    /// # Returns
    /// Number of definitions registered from the document
    pub fn load_document(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ModuleError::invalid_definition(format!("failed to read {}: {}", path.display(), e))
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let document: Document = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| {
                ModuleError::invalid_definition(format!("{}: {}", path.display(), e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                ModuleError::invalid_definition(format!("{}: {}", path.display(), e))
            })?
        };

        let definitions = match document {
            Document::Many(list) => list,
            Document::One(single) => vec![*single],
        };

        let count = definitions.len();
        for definition in definitions {
            self.register(definition).map_err(|e| ModuleError {
                message: format!("{}: {}", path.display(), e.message),
                ..e
            })?;
        }
        Ok(count)
    }

    /// Load every `.json`, `.yaml` and `.yml` document below `dir`
    ///
    /// Order of loading is insignificant. Any malformed document or duplicate
    /// definition aborts the load.
    pub fn load_from_directory(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ModuleError::invalid_definition(format!(
                "path is not a directory: {}",
                dir.display()
            )));
        }

        let entries = std::fs::read_dir(dir).map_err(|e| {
            ModuleError::invalid_definition(format!(
                "failed to read directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                ModuleError::invalid_definition(format!("failed to read directory entry: {}", e))
            })?;
            paths.push(entry.path());
        }
        paths.sort();

        let mut count = 0;
        for path in paths {
            if path.is_dir() {
                count += self.load_from_directory(&path)?;
                continue;
            }
            let supported = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("json") | Some("yaml") | Some("yml")
            );
            if supported {
                count += self.load_document(&path)?;
            }
        }

        info!(directory = %dir.display(), count, "loaded endpoint definitions");
        Ok(count)
    }

    /// Look up a definition by family and name
    pub fn lookup(&self, family: &str, name: &str) -> Result<Arc<EndpointDefinition>> {
        self.definitions
            .get(&(family.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ModuleError::definition_not_found(family, name))
    }

    pub fn contains(&self, family: &str, name: &str) -> bool {
        self.definitions
            .contains_key(&(family.to_string(), name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Sorted `family/name` keys
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .definitions
            .keys()
            .map(|(family, name)| format!("{}/{}", family, name))
            .collect();
        keys.sort();
        keys
    }

    /// Definitions registered under one family
    pub fn family(&self, family: &str) -> Vec<Arc<EndpointDefinition>> {
        let mut found: Vec<Arc<EndpointDefinition>> = self
            .definitions
            .iter()
            .filter(|((f, _), _)| f == family)
            .map(|(_, def)| def.clone())
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    /// Union of externally visible parameters across all operations
    pub fn argument_schema(&self, definition: &EndpointDefinition) -> SchemaDescriptor {
        argument_schema(definition)
    }
}

/// Union of externally visible parameters across all operations
///
/// Artificial parameters are excluded. A name declared with different types
/// widens to `any`; it is `required_somewhere` if any operation requires it.
pub fn argument_schema(definition: &EndpointDefinition) -> SchemaDescriptor {
    let mut arguments: Vec<ArgumentDescriptor> = Vec::new();

    for (_, operation) in definition.operations.iter() {
        for spec in definition.visible_parameters_of(operation) {
            match arguments.iter_mut().find(|a| a.name == spec.name) {
                Some(existing) => {
                    if existing.param_type != spec.param_type {
                        existing.param_type = ParamType::Any;
                        existing.schema = None;
                        existing.array_type = None;
                    }
                    existing.required_somewhere |= spec.required;
                    if existing.description.is_none() {
                        existing.description = spec.description.clone();
                    }
                    match (&mut existing.allowed, &spec.allowed) {
                        (Some(current), Some(more)) => {
                            for value in more {
                                if !current.contains(value) {
                                    current.push(value.clone());
                                }
                            }
                        }
                        _ => existing.allowed = None,
                    }
                }
                None => arguments.push(ArgumentDescriptor {
                    name: spec.name.clone(),
                    param_type: spec.param_type,
                    required_somewhere: spec.required,
                    allowed: spec.allowed.clone(),
                    array_type: spec.array_type,
                    schema: spec.schema.clone(),
                    description: spec.description.clone(),
                }),
            }
        }
    }

    SchemaDescriptor { arguments }
}

/// Check a definition against the schema rules
pub fn validate_definition(definition: &EndpointDefinition) -> Result<()> {
    let key = definition.key();
    let fail = |message: String| Err(ModuleError::invalid_definition(format!("{}: {}", key, message)));

    if definition.family.trim().is_empty() || definition.name.trim().is_empty() {
        return fail("family and name must not be empty".to_string());
    }

    let mut seen = HashSet::new();
    let mut operation_count = 0;
    for (verb, operation) in definition.operations.iter() {
        operation_count += 1;
        if !seen.insert(operation) {
            return fail(format!("operation {} is declared more than once", operation));
        }
        if !definition.parameters.contains_key(operation) {
            return fail(format!(
                "operation {} ({}) has no parameters entry",
                operation, verb
            ));
        }
        let Some(template) = definition.path_of(operation) else {
            return fail(format!("operation {} ({}) has no path", operation, verb));
        };
        let declared: HashSet<&str> = definition
            .parameters_of(operation)
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        for placeholder in path_parameters(template) {
            if !declared.contains(placeholder.as_str()) {
                return fail(format!(
                    "path of {} references undeclared parameter {}",
                    operation, placeholder
                ));
            }
        }
    }

    if operation_count == 0 {
        return fail("no operations declared".to_string());
    }

    for operation in definition.responses.keys() {
        if !seen.contains(operation.as_str()) {
            return fail(format!("response declared for unknown operation {}", operation));
        }
    }

    for (operation, params) in &definition.parameters {
        let mut names = HashSet::new();
        for spec in params {
            if !names.insert(spec.name.as_str()) {
                return fail(format!(
                    "parameter {} is declared twice in {}",
                    spec.name, operation
                ));
            }
            check_parameter(spec).map_err(|message| {
                ModuleError::invalid_definition(format!("{}: {}: {}", key, operation, message))
            })?;
        }
    }

    Ok(())
}

fn check_parameter(spec: &ParameterSpec) -> std::result::Result<(), String> {
    if spec.name.is_empty() {
        return Err("parameter with empty name".to_string());
    }
    if spec.allowed.is_some() && spec.param_type != ParamType::String {
        let element_is_string = spec.param_type == ParamType::Array
            && spec.array_type == Some(ParamType::String);
        if !element_is_string {
            return Err(format!("enum on non-string parameter {}", spec.name));
        }
    }
    if spec.array_type.is_some() && spec.param_type != ParamType::Array {
        return Err(format!("array_type on non-array parameter {}", spec.name));
    }
    if spec.schema.is_some() && !matches!(spec.param_type, ParamType::Object | ParamType::Array) {
        return Err(format!("schema on scalar parameter {}", spec.name));
    }
    if spec.artificial && spec.required {
        return Err(format!(
            "artificial parameter {} cannot be required from callers",
            spec.name
        ));
    }
    if let Some(children) = &spec.schema {
        for child in children {
            check_parameter(child)?;
        }
    }
    Ok(())
}
