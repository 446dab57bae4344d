//! Argument validation and request partitioning
//!
//! Validation happens in two layers. [`validate_arguments`] checks the
//! caller's arguments against the combined schema of a definition (unknown
//! names, types, enums) before any operation is chosen. Once an operation is
//! chosen, [`validate_operation`] applies that operation's own requirements
//! and [`partition`] splits the arguments into request buckets.

use crate::error::{json_type_name, ErrorKind, ModuleError, Result};
use crate::registry::SchemaDescriptor;
use crate::schema::{EndpointDefinition, ParamLocation, ParamType, ParameterSpec, Verb};
use crate::template::path_parameters;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Caller-supplied arguments keyed by parameter name
pub type Arguments = Map<String, Value>;

/// Arguments split by where they travel in the request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedArguments {
    /// Values bound into URL template placeholders
    pub path: Map<String, Value>,
    pub query: Map<String, Value>,
    /// JSON body; `None` when the operation sends no body
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
    /// Consumed by the core, never sent
    pub local: Map<String, Value>,
}

impl NormalizedArguments {
    /// Body as an object map, when it is one
    pub fn body_object(&self) -> Option<&Map<String, Value>> {
        self.body.as_ref().and_then(Value::as_object)
    }

    pub fn local_str(&self, name: &str) -> Option<&str> {
        self.local.get(name).and_then(Value::as_str)
    }

    pub fn local_flag(&self, name: &str) -> bool {
        self.local.get(name).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Type constraints shared by parameter specs and argument descriptors
struct Constraint<'a> {
    param_type: ParamType,
    array_type: Option<ParamType>,
    allowed: Option<&'a [String]>,
    schema: Option<&'a [ParameterSpec]>,
}

impl<'a> From<&'a ParameterSpec> for Constraint<'a> {
    fn from(spec: &'a ParameterSpec) -> Self {
        Self {
            param_type: spec.param_type,
            array_type: spec.array_type,
            allowed: spec.allowed.as_deref(),
            schema: spec.schema.as_deref(),
        }
    }
}

/// Check arguments against the definition-wide schema
///
/// Artificial parameters are not part of `schema`, so supplying one is an
/// `UnknownParameter` error. Null values are treated as absent.
pub fn validate_arguments(schema: &SchemaDescriptor, args: &Arguments) -> Result<()> {
    let mut unknown: Vec<String> = args
        .keys()
        .filter(|name| !schema.contains(name))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        unknown.sort();
        return Err(ModuleError::unknown_parameter(&unknown));
    }

    for descriptor in &schema.arguments {
        let Some(value) = args.get(&descriptor.name) else {
            continue;
        };
        let constraint = Constraint {
            param_type: descriptor.param_type,
            array_type: descriptor.array_type,
            allowed: descriptor.allowed.as_deref(),
            schema: descriptor.schema.as_deref(),
        };
        check_value(&descriptor.name, &constraint, value)?;
    }
    Ok(())
}

/// Names of required parameters of `operation` that are absent or null
pub fn missing_required<'a>(
    definition: &'a EndpointDefinition,
    operation: &str,
    args: &Arguments,
) -> Vec<&'a str> {
    definition
        .visible_parameters_of(operation)
        .filter(|spec| spec.required)
        .filter(|spec| args.get(&spec.name).map_or(true, Value::is_null))
        .map(|spec| spec.name.as_str())
        .collect()
}

/// Check arguments against one operation's declarations
///
/// Arguments the operation does not declare are ignored here; they were
/// accepted by the definition-wide check and are simply not sent.
pub fn validate_operation(
    definition: &EndpointDefinition,
    operation: &str,
    args: &Arguments,
) -> Result<()> {
    let missing = missing_required(definition, operation, args);
    if !missing.is_empty() {
        let names: Vec<String> = missing.into_iter().map(String::from).collect();
        return Err(ModuleError::missing_required(operation, &names));
    }

    for spec in definition.visible_parameters_of(operation) {
        if let Some(value) = args.get(&spec.name) {
            check_value(&spec.name, &Constraint::from(spec), value)?;
        }
    }

    // Unbound placeholders and unmergeable bodies surface before any request.
    partition(definition, operation, args).map(|_| ())
}

fn check_value(path: &str, constraint: &Constraint<'_>, value: &Value) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    if !constraint.param_type.accepts(value) {
        return Err(ModuleError::type_mismatch(path, constraint.param_type, value));
    }

    match value {
        Value::String(s) => check_enum(path, constraint.allowed, s),
        Value::Object(map) => match constraint.schema {
            Some(children) => check_object(path, children, map),
            None => Ok(()),
        },
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let item_path = format!("{}[{}]", path, index);
                if let Some(element) = constraint.array_type {
                    if !element.accepts(item) {
                        return Err(ModuleError::type_mismatch(&item_path, element, item));
                    }
                }
                match item {
                    Value::String(s) => check_enum(&item_path, constraint.allowed, s)?,
                    Value::Object(map) => {
                        if let Some(children) = constraint.schema {
                            check_object(&item_path, children, map)?;
                        }
                    }
                    _ => {}
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_object(path: &str, children: &[ParameterSpec], map: &Map<String, Value>) -> Result<()> {
    let missing: Vec<String> = children
        .iter()
        .filter(|child| child.required && map.get(&child.name).map_or(true, Value::is_null))
        .map(|child| format!("{}.{}", path, child.name))
        .collect();
    if !missing.is_empty() {
        return Err(ModuleError::new(
            ErrorKind::MissingRequired,
            format!("missing required fields: {}", missing.join(", ")),
        ));
    }

    for child in children {
        if let Some(value) = map.get(&child.name) {
            let child_path = format!("{}.{}", path, child.name);
            check_value(&child_path, &Constraint::from(child), value)?;
        }
    }
    Ok(())
}

fn check_enum(path: &str, allowed: Option<&[String]>, value: &str) -> Result<()> {
    match allowed {
        Some(allowed) if !allowed.iter().any(|a| a == value) => Err(ModuleError::new(
            ErrorKind::EnumViolation,
            format!(
                "value of {} must be one of: {}, got: {}",
                path,
                allowed.join(", "),
                value
            ),
        )),
        _ => Ok(()),
    }
}

/// Where a declared parameter travels for `verb`
pub fn location_of(spec: &ParameterSpec, verb: Verb, placeholders: &[String]) -> ParamLocation {
    if let Some(location) = spec.location {
        return location;
    }
    if spec.is_structured_body() {
        ParamLocation::Body
    } else if placeholders.iter().any(|p| *p == spec.name) {
        ParamLocation::Path
    } else if spec.name == "headers" {
        ParamLocation::Header
    } else if verb.sends_query() {
        ParamLocation::Query
    } else {
        ParamLocation::Body
    }
}

/// Split arguments into request buckets for `operation`
///
/// Only parameters declared by the operation are kept. Artificial
/// parameters are injected with their declared default. A `payload`
/// parameter becomes the body itself; other body fields merge into an
/// object payload and are rejected next to any other payload.
pub fn partition(
    definition: &EndpointDefinition,
    operation: &str,
    args: &Arguments,
) -> Result<NormalizedArguments> {
    let verb = definition.verb_of(operation).ok_or_else(|| {
        ModuleError::invalid_definition(format!(
            "{}: unknown operation {}",
            definition.key(),
            operation
        ))
    })?;
    let placeholders = definition
        .path_of(operation)
        .map(path_parameters)
        .unwrap_or_default();

    let mut normalized = NormalizedArguments::default();
    let mut payload: Option<Value> = None;
    let mut fields = Map::new();

    for spec in definition.parameters_of(operation) {
        let value = if spec.artificial {
            match &spec.default {
                Some(default) => default.clone(),
                None => continue,
            }
        } else {
            match args.get(&spec.name) {
                Some(value) if !value.is_null() => value.clone(),
                _ => continue,
            }
        };

        match location_of(spec, verb, &placeholders) {
            ParamLocation::Path => {
                normalized.path.insert(spec.name.clone(), value);
            }
            ParamLocation::Query => {
                normalized.query.insert(spec.name.clone(), value);
            }
            ParamLocation::Local => {
                normalized.local.insert(spec.name.clone(), value);
            }
            ParamLocation::Header => match value {
                Value::Object(map) => {
                    for (name, header) in map {
                        normalized.headers.insert(name, scalar_to_string(&header));
                    }
                }
                other => {
                    normalized
                        .headers
                        .insert(spec.name.clone(), scalar_to_string(&other));
                }
            },
            ParamLocation::Body if spec.name == "payload" => payload = Some(value),
            ParamLocation::Body => {
                fields.insert(spec.name.clone(), value);
            }
        }
    }

    let unbound: Vec<String> = placeholders
        .into_iter()
        .filter(|p| !normalized.path.contains_key(p))
        .collect();
    if !unbound.is_empty() {
        return Err(ModuleError::missing_required(operation, &unbound));
    }

    normalized.body = match payload {
        Some(Value::Object(mut map)) => {
            for (name, value) in fields {
                map.entry(name).or_insert(value);
            }
            Some(Value::Object(map))
        }
        Some(other) if fields.is_empty() => Some(other),
        Some(other) => {
            let names: Vec<String> = fields.into_iter().map(|(name, _)| name).collect();
            return Err(ModuleError::new(
                ErrorKind::TypeMismatch,
                format!(
                    "payload of {} is {}, so body fields {} cannot be merged into it",
                    operation,
                    json_type_name(&other),
                    names.join(", ")
                ),
            ));
        }
        None if fields.is_empty() => None,
        None => Some(Value::Object(fields)),
    };

    Ok(normalized)
}

/// Render a JSON value as a header, query or path string
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
