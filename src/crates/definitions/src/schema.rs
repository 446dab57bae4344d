//! Declarative endpoint definition schema
//!
//! A definition describes one controller endpoint family: which operation
//! names exist under each HTTP verb, the parameters each operation accepts,
//! the URL each operation targets and, optionally, the shape of its response.
//! Definitions are data; nothing here knows about any particular endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// HTTP verb an operation is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub const ALL: [Verb; 4] = [Verb::Get, Verb::Post, Verb::Put, Verb::Delete];

    /// Upper-case method name
    pub fn as_method(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }

    /// Whether the verb modifies controller state
    pub fn is_write(&self) -> bool {
        !matches!(self, Verb::Get)
    }

    /// Whether leftover parameters travel in the query string
    pub fn sends_query(&self) -> bool {
        matches!(self, Verb::Get | Verb::Delete)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verb::Get => "get",
            Verb::Post => "post",
            Verb::Put => "put",
            Verb::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Declared type of a parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    #[default]
    Any,
}

impl ParamType {
    /// Whether `value` is an instance of this type, ignoring nested schemas
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
            ParamType::Any => true,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
            ParamType::Any => "any",
        };
        f.write_str(name)
    }
}

/// Where a parameter travels in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Body,
    Header,
    /// Consumed by the core and never sent to the controller
    Local,
}

/// One parameter accepted by an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,

    #[serde(rename = "type", default)]
    pub param_type: ParamType,

    #[serde(default)]
    pub required: bool,

    /// Synthesized by the core; callers may not supply it
    #[serde(default)]
    pub artificial: bool,

    #[serde(default, alias = "elements", skip_serializing_if = "Option::is_none")]
    pub array_type: Option<ParamType>,

    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Vec<ParameterSpec>>,

    /// Overrides the default partitioning rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<ParamLocation>,

    /// Value injected for artificial parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterSpec {
    /// A plain optional parameter of the given type
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            artificial: false,
            array_type: None,
            allowed: None,
            schema: None,
            location: None,
            default: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn artificial(mut self, default: Value) -> Self {
        self.artificial = true;
        self.default = Some(default);
        self
    }

    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_schema(mut self, schema: Vec<ParameterSpec>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_array_type(mut self, element: ParamType) -> Self {
        self.array_type = Some(element);
        self
    }

    pub fn at(mut self, location: ParamLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Whether the value must go in the request body regardless of verb
    pub fn is_structured_body(&self) -> bool {
        self.name == "payload" || self.schema.is_some()
    }
}

/// Container kind of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Object,
    Array,
}

/// Shape the controller response is normalized to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSpec {
    #[serde(rename = "type")]
    pub response_type: ResponseType,

    /// Element kind when `type` is `array`; shaping only applies to objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_type: Option<ParamType>,

    /// Attribute names to keep, in output order
    #[serde(default)]
    pub properties: Vec<String>,
}

/// Operation names grouped by verb
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Operations {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub get: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub put: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delete: Vec<String>,
}

impl Operations {
    /// Operation names declared under `verb`, in declaration order
    pub fn for_verb(&self, verb: Verb) -> &[String] {
        match verb {
            Verb::Get => &self.get,
            Verb::Post => &self.post,
            Verb::Put => &self.put,
            Verb::Delete => &self.delete,
        }
    }

    /// Every (verb, operation name) pair
    pub fn iter(&self) -> impl Iterator<Item = (Verb, &str)> + '_ {
        Verb::ALL
            .into_iter()
            .flat_map(move |verb| self.for_verb(verb).iter().map(move |op| (verb, op.as_str())))
    }
}

/// Declarative description of one controller endpoint family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDefinition {
    pub family: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub operations: Operations,

    /// Parameters per operation name
    pub parameters: BTreeMap<String, Vec<ParameterSpec>>,

    /// Response shape per operation name; absent means pass-through
    #[serde(default)]
    pub responses: BTreeMap<String, ResponseSpec>,

    /// URL template per operation name
    pub paths: BTreeMap<String, String>,
}

impl EndpointDefinition {
    /// `family/name` key used in logs and errors
    pub fn key(&self) -> String {
        format!("{}/{}", self.family, self.name)
    }

    pub fn supports(&self, verb: Verb) -> bool {
        !self.operations.for_verb(verb).is_empty()
    }

    /// Parameters declared for `operation` (empty when unknown)
    pub fn parameters_of(&self, operation: &str) -> &[ParameterSpec] {
        self.parameters
            .get(operation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Parameters a caller may supply for `operation`
    pub fn visible_parameters_of<'a>(
        &'a self,
        operation: &str,
    ) -> impl Iterator<Item = &'a ParameterSpec> + 'a {
        self.parameters_of(operation).iter().filter(|p| !p.artificial)
    }

    pub fn path_of(&self, operation: &str) -> Option<&str> {
        self.paths.get(operation).map(String::as_str)
    }

    pub fn response_of(&self, operation: &str) -> Option<&ResponseSpec> {
        self.responses.get(operation)
    }

    /// Verb an operation name is bound to
    pub fn verb_of(&self, operation: &str) -> Option<Verb> {
        self.operations
            .iter()
            .find(|(_, op)| *op == operation)
            .map(|(verb, _)| verb)
    }

    /// Whether a `get` operation declares both `offset` and `limit`
    pub fn is_paginated(&self, operation: &str) -> bool {
        let params = self.parameters_of(operation);
        params.iter().any(|p| p.name == "offset") && params.iter().any(|p| p.name == "limit")
    }
}
