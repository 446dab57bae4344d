//! Error taxonomy shared by every netctl component
//!
//! All failures carry an [`ErrorKind`] so callers can branch on the category
//! without parsing messages. Controller-originated errors also keep the HTTP
//! status and body the controller returned.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result type for netctl operations
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Category of a [`ModuleError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No definition registered under the requested family/name
    DefinitionNotFound,
    /// Two definitions share a family/name
    DuplicateDefinition,
    /// A definition document failed schema validation
    InvalidDefinition,
    /// A required parameter is absent or null
    MissingRequired,
    /// A value does not match its declared type
    TypeMismatch,
    /// An argument is not declared by the definition
    UnknownParameter,
    /// A string is outside its permitted set
    EnumViolation,
    /// The definition has no verb for the desired state
    UnsupportedState,
    /// No operation variant accepts the supplied arguments
    NoMatchingOperation,
    /// More than one operation variant accepts the supplied arguments
    MultipleOperations,
    /// The controller rejected the credentials or a refreshed token
    AuthFailure,
    /// The task deadline or polling deadline elapsed
    Timeout,
    /// The request never produced an HTTP response
    TransportError,
    /// The controller answered with an error status or a failed task
    ControllerError,
    /// A write was applied but a re-read still shows a difference
    ReconciliationDrift,
}

impl ErrorKind {
    /// Whether this kind is raised before any network I/O happens
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ErrorKind::MissingRequired
                | ErrorKind::TypeMismatch
                | ErrorKind::UnknownParameter
                | ErrorKind::EnumViolation
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Serialized names double as display names.
        let name = match self {
            ErrorKind::DefinitionNotFound => "DefinitionNotFound",
            ErrorKind::DuplicateDefinition => "DuplicateDefinition",
            ErrorKind::InvalidDefinition => "InvalidDefinition",
            ErrorKind::MissingRequired => "MissingRequired",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::UnknownParameter => "UnknownParameter",
            ErrorKind::EnumViolation => "EnumViolation",
            ErrorKind::UnsupportedState => "UnsupportedState",
            ErrorKind::NoMatchingOperation => "NoMatchingOperation",
            ErrorKind::MultipleOperations => "MultipleOperations",
            ErrorKind::AuthFailure => "AuthFailure",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::TransportError => "TransportError",
            ErrorKind::ControllerError => "ControllerError",
            ErrorKind::ReconciliationDrift => "ReconciliationDrift",
        };
        f.write_str(name)
    }
}

/// A structured failure raised anywhere in the pipeline
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ModuleError {
    /// Error category
    pub kind: ErrorKind,
    /// Human-readable description
    pub message: String,
    /// HTTP status returned by the controller, when there was one
    pub controller_status: Option<u16>,
    /// Body returned by the controller, when there was one
    pub controller_body: Option<Value>,
}

impl ModuleError {
    /// Create an error without controller details
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            controller_status: None,
            controller_body: None,
        }
    }

    /// Create a `ControllerError` carrying the controller's response
    pub fn controller(status: u16, body: Option<Value>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ControllerError,
            message: message.into(),
            controller_status: Some(status),
            controller_body: body,
        }
    }

    /// Attach the controller's status and body to an existing error
    pub fn with_controller(mut self, status: Option<u16>, body: Option<Value>) -> Self {
        self.controller_status = status;
        self.controller_body = body;
        self
    }

    pub fn definition_not_found(family: &str, name: &str) -> Self {
        Self::new(
            ErrorKind::DefinitionNotFound,
            format!("no definition registered for {}/{}", family, name),
        )
    }

    pub fn invalid_definition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidDefinition, message)
    }

    pub fn missing_required(operation: &str, names: &[String]) -> Self {
        Self::new(
            ErrorKind::MissingRequired,
            format!(
                "missing required arguments for {}: {}",
                operation,
                names.join(", ")
            ),
        )
    }

    pub fn type_mismatch(path: &str, expected: impl std::fmt::Display, found: &Value) -> Self {
        Self::new(
            ErrorKind::TypeMismatch,
            format!(
                "argument {} must be of type {}, got {}",
                path,
                expected,
                json_type_name(found)
            ),
        )
    }

    pub fn unknown_parameter(names: &[String]) -> Self {
        Self::new(
            ErrorKind::UnknownParameter,
            format!("unsupported parameters: {}", names.join(", ")),
        )
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthFailure, message)
    }
}

/// Serializable snapshot of a [`ModuleError`] for task results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_body: Option<Value>,
}

impl From<&ModuleError> for ErrorRecord {
    fn from(err: &ModuleError) -> Self {
        Self {
            kind: err.kind,
            message: err.message.clone(),
            controller_status: err.controller_status,
            controller_body: err.controller_body.clone(),
        }
    }
}

impl From<ModuleError> for ErrorRecord {
    fn from(err: ModuleError) -> Self {
        Self {
            kind: err.kind,
            message: err.message,
            controller_status: err.controller_status,
            controller_body: err.controller_body,
        }
    }
}

/// JSON type name used in validation messages
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
