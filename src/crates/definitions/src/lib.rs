//! Endpoint definitions for netctl
//!
//! This crate holds everything that is pure data about controller endpoints:
//!
//! - **Schema**: [`EndpointDefinition`] and friends, deserialized from JSON or YAML
//! - **Registry**: [`DefinitionRegistry`], loaded once at startup and read-only afterwards
//! - **Validation**: combined and per-operation argument checks, plus request partitioning
//! - **Errors**: the [`ErrorKind`] taxonomy shared by every other netctl crate
//!
//! # Example
//!
//! ```rust,no_run
//! use definitions::{argument_schema, validate_arguments, DefinitionRegistry};
//! use serde_json::json;
//!
//! # fn main() -> definitions::Result<()> {
//! let mut registry = DefinitionRegistry::new();
//! registry.load_from_directory("definitions")?;
//!
//! let tag = registry.lookup("tag", "tag")?;
//! let args = json!({"name": "red"}).as_object().cloned().unwrap_or_default();
//! validate_arguments(&argument_schema(&tag), &args)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod registry;
pub mod schema;
pub mod template;
pub mod validator;

pub use error::{json_type_name, ErrorKind, ErrorRecord, ModuleError, Result};
pub use registry::{
    argument_schema, validate_definition, ArgumentDescriptor, DefinitionRegistry,
    SchemaDescriptor,
};
pub use schema::{
    EndpointDefinition, Operations, ParamLocation, ParamType, ParameterSpec, ResponseSpec,
    ResponseType, Verb,
};
pub use validator::{
    location_of, missing_required, partition, scalar_to_string, validate_arguments,
    validate_operation, Arguments, NormalizedArguments,
};
