//! Operation dispatch
//!
//! Maps a desired state onto the verbs a definition supports and, when a
//! verb has several operation variants, picks the one the caller's
//! arguments describe. Everything here runs before any network I/O.

use crate::invocation::DesiredState;
use definitions::{
    missing_required, validate_operation, Arguments, EndpointDefinition, ErrorKind, ModuleError,
    Result, Verb,
};
use std::collections::BTreeSet;
use tracing::debug;

/// Operations chosen for one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Read only
    Query { get: String },
    /// Optionally read, then delete
    Absent { get: Option<String>, delete: String },
    /// Optionally read, then create or update
    Present {
        get: Option<String>,
        post: Option<String>,
        put: Option<String>,
    },
}

fn unsupported(definition: &EndpointDefinition, state: DesiredState, verb: Verb) -> ModuleError {
    ModuleError::new(
        ErrorKind::UnsupportedState,
        format!(
            "{} does not support state {}: no {} operation",
            definition.key(),
            state,
            verb
        ),
    )
}

fn declared_names<'a>(definition: &'a EndpointDefinition, operation: &str) -> BTreeSet<&'a str> {
    definition
        .visible_parameters_of(operation)
        .map(|spec| spec.name.as_str())
        .collect()
}

/// Arguments restricted to names some operation of `verb` declares
pub fn restrict_to_verb(definition: &EndpointDefinition, verb: Verb, args: &Arguments) -> Arguments {
    let names: BTreeSet<&str> = definition
        .operations
        .for_verb(verb)
        .iter()
        .flat_map(|op| declared_names(definition, op))
        .collect();
    args.iter()
        .filter(|(name, _)| names.contains(name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Arguments usable to read the object back: those any `get` declares
pub fn lookup_arguments(definition: &EndpointDefinition, args: &Arguments) -> Arguments {
    restrict_to_verb(definition, Verb::Get, args)
}

/// Pick the operation variant of `verb` described by `args`
///
/// A lone variant is always chosen, so its own validation reports what is
/// missing. Otherwise the variants whose parameters cover every supplied
/// argument are candidates; ties go to the variants whose required
/// parameters are all supplied, then to an exact parameter-set match.
pub fn select_operation<'a>(
    definition: &'a EndpointDefinition,
    verb: Verb,
    args: &Arguments,
) -> Result<&'a str> {
    let variants = definition.operations.for_verb(verb);
    match variants {
        [] => {
            return Err(ModuleError::new(
                ErrorKind::UnsupportedState,
                format!("{} has no {} operation", definition.key(), verb),
            ))
        }
        [only] => return Ok(only.as_str()),
        _ => {}
    }

    let supplied: BTreeSet<&str> = args
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, _)| name.as_str())
        .collect();

    let candidates: Vec<&str> = variants
        .iter()
        .map(String::as_str)
        .filter(|op| declared_names(definition, op).is_superset(&supplied))
        .collect();

    let ambiguous = |names: &[&str]| {
        ModuleError::new(
            ErrorKind::MultipleOperations,
            format!(
                "arguments of {} match several {} operations: {}",
                definition.key(),
                verb,
                names.join(", ")
            ),
        )
    };

    match candidates.as_slice() {
        [] => {
            return Err(ModuleError::new(
                ErrorKind::NoMatchingOperation,
                format!(
                    "no {} operation of {} accepts arguments: {}",
                    verb,
                    definition.key(),
                    supplied.iter().copied().collect::<Vec<_>>().join(", ")
                ),
            ))
        }
        [chosen] => return Ok(*chosen),
        _ => {}
    }

    let complete: Vec<&str> = candidates
        .iter()
        .copied()
        .filter(|op| missing_required(definition, op, args).is_empty())
        .collect();
    if let [chosen] = complete.as_slice() {
        return Ok(*chosen);
    }

    let pool = if complete.is_empty() { &candidates } else { &complete };
    let exact: Vec<&str> = pool
        .iter()
        .copied()
        .filter(|op| declared_names(definition, op) == supplied)
        .collect();
    match exact.as_slice() {
        [chosen] => Ok(*chosen),
        _ => Err(ambiguous(pool.as_slice())),
    }
}

/// Decide which operations a task will use
///
/// Every requirement that can be checked without reading the controller is
/// checked here, so a task that cannot succeed fails before any request.
pub fn plan(definition: &EndpointDefinition, state: DesiredState, args: &Arguments) -> Result<Plan> {
    let plan = match state {
        DesiredState::Query => {
            if !definition.supports(Verb::Get) {
                return Err(unsupported(definition, state, Verb::Get));
            }
            let get = select_operation(definition, Verb::Get, args)?;
            validate_operation(definition, get, args)?;
            Plan::Query {
                get: get.to_string(),
            }
        }

        DesiredState::Absent => {
            if !definition.supports(Verb::Delete) {
                return Err(unsupported(definition, state, Verb::Delete));
            }
            let delete_args = restrict_to_verb(definition, Verb::Delete, args);
            let delete = select_operation(definition, Verb::Delete, &delete_args)?;

            let lookup = lookup_arguments(definition, args);
            let get = if definition.supports(Verb::Get) {
                let get = select_operation(definition, Verb::Get, &lookup)?;
                validate_operation(definition, get, &lookup)?;
                Some(get.to_string())
            } else {
                None
            };
            // Identity fields can only come from a read that has something to look up by.
            if get.is_none() || lookup.is_empty() {
                validate_operation(definition, delete, &delete_args)?;
            }
            Plan::Absent {
                get,
                delete: delete.to_string(),
            }
        }

        DesiredState::Present => {
            let post = if definition.supports(Verb::Post) {
                let post_args = restrict_to_verb(definition, Verb::Post, args);
                Some(select_operation(definition, Verb::Post, &post_args)?.to_string())
            } else {
                None
            };
            let put = if definition.supports(Verb::Put) {
                let put_args = restrict_to_verb(definition, Verb::Put, args);
                Some(select_operation(definition, Verb::Put, &put_args)?.to_string())
            } else {
                None
            };
            if post.is_none() && put.is_none() {
                return Err(unsupported(definition, state, Verb::Post));
            }

            let lookup = lookup_arguments(definition, args);
            let get = if definition.supports(Verb::Get) {
                let get = select_operation(definition, Verb::Get, &lookup)?;
                validate_operation(definition, get, &lookup)?;
                Some(get.to_string())
            } else {
                None
            };

            let can_read = get.is_some() && !lookup.is_empty();
            preflight_present(definition, args, post.as_deref(), put.as_deref(), can_read)?;
            Plan::Present { get, post, put }
        }
    };

    debug!(definition = %definition.key(), %state, ?plan, "planned operations");
    Ok(plan)
}

/// Arguments must be enough to create the object, or to update it once
/// identity fields are filled from the observed object
///
/// `can_read` is false when there is no read, or nothing to identify the
/// object by.
fn preflight_present(
    definition: &EndpointDefinition,
    args: &Arguments,
    post: Option<&str>,
    put: Option<&str>,
    can_read: bool,
) -> Result<()> {
    let post_check = post.map(|op| validate_operation(definition, op, args));
    match (post_check, put) {
        (Some(Ok(())), _) => Ok(()),
        // Missing put fields may come from the object once it is read.
        (_, Some(_)) if can_read => Ok(()),
        (Some(Err(err)), _) => Err(err),
        (None, Some(op)) => validate_operation(definition, op, args),
        (None, None) => Ok(()),
    }
}
