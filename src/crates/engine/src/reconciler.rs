//! State reconciliation
//!
//! Drives one planned task against the controller:
//!
//! ```text
//! READ --get--> CLASSIFY --absent-----------> CREATE (post) --> DONE
//!                        --exists & equal---> DONE
//!                        --exists & differ--> UPDATE (put) --> VERIFY --> DONE
//! ```
//!
//! `absent` and `query` are straight-line. Check mode runs the reads and
//! the classification but skips every write.

use crate::compare::{differing_keys, values_match};
use crate::dispatcher::{lookup_arguments, Plan};
use crate::result::OperationResult;
use crate::shaping::{shape, shape_element};
use definitions::{
    partition, validate_operation, Arguments, EndpointDefinition, ErrorKind, ModuleError,
    ParamLocation, Result,
};
use serde_json::{Map, Value};
use tooling::async_utils::timeout::Deadline;
use transport::tasks::status_record;
use transport::{ControllerClient, ControllerResponse, OperationCall, TaskKind, TaskOutcome};
use tracing::{debug, info};

/// Reconciles one task; owns the decision journal
pub struct Reconciler<'a> {
    definition: &'a EndpointDefinition,
    client: &'a ControllerClient,
    deadline: &'a Deadline,
    check_mode: bool,
    journal: Vec<String>,
}

fn is_status(error: &ModuleError, status: u16) -> bool {
    error.kind == ErrorKind::ControllerError && error.controller_status == Some(status)
}

/// `site_name_hierarchy` -> `siteNameHierarchy`
fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn observed_field<'v>(object: &'v Value, name: &str) -> Option<&'v Value> {
    object
        .get(name)
        .or_else(|| object.get(camel_case(name).as_str()))
        .filter(|value| !value.is_null())
}

/// How the object is recognised in a `get` body
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    /// Arguments sent with the read; the controller may already have
    /// filtered on them.
    Lookup(Arguments),
    /// `id` or `name` of the desired object, matched against every element
    Desired(Arguments),
}

impl Identity {
    /// Lookup arguments when any are set, otherwise keys of the desired object
    pub fn of(definition: &EndpointDefinition, args: &Arguments) -> Self {
        let lookup = lookup_arguments(definition, args);
        if lookup.values().any(|value| !value.is_null()) {
            Identity::Lookup(lookup)
        } else {
            Identity::Desired(desired_identity(args))
        }
    }

    /// Arguments to send with the read
    fn sent(&self) -> Arguments {
        match self {
            Identity::Lookup(lookup) => lookup.clone(),
            Identity::Desired(_) => Arguments::new(),
        }
    }

    fn keys(&self) -> Vec<(&String, &Value)> {
        match self {
            Identity::Lookup(lookup) => ["id", "name"]
                .iter()
                .find_map(|key| lookup.get_key_value(*key).filter(|(_, v)| !v.is_null()))
                .map(|pair| vec![pair])
                .unwrap_or_else(|| lookup.iter().filter(|(_, v)| !v.is_null()).collect()),
            Identity::Desired(desired) => desired.iter().filter(|(_, v)| !v.is_null()).collect(),
        }
    }
}

/// Fields of an object or single-element `payload`
fn payload_fields(payload: &Value) -> Option<&Map<String, Value>> {
    match payload {
        Value::Object(fields) => Some(fields),
        Value::Array(items) => match items.as_slice() {
            [Value::Object(fields)] => Some(fields),
            _ => None,
        },
        _ => None,
    }
}

/// `id`, then `name`, from the arguments or from an object or
/// single-element `payload`
pub fn desired_identity(args: &Arguments) -> Arguments {
    let payload = args.get("payload").and_then(payload_fields);

    let mut identity = Arguments::new();
    for key in ["id", "name"] {
        let value = args
            .get(key)
            .or_else(|| payload.and_then(|fields| fields.get(key)))
            .filter(|value| !value.is_null());
        if let Some(value) = value {
            identity.insert(key.to_string(), value.clone());
            break;
        }
    }
    identity
}

fn matches_all(item: &Value, keys: &[(&String, &Value)]) -> bool {
    keys.iter().all(|(key, want)| {
        observed_field(item, key)
            .map(|have| values_match(want, have))
            .unwrap_or(false)
    })
}

/// Pick the object `identity` describes out of a `get` body
pub fn identify(body: &Value, identity: &Identity) -> Option<Value> {
    let payload = match body {
        Value::Object(map) if map.contains_key("response") => &map["response"],
        other => other,
    };
    let keys = identity.keys();
    let filtered = matches!(identity, Identity::Lookup(_));

    match payload {
        Value::Object(map) if map.is_empty() => None,
        Value::Object(_) if filtered => Some(payload.clone()),
        Value::Object(_) => {
            let conflicting = keys.iter().any(|(key, want)| {
                observed_field(payload, key).map_or(false, |have| !values_match(want, have))
            });
            (!conflicting).then(|| payload.clone())
        }
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) => {
            if keys.is_empty() {
                return match items.as_slice() {
                    [only] => Some(only.clone()),
                    _ => None,
                };
            }

            if filtered {
                let carries_identity = items.iter().any(|item| {
                    keys.iter()
                        .any(|(key, _)| observed_field(item, key).is_some())
                });
                if !carries_identity {
                    // Filtered server-side.
                    return items.first().cloned();
                }
            }

            items.iter().find(|item| matches_all(item, &keys)).cloned()
        }
        _ => None,
    }
}

impl<'a> Reconciler<'a> {
    pub fn new(
        definition: &'a EndpointDefinition,
        client: &'a ControllerClient,
        deadline: &'a Deadline,
        check_mode: bool,
    ) -> Self {
        Self {
            definition,
            client,
            deadline,
            check_mode,
            journal: Vec::new(),
        }
    }

    /// Run the plan to completion
    ///
    /// Errors become failed results; the journal and any transport
    /// diagnostics are attached either way.
    pub async fn reconcile(mut self, plan: &Plan, args: &Arguments) -> OperationResult {
        let outcome = match plan {
            Plan::Query { get } => self.query(get, args).await,
            Plan::Absent { get, delete } => self.absent(get.as_deref(), delete, args).await,
            Plan::Present { get, post, put } => {
                self.present(get.as_deref(), post.as_deref(), put.as_deref(), args)
                    .await
            }
        };

        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                info!(definition = %self.definition.key(), kind = %err.kind, "task failed: {}", err.message);
                OperationResult::failure(&err)
            }
        };

        let mut diagnostics = self.journal;
        diagnostics.extend(self.client.take_diagnostics());
        result.with_diagnostics(diagnostics)
    }

    fn note(&mut self, message: String) {
        debug!(definition = %self.definition.key(), "{}", message);
        self.journal.push(message);
    }

    async fn call(&self, operation: &str, args: &Arguments) -> Result<ControllerResponse> {
        let normalized = partition(self.definition, operation, args)?;
        let call = OperationCall::new(self.definition, operation, normalized)?;
        self.client.call(&call, self.deadline).await
    }

    /// Read through `get`; a 404 reads as absent
    async fn read(&self, get: &str, identity: &Identity) -> Result<Option<Value>> {
        match self.call(get, &identity.sent()).await {
            Ok(response) => Ok(identify(&response.body, identity)),
            Err(err) if is_status(&err, 404) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Shape a write response, mapping a partial task to its result
    fn conclude(&self, operation: &str, response: ControllerResponse) -> OperationResult {
        let partial = response.task == Some(TaskOutcome::Partial);
        let applied = if partial {
            applied_subset(operation, &response.body)
        } else {
            Vec::new()
        };
        let result = shape(self.definition.response_of(operation), response.body);
        if partial {
            OperationResult::partial(result, applied)
        } else {
            OperationResult::success(true, result)
        }
    }

    async fn query(&mut self, get: &str, args: &Arguments) -> Result<OperationResult> {
        let response = self.call(get, args).await?;
        let result = shape(self.definition.response_of(get), response.body);
        Ok(OperationResult::success(false, result))
    }

    async fn absent(
        &mut self,
        get: Option<&str>,
        delete: &str,
        args: &Arguments,
    ) -> Result<OperationResult> {
        let mut delete_args = args.clone();

        if let Some(get) = get {
            let identity = Identity::of(self.definition, args);
            let Some(current) = self.read(get, &identity).await? else {
                self.note(format!("object not found by {}; nothing to delete", get));
                return Ok(OperationResult::success(false, Value::Null));
            };
            self.merge_observed(delete, &mut delete_args, &current);
        }
        validate_operation(self.definition, delete, &delete_args)?;

        if self.check_mode {
            self.note(format!("check mode: would call {}", delete));
            return Ok(OperationResult::success(true, Value::Null));
        }

        match self.call(delete, &delete_args).await {
            Ok(response) => Ok(self.conclude(delete, response)),
            Err(err) if is_status(&err, 404) => {
                self.note(format!("{} returned 404; already absent", delete));
                Ok(OperationResult::success(false, Value::Null))
            }
            Err(err) => Err(err),
        }
    }

    async fn present(
        &mut self,
        get: Option<&str>,
        post: Option<&str>,
        put: Option<&str>,
        args: &Arguments,
    ) -> Result<OperationResult> {
        let Some(get) = get else {
            return self.write_blind(post, put, args).await;
        };

        let identity = Identity::of(self.definition, args);
        let current = self.read(get, &identity).await?;

        let Some(current) = current else {
            let Some(post) = post else {
                return Err(ModuleError::new(
                    ErrorKind::UnsupportedState,
                    format!(
                        "{} object does not exist and there is no post operation",
                        self.definition.key()
                    ),
                ));
            };
            validate_operation(self.definition, post, args)?;
            if self.check_mode {
                self.note(format!("check mode: would create via {}", post));
                return Ok(OperationResult::success(true, Value::Null));
            }
            self.note(format!("object absent; creating via {}", post));
            let response = self.call(post, args).await?;
            return Ok(self.conclude(post, response));
        };

        let desired = self.desired_values(args);
        let observed = shape_element(self.definition.response_of(get), current.clone());
        if values_match(&Value::Object(desired.clone()), &current) {
            self.note("object exists and matches".to_string());
            return Ok(OperationResult::success(false, observed));
        }

        let changed = differing_keys(&desired, &current);
        let Some(put) = put else {
            return Err(ModuleError::new(
                ErrorKind::UnsupportedState,
                format!(
                    "{} object differs on {} and there is no put operation",
                    self.definition.key(),
                    changed.join(", ")
                ),
            ));
        };

        if self.check_mode {
            self.note(format!(
                "check mode: would update {} via {}",
                changed.join(", "),
                put
            ));
            return Ok(OperationResult::success(true, observed));
        }

        let mut put_args = args.clone();
        self.merge_observed(put, &mut put_args, &current);
        validate_operation(self.definition, put, &put_args)?;

        self.note(format!("object differs on {}; updating via {}", changed.join(", "), put));
        let response = self.call(put, &put_args).await?;
        let outcome = self.conclude(put, response);
        if outcome.failed || !self.client.config().verify_writes {
            return Ok(outcome);
        }

        let written: Map<String, Value> = desired
            .into_iter()
            .filter(|(name, _)| {
                self.definition
                    .visible_parameters_of(put)
                    .any(|spec| &spec.name == name)
            })
            .collect();
        self.verify(get, &identity, &written, outcome).await
    }

    /// Create or update without a read: post first, a 409 meaning it exists
    async fn write_blind(
        &mut self,
        post: Option<&str>,
        put: Option<&str>,
        args: &Arguments,
    ) -> Result<OperationResult> {
        let (operation, conflict_is_noop) = match (post, put) {
            (Some(post), _) => (post, true),
            (None, Some(put)) => (put, false),
            (None, None) => {
                return Err(ModuleError::new(
                    ErrorKind::UnsupportedState,
                    format!("{} has no write operation", self.definition.key()),
                ))
            }
        };
        validate_operation(self.definition, operation, args)?;

        if self.check_mode {
            self.note(format!("check mode: would call {}", operation));
            return Ok(OperationResult::success(true, Value::Null));
        }

        match self.call(operation, args).await {
            Ok(response) => Ok(self.conclude(operation, response)),
            Err(err) if conflict_is_noop && is_status(&err, 409) => {
                self.note(format!("{} returned 409; object already exists", operation));
                let body = err.controller_body.unwrap_or(Value::Null);
                Ok(OperationResult::success(false, body))
            }
            Err(err) => Err(err),
        }
    }

    async fn verify(
        &mut self,
        get: &str,
        identity: &Identity,
        written: &Map<String, Value>,
        outcome: OperationResult,
    ) -> Result<OperationResult> {
        let reread = self.read(get, identity).await?;
        let drift = match &reread {
            None => Some("object no longer found".to_string()),
            Some(current) => {
                let keys = differing_keys(written, current);
                (!keys.is_empty()).then(|| format!("still differs on {}", keys.join(", ")))
            }
        };

        match drift {
            None => Ok(outcome),
            Some(detail) => {
                let err = ModuleError::new(
                    ErrorKind::ReconciliationDrift,
                    format!("{} after update: {}", self.definition.key(), detail),
                );
                info!(definition = %self.definition.key(), "{}", err.message);
                Ok(OperationResult::applied_failure(&err, outcome.result))
            }
        }
    }

    /// Arguments that describe the object itself
    ///
    /// Header and local parameters never appear on the controller object;
    /// an object or single-element `payload` contributes its fields.
    fn desired_values(&self, args: &Arguments) -> Map<String, Value> {
        let mut desired = Map::new();
        for (name, value) in args {
            if value.is_null() || self.is_transient(name) {
                continue;
            }
            match (name.as_str(), payload_fields(value)) {
                ("payload", Some(fields)) => {
                    for (field, inner) in fields {
                        desired.entry(field.clone()).or_insert_with(|| inner.clone());
                    }
                }
                _ => {
                    desired.insert(name.clone(), value.clone());
                }
            }
        }
        desired
    }

    fn is_transient(&self, name: &str) -> bool {
        self.definition
            .parameters
            .values()
            .flatten()
            .filter(|spec| spec.name == name)
            .any(|spec| {
                spec.name == "headers"
                    || matches!(
                        spec.location,
                        Some(ParamLocation::Header) | Some(ParamLocation::Local)
                    )
            })
    }

    /// Fill declared parameters of `operation` from the observed object
    fn merge_observed(&self, operation: &str, args: &mut Arguments, current: &Value) {
        for spec in self.definition.visible_parameters_of(operation) {
            if args.get(&spec.name).map_or(false, |v| !v.is_null()) {
                continue;
            }
            if self.is_transient(&spec.name) {
                continue;
            }
            if let Some(value) = observed_field(current, &spec.name) {
                args.insert(spec.name.clone(), value.clone());
            }
        }
    }
}

/// What a partially applied task reports as done
fn applied_subset(operation: &str, body: &Value) -> Vec<String> {
    let mut applied = vec![format!("{} was partially applied", operation)];
    for kind in [TaskKind::Task, TaskKind::Execution] {
        let Some(record) = body.get(kind.status_key()) else {
            continue;
        };
        let record = status_record(record);
        for key in ["progress", "bapiSyncResponse", "failureReason"] {
            if let Some(text) = record.get(key).and_then(Value::as_str) {
                if !text.is_empty() {
                    applied.push(format!("{}: {}", key, text));
                }
            }
        }
    }
    applied
}
