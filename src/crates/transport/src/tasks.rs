//! Long-running task detection and status classification
//!
//! Write operations may answer with a handle instead of a final result:
//! either a `taskId` (task API) or an `executionId` (business API). The
//! handle can sit at the top of the body or inside its `response` member.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const SUCCESS: &[&str] = &["SUCCESS", "COMPLETED", "COMPLETE"];
const FAILURE: &[&str] = &["FAILURE", "FAILED", "ERROR"];
const PARTIAL: &[&str] = &["PARTIAL_SUCCESS", "PARTIAL"];

/// Which status API a handle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Task,
    Execution,
}

impl TaskKind {
    /// Key the final status is folded under
    pub fn status_key(&self) -> &'static str {
        match self {
            TaskKind::Task => "taskStatus",
            TaskKind::Execution => "executionStatus",
        }
    }
}

/// A long-running task handle found in a response
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRef {
    pub kind: TaskKind,
    pub id: String,
    /// Status location supplied by the controller, if any
    pub status_url: Option<String>,
}

/// Terminal or pending state of a polled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutcome {
    Pending,
    Success,
    Failure,
    Partial,
}

impl TaskOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskOutcome::Pending)
    }
}

fn id_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn url_of(object: &serde_json::Map<String, Value>) -> Option<String> {
    ["executionStatusUrl", "url"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(String::from)
}

/// Locate a task handle in a write response
///
/// `taskId` wins over `executionId`, and the top level wins over `response`.
pub fn find_task(body: &Value) -> Option<TaskRef> {
    let mut scopes = Vec::new();
    if let Some(top) = body.as_object() {
        scopes.push(top);
        if let Some(inner) = top.get("response").and_then(Value::as_object) {
            scopes.push(inner);
        }
    }

    for (key, kind) in [("taskId", TaskKind::Task), ("executionId", TaskKind::Execution)] {
        for scope in &scopes {
            if let Some(id) = id_of(scope.get(key)) {
                return Some(TaskRef {
                    kind,
                    id,
                    status_url: url_of(scope),
                });
            }
        }
    }
    None
}

/// The status record inside a poll response
pub fn status_record(body: &Value) -> &Value {
    match body.get("response") {
        Some(inner) if inner.is_object() => inner,
        _ => body,
    }
}

/// Classify one status record
pub fn classify(record: &Value) -> TaskOutcome {
    if let Some(status) = record.get("status").and_then(Value::as_str) {
        let status = status.to_ascii_uppercase();
        if SUCCESS.contains(&status.as_str()) {
            return TaskOutcome::Success;
        }
        if FAILURE.contains(&status.as_str()) {
            return TaskOutcome::Failure;
        }
        if PARTIAL.contains(&status.as_str()) {
            return TaskOutcome::Partial;
        }
    }

    if record.get("isError").and_then(Value::as_bool) == Some(true) {
        return TaskOutcome::Failure;
    }
    match record.get("endTime") {
        Some(end) if !end.is_null() => TaskOutcome::Success,
        _ => TaskOutcome::Pending,
    }
}

/// Human-readable reason for a failed record
pub fn failure_reason(record: &Value) -> String {
    for key in ["failureReason", "bapiError", "errorMessage", "progress", "status"] {
        if let Some(reason) = record.get(key).and_then(Value::as_str) {
            if !reason.is_empty() {
                return reason.to_string();
            }
        }
    }
    "no reason given".to_string()
}

/// Attach the final status record to the original write response
pub fn fold(body: Value, kind: TaskKind, record: Value) -> Value {
    match body {
        Value::Object(mut map) => {
            map.insert(kind.status_key().to_string(), record);
            Value::Object(map)
        }
        other => {
            let mut map = serde_json::Map::new();
            map.insert("response".to_string(), other);
            map.insert(kind.status_key().to_string(), record);
            Value::Object(map)
        }
    }
}
