//! Uniform task result

use definitions::{ErrorKind, ErrorRecord, ModuleError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a task reports back to its caller
///
/// `failed` implies `changed == false`, except for a partial application or
/// a write that did not stick, where both are true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub changed: bool,
    pub result: Value,
    #[serde(default)]
    pub diagnostics: Vec<String>,
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ErrorRecord>,
}

impl OperationResult {
    pub fn success(changed: bool, result: Value) -> Self {
        Self {
            changed,
            result,
            diagnostics: Vec::new(),
            failed: false,
            failure: None,
        }
    }

    /// A failure with nothing applied
    pub fn failure(error: &ModuleError) -> Self {
        Self {
            changed: false,
            result: Value::Null,
            diagnostics: Vec::new(),
            failed: true,
            failure: Some(ErrorRecord::from(error)),
        }
    }

    /// A failure after the controller applied some of the change
    pub fn applied_failure(error: &ModuleError, result: Value) -> Self {
        Self {
            changed: true,
            result,
            diagnostics: Vec::new(),
            failed: true,
            failure: Some(ErrorRecord::from(error)),
        }
    }

    /// The controller reported that only part of the change was applied
    pub fn partial(result: Value, applied: Vec<String>) -> Self {
        let error = ModuleError::new(
            ErrorKind::ControllerError,
            "controller reported a partial application",
        );
        let mut outcome = Self::applied_failure(&error, result);
        outcome.diagnostics = applied;
        outcome
    }

    pub fn with_diagnostics(mut self, mut diagnostics: Vec<String>) -> Self {
        diagnostics.append(&mut self.diagnostics);
        self.diagnostics = diagnostics;
        self
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}
