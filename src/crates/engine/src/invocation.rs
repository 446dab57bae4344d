//! Task invocation input

use definitions::Arguments;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use transport::ConnectionConfig;

/// State the caller wants the controller object to be in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    #[default]
    Present,
    Absent,
    Query,
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DesiredState::Present => "present",
            DesiredState::Absent => "absent",
            DesiredState::Query => "query",
        })
    }
}

/// One unit of work handed to [`Engine::run`](crate::Engine::run)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInvocation {
    pub family: String,
    pub name: String,

    #[serde(default)]
    pub arguments: Arguments,

    #[serde(default)]
    pub state: DesiredState,

    pub connection: ConnectionConfig,

    /// Read and classify, but skip every write
    #[serde(default)]
    pub check_mode: bool,
}

impl TaskInvocation {
    pub fn new(
        family: impl Into<String>,
        name: impl Into<String>,
        connection: ConnectionConfig,
    ) -> Self {
        Self {
            family: family.into(),
            name: name.into(),
            arguments: Arguments::new(),
            state: DesiredState::default(),
            connection,
            check_mode: false,
        }
    }

    pub fn with_state(mut self, state: DesiredState) -> Self {
        self.state = state;
        self
    }

    /// Replace all arguments with the members of a JSON object
    ///
    /// Non-object values leave the arguments empty.
    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = match arguments {
            Value::Object(map) => map,
            _ => Arguments::new(),
        };
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    pub fn with_check_mode(mut self, check_mode: bool) -> Self {
        self.check_mode = check_mode;
        self
    }

    /// `family/name` of the definition this task targets
    pub fn definition_key(&self) -> String {
        format!("{}/{}", self.family, self.name)
    }
}
