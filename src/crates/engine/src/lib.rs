//! Reconciliation engine for netctl
//!
//! One generic executor runs every endpoint: the [`Engine`] looks the
//! definition up, validates the arguments, plans the verbs, then reconciles
//! the controller towards the desired state.
//!
//! ```text
//! TaskInvocation -> lookup -> validate -> plan -> read/classify/write -> OperationResult
//! ```
//!
//! Everything up to and including the plan happens before the first
//! request, so a malformed invocation never reaches the controller.
//!
//! # Example
//!
//! ```rust,no_run
//! use engine::{DesiredState, Engine, TaskInvocation};
//! use definitions::DefinitionRegistry;
//! use transport::ConnectionConfig;
//!
//! # async fn demo() -> definitions::Result<()> {
//! let mut registry = DefinitionRegistry::new();
//! registry.load_from_directory("definitions")?;
//! let engine = Engine::new(registry);
//!
//! let connection = ConnectionConfig::new("dnac.example.com", "admin", "secret");
//! let invocation = TaskInvocation::new("tag", "tag", connection)
//!     .with_state(DesiredState::Present)
//!     .with_argument("name", "red")
//!     .with_argument("description", "hot");
//!
//! let outcome = engine.run(invocation).await;
//! println!("changed={} failed={}", outcome.changed, outcome.failed);
//! # Ok(())
//! # }
//! ```

pub mod compare;
pub mod dispatcher;
pub mod invocation;
pub mod reconciler;
pub mod result;
pub mod shaping;

pub use dispatcher::{lookup_arguments, plan, select_operation, Plan};
pub use invocation::{DesiredState, TaskInvocation};
pub use reconciler::Reconciler;
pub use result::OperationResult;

use definitions::{validate_arguments, Arguments, DefinitionRegistry, ModuleError};
use std::sync::Arc;
use std::time::Instant;
use tooling::async_utils::timeout::Deadline;
use tooling::logging::format_duration;
use tracing::{debug, info};
use transport::{ConnectionConfig, ControllerClient, HttpBackend};

/// Runs task invocations against a fixed definition catalog
#[derive(Clone)]
pub struct Engine {
    registry: Arc<DefinitionRegistry>,
    backend: Option<Arc<dyn HttpBackend>>,
}

impl Engine {
    /// Engine talking to controllers over reqwest
    pub fn new(registry: DefinitionRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            backend: None,
        }
    }

    /// Engine sending every request through `backend`
    pub fn with_backend(registry: DefinitionRegistry, backend: Arc<dyn HttpBackend>) -> Self {
        Self {
            registry: Arc::new(registry),
            backend: Some(backend),
        }
    }

    pub fn registry(&self) -> &DefinitionRegistry {
        &self.registry
    }

    /// Run one task to completion
    ///
    /// Never returns an error: every failure is reported through
    /// [`OperationResult::failed`] and [`OperationResult::failure`].
    pub async fn run(&self, invocation: TaskInvocation) -> OperationResult {
        let started = Instant::now();
        let key = invocation.definition_key();
        info!(definition = %key, state = %invocation.state, check_mode = invocation.check_mode, "running task");

        let outcome = match self.execute(invocation).await {
            Ok(outcome) => outcome,
            Err(err) => {
                info!(definition = %key, kind = %err.kind, "task rejected: {}", err.message);
                OperationResult::failure(&err)
            }
        };

        debug!(
            definition = %key,
            changed = outcome.changed,
            failed = outcome.failed,
            elapsed = %format_duration(started.elapsed()),
            "task finished"
        );
        outcome
    }

    /// Read-only lookup, routed exactly like `state=query`
    pub async fn info(
        &self,
        family: &str,
        name: &str,
        arguments: Arguments,
        connection: ConnectionConfig,
    ) -> OperationResult {
        let mut invocation =
            TaskInvocation::new(family, name, connection).with_state(DesiredState::Query);
        invocation.arguments = arguments;
        self.run(invocation).await
    }

    async fn execute(&self, invocation: TaskInvocation) -> definitions::Result<OperationResult> {
        let definition = self
            .registry
            .lookup(&invocation.family, &invocation.name)?;

        let schema = self.registry.argument_schema(&definition);
        validate_arguments(&schema, &invocation.arguments)?;
        let planned = plan(&definition, invocation.state, &invocation.arguments)?;

        let client = self.client(invocation.connection)?;
        let deadline = Deadline::new(client.config().task_timeout());

        let reconciler = Reconciler::new(&definition, &client, &deadline, invocation.check_mode);
        Ok(reconciler.reconcile(&planned, &invocation.arguments).await)
    }

    fn client(&self, connection: ConnectionConfig) -> Result<ControllerClient, ModuleError> {
        let client = match &self.backend {
            Some(backend) => ControllerClient::new(connection, Arc::clone(backend))?,
            None => ControllerClient::connect(connection)?,
        };
        Ok(client)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("definitions", &self.registry.len())
            .field("custom_backend", &self.backend.is_some())
            .finish()
    }
}
