//! Controller transport for netctl
//!
//! Speaks HTTP to the network controller on behalf of one task:
//!
//! - token acquisition with basic credentials, cached per session and
//!   refreshed at most once per request on `401`
//! - retries with exponential backoff for connection errors and 5xx
//! - transparent `offset`/`limit` pagination
//! - multipart uploads and binary downloads
//! - polling of `taskId` / `executionId` long-running tasks
//!
//! All waits share the task's [`Deadline`](tooling::async_utils::timeout::Deadline).

pub mod backend;
pub mod client;
pub mod config;
pub mod files;
pub mod session;
pub mod tasks;
pub mod urls;

pub use backend::{
    BackendError, FilePart, HttpBackend, HttpRequest, HttpResponse, MultipartForm,
    ReqwestBackend, RequestBody,
};
pub use client::{ControllerClient, ControllerResponse, OperationCall, AUTH_HEADER};
pub use config::{ConfigError, ConnectionConfig, ENV_PREFIX};
pub use session::Session;
pub use tasks::{TaskKind, TaskOutcome, TaskRef};
