//! Authenticated controller client
//!
//! [`ControllerClient`] owns one session: the token cache, the retry policy
//! and, when `debug` is on, the redacted request/response traces of the
//! task it serves. Every network wait goes through the task's [`Deadline`].

use crate::backend::{HttpBackend, HttpRequest, HttpResponse, ReqwestBackend, RequestBody};
use crate::config::{ConfigError, ConnectionConfig};
use crate::files::{build_upload, download_result, is_upload};
use crate::session::{Session, Token};
use crate::tasks::{classify, failure_reason, find_task, fold, status_record, TaskKind, TaskOutcome, TaskRef};
use crate::urls::{build_url, resolve};
use base64::Engine as _;
use definitions::{EndpointDefinition, ModuleError, NormalizedArguments, Result, Verb};
use reqwest::Method;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tooling::async_utils::retry::{is_retryable_status, RetryPolicy};
use tooling::async_utils::timeout::Deadline;
use tooling::logging::{redact, truncate_for_log};
use tracing::{debug, info, warn};
use url::Url;

/// Header carrying the session token on every controller request
pub const AUTH_HEADER: &str = "X-Auth-Token";
/// First offset of a paginated read; the controller counts from one
pub const FIRST_OFFSET: u64 = 1;
/// Page size requested when paginating
pub const PAGE_SIZE: u64 = 500;

const DIAGNOSTIC_BODY_LIMIT: usize = 2048;

/// One operation ready to be sent
#[derive(Debug, Clone)]
pub struct OperationCall {
    pub verb: Verb,
    pub operation: String,
    pub template: String,
    pub args: NormalizedArguments,
    /// Iterate `offset`/`limit` pages and concatenate them
    pub paginate: bool,
}

impl OperationCall {
    /// Bind normalized arguments to an operation of `definition`
    ///
    /// Pagination is enabled for `get` operations declaring both `offset`
    /// and `limit` when the caller supplied neither.
    pub fn new(
        definition: &EndpointDefinition,
        operation: &str,
        args: NormalizedArguments,
    ) -> Result<Self> {
        let verb = definition.verb_of(operation).ok_or_else(|| {
            ModuleError::invalid_definition(format!(
                "{}: unknown operation {}",
                definition.key(),
                operation
            ))
        })?;
        let template = definition.path_of(operation).ok_or_else(|| {
            ModuleError::invalid_definition(format!(
                "{}: operation {} has no path",
                definition.key(),
                operation
            ))
        })?;
        let paginate = verb == Verb::Get
            && definition.is_paginated(operation)
            && !args.query.contains_key("offset")
            && !args.query.contains_key("limit");

        Ok(Self {
            verb,
            operation: operation.to_string(),
            template: template.to_string(),
            args,
            paginate,
        })
    }

    fn label(&self) -> String {
        format!("{} {}", self.verb.as_method(), self.operation)
    }
}

/// Outcome of one operation call
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerResponse {
    pub status: u16,
    pub body: Value,
    /// Terminal state of the long-running task the call started, if any
    pub task: Option<TaskOutcome>,
}

/// Client for one controller session
pub struct ControllerClient {
    config: ConnectionConfig,
    base_url: Url,
    backend: Arc<dyn HttpBackend>,
    session: Arc<Session>,
    retry: RetryPolicy,
    diagnostics: Mutex<Vec<String>>,
}

impl std::fmt::Debug for ControllerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerClient")
            .field("base_url", &self.base_url.as_str())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn method_of(verb: Verb) -> Method {
    match verb {
        Verb::Get => Method::GET,
        Verb::Post => Method::POST,
        Verb::Put => Method::PUT,
        Verb::Delete => Method::DELETE,
    }
}

impl ControllerClient {
    /// Create a client over the given backend
    pub fn new(config: ConnectionConfig, backend: Arc<dyn HttpBackend>) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let base_url = config.base_url()?;
        let retry = config.retry_policy();

        Ok(Self {
            config,
            base_url,
            backend,
            session: Arc::new(Session::new()),
            retry,
            diagnostics: Mutex::new(Vec::new()),
        })
    }

    /// Create a client over a fresh reqwest backend
    pub fn connect(config: ConnectionConfig) -> std::result::Result<Self, ConfigError> {
        let backend = ReqwestBackend::new(config.verify, &config.user_agent)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Self::new(config, Arc::new(backend))
    }

    /// Share a token cache with other clients of the same controller
    pub fn with_session(mut self, session: Arc<Session>) -> Self {
        self.session = session;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Drain the diagnostics collected so far
    pub fn take_diagnostics(&self) -> Vec<String> {
        match self.diagnostics.lock() {
            Ok(mut lines) => std::mem::take(&mut *lines),
            Err(_) => Vec::new(),
        }
    }

    fn record(&self, line: String) {
        if !self.config.debug {
            return;
        }
        if let Ok(mut lines) = self.diagnostics.lock() {
            lines.push(redact(&line));
        }
    }

    /// Execute an operation: pagination, uploads, downloads and task polling included
    pub async fn call(&self, call: &OperationCall, deadline: &Deadline) -> Result<ControllerResponse> {
        if call.paginate {
            self.paginate(call, deadline).await
        } else {
            self.call_once(call, deadline).await
        }
    }

    async fn call_once(&self, call: &OperationCall, deadline: &Deadline) -> Result<ControllerResponse> {
        let url = build_url(
            &self.base_url,
            &call.template,
            &self.config.version,
            &call.args.path,
            &call.args.query,
        )?;

        let mut request = HttpRequest::new(method_of(call.verb), url.clone())
            .with_header("Accept", "application/json");
        for (name, value) in &call.args.headers {
            request.set_header(name, value.clone());
        }

        match call.args.body.as_ref() {
            Some(body) if is_upload(Some(body)) => {
                let empty = Map::new();
                let fields = body.as_object().unwrap_or(&empty);
                request.body = RequestBody::Multipart(build_upload(fields).await?);
            }
            Some(body) => {
                request.set_header("Content-Type", "application/json");
                request.body = RequestBody::Json(body.clone());
            }
            None => {}
        }

        let response = self.send(request, deadline).await?;
        if !response.is_success() {
            return Err(controller_error(&call.label(), &response));
        }

        let wants_file = response.header("content-disposition").is_some()
            || call.args.local.contains_key("dirpath")
            || call.args.local.contains_key("save_file");
        let mut body = match response.json_body() {
            Some(json) if !wants_file => json,
            _ => download_result(&response, &url, &call.args).await?,
        };

        let mut task_outcome = None;
        if call.verb.is_write() {
            if let Some(task) = find_task(&body) {
                let (record, outcome, status) = self.poll_task(&task, deadline).await?;
                if outcome == TaskOutcome::Failure {
                    let reason = failure_reason(&record);
                    return Err(ModuleError::controller(
                        status,
                        Some(record),
                        format!("{} task {} failed: {}", call.label(), task.id, reason),
                    ));
                }
                body = fold(body, task.kind, record);
                task_outcome = Some(outcome);
            }
        }

        Ok(ControllerResponse {
            status: response.status,
            body,
            task: task_outcome,
        })
    }

    async fn paginate(&self, call: &OperationCall, deadline: &Deadline) -> Result<ControllerResponse> {
        let mut offset = FIRST_OFFSET;
        let mut items: Vec<Value> = Vec::new();
        let mut envelope: Option<Map<String, Value>> = None;
        let mut status = 200;
        let mut pages = 0;

        loop {
            let mut page_call = call.clone();
            page_call.paginate = false;
            page_call.args.query.insert("offset".to_string(), Value::from(offset));
            page_call.args.query.insert("limit".to_string(), Value::from(PAGE_SIZE));

            let page = self.call_once(&page_call, deadline).await?;
            status = page.status;
            pages += 1;

            let (page_items, wrapper) = match split_page(page.body) {
                Ok(split) => split,
                Err(body) if pages == 1 => {
                    return Ok(ControllerResponse { body, ..page });
                }
                Err(_) => break,
            };
            if envelope.is_none() {
                envelope = wrapper;
            }

            let count = page_items.len() as u64;
            items.extend(page_items);
            debug!(operation = %call.operation, offset, count, "fetched page");

            if count < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        info!(operation = %call.operation, pages, total = items.len(), "paginated read complete");
        let body = match envelope {
            Some(mut map) => {
                map.insert("response".to_string(), Value::Array(items));
                Value::Object(map)
            }
            None => Value::Array(items),
        };
        Ok(ControllerResponse {
            status,
            body,
            task: None,
        })
    }

    async fn poll_task(&self, task: &TaskRef, deadline: &Deadline) -> Result<(Value, TaskOutcome, u16)> {
        let location = match &task.status_url {
            Some(url) => url.clone(),
            None => {
                let template = match task.kind {
                    TaskKind::Task => &self.config.task_status_path,
                    TaskKind::Execution => &self.config.execution_status_path,
                };
                template.replace("{id}", &task.id)
            }
        };
        let url = resolve(&self.base_url, &location)?;

        let remaining = deadline
            .remaining()
            .ok_or_else(|| ModuleError::timeout(format!("task deadline of {:?} exceeded", deadline.budget())))?;
        let limit = Deadline::new(remaining.min(self.config.poll_deadline_duration()));
        let interval = self.config.poll_interval_duration();

        info!(task = %task.id, kind = ?task.kind, "polling long-running task");
        let mut polls = 0u32;
        loop {
            let request = HttpRequest::new(Method::GET, url.clone()).with_header("Accept", "application/json");
            let response = self.send(request, &limit).await?;
            if !response.is_success() {
                return Err(controller_error(&format!("status of task {}", task.id), &response));
            }

            polls += 1;
            let body = response.json_body().unwrap_or(Value::Null);
            let record = status_record(&body).clone();
            let outcome = classify(&record);
            debug!(task = %task.id, polls, ?outcome, "task status");

            if outcome.is_terminal() {
                return Ok((record, outcome, response.status));
            }
            if !limit.sleep(interval).await {
                return Err(ModuleError::timeout(format!(
                    "task {} did not reach a terminal status within {:?}",
                    task.id,
                    limit.budget()
                )));
            }
        }
    }

    /// Send with authentication, refreshing the token at most once
    pub async fn send(&self, request: HttpRequest, deadline: &Deadline) -> Result<HttpResponse> {
        let mut refreshed = false;
        loop {
            let token = self.token(deadline).await?;
            let mut attempt = request.clone();
            attempt.set_header(AUTH_HEADER, token.value.clone());

            let response = self.send_with_retry(attempt, deadline).await?;
            if response.status != 401 {
                return Ok(response);
            }
            if refreshed {
                return Err(ModuleError::auth(format!(
                    "{} {} rejected the refreshed token",
                    request.method, request.url
                ))
                .with_controller(Some(401), response.json_body().filter(|b| !b.is_null())));
            }

            warn!(url = %request.url, "token rejected, acquiring a new one");
            self.session.invalidate(token.generation).await;
            refreshed = true;
        }
    }

    async fn token(&self, deadline: &Deadline) -> Result<Token> {
        let mut cache = self.session.lock().await;
        if let Some(token) = cache.fresh(self.config.token_lifetime()) {
            return Ok(token);
        }
        let value = self.acquire_token(deadline).await?;
        Ok(cache.store(value))
    }

    async fn acquire_token(&self, deadline: &Deadline) -> Result<String> {
        let url = build_url(
            &self.base_url,
            &self.config.auth_path,
            &self.config.version,
            &Map::new(),
            &Map::new(),
        )?;
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.config.username, self.config.password));
        let request = HttpRequest::new(Method::POST, url)
            .with_header("Authorization", format!("Basic {}", credentials))
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json");

        debug!(user = %self.config.username, "acquiring controller token");
        let response = self.send_with_retry(request, deadline).await?;

        if matches!(response.status, 401 | 403) {
            return Err(ModuleError::auth(format!(
                "controller rejected credentials for {}",
                self.config.username
            ))
            .with_controller(Some(response.status), response.json_body().filter(|b| !b.is_null())));
        }
        if !response.is_success() {
            return Err(controller_error("token request", &response));
        }

        let field = &self.config.token_field;
        response
            .json_body()
            .and_then(|body| body.get(field).and_then(Value::as_str).map(String::from))
            .or_else(|| response.header(field).map(String::from))
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ModuleError::auth(format!("token response carried no {} field", field)))
    }

    /// Send one request, retrying connection errors and 5xx responses
    async fn send_with_retry(&self, request: HttpRequest, deadline: &Deadline) -> Result<HttpResponse> {
        let mut attempt = 0u32;
        loop {
            self.record(format!(
                "request: {} {} headers: {} body: {}",
                request.method,
                request.url,
                format_headers(&request.headers),
                describe_body(&request.body)
            ));
            debug!(method = %request.method, url = %request.url, attempt, "sending request");

            let outcome = deadline
                .run(self.backend.execute(request.clone()))
                .await
                .map_err(|elapsed| {
                    ModuleError::timeout(format!("{} {}: {}", request.method, request.url, elapsed))
                })?;

            match outcome {
                Ok(response) => {
                    self.record(format!(
                        "response: {} {} -> {} {}",
                        request.method,
                        request.url,
                        response.status,
                        truncate_for_log(&response.text(), DIAGNOSTIC_BODY_LIMIT)
                    ));
                    if !(is_retryable_status(response.status) && self.retry.should_retry(attempt)) {
                        return Ok(response);
                    }
                    warn!(url = %request.url, status = response.status, attempt, "server error, retrying");
                }
                Err(err) if err.is_retryable() && self.retry.should_retry(attempt) => {
                    warn!(url = %request.url, error = %err, attempt, "transport error, retrying");
                }
                Err(err) => {
                    return Err(ModuleError::transport(format!(
                        "{} {}: {}",
                        request.method, request.url, err
                    )));
                }
            }

            let delay = self.retry.delay_for(attempt);
            attempt += 1;
            if !deadline.sleep(delay).await {
                return Err(ModuleError::timeout(format!(
                    "task deadline of {:?} exceeded while retrying {} {}",
                    deadline.budget(),
                    request.method,
                    request.url
                )));
            }
        }
    }
}

/// Split a page into its items and the envelope around them
///
/// `Err` returns the body unchanged when it holds no list.
fn split_page(body: Value) -> std::result::Result<(Vec<Value>, Option<Map<String, Value>>), Value> {
    match body {
        Value::Array(items) => Ok((items, None)),
        Value::Object(mut map) => match map.remove("response") {
            Some(Value::Array(items)) => Ok((items, Some(map))),
            Some(other) => {
                map.insert("response".to_string(), other);
                Err(Value::Object(map))
            }
            None => Err(Value::Object(map)),
        },
        other => Err(other),
    }
}

fn format_headers(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_body(body: &RequestBody) -> String {
    match body {
        RequestBody::Empty => "-".to_string(),
        RequestBody::Json(value) => truncate_for_log(&value.to_string(), DIAGNOSTIC_BODY_LIMIT),
        RequestBody::Multipart(form) => format!(
            "multipart ({} fields, file: {})",
            form.text.len(),
            form.file.as_ref().map(|f| f.file_name.as_str()).unwrap_or("none")
        ),
    }
}

fn error_detail(body: &Value) -> Option<String> {
    let scopes = [Some(body), body.get("response")];
    for scope in scopes.into_iter().flatten() {
        for key in ["detail", "message", "errorMessage", "error", "errorCode"] {
            if let Some(text) = scope.get(key).and_then(Value::as_str) {
                return Some(text.to_string());
            }
        }
    }
    None
}

/// Translate a non-success response into a `ControllerError`
fn controller_error(label: &str, response: &HttpResponse) -> ModuleError {
    let body = response.json_body().filter(|b| !b.is_null()).or_else(|| {
        let text = response.text();
        (!text.is_empty()).then_some(Value::String(text))
    });
    let detail = body
        .as_ref()
        .and_then(error_detail)
        .unwrap_or_else(|| format!("HTTP {}", response.status));
    ModuleError::controller(
        response.status,
        body,
        format!("{} returned {}: {}", label, response.status, detail),
    )
}
