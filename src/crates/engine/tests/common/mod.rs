//! Shared fixtures for engine integration tests
//!
//! `MockController` stands in for the HTTP backend: token requests are
//! answered automatically and every other request goes to a handler
//! closure, so tests can script a controller or keep state in it.

#![allow(dead_code)]

use async_trait::async_trait;
use definitions::DefinitionRegistry;
use engine::Engine;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use transport::{BackendError, ConnectionConfig, HttpBackend, HttpRequest, HttpResponse, RequestBody};

pub const TOKEN_PATH: &str = "/dna/system/api/v1/auth/token";

type Handler = Box<dyn FnMut(&HttpRequest) -> HttpResponse + Send>;

pub struct MockController {
    handler: Mutex<Handler>,
    requests: Mutex<Vec<HttpRequest>>,
    calls: AtomicUsize,
    tokens: AtomicUsize,
}

impl MockController {
    pub fn new(handler: impl FnMut(&HttpRequest) -> HttpResponse + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Mutex::new(Box::new(handler)),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            tokens: AtomicUsize::new(0),
        })
    }

    /// Answer requests from a queue, in order
    pub fn scripted(responses: Vec<HttpResponse>) -> Arc<Self> {
        let mut queue: VecDeque<HttpResponse> = responses.into();
        Self::new(move |_| queue.pop_front().unwrap_or_else(|| HttpResponse::new(418)))
    }

    /// Every HTTP call, token requests included
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn token_requests(&self) -> usize {
        self.tokens.load(Ordering::SeqCst)
    }

    /// Controller requests, token requests excluded
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// `METHOD path` of each controller request
    pub fn summary(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| format!("{} {}", r.method, r.url.path()))
            .collect()
    }
}

#[async_trait]
impl HttpBackend for MockController {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.url.path() == TOKEN_PATH {
            let n = self.tokens.fetch_add(1, Ordering::SeqCst) + 1;
            return Ok(HttpResponse::json(200, &json!({"Token": format!("tok-{}", n)})));
        }
        self.requests.lock().unwrap().push(request.clone());
        let mut handler = self.handler.lock().unwrap();
        Ok((*handler)(&request))
    }
}

pub fn catalog() -> DefinitionRegistry {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../../definitions");
    let mut registry = DefinitionRegistry::new();
    registry.load_from_directory(&dir).unwrap();
    registry
}

pub fn engine_for(controller: &Arc<MockController>) -> Engine {
    Engine::with_backend(catalog(), controller.clone())
}

pub fn connection() -> ConnectionConfig {
    ConnectionConfig::new("dnac.example.com", "admin", "C1sco12345")
}

pub fn query_param(request: &HttpRequest, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

pub fn json_body(request: &HttpRequest) -> Option<Value> {
    match &request.body {
        RequestBody::Json(value) => Some(value.clone()),
        _ => None,
    }
}

/// Tag controller keeping its tags in memory
///
/// With `apply_updates` off, `PUT` is acknowledged but ignored.
pub fn tag_controller(apply_updates: bool) -> (Arc<MockController>, Arc<Mutex<Vec<Value>>>) {
    let tags: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let store = tags.clone();
    let mut next_id = 0;

    let controller = MockController::new(move |request| {
        let path = request.url.path().to_string();
        let mut tags = store.lock().unwrap();

        if path.starts_with("/dna/intent/api/v1/task/") {
            return HttpResponse::json(
                200,
                &json!({"response": {"isError": false, "progress": "done", "endTime": 1700000000}}),
            );
        }

        match (request.method.as_str(), path.as_str()) {
            ("GET", "/dna/intent/api/v1/tag") => {
                let name = query_param(request, "name");
                let id = query_param(request, "id");
                let found: Vec<Value> = tags
                    .iter()
                    .filter(|tag| name.as_deref().map_or(true, |n| tag["name"] == n))
                    .filter(|tag| id.as_deref().map_or(true, |i| tag["id"] == i))
                    .cloned()
                    .collect();
                HttpResponse::json(200, &json!({"response": found, "version": "1.0"}))
            }
            ("POST", "/dna/intent/api/v1/tag") => {
                next_id += 1;
                let mut tag = json_body(request).unwrap_or(json!({}));
                tag["id"] = json!(format!("tag-{}", next_id));
                tag["systemTag"] = json!(false);
                tag["instanceTenantId"] = json!("tenant-1");
                tags.push(tag);
                HttpResponse::json(
                    202,
                    &json!({"response": {"taskId": format!("t-{}", next_id)}, "version": "1.0"}),
                )
            }
            ("PUT", "/dna/intent/api/v1/tag") => {
                let update = json_body(request).unwrap_or(json!({}));
                if apply_updates {
                    if let Some(tag) = tags.iter_mut().find(|tag| tag["id"] == update["id"]) {
                        if let (Some(tag), Some(fields)) = (tag.as_object_mut(), update.as_object()) {
                            for (key, value) in fields {
                                tag.insert(key.clone(), value.clone());
                            }
                        }
                    }
                }
                HttpResponse::json(202, &json!({"response": {"taskId": "t-update"}, "version": "1.0"}))
            }
            ("DELETE", p) if p.starts_with("/dna/intent/api/v1/tag/") => {
                let id = p.trim_start_matches("/dna/intent/api/v1/tag/").to_string();
                let before = tags.len();
                tags.retain(|tag| tag["id"] != id.as_str());
                if tags.len() == before {
                    HttpResponse::json(404, &json!({"response": {"message": "tag not found"}}))
                } else {
                    HttpResponse::json(202, &json!({"response": {"taskId": "t-delete"}, "version": "1.0"}))
                }
            }
            _ => HttpResponse::json(404, &json!({"response": {"message": "no route"}})),
        }
    });

    (controller, tags)
}
