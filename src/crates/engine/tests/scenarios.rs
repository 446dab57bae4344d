//! End-to-end scenarios against mock controllers
//!
//! Covers:
//! - Creating a tag, then re-running the same task
//! - Deleting a fabric site through an execution-status task, then re-running
//! - Paginated query of application sets
//! - Validation failures that must not reach the controller
//! - Token refresh on 401 and AuthFailure on a second 401

mod common;

use common::{connection, engine_for, query_param, tag_controller, MockController};
use definitions::ErrorKind;
use engine::{DesiredState, TaskInvocation};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use transport::HttpResponse;

// ============================================================================
// S1: create tag
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_create_tag_then_noop() {
    let (controller, tags) = tag_controller(true);
    let engine = engine_for(&controller);
    let invocation = || {
        TaskInvocation::new("tag", "tag", connection())
            .with_state(DesiredState::Present)
            .with_arguments(json!({"name": "red", "description": "hot"}))
    };

    let first = engine.run(invocation()).await;
    assert!(!first.failed, "{:?}", first.failure);
    assert!(first.changed);
    assert_eq!(
        controller.summary(),
        vec![
            "GET /dna/intent/api/v1/tag",
            "POST /dna/intent/api/v1/tag",
            "GET /dna/intent/api/v1/task/t-1",
        ]
    );
    let post = &controller.requests()[1];
    assert_eq!(
        common::json_body(post),
        Some(json!({"name": "red", "description": "hot"}))
    );
    assert_eq!(tags.lock().unwrap().len(), 1);

    let second = engine.run(invocation()).await;
    assert!(!second.failed);
    assert!(!second.changed);
    assert_eq!(controller.requests().len(), 4);
    assert_eq!(
        second.result,
        json!({
            "id": "tag-1",
            "name": "red",
            "description": "hot",
            "systemTag": false,
            "dynamicRules": null
        })
    );
}

// ============================================================================
// S2: delete site
// ============================================================================

fn fabric_site_controller() -> Arc<MockController> {
    let exists = AtomicBool::new(true);
    let polls = AtomicUsize::new(0);

    MockController::new(move |request| {
        let path = request.url.path();
        match (request.method.as_str(), path) {
            ("GET", "/dna/intent/api/v1/business/sda/fabric-site") => {
                if exists.load(Ordering::SeqCst) {
                    HttpResponse::json(
                        200,
                        &json!({"response": [{
                            "id": "s-1",
                            "siteNameHierarchy": "Global/NY",
                            "fabricName": "Default LAN Fabric"
                        }]}),
                    )
                } else {
                    HttpResponse::json(404, &json!({"response": {"errorCode": "NOT_FOUND"}}))
                }
            }
            ("DELETE", "/dna/intent/api/v1/business/sda/fabric-site") => {
                exists.store(false, Ordering::SeqCst);
                HttpResponse::json(
                    202,
                    &json!({
                        "executionId": "e-7",
                        "executionStatusUrl": "/dna/platform/management/business-api/v1/execution-status/e-7"
                    }),
                )
            }
            ("GET", "/dna/platform/management/business-api/v1/execution-status/e-7") => {
                let status = if polls.fetch_add(1, Ordering::SeqCst) == 0 {
                    "IN_PROGRESS"
                } else {
                    "SUCCESS"
                };
                HttpResponse::json(200, &json!({"status": status, "bapiName": "Delete Site"}))
            }
            _ => HttpResponse::json(404, &json!({"response": {"errorCode": "NO_ROUTE"}})),
        }
    })
}

#[tokio::test(start_paused = true)]
async fn test_delete_site_then_noop() {
    let controller = fabric_site_controller();
    let engine = engine_for(&controller);
    let invocation = || {
        TaskInvocation::new("sda", "sda_fabric_site", connection())
            .with_state(DesiredState::Absent)
            .with_argument("site_name_hierarchy", "Global/NY")
    };

    let first = engine.run(invocation()).await;
    assert!(!first.failed, "{:?}", first.failure);
    assert!(first.changed);
    assert_eq!(
        controller.summary(),
        vec![
            "GET /dna/intent/api/v1/business/sda/fabric-site",
            "DELETE /dna/intent/api/v1/business/sda/fabric-site",
            "GET /dna/platform/management/business-api/v1/execution-status/e-7",
            "GET /dna/platform/management/business-api/v1/execution-status/e-7",
        ]
    );
    let delete = &controller.requests()[1];
    assert_eq!(
        query_param(delete, "site_name_hierarchy").as_deref(),
        Some("Global/NY")
    );
    assert_eq!(first.result["executionStatus"]["status"], "SUCCESS");

    let second = engine.run(invocation()).await;
    assert!(!second.failed);
    assert!(!second.changed);
    assert_eq!(controller.requests().len(), 5);
}

// ============================================================================
// S3: query with pagination
// ============================================================================

/// Application-set controller holding `count` records
fn application_sets(count: usize) -> Arc<MockController> {
    let records: Vec<Value> = (0..count)
        .map(|i| json!({"id": format!("as-{}", i), "name": format!("set-{}", i)}))
        .collect();

    MockController::new(move |request| {
        let offset: usize = query_param(request, "offset")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let limit: usize = query_param(request, "limit")
            .and_then(|v| v.parse().ok())
            .unwrap_or(records.len());
        let start = (offset - 1).min(records.len());
        let end = (start + limit).min(records.len());
        HttpResponse::json(
            200,
            &json!({"response": records[start..end].to_vec(), "version": "1.0"}),
        )
    })
}

#[tokio::test]
async fn test_query_paginates_application_sets() {
    let controller = application_sets(630);
    let engine = engine_for(&controller);

    let outcome = engine
        .run(
            TaskInvocation::new("application_policy", "application_sets", connection())
                .with_state(DesiredState::Query),
        )
        .await;

    assert!(!outcome.failed, "{:?}", outcome.failure);
    assert!(!outcome.changed);

    let requests = controller.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(query_param(&requests[0], "offset").as_deref(), Some("1"));
    assert_eq!(query_param(&requests[0], "limit").as_deref(), Some("500"));
    assert_eq!(query_param(&requests[1], "offset").as_deref(), Some("501"));
    assert_eq!(query_param(&requests[1], "limit").as_deref(), Some("500"));

    let items = outcome.result["response"].as_array().unwrap();
    assert_eq!(items.len(), 630);
    assert_eq!(items[0]["name"], "set-0");
    assert_eq!(items[629]["name"], "set-629");
    assert_eq!(outcome.result["version"], "1.0");
}

// ============================================================================
// S4 / S5: validation failures
// ============================================================================

#[tokio::test]
async fn test_missing_site_is_rejected_before_io() {
    let controller = MockController::scripted(vec![]);
    let outcome = engine_for(&controller)
        .run(
            TaskInvocation::new("sda", "sda_fabric_site", connection())
                .with_state(DesiredState::Absent),
        )
        .await;

    assert!(outcome.failed);
    assert!(!outcome.changed);
    assert_eq!(outcome.failure_kind(), Some(ErrorKind::MissingRequired));
    assert!(outcome
        .failure
        .as_ref()
        .unwrap()
        .message
        .contains("site_name_hierarchy"));
    assert_eq!(controller.calls(), 0);
}

#[tokio::test]
async fn test_claim_type_outside_enum() {
    let controller = MockController::scripted(vec![]);
    let outcome = engine_for(&controller)
        .run(
            TaskInvocation::new("device_onboarding_pnp", "pnp_device_site_claim", connection())
                .with_arguments(json!({"deviceId": "d-1", "siteId": "s-1", "type": "Router"})),
        )
        .await;

    assert!(outcome.failed);
    assert_eq!(outcome.failure_kind(), Some(ErrorKind::EnumViolation));
    assert!(outcome.failure.as_ref().unwrap().message.contains("Router"));
    assert_eq!(controller.calls(), 0);
}

// ============================================================================
// S6: token refresh
// ============================================================================

fn tag_query() -> TaskInvocation {
    TaskInvocation::new("tag", "tag", connection())
        .with_state(DesiredState::Query)
        .with_argument("name", "red")
}

#[tokio::test]
async fn test_token_refreshed_once_after_401() {
    let controller = MockController::scripted(vec![
        HttpResponse::new(401),
        HttpResponse::json(200, &json!({"response": [{"id": "tag-1", "name": "red"}]})),
    ]);
    let outcome = engine_for(&controller).run(tag_query()).await;

    assert!(!outcome.failed, "{:?}", outcome.failure);
    assert_eq!(controller.token_requests(), 2);
    assert_eq!(controller.requests().len(), 2);
    assert_eq!(
        controller.requests()[1].header("X-Auth-Token"),
        Some("tok-2")
    );
    assert_eq!(outcome.result[0]["id"], "tag-1");
}

#[tokio::test]
async fn test_second_401_is_auth_failure() {
    let controller = MockController::scripted(vec![HttpResponse::new(401), HttpResponse::new(401)]);
    let outcome = engine_for(&controller).run(tag_query()).await;

    assert!(outcome.failed);
    assert!(!outcome.changed);
    assert_eq!(outcome.failure_kind(), Some(ErrorKind::AuthFailure));
    assert_eq!(controller.token_requests(), 2);
    assert_eq!(controller.requests().len(), 2);
}
