use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use progress_engine::build_app;
use progress_engine::config::AppConfig;
use progress_engine::model::Component;
use progress_engine::seed::load_seed_data;
use progress_engine::store::traits::ComponentStore;
use progress_engine::store::MemoryStore;

async fn test_app() -> (Router, MemoryStore) {
    let store = MemoryStore::new();
    load_seed_data(&store).await.expect("seed data");
    let app = build_app(Arc::new(store.clone()), &AppConfig::default());
    (app, store)
}

async fn send(app: &Router, method: Method, path: &str, body: Option<Value>, roles: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(roles) = roles {
        builder = builder.header("x-user-id", "carol").header("x-user-roles", roles);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_health_and_defaults() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, Method::GET, "/milestone-definitions", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["total"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_template_edit_flow() {
    let (app, store) = test_app().await;
    store
        .upsert_component(Component::new("v-1", "p1", "valve").with_milestone("Receive", 100.0))
        .await
        .unwrap();

    let (status, _) = send(&app, Method::POST, "/projects/p1/clone-templates", None, Some("foreman")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::POST, "/projects/p1/clone-templates", None, Some("admin")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["created"].as_u64().unwrap() > 0);

    let (status, _) = send(&app, Method::POST, "/projects/p1/clone-templates", None, Some("admin")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, template) = send(&app, Method::GET, "/projects/p1/templates/valve", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(template["source"], "project");
    let observed = template["last_updated"].clone();

    let weights = json!([
        {"milestone_name": "Receive", "weight": 50},
        {"milestone_name": "Install", "weight": 30},
        {"milestone_name": "Punch", "weight": 10},
        {"milestone_name": "Test", "weight": 5},
        {"milestone_name": "Restore", "weight": 4}
    ]);
    let (status, body) = send(
        &app,
        Method::PUT,
        "/projects/p1/templates/valve",
        Some(json!({"weights": weights, "apply_to_existing": true, "expected_last_updated": observed})),
        Some("project_manager"),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "weight_sum_invalid");
    assert!(body["error"].as_str().unwrap().contains("99"));

    let weights = json!([
        {"milestone_name": "Receive", "weight": 50},
        {"milestone_name": "Install", "weight": 30},
        {"milestone_name": "Punch", "weight": 10},
        {"milestone_name": "Test", "weight": 5},
        {"milestone_name": "Restore", "weight": 5}
    ]);
    let (status, body) = send(
        &app,
        Method::PUT,
        "/projects/p1/templates/valve",
        Some(json!({"weights": weights, "apply_to_existing": true, "expected_last_updated": observed})),
        Some("project_manager"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["affected_count"], 1);
    let audit_id = body["audit_id"].clone();

    let (status, component) = send(&app, Method::GET, "/components/v-1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(component["percent_complete"], 50.0);

    // Same stale timestamp again
    let (status, body) = send(
        &app,
        Method::PUT,
        "/projects/p1/templates/valve",
        Some(json!({"weights": weights, "apply_to_existing": false, "expected_last_updated": observed})),
        Some("project_manager"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "concurrent_modification");

    let (status, changes) = send(&app, Method::GET, "/projects/p1/templates/valve/changes?limit=5", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(changes["total"], 1);
    assert_eq!(changes["items"][0]["id"], audit_id);
    assert_eq!(changes["items"][0]["changed_by"], "carol");

    let (status, summaries) = send(&app, Method::GET, "/projects/p1/templates", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(summaries["items"]
        .as_array()
        .unwrap()
        .iter()
        .all(|s| s["total_weight"] == 100));
}

#[tokio::test]
async fn test_unknown_component_type_is_not_found() {
    let (app, _) = test_app().await;
    let (status, body) = send(&app, Method::GET, "/projects/p1/templates/gizmo", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_record_milestone_and_recalculate() {
    let (app, store) = test_app().await;
    store
        .upsert_component(Component::new("w-1", "p1", "field_weld"))
        .await
        .unwrap();

    let (status, component) = send(
        &app,
        Method::PUT,
        "/components/w-1/milestones/Fit-up",
        Some(json!({"value": true})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(component["percent_complete"], 10.0);
    assert_eq!(component["current_milestones"]["Fit-up"], 100.0);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/components/w-1/milestones/Weld%20Made",
        Some(json!({"value": 40})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "invalid_milestone_value");

    let (status, _) = send(
        &app,
        Method::PUT,
        "/components/missing/milestones/Fit-up",
        Some(json!({"value": 100})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::POST, "/projects/p1/templates/field_weld/recalculate", None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::POST, "/projects/p1/templates/field_weld/recalculate", None, Some("owner")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["affected_count"], 0);
}

#[tokio::test]
async fn test_system_identity_cannot_be_claimed_over_http() {
    let (app, _) = test_app().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/projects/p1/clone-templates")
        .header("x-user-id", "system")
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let (status, summaries) = send(&app, Method::GET, "/projects/p1/templates", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(summaries["items"]
        .as_array()
        .unwrap()
        .iter()
        .all(|s| s["source"] == "system_default"));
}
