use std::sync::Arc;

use api_lib::adapters::MemoryKeyValueStore;
use api_lib::config::Config;
use api_lib::web::{build_router, state::AppState};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

/// A router over in-memory storage, plus the state behind it for direct inspection.
pub async fn build_test_app() -> (Router, Arc<AppState>) {
    let config = Config::from_lookup(|key| match key {
        "STORAGE_BACKEND" => Some("memory".to_string()),
        "CONSISTENCY_CHECK_INTERVAL_SECS" => Some("0".to_string()),
        _ => None,
    })
    .expect("test config");
    let state = Arc::new(
        AppState::assemble(Arc::new(config), Arc::new(MemoryKeyValueStore::new()))
            .await
            .expect("app state"),
    );
    (build_router(state.clone()), state)
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}

pub async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

/// Creates a subject and returns its id.
pub async fn create_subject(app: &Router, name: &str) -> String {
    let (status, json) = post(
        app,
        "/subjects",
        serde_json::json!({ "name": name, "target_time": 7200 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["id"].as_str().unwrap().to_string()
}

/// Creates a timer with the given work duration (seconds) and returns its id.
pub async fn create_timer(app: &Router, title: &str, work_duration: u32) -> String {
    let (status, json) = post(
        app,
        "/timers",
        serde_json::json!({
            "title": title,
            "config": {
                "work_duration": work_duration,
                "short_break_duration": 300,
                "long_break_duration": 900,
                "long_break_interval": 4
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["id"].as_str().unwrap().to_string()
}
