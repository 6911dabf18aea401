mod common;

use axum::http::{Method, StatusCode};
use common::{build_test_app, create_subject, create_timer, get, post, send};
use onyx_core::ports::TimerStore;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn linking_sets_both_sides() {
    let (app, _) = build_test_app().await;
    let subject_id = create_subject(&app, "Physics").await;
    let timer_id = create_timer(&app, "Deep work", 1500).await;

    let (status, subject) = send(
        &app,
        Method::PUT,
        &format!("/subjects/{subject_id}/timer"),
        Some(json!({ "timer_id": timer_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{subject}");
    assert_eq!(subject["linked_timer_id"], timer_id.as_str());
    assert_eq!(subject["default_timer_mode"], "simple");

    let (status, timer) = get(&app, &format!("/timers/{timer_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(timer["linked_subject"]["id"], subject_id.as_str());
    assert_eq!(timer["linked_subject"]["name"], "Physics");

    let (_, linked) = get(&app, &format!("/subjects/{subject_id}/timer")).await;
    assert_eq!(linked["id"], timer_id.as_str());
}

#[tokio::test]
async fn relinking_a_timer_converts_the_previous_subject() {
    let (app, _) = build_test_app().await;
    let first = create_subject(&app, "Chemistry").await;
    let second = create_subject(&app, "Biology").await;
    let timer_id = create_timer(&app, "Focus", 1500).await;

    for subject_id in [&first, &second] {
        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/subjects/{subject_id}/timer"),
            Some(json!({ "timer_id": timer_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, previous) = get(&app, &format!("/subjects/{first}")).await;
    assert!(previous["linked_timer_id"].is_null());
    assert_eq!(previous["default_timer_mode"], "quick_timer");
    assert_eq!(previous["quick_timer_config"]["kind"], "simple");
    assert_eq!(previous["quick_timer_config"]["work_duration"], 25);
    assert!(previous["timer_conversion_note"]
        .as_str()
        .unwrap()
        .contains("Focus"));

    let (_, timer) = get(&app, &format!("/timers/{timer_id}")).await;
    assert_eq!(timer["linked_subject"]["id"], second.as_str());

    let (_, status) = get(&app, "/linkage/status").await;
    assert_eq!(status["linked"].as_array().unwrap().len(), 1);
    assert_eq!(status["unlinked_subjects"], json!([first]));
}

#[tokio::test]
async fn deleting_a_linked_timer_converts_its_subject() {
    let (app, _) = build_test_app().await;
    let subject_id = create_subject(&app, "History").await;
    let timer_id = create_timer(&app, "Reading", 2700).await;
    send(
        &app,
        Method::PUT,
        &format!("/subjects/{subject_id}/timer"),
        Some(json!({ "timer_id": timer_id })),
    )
    .await;

    let (status, _) = send(&app, Method::DELETE, &format!("/timers/{timer_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, subject) = get(&app, &format!("/subjects/{subject_id}")).await;
    assert!(subject["linked_timer_id"].is_null());
    assert_eq!(subject["quick_timer_config"]["work_duration"], 45);

    let (status, _) = send(&app, Method::DELETE, &format!("/timers/{timer_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_linked_subject_frees_its_timer() {
    let (app, _) = build_test_app().await;
    let subject_id = create_subject(&app, "Latin").await;
    let timer_id = create_timer(&app, "Vocab", 1200).await;
    send(
        &app,
        Method::PUT,
        &format!("/subjects/{subject_id}/timer"),
        Some(json!({ "timer_id": timer_id })),
    )
    .await;

    let (status, _) = send(&app, Method::DELETE, &format!("/subjects/{subject_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, timer) = get(&app, &format!("/timers/{timer_id}")).await;
    assert!(timer["linked_subject"].is_null());

    let (_, available) = get(&app, "/timers/available").await;
    assert_eq!(available.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn renaming_a_subject_refreshes_the_timer_back_reference() {
    let (app, _) = build_test_app().await;
    let subject_id = create_subject(&app, "Maths").await;
    let timer_id = create_timer(&app, "Problems", 1500).await;
    send(
        &app,
        Method::PUT,
        &format!("/subjects/{subject_id}/timer"),
        Some(json!({ "timer_id": timer_id })),
    )
    .await;

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/subjects/{subject_id}"),
        Some(json!({ "name": "Linear Algebra" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, timer) = get(&app, &format!("/timers/{timer_id}")).await;
    assert_eq!(timer["linked_subject"]["name"], "Linear Algebra");
}

#[tokio::test]
async fn generic_update_cannot_write_linkage_fields() {
    let (app, _) = build_test_app().await;
    let subject_id = create_subject(&app, "Art").await;
    let timer_id = create_timer(&app, "Sketching", 1500).await;

    let (status, subject) = send(
        &app,
        Method::PATCH,
        &format!("/subjects/{subject_id}"),
        Some(json!({ "linked_timer_id": timer_id, "weekly_time_goal": 120 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(subject["linked_timer_id"].is_null());
    assert_eq!(subject["weekly_time_goal"], 120);

    let (_, timer) = get(&app, &format!("/timers/{timer_id}")).await;
    assert!(timer["linked_subject"].is_null());
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let (app, _) = build_test_app().await;
    let subject_id = create_subject(&app, "Music").await;

    let (status, _) = post(&app, "/subjects", json!({ "name": "music", "target_time": 60 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/subjects", json!({ "name": "   ", "target_time": 60 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = Uuid::new_v4();
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/subjects/{subject_id}/timer"),
        Some(json!({ "timer_id": missing })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app, &format!("/subjects/{missing}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn completing_an_ephemeral_timer_removes_it() {
    let (app, _) = build_test_app().await;
    let (status, timer) = post(&app, "/timers", json!({ "is_ephemeral": true })).await;
    assert_eq!(status, StatusCode::CREATED);
    let timer_id = timer["id"].as_str().unwrap().to_string();

    let (_, available) = get(&app, "/timers/available").await;
    assert!(available.as_array().unwrap().is_empty());

    let (status, _) = post(&app, &format!("/timers/{timer_id}/complete"), json!({})).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = get(&app, &format!("/timers/{timer_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn diagnostics_detect_and_repair_a_dangling_reference() {
    let (app, state) = build_test_app().await;
    let subject_id = create_subject(&app, "Geography").await;
    let timer_id = create_timer(&app, "Maps", 1500).await;
    send(
        &app,
        Method::PUT,
        &format!("/subjects/{subject_id}/timer"),
        Some(json!({ "timer_id": timer_id })),
    )
    .await;

    let (_, healthy) = get(&app, "/linkage/diagnostics").await;
    assert_eq!(healthy["status"], "OK");
    assert_eq!(healthy["valid_links"], 1);

    // Bypass the link manager so the subject keeps pointing at a deleted timer.
    state
        .timers
        .remove(timer_id.parse().unwrap())
        .await
        .unwrap();

    let (_, broken) = get(&app, "/linkage/diagnostics").await;
    assert_eq!(broken["status"], "ERROR");
    assert_eq!(broken["issues"].as_array().unwrap().len(), 1);

    let (status, repair) = post(&app, "/linkage/repair", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(repair["fixed"].as_array().unwrap().len(), 1);
    assert_eq!(repair["after"]["status"], "OK");

    let (_, subject) = get(&app, &format!("/subjects/{subject_id}")).await;
    assert!(subject["linked_timer_id"].is_null());
}
