mod common;

use axum::http::StatusCode;
use common::{build_test_app, create_subject, get, post};
use serde_json::json;
use uuid::Uuid;

/// Credits study time and returns the UTC day it was logged on.
async fn study(app: &axum::Router, subject_id: &str, seconds: u64) -> String {
    let (status, subject) = post(
        app,
        &format!("/subjects/{subject_id}/study-time"),
        json!({ "seconds": seconds }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{subject}");
    subject["last_study_date"].as_str().unwrap()[..10].to_string()
}

#[tokio::test]
async fn subject_progress_reports_the_requested_day() {
    let (app, _) = build_test_app().await;
    let subject_id = create_subject(&app, "Astronomy").await;
    let day = study(&app, &subject_id, 1200).await;

    let (status, progress) = get(&app, &format!("/subjects/{subject_id}/progress?date={day}")).await;
    assert_eq!(status, StatusCode::OK, "{progress}");
    assert_eq!(progress["time_spent"], 1200);
    assert_eq!(progress["goal"], 40);
    assert_eq!(progress["progress_percent"], 50.0);
    assert_eq!(progress["goal_reached"], false);
    assert_eq!(progress["sessions"].as_array().unwrap().len(), 1);

    let (_, other_day) = get(&app, &format!("/subjects/{subject_id}/progress?date=2000-01-03")).await;
    assert_eq!(other_day["time_spent"], 0);
    assert!(other_day["sessions"].as_array().unwrap().is_empty());

    let (status, _) = get(&app, &format!("/subjects/{}/progress", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app, &format!("/subjects/{subject_id}/progress?date=yesterday")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_summarise_all_subjects() {
    let (app, _) = build_test_app().await;
    let astronomy = create_subject(&app, "Astronomy").await;
    create_subject(&app, "Botany").await;
    let day = study(&app, &astronomy, 1800).await;

    let (status, daily) = get(&app, &format!("/stats/daily?date={day}")).await;
    assert_eq!(status, StatusCode::OK);
    let daily = daily.as_array().unwrap();
    assert_eq!(daily.len(), 2);
    assert_eq!(daily[0]["time_spent"], 1800);
    assert_eq!(daily[1]["time_spent"], 0);

    let (status, weekly) = get(&app, &format!("/stats/weekly?date={day}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(weekly["days"].as_array().unwrap().len(), 7);
    assert_eq!(weekly["total_time_spent"], 1800);
    assert_eq!(weekly["weekly_goal"], 240);

    let (status, overview) = get(&app, "/stats/subjects").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["total"], 2);
    assert_eq!(overview["in_progress"], 1);
    assert_eq!(overview["not_started"], 1);
    assert_eq!(overview["total_time_spent"], 1800);
    assert_eq!(overview["total_target_time"], 14400);
}
