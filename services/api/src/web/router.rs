//! services/api/src/web/router.rs
//!
//! Route table of the API.

use crate::web::{rest::*, state::AppState, ws_handler};
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

/// Builds the API router over the shared state. CORS and Swagger UI are layered
/// on by the server binary.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/subjects", get(list_subjects_handler).post(create_subject_handler))
        .route(
            "/subjects/{id}",
            get(get_subject_handler)
                .patch(update_subject_handler)
                .delete(delete_subject_handler),
        )
        .route("/subjects/{id}/study-time", post(add_study_time_handler))
        .route("/subjects/{id}/progress", get(subject_progress_handler))
        .route(
            "/subjects/{id}/timer",
            put(link_timer_handler)
                .delete(unlink_timer_handler)
                .get(linked_timer_handler),
        )
        .route(
            "/subjects/{id}/available-timers",
            get(available_timers_for_subject_handler),
        )
        .route("/timers", get(list_timers_handler).post(create_timer_handler))
        .route("/timers/available", get(available_timers_handler))
        .route(
            "/timers/{id}",
            get(get_timer_handler)
                .patch(update_timer_handler)
                .delete(delete_timer_handler),
        )
        .route("/timers/{id}/complete", post(complete_timer_handler))
        .route("/linkage/status", get(linkage_status_handler))
        .route("/linkage/diagnostics", get(diagnostics_handler))
        .route("/linkage/repair", post(repair_handler))
        .route("/linkage/consistency", post(consistency_handler))
        .route("/stats/daily", get(daily_stats_handler))
        .route("/stats/weekly", get(weekly_stats_handler))
        .route("/stats/subjects", get(subjects_overview_handler))
        .route("/ws", get(ws_handler))
        .with_state(app_state)
}
