//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Every change to linkage goes through the `LinkManager`; the generic update
//! endpoints cannot touch `linked_timer_id` or a timer's back-reference.

use crate::web::dto::*;
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::NaiveDate;
use onyx_core::ports::PortError;
use onyx_core::progress;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::OpenApi;
use uuid::Uuid;

type HandlerResult<T> = Result<T, (StatusCode, String)>;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_subjects_handler,
        create_subject_handler,
        get_subject_handler,
        update_subject_handler,
        delete_subject_handler,
        add_study_time_handler,
        link_timer_handler,
        unlink_timer_handler,
        linked_timer_handler,
        available_timers_for_subject_handler,
        list_timers_handler,
        create_timer_handler,
        get_timer_handler,
        update_timer_handler,
        delete_timer_handler,
        complete_timer_handler,
        available_timers_handler,
        linkage_status_handler,
        diagnostics_handler,
        repair_handler,
        consistency_handler,
        subject_progress_handler,
        daily_stats_handler,
        weekly_stats_handler,
        subjects_overview_handler,
    ),
    components(
        schemas(
            SubjectResponse,
            QuickTimerConfigResponse,
            CreateSubjectRequest,
            UpdateSubjectRequest,
            StudyTimeRequest,
            LinkTimerRequest,
            TimerConfigPayload,
            TimerResponse,
            LinkedSubjectResponse,
            CreateTimerRequest,
            UpdateTimerRequest,
            LinkedPairResponse,
            OrphanedReferenceResponse,
            LinkageStatusResponse,
            DiagnosticsResponse,
            RepairResponse,
            ConsistencyResponse,
            StudySessionResponse,
            DailyProgressResponse,
            DayTotalResponse,
            WeeklyStatsResponse,
            SubjectsOverviewResponse,
        )
    ),
    tags(
        (name = "Onyx API", description = "Subjects, timers and the one-to-one link between them.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Maps a port failure to an HTTP status. Server-side failures are logged and
/// reported with `context` only.
fn port_error(context: &str, e: PortError) -> (StatusCode, String) {
    let status = match &e {
        PortError::NotFound { .. } => StatusCode::NOT_FOUND,
        PortError::Invalid(_) => StatusCode::BAD_REQUEST,
        PortError::Conflict(_) => StatusCode::CONFLICT,
        PortError::Persistence(_) | PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("{}: {:?}", context, e);
        (status, context.to_string())
    } else {
        (status, e.to_string())
    }
}

fn bad_request(message: String) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message)
}

fn not_found(kind: &str, id: Uuid) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("{kind} {id} not found"))
}

//=========================================================================================
// Subject Handlers
//=========================================================================================

/// List all subjects.
#[utoipa::path(
    get,
    path = "/subjects",
    responses(
        (status = 200, description = "All subjects", body = [SubjectResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_subjects_handler(
    State(app_state): State<Arc<AppState>>,
) -> HandlerResult<impl IntoResponse> {
    let subjects = app_state
        .subjects
        .list()
        .await
        .map_err(|e| port_error("Failed to list subjects", e))?;
    Ok(Json(
        subjects.into_iter().map(SubjectResponse::from).collect::<Vec<_>>(),
    ))
}

/// Create a subject.
///
/// Names must be non-empty and unique regardless of case.
#[utoipa::path(
    post,
    path = "/subjects",
    request_body = CreateSubjectRequest,
    responses(
        (status = 201, description = "Subject created", body = SubjectResponse),
        (status = 400, description = "Empty or duplicate name, or unknown study day"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_subject_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateSubjectRequest>,
) -> HandlerResult<impl IntoResponse> {
    let new = payload.into_new_subject().map_err(bad_request)?;
    let subject = app_state
        .subjects
        .create(new)
        .await
        .map_err(|e| port_error("Failed to create subject", e))?;
    info!(subject_id = %subject.id, "Subject created");
    Ok((StatusCode::CREATED, Json(SubjectResponse::from(subject))))
}

/// Fetch a single subject.
#[utoipa::path(
    get,
    path = "/subjects/{id}",
    params(("id" = Uuid, Path, description = "Subject id")),
    responses(
        (status = 200, description = "The subject", body = SubjectResponse),
        (status = 404, description = "Subject not found")
    )
)]
pub async fn get_subject_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    let subject = app_state
        .subjects
        .get(id)
        .await
        .map_err(|e| port_error("Failed to load subject", e))?
        .ok_or_else(|| not_found("subject", id))?;
    Ok(Json(SubjectResponse::from(subject)))
}

/// Update a subject's own fields.
///
/// A rename is propagated to the back-reference of the linked timer.
#[utoipa::path(
    patch,
    path = "/subjects/{id}",
    params(("id" = Uuid, Path, description = "Subject id")),
    request_body = UpdateSubjectRequest,
    responses(
        (status = 200, description = "Updated subject", body = SubjectResponse),
        (status = 400, description = "Invalid field value"),
        (status = 404, description = "Subject not found")
    )
)]
pub async fn update_subject_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSubjectRequest>,
) -> HandlerResult<impl IntoResponse> {
    let patch = payload.into_patch().map_err(bad_request)?;
    let renamed = patch.name.is_some();
    let subject = app_state
        .subjects
        .update(id, patch)
        .await
        .map_err(|e| port_error("Failed to update subject", e))?;
    if renamed && subject.linked_timer_id.is_some() {
        app_state
            .links
            .sync_subject_info_to_linked_timers(id)
            .await
            .map_err(|e| port_error("Failed to refresh linked timer", e))?;
    }
    Ok(Json(SubjectResponse::from(subject)))
}

/// Delete a subject, releasing its timer.
#[utoipa::path(
    delete,
    path = "/subjects/{id}",
    params(("id" = Uuid, Path, description = "Subject id")),
    responses(
        (status = 204, description = "Subject deleted"),
        (status = 404, description = "Subject not found")
    )
)]
pub async fn delete_subject_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    let deleted = app_state
        .links
        .handle_subject_deletion(id)
        .await
        .map_err(|e| port_error("Failed to delete subject", e))?;
    if !deleted {
        return Err(not_found("subject", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Credit completed study time to a subject.
#[utoipa::path(
    post,
    path = "/subjects/{id}/study-time",
    params(("id" = Uuid, Path, description = "Subject id")),
    request_body = StudyTimeRequest,
    responses(
        (status = 200, description = "Updated subject", body = SubjectResponse),
        (status = 400, description = "Zero duration"),
        (status = 404, description = "Subject not found")
    )
)]
pub async fn add_study_time_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StudyTimeRequest>,
) -> HandlerResult<impl IntoResponse> {
    let subject = app_state
        .subjects
        .add_study_time(id, payload.seconds)
        .await
        .map_err(|e| port_error("Failed to record study time", e))?;
    Ok(Json(SubjectResponse::from(subject)))
}

//=========================================================================================
// Linkage Handlers
//=========================================================================================

/// Link a subject to a timer.
///
/// Any subject previously holding the timer is converted to a quick timer.
#[utoipa::path(
    put,
    path = "/subjects/{id}/timer",
    params(("id" = Uuid, Path, description = "Subject id")),
    request_body = LinkTimerRequest,
    responses(
        (status = 200, description = "Linked subject", body = SubjectResponse),
        (status = 404, description = "Subject or timer not found")
    )
)]
pub async fn link_timer_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LinkTimerRequest>,
) -> HandlerResult<impl IntoResponse> {
    app_state
        .links
        .link_subject_to_timer(id, payload.timer_id)
        .await
        .map_err(|e| port_error("Failed to link subject", e))?;
    get_subject_handler(State(app_state), Path(id)).await
}

/// Unlink a subject from its timer and convert it to a quick timer.
#[utoipa::path(
    delete,
    path = "/subjects/{id}/timer",
    params(("id" = Uuid, Path, description = "Subject id")),
    responses(
        (status = 200, description = "Unlinked subject", body = SubjectResponse),
        (status = 404, description = "Subject not found")
    )
)]
pub async fn unlink_timer_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    app_state
        .links
        .unlink_subject(id)
        .await
        .map_err(|e| port_error("Failed to unlink subject", e))?;
    get_subject_handler(State(app_state), Path(id)).await
}

/// The timer linked to a subject; `null` when there is none.
#[utoipa::path(
    get,
    path = "/subjects/{id}/timer",
    params(("id" = Uuid, Path, description = "Subject id")),
    responses(
        (status = 200, description = "Linked timer, or null when unlinked", body = TimerResponse),
        (status = 404, description = "Subject not found")
    )
)]
pub async fn linked_timer_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    require_subject(&app_state, id).await?;
    let timer = app_state
        .links
        .linked_timer_for_subject(id)
        .await
        .map_err(|e| port_error("Failed to load linked timer", e))?;
    Ok(Json(timer.map(TimerResponse::from)))
}

/// Timers this subject may be linked to.
#[utoipa::path(
    get,
    path = "/subjects/{id}/available-timers",
    params(("id" = Uuid, Path, description = "Subject id")),
    responses(
        (status = 200, description = "Unlinked timers plus the subject's own", body = [TimerResponse]),
        (status = 404, description = "Subject not found")
    )
)]
pub async fn available_timers_for_subject_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    require_subject(&app_state, id).await?;
    available(&app_state, Some(id)).await
}

async fn require_subject(app_state: &AppState, id: Uuid) -> HandlerResult<()> {
    app_state
        .subjects
        .get(id)
        .await
        .map_err(|e| port_error("Failed to load subject", e))?
        .map(|_| ())
        .ok_or_else(|| not_found("subject", id))
}

async fn available(app_state: &AppState, subject_id: Option<Uuid>) -> HandlerResult<Json<Vec<TimerResponse>>> {
    let timers = app_state
        .links
        .available_timers_for_subject(subject_id)
        .await
        .map_err(|e| port_error("Failed to list available timers", e))?;
    Ok(Json(timers.into_iter().map(TimerResponse::from).collect()))
}

//=========================================================================================
// Timer Handlers
//=========================================================================================

/// List all timers, ephemeral ones included.
#[utoipa::path(
    get,
    path = "/timers",
    responses(
        (status = 200, description = "All timers", body = [TimerResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_timers_handler(
    State(app_state): State<Arc<AppState>>,
) -> HandlerResult<impl IntoResponse> {
    let timers = app_state
        .timers
        .list()
        .await
        .map_err(|e| port_error("Failed to list timers", e))?;
    Ok(Json(
        timers.into_iter().map(TimerResponse::from).collect::<Vec<_>>(),
    ))
}

/// Create a timer.
#[utoipa::path(
    post,
    path = "/timers",
    request_body = CreateTimerRequest,
    responses(
        (status = 201, description = "Timer created", body = TimerResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_timer_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateTimerRequest>,
) -> HandlerResult<impl IntoResponse> {
    let timer = app_state
        .timers
        .create(payload.into())
        .await
        .map_err(|e| port_error("Failed to create timer", e))?;
    info!(timer_id = %timer.id, "Timer created");
    Ok((StatusCode::CREATED, Json(TimerResponse::from(timer))))
}

/// Fetch a single timer.
#[utoipa::path(
    get,
    path = "/timers/{id}",
    params(("id" = Uuid, Path, description = "Timer id")),
    responses(
        (status = 200, description = "The timer", body = TimerResponse),
        (status = 404, description = "Timer not found")
    )
)]
pub async fn get_timer_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    let timer = app_state
        .timers
        .get(id)
        .await
        .map_err(|e| port_error("Failed to load timer", e))?
        .ok_or_else(|| not_found("timer", id))?;
    Ok(Json(TimerResponse::from(timer)))
}

/// Update a timer's title or configuration.
#[utoipa::path(
    patch,
    path = "/timers/{id}",
    params(("id" = Uuid, Path, description = "Timer id")),
    request_body = UpdateTimerRequest,
    responses(
        (status = 200, description = "Updated timer", body = TimerResponse),
        (status = 404, description = "Timer not found")
    )
)]
pub async fn update_timer_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTimerRequest>,
) -> HandlerResult<impl IntoResponse> {
    let timer = app_state
        .timers
        .update(id, payload.into())
        .await
        .map_err(|e| port_error("Failed to update timer", e))?;
    Ok(Json(TimerResponse::from(timer)))
}

/// Delete a timer; a linked subject is converted to a quick timer.
#[utoipa::path(
    delete,
    path = "/timers/{id}",
    params(("id" = Uuid, Path, description = "Timer id")),
    responses(
        (status = 204, description = "Timer deleted"),
        (status = 404, description = "Timer not found")
    )
)]
pub async fn delete_timer_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    let deleted = app_state
        .links
        .handle_timer_deletion(id)
        .await
        .map_err(|e| port_error("Failed to delete timer", e))?;
    if !deleted {
        return Err(not_found("timer", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Mark a timer run as finished. Ephemeral timers are deleted.
#[utoipa::path(
    post,
    path = "/timers/{id}/complete",
    params(("id" = Uuid, Path, description = "Timer id")),
    responses(
        (status = 204, description = "Run recorded"),
        (status = 404, description = "Timer not found")
    )
)]
pub async fn complete_timer_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    app_state
        .links
        .complete_timer_run(id)
        .await
        .map_err(|e| port_error("Failed to complete timer run", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Timers available for linking, optionally scoped to one subject.
#[utoipa::path(
    get,
    path = "/timers/available",
    params(AvailableTimersQuery),
    responses(
        (status = 200, description = "Linkable timers", body = [TimerResponse])
    )
)]
pub async fn available_timers_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<AvailableTimersQuery>,
) -> HandlerResult<impl IntoResponse> {
    available(&app_state, query.subject_id).await
}

//=========================================================================================
// Progress Handlers
//=========================================================================================

fn day_or_today(app_state: &AppState, query: DateQuery) -> NaiveDate {
    query
        .date
        .unwrap_or_else(|| app_state.clock.now().date_naive())
}

/// One subject's study time on a day against its daily goal.
///
/// The daily goal is the weekly goal spread over the subject's study days.
#[utoipa::path(
    get,
    path = "/subjects/{id}/progress",
    params(("id" = Uuid, Path, description = "Subject id"), DateQuery),
    responses(
        (status = 200, description = "Daily progress", body = DailyProgressResponse),
        (status = 404, description = "Subject not found")
    )
)]
pub async fn subject_progress_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<DateQuery>,
) -> HandlerResult<impl IntoResponse> {
    let date = day_or_today(&app_state, query);
    let daily = progress::subject_daily_progress(app_state.subjects.as_ref(), id, date)
        .await
        .map_err(|e| port_error("Failed to compute subject progress", e))?;
    Ok(Json(DailyProgressResponse::from(daily)))
}

/// Daily progress of every subject.
#[utoipa::path(
    get,
    path = "/stats/daily",
    params(DateQuery),
    responses((status = 200, description = "Per-subject progress", body = [DailyProgressResponse]))
)]
pub async fn daily_stats_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> HandlerResult<impl IntoResponse> {
    let date = day_or_today(&app_state, query);
    let all = progress::all_daily_progress(app_state.subjects.as_ref(), date)
        .await
        .map_err(|e| port_error("Failed to compute daily stats", e))?;
    Ok(Json(
        all.into_iter().map(DailyProgressResponse::from).collect::<Vec<_>>(),
    ))
}

/// Study time per day of the Monday-to-Sunday week containing `date`.
#[utoipa::path(
    get,
    path = "/stats/weekly",
    params(DateQuery),
    responses((status = 200, description = "Weekly totals", body = WeeklyStatsResponse))
)]
pub async fn weekly_stats_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> HandlerResult<impl IntoResponse> {
    let date = day_or_today(&app_state, query);
    let weekly = progress::weekly_stats(app_state.subjects.as_ref(), date)
        .await
        .map_err(|e| port_error("Failed to compute weekly stats", e))?;
    Ok(Json(WeeklyStatsResponse::from(weekly)))
}

/// Status counts and overall progress across all subjects.
#[utoipa::path(
    get,
    path = "/stats/subjects",
    responses((status = 200, description = "Subjects overview", body = SubjectsOverviewResponse))
)]
pub async fn subjects_overview_handler(
    State(app_state): State<Arc<AppState>>,
) -> HandlerResult<impl IntoResponse> {
    let overview = progress::overview(app_state.subjects.as_ref())
        .await
        .map_err(|e| port_error("Failed to compute subjects overview", e))?;
    Ok(Json(SubjectsOverviewResponse::from(overview)))
}

//=========================================================================================
// Diagnostics Handlers
//=========================================================================================

/// Cross-reference of both stores.
#[utoipa::path(
    get,
    path = "/linkage/status",
    responses((status = 200, description = "Linkage status", body = LinkageStatusResponse))
)]
pub async fn linkage_status_handler(
    State(app_state): State<Arc<AppState>>,
) -> HandlerResult<impl IntoResponse> {
    let status = app_state
        .links
        .linkage_status()
        .await
        .map_err(|e| port_error("Failed to compute linkage status", e))?;
    Ok(Json(LinkageStatusResponse::from(status)))
}

/// Read-only consistency diagnosis.
#[utoipa::path(
    get,
    path = "/linkage/diagnostics",
    responses((status = 200, description = "Diagnostic report", body = DiagnosticsResponse))
)]
pub async fn diagnostics_handler(
    State(app_state): State<Arc<AppState>>,
) -> HandlerResult<impl IntoResponse> {
    let report = app_state
        .links
        .diagnose()
        .await
        .map_err(|e| port_error("Failed to diagnose linkage", e))?;
    Ok(Json(DiagnosticsResponse::from(report)))
}

/// Repair every diagnosed issue and report the state afterwards.
#[utoipa::path(
    post,
    path = "/linkage/repair",
    responses((status = 200, description = "Repair outcome", body = RepairResponse))
)]
pub async fn repair_handler(
    State(app_state): State<Arc<AppState>>,
) -> HandlerResult<impl IntoResponse> {
    let outcome = app_state
        .links
        .repair()
        .await
        .map_err(|e| port_error("Failed to repair linkage", e))?;
    Ok(Json(RepairResponse::from(outcome)))
}

/// Clear references to entities that no longer exist.
#[utoipa::path(
    post,
    path = "/linkage/consistency",
    responses((status = 200, description = "Ids that were repaired", body = ConsistencyResponse))
)]
pub async fn consistency_handler(
    State(app_state): State<Arc<AppState>>,
) -> HandlerResult<impl IntoResponse> {
    let repair = app_state
        .links
        .ensure_data_consistency()
        .await
        .map_err(|e| port_error("Failed to run consistency check", e))?;
    Ok(Json(ConsistencyResponse::from(repair)))
}
