//! services/api/src/web/dto.rs
//!
//! Request and response payloads of the REST API, with their OpenAPI schemas.

use chrono::{DateTime, NaiveDate, Utc};
use onyx_core::diagnostics::{DiagnosticReport, DiagnosticStatus, RepairOutcome};
use onyx_core::domain::{
    NewSubject, NewTimer, QuickTimerConfig, StudySession, Subject, SubjectPatch, SubjectStatus, Timer,
    TimerConfig, TimerMode, TimerPatch,
};
use onyx_core::link_manager::{ConsistencyRepair, LinkageStatus, OrphanedReference};
use onyx_core::progress::{DailyProgress, DayTotal, SubjectsOverview, WeeklyStats};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::adapters::records::weekdays;

//=========================================================================================
// Subjects
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct SubjectResponse {
    pub id: Uuid,
    pub name: String,
    /// `NOT_STARTED`, `IN_PROGRESS` or `COMPLETED`.
    pub status: String,
    /// Seconds.
    pub target_time: u64,
    /// Seconds.
    pub time_spent: u64,
    /// Seconds.
    pub default_timer_duration: u32,
    /// Minutes.
    pub weekly_time_goal: u32,
    pub study_days: Vec<String>,
    pub last_study_date: Option<DateTime<Utc>>,
    pub linked_timer_id: Option<Uuid>,
    /// `simple` or `quick_timer`.
    pub default_timer_mode: String,
    pub quick_timer_config: Option<QuickTimerConfigResponse>,
    pub timer_conversion_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Quick-timer parameters in minutes. Break fields are present for pomodoro configurations only.
#[derive(Serialize, ToSchema)]
pub struct QuickTimerConfigResponse {
    /// `simple` or `pomodoro`.
    pub kind: String,
    pub work_duration: u32,
    pub short_break_duration: Option<u32>,
    pub long_break_duration: Option<u32>,
    pub cycles: Option<u32>,
}

fn status_name(status: SubjectStatus) -> &'static str {
    match status {
        SubjectStatus::NotStarted => "NOT_STARTED",
        SubjectStatus::InProgress => "IN_PROGRESS",
        SubjectStatus::Completed => "COMPLETED",
    }
}

pub fn parse_status(raw: &str) -> Option<SubjectStatus> {
    match raw.to_ascii_uppercase().as_str() {
        "NOT_STARTED" => Some(SubjectStatus::NotStarted),
        "IN_PROGRESS" => Some(SubjectStatus::InProgress),
        "COMPLETED" => Some(SubjectStatus::Completed),
        _ => None,
    }
}

impl From<Subject> for SubjectResponse {
    fn from(s: Subject) -> Self {
        Self {
            id: s.id,
            name: s.name,
            status: status_name(s.status).to_string(),
            target_time: s.target_time,
            time_spent: s.time_spent,
            default_timer_duration: s.default_timer_duration,
            weekly_time_goal: s.weekly_time_goal,
            study_days: s
                .study_days
                .iter()
                .map(|d| weekdays::name(*d).to_string())
                .collect(),
            last_study_date: s.last_study_date,
            linked_timer_id: s.linked_timer_id,
            default_timer_mode: match s.default_timer_mode {
                TimerMode::Simple => "simple".to_string(),
                TimerMode::QuickTimer => "quick_timer".to_string(),
            },
            quick_timer_config: s.quick_timer_config.map(|q| match q {
                QuickTimerConfig::Simple { work_duration } => QuickTimerConfigResponse {
                    kind: "simple".to_string(),
                    work_duration,
                    short_break_duration: None,
                    long_break_duration: None,
                    cycles: None,
                },
                QuickTimerConfig::Pomodoro {
                    work_duration,
                    short_break_duration,
                    long_break_duration,
                    cycles,
                } => QuickTimerConfigResponse {
                    kind: "pomodoro".to_string(),
                    work_duration,
                    short_break_duration: Some(short_break_duration),
                    long_break_duration: Some(long_break_duration),
                    cycles: Some(cycles),
                },
            }),
            timer_conversion_note: s.timer_conversion_note,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// Durations in seconds except `weekly_time_goal` (minutes).
#[derive(Deserialize, ToSchema)]
pub struct CreateSubjectRequest {
    pub name: String,
    pub target_time: u64,
    pub default_timer_duration: Option<u32>,
    pub weekly_time_goal: Option<u32>,
    pub study_days: Option<Vec<String>>,
}

/// Linkage fields are not accepted here; use the `/subjects/{id}/timer` endpoints.
#[derive(Deserialize, ToSchema, Default)]
pub struct UpdateSubjectRequest {
    pub name: Option<String>,
    pub status: Option<String>,
    pub target_time: Option<u64>,
    pub default_timer_duration: Option<u32>,
    pub weekly_time_goal: Option<u32>,
    pub study_days: Option<Vec<String>>,
}

fn parse_days(days: Option<Vec<String>>) -> Result<Option<Vec<chrono::Weekday>>, String> {
    days.map(|names| {
        names
            .iter()
            .map(|n| weekdays::parse(n).ok_or_else(|| format!("unknown study day '{n}'")))
            .collect::<Result<Vec<_>, _>>()
    })
    .transpose()
}

impl CreateSubjectRequest {
    pub fn into_new_subject(self) -> Result<NewSubject, String> {
        Ok(NewSubject {
            name: self.name,
            target_time: self.target_time,
            default_timer_duration: self.default_timer_duration,
            weekly_time_goal: self.weekly_time_goal,
            study_days: parse_days(self.study_days)?,
        })
    }
}

impl UpdateSubjectRequest {
    pub fn into_patch(self) -> Result<SubjectPatch, String> {
        let status = self
            .status
            .map(|raw| parse_status(&raw).ok_or_else(|| format!("unknown status '{raw}'")))
            .transpose()?;
        Ok(SubjectPatch {
            name: self.name.map(|n| n.trim().to_string()),
            status,
            target_time: self.target_time,
            default_timer_duration: self.default_timer_duration,
            weekly_time_goal: self.weekly_time_goal,
            study_days: parse_days(self.study_days)?,
            ..SubjectPatch::default()
        })
    }
}

#[derive(Deserialize, ToSchema)]
pub struct StudyTimeRequest {
    /// Completed study time, in seconds.
    pub seconds: u64,
}

#[derive(Deserialize, ToSchema)]
pub struct LinkTimerRequest {
    pub timer_id: Uuid,
}

//=========================================================================================
// Timers
//=========================================================================================

/// Durations in seconds.
#[derive(Serialize, Deserialize, ToSchema, Clone, Copy)]
pub struct TimerConfigPayload {
    pub work_duration: u32,
    pub short_break_duration: u32,
    pub long_break_duration: u32,
    pub long_break_interval: u32,
}

impl From<TimerConfig> for TimerConfigPayload {
    fn from(c: TimerConfig) -> Self {
        Self {
            work_duration: c.work_duration,
            short_break_duration: c.short_break_duration,
            long_break_duration: c.long_break_duration,
            long_break_interval: c.long_break_interval,
        }
    }
}

impl From<TimerConfigPayload> for TimerConfig {
    fn from(c: TimerConfigPayload) -> Self {
        Self {
            work_duration: c.work_duration,
            short_break_duration: c.short_break_duration,
            long_break_duration: c.long_break_duration,
            long_break_interval: c.long_break_interval,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LinkedSubjectResponse {
    pub id: Uuid,
    pub name: String,
}

#[derive(Serialize, ToSchema)]
pub struct TimerResponse {
    pub id: Uuid,
    pub title: String,
    pub config: TimerConfigPayload,
    pub is_pomodoro_mode: bool,
    pub max_cycles: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub is_ephemeral: bool,
    pub linked_subject: Option<LinkedSubjectResponse>,
}

impl From<Timer> for TimerResponse {
    fn from(t: Timer) -> Self {
        Self {
            id: t.id,
            title: t.title,
            config: t.config.into(),
            is_pomodoro_mode: t.is_pomodoro_mode,
            max_cycles: t.max_cycles,
            created_at: t.created_at,
            last_used: t.last_used,
            is_ephemeral: t.is_ephemeral,
            linked_subject: t.linked_subject.map(|s| LinkedSubjectResponse {
                id: s.id,
                name: s.name,
            }),
        }
    }
}

#[derive(Deserialize, ToSchema, Default)]
pub struct CreateTimerRequest {
    /// Defaults to the next sequential `Timer N` name.
    pub title: Option<String>,
    pub config: Option<TimerConfigPayload>,
    #[serde(default)]
    pub is_pomodoro_mode: bool,
    pub max_cycles: Option<u32>,
    /// Ephemeral timers are deleted once a run completes.
    #[serde(default)]
    pub is_ephemeral: bool,
}

impl From<CreateTimerRequest> for NewTimer {
    fn from(r: CreateTimerRequest) -> Self {
        NewTimer {
            title: r.title,
            config: r.config.map(TimerConfig::from).unwrap_or_default(),
            is_pomodoro_mode: r.is_pomodoro_mode,
            max_cycles: r.max_cycles,
            is_ephemeral: r.is_ephemeral,
        }
    }
}

/// The back-reference to a subject cannot be written here.
#[derive(Deserialize, ToSchema, Default)]
pub struct UpdateTimerRequest {
    pub title: Option<String>,
    pub config: Option<TimerConfigPayload>,
    pub is_pomodoro_mode: Option<bool>,
    pub max_cycles: Option<u32>,
}

impl From<UpdateTimerRequest> for TimerPatch {
    fn from(r: UpdateTimerRequest) -> Self {
        TimerPatch {
            title: r.title,
            config: r.config.map(TimerConfig::from),
            is_pomodoro_mode: r.is_pomodoro_mode,
            max_cycles: r.max_cycles.map(Some),
            ..TimerPatch::default()
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AvailableTimersQuery {
    /// Also include the timer already linked to this subject.
    pub subject_id: Option<Uuid>,
}

//=========================================================================================
// Linkage
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct LinkedPairResponse {
    pub subject_id: Uuid,
    pub subject_name: String,
    pub timer_id: Uuid,
    pub timer_title: String,
}

#[derive(Serialize, ToSchema)]
pub struct OrphanedReferenceResponse {
    /// `subject` or `timer`: the entity holding the stale reference.
    pub kind: String,
    pub id: Uuid,
    pub missing_id: Uuid,
    pub issue: String,
}

impl From<OrphanedReference> for OrphanedReferenceResponse {
    fn from(o: OrphanedReference) -> Self {
        Self {
            kind: o.kind.to_string(),
            id: o.id,
            missing_id: o.missing_id,
            issue: o.issue,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LinkageStatusResponse {
    pub linked: Vec<LinkedPairResponse>,
    pub unlinked_subjects: Vec<Uuid>,
    pub unlinked_timers: Vec<Uuid>,
    pub orphaned_references: Vec<OrphanedReferenceResponse>,
}

impl From<LinkageStatus> for LinkageStatusResponse {
    fn from(status: LinkageStatus) -> Self {
        Self {
            linked: status
                .linked
                .into_iter()
                .map(|(s, t)| LinkedPairResponse {
                    subject_id: s.id,
                    subject_name: s.name,
                    timer_id: t.id,
                    timer_title: t.title,
                })
                .collect(),
            unlinked_subjects: status.unlinked_subjects.iter().map(|s| s.id).collect(),
            unlinked_timers: status.unlinked_timers.iter().map(|t| t.id).collect(),
            orphaned_references: status
                .orphaned_references
                .into_iter()
                .map(OrphanedReferenceResponse::from)
                .collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DiagnosticsResponse {
    /// `OK`, `WARNING` or `ERROR`.
    pub status: String,
    pub issues: Vec<String>,
    pub valid_links: usize,
    pub linkage: LinkageStatusResponse,
}

impl From<DiagnosticReport> for DiagnosticsResponse {
    fn from(report: DiagnosticReport) -> Self {
        Self {
            status: match report.status {
                DiagnosticStatus::Ok => "OK",
                DiagnosticStatus::Warning => "WARNING",
                DiagnosticStatus::Error => "ERROR",
            }
            .to_string(),
            issues: report.issues.iter().map(ToString::to_string).collect(),
            valid_links: report.valid_links,
            linkage: report.linkage.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct RepairResponse {
    pub fixed: Vec<String>,
    pub after: DiagnosticsResponse,
}

impl From<RepairOutcome> for RepairResponse {
    fn from(outcome: RepairOutcome) -> Self {
        Self {
            fixed: outcome.fixed.iter().map(ToString::to_string).collect(),
            after: outcome.after.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ConsistencyResponse {
    pub subjects_repaired: Vec<Uuid>,
    pub timers_repaired: Vec<Uuid>,
}

impl From<ConsistencyRepair> for ConsistencyResponse {
    fn from(r: ConsistencyRepair) -> Self {
        Self {
            subjects_repaired: r.subjects_repaired,
            timers_repaired: r.timers_repaired,
        }
    }
}

//=========================================================================================
// Progress
//=========================================================================================

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DateQuery {
    /// Day to report on, `YYYY-MM-DD`. Defaults to today (UTC).
    pub date: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct StudySessionResponse {
    pub id: Uuid,
    pub subject_id: Uuid,
    /// Seconds.
    pub duration: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl From<StudySession> for StudySessionResponse {
    fn from(s: StudySession) -> Self {
        Self {
            id: s.id,
            subject_id: s.subject_id,
            duration: s.duration,
            start_time: s.start_time,
            end_time: s.end_time,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DailyProgressResponse {
    pub subject_id: Uuid,
    pub subject_name: String,
    pub date: NaiveDate,
    /// Seconds.
    pub time_spent: u64,
    /// Minutes.
    pub goal: u32,
    pub progress_percent: f64,
    pub goal_reached: bool,
    pub sessions: Vec<StudySessionResponse>,
}

impl From<DailyProgress> for DailyProgressResponse {
    fn from(p: DailyProgress) -> Self {
        Self {
            subject_id: p.subject_id,
            subject_name: p.subject_name,
            date: p.date,
            time_spent: p.time_spent,
            goal: p.goal,
            progress_percent: p.progress_percent,
            goal_reached: p.goal_reached,
            sessions: p.sessions.into_iter().map(StudySessionResponse::from).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DayTotalResponse {
    pub date: NaiveDate,
    /// Seconds.
    pub time_spent: u64,
}

impl From<DayTotal> for DayTotalResponse {
    fn from(d: DayTotal) -> Self {
        Self {
            date: d.date,
            time_spent: d.time_spent,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct WeeklyStatsResponse {
    /// Monday of the reported week.
    pub week_start: NaiveDate,
    pub days: Vec<DayTotalResponse>,
    /// Seconds.
    pub total_time_spent: u64,
    /// Minutes.
    pub weekly_goal: u64,
    pub goal_progress_percent: f64,
}

impl From<WeeklyStats> for WeeklyStatsResponse {
    fn from(w: WeeklyStats) -> Self {
        Self {
            week_start: w.week_start,
            days: w.days.into_iter().map(DayTotalResponse::from).collect(),
            total_time_spent: w.total_time_spent,
            weekly_goal: w.weekly_goal,
            goal_progress_percent: w.goal_progress_percent,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SubjectsOverviewResponse {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub not_started: usize,
    /// Seconds.
    pub total_time_spent: u64,
    /// Seconds.
    pub total_target_time: u64,
    pub overall_progress_percent: f64,
}

impl From<SubjectsOverview> for SubjectsOverviewResponse {
    fn from(o: SubjectsOverview) -> Self {
        Self {
            total: o.total,
            completed: o.completed,
            in_progress: o.in_progress,
            not_started: o.not_started,
            total_time_spent: o.total_time_spent,
            total_target_time: o.total_target_time,
            overall_progress_percent: o.overall_progress_percent,
        }
    }
}
