//! crates/onyx_core/src/progress.rs
//!
//! Read-side study statistics built from the subject store and its session log:
//! per-day progress towards each subject's share of its weekly goal, week
//! totals, and an overview across all subjects.
//!
//! Days are UTC calendar days and weeks start on Monday.

use chrono::{Datelike, Days, NaiveDate};
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::{StudySession, Subject, SubjectStatus};
use crate::ports::{PortError, PortResult, SubjectStore};

/// Study days assumed when a subject has none configured.
const DEFAULT_STUDY_DAYS: u32 = 3;

/// How far a subject got on one day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyProgress {
    pub subject_id: Uuid,
    pub subject_name: String,
    pub date: NaiveDate,
    /// Seconds studied on `date`.
    pub time_spent: u64,
    /// Minutes; the weekly goal spread evenly over the subject's study days.
    pub goal: u32,
    pub progress_percent: f64,
    pub goal_reached: bool,
    pub sessions: Vec<StudySession>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayTotal {
    pub date: NaiveDate,
    /// Seconds, all subjects together.
    pub time_spent: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyStats {
    pub week_start: NaiveDate,
    /// Monday through Sunday.
    pub days: Vec<DayTotal>,
    /// Seconds.
    pub total_time_spent: u64,
    /// Minutes, summed over every subject's weekly goal.
    pub weekly_goal: u64,
    pub goal_progress_percent: f64,
}

/// Counts and totals across every subject.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectsOverview {
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

/// Daily share of the subject's weekly goal, in whole minutes.
pub fn daily_goal_minutes(subject: &Subject) -> u32 {
    let days = match subject.study_days.len() {
        0 => DEFAULT_STUDY_DAYS,
        n => n as u32,
    };
    (f64::from(subject.weekly_time_goal) / f64::from(days)).round() as u32
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(offset)).unwrap_or(NaiveDate::MIN)
}

fn percent(seconds: u64, goal_minutes: u64) -> f64 {
    if goal_minutes == 0 {
        return 0.0;
    }
    seconds as f64 / 60.0 / goal_minutes as f64 * 100.0
}

fn total_duration<'a>(sessions: impl IntoIterator<Item = &'a StudySession>) -> u64 {
    sessions
        .into_iter()
        .fold(0u64, |total, s| total.saturating_add(s.duration))
}

/// Progress of `subject` on `date`, given every session that ended that day.
pub fn daily_progress(subject: &Subject, date: NaiveDate, day_sessions: &[StudySession]) -> DailyProgress {
    let sessions: Vec<StudySession> = day_sessions
        .iter()
        .filter(|s| s.subject_id == subject.id)
        .cloned()
        .collect();
    let time_spent = total_duration(&sessions);
    let goal = daily_goal_minutes(subject);
    let progress_percent = percent(time_spent, u64::from(goal));
    DailyProgress {
        subject_id: subject.id,
        subject_name: subject.name.clone(),
        date,
        time_spent,
        goal,
        progress_percent,
        goal_reached: goal > 0 && progress_percent >= 100.0,
        sessions,
    }
}

pub fn subjects_overview(subjects: &[Subject]) -> SubjectsOverview {
    let count = |status: SubjectStatus| subjects.iter().filter(|s| s.status == status).count();
    let total_time_spent = subjects
        .iter()
        .fold(0u64, |total, s| total.saturating_add(s.time_spent));
    let total_target_time = subjects
        .iter()
        .fold(0u64, |total, s| total.saturating_add(s.target_time));
    let overall_progress_percent = if total_target_time > 0 {
        total_time_spent as f64 / total_target_time as f64 * 100.0
    } else {
        0.0
    };
    SubjectsOverview {
        total: subjects.len(),
        completed: count(SubjectStatus::Completed),
        in_progress: count(SubjectStatus::InProgress),
        not_started: count(SubjectStatus::NotStarted),
        total_time_spent,
        total_target_time,
        overall_progress_percent,
    }
}

//=========================================================================================
// Store Queries
//=========================================================================================

pub async fn subject_daily_progress(
    store: &dyn SubjectStore,
    subject_id: Uuid,
    date: NaiveDate,
) -> PortResult<DailyProgress> {
    let subject = store
        .get(subject_id)
        .await?
        .ok_or_else(|| PortError::subject_not_found(subject_id))?;
    let sessions = store.sessions_on(date).await?;
    Ok(daily_progress(&subject, date, &sessions))
}

/// Daily progress of every subject, in store order.
pub async fn all_daily_progress(store: &dyn SubjectStore, date: NaiveDate) -> PortResult<Vec<DailyProgress>> {
    let subjects = store.list().await?;
    let sessions = store.sessions_on(date).await?;
    Ok(subjects
        .iter()
        .map(|subject| daily_progress(subject, date, &sessions))
        .collect())
}

/// Totals for the Monday-to-Sunday week containing `date`. Sessions of deleted
/// subjects are not counted.
pub async fn weekly_stats(store: &dyn SubjectStore, date: NaiveDate) -> PortResult<WeeklyStats> {
    let subjects = store.list().await?;
    let known: HashSet<Uuid> = subjects.iter().map(|s| s.id).collect();
    let start = week_start(date);

    let mut days = Vec::with_capacity(7);
    for offset in 0..7 {
        let Some(day) = start.checked_add_days(Days::new(offset)) else {
            break;
        };
        let sessions = store.sessions_on(day).await?;
        days.push(DayTotal {
            date: day,
            time_spent: total_duration(sessions.iter().filter(|s| known.contains(&s.subject_id))),
        });
    }

    let total_time_spent = days
        .iter()
        .fold(0u64, |total, d| total.saturating_add(d.time_spent));
    let weekly_goal = subjects.iter().map(|s| u64::from(s.weekly_time_goal)).sum();
    Ok(WeeklyStats {
        week_start: start,
        days,
        total_time_spent,
        weekly_goal,
        goal_progress_percent: percent(total_time_spent, weekly_goal),
    })
}

pub async fn overview(store: &dyn SubjectStore) -> PortResult<SubjectsOverview> {
    Ok(subjects_overview(&store.list().await?))
}
