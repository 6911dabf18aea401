//! crates/onyx_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any storage backend or serialization format.

use chrono::{DateTime, TimeDelta, Utc, Weekday};
use uuid::Uuid;

use crate::ports::{PortError, PortResult};

/// Work duration, in minutes, used whenever a timer carries no usable duration.
pub const DEFAULT_WORK_MINUTES: u32 = 25;

/// Long-break interval used for pomodoro conversions when the timer has none.
pub const DEFAULT_POMODORO_CYCLES: u32 = 4;

//=========================================================================================
// Subject
//=========================================================================================

/// Progress of a subject towards its target time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectStatus {
    NotStarted,
    InProgress,
    Completed,
}

/// How a subject starts a study session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Runs the linked timer.
    Simple,
    /// Runs the subject's own `QuickTimerConfig`.
    QuickTimer,
}

/// Self-contained timer parameters, in minutes, used when no timer is linked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuickTimerConfig {
    Simple {
        work_duration: u32,
    },
    Pomodoro {
        work_duration: u32,
        short_break_duration: u32,
        long_break_duration: u32,
        cycles: u32,
    },
}

impl QuickTimerConfig {
    /// Derives a quick-timer configuration from a timer about to be detached.
    ///
    /// Durations are floored to whole minutes. A zero work duration falls back to
    /// [`DEFAULT_WORK_MINUTES`]. Pomodoro timers keep their break structure only when
    /// both break durations are set.
    pub fn from_timer(timer: &Timer) -> Self {
        let config = &timer.config;
        let work_duration = whole_minutes(config.work_duration).unwrap_or(DEFAULT_WORK_MINUTES);

        if timer.is_pomodoro_mode && config.short_break_duration > 0 && config.long_break_duration > 0
        {
            QuickTimerConfig::Pomodoro {
                work_duration,
                short_break_duration: config.short_break_duration / 60,
                long_break_duration: config.long_break_duration / 60,
                cycles: if config.long_break_interval > 0 {
                    config.long_break_interval
                } else {
                    DEFAULT_POMODORO_CYCLES
                },
            }
        } else {
            QuickTimerConfig::Simple { work_duration }
        }
    }

    /// Fallback used when the linked timer can no longer be resolved.
    pub fn from_default_duration(default_timer_duration: u32) -> Self {
        QuickTimerConfig::Simple {
            work_duration: whole_minutes(default_timer_duration).unwrap_or(DEFAULT_WORK_MINUTES),
        }
    }
}

fn whole_minutes(seconds: u32) -> Option<u32> {
    match seconds / 60 {
        0 => None,
        minutes => Some(minutes),
    }
}

/// A study topic the user allocates time to.
///
/// All durations are in seconds except `weekly_time_goal`, which is in minutes.
#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
    pub status: SubjectStatus,
    pub target_time: u64,
    pub time_spent: u64,
    pub default_timer_duration: u32,
    pub weekly_time_goal: u32,
    pub study_days: Vec<Weekday>,
    pub last_study_date: Option<DateTime<Utc>>,
    pub linked_timer_id: Option<Uuid>,
    pub default_timer_mode: TimerMode,
    pub quick_timer_config: Option<QuickTimerConfig>,
    pub timer_conversion_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subject {
    /// Builds a fresh subject from a creation payload, applying the application defaults.
    pub fn from_new(id: Uuid, new: NewSubject, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new.name.trim().to_string(),
            status: SubjectStatus::NotStarted,
            target_time: new.target_time,
            time_spent: 0,
            default_timer_duration: new
                .default_timer_duration
                .unwrap_or(DEFAULT_WORK_MINUTES * 60),
            weekly_time_goal: new.weekly_time_goal.unwrap_or(120),
            study_days: new
                .study_days
                .unwrap_or_else(|| vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]),
            last_study_date: None,
            linked_timer_id: None,
            default_timer_mode: TimerMode::QuickTimer,
            quick_timer_config: None,
            timer_conversion_note: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Credits a block of study time that ended at `at`, advances the status and
    /// returns the session record for it.
    ///
    /// Zero durations, durations whose start would precede the representable time
    /// range, and totals that overflow are rejected with `Invalid`; the subject is
    /// left unchanged in that case.
    pub fn credit_study_time(
        &mut self,
        session_id: Uuid,
        seconds: u64,
        at: DateTime<Utc>,
    ) -> PortResult<StudySession> {
        if seconds == 0 {
            return Err(PortError::Invalid("study time must be greater than zero".to_string()));
        }
        let out_of_range = || PortError::Invalid(format!("study time of {seconds}s is out of range"));
        let session = StudySession::ending_at(session_id, self.id, seconds, at).ok_or_else(out_of_range)?;
        let time_spent = self.time_spent.checked_add(seconds).ok_or_else(out_of_range)?;

        self.time_spent = time_spent;
        self.last_study_date = Some(at);
        if self.target_time > 0 && self.time_spent >= self.target_time {
            self.status = SubjectStatus::Completed;
        } else if self.status == SubjectStatus::NotStarted {
            self.status = SubjectStatus::InProgress;
        }
        Ok(session)
    }
}

/// Payload for creating a subject. Durations in seconds.
#[derive(Debug, Clone, Default)]
pub struct NewSubject {
    pub name: String,
    pub target_time: u64,
    pub default_timer_duration: Option<u32>,
    pub weekly_time_goal: Option<u32>,
    pub study_days: Option<Vec<Weekday>>,
}

/// Partial update of a subject. `None` leaves a field untouched; for optional
/// fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct SubjectPatch {
    pub name: Option<String>,
    pub status: Option<SubjectStatus>,
    pub target_time: Option<u64>,
    pub time_spent: Option<u64>,
    pub default_timer_duration: Option<u32>,
    pub weekly_time_goal: Option<u32>,
    pub study_days: Option<Vec<Weekday>>,
    pub last_study_date: Option<Option<DateTime<Utc>>>,
    pub linked_timer_id: Option<Option<Uuid>>,
    pub default_timer_mode: Option<TimerMode>,
    pub quick_timer_config: Option<Option<QuickTimerConfig>>,
    pub timer_conversion_note: Option<Option<String>>,
}

impl SubjectPatch {
    /// Merges the patch into `subject`. The caller is responsible for `updated_at`.
    pub fn apply(self, subject: &mut Subject) {
        if let Some(name) = self.name {
            subject.name = name;
        }
        if let Some(status) = self.status {
            subject.status = status;
        }
        if let Some(target_time) = self.target_time {
            subject.target_time = target_time;
        }
        if let Some(time_spent) = self.time_spent {
            subject.time_spent = time_spent;
        }
        if let Some(duration) = self.default_timer_duration {
            subject.default_timer_duration = duration;
        }
        if let Some(goal) = self.weekly_time_goal {
            subject.weekly_time_goal = goal;
        }
        if let Some(days) = self.study_days {
            subject.study_days = days;
        }
        if let Some(date) = self.last_study_date {
            subject.last_study_date = date;
        }
        if let Some(linked) = self.linked_timer_id {
            subject.linked_timer_id = linked;
        }
        if let Some(mode) = self.default_timer_mode {
            subject.default_timer_mode = mode;
        }
        if let Some(config) = self.quick_timer_config {
            subject.quick_timer_config = config;
        }
        if let Some(note) = self.timer_conversion_note {
            subject.timer_conversion_note = note;
        }
    }
}

//=========================================================================================
// Timer
//=========================================================================================

/// Countdown configuration, all durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    pub work_duration: u32,
    pub short_break_duration: u32,
    pub long_break_duration: u32,
    /// Number of work sessions before a long break.
    pub long_break_interval: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            work_duration: 25 * 60,
            short_break_duration: 5 * 60,
            long_break_duration: 15 * 60,
            long_break_interval: 4,
        }
    }
}

/// Back-reference from a timer to the subject it is linked to.
///
/// Only `id` participates in the linking invariant; `name` is a display
/// snapshot refreshed by `LinkManager::sync_subject_info_to_linked_timers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedSubjectRef {
    pub id: Uuid,
    pub name: String,
}

impl From<&Subject> for LinkedSubjectRef {
    fn from(subject: &Subject) -> Self {
        Self {
            id: subject.id,
            name: subject.name.clone(),
        }
    }
}

/// A configured countdown or pomodoro session definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Timer {
    pub id: Uuid,
    pub title: String,
    pub config: TimerConfig,
    pub is_pomodoro_mode: bool,
    pub max_cycles: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub is_ephemeral: bool,
    pub linked_subject: Option<LinkedSubjectRef>,
}

impl Timer {
    pub fn linked_subject_id(&self) -> Option<Uuid> {
        self.linked_subject.as_ref().map(|s| s.id)
    }
}

/// Payload for creating a timer. A missing title is replaced by the store's
/// sequential display name.
#[derive(Debug, Clone, Default)]
pub struct NewTimer {
    pub title: Option<String>,
    pub config: TimerConfig,
    pub is_pomodoro_mode: bool,
    pub max_cycles: Option<u32>,
    pub is_ephemeral: bool,
}

/// Partial update of a timer, same conventions as [`SubjectPatch`].
#[derive(Debug, Clone, Default)]
pub struct TimerPatch {
    pub title: Option<String>,
    pub config: Option<TimerConfig>,
    pub is_pomodoro_mode: Option<bool>,
    pub max_cycles: Option<Option<u32>>,
    pub last_used: Option<DateTime<Utc>>,
    pub linked_subject: Option<Option<LinkedSubjectRef>>,
}

impl TimerPatch {
    pub fn apply(self, timer: &mut Timer) {
        if let Some(title) = self.title {
            timer.title = title;
        }
        if let Some(config) = self.config {
            timer.config = config;
        }
        if let Some(pomodoro) = self.is_pomodoro_mode {
            timer.is_pomodoro_mode = pomodoro;
        }
        if let Some(max_cycles) = self.max_cycles {
            timer.max_cycles = max_cycles;
        }
        if let Some(last_used) = self.last_used {
            timer.last_used = last_used;
        }
        if let Some(linked) = self.linked_subject {
            timer.linked_subject = linked;
        }
    }
}

//=========================================================================================
// Study sessions
//=========================================================================================

/// A completed block of study time credited to a subject.
#[derive(Debug, Clone, PartialEq)]
pub struct StudySession {
    pub id: Uuid,
    pub subject_id: Uuid,
    /// Seconds.
    pub duration: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl StudySession {
    /// A session of `seconds` ending at `end_time`, or `None` when its start is
    /// not representable.
    pub fn ending_at(id: Uuid, subject_id: Uuid, seconds: u64, end_time: DateTime<Utc>) -> Option<Self> {
        let span = i64::try_from(seconds).ok().and_then(TimeDelta::try_seconds)?;
        let start_time = end_time.checked_sub_signed(span)?;
        Some(Self {
            id,
            subject_id,
            duration: seconds,
            start_time,
            end_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer_with(config: TimerConfig, pomodoro: bool) -> Timer {
        let now = Utc::now();
        Timer {
            id: Uuid::new_v4(),
            title: "Deep work".to_string(),
            config,
            is_pomodoro_mode: pomodoro,
            max_cycles: None,
            created_at: now,
            last_used: now,
            is_ephemeral: false,
            linked_subject: None,
        }
    }

    #[test]
    fn simple_conversion_floors_minutes() {
        let timer = timer_with(
            TimerConfig {
                work_duration: 1530,
                ..TimerConfig::default()
            },
            false,
        );
        assert_eq!(
            QuickTimerConfig::from_timer(&timer),
            QuickTimerConfig::Simple { work_duration: 25 }
        );
    }

    #[test]
    fn zero_duration_falls_back_to_default() {
        let timer = timer_with(
            TimerConfig {
                work_duration: 0,
                ..TimerConfig::default()
            },
            false,
        );
        assert_eq!(
            QuickTimerConfig::from_timer(&timer),
            QuickTimerConfig::Simple { work_duration: 25 }
        );
        assert_eq!(
            QuickTimerConfig::from_default_duration(30),
            QuickTimerConfig::Simple { work_duration: 25 }
        );
    }

    #[test]
    fn pomodoro_conversion_keeps_breaks() {
        let timer = timer_with(
            TimerConfig {
                work_duration: 3000,
                short_break_duration: 600,
                long_break_duration: 1200,
                long_break_interval: 0,
            },
            true,
        );
        assert_eq!(
            QuickTimerConfig::from_timer(&timer),
            QuickTimerConfig::Pomodoro {
                work_duration: 50,
                short_break_duration: 10,
                long_break_duration: 20,
                cycles: 4,
            }
        );
    }

    #[test]
    fn study_time_advances_status() {
        let now = Utc::now();
        let mut subject = Subject::from_new(
            Uuid::new_v4(),
            NewSubject {
                name: "  Algebra ".to_string(),
                target_time: 3600,
                ..NewSubject::default()
            },
            now,
        );
        assert_eq!(subject.name, "Algebra");
        assert_eq!(subject.status, SubjectStatus::NotStarted);

        let session = subject.credit_study_time(Uuid::new_v4(), 1800, now).unwrap();
        assert_eq!(subject.status, SubjectStatus::InProgress);
        assert_eq!(session.subject_id, subject.id);
        assert_eq!(session.end_time - session.start_time, TimeDelta::seconds(1800));

        subject.credit_study_time(Uuid::new_v4(), 1800, now).unwrap();
        assert_eq!(subject.status, SubjectStatus::Completed);
        assert_eq!(subject.last_study_date, Some(now));
    }

    #[test]
    fn out_of_range_study_time_leaves_subject_untouched() {
        let now = Utc::now();
        let mut subject = Subject::from_new(
            Uuid::new_v4(),
            NewSubject {
                name: "Physics".to_string(),
                target_time: 3600,
                ..NewSubject::default()
            },
            now,
        );
        let before = subject.clone();

        for seconds in [0, 100_000_000_000_000_000, u64::MAX] {
            assert!(matches!(
                subject.credit_study_time(Uuid::new_v4(), seconds, now),
                Err(PortError::Invalid(_))
            ));
        }
        assert_eq!(subject, before);

        subject.time_spent = u64::MAX - 10;
        let before = subject.clone();
        assert!(matches!(
            subject.credit_study_time(Uuid::new_v4(), 20, now),
            Err(PortError::Invalid(_))
        ));
        assert_eq!(subject, before);
    }
}
