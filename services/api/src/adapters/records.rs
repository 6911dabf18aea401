//! services/api/src/adapters/records.rs
//!
//! The persisted JSON shapes of subjects, timers and study sessions, and their
//! conversions to and from the pure domain types.

use chrono::{DateTime, Utc, Weekday};
use onyx_core::domain::{
    LinkedSubjectRef, QuickTimerConfig, StudySession, Subject, SubjectStatus, Timer, TimerConfig,
    TimerMode,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

//=========================================================================================
// Subject
//=========================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRecord {
    pub id: Uuid,
    pub name: String,
    pub status: StatusRecord,
    pub target_time: u64,
    #[serde(default)]
    pub time_spent: u64,
    pub default_timer_duration: u32,
    #[serde(default = "default_weekly_goal")]
    pub weekly_time_goal: u32,
    #[serde(default, with = "weekdays")]
    pub study_days: Vec<Weekday>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_study_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_timer_id: Option<Uuid>,
    #[serde(default)]
    pub default_timer_mode: TimerModeRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_timer_config: Option<QuickTimerConfigRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_conversion_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_weekly_goal() -> u32 {
    120
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusRecord {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerModeRecord {
    Simple,
    #[default]
    QuickTimer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuickTimerConfigRecord {
    Simple {
        #[serde(rename = "workDuration")]
        work_duration: u32,
    },
    #[serde(rename_all = "camelCase")]
    Pomodoro {
        work_duration: u32,
        short_break_duration: u32,
        long_break_duration: u32,
        cycles: u32,
    },
}

impl From<&Subject> for SubjectRecord {
    fn from(s: &Subject) -> Self {
        Self {
            id: s.id,
            name: s.name.clone(),
            status: match s.status {
                SubjectStatus::NotStarted => StatusRecord::NotStarted,
                SubjectStatus::InProgress => StatusRecord::InProgress,
                SubjectStatus::Completed => StatusRecord::Completed,
            },
            target_time: s.target_time,
            time_spent: s.time_spent,
            default_timer_duration: s.default_timer_duration,
            weekly_time_goal: s.weekly_time_goal,
            study_days: s.study_days.clone(),
            last_study_date: s.last_study_date,
            linked_timer_id: s.linked_timer_id,
            default_timer_mode: match s.default_timer_mode {
                TimerMode::Simple => TimerModeRecord::Simple,
                TimerMode::QuickTimer => TimerModeRecord::QuickTimer,
            },
            quick_timer_config: s.quick_timer_config.as_ref().map(|q| match *q {
                QuickTimerConfig::Simple { work_duration } => {
                    QuickTimerConfigRecord::Simple { work_duration }
                }
                QuickTimerConfig::Pomodoro {
                    work_duration,
                    short_break_duration,
                    long_break_duration,
                    cycles,
                } => QuickTimerConfigRecord::Pomodoro {
                    work_duration,
                    short_break_duration,
                    long_break_duration,
                    cycles,
                },
            }),
            timer_conversion_note: s.timer_conversion_note.clone(),
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

impl SubjectRecord {
    pub fn to_domain(self) -> Subject {
        Subject {
            id: self.id,
            name: self.name,
            status: match self.status {
                StatusRecord::NotStarted => SubjectStatus::NotStarted,
                StatusRecord::InProgress => SubjectStatus::InProgress,
                StatusRecord::Completed => SubjectStatus::Completed,
            },
            target_time: self.target_time,
            time_spent: self.time_spent,
            default_timer_duration: self.default_timer_duration,
            weekly_time_goal: self.weekly_time_goal,
            study_days: self.study_days,
            last_study_date: self.last_study_date,
            linked_timer_id: self.linked_timer_id,
            default_timer_mode: match self.default_timer_mode {
                TimerModeRecord::Simple => TimerMode::Simple,
                TimerModeRecord::QuickTimer => TimerMode::QuickTimer,
            },
            quick_timer_config: self.quick_timer_config.map(|q| match q {
                QuickTimerConfigRecord::Simple { work_duration } => {
                    QuickTimerConfig::Simple { work_duration }
                }
                QuickTimerConfigRecord::Pomodoro {
                    work_duration,
                    short_break_duration,
                    long_break_duration,
                    cycles,
                } => QuickTimerConfig::Pomodoro {
                    work_duration,
                    short_break_duration,
                    long_break_duration,
                    cycles,
                },
            }),
            timer_conversion_note: self.timer_conversion_note,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Study days as upper-case English names, e.g. `"MONDAY"`.
pub mod weekdays {
    use super::*;

    pub fn name(day: Weekday) -> &'static str {
        match day {
            Weekday::Mon => "MONDAY",
            Weekday::Tue => "TUESDAY",
            Weekday::Wed => "WEDNESDAY",
            Weekday::Thu => "THURSDAY",
            Weekday::Fri => "FRIDAY",
            Weekday::Sat => "SATURDAY",
            Weekday::Sun => "SUNDAY",
        }
    }

    pub fn parse(name: &str) -> Option<Weekday> {
        match name.to_ascii_uppercase().as_str() {
            "MONDAY" => Some(Weekday::Mon),
            "TUESDAY" => Some(Weekday::Tue),
            "WEDNESDAY" => Some(Weekday::Wed),
            "THURSDAY" => Some(Weekday::Thu),
            "FRIDAY" => Some(Weekday::Fri),
            "SATURDAY" => Some(Weekday::Sat),
            "SUNDAY" => Some(Weekday::Sun),
            _ => None,
        }
    }

    pub fn serialize<S: Serializer>(days: &[Weekday], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(days.iter().map(|d| name(*d)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Weekday>, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        names
            .iter()
            .map(|n| {
                parse(n).ok_or_else(|| serde::de::Error::custom(format!("unknown weekday '{n}'")))
            })
            .collect()
    }
}

//=========================================================================================
// Timer
//=========================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerRecord {
    pub id: Uuid,
    pub title: String,
    pub config: TimerConfigRecord,
    #[serde(default)]
    pub is_pomodoro_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cycles: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    #[serde(default)]
    pub is_ephemeral: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_subject: Option<LinkedSubjectRecord>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfigRecord {
    pub work_duration: u32,
    pub short_break_duration: u32,
    pub long_break_duration: u32,
    pub long_break_interval: u32,
}

/// Only `id` and `name` are kept; older records carrying a full subject
/// snapshot still load because unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedSubjectRecord {
    pub id: Uuid,
    pub name: String,
}

impl From<&Timer> for TimerRecord {
    fn from(t: &Timer) -> Self {
        Self {
            id: t.id,
            title: t.title.clone(),
            config: TimerConfigRecord {
                work_duration: t.config.work_duration,
                short_break_duration: t.config.short_break_duration,
                long_break_duration: t.config.long_break_duration,
                long_break_interval: t.config.long_break_interval,
            },
            is_pomodoro_mode: t.is_pomodoro_mode,
            max_cycles: t.max_cycles,
            created_at: t.created_at,
            last_used: t.last_used,
            is_ephemeral: t.is_ephemeral,
            linked_subject: t.linked_subject.as_ref().map(|s| LinkedSubjectRecord {
                id: s.id,
                name: s.name.clone(),
            }),
        }
    }
}

impl TimerRecord {
    pub fn to_domain(self) -> Timer {
        Timer {
            id: self.id,
            title: self.title,
            config: TimerConfig {
                work_duration: self.config.work_duration,
                short_break_duration: self.config.short_break_duration,
                long_break_duration: self.config.long_break_duration,
                long_break_interval: self.config.long_break_interval,
            },
            is_pomodoro_mode: self.is_pomodoro_mode,
            max_cycles: self.max_cycles,
            created_at: self.created_at,
            last_used: self.last_used,
            is_ephemeral: self.is_ephemeral,
            linked_subject: self.linked_subject.map(|s| LinkedSubjectRef {
                id: s.id,
                name: s.name,
            }),
        }
    }
}

//=========================================================================================
// Study Session
//=========================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySessionRecord {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub duration: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl From<&StudySession> for StudySessionRecord {
    fn from(s: &StudySession) -> Self {
        Self {
            id: s.id,
            subject_id: s.subject_id,
            duration: s.duration,
            start_time: s.start_time,
            end_time: s.end_time,
        }
    }
}

impl StudySessionRecord {
    pub fn to_domain(self) -> StudySession {
        StudySession {
            id: self.id,
            subject_id: self.subject_id,
            duration: self.duration,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}
