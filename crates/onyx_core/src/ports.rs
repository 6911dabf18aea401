//! crates/onyx_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture: the link manager
//! is written against them, so storage backends can be swapped without touching
//! the linking logic.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use uuid::Uuid;

use crate::domain::{NewSubject, NewTimer, StudySession, Subject, SubjectPatch, Timer, TimerPatch};
use crate::listeners::{Listener, Subscription};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The two entity kinds that take part in linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Subject,
    Timer,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Subject => f.write_str("subject"),
            EntityKind::Timer => f.write_str("timer"),
        }
    }
}

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },
    #[error("Invalid input: {0}")]
    Invalid(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Persistence failure: {0}")]
    Persistence(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    pub fn subject_not_found(id: Uuid) -> Self {
        PortError::NotFound {
            kind: EntityKind::Subject,
            id,
        }
    }

    pub fn timer_not_found(id: Uuid) -> Self {
        PortError::NotFound {
            kind: EntityKind::Timer,
            id,
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Failure of the raw key-value persistence backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error("storage backend failure: {0}")]
    Backend(String),
}

//=========================================================================================
// Entity Stores
//=========================================================================================

#[async_trait]
pub trait SubjectStore: Send + Sync {
    /// All subjects in insertion order.
    async fn list(&self) -> PortResult<Vec<Subject>>;

    async fn get(&self, id: Uuid) -> PortResult<Option<Subject>>;

    /// Validates and persists a new subject.
    async fn create(&self, new: NewSubject) -> PortResult<Subject>;

    /// Merges `patch` into the subject and touches `updated_at`.
    /// Fails with `NotFound` if the id is absent.
    async fn update(&self, id: Uuid, patch: SubjectPatch) -> PortResult<Subject>;

    async fn remove(&self, id: Uuid) -> PortResult<()>;

    /// Credits `seconds` of completed study time to the subject and logs the
    /// session. Either both are stored or neither is.
    async fn add_study_time(&self, id: Uuid, seconds: u64) -> PortResult<Subject>;

    /// Study sessions that ended on `date` (UTC), for every subject.
    async fn sessions_on(&self, date: NaiveDate) -> PortResult<Vec<StudySession>>;

    /// Notifies `listener` after any mutation of the store.
    fn subscribe(&self, listener: Listener) -> Subscription;
}

#[async_trait]
pub trait TimerStore: Send + Sync {
    /// All timers, ephemeral ones included.
    async fn list(&self) -> PortResult<Vec<Timer>>;

    async fn get(&self, id: Uuid) -> PortResult<Option<Timer>>;

    /// Persists a new timer, naming it from the sequential counter when untitled.
    async fn create(&self, new: NewTimer) -> PortResult<Timer>;

    /// Merges `patch` into the timer. Fails with `NotFound` if the id is absent.
    async fn update(&self, id: Uuid, patch: TimerPatch) -> PortResult<Timer>;

    async fn remove(&self, id: Uuid) -> PortResult<()>;

    fn subscribe(&self, listener: Listener) -> Subscription;
}

//=========================================================================================
// Persistence Backend
//=========================================================================================

/// String key-value storage in the shape of browser local storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Every key currently stored.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;
}

//=========================================================================================
// Clock and Id Generation
//=========================================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Uuid;
}

/// Random v4 identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}
