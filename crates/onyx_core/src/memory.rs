//! crates/onyx_core/src/memory.rs
//!
//! In-memory implementations of the entity store ports. They keep every write
//! in process memory and count them, which makes them the fakes of choice in
//! tests and a zero-configuration backend for local runs.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{NewSubject, NewTimer, StudySession, Subject, SubjectPatch, Timer, TimerPatch};
use crate::listeners::{Listener, ListenerSet, Subscription};
use crate::ports::{
    Clock, IdGenerator, PortError, PortResult, SubjectStore, SystemClock, TimerStore, UuidGenerator,
};

/// Shared by both in-memory stores: clock, id source, listeners and write counter.
struct Plumbing {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    listeners: ListenerSet<dyn Fn() + Send + Sync>,
    writes: AtomicUsize,
}

impl Plumbing {
    fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            clock,
            ids,
            listeners: ListenerSet::new(),
            writes: AtomicUsize::new(0),
        }
    }

    fn committed(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.listeners.notify();
    }
}

//=========================================================================================
// Subjects
//=========================================================================================

pub struct InMemorySubjectStore {
    subjects: RwLock<Vec<Subject>>,
    sessions: RwLock<Vec<StudySession>>,
    plumbing: Plumbing,
}

impl InMemorySubjectStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), Arc::new(UuidGenerator))
    }

    pub fn with_clock(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            subjects: RwLock::new(Vec::new()),
            sessions: RwLock::new(Vec::new()),
            plumbing: Plumbing::new(clock, ids),
        }
    }

    /// Inserts a subject exactly as given, bypassing validation. Not counted as a write.
    pub async fn seed(&self, subject: Subject) {
        self.subjects.write().await.push(subject);
    }

    /// Number of mutations committed since construction.
    pub fn writes(&self) -> usize {
        self.plumbing.writes.load(Ordering::SeqCst)
    }
}

impl Default for InMemorySubjectStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Rejects empty names and case-insensitive duplicates among other subjects.
pub fn validate_subject_name(name: &str, others: &[Subject], except: Option<Uuid>) -> PortResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(PortError::Invalid("subject name must not be empty".to_string()));
    }
    let taken = others
        .iter()
        .filter(|s| Some(s.id) != except)
        .any(|s| s.name.trim().eq_ignore_ascii_case(trimmed));
    if taken {
        return Err(PortError::Invalid(format!(
            "a subject named \"{}\" already exists",
            trimmed
        )));
    }
    Ok(())
}

#[async_trait]
impl SubjectStore for InMemorySubjectStore {
    async fn list(&self) -> PortResult<Vec<Subject>> {
        Ok(self.subjects.read().await.clone())
    }

    async fn get(&self, id: Uuid) -> PortResult<Option<Subject>> {
        Ok(self.subjects.read().await.iter().find(|s| s.id == id).cloned())
    }

    async fn create(&self, new: NewSubject) -> PortResult<Subject> {
        let subject = {
            let mut subjects = self.subjects.write().await;
            validate_subject_name(&new.name, &subjects, None)?;
            let subject = Subject::from_new(self.plumbing.ids.next_id(), new, self.plumbing.clock.now());
            subjects.push(subject.clone());
            subject
        };
        self.plumbing.committed();
        Ok(subject)
    }

    async fn update(&self, id: Uuid, patch: SubjectPatch) -> PortResult<Subject> {
        let updated = {
            let mut subjects = self.subjects.write().await;
            if let Some(name) = &patch.name {
                validate_subject_name(name, &subjects, Some(id))?;
            }
            let subject = subjects
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| PortError::subject_not_found(id))?;
            patch.apply(subject);
            subject.updated_at = self.plumbing.clock.now();
            subject.clone()
        };
        self.plumbing.committed();
        Ok(updated)
    }

    async fn remove(&self, id: Uuid) -> PortResult<()> {
        self.subjects.write().await.retain(|s| s.id != id);
        self.plumbing.committed();
        Ok(())
    }

    async fn add_study_time(&self, id: Uuid, seconds: u64) -> PortResult<Subject> {
        let updated = {
            let mut subjects = self.subjects.write().await;
            let subject = subjects
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| PortError::subject_not_found(id))?;
            let now = self.plumbing.clock.now();
            let session = subject.credit_study_time(self.plumbing.ids.next_id(), seconds, now)?;
            subject.updated_at = now;
            self.sessions.write().await.push(session);
            subject.clone()
        };
        self.plumbing.committed();
        Ok(updated)
    }

    async fn sessions_on(&self, date: NaiveDate) -> PortResult<Vec<StudySession>> {
        Ok(self
            .sessions
            .read()
            .await
            .iter()
            .filter(|s| s.end_time.date_naive() == date)
            .cloned()
            .collect())
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.plumbing.listeners.add(listener)
    }
}

//=========================================================================================
// Timers
//=========================================================================================

pub struct InMemoryTimerStore {
    timers: RwLock<Vec<Timer>>,
    counter: AtomicUsize,
    plumbing: Plumbing,
}

impl InMemoryTimerStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), Arc::new(UuidGenerator))
    }

    pub fn with_clock(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            timers: RwLock::new(Vec::new()),
            counter: AtomicUsize::new(1),
            plumbing: Plumbing::new(clock, ids),
        }
    }

    /// Inserts a timer exactly as given. Not counted as a write.
    pub async fn seed(&self, timer: Timer) {
        self.timers.write().await.push(timer);
    }

    pub fn writes(&self) -> usize {
        self.plumbing.writes.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryTimerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimerStore for InMemoryTimerStore {
    async fn list(&self) -> PortResult<Vec<Timer>> {
        Ok(self.timers.read().await.clone())
    }

    async fn get(&self, id: Uuid) -> PortResult<Option<Timer>> {
        Ok(self.timers.read().await.iter().find(|t| t.id == id).cloned())
    }

    async fn create(&self, new: NewTimer) -> PortResult<Timer> {
        let now = self.plumbing.clock.now();
        let title = match new.title.filter(|t| !t.trim().is_empty()) {
            Some(title) => title,
            None => format!("Timer {}", self.counter.fetch_add(1, Ordering::SeqCst)),
        };
        let timer = Timer {
            id: self.plumbing.ids.next_id(),
            title,
            config: new.config,
            is_pomodoro_mode: new.is_pomodoro_mode,
            max_cycles: new.max_cycles,
            created_at: now,
            last_used: now,
            is_ephemeral: new.is_ephemeral,
            linked_subject: None,
        };
        self.timers.write().await.push(timer.clone());
        self.plumbing.committed();
        Ok(timer)
    }

    async fn update(&self, id: Uuid, patch: TimerPatch) -> PortResult<Timer> {
        let updated = {
            let mut timers = self.timers.write().await;
            let timer = timers
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| PortError::timer_not_found(id))?;
            patch.apply(timer);
            timer.clone()
        };
        self.plumbing.committed();
        Ok(updated)
    }

    async fn remove(&self, id: Uuid) -> PortResult<()> {
        self.timers.write().await.retain(|t| t.id != id);
        self.plumbing.committed();
        Ok(())
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.plumbing.listeners.add(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TimerConfig;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn create_rejects_empty_and_duplicate_names() {
        let store = InMemorySubjectStore::new();
        store
            .create(NewSubject {
                name: "Physics".to_string(),
                target_time: 3600,
                ..NewSubject::default()
            })
            .await
            .unwrap();

        let empty = store
            .create(NewSubject {
                name: "   ".to_string(),
                ..NewSubject::default()
            })
            .await;
        assert!(matches!(empty, Err(PortError::Invalid(_))));

        let duplicate = store
            .create(NewSubject {
                name: "physics ".to_string(),
                ..NewSubject::default()
            })
            .await;
        assert!(matches!(duplicate, Err(PortError::Invalid(_))));
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn update_of_missing_subject_is_not_found() {
        let store = InMemorySubjectStore::new();
        let id = Uuid::new_v4();
        let result = store.update(id, SubjectPatch::default()).await;
        assert!(matches!(result, Err(PortError::NotFound { id: missing, .. }) if missing == id));
    }

    #[tokio::test]
    async fn study_time_is_logged_and_rejected_credits_write_nothing() {
        let store = InMemorySubjectStore::new();
        let subject = store
            .create(NewSubject {
                name: "Geology".to_string(),
                target_time: 3600,
                ..NewSubject::default()
            })
            .await
            .unwrap();

        let updated = store.add_study_time(subject.id, 900).await.unwrap();
        let today = updated.last_study_date.unwrap().date_naive();
        let sessions = store.sessions_on(today).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration, 900);
        assert_eq!(store.writes(), 2);

        let rejected = store.add_study_time(subject.id, u64::MAX).await;
        assert!(matches!(rejected, Err(PortError::Invalid(_))));
        assert_eq!(store.writes(), 2);
        assert_eq!(store.get(subject.id).await.unwrap().unwrap().time_spent, 900);
        assert_eq!(store.sessions_on(today).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn untitled_timers_get_sequential_names_and_notify() {
        let store = InMemoryTimerStore::new();
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        let sub = store.subscribe(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let first = store.create(NewTimer::default()).await.unwrap();
        let second = store.create(NewTimer::default()).await.unwrap();
        let named = store
            .create(NewTimer {
                title: Some("Reading".to_string()),
                config: TimerConfig::default(),
                ..NewTimer::default()
            })
            .await
            .unwrap();

        assert_eq!(first.title, "Timer 1");
        assert_eq!(second.title, "Timer 2");
        assert_eq!(named.title, "Reading");
        assert_eq!(notified.load(Ordering::SeqCst), 3);

        sub.unsubscribe();
        store.remove(first.id).await.unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 3);
    }
}
