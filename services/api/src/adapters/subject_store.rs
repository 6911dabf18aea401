//! services/api/src/adapters/subject_store.rs
//!
//! `SubjectStore` persisted as a JSON array under `onyx_subjects`. The array is
//! cached in memory and written through on every mutation; the cache only
//! changes once the write succeeded.

use async_trait::async_trait;
use chrono::NaiveDate;
use onyx_core::domain::{NewSubject, StudySession, Subject, SubjectPatch};
use onyx_core::listeners::{Listener, ListenerSet, Subscription};
use onyx_core::memory::validate_subject_name;
use onyx_core::ports::{Clock, IdGenerator, PortError, PortResult, SubjectStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::records::{StudySessionRecord, SubjectRecord};
use crate::adapters::storage::{sessions_key, JsonStorage, SUBJECTS_KEY};

pub struct JsonSubjectStore {
    storage: Arc<JsonStorage>,
    subjects: RwLock<Vec<Subject>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    listeners: ListenerSet<dyn Fn() + Send + Sync>,
}

impl JsonSubjectStore {
    /// Loads the persisted subjects into memory.
    pub async fn load(
        storage: Arc<JsonStorage>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> PortResult<Self> {
        let records: Vec<SubjectRecord> = storage.load(SUBJECTS_KEY).await?;
        let subjects: Vec<Subject> = records.into_iter().map(SubjectRecord::to_domain).collect();
        info!(count = subjects.len(), "Loaded subjects");
        Ok(Self {
            storage,
            subjects: RwLock::new(subjects),
            clock,
            ids,
            listeners: ListenerSet::new(),
        })
    }

    async fn persist(&self, subjects: &[Subject]) -> PortResult<()> {
        let records: Vec<SubjectRecord> = subjects.iter().map(SubjectRecord::from).collect();
        self.storage.save(SUBJECTS_KEY, &records).await
    }

    /// Applies `change` to a copy of the subject list, persists it, then commits.
    async fn mutate<F, T>(&self, change: F) -> PortResult<T>
    where
        F: FnOnce(&mut Vec<Subject>) -> PortResult<T>,
    {
        let result = {
            let mut subjects = self.subjects.write().await;
            let mut next = subjects.clone();
            let result = change(&mut next)?;
            self.persist(&next).await?;
            *subjects = next;
            result
        };
        self.listeners.notify();
        Ok(result)
    }
}

#[async_trait]
impl SubjectStore for JsonSubjectStore {
    async fn list(&self) -> PortResult<Vec<Subject>> {
        Ok(self.subjects.read().await.clone())
    }

    async fn get(&self, id: Uuid) -> PortResult<Option<Subject>> {
        Ok(self.subjects.read().await.iter().find(|s| s.id == id).cloned())
    }

    async fn create(&self, new: NewSubject) -> PortResult<Subject> {
        let id = self.ids.next_id();
        let now = self.clock.now();
        let subject = self
            .mutate(|subjects| {
                validate_subject_name(&new.name, subjects, None)?;
                if subjects.iter().any(|s| s.id == id) {
                    return Err(PortError::Conflict(format!("subject {id} already exists")));
                }
                let subject = Subject::from_new(id, new, now);
                subjects.push(subject.clone());
                Ok(subject)
            })
            .await?;
        debug!(subject_id = %subject.id, "Created subject \"{}\"", subject.name);
        Ok(subject)
    }

    async fn update(&self, id: Uuid, patch: SubjectPatch) -> PortResult<Subject> {
        let now = self.clock.now();
        self.mutate(|subjects| {
            if let Some(name) = &patch.name {
                validate_subject_name(name, subjects, Some(id))?;
            }
            let subject = subjects
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| PortError::subject_not_found(id))?;
            patch.apply(subject);
            subject.updated_at = now;
            Ok(subject.clone())
        })
        .await
    }

    async fn remove(&self, id: Uuid) -> PortResult<()> {
        self.mutate(|subjects| {
            subjects.retain(|s| s.id != id);
            Ok(())
        })
        .await
    }

    /// The session record is written before the subject list; if the subject
    /// write then fails the day's records are restored, so the two never
    /// disagree.
    async fn add_study_time(&self, id: Uuid, seconds: u64) -> PortResult<Subject> {
        let now = self.clock.now();
        let updated = {
            let mut subjects = self.subjects.write().await;
            let mut next = subjects.clone();
            let subject = next
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| PortError::subject_not_found(id))?;
            let session = subject.credit_study_time(self.ids.next_id(), seconds, now)?;
            subject.updated_at = now;
            let updated = subject.clone();

            let key = sessions_key(now.date_naive());
            let previous: Vec<StudySessionRecord> = self.storage.load(&key).await?;
            let mut records = previous.clone();
            records.push(StudySessionRecord::from(&session));
            self.storage.save(&key, &records).await?;

            if let Err(e) = self.persist(&next).await {
                if let Err(rollback) = self.storage.save(&key, &previous).await {
                    warn!(key, "Could not restore study sessions: {}", rollback);
                }
                return Err(e);
            }
            *subjects = next;
            updated
        };
        self.listeners.notify();
        debug!(subject_id = %id, seconds, total = updated.time_spent, "Recorded study time");
        Ok(updated)
    }

    async fn sessions_on(&self, date: NaiveDate) -> PortResult<Vec<StudySession>> {
        let records: Vec<StudySessionRecord> = self.storage.load(&sessions_key(date)).await?;
        Ok(records.into_iter().map(StudySessionRecord::to_domain).collect())
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.listeners.add(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::kv_memory::testing::FailingKeyValueStore;
    use crate::adapters::kv_memory::MemoryKeyValueStore;
    use crate::adapters::storage::SESSIONS_KEY_PREFIX;
    use onyx_core::domain::SubjectStatus;
    use onyx_core::ports::{KeyValueStore, SystemClock, UuidGenerator};

    async fn open(kv: Arc<dyn KeyValueStore>) -> JsonSubjectStore {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let storage = Arc::new(JsonStorage::new(kv, clock.clone(), 30));
        JsonSubjectStore::load(storage, clock, Arc::new(UuidGenerator))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn subjects_persist_across_reloads() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let store = open(kv.clone()).await;
        let created = store
            .create(NewSubject {
                name: "Biology".to_string(),
                target_time: 3600,
                ..NewSubject::default()
            })
            .await
            .unwrap();

        let reloaded = open(kv.clone()).await;
        let loaded = reloaded.get(created.id).await.unwrap().unwrap();
        assert_eq!(loaded, created);
        assert!(kv.get_item(SUBJECTS_KEY).await.unwrap().unwrap().contains("NOT_STARTED"));
    }

    #[tokio::test]
    async fn failed_write_leaves_cache_untouched() {
        let kv = Arc::new(MemoryKeyValueStore::with_quota(32));
        let store = open(kv).await;

        let result = store
            .create(NewSubject {
                name: "A subject whose record can never fit".to_string(),
                target_time: 60,
                ..NewSubject::default()
            })
            .await;

        assert!(matches!(result, Err(PortError::Persistence(_))));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn study_time_is_credited_and_logged_as_session() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let store = open(kv).await;
        let subject = store
            .create(NewSubject {
                name: "History".to_string(),
                target_time: 1800,
                ..NewSubject::default()
            })
            .await
            .unwrap();

        let updated = store.add_study_time(subject.id, 1800).await.unwrap();
        assert_eq!(updated.status, SubjectStatus::Completed);
        assert!(updated.last_study_date.is_some());

        let today = updated.last_study_date.unwrap().date_naive();
        let sessions = store.sessions_on(today).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration, 1800);
        assert_eq!(sessions[0].subject_id, subject.id);

        assert!(matches!(
            store.add_study_time(subject.id, 0).await,
            Err(PortError::Invalid(_))
        ));
    }

    async fn history(store: &JsonSubjectStore) -> Subject {
        store
            .create(NewSubject {
                name: "History".to_string(),
                target_time: 1800,
                ..NewSubject::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn oversized_study_time_is_rejected_without_side_effects() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let store = open(kv.clone()).await;
        let subject = history(&store).await;
        let today = subject.created_at.date_naive();

        for seconds in [100_000_000_000_000_000, u64::MAX] {
            let result = store.add_study_time(subject.id, seconds).await;
            assert!(matches!(result, Err(PortError::Invalid(_))));
        }

        assert_eq!(store.get(subject.id).await.unwrap().unwrap(), subject);
        assert!(store.sessions_on(today).await.unwrap().is_empty());
        let reloaded = open(kv).await;
        assert_eq!(reloaded.get(subject.id).await.unwrap().unwrap(), subject);
    }

    #[tokio::test]
    async fn failed_session_write_leaves_subject_unchanged() {
        let kv = Arc::new(FailingKeyValueStore::new());
        let store = open(kv.clone()).await;
        let subject = history(&store).await;

        kv.fail_writes_to(SESSIONS_KEY_PREFIX);
        let result = store.add_study_time(subject.id, 600).await;
        assert!(matches!(result, Err(PortError::Persistence(_))));

        assert_eq!(store.get(subject.id).await.unwrap().unwrap(), subject);
        kv.heal();
        let reloaded = open(kv).await;
        assert_eq!(reloaded.get(subject.id).await.unwrap().unwrap().time_spent, 0);
    }

    #[tokio::test]
    async fn failed_subject_write_rolls_back_the_session() {
        let kv = Arc::new(FailingKeyValueStore::new());
        let store = open(kv.clone()).await;
        let subject = history(&store).await;
        let first = store.add_study_time(subject.id, 300).await.unwrap();
        let today = first.last_study_date.unwrap().date_naive();

        kv.fail_writes_to(SUBJECTS_KEY);
        let result = store.add_study_time(subject.id, 600).await;
        assert!(matches!(result, Err(PortError::Persistence(_))));

        let sessions = store.sessions_on(today).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration, 300);
        assert_eq!(store.get(subject.id).await.unwrap().unwrap().time_spent, 300);
    }
}
