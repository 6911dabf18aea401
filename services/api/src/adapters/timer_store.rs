//! services/api/src/adapters/timer_store.rs
//!
//! `TimerStore` persisted as a JSON array under `onyx_active_timers`, with the
//! sequential naming counter kept under `onyx_timer_counter`.

use async_trait::async_trait;
use onyx_core::domain::{NewTimer, Timer, TimerPatch};
use onyx_core::listeners::{Listener, ListenerSet, Subscription};
use onyx_core::ports::{Clock, IdGenerator, PortError, PortResult, TimerStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::records::TimerRecord;
use crate::adapters::storage::{JsonStorage, TIMERS_KEY, TIMER_COUNTER_KEY};

struct State {
    timers: Vec<Timer>,
    /// Number given to the next untitled timer.
    counter: u64,
}

pub struct JsonTimerStore {
    storage: Arc<JsonStorage>,
    state: RwLock<State>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    listeners: ListenerSet<dyn Fn() + Send + Sync>,
}

impl JsonTimerStore {
    pub async fn load(
        storage: Arc<JsonStorage>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> PortResult<Self> {
        let records: Vec<TimerRecord> = storage.load(TIMERS_KEY).await?;
        let timers: Vec<Timer> = records.into_iter().map(TimerRecord::to_domain).collect();
        let counter = storage
            .load::<Option<u64>>(TIMER_COUNTER_KEY)
            .await?
            .filter(|n| *n > 0)
            .unwrap_or(1);
        info!(count = timers.len(), next_number = counter, "Loaded timers");
        Ok(Self {
            storage,
            state: RwLock::new(State { timers, counter }),
            clock,
            ids,
            listeners: ListenerSet::new(),
        })
    }

    async fn persist(&self, timers: &[Timer]) -> PortResult<()> {
        let records: Vec<TimerRecord> = timers.iter().map(TimerRecord::from).collect();
        self.storage.save(TIMERS_KEY, &records).await
    }
}

#[async_trait]
impl TimerStore for JsonTimerStore {
    async fn list(&self) -> PortResult<Vec<Timer>> {
        Ok(self.state.read().await.timers.clone())
    }

    async fn get(&self, id: Uuid) -> PortResult<Option<Timer>> {
        Ok(self
            .state
            .read()
            .await
            .timers
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn create(&self, new: NewTimer) -> PortResult<Timer> {
        let timer = {
            let mut state = self.state.write().await;
            let id = self.ids.next_id();
            if state.timers.iter().any(|t| t.id == id) {
                return Err(PortError::Conflict(format!("timer {id} already exists")));
            }

            let numbered = new.title.as_deref().map_or(true, |t| t.trim().is_empty());
            let title = match new.title.filter(|_| !numbered) {
                Some(title) => title,
                None => format!("Timer {}", state.counter),
            };

            let now = self.clock.now();
            let timer = Timer {
                id,
                title,
                config: new.config,
                is_pomodoro_mode: new.is_pomodoro_mode,
                max_cycles: new.max_cycles,
                created_at: now,
                last_used: now,
                is_ephemeral: new.is_ephemeral,
                linked_subject: None,
            };
            let mut next = state.timers.clone();
            next.push(timer.clone());
            self.persist(&next).await?;
            state.timers = next;

            // The number is only consumed once the timer itself is stored.
            if numbered {
                state.counter += 1;
                if let Err(e) = self.storage.save(TIMER_COUNTER_KEY, &state.counter).await {
                    warn!(next_number = state.counter, "Could not persist timer counter: {}", e);
                }
            }
            timer
        };
        debug!(timer_id = %timer.id, ephemeral = timer.is_ephemeral, "Created timer \"{}\"", timer.title);
        self.listeners.notify();
        Ok(timer)
    }

    async fn update(&self, id: Uuid, patch: TimerPatch) -> PortResult<Timer> {
        let updated = {
            let mut state = self.state.write().await;
            let mut next = state.timers.clone();
            let timer = next
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| PortError::timer_not_found(id))?;
            patch.apply(timer);
            let updated = timer.clone();
            self.persist(&next).await?;
            state.timers = next;
            updated
        };
        self.listeners.notify();
        Ok(updated)
    }

    async fn remove(&self, id: Uuid) -> PortResult<()> {
        {
            let mut state = self.state.write().await;
            let next: Vec<Timer> = state.timers.iter().filter(|t| t.id != id).cloned().collect();
            self.persist(&next).await?;
            state.timers = next;
        }
        self.listeners.notify();
        Ok(())
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
    use onyx_core::domain::{LinkedSubjectRef, TimerConfig};
    use onyx_core::ports::{KeyValueStore, SystemClock, UuidGenerator};

    async fn open(kv: Arc<dyn KeyValueStore>) -> JsonTimerStore {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let storage = Arc::new(JsonStorage::new(kv, clock.clone(), 30));
        JsonTimerStore::load(storage, clock, Arc::new(UuidGenerator))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn counter_survives_reload() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let store = open(kv.clone()).await;
        assert_eq!(store.create(NewTimer::default()).await.unwrap().title, "Timer 1");
        assert_eq!(store.create(NewTimer::default()).await.unwrap().title, "Timer 2");

        let reloaded = open(kv).await;
        assert_eq!(reloaded.list().await.unwrap().len(), 2);
        assert_eq!(reloaded.create(NewTimer::default()).await.unwrap().title, "Timer 3");
    }

    #[tokio::test]
    async fn back_reference_and_ephemeral_flag_round_trip() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let store = open(kv.clone()).await;
        let timer = store
            .create(NewTimer {
                title: Some("Sprint".to_string()),
                config: TimerConfig::default(),
                is_ephemeral: true,
                ..NewTimer::default()
            })
            .await
            .unwrap();
        let subject = LinkedSubjectRef {
            id: Uuid::new_v4(),
            name: "Latin".to_string(),
        };
        store
            .update(
                timer.id,
                TimerPatch {
                    linked_subject: Some(Some(subject.clone())),
                    ..TimerPatch::default()
                },
            )
            .await
            .unwrap();

        let reloaded = open(kv).await.get(timer.id).await.unwrap().unwrap();
        assert!(reloaded.is_ephemeral);
        assert_eq!(reloaded.linked_subject, Some(subject));
    }

    #[tokio::test]
    async fn update_of_missing_timer_is_not_found() {
        let store = open(Arc::new(MemoryKeyValueStore::new())).await;
        let missing = Uuid::new_v4();
        let err = store.update(missing, TimerPatch::default()).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound { id, .. } if id == missing));
    }

    #[tokio::test]
    async fn failed_create_does_not_consume_a_number() {
        let kv = Arc::new(FailingKeyValueStore::new());
        let store = open(kv.clone()).await;

        kv.fail_writes_to(TIMERS_KEY);
        assert!(matches!(
            store.create(NewTimer::default()).await,
            Err(PortError::Persistence(_))
        ));
        assert!(store.list().await.unwrap().is_empty());

        kv.heal();
        assert_eq!(store.create(NewTimer::default()).await.unwrap().title, "Timer 1");
        let reloaded = open(kv).await;
        assert_eq!(reloaded.create(NewTimer::default()).await.unwrap().title, "Timer 2");
    }

    #[tokio::test]
    async fn counter_write_failure_still_creates_the_timer() {
        let kv = Arc::new(FailingKeyValueStore::new());
        let store = open(kv.clone()).await;

        kv.fail_writes_to(TIMER_COUNTER_KEY);
        assert_eq!(store.create(NewTimer::default()).await.unwrap().title, "Timer 1");
        assert_eq!(store.create(NewTimer::default()).await.unwrap().title, "Timer 2");
        assert_eq!(store.list().await.unwrap().len(), 2);
    }
}
