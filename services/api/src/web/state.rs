//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and how it is assembled from a
//! key-value backend.

use crate::adapters::{JsonStorage, JsonSubjectStore, JsonTimerStore};
use crate::config::Config;
use onyx_core::events::EventBus;
use onyx_core::link_manager::LinkManager;
use onyx_core::ports::{
    Clock, IdGenerator, KeyValueStore, PortResult, SubjectStore, SystemClock, TimerStore,
    UuidGenerator,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<JsonStorage>,
    pub subjects: Arc<dyn SubjectStore>,
    pub timers: Arc<dyn TimerStore>,
    pub links: Arc<LinkManager>,
    pub bus: EventBus,
    /// Supplies "today" for the progress endpoints.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Loads both stores from `kv` and wires them to a fresh link manager.
    pub async fn assemble(config: Arc<Config>, kv: Arc<dyn KeyValueStore>) -> PortResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ids: Arc<dyn IdGenerator> = Arc::new(UuidGenerator);
        let storage = Arc::new(JsonStorage::new(kv, clock.clone(), config.session_retention_days));

        let subjects: Arc<dyn SubjectStore> =
            Arc::new(JsonSubjectStore::load(storage.clone(), clock.clone(), ids.clone()).await?);
        let timers: Arc<dyn TimerStore> =
            Arc::new(JsonTimerStore::load(storage.clone(), clock.clone(), ids).await?);

        let bus = EventBus::new();
        let links = Arc::new(LinkManager::new(
            subjects.clone(),
            timers.clone(),
            bus.clone(),
            clock.clone(),
        ));

        Ok(Self {
            config,
            storage,
            subjects,
            timers,
            links,
            bus,
            clock,
        })
    }
}
