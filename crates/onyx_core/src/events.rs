//! crates/onyx_core/src/events.rs
//!
//! Synchronous publish/subscribe bus used to tell UI consumers that linkage
//! changed. Handlers run inline on the publishing call, in subscription order.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error};
use uuid::Uuid;

use crate::listeners::{ListenerSet, Subscription};

//=========================================================================================
// Topics and Payloads
//=========================================================================================

/// The event names handlers subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    LinkageChanged,
    SubjectsRefresh,
    TimersRefresh,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::LinkageChanged, Topic::SubjectsRefresh, Topic::TimersRefresh];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::LinkageChanged => "linkage:changed",
            Topic::SubjectsRefresh => "subjects:refresh",
            Topic::TimersRefresh => "timers:refresh",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkageKind {
    Link,
    Unlink,
}

impl LinkageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkageKind::Link => "link",
            LinkageKind::Unlink => "unlink",
        }
    }
}

/// Payload of a [`Topic::LinkageChanged`] event.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkageChange {
    pub kind: LinkageKind,
    pub subject_id: Uuid,
    pub timer_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    LinkageChanged(LinkageChange),
    SubjectsRefresh,
    TimersRefresh,
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::LinkageChanged(_) => Topic::LinkageChanged,
            Event::SubjectsRefresh => Topic::SubjectsRefresh,
            Event::TimersRefresh => Topic::TimersRefresh,
        }
    }
}

//=========================================================================================
// EventBus
//=========================================================================================

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerFn = dyn Fn(&Event) -> Result<(), HandlerError> + Send + Sync;

/// A subscribed handler. Registering the same `Arc` twice on one topic has no effect.
pub type Handler = Arc<HandlerFn>;

/// In-process fan-out bus with direct, synchronous dispatch.
///
/// Cloning is cheap; every clone shares the same subscriber set.
#[derive(Clone, Default)]
pub struct EventBus {
    topics: Arc<Mutex<HashMap<Topic, ListenerSet<HandlerFn>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: Topic, handler: Handler) -> Subscription {
        self.set_for(topic).add(handler)
    }

    /// Invokes every handler currently registered for the event's topic.
    ///
    /// A handler that fails or panics is logged; the remaining handlers still run
    /// and nothing is returned to the publisher.
    pub fn publish(&self, event: Event) {
        let topic = event.topic();
        let handlers = match self.lock().get(&topic) {
            Some(set) => set.snapshot(),
            None => return,
        };
        if handlers.is_empty() {
            return;
        }

        debug!(%topic, handlers = handlers.len(), "Publishing event");
        let mut delivered = 0usize;
        for handler in &handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => error!(%topic, "Event handler failed: {}", e),
                Err(_) => error!(%topic, "Event handler panicked"),
            }
        }
        debug!(%topic, delivered, total = handlers.len(), "Event delivered");
    }

    /// Publishes a linkage change stamped `at`, followed by the two coarse refresh signals.
    pub fn publish_linkage_change(
        &self,
        kind: LinkageKind,
        subject_id: Uuid,
        timer_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) {
        self.publish(Event::LinkageChanged(LinkageChange {
            kind,
            subject_id,
            timer_id,
            timestamp: at,
        }));
        self.publish(Event::SubjectsRefresh);
        self.publish(Event::TimersRefresh);
    }

    /// Number of handlers per topic, for diagnostics.
    pub fn stats(&self) -> HashMap<Topic, usize> {
        self.lock()
            .iter()
            .map(|(topic, set)| (*topic, set.len()))
            .collect()
    }

    fn set_for(&self, topic: Topic) -> ListenerSet<HandlerFn> {
        self.lock().entry(topic).or_default().clone()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Topic, ListenerSet<HandlerFn>>> {
        self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus").field("handlers", &self.stats()).finish()
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> Handler {
        let log = log.clone();
        Arc::new(move |event: &Event| -> Result<(), HandlerError> {
            log.lock().unwrap().push(format!("{label}:{}", event.topic()));
            Ok(())
        })
    }

    #[test]
    fn handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = bus.subscribe(Topic::SubjectsRefresh, recorder(&log, "a"));
        let _b = bus.subscribe(Topic::SubjectsRefresh, recorder(&log, "b"));

        bus.publish(Event::SubjectsRefresh);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:subjects:refresh", "b:subjects:refresh"]
        );
    }

    #[test]
    fn failing_and_panicking_handlers_do_not_stop_delivery() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _err = bus.subscribe(
            Topic::TimersRefresh,
            Arc::new(|_: &Event| -> Result<(), HandlerError> {
                Err("handler rejected event".into())
            }),
        );
        let _panic = bus.subscribe(
            Topic::TimersRefresh,
            Arc::new(|_: &Event| -> Result<(), HandlerError> { panic!("boom") }),
        );
        let _ok = bus.subscribe(Topic::TimersRefresh, recorder(&log, "ok"));

        bus.publish(Event::TimersRefresh);

        assert_eq!(*log.lock().unwrap(), vec!["ok:timers:refresh"]);
    }

    #[test]
    fn same_handler_twice_is_delivered_once() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = recorder(&log, "h");
        let _first = bus.subscribe(Topic::SubjectsRefresh, handler.clone());
        let _second = bus.subscribe(Topic::SubjectsRefresh, handler);

        bus.publish(Event::SubjectsRefresh);

        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(bus.stats().get(&Topic::SubjectsRefresh), Some(&1));
    }

    #[test]
    fn unsubscribed_handler_is_not_called() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sub = bus.subscribe(Topic::SubjectsRefresh, recorder(&log, "gone"));
        sub.unsubscribe();

        bus.publish(Event::SubjectsRefresh);

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn linkage_change_publishes_three_events_in_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let subs: Vec<_> = Topic::ALL
            .iter()
            .map(|topic| bus.subscribe(*topic, recorder(&log, "all")))
            .collect();

        let payloads = Arc::new(Mutex::new(Vec::new()));
        let sink = payloads.clone();
        let _payload = bus.subscribe(
            Topic::LinkageChanged,
            Arc::new(move |event: &Event| -> Result<(), HandlerError> {
                if let Event::LinkageChanged(change) = event {
                    sink.lock().unwrap().push(change.clone());
                }
                Ok(())
            }),
        );

        let subject_id = Uuid::new_v4();
        let timer_id = Uuid::new_v4();
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        bus.publish_linkage_change(LinkageKind::Link, subject_id, Some(timer_id), at);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "all:linkage:changed",
                "all:subjects:refresh",
                "all:timers:refresh"
            ]
        );
        let payloads = payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].kind, LinkageKind::Link);
        assert_eq!(payloads[0].subject_id, subject_id);
        assert_eq!(payloads[0].timer_id, Some(timer_id));
        assert_eq!(payloads[0].timestamp, at);

        for sub in subs {
            sub.unsubscribe();
        }
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(Event::TimersRefresh);
    }
}
