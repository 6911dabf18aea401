pub mod diagnostics;
pub mod domain;
pub mod events;
pub mod link_manager;
pub mod listeners;
pub mod memory;
pub mod ports;
pub mod progress;

pub use diagnostics::{DiagnosticReport, DiagnosticStatus, Issue, RepairOutcome};
pub use domain::{
    LinkedSubjectRef, NewSubject, NewTimer, QuickTimerConfig, StudySession, Subject, SubjectPatch,
    SubjectStatus, Timer, TimerConfig, TimerMode, TimerPatch,
};
pub use events::{Event, EventBus, Handler, HandlerError, LinkageChange, LinkageKind, Topic};
pub use link_manager::{ConsistencyRepair, LinkManager, LinkageStatus, OrphanedReference};
pub use listeners::{Listener, Subscription};
pub use progress::{DailyProgress, DayTotal, SubjectsOverview, WeeklyStats};
pub use ports::{
    Clock, EntityKind, IdGenerator, KeyValueStore, PortError, PortResult, StorageError, SubjectStore,
    SystemClock, TimerStore, UuidGenerator,
};
