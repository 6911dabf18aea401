//! crates/onyx_core/src/link_manager.rs
//!
//! Owns every algorithm that creates, severs or repairs the 1:1 link between a
//! subject and a timer. It operates on ids and the two store ports only; UI code
//! must go through these operations instead of writing the link fields itself.
//!
//! Mutating operations are serialized through a single async mutex so that two
//! overlapping requests cannot interleave their reads and writes.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{LinkedSubjectRef, QuickTimerConfig, Subject, SubjectPatch, Timer, TimerMode, TimerPatch};
use crate::events::{Event, EventBus, LinkageKind};
use crate::ports::{Clock, EntityKind, PortError, PortResult, SubjectStore, TimerStore};

//=========================================================================================
// Reports
//=========================================================================================

/// Why a subject lost its timer; drives the wording of the conversion note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionReason {
    /// The subject was explicitly unlinked.
    Unlinked,
    /// The timer was linked to another subject.
    Reassigned,
    /// The timer was deleted.
    Deleted,
}

/// Audit string recorded on a subject after an automatic conversion.
pub fn conversion_note(timer_title: Option<&str>, reason: ConversionReason, at: DateTime<Utc>) -> String {
    let title = timer_title.unwrap_or("unknown");
    let when = at.format("%Y-%m-%d %H:%M:%S UTC");
    match reason {
        ConversionReason::Unlinked => {
            format!("Timer \"{title}\" unlinked on {when} and converted to a quick timer")
        }
        ConversionReason::Reassigned => format!(
            "Timer \"{title}\" linked to another subject on {when}; converted to a quick timer"
        ),
        ConversionReason::Deleted => {
            format!("Timer \"{title}\" deleted on {when} and converted to a quick timer")
        }
    }
}

/// A stored reference that does not resolve to an existing entity.
#[derive(Debug, Clone, PartialEq)]
pub struct OrphanedReference {
    /// The entity holding the stale reference.
    pub kind: EntityKind,
    pub id: Uuid,
    /// The id it points to.
    pub missing_id: Uuid,
    pub issue: String,
}

/// Cross-reference of both stores, for diagnostics and UI.
#[derive(Debug, Clone, Default)]
pub struct LinkageStatus {
    pub linked: Vec<(Subject, Timer)>,
    pub unlinked_subjects: Vec<Subject>,
    pub unlinked_timers: Vec<Timer>,
    pub orphaned_references: Vec<OrphanedReference>,
}

/// Ids touched by a consistency pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyRepair {
    pub subjects_repaired: Vec<Uuid>,
    pub timers_repaired: Vec<Uuid>,
}

impl ConsistencyRepair {
    pub fn is_empty(&self) -> bool {
        self.subjects_repaired.is_empty() && self.timers_repaired.is_empty()
    }
}

//=========================================================================================
// LinkManager
//=========================================================================================

pub struct LinkManager {
    pub(crate) subjects: Arc<dyn SubjectStore>,
    pub(crate) timers: Arc<dyn TimerStore>,
    pub(crate) bus: EventBus,
    pub(crate) clock: Arc<dyn Clock>,
    gate: Mutex<()>,
}

impl LinkManager {
    pub fn new(
        subjects: Arc<dyn SubjectStore>,
        timers: Arc<dyn TimerStore>,
        bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subjects,
            timers,
            bus,
            clock,
            gate: Mutex::new(()),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub(crate) async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    async fn require_subject(&self, id: Uuid) -> PortResult<Subject> {
        self.subjects
            .get(id)
            .await?
            .ok_or_else(|| PortError::subject_not_found(id))
    }

    async fn require_timer(&self, id: Uuid) -> PortResult<Timer> {
        self.timers
            .get(id)
            .await?
            .ok_or_else(|| PortError::timer_not_found(id))
    }

    /// Clears the subject's link and switches it to its own quick-timer configuration.
    async fn convert_to_quick_timer(
        &self,
        subject: &Subject,
        source: Option<&Timer>,
        reason: ConversionReason,
    ) -> PortResult<Subject> {
        let now = self.clock.now();
        let quick = match source {
            Some(timer) => QuickTimerConfig::from_timer(timer),
            None => QuickTimerConfig::from_default_duration(subject.default_timer_duration),
        };
        debug!(subject_id = %subject.id, ?reason, "Converting subject to quick timer");
        self.subjects
            .update(
                subject.id,
                SubjectPatch {
                    linked_timer_id: Some(None),
                    default_timer_mode: Some(TimerMode::QuickTimer),
                    quick_timer_config: Some(Some(quick)),
                    timer_conversion_note: Some(Some(conversion_note(
                        source.map(|t| t.title.as_str()),
                        reason,
                        now,
                    ))),
                    ..SubjectPatch::default()
                },
            )
            .await
    }

    async fn clear_back_reference(&self, timer_id: Uuid) -> PortResult<Timer> {
        self.timers
            .update(
                timer_id,
                TimerPatch {
                    linked_subject: Some(None),
                    last_used: Some(self.clock.now()),
                    ..TimerPatch::default()
                },
            )
            .await
    }

    //-------------------------------------------------------------------------------------
    // Mutations
    //-------------------------------------------------------------------------------------

    /// Links `subject_id` to `timer_id`, severing whatever either side was linked to.
    ///
    /// A subject that previously held the timer is converted to a quick timer built
    /// from the timer's configuration. Calling it again with an already linked pair
    /// only re-asserts the link.
    pub async fn link_subject_to_timer(&self, subject_id: Uuid, timer_id: Uuid) -> PortResult<()> {
        let _gate = self.exclusive().await;

        let subject = self.require_subject(subject_id).await?;
        let timer = self.require_timer(timer_id).await?;
        let all_subjects = self.subjects.list().await?;
        let all_timers = self.timers.list().await?;

        // 1. Other subjects holding this timer lose it.
        for other in all_subjects
            .iter()
            .filter(|s| s.id != subject_id && s.linked_timer_id == Some(timer_id))
        {
            info!(subject_id = %other.id, %timer_id, "Timer reassigned; converting previous subject");
            self.convert_to_quick_timer(other, Some(&timer), ConversionReason::Reassigned)
                .await?;
        }

        // 2. Other timers pointing back at this subject are released.
        for other in all_timers
            .iter()
            .filter(|t| t.id != timer_id && t.linked_subject_id() == Some(subject_id))
        {
            debug!(timer_id = %other.id, %subject_id, "Releasing previous timer of subject");
            self.clear_back_reference(other.id).await?;
        }

        // 3. The subject now runs the linked timer.
        let linked = self
            .subjects
            .update(
                subject_id,
                SubjectPatch {
                    linked_timer_id: Some(Some(timer_id)),
                    default_timer_mode: Some(TimerMode::Simple),
                    quick_timer_config: Some(None),
                    timer_conversion_note: Some(None),
                    ..SubjectPatch::default()
                },
            )
            .await?;

        // 4. The timer points back at the fresh subject.
        self.timers
            .update(
                timer_id,
                TimerPatch {
                    linked_subject: Some(Some(LinkedSubjectRef::from(&linked))),
                    last_used: Some(self.clock.now()),
                    ..TimerPatch::default()
                },
            )
            .await?;

        info!(
            %subject_id,
            %timer_id,
            "Linked subject \"{}\" to timer \"{}\"",
            subject.name,
            timer.title
        );
        self.bus.publish_linkage_change(
            LinkageKind::Link,
            subject_id,
            Some(timer_id),
            self.clock.now(),
        );
        Ok(())
    }

    /// Detaches the subject from its timer and converts it to a quick timer.
    ///
    /// A subject with no linked timer is left untouched and no event is published.
    pub async fn unlink_subject(&self, subject_id: Uuid) -> PortResult<()> {
        let _gate = self.exclusive().await;

        let subject = self.require_subject(subject_id).await?;
        let Some(timer_id) = subject.linked_timer_id else {
            debug!(%subject_id, "Subject has no linked timer; nothing to unlink");
            return Ok(());
        };

        let timer = self.timers.get(timer_id).await?;
        if let Some(timer) = timer.as_ref() {
            if timer.linked_subject_id() == Some(subject_id) {
                self.clear_back_reference(timer.id).await?;
            }
        }
        self.convert_to_quick_timer(&subject, timer.as_ref(), ConversionReason::Unlinked)
            .await?;

        info!(%subject_id, %timer_id, "Unlinked subject \"{}\"", subject.name);
        self.bus.publish_linkage_change(
            LinkageKind::Unlink,
            subject_id,
            Some(timer_id),
            self.clock.now(),
        );
        Ok(())
    }

    /// Permanently removes a timer, converting every subject that referenced it.
    ///
    /// Returns `false` when the timer did not exist.
    pub async fn handle_timer_deletion(&self, timer_id: Uuid) -> PortResult<bool> {
        let _gate = self.exclusive().await;
        self.delete_timer_locked(timer_id).await
    }

    async fn delete_timer_locked(&self, timer_id: Uuid) -> PortResult<bool> {
        let Some(timer) = self.timers.get(timer_id).await? else {
            debug!(%timer_id, "Timer already gone");
            return Ok(false);
        };

        let referencing: Vec<Subject> = self
            .subjects
            .list()
            .await?
            .into_iter()
            .filter(|s| s.linked_timer_id == Some(timer_id))
            .collect();

        for subject in &referencing {
            self.convert_to_quick_timer(subject, Some(&timer), ConversionReason::Deleted)
                .await?;
        }
        self.timers.remove(timer_id).await?;

        info!(
            %timer_id,
            converted = referencing.len(),
            "Deleted timer \"{}\"",
            timer.title
        );
        if referencing.is_empty() {
            self.bus.publish(Event::TimersRefresh);
        } else {
            let now = self.clock.now();
            for subject in &referencing {
                self.bus
                    .publish_linkage_change(LinkageKind::Unlink, subject.id, Some(timer_id), now);
            }
        }
        Ok(true)
    }

    /// Removes a subject after releasing any timer that points back at it.
    ///
    /// Returns `false` when the subject did not exist.
    pub async fn handle_subject_deletion(&self, subject_id: Uuid) -> PortResult<bool> {
        let _gate = self.exclusive().await;

        let Some(subject) = self.subjects.get(subject_id).await? else {
            debug!(%subject_id, "Subject already gone");
            return Ok(false);
        };

        let mut released = None;
        if subject.linked_timer_id.is_some() {
            for timer in self
                .timers
                .list()
                .await?
                .iter()
                .filter(|t| t.linked_subject_id() == Some(subject_id))
            {
                self.clear_back_reference(timer.id).await?;
                released = Some(timer.id);
            }
        }
        self.subjects.remove(subject_id).await?;

        info!(%subject_id, "Deleted subject \"{}\"", subject.name);
        match subject.linked_timer_id {
            Some(timer_id) => {
                self.bus.publish_linkage_change(
                    LinkageKind::Unlink,
                    subject_id,
                    released.or(Some(timer_id)),
                    self.clock.now(),
                );
            }
            None => self.bus.publish(Event::SubjectsRefresh),
        }
        Ok(true)
    }

    /// Marks a timer run as finished. Ephemeral timers are deleted afterwards.
    pub async fn complete_timer_run(&self, timer_id: Uuid) -> PortResult<()> {
        let _gate = self.exclusive().await;

        let timer = self.require_timer(timer_id).await?;
        if timer.is_ephemeral {
            debug!(%timer_id, "Ephemeral timer finished; deleting");
            self.delete_timer_locked(timer_id).await?;
        } else {
            self.timers
                .update(
                    timer_id,
                    TimerPatch {
                        last_used: Some(self.clock.now()),
                        ..TimerPatch::default()
                    },
                )
                .await?;
            self.bus.publish(Event::TimersRefresh);
        }
        Ok(())
    }

    /// Rewrites the back-reference snapshot on timers linked to the subject,
    /// e.g. after a rename. Returns the number of timers updated.
    pub async fn sync_subject_info_to_linked_timers(&self, subject_id: Uuid) -> PortResult<usize> {
        let _gate = self.exclusive().await;

        let subject = self.require_subject(subject_id).await?;
        let reference = LinkedSubjectRef::from(&subject);
        let mut synced = 0;
        for timer in self
            .timers
            .list()
            .await?
            .into_iter()
            .filter(|t| t.linked_subject_id() == Some(subject_id))
        {
            if timer.linked_subject.as_ref() == Some(&reference) {
                continue;
            }
            self.timers
                .update(
                    timer.id,
                    TimerPatch {
                        linked_subject: Some(Some(reference.clone())),
                        ..TimerPatch::default()
                    },
                )
                .await?;
            synced += 1;
        }
        if synced > 0 {
            debug!(%subject_id, synced, "Refreshed linked subject snapshots");
            self.bus.publish(Event::TimersRefresh);
        }
        Ok(synced)
    }

    /// Clears every link field that points at a missing entity.
    ///
    /// Subjects lose only `linked_timer_id`: with the timer gone there is no duration
    /// to convert. Nothing is written and nothing published when the data is consistent.
    pub async fn ensure_data_consistency(&self) -> PortResult<ConsistencyRepair> {
        let _gate = self.exclusive().await;

        let subjects = self.subjects.list().await?;
        let timers = self.timers.list().await?;
        let mut repair = ConsistencyRepair::default();

        for subject in &subjects {
            let Some(timer_id) = subject.linked_timer_id else {
                continue;
            };
            if !timers.iter().any(|t| t.id == timer_id) {
                warn!(subject_id = %subject.id, %timer_id, "Subject references a missing timer; clearing");
                self.clear_subject_link(subject.id).await?;
                repair.subjects_repaired.push(subject.id);
            }
        }

        for timer in &timers {
            let Some(subject_id) = timer.linked_subject_id() else {
                continue;
            };
            if !subjects.iter().any(|s| s.id == subject_id) {
                warn!(timer_id = %timer.id, %subject_id, "Timer references a missing subject; clearing");
                self.clear_timer_link(timer.id).await?;
                repair.timers_repaired.push(timer.id);
            }
        }

        if !repair.subjects_repaired.is_empty() {
            self.bus.publish(Event::SubjectsRefresh);
        }
        if !repair.timers_repaired.is_empty() {
            self.bus.publish(Event::TimersRefresh);
        }
        if repair.is_empty() {
            debug!("Linkage is consistent");
        }
        Ok(repair)
    }

    pub(crate) async fn clear_subject_link(&self, subject_id: Uuid) -> PortResult<Subject> {
        self.subjects
            .update(
                subject_id,
                SubjectPatch {
                    linked_timer_id: Some(None),
                    ..SubjectPatch::default()
                },
            )
            .await
    }

    pub(crate) async fn clear_timer_link(&self, timer_id: Uuid) -> PortResult<Timer> {
        self.timers
            .update(
                timer_id,
                TimerPatch {
                    linked_subject: Some(None),
                    ..TimerPatch::default()
                },
            )
            .await
    }

    //-------------------------------------------------------------------------------------
    // Queries
    //-------------------------------------------------------------------------------------

    /// Non-ephemeral timers that are unlinked or already linked to `subject_id`.
    pub async fn available_timers_for_subject(&self, subject_id: Option<Uuid>) -> PortResult<Vec<Timer>> {
        Ok(self
            .timers
            .list()
            .await?
            .into_iter()
            .filter(|t| !t.is_ephemeral)
            .filter(|t| match t.linked_subject_id() {
                None => true,
                Some(linked) => Some(linked) == subject_id,
            })
            .collect())
    }

    /// The timer whose back-reference names `subject_id`, if any.
    pub async fn linked_timer_for_subject(&self, subject_id: Uuid) -> PortResult<Option<Timer>> {
        Ok(self
            .timers
            .list()
            .await?
            .into_iter()
            .find(|t| t.linked_subject_id() == Some(subject_id)))
    }

    pub async fn linkage_status(&self) -> PortResult<LinkageStatus> {
        let subjects = self.subjects.list().await?;
        let timers = self.timers.list().await?;
        Ok(compute_linkage_status(subjects, timers))
    }
}

pub(crate) fn compute_linkage_status(subjects: Vec<Subject>, timers: Vec<Timer>) -> LinkageStatus {
    let mut status = LinkageStatus::default();

    for subject in subjects.iter() {
        match subject.linked_timer_id {
            None => status.unlinked_subjects.push(subject.clone()),
            Some(timer_id) => match timers.iter().find(|t| t.id == timer_id) {
                Some(timer) => status.linked.push((subject.clone(), timer.clone())),
                None => status.orphaned_references.push(OrphanedReference {
                    kind: EntityKind::Subject,
                    id: subject.id,
                    missing_id: timer_id,
                    issue: format!("references missing timer {timer_id}"),
                }),
            },
        }
    }

    for timer in timers.iter() {
        if let Some(subject_id) = timer.linked_subject_id() {
            if !subjects.iter().any(|s| s.id == subject_id) {
                status.orphaned_references.push(OrphanedReference {
                    kind: EntityKind::Timer,
                    id: timer.id,
                    missing_id: subject_id,
                    issue: format!("references missing subject {subject_id}"),
                });
            }
        }
        let in_pair = status.linked.iter().any(|(_, t)| t.id == timer.id);
        if !in_pair {
            status.unlinked_timers.push(timer.clone());
        }
    }

    status
}

//=========================================================================================
// Tests
//=========================================================================================
