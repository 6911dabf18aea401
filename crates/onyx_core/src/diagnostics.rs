//! crates/onyx_core/src/diagnostics.rs
//!
//! Read-only linkage diagnosis and the targeted repair built on top of it.

use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Subject, Timer};
use crate::events::Event;
use crate::link_manager::{compute_linkage_status, LinkManager, LinkageStatus};
use crate::ports::PortResult;

/// Overall health of the linkage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticStatus {
    Ok,
    /// Only asymmetric references were found; every id still resolves.
    Warning,
    /// At least one reference points at an entity that does not exist.
    Error,
}

/// A single consistency violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    SubjectReferencesMissingTimer { subject_id: Uuid, timer_id: Uuid },
    TimerReferencesMissingSubject { timer_id: Uuid, subject_id: Uuid },
    /// The subject names the timer, but the timer points elsewhere.
    SubjectNotReciprocated { subject_id: Uuid, timer_id: Uuid },
    /// The timer names the subject, but the subject points elsewhere.
    TimerNotReciprocated { timer_id: Uuid, subject_id: Uuid },
}

impl Issue {
    fn is_dangling(&self) -> bool {
        matches!(
            self,
            Issue::SubjectReferencesMissingTimer { .. } | Issue::TimerReferencesMissingSubject { .. }
        )
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::SubjectReferencesMissingTimer { subject_id, timer_id } => write!(
                f,
                "subject {subject_id} references non-existent timer {timer_id}"
            ),
            Issue::TimerReferencesMissingSubject { timer_id, subject_id } => write!(
                f,
                "timer {timer_id} references non-existent subject {subject_id}"
            ),
            Issue::SubjectNotReciprocated { subject_id, timer_id } => write!(
                f,
                "subject {subject_id} is linked to timer {timer_id}, but the timer does not link back"
            ),
            Issue::TimerNotReciprocated { timer_id, subject_id } => write!(
                f,
                "timer {timer_id} is linked to subject {subject_id}, but the subject does not link back"
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticReport {
    pub status: DiagnosticStatus,
    pub issues: Vec<Issue>,
    /// Pairs that agree in both directions.
    pub valid_links: usize,
    pub linkage: LinkageStatus,
}

impl DiagnosticReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Outcome of [`LinkManager::repair`].
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub fixed: Vec<Issue>,
    /// Diagnosis taken after the repair pass.
    pub after: DiagnosticReport,
}

fn diagnose_snapshot(subjects: Vec<Subject>, timers: Vec<Timer>) -> DiagnosticReport {
    let mut issues = Vec::new();
    let mut valid_links = 0;

    for subject in &subjects {
        let Some(timer_id) = subject.linked_timer_id else {
            continue;
        };
        match timers.iter().find(|t| t.id == timer_id) {
            None => issues.push(Issue::SubjectReferencesMissingTimer {
                subject_id: subject.id,
                timer_id,
            }),
            Some(timer) if timer.linked_subject_id() == Some(subject.id) => valid_links += 1,
            Some(_) => issues.push(Issue::SubjectNotReciprocated {
                subject_id: subject.id,
                timer_id,
            }),
        }
    }

    for timer in &timers {
        let Some(subject_id) = timer.linked_subject_id() else {
            continue;
        };
        match subjects.iter().find(|s| s.id == subject_id) {
            None => issues.push(Issue::TimerReferencesMissingSubject {
                timer_id: timer.id,
                subject_id,
            }),
            Some(subject) if subject.linked_timer_id == Some(timer.id) => {}
            Some(_) => issues.push(Issue::TimerNotReciprocated {
                timer_id: timer.id,
                subject_id,
            }),
        }
    }

    let status = if issues.iter().any(Issue::is_dangling) {
        DiagnosticStatus::Error
    } else if issues.is_empty() {
        DiagnosticStatus::Ok
    } else {
        DiagnosticStatus::Warning
    };

    DiagnosticReport {
        status,
        issues,
        valid_links,
        linkage: compute_linkage_status(subjects, timers),
    }
}

impl LinkManager {
    /// Scans both stores and reports every consistency violation. Writes nothing.
    pub async fn diagnose(&self) -> PortResult<DiagnosticReport> {
        let subjects = self.subjects.list().await?;
        let timers = self.timers.list().await?;
        Ok(diagnose_snapshot(subjects, timers))
    }

    /// Clears the reference behind each diagnosed issue, then diagnoses again.
    ///
    /// Only the offending side is touched; the counterpart is never guessed.
    pub async fn repair(&self) -> PortResult<RepairOutcome> {
        let fixed = {
            let _gate = self.exclusive().await;
            let subjects = self.subjects.list().await?;
            let timers = self.timers.list().await?;
            let report = diagnose_snapshot(subjects, timers);

            let mut subjects_changed = false;
            let mut timers_changed = false;
            for issue in &report.issues {
                warn!("Repairing linkage issue: {}", issue);
                match issue {
                    Issue::SubjectReferencesMissingTimer { subject_id, .. }
                    | Issue::SubjectNotReciprocated { subject_id, .. } => {
                        self.clear_subject_link(*subject_id).await?;
                        subjects_changed = true;
                    }
                    Issue::TimerReferencesMissingSubject { timer_id, .. }
                    | Issue::TimerNotReciprocated { timer_id, .. } => {
                        self.clear_timer_link(*timer_id).await?;
                        timers_changed = true;
                    }
                }
            }
            if subjects_changed {
                self.bus.publish(Event::SubjectsRefresh);
            }
            if timers_changed {
                self.bus.publish(Event::TimersRefresh);
            }
            report.issues
        };

        let after = self.diagnose().await?;
        if after.is_healthy() {
            if !fixed.is_empty() {
                info!(fixed = fixed.len(), "Linkage repaired");
            }
        } else {
            warn!(
                remaining = after.issues.len(),
                "Linkage issues persist after repair"
            );
        }
        Ok(RepairOutcome { fixed, after })
    }
}
