//! services/api/src/web/consistency_task.rs
//!
//! Background task that periodically clears dangling link references.

use onyx_core::link_manager::LinkManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs `ensure_data_consistency` immediately and then once per `period`,
/// until `token` is cancelled.
pub fn spawn_consistency_task(
    links: Arc<LinkManager>,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), "Consistency task started");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Consistency task stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match links.ensure_data_consistency().await {
                        Ok(repair) if repair.is_empty() => {}
                        Ok(repair) => warn!(
                            subjects = repair.subjects_repaired.len(),
                            timers = repair.timers_repaired.len(),
                            "Consistency task repaired dangling references"
                        ),
                        Err(e) => error!("Consistency check failed: {:?}", e),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use onyx_core::domain::{Subject, SubjectStatus, TimerMode};
    use onyx_core::events::EventBus;
    use onyx_core::memory::{InMemorySubjectStore, InMemoryTimerStore};
    use onyx_core::ports::{SubjectStore, SystemClock};
    use uuid::Uuid;

    #[tokio::test]
    async fn repairs_on_start_and_stops_on_cancel() {
        let subjects = Arc::new(InMemorySubjectStore::new());
        let timers = Arc::new(InMemoryTimerStore::new());
        let now = Utc::now();
        let orphan = Subject {
            id: Uuid::new_v4(),
            name: "Orphan".to_string(),
            status: SubjectStatus::NotStarted,
            target_time: 600,
            time_spent: 0,
            default_timer_duration: 1500,
            weekly_time_goal: 120,
            study_days: Vec::new(),
            last_study_date: None,
            linked_timer_id: Some(Uuid::new_v4()),
            default_timer_mode: TimerMode::Simple,
            quick_timer_config: None,
            timer_conversion_note: None,
            created_at: now,
            updated_at: now,
        };
        subjects.seed(orphan.clone()).await;
        let links = Arc::new(LinkManager::new(
            subjects.clone(),
            timers,
            EventBus::new(),
            Arc::new(SystemClock),
        ));

        let token = CancellationToken::new();
        let handle = spawn_consistency_task(links, Duration::from_secs(3600), token.clone());

        let mut repaired = false;
        for _ in 0..50 {
            let current = subjects.get(orphan.id).await.unwrap().unwrap();
            if current.linked_timer_id.is_none() {
                repaired = true;
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert!(repaired, "first tick should repair the orphan");

        token.cancel();
        time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task stops after cancellation")
            .unwrap();
    }
}
