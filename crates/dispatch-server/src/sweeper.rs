//! Periodic expiration sweep.
//!
//! The store never schedules its own eviction. This task supplies the
//! clock and the cadence.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dispatch_store::{AgentStore, SweepReport};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Run one sweep at `now` and log its outcome.
pub fn sweep_once(store: &AgentStore, now: i64) -> SweepReport {
    let report = store.sweep_expired(now);
    for failure in &report.failures {
        error!(error = %failure, "expiration sweep could not remove agent");
    }
    if report.removed.is_empty() {
        debug!(now, "expiration sweep found nothing to remove");
    } else {
        info!(
            now,
            removed = report.removed.len(),
            remaining = store.len(),
            "expired agents swept"
        );
    }
    report
}

/// Spawn a background task sweeping `store` every `every`, using the
/// current Unix time as `now`.
///
/// The task runs until the runtime shuts down or the handle is aborted.
pub fn spawn_sweeper(store: Arc<AgentStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = every.as_millis(), "expiration sweeper started");
        loop {
            ticker.tick().await;
            sweep_once(&store, Utc::now().timestamp());
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dispatch_types::{AgentId, Location};

    use super::*;

    #[test]
    fn sweep_once_removes_only_due_agents() {
        let store = AgentStore::default();
        store
            .upsert(AgentId(1), Location::new(0.0, 0.0), 10, Some(20))
            .unwrap();
        store
            .upsert(AgentId(2), Location::new(1.0, 1.0), 10, Some(40))
            .unwrap();
        store
            .upsert(AgentId(3), Location::new(2.0, 2.0), 10, None)
            .unwrap();

        let report = sweep_once(&store, 30);
        assert_eq!(report.removed, vec![AgentId(1)]);
        assert!(report.is_clean());
        assert!(!store.contains(AgentId(1)));
        assert!(store.contains(AgentId(2)));
        assert!(store.contains(AgentId(3)));
    }

    #[tokio::test]
    async fn spawned_sweeper_evicts_stale_agents() {
        let store = Arc::new(AgentStore::default());
        store
            .upsert(AgentId(9), Location::new(5.0, 5.0), 0, Some(1))
            .unwrap();

        let handle = spawn_sweeper(Arc::clone(&store), Duration::from_millis(10));
        for _ in 0..100 {
            if store.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert!(store.is_empty());
    }
}
