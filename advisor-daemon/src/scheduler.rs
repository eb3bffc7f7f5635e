//! Background tasks for `serve`: the poll loop and the sync event log.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use advisor_core::SyncEvent;
use advisor_sync::SyncOrchestrator;

/// Sync every user on a fixed interval until `shutdown` flips to true.
///
/// The first tick fires immediately. A tick that lands while the previous
/// round is still running is delayed rather than stacked.
pub fn spawn_poll_loop(
    orchestrator: Arc<SyncOrchestrator>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut rounds = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    rounds += 1;
                    match orchestrator.sync_everyone().await {
                        Ok(users) => debug!(round = rounds, users, "Poll round finished"),
                        Err(e) => error!(round = rounds, error = %e, "Poll round failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(rounds, "Poll loop stopped");
        rounds
    })
}

/// Log every [`SyncEvent`] until the orchestrator goes away.
pub fn spawn_event_logger(mut events: broadcast::Receiver<SyncEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Sync event log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::SourceSkipped { user_id, source } => {
            debug!(user_id = %user_id, source = %source, "Sync already running, skipped");
        }
        SyncEvent::SourceFinished {
            user_id,
            source,
            report,
        } => info!(
            user_id = %user_id,
            source = %source,
            fetched = report.fetched,
            stored = report.stored,
            skipped = report.skipped,
            failed = report.failed,
            "Source synced"
        ),
        SyncEvent::SourceFailed {
            user_id,
            source,
            error,
        } => warn!(user_id = %user_id, source = %source, error = %error, "Source sync failed"),
        SyncEvent::BatchFinished { user_id, report } => {
            info!(user_id = %user_id, stored = report.stored, "Sync batch finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_core::{HashingEmbedder, MemoryStore, User, UserId};
    use advisor_sync::SyncConfig;

    #[tokio::test]
    async fn test_poll_loop_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        store.put_user(User::new(UserId::new("u1"), "u1@example.com"));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            store.clone(),
            store,
            Arc::new(HashingEmbedder::default()),
            SyncConfig::default(),
        ));

        let (tx, rx) = watch::channel(false);
        let handle = spawn_poll_loop(orchestrator, Duration::from_secs(3600), rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let rounds = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rounds, 1);
    }

    #[tokio::test]
    async fn test_event_logger_ends_with_channel() {
        let (tx, rx) = broadcast::channel(4);
        let handle = spawn_event_logger(rx);
        tx.send(SyncEvent::SourceSkipped {
            user_id: UserId::new("u1"),
            source: advisor_core::Source::Mailbox,
        })
        .unwrap();
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
