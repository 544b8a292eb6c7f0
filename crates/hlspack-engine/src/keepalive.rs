//! Keep-alive loop for long-running stages.
//!
//! While external work (transcode, upload) is in flight, a ticker keeps
//! extending the task row's lease so no second worker re-claims it. The
//! extension moves `execution_time` only; `retry_count` stays untouched, it
//! counts claims, not heartbeats.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use hlspack_datastore::TaskStore;
use hlspack_models::{TaskKey, TaskKind};

use crate::retry::FailureTracker;

/// Handle to a running keep-alive ticker.
///
/// Call [`KeepAlive::stop`] as soon as the external work returns, success or
/// failure, so no extension happens after the work has concluded. Dropping
/// the handle aborts the ticker.
pub struct KeepAlive {
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl KeepAlive {
    /// Spawn a ticker extending the lease of `kind`/`key` every `interval`,
    /// each time pushing `execution_time` to at least now + `lease`.
    pub fn spawn(
        tasks: TaskStore,
        kind: TaskKind,
        key: TaskKey,
        interval: Duration,
        lease: chrono::Duration,
    ) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it, the claim that
            // started this stage already holds a fresh lease.
            ticker.tick().await;

            let mut failures = FailureTracker::new(3);

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match extend_lease(&tasks, kind, &key, lease).await {
                            Ok(true) => {
                                failures.record_success();
                                debug!(kind = %kind, key = %key, "Extended task lease");
                            }
                            Ok(false) => {
                                // Row gone: the work completed elsewhere.
                                debug!(kind = %kind, key = %key, "Task row gone, stopping keep-alive");
                                break;
                            }
                            Err(e) => {
                                if failures.record_failure() {
                                    warn!(kind = %kind, key = %key, "Keep-alive extension failed: {e}");
                                }
                            }
                        }
                    }
                }
            }
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Stop the ticker and wait for it to wind down.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

async fn extend_lease(
    tasks: &TaskStore,
    kind: TaskKind,
    key: &TaskKey,
    lease: chrono::Duration,
) -> hlspack_datastore::StoreResult<bool> {
    let Some((mut task, version)) = tasks.get(kind, key).await? else {
        return Ok(false);
    };
    // A claim may have granted a longer backoff lease than ours; only ever
    // extend, never shorten.
    task.execution_time = task.execution_time.max(Utc::now() + lease);
    let write = TaskStore::update_write(&task, &version)?;
    match tasks.datastore().batch_write(vec![write]).await {
        Ok(()) => Ok(true),
        // Lost a version race; the next tick re-reads.
        Err(e) if e.is_precondition_failed() => Ok(true),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use hlspack_datastore::{Datastore, MemoryDatastore};
    use hlspack_models::{ContainerId, Task};

    #[tokio::test(start_paused = true)]
    async fn extends_lease_without_bumping_retry_count() {
        let db: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let tasks = TaskStore::new(db);
        let key = TaskKey::container_file(ContainerId::from_string("c1"), "v.mp4");
        tasks
            .insert(&Task::immediate(TaskKind::MediaFormatting, key.clone()))
            .await
            .unwrap();

        let keepalive = KeepAlive::spawn(
            tasks.clone(),
            TaskKind::MediaFormatting,
            key.clone(),
            Duration::from_secs(60),
            chrono::Duration::minutes(10),
        );

        tokio::time::sleep(Duration::from_secs(130)).await;
        keepalive.stop().await;

        let (task, _) = tasks
            .get(TaskKind::MediaFormatting, &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.retry_count, 0);
        assert!(task.execution_time > Utc::now() + chrono::Duration::minutes(5));
    }

    #[tokio::test(start_paused = true)]
    async fn never_shortens_a_longer_claim_lease() {
        let db: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let tasks = TaskStore::new(db);
        let key = TaskKey::container_file(ContainerId::from_string("c1"), "v.mp4");

        // A high-retry claim granted a two hour backoff window.
        let claim_until = Utc::now() + chrono::Duration::hours(2);
        tasks
            .insert(&Task::new(TaskKind::MediaFormatting, key.clone(), claim_until))
            .await
            .unwrap();

        let keepalive = KeepAlive::spawn(
            tasks.clone(),
            TaskKind::MediaFormatting,
            key.clone(),
            Duration::from_secs(60),
            chrono::Duration::minutes(10),
        );

        tokio::time::sleep(Duration::from_secs(70)).await;
        keepalive.stop().await;

        let (task, _) = tasks
            .get(TaskKind::MediaFormatting, &key)
            .await
            .unwrap()
            .unwrap();
        assert!(task.execution_time >= claim_until);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_quietly_when_row_is_gone() {
        let db: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let tasks = TaskStore::new(db);
        let key = TaskKey::container_file(ContainerId::from_string("c1"), "v.mp4");

        let keepalive = KeepAlive::spawn(
            tasks.clone(),
            TaskKind::MediaFormatting,
            key,
            Duration::from_secs(60),
            chrono::Duration::minutes(10),
        );

        tokio::time::sleep(Duration::from_secs(70)).await;
        keepalive.stop().await;
    }
}
