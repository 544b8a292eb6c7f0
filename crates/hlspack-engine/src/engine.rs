//! The claim/process execution protocol.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn, Instrument};

use hlspack_datastore::TaskStore;
use hlspack_models::{Task, TaskKey, TaskKind};

use crate::backoff::claim_backoff;
use crate::error::{EngineError, EngineResult};

/// Handler for one task kind.
///
/// `process` performs the work and must finish with the task row deleted, or
/// return an error leaving the row intact for the next lease cycle. It must
/// tolerate duplicate invocation for the same key: fresh names and fencing
/// checks make the duplicate converge or fail with `Conflict`, never corrupt
/// state.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The task kind this handler serves.
    fn kind(&self) -> TaskKind;

    /// Execute the unit of work identified by `key`.
    async fn process(&self, key: &TaskKey) -> EngineResult<()>;
}

/// Generic claim -> process engine applied uniformly to every task kind.
#[derive(Clone)]
pub struct TaskEngine {
    tasks: TaskStore,
}

impl TaskEngine {
    pub fn new(tasks: TaskStore) -> Self {
        Self { tasks }
    }

    /// Extend the task row's lease and bump its retry count.
    ///
    /// This is a lease extension, not a lock: after it commits, no other
    /// delivery will be scheduled before the backoff window elapses, which
    /// gives the current invocation an uncontended window. A row that no
    /// longer exists means the work is done; claiming it is `NotFound` and
    /// performs no writes.
    pub async fn claim(&self, kind: TaskKind, key: &TaskKey) -> EngineResult<Task> {
        // Losing a version race here just means another claimer moved the
        // lease first; re-read and try again a couple of times.
        const CLAIM_ATTEMPTS: u32 = 3;

        for attempt in 0..CLAIM_ATTEMPTS {
            let (mut task, version) = self
                .tasks
                .get(kind, key)
                .await?
                .ok_or_else(|| EngineError::not_found(format!("task {kind}/{key}")))?;

            let delay = claim_backoff(task.retry_count);
            task.retry_count += 1;
            task.execution_time = Utc::now() + delay;

            let write = TaskStore::update_write(&task, &version)?;
            match self.tasks.datastore().batch_write(vec![write]).await {
                Ok(()) => {
                    debug!(
                        kind = %kind,
                        key = %key,
                        retry_count = task.retry_count,
                        lease_secs = delay.num_seconds(),
                        "Claimed task"
                    );
                    metrics::counter!("engine_tasks_claimed_total", "kind" => kind.as_str())
                        .increment(1);
                    return Ok(task);
                }
                Err(e) if e.is_precondition_failed() && attempt + 1 < CLAIM_ATTEMPTS => {
                    warn!(kind = %kind, key = %key, "Claim raced, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::conflict(format!(
            "could not claim {kind}/{key} after {CLAIM_ATTEMPTS} attempts"
        )))
    }

    /// Run the full claim-then-process cycle for one delivery.
    pub async fn execute(&self, handler: &Arc<dyn TaskHandler>, key: &TaskKey) -> EngineResult<()> {
        let kind = handler.kind();
        let task = self.claim(kind, key).await?;

        let span = tracing::info_span!("task", kind = %kind, key = %key, retry = task.retry_count);

        let started = std::time::Instant::now();
        let result = handler.process(key).instrument(span).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(()) => {
                info!(
                    kind = %kind,
                    key = %key,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Task completed"
                );
                metrics::counter!("engine_tasks_completed_total", "kind" => kind.as_str())
                    .increment(1);
            }
            Err(e) => {
                metrics::counter!(
                    "engine_tasks_failed_total",
                    "kind" => kind.as_str(),
                    "retryable" => if e.is_retryable() { "true" } else { "false" }
                )
                .increment(1);
            }
        }
        metrics::histogram!("engine_task_duration_seconds", "kind" => kind.as_str())
            .record(elapsed.as_secs_f64());

        result
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlspack_datastore::{Datastore, MemoryDatastore};
    use hlspack_models::ContainerId;

    fn engine() -> TaskEngine {
        let db: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        TaskEngine::new(TaskStore::new(db))
    }

    #[tokio::test]
    async fn claim_extends_lease_and_bumps_retry() {
        let engine = engine();
        let key = TaskKey::container_file(ContainerId::from_string("c1"), "v.mp4");
        engine
            .tasks()
            .insert(&Task::immediate(TaskKind::MediaFormatting, key.clone()))
            .await
            .unwrap();

        let before = Utc::now();
        let claimed = engine.claim(TaskKind::MediaFormatting, &key).await.unwrap();

        assert_eq!(claimed.retry_count, 1);
        assert!(claimed.execution_time >= before + chrono::Duration::minutes(4));

        // Second claim doubles the window.
        let claimed = engine.claim(TaskKind::MediaFormatting, &key).await.unwrap();
        assert_eq!(claimed.retry_count, 2);
        assert!(claimed.execution_time >= before + chrono::Duration::minutes(9));
    }

    #[tokio::test]
    async fn claim_missing_row_is_not_found_and_writes_nothing() {
        let engine = engine();
        let key = TaskKey::container_file(ContainerId::from_string("c1"), "v.mp4");

        let err = engine
            .claim(TaskKind::MediaFormatting, &key)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert!(engine
            .tasks()
            .list(TaskKind::MediaFormatting)
            .await
            .unwrap()
            .is_empty());
    }
}
