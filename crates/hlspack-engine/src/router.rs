//! Dispatch of task deliveries to their handlers, plus the polling loop
//! that turns due task rows into deliveries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use hlspack_models::{TaskKey, TaskKind};

use crate::context::EngineContext;
use crate::engine::{TaskEngine, TaskHandler};
use crate::error::{EngineError, EngineResult};
use crate::handlers::{
    GcsFileDeletingHandler, MediaFormattingHandler, MediaStage, R2KeyDeletingHandler,
    SubtitleFormattingHandler, SubtitleStage, SyncingHandler, UploadingHandler,
    WritingToFileHandler,
};

/// Routes task deliveries to the handler registered for their kind.
pub struct TaskRouter {
    engine: TaskEngine,
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    poll_interval: Duration,
}

impl TaskRouter {
    pub fn new(ctx: &Arc<EngineContext>) -> Self {
        Self {
            engine: TaskEngine::new(ctx.tasks.clone()),
            handlers: HashMap::new(),
            semaphore: Arc::new(Semaphore::new(ctx.config.max_concurrent_tasks)),
            max_concurrent: ctx.config.max_concurrent_tasks,
            poll_interval: ctx.config.poll_interval,
        }
    }

    /// Router with the full production handler set registered.
    pub fn with_default_handlers(ctx: &Arc<EngineContext>) -> Self {
        let mut router = Self::new(ctx);
        router.register(Arc::new(UploadingHandler::<MediaStage>::new(Arc::clone(ctx))));
        router.register(Arc::new(UploadingHandler::<SubtitleStage>::new(Arc::clone(ctx))));
        router.register(Arc::new(MediaFormattingHandler::new(Arc::clone(ctx))));
        router.register(Arc::new(SubtitleFormattingHandler::new(Arc::clone(ctx))));
        router.register(Arc::new(WritingToFileHandler::new(Arc::clone(ctx))));
        router.register(Arc::new(SyncingHandler::new(Arc::clone(ctx))));
        router.register(Arc::new(GcsFileDeletingHandler::new(Arc::clone(ctx))));
        router.register(Arc::new(R2KeyDeletingHandler::new(Arc::clone(ctx))));
        router
    }

    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    /// Run one delivery through the claim/process protocol.
    pub async fn dispatch(&self, kind: TaskKind, key: &TaskKey) -> EngineResult<()> {
        let handler = self
            .handlers
            .get(&kind)
            .ok_or_else(|| EngineError::not_found(format!("no handler for {kind}")))?;
        self.engine.execute(handler, key).await
    }

    /// Poll for due task rows until `shutdown` flips, dispatching each as an
    /// independent unit of work.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Starting task poll loop"
        );
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Shutdown signal received, stopping poll loop");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }

        // Drain: taking every permit blocks until all in-flight tasks have
        // released theirs.
        let _ = self.semaphore.acquire_many(self.max_concurrent as u32).await;
    }

    /// Scan every kind for due rows and dispatch them.
    pub async fn poll_once(&self) {
        let now = Utc::now();
        for &kind in TaskKind::all() {
            let due = match self.engine.tasks().list_due(kind, now).await {
                Ok(due) => due,
                Err(e) => {
                    warn!(kind = %kind, "Failed to list due tasks: {e}");
                    continue;
                }
            };
            if due.is_empty() {
                continue;
            }
            debug!(kind = %kind, count = due.len(), "Dispatching due tasks");

            for task in due {
                let Some(handler) = self.handlers.get(&kind).cloned() else {
                    warn!(kind = %kind, "No handler registered");
                    break;
                };
                let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                    return;
                };
                let engine = self.engine.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    let key = task.key.clone();
                    if let Err(e) = engine.execute(&handler, &key).await {
                        // Background deliveries have no caller to surface
                        // errors to; the lease cycle owns the retry.
                        match &e {
                            EngineError::NotFound(_) | EngineError::Reschedule(_) => {
                                debug!(kind = %kind, key = %key, "Task deferred: {e}");
                            }
                            _ if e.is_retryable() => {
                                warn!(kind = %kind, key = %key, "Task failed, will retry: {e}");
                            }
                            _ => {
                                error!(kind = %kind, key = %key, "Task failed terminally: {e}");
                            }
                        }
                    }
                });
            }
        }
    }
}
