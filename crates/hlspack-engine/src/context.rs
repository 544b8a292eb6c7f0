//! Shared dependencies handed to every task handler.

use std::sync::Arc;

use hlspack_datastore::{ContainerStore, Datastore, ResourceRegistry, TaskStore};
use hlspack_media::Transcoder;
use hlspack_storage::ObjectStore;

use crate::config::EngineConfig;
use crate::publisher::ContainerPublisher;
use crate::resources::ResourceLifecycle;

/// Explicit dependency bundle, constructed once at process start and passed
/// by reference into every component.
pub struct EngineContext {
    pub config: EngineConfig,
    /// Transactional store shared by the typed repositories
    pub db: Arc<dyn Datastore>,
    pub containers: ContainerStore,
    pub tasks: TaskStore,
    pub lifecycle: ResourceLifecycle,
    /// Staging store holding raw uploaded inputs
    pub staging: Arc<dyn ObjectStore>,
    /// Serving store holding packaged HLS output
    pub serving: Arc<dyn ObjectStore>,
    pub transcoder: Arc<dyn Transcoder>,
    pub publisher: Arc<dyn ContainerPublisher>,
}

impl EngineContext {
    pub fn new(
        config: EngineConfig,
        db: Arc<dyn Datastore>,
        staging: Arc<dyn ObjectStore>,
        serving: Arc<dyn ObjectStore>,
        transcoder: Arc<dyn Transcoder>,
        publisher: Arc<dyn ContainerPublisher>,
    ) -> Self {
        Self {
            config,
            containers: ContainerStore::new(Arc::clone(&db)),
            tasks: TaskStore::new(Arc::clone(&db)),
            lifecycle: ResourceLifecycle::new(ResourceRegistry::new(Arc::clone(&db))),
            db,
            staging,
            serving,
            transcoder,
            publisher,
        }
    }
}
