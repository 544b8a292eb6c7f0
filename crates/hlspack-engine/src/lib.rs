//! Durable task execution engine for HLS packaging.
//!
//! Every background stage follows one protocol: claim the task row (a lease
//! extension with exponential backoff), do the external work under fresh
//! storage names with their keys reserved first, then finalize in a single
//! conditional batch that re-validates the container's fencing token. A
//! crash at any point leaves state that either retries cleanly or is swept
//! by the resource registry's safety-net deletion tasks.

pub mod backoff;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod keepalive;
pub mod publisher;
pub mod resources;
pub mod retry;
pub mod router;

pub use backoff::{claim_backoff, gc_soon_window, retain_window};
pub use config::EngineConfig;
pub use context::EngineContext;
pub use engine::{TaskEngine, TaskHandler};
pub use error::{EngineError, EngineResult};
pub use keepalive::KeepAlive;
pub use publisher::{ContainerPublisher, HttpPublisher};
pub use resources::ResourceLifecycle;
pub use retry::{retry_async, FailureTracker, RetryConfig};
pub use router::TaskRouter;
