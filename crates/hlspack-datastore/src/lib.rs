//! Transactional document store for the HlsPack pipeline.
//!
//! This crate provides:
//! - The [`Datastore`] seam: reads capture a version token, writes commit as
//!   one atomic conditional batch
//! - Typed stores: [`ContainerStore`], [`TaskStore`], [`ResourceRegistry`]
//! - A Firestore REST backend (token caching, bounded retry, metrics)
//! - An in-process memory backend for tests and local development

pub mod containers;
pub mod datastore;
pub mod error;
pub mod firestore;
pub mod memory;
pub mod metrics;
pub mod registry;
pub mod tasks;

pub use containers::{ContainerStore, CONTAINERS};
pub use datastore::{Datastore, Doc, Precondition, WriteOp};
pub use error::{StoreError, StoreResult};
pub use firestore::{FirestoreConfig, FirestoreDatastore};
pub use memory::MemoryDatastore;
pub use registry::{RegistryEntry, ResourceRegistry, R2_KEYS};
pub use tasks::{task_collection, TaskStore};
