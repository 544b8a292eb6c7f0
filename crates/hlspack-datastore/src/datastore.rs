//! The transactional store seam.
//!
//! All cross-row invariants of the pipeline are enforced by reading documents
//! (capturing their version token) and then committing a single conditional
//! batch: if any precondition no longer holds, the whole batch fails and
//! nothing is written.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreResult;

/// A document read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Doc {
    /// Document ID within its collection
    pub id: String,
    /// Document body
    pub data: Value,
    /// Opaque version token captured at read time; used as a write
    /// precondition for optimistic concurrency
    pub version: String,
}

/// Precondition attached to a single write.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// Unconditional (upsert / delete-if-present semantics).
    None,
    /// The document must (not) exist.
    Exists(bool),
    /// The document must still carry this version token.
    Version(String),
}

/// One write in an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or replace a document.
    Put {
        collection: String,
        doc_id: String,
        data: Value,
        precondition: Precondition,
    },
    /// Delete a document.
    Delete {
        collection: String,
        doc_id: String,
        precondition: Precondition,
    },
}

impl WriteOp {
    pub fn put(
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        data: Value,
        precondition: Precondition,
    ) -> Self {
        Self::Put {
            collection: collection.into(),
            doc_id: doc_id.into(),
            data,
            precondition,
        }
    }

    pub fn delete(
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        precondition: Precondition,
    ) -> Self {
        Self::Delete {
            collection: collection.into(),
            doc_id: doc_id.into(),
            precondition,
        }
    }
}

/// Transactional document store.
///
/// Implementations: [`crate::firestore::FirestoreDatastore`] (production) and
/// [`crate::memory::MemoryDatastore`] (tests, local development).
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Get a document by ID. `Ok(None)` when absent.
    async fn get(&self, collection: &str, doc_id: &str) -> StoreResult<Option<Doc>>;

    /// List all documents of a collection.
    async fn list(&self, collection: &str) -> StoreResult<Vec<Doc>>;

    /// Apply a batch of writes atomically. If any precondition fails, no
    /// write is applied and the error is `PreconditionFailed` (or
    /// `AlreadyExists`/`NotFound` for existence preconditions).
    async fn batch_write(&self, writes: Vec<WriteOp>) -> StoreResult<()>;
}
