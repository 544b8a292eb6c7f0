//! In-process datastore backend.
//!
//! Enforces the same precondition semantics as the Firestore backend under a
//! single mutex, making it suitable for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::datastore::{Datastore, Doc, Precondition, WriteOp};
use crate::error::{StoreError, StoreResult};

#[derive(Default)]
struct Collections {
    // collection -> doc id -> (data, version counter)
    docs: HashMap<String, HashMap<String, (Value, u64)>>,
}

/// In-memory [`Datastore`] implementation.
#[derive(Default)]
pub struct MemoryDatastore {
    inner: Mutex<Collections>,
    next_version: AtomicU64,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_precondition(
        existing: Option<&(Value, u64)>,
        precondition: &Precondition,
        path: &str,
    ) -> StoreResult<()> {
        match precondition {
            Precondition::None => Ok(()),
            Precondition::Exists(true) if existing.is_none() => {
                Err(StoreError::precondition_failed(format!(
                    "{path} does not exist"
                )))
            }
            Precondition::Exists(false) if existing.is_some() => {
                Err(StoreError::AlreadyExists(path.to_string()))
            }
            Precondition::Exists(_) => Ok(()),
            Precondition::Version(v) => match existing {
                Some((_, current)) if current.to_string() == *v => Ok(()),
                Some((_, current)) => Err(StoreError::precondition_failed(format!(
                    "{path}: version {current} != expected {v}"
                ))),
                None => Err(StoreError::precondition_failed(format!(
                    "{path} does not exist"
                ))),
            },
        }
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn get(&self, collection: &str, doc_id: &str) -> StoreResult<Option<Doc>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .docs
            .get(collection)
            .and_then(|c| c.get(doc_id))
            .map(|(data, version)| Doc {
                id: doc_id.to_string(),
                data: data.clone(),
                version: version.to_string(),
            }))
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<Doc>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .docs
            .get(collection)
            .map(|c| {
                c.iter()
                    .map(|(id, (data, version))| Doc {
                        id: id.clone(),
                        data: data.clone(),
                        version: version.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn batch_write(&self, writes: Vec<WriteOp>) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();

        // Validate every precondition before mutating anything.
        for write in &writes {
            let (collection, doc_id, precondition) = match write {
                WriteOp::Put {
                    collection,
                    doc_id,
                    precondition,
                    ..
                }
                | WriteOp::Delete {
                    collection,
                    doc_id,
                    precondition,
                } => (collection, doc_id, precondition),
            };
            let existing = inner.docs.get(collection).and_then(|c| c.get(doc_id));
            Self::check_precondition(existing, precondition, &format!("{collection}/{doc_id}"))?;
        }

        for write in writes {
            match write {
                WriteOp::Put {
                    collection,
                    doc_id,
                    data,
                    ..
                } => {
                    let version = self.next_version.fetch_add(1, Ordering::SeqCst) + 1;
                    inner
                        .docs
                        .entry(collection)
                        .or_default()
                        .insert(doc_id, (data, version));
                }
                WriteOp::Delete {
                    collection, doc_id, ..
                } => {
                    if let Some(c) = inner.docs.get_mut(&collection) {
                        c.remove(&doc_id);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let db = MemoryDatastore::new();
        db.batch_write(vec![WriteOp::put(
            "containers",
            "c1",
            json!({"a": 1}),
            Precondition::None,
        )])
        .await
        .unwrap();

        let doc = db.get("containers", "c1").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({"a": 1}));
    }

    #[tokio::test]
    async fn version_precondition_rejects_stale_writes() {
        let db = MemoryDatastore::new();
        db.batch_write(vec![WriteOp::put(
            "containers",
            "c1",
            json!({"a": 1}),
            Precondition::None,
        )])
        .await
        .unwrap();

        let stale = db.get("containers", "c1").await.unwrap().unwrap();

        // Another writer advances the document.
        db.batch_write(vec![WriteOp::put(
            "containers",
            "c1",
            json!({"a": 2}),
            Precondition::Version(stale.version.clone()),
        )])
        .await
        .unwrap();

        // The stale version is now rejected.
        let err = db
            .batch_write(vec![WriteOp::put(
                "containers",
                "c1",
                json!({"a": 3}),
                Precondition::Version(stale.version),
            )])
            .await
            .unwrap_err();
        assert!(err.is_precondition_failed());

        let doc = db.get("containers", "c1").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({"a": 2}));
    }

    #[tokio::test]
    async fn failed_precondition_rolls_back_whole_batch() {
        let db = MemoryDatastore::new();
        let err = db
            .batch_write(vec![
                WriteOp::put("k", "a", json!({}), Precondition::None),
                WriteOp::delete("k", "missing", Precondition::Exists(true)),
            ])
            .await
            .unwrap_err();
        assert!(err.is_precondition_failed());
        assert!(db.get("k", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exists_false_precondition_guards_creation() {
        let db = MemoryDatastore::new();
        db.batch_write(vec![WriteOp::put(
            "containers",
            "c1",
            json!({}),
            Precondition::Exists(false),
        )])
        .await
        .unwrap();

        let err = db
            .batch_write(vec![WriteOp::put(
                "containers",
                "c1",
                json!({}),
                Precondition::Exists(false),
            )])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent_without_precondition() {
        let db = MemoryDatastore::new();
        db.batch_write(vec![WriteOp::delete("k", "missing", Precondition::None)])
            .await
            .unwrap();
    }
}
