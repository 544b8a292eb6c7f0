//! Firestore REST backend.

pub mod client;
pub mod retry;
pub mod token_cache;
pub mod wire;

pub use client::{FirestoreConfig, FirestoreDatastore};
pub use retry::RetryConfig;
