//! Object storage for HLS artifacts.
//!
//! The [`ObjectStore`] trait abstracts the bucket backend. [`R2Client`] is
//! the S3-compatible production implementation; [`MemoryObjectStore`] backs
//! tests.

pub mod client;
pub mod error;
pub mod memory;
pub mod object_store;
pub mod operations;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryObjectStore;
pub use object_store::ObjectStore;
pub use operations::{content_type_for, upload_dir};
