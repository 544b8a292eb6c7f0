//! Higher-level operations over an [`ObjectStore`].

use std::path::Path;

use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::object_store::ObjectStore;

/// Content type for a key, by extension.
pub fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("ts") => "video/mp2t",
        Some("mp4") | Some("m4s") => "video/mp4",
        Some("vtt") => "text/vtt",
        _ => "application/octet-stream",
    }
}

/// Upload every regular file under `local_dir` to `key_prefix`, preserving
/// relative paths. Returns the total number of bytes uploaded.
pub async fn upload_dir(
    store: &dyn ObjectStore,
    local_dir: &Path,
    key_prefix: &str,
) -> StorageResult<u64> {
    let mut total_bytes = 0u64;
    let mut stack = vec![local_dir.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                stack.push(path);
                continue;
            }

            let relative = path.strip_prefix(local_dir).map_err(|_| {
                StorageError::upload_failed(format!("{} escapes upload root", path.display()))
            })?;
            let key = format!(
                "{}/{}",
                key_prefix.trim_end_matches('/'),
                relative.to_string_lossy().replace('\\', "/")
            );

            total_bytes += entry.metadata().await?.len();
            store
                .upload_file(&path, &key, content_type_for(&key))
                .await?;
        }
    }

    debug!(
        "Uploaded {} ({} bytes) to {}",
        local_dir.display(),
        total_bytes,
        key_prefix
    );
    Ok(total_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryObjectStore;

    #[test]
    fn content_types_cover_hls_artifacts() {
        assert_eq!(content_type_for("a/master.m3u8"), "application/vnd.apple.mpegurl");
        assert_eq!(content_type_for("a/seg0.ts"), "video/mp2t");
        assert_eq!(content_type_for("a/sub.vtt"), "text/vtt");
        assert_eq!(content_type_for("a/unknown.bin"), "application/octet-stream");
    }

    #[tokio::test]
    async fn upload_dir_preserves_relative_layout() {
        let dir = tempfile::tempdir().unwrap();
        let track = dir.path().join("trk");
        tokio::fs::create_dir_all(&track).await.unwrap();
        tokio::fs::write(track.join("playlist.m3u8"), b"#EXTM3U\n")
            .await
            .unwrap();
        tokio::fs::write(track.join("seg0.ts"), b"0123").await.unwrap();

        let store = MemoryObjectStore::new();
        let bytes = upload_dir(&store, dir.path(), "root/v1").await.unwrap();

        assert_eq!(bytes, 12);
        assert!(store.contains("root/v1/trk/playlist.m3u8"));
        assert!(store.contains("root/v1/trk/seg0.ts"));
    }
}
