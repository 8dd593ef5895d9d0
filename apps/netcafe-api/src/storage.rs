//! Object storage for uploaded customer files.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::ApiError;

/// Bucket holding customer uploads.
pub const USER_FILES_BUCKET: &str = "user-files";

/// Abstraction over a bucket/path addressed blob store.
///
/// Backed by the local filesystem in production and an in-memory map in tests.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<(), ApiError>;
    async fn get(&self, bucket: &str, path: &str) -> Result<Option<Vec<u8>>, ApiError>;
    /// Removing a missing object is not an error.
    async fn delete(&self, bucket: &str, path: &str) -> Result<(), ApiError>;
}

/// Object key for an uploaded file: `{user_id}/{file_id}/{name}`.
pub fn object_path(user_id: &str, file_id: &str, file_name: &str) -> String {
    format!("{user_id}/{file_id}/{}", sanitize_file_name(file_name))
}

/// Strip directory parts and characters that are unsafe in a path segment.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        truncate_file_name(cleaned)
    }
}

/// Longest stored name in bytes, well under the usual 255-byte segment limit.
const MAX_FILE_NAME_BYTES: usize = 200;

/// Extensions longer than this are treated as part of the stem.
const MAX_EXTENSION_BYTES: usize = 16;

/// Cut an over-long name on a char boundary, keeping a short extension.
fn truncate_file_name(name: &str) -> String {
    if name.len() <= MAX_FILE_NAME_BYTES {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= MAX_EXTENSION_BYTES => name.split_at(dot),
        _ => (name, ""),
    };
    let stem = prefix_within(stem, MAX_FILE_NAME_BYTES - ext.len()).trim_end();
    format!("{stem}{ext}")
}

fn prefix_within(s: &str, max_bytes: usize) -> &str {
    let mut end = max_bytes.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ---------------------------------------------------------------------------
// Local filesystem implementation
// ---------------------------------------------------------------------------

pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf, ApiError> {
        let relative = Path::new(bucket).join(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(ApiError::bad_request("Invalid object path"));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<(), ApiError> {
        let full = self.resolve(bucket, path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        Ok(())
    }

    async fn get(&self, bucket: &str, path: &str) -> Result<Option<Vec<u8>>, ApiError> {
        let full = self.resolve(bucket, path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, bucket: &str, path: &str) -> Result<(), ApiError> {
        let full = self.resolve(bucket, path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        // The per-file directory is left empty after removal.
        if let Some(parent) = full.parent() {
            let _ = tokio::fs::remove_dir(parent).await;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (tests)
// ---------------------------------------------------------------------------

pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<(), ApiError> {
        self.objects
            .lock()
            .insert((bucket.to_string(), path.to_string()), bytes);
        Ok(())
    }

    async fn get(&self, bucket: &str, path: &str) -> Result<Option<Vec<u8>>, ApiError> {
        Ok(self
            .objects
            .lock()
            .get(&(bucket.to_string(), path.to_string()))
            .cloned())
    }

    async fn delete(&self, bucket: &str, path: &str) -> Result<(), ApiError> {
        self.objects
            .lock()
            .remove(&(bucket.to_string(), path.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\cv.pdf"), "cv.pdf");
    }

    #[test]
    fn sanitize_replaces_unsafe_chars() {
        assert_eq!(sanitize_file_name("my*report?.txt"), "my_report_.txt");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name("..."), "file");
    }

    #[test]
    fn object_path_layout() {
        assert_eq!(
            object_path("usr_1", "fil_2", "notes.txt"),
            "usr_1/fil_2/notes.txt"
        );
    }

    #[test]
    fn long_names_are_cut_keeping_extension() {
        let long = format!("{}.txt", "a".repeat(300));
        let cut = sanitize_file_name(&long);
        assert_eq!(cut.len(), MAX_FILE_NAME_BYTES);
        assert!(cut.ends_with("aaa.txt"));

        // Multi-byte chars are never split.
        let wide = format!("{}.pdf", "é".repeat(150));
        let cut = sanitize_file_name(&wide);
        assert!(cut.len() <= MAX_FILE_NAME_BYTES);
        assert!(cut.ends_with("é.pdf"));

        let no_ext = "b".repeat(400);
        assert_eq!(sanitize_file_name(&no_ext).len(), MAX_FILE_NAME_BYTES);
    }

    #[tokio::test]
    async fn local_store_accepts_long_uploaded_names() {
        let root = std::env::temp_dir().join(netcafe_common::id::prefixed_ulid("store"));
        let store = LocalObjectStore::new(&root);
        let path = object_path("usr_1", "fil_1", &format!("{}.txt", "a".repeat(300)));
        store
            .put(USER_FILES_BUCKET, &path, b"data".to_vec())
            .await
            .unwrap();
        assert!(store.get(USER_FILES_BUCKET, &path).await.unwrap().is_some());
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryObjectStore::new();
        store.put(USER_FILES_BUCKET, "a/b", b"hi".to_vec()).await.unwrap();
        assert_eq!(
            store.get(USER_FILES_BUCKET, "a/b").await.unwrap().as_deref(),
            Some(&b"hi"[..])
        );
        store.delete(USER_FILES_BUCKET, "a/b").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn local_store_rejects_traversal() {
        let store = LocalObjectStore::new(std::env::temp_dir());
        let err = store
            .put(USER_FILES_BUCKET, "../escape", b"x".to_vec())
            .await
            .unwrap_err();
        assert_eq!(err.code, "BAD_REQUEST");
    }

    #[tokio::test]
    async fn local_store_round_trip() {
        let root = std::env::temp_dir().join(netcafe_common::id::prefixed_ulid("store"));
        let store = LocalObjectStore::new(&root);
        store
            .put(USER_FILES_BUCKET, "usr_1/fil_1/a.txt", b"data".to_vec())
            .await
            .unwrap();
        let bytes = store
            .get(USER_FILES_BUCKET, "usr_1/fil_1/a.txt")
            .await
            .unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"data"[..]));

        store
            .delete(USER_FILES_BUCKET, "usr_1/fil_1/a.txt")
            .await
            .unwrap();
        assert!(store
            .get(USER_FILES_BUCKET, "usr_1/fil_1/a.txt")
            .await
            .unwrap()
            .is_none());
        // Deleting again is a no-op.
        store
            .delete(USER_FILES_BUCKET, "usr_1/fil_1/a.txt")
            .await
            .unwrap();
        let _ = std::fs::remove_dir_all(root);
    }
}
