use std::path::PathBuf;

use tracing::debug;

use super::{Backend, BackendError};

/// Where an uploaded blob lives, relative to the store root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle(String);

impl BlobHandle {
    pub fn path(&self) -> &str {
        &self.0
    }
}

/// Files on disk under `root`, served back under `base_url`.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
    base_url: String,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

/// Replaces anything that isn't safe in a single path segment.
pub fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();

    match cleaned.trim_start_matches('.') {
        "" => "file".to_owned(),
        rest => rest.to_owned(),
    }
}

fn normalize(path: &str) -> Result<String, BackendError> {
    let segments: Vec<&str> = path.split('/').collect();
    let valid = segments.iter().all(|s| {
        !s.is_empty() && *s != "." && *s != ".." && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    });

    if !valid {
        return Err(BackendError::InvalidBlobPath(path.to_owned()));
    }
    Ok(segments.join("/"))
}

impl Backend {
    /// Stores `bytes` at `path`, replacing any previous blob there.
    pub async fn upload_blob(&self, path: &str, bytes: &[u8]) -> Result<BlobHandle, BackendError> {
        let path = normalize(path)?;
        let target = self.blobs.root.join(&path);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;

        debug!("stored blob {path} ({} bytes)", bytes.len());
        Ok(BlobHandle(path))
    }

    pub fn blob_url(&self, handle: &BlobHandle) -> String {
        format!("{}/{}", self.blobs.base_url, handle.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::test_backend;

    use super::*;

    #[test]
    fn segments_are_sanitized() {
        assert_eq!(sanitize_segment("my logo.png"), "my_logo.png");
        assert_eq!(sanitize_segment("../etc"), "_etc");
        assert_eq!(sanitize_segment(""), "file");
        assert_eq!(sanitize_segment(".."), "file");
    }

    #[tokio::test]
    async fn upload_then_url() {
        let (backend, _) = test_backend().await;
        let handle = backend.upload_blob("startups/u1/logo.png", b"png").await.unwrap();

        assert_eq!(backend.blob_url(&handle), "/blobs/startups/u1/logo.png");
        let stored = tokio::fs::read(backend.blobs().root().join(handle.path())).await.unwrap();
        assert_eq!(stored, b"png");
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let (backend, _) = test_backend().await;
        for path in ["../secret", "a//b", "/abs", "a/./b"] {
            assert!(matches!(
                backend.upload_blob(path, b"x").await,
                Err(BackendError::InvalidBlobPath(_))
            ));
        }
    }
}
