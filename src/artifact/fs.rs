//! Filesystem artifact store.
//!
//! Layout: `<root>/runs/<run_id>/<key>`. Writes land in a temp file next to
//! the target and are renamed into place.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{temp_path, ArtifactStore, ArtifactUri};
use crate::Result;

/// Artifact store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, uri: &str) -> Result<PathBuf> {
        let parsed = ArtifactUri::parse(uri)?;
        let mut path = self.root.join("runs").join(parsed.run_id);
        for segment in parsed.key.split('/') {
            path.push(segment);
        }
        Ok(path)
    }
}

impl ArtifactStore for FsArtifactStore {
    async fn get(&self, uri: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(uri)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, uri: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(uri)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = temp_path(&path);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(uri, path = %path.display(), size = bytes.len(), "stored artifact");
        Ok(())
    }

    async fn delete(&self, uri: &str) -> Result<()> {
        let path = self.path_for(uri)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        let path = self.path_for(uri)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_store_put_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());

        store.put("runs:/abc/model", b"weights".to_vec()).await.unwrap();

        assert_eq!(
            store.get("runs:/abc/model").await.unwrap(),
            Some(b"weights".to_vec())
        );
        assert!(dir.path().join("runs").join("abc").join("model").is_file());
    }

    #[tokio::test]
    async fn test_fs_store_missing_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());

        assert_eq!(store.get("runs:/abc/model").await.unwrap(), None);
        store.delete("runs:/abc/model").await.unwrap();

        store.put("runs:/abc/model", vec![1]).await.unwrap();
        assert!(store.exists("runs:/abc/model").await.unwrap());
        store.delete("runs:/abc/model").await.unwrap();
        assert!(!store.exists("runs:/abc/model").await.unwrap());
    }

    #[tokio::test]
    async fn test_fs_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        assert!(store.put("runs:/abc/../../x", vec![1]).await.is_err());
    }
}
