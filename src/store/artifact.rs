use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

/// Key-value store for published artifacts. Keys are write-once.
pub trait ArtifactStore: Send + Sync {
    /// Publish the file at `local_path` under `key`
    fn put(&self, key: &str, local_path: &Path) -> Result<(), PipelineError>;

    /// Copy the artifact stored under `key` to `local_path`
    fn get(&self, key: &str, local_path: &Path) -> Result<(), PipelineError>;

    /// Whether `key` has been published
    fn exists(&self, key: &str) -> bool;
}

/// Artifact store backed by a directory, one file per key
pub struct FsArtifactStore {
    /// Directory holding one file per key
    root: PathBuf,
}

impl FsArtifactStore {
    /// Open the store at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            PipelineError::artifact("*", format!("failed to create {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    /// Location of `key` inside the store
    pub fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Keys are plain file names: no separators, no `..`, not hidden
    fn validate_key(key: &str) -> Result<(), PipelineError> {
        if key.is_empty()
            || key.starts_with('.')
            || key.contains('/')
            || key.contains('\\')
            || key.contains("..")
        {
            return Err(PipelineError::artifact(key, "invalid artifact key"));
        }
        Ok(())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, key: &str, local_path: &Path) -> Result<(), PipelineError> {
        Self::validate_key(key)?;
        let target = self.path_of(key);
        if target.exists() {
            return Err(PipelineError::artifact(key, "already published"));
        }

        // Stage next to the target, then hard-link: linking fails if another
        // writer got there first, which keeps the key write-once.
        let staging = self.root.join(format!(".{}.{}.tmp", key, std::process::id()));
        fs::copy(local_path, &staging).map_err(|e| {
            PipelineError::artifact(key, format!("failed to read {}: {}", local_path.display(), e))
        })?;
        let linked = fs::hard_link(&staging, &target);
        let _ = fs::remove_file(&staging);
        linked.map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => PipelineError::artifact(key, "already published"),
            _ => PipelineError::artifact(key, format!("failed to publish: {}", e)),
        })?;

        tracing::debug!(key, path = %target.display(), "artifact published");
        Ok(())
    }

    fn get(&self, key: &str, local_path: &Path) -> Result<(), PipelineError> {
        Self::validate_key(key)?;
        let source = self.path_of(key);
        if !source.exists() {
            return Err(PipelineError::artifact(key, "not published"));
        }
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PipelineError::artifact(key, format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        fs::copy(&source, local_path).map_err(|e| {
            PipelineError::artifact(key, format!("failed to fetch: {}", e))
        })?;
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        Self::validate_key(key).is_ok() && self.path_of(key).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_then_get() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("artifacts")).unwrap();

        let src = dir.path().join("LOD_data.csv");
        std::fs::write(&src, "update,eaten\n0,1\n").unwrap();

        assert!(!store.exists("predictable-rep0"));
        store.put("predictable-rep0", &src).unwrap();
        assert!(store.exists("predictable-rep0"));

        let dst = dir.path().join("fetched").join("LOD_data.csv");
        store.get("predictable-rep0", &dst).unwrap();
        assert_eq!(std::fs::read_to_string(dst).unwrap(), "update,eaten\n0,1\n");
    }

    #[test]
    fn test_put_is_write_once() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("artifacts")).unwrap();
        let src = dir.path().join("a.csv");
        std::fs::write(&src, "first").unwrap();

        store.put("k", &src).unwrap();
        std::fs::write(&src, "second").unwrap();
        let err = store.put("k", &src).unwrap_err();
        assert!(err.to_string().contains("already published"));

        let dst = dir.path().join("out");
        store.get("k", &dst).unwrap();
        assert_eq!(std::fs::read_to_string(dst).unwrap(), "first");
    }

    #[test]
    fn test_get_unpublished_key_fails() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        let err = store.get("missing", &dir.path().join("x")).unwrap_err();
        assert!(matches!(err, PipelineError::Artifact { .. }));
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        let src = dir.path().join("a.csv");
        std::fs::write(&src, "x").unwrap();

        for key in ["", "../escape", "a/b", ".hidden"] {
            assert!(store.put(key, &src).is_err(), "key {key:?} should be rejected");
            assert!(!store.exists(key));
        }
    }

    #[test]
    fn test_put_missing_source_fails() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        assert!(store.put("k", &dir.path().join("nope.csv")).is_err());
        assert!(!store.exists("k"));
    }
}
