//! On-disk documentation artifacts.
//!
//! Each tracked repository writes into its documentation folder. A source
//! path such as `src/app/main.py` maps to `{root}/src/app/main.md`: the
//! directory structure is mirrored and the extension replaced.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::errors::FileSyncError;

/// Writes and removes derived artifacts under one documentation root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    doc_extension: String,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, doc_extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            doc_extension: doc_extension.into(),
        }
    }

    /// Artifact path for a repository-relative source path.
    ///
    /// Absolute paths and paths with `..` components are rejected so an
    /// artifact can never land outside the root.
    pub fn artifact_path(&self, source_path: &str) -> Result<PathBuf, FileSyncError> {
        let relative = Path::new(source_path);
        let mut clean = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(FileSyncError::InvalidPath(source_path.to_string()));
                }
            }
        }
        if clean.as_os_str().is_empty() {
            return Err(FileSyncError::InvalidPath(source_path.to_string()));
        }
        clean.set_extension(&self.doc_extension);
        Ok(self.root.join(clean))
    }

    /// Write (or overwrite) the artifact for `source_path`, creating parent
    /// directories as needed.
    pub async fn write(&self, source_path: &str, contents: &str) -> Result<PathBuf, FileSyncError> {
        let target = self.artifact_path(source_path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FileSyncError::WriteFailed(format!("{}: {e}", parent.display())))?;
        }
        tokio::fs::write(&target, contents)
            .await
            .map_err(|e| FileSyncError::WriteFailed(format!("{}: {e}", target.display())))?;
        debug!(path = %target.display(), bytes = contents.len(), "wrote artifact");
        Ok(target)
    }

    /// Remove the artifact for `source_path` if present, then prune
    /// directories left empty, stopping at the root.
    ///
    /// Returns `true` if a file was deleted. An absent artifact is not an
    /// error.
    pub async fn remove(&self, source_path: &str) -> Result<bool, FileSyncError> {
        let target = self.artifact_path(source_path)?;
        let removed = match tokio::fs::remove_file(&target).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                return Err(FileSyncError::RemoveFailed(format!(
                    "{}: {e}",
                    target.display()
                )))
            }
        };
        debug!(path = %target.display(), removed, "removed artifact");

        self.prune_empty_dirs(target.parent()).await;
        Ok(removed)
    }

    async fn prune_empty_dirs(&self, start: Option<&Path>) {
        let mut current = start;
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            match tokio::fs::remove_dir(dir).await {
                Ok(()) => debug!(dir = %dir.display(), "pruned empty directory"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                // Still has entries.
                Err(_) => break,
            }
            current = dir.parent();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_path_replaces_extension() {
        let store = ArtifactStore::new("/docs/7", "md");
        assert_eq!(
            store.artifact_path("src/app/main.py").unwrap(),
            PathBuf::from("/docs/7/src/app/main.md")
        );
        assert_eq!(
            store.artifact_path("./lib.rs").unwrap(),
            PathBuf::from("/docs/7/lib.md")
        );
        assert_eq!(
            store.artifact_path("archive.tar.gz").unwrap(),
            PathBuf::from("/docs/7/archive.tar.md")
        );
    }

    #[test]
    fn test_artifact_path_rejects_escapes() {
        let store = ArtifactStore::new("/docs/7", "md");
        for bad in ["../etc/passwd.py", "/etc/passwd.py", "a/../../b.py", ""] {
            assert!(
                matches!(store.artifact_path(bad), Err(FileSyncError::InvalidPath(_))),
                "{bad}"
            );
        }
    }

    #[tokio::test]
    async fn test_write_creates_parents_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), "md");

        let path = store.write("pkg/mod/a.py", "first").await.unwrap();
        assert_eq!(path, dir.path().join("pkg/mod/a.md"));
        store.write("pkg/mod/a.py", "second").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[tokio::test]
    async fn test_remove_missing_artifact_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), "md");
        assert!(!store.remove("never/written.py").await.unwrap());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_remove_prunes_empty_dirs_up_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), "md");
        store.write("a/b/c/x.go", "doc").await.unwrap();
        store.write("a/keep.go", "doc").await.unwrap();

        assert!(store.remove("a/b/c/x.go").await.unwrap());

        assert!(!dir.path().join("a/b").exists());
        assert!(dir.path().join("a/keep.md").exists());
        assert!(dir.path().exists());
    }
}
