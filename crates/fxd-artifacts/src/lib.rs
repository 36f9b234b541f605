//! Receipt/payment image store.
//!
//! Images are written *outside* the database transaction boundary and must
//! tolerate being orphaned by a rollback; cleanup is best-effort only.
//! [`FileStore::delete`] therefore never fails the surrounding operation —
//! failures are logged and swallowed by callers via [`FileStore::delete_quiet`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;
use uuid::Uuid;

/// Local-disk file store. Paths handed out are relative
/// (`<uuid>.<ext>`), resolved against the root for IO and against the
/// base URL for client-facing references.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    base_url: String,
}

impl FileStore {
    /// Create the store and ensure the root directory exists.
    pub fn new(root: impl AsRef<Path>, base_url: impl Into<String>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("create file store root {:?}", root))?;
        Ok(Self {
            root,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Persist bytes under a fresh uuid name; returns the stored path.
    pub fn save(&self, bytes: &[u8], ext: &str) -> Result<String> {
        let ext = ext.trim_start_matches('.');
        let name = if ext.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            format!("{}.{ext}", Uuid::new_v4())
        };
        let path = self.root.join(&name);
        fs::write(&path, bytes).with_context(|| format!("write {:?}", path))?;
        Ok(name)
    }

    /// Delete a stored file.
    pub fn delete(&self, stored_path: &str) -> Result<()> {
        let path = self.root.join(stored_path);
        fs::remove_file(&path).with_context(|| format!("remove {:?}", path))
    }

    /// Best-effort delete: failures are logged and otherwise ignored, so
    /// cleanup never fails a surrounding ledger operation.
    pub fn delete_quiet(&self, stored_path: &str) {
        if let Err(err) = self.delete(stored_path) {
            warn!(path = stored_path, %err, "file cleanup failed (ignored)");
        }
    }

    /// Stable client-facing URL for a stored path.
    pub fn resolve_url(&self, stored_path: &str) -> String {
        format!("{}/{}", self.base_url, stored_path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), "http://localhost:8900/files").unwrap();

        let path = store.save(b"png bytes", "png").unwrap();
        assert!(path.ends_with(".png"));
        assert!(dir.path().join(&path).exists());

        store.delete(&path).unwrap();
        assert!(!dir.path().join(&path).exists());
    }

    #[test]
    fn resolve_url_joins_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), "http://files.local/").unwrap();
        assert_eq!(
            store.resolve_url("abc.png"),
            "http://files.local/abc.png"
        );
    }

    #[test]
    fn delete_quiet_swallows_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), "http://files.local").unwrap();
        // Must not panic or error.
        store.delete_quiet("does-not-exist.png");
    }

    #[test]
    fn save_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), "http://files.local").unwrap();
        let path = store.save(b"x", "").unwrap();
        assert!(!path.contains('.'));
    }
}
