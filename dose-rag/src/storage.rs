//! Read-only access to uploaded files.
//!
//! The answering pipeline never writes or deletes files; it only needs to
//! know whether an identifier exists and to read its bytes.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

/// Read-only storage of uploaded files, addressed by identifier.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Whether a file with this identifier exists.
    async fn exists(&self, file_id: &str) -> bool;

    /// Read the full contents of a file.
    async fn read(&self, file_id: &str) -> io::Result<Vec<u8>>;
}

/// A [`FileStore`] backed by a local uploads directory.
///
/// Identifiers are reduced to their final path component before being
/// joined with the root, so `../secret.txt` resolves to `<root>/secret.txt`.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an identifier to a path inside the root, if it names a file at all.
    pub fn resolve(&self, file_id: &str) -> Option<PathBuf> {
        let name = Path::new(file_id).file_name()?;
        Some(self.root.join(name))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn exists(&self, file_id: &str) -> bool {
        let Some(path) = self.resolve(file_id) else {
            return false;
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.is_file(),
            Err(e) => {
                debug!(file_id, path = %path.display(), error = %e, "file not accessible");
                false
            }
        }
    }

    async fn read(&self, file_id: &str) -> io::Result<Vec<u8>> {
        let path = self.resolve(file_id).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("invalid file identifier '{file_id}'"))
        })?;
        let bytes = tokio::fs::read(&path).await?;
        debug!(file_id, bytes = bytes.len(), "read file");
        Ok(bytes)
    }
}
