//! Optional reuse of built indexes across requests.
//!
//! Indexes are keyed by the set of file identifiers plus a SHA-256 of each
//! file's bytes, so re-uploading a file with new contents or deleting it
//! never serves a stale index. The least recently used entry is evicted
//! once `capacity` entries are held.

use std::collections::VecDeque;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

use crate::index::SegmentIndex;
use crate::loader::SourceFile;

/// A bounded LRU cache of built [`SegmentIndex`]es.
#[derive(Debug)]
pub struct IndexCache {
    capacity: usize,
    entries: Mutex<VecDeque<(String, Arc<SegmentIndex>)>>,
}

impl IndexCache {
    /// Create a cache holding at most `capacity` indexes.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: Mutex::new(VecDeque::with_capacity(capacity)) }
    }

    /// Compute the cache key for a set of source files.
    ///
    /// The key does not depend on the order of `sources`.
    pub fn key(sources: &[SourceFile]) -> String {
        let mut parts: Vec<(&str, String)> = sources
            .iter()
            .map(|source| (source.file_id.as_str(), format!("{:x}", Sha256::digest(&source.bytes))))
            .collect();
        parts.sort();

        let mut hasher = Sha256::new();
        for (file_id, digest) in parts {
            hasher.update(file_id.as_bytes());
            hasher.update([0u8]);
            hasher.update(digest.as_bytes());
            hasher.update([b'\n']);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Look up an index, marking it most recently used.
    pub async fn get(&self, key: &str) -> Option<Arc<SegmentIndex>> {
        let mut entries = self.entries.lock().await;
        let position = entries.iter().position(|(k, _)| k == key)?;
        let entry = entries.remove(position)?;
        let index = Arc::clone(&entry.1);
        entries.push_back(entry);
        debug!(key, "index cache hit");
        Some(index)
    }

    /// Store an index, evicting the least recently used entry if full.
    pub async fn insert(&self, key: String, index: Arc<SegmentIndex>) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().await;
        entries.retain(|(k, _)| *k != key);
        while entries.len() >= self.capacity {
            if let Some((evicted, _)) = entries.pop_front() {
                debug!(key = %evicted, "evicted cached index");
            }
        }
        entries.push_back((key, index));
    }

    /// Number of cached indexes.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
