//! Local cache store: one directory of named file blobs.
//!
//! Existence of a final name is the only "already fetched" signal, so writes
//! land in a hidden `.part` sibling and are renamed into place once synced.

mod sanitize;
mod writer;

pub use sanitize::sanitize_cache_name;
pub use writer::{temp_path, PartFile, TEMP_SUFFIX};

use std::path::{Path, PathBuf};

use crate::error::{MirrorError, Result};

/// Sanitized cache key for a logical file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    logical: String,
    file_name: String,
}

impl CacheKey {
    pub fn new(logical: &str) -> Result<Self> {
        let file_name =
            sanitize_cache_name(logical).ok_or_else(|| MirrorError::InvalidName(logical.to_string()))?;
        Ok(Self {
            logical: logical.to_string(),
            file_name,
        })
    }

    /// Name as reported by telemetry; used for remote matching.
    pub fn logical(&self) -> &str {
        &self.logical
    }

    /// On-disk file name inside the cache directory.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

/// Handle to a complete cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub key: CacheKey,
    pub path: PathBuf,
}

/// Filesystem-backed cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `mkdir -p` the cache directory.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| MirrorError::storage("mkdir", &self.dir, e))
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    pub fn exists(&self, key: &CacheKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Returns a handle if the entry exists.
    pub fn lookup(&self, key: &CacheKey) -> Option<CachedFile> {
        let path = self.path_for(key);
        path.is_file().then(|| CachedFile {
            key: key.clone(),
            path,
        })
    }

    /// Open a cached entry for streaming reads.
    pub async fn open(&self, key: &CacheKey) -> Result<tokio::fs::File> {
        let path = self.path_for(key);
        tokio::fs::File::open(&path)
            .await
            .map_err(|e| MirrorError::storage("open", path, e))
    }

    /// Start a streaming write for `key`; nothing is visible until `finalize`.
    pub fn begin_write(&self, key: &CacheKey) -> PartFile {
        PartFile::new(&self.path_for(key))
    }

    /// Write `bytes` and publish them under `key` in one step.
    pub fn write_atomically(&self, key: &CacheKey, bytes: &[u8]) -> Result<CachedFile> {
        self.ensure_dir()?;
        let mut part = self.begin_write(key);
        part.open()?;
        part.write_chunk(bytes)?;
        part.finalize()?;
        Ok(CachedFile {
            key: key.clone(),
            path: self.path_for(key),
        })
    }
}
