//! Temp-file writer with atomic publish.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{MirrorError, Result};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: hidden sibling with `.part` appended
/// (e.g. `cache/a.gcode` → `cache/.a.gcode.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    if let Some(file_name) = final_path.file_name() {
        name.push(file_name);
    }
    name.push(TEMP_SUFFIX);
    final_path.with_file_name(name)
}

/// Sequential writer for one cache entry.
///
/// The temp file is created on the first chunk, so a transfer that never
/// delivers data leaves nothing behind. Dropping an unfinalized writer removes
/// the temp file; the final name only appears after `finalize` renames it.
#[derive(Debug)]
pub struct PartFile {
    final_path: PathBuf,
    temp_path: PathBuf,
    file: Option<File>,
    written: u64,
    published: bool,
}

impl PartFile {
    pub fn new(final_path: &Path) -> Self {
        Self {
            final_path: final_path.to_path_buf(),
            temp_path: temp_path(final_path),
            file: None,
            written: 0,
            published: false,
        }
    }

    /// Create (or truncate) the temp file now rather than on first write.
    pub fn open(&mut self) -> Result<()> {
        if self.file.is_none() {
            let file = File::options()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.temp_path)
                .map_err(|e| MirrorError::storage("create", &self.temp_path, e))?;
            self.file = Some(file);
        }
        Ok(())
    }

    /// Append a chunk.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        self.open()?;
        if let Some(file) = self.file.as_mut() {
            file.write_all(data)
                .map_err(|e| MirrorError::storage("write", &self.temp_path, e))?;
        }
        self.written += data.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Sync and rename the temp file onto the final path.
    ///
    /// Returns `Ok(false)` when no temp file was ever created (nothing to publish).
    pub fn finalize(mut self) -> Result<bool> {
        let Some(file) = self.file.take() else {
            return Ok(false);
        };
        file.sync_all()
            .map_err(|e| MirrorError::storage("sync", &self.temp_path, e))?;
        // Close before rename.
        drop(file);

        std::fs::rename(&self.temp_path, &self.final_path)
            .map_err(|e| MirrorError::storage("rename", &self.final_path, e))?;
        self.published = true;
        Ok(true)
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        self.file.take();
        match std::fs::remove_file(&self.temp_path) {
            Ok(()) => tracing::debug!(path = %self.temp_path.display(), "discarded unfinished temp file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.temp_path.display(), "failed to remove temp file: {}", e),
        }
    }
}
