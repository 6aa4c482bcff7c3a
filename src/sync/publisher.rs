//! Atomic file publishing
//!
//! Content is written to a temporary file in the destination directory and
//! renamed over the destination once complete. A concurrent reader sees
//! either the previous file or the new one, never a partial write. If the
//! write fails or the writer is dropped before [`AtomicWriter::commit`], the
//! temporary file is removed and the destination is left untouched.

use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::PublishError;

/// Streaming writer that replaces `dest` on commit
#[derive(Debug)]
pub struct AtomicWriter {
    dest: PathBuf,
    file: fs::File,
    temp_path: TempPath,
    written: u64,
}

impl AtomicWriter {
    /// Create a temporary file next to `dest`, creating parent directories
    pub async fn create(dest: &Path) -> Result<Self, PublishError> {
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .await
            .map_err(|e| PublishError::io(dest, e))?;

        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".tmp")
            .tempfile_in(&parent)
            .map_err(|e| PublishError::io(dest, e))?;
        let (file, temp_path) = temp.into_parts();

        Ok(Self {
            dest: dest.to_path_buf(),
            file: fs::File::from_std(file),
            temp_path,
            written: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), PublishError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| PublishError::io(&self.dest, e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Push buffered chunks to the temporary file so it can be inspected
    pub async fn flush(&mut self) -> Result<(), PublishError> {
        self.file
            .flush()
            .await
            .map_err(|e| PublishError::io(&self.dest, e))
    }

    /// Path of the uncommitted temporary file
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Flush to disk and rename over the destination
    pub async fn commit(self) -> Result<u64, PublishError> {
        let Self {
            dest,
            mut file,
            temp_path,
            written,
        } = self;

        file.flush().await.map_err(|e| PublishError::io(&dest, e))?;
        file.sync_all()
            .await
            .map_err(|e| PublishError::io(&dest, e))?;
        drop(file);

        temp_path
            .persist(&dest)
            .map_err(|e| PublishError::io(&dest, e.error))?;

        debug!(path = %dest.display(), bytes = written, "Published file");
        Ok(written)
    }
}

/// Atomically replace `dest` with `bytes`
pub async fn publish(dest: &Path, bytes: &[u8]) -> Result<(), PublishError> {
    let mut writer = AtomicWriter::create(dest).await?;
    writer.write_chunk(bytes).await?;
    writer.commit().await?;
    Ok(())
}
