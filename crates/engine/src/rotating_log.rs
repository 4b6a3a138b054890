// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Size-bounded append-only log store with numbered backups.
//!
//! One log per task. The active file is rotated once a write would push it
//! past `max_size`: backups shift `N-1 -> N` (oldest overwritten), the active
//! file becomes backup `1`, and a fresh active file is opened. Every step is
//! an atomic rename, so a crash mid-rotation loses at most the in-flight
//! step and never merges files. Total disk usage stays bounded by
//! `max_size * (backup_count + 1)` plus one in-flight line.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use taskmill_core::time_fmt::log_timestamp;
use thiserror::Error;

/// Chunk size for reverse tail reads.
const TAIL_CHUNK: u64 = 4096;

/// Errors from the log store.
#[derive(Debug, Error)]
pub enum LogError {
    /// Disk or permission failure while shifting backups. Fatal to that
    /// write; the active file is preserved in its pre-rotation state.
    #[error("log rotation failed: {0}")]
    Rotation(#[source] std::io::Error),
    #[error("log I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A rotating log file. Flushes and closes on drop, so it can be used as a
/// scoped resource.
pub struct RotatingLog {
    path: PathBuf,
    max_size: u64,
    backup_count: u32,
    file: Option<File>,
}

impl RotatingLog {
    /// Open a rotating log at `path`, creating parent directories. The file
    /// itself is created lazily on first write.
    pub fn open(
        path: impl Into<PathBuf>,
        max_size: u64,
        backup_count: u32,
    ) -> Result<Self, LogError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            max_size,
            backup_count,
            file: None,
        })
    }

    /// Path of the active file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of backup `index` (1 = newest). Index 0 is the active file.
    /// `task.log` becomes `task.1.log`, `task.2.log`, ...
    fn backup_path(&self, index: u32) -> PathBuf {
        if index == 0 {
            return self.path.clone();
        }
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self.path.extension() {
            Some(ext) => format!("{}.{}.{}", stem, index, ext.to_string_lossy()),
            None => format!("{}.{}", stem, index),
        };
        self.path.with_file_name(name)
    }

    fn active_size(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Append raw bytes to the active file, rotating first when the write
    /// would push the active file to `max_size` or beyond.
    pub fn write(&mut self, line: &str) -> Result<(), LogError> {
        if self.active_size() + line.len() as u64 >= self.max_size {
            self.rotate()?;
        }
        if self.file.is_none() {
            self.file = Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?,
            );
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(line.as_bytes())?;
        }
        Ok(())
    }

    /// Write a timestamp-prefixed line, unless the message already embeds
    /// the current timestamp (e.g. output that was stamped upstream).
    pub fn log(&mut self, message: &str, level: &str) -> Result<(), LogError> {
        let ts = log_timestamp();
        let entry = if message.contains(&ts) {
            format!("{}\n", message)
        } else {
            format!("[{}] {}: {}\n", ts, level, message)
        };
        self.write(&entry)
    }

    /// Shift backups up by one index, retire the active file to backup `1`,
    /// and start a fresh active file.
    fn rotate(&mut self) -> Result<(), LogError> {
        // Close the active file before renaming it.
        self.close()?;

        if !self.path.exists() {
            return Ok(());
        }

        if self.backup_count == 0 {
            // No backups kept: truncate in place.
            File::create(&self.path).map_err(LogError::Rotation)?;
            return Ok(());
        }

        for index in (1..self.backup_count).rev() {
            let src = self.backup_path(index);
            if src.exists() {
                fs::rename(&src, self.backup_path(index + 1)).map_err(LogError::Rotation)?;
            }
        }
        fs::rename(&self.path, self.backup_path(1)).map_err(LogError::Rotation)?;
        Ok(())
    }

    /// Up to `limit` most-recent lines, newest first.
    ///
    /// Scans the active file, then backups from newest (`1`) to oldest.
    /// Within each file lines are read back-to-front in fixed-size chunks so
    /// large files are never loaded whole.
    pub fn readlines(&self, limit: usize) -> Result<Vec<String>, LogError> {
        let mut lines = Vec::new();
        for index in 0..=self.backup_count {
            let path = self.backup_path(index);
            if !path.exists() {
                break;
            }
            tail_lines(&path, limit.saturating_sub(lines.len()), &mut lines)?;
            if lines.len() >= limit {
                break;
            }
        }
        lines.truncate(limit);
        Ok(lines)
    }

    /// Delete the active file and every backup. Used when the owning task is
    /// removed; the log can still be written afterwards (it starts fresh).
    pub fn purge(&mut self) -> Result<(), LogError> {
        self.close()?;
        for index in 0..=self.backup_count {
            let path = self.backup_path(index);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Flush and close the active file. Safe to call repeatedly; the next
    /// write reopens.
    pub fn close(&mut self) -> Result<(), LogError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

impl Drop for RotatingLog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to flush log on close");
        }
    }
}

/// Append up to `limit` lines of `path` to `out`, newest first, reading the
/// file backwards in `TAIL_CHUNK`-sized pieces.
fn tail_lines(path: &Path, limit: usize, out: &mut Vec<String>) -> Result<(), LogError> {
    if limit == 0 {
        return Ok(());
    }
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();

    // Bytes not yet consumed, plus a carry of the partial line spanning the
    // chunk boundary.
    let mut remaining = len;
    let mut carry: Vec<u8> = Vec::new();
    let mut collected = 0usize;

    while remaining > 0 && collected < limit {
        let read_size = remaining.min(TAIL_CHUNK);
        remaining -= read_size;
        file.seek(SeekFrom::Start(remaining))?;

        let mut chunk = vec![0u8; read_size as usize];
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&carry);

        let mut parts = chunk.split(|&b| b == b'\n');
        // The first part may continue into the previous (earlier) chunk;
        // hold it back unless we've reached the start of the file.
        let head = parts.next().unwrap_or_default().to_vec();
        let mut complete: Vec<&[u8]> = parts.collect();
        complete.reverse();
        for part in complete {
            if part.is_empty() {
                continue;
            }
            out.push(String::from_utf8_lossy(part).into_owned());
            collected += 1;
            if collected >= limit {
                return Ok(());
            }
        }
        carry = head;
    }

    if !carry.is_empty() && collected < limit {
        out.push(String::from_utf8_lossy(&carry).into_owned());
    }
    Ok(())
}

#[cfg(test)]
#[path = "rotating_log_tests.rs"]
mod tests;
