// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable task and project definitions.
//!
//! The store is a single JSON document holding every task definition and
//! project reference. Saves are atomic (write to `.tmp`, then rename) so a
//! crash mid-save never leaves a half-written file; a corrupt file is moved
//! aside to `.bak` and the registry starts from an empty store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use taskmill_core::{ProjectReference, TaskDefinition};
use thiserror::Error;
use tracing::warn;

/// Errors from loading or saving the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything the daemon persists, keyed by name. `BTreeMap` keeps the
/// on-disk document in a stable order for diffing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskDefinition>,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectReference>,
}

/// File-backed store of task and project definitions.
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the store, returning an empty one when the file does not exist.
    ///
    /// A file that no longer parses is quarantined to `.bak` so a bad write
    /// or manual edit cannot wedge startup.
    pub fn load(&self) -> Result<StoreData, StoreError> {
        if !self.path.exists() {
            return Ok(StoreData::default());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        match serde_json::from_reader(reader) {
            Ok(data) => Ok(data),
            Err(e) => {
                let bak = self.path.with_extension("bak");
                warn!(
                    error = %e,
                    path = %self.path.display(),
                    bak = %bak.display(),
                    "corrupt task store, moving to .bak and starting fresh",
                );
                fs::rename(&self.path, &bak)?;
                Ok(StoreData::default())
            }
        }
    }

    /// Save atomically: write to `.tmp`, sync, then rename over the target.
    pub fn save(&self, data: &StoreData) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, data)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
