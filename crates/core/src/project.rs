// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project references: the filesystem-rooted unit of code a task runs against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A named pointer to a project on disk. The root may be a directory or a
/// single script file; existence is a precondition for any run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectReference {
    pub name: String,
    pub root: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectReference {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the root still resolves on disk.
    pub fn exists(&self) -> bool {
        self.root.exists()
    }

    /// The directory a task's subprocess runs in: the root itself for
    /// directories, the containing directory for single-file projects.
    /// `None` when the root is gone.
    pub fn exec_dir(&self) -> Option<&Path> {
        if self.root.is_dir() {
            Some(self.root.as_path())
        } else if self.root.is_file() {
            self.root.parent()
        } else {
            None
        }
    }
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;
