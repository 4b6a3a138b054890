// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task definitions: the domain object binding a project, a command, and a
//! trigger. Backed 1:1 by a scheduler job and a task runner.

use crate::trigger::TriggerSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether the task's trigger is allowed to fire.
///
/// This field is the single source of truth; the scheduler's pause state is a
/// mirror updated as a side effect of definition changes, never the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Paused,
}

/// A persisted task definition. Task names are globally unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    /// Name of the project the command runs against.
    pub project: String,
    pub trigger: TriggerSpec,
    pub command: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskDefinition {
    pub fn new(
        name: impl Into<String>,
        project: impl Into<String>,
        trigger: TriggerSpec,
        command: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
            trigger,
            command: command.into(),
            status: TaskStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.status == TaskStatus::Paused
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
