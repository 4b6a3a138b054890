// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-time project environment provisioning.
//!
//! The set of projects whose execution environment has been set up is
//! tracked process-wide, keyed by absolute project path. A single mutex
//! serializes provisioning across tasks sharing a project; it is only held
//! during the one-time setup, never during task execution.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Project environment setup failed. Fatal to that run; the path is not
/// marked provisioned, so other projects are unaffected and this one is
/// retried on the next run.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("provisioning '{project}' failed: {message}")]
    Setup { project: PathBuf, message: String },
}

/// Performs the actual one-time setup for a project directory.
pub trait Provisioner: Send + Sync {
    fn provision(&self, project_root: &Path) -> Result<(), ProvisioningError>;
}

/// Runs a setup command (e.g. a dependency sync) inside the project
/// directory and requires it to exit zero.
pub struct CommandProvisioner {
    program: String,
    args: Vec<String>,
}

impl CommandProvisioner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Provisioner for CommandProvisioner {
    fn provision(&self, project_root: &Path) -> Result<(), ProvisioningError> {
        let cwd = if project_root.is_dir() {
            project_root
        } else {
            project_root.parent().unwrap_or(project_root)
        };
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(cwd)
            .output()
            .map_err(|e| ProvisioningError::Setup {
                project: project_root.to_path_buf(),
                message: format!("failed to launch {}: {}", self.program, e),
            })?;
        if !output.status.success() {
            return Err(ProvisioningError::Setup {
                project: project_root.to_path_buf(),
                message: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

/// Does nothing. Used when no setup command is configured.
pub struct NoopProvisioner;

impl Provisioner for NoopProvisioner {
    fn provision(&self, _project_root: &Path) -> Result<(), ProvisioningError> {
        Ok(())
    }
}

/// Process-wide cache of provisioned project paths.
pub struct ProvisionCache {
    provisioner: Box<dyn Provisioner>,
    seen: Mutex<HashSet<PathBuf>>,
}

impl ProvisionCache {
    pub fn new(provisioner: Box<dyn Provisioner>) -> Self {
        Self {
            provisioner,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// A cache that never provisions anything.
    pub fn noop() -> Self {
        Self::new(Box::new(NoopProvisioner))
    }

    /// Provision `project_root` unless this process already has. At most one
    /// provisioning runs per path for the process lifetime, no matter how
    /// many tasks share the project.
    pub fn ensure(&self, project_root: &Path) -> Result<(), ProvisioningError> {
        let key = project_root
            .canonicalize()
            .unwrap_or_else(|_| project_root.to_path_buf());

        let mut seen = self.seen.lock();
        if seen.contains(&key) {
            return Ok(());
        }
        tracing::info!(project = %key.display(), "provisioning project environment");
        self.provisioner.provision(&key)?;
        seen.insert(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "provision_tests.rs"]
mod tests;
