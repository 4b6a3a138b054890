// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Taskmill execution engine: scheduler, task runner, rotating log store,
//! provisioning cache, and the registry reconciling persisted definitions
//! with live scheduler jobs.

pub mod env;
mod provision;
mod registry;
mod rotating_log;
mod runner;
mod scheduler;
mod store;

pub use provision::{
    CommandProvisioner, NoopProvisioner, ProvisionCache, Provisioner, ProvisioningError,
};
pub use registry::{RegistryConfig, RegistryError, TaskRegistry};
pub use rotating_log::{LogError, RotatingLog};
pub use runner::{RunnerError, TaskRunner};
pub use scheduler::{JobInfo, JobScheduler, SchedulerError};
pub use store::{StoreData, StoreError, TaskStore};
