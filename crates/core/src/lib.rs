// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! taskmill-core: domain types for the Taskmill task scheduler

pub mod clock;
pub mod project;
pub mod task;
pub mod time_fmt;
pub mod trigger;

pub use clock::{Clock, FakeClock, SystemClock};
pub use project::ProjectReference;
pub use task::{TaskDefinition, TaskStatus};
pub use time_fmt::{format_timestamp, log_timestamp};
pub use trigger::{Trigger, TriggerError, TriggerSpec};
