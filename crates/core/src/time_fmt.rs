// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared timestamp formatting for log lines and store records.

use chrono::{DateTime, Utc};

/// Format an instant as `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// The current time in the format task log lines are prefixed with.
pub fn log_timestamp() -> String {
    format_timestamp(Utc::now())
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
