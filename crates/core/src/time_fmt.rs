// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! Relative-timestamp formatting for console log lines.

use std::time::Duration;

/// Format an elapsed duration as the `+<secs>.<millis>s` prefix used on
/// log lines relayed to the client, e.g. `"+1.234s"`.
pub fn format_relative(elapsed: Duration) -> String {
    format!("+{}.{:03}s", elapsed.as_secs(), elapsed.subsec_millis())
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
