// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Configuration for the workflow controller.

use std::time::Duration;

/// Configuration for [`WorkflowController`](super::WorkflowController)
/// initialization.
#[derive(Debug, Clone)]
pub struct WcConfig {
    /// Abort the enclosing transaction automatically when a downstream
    /// call under it fails.
    pub auto_abort: bool,
    /// Client-facing deadline for commit; past it the client is told
    /// `IN_DOUBT` and pointed at the status endpoint.
    pub commit_timeout: Duration,
    /// Deadline for each health probe during reconnect.
    pub probe_timeout: Duration,
}

impl Default for WcConfig {
    fn default() -> Self {
        Self {
            auto_abort: true,
            commit_timeout: Duration::from_secs(15),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

impl WcConfig {
    /// Enables or disables the auto-abort policy.
    pub fn with_auto_abort(mut self, enabled: bool) -> Self {
        self.auto_abort = enabled;
        self
    }

    /// Sets the client-facing commit deadline.
    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    /// Sets the per-endpoint health probe deadline.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}
