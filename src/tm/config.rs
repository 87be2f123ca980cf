// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Configuration for the coordinator.

use std::time::Duration;

/// Backoff schedule for decision broadcasts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per participant before giving up and logging.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Ceiling for the exponential backoff.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after the given zero-based failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        exp.min(self.max_delay)
    }
}

/// Configuration for [`TransactionManager`](super::TransactionManager)
/// initialization.
#[derive(Debug, Clone)]
pub struct TmConfig {
    /// Per-hop deadline for participant prepare calls (and for each
    /// broadcast attempt).
    pub prepare_timeout: Duration,
    /// Caller-facing deadline for the whole commit driver; past it the
    /// caller gets `IN_DOUBT` while the driver runs on.
    pub commit_timeout: Duration,
    /// Backoff schedule for commit/abort broadcasts.
    pub retry: RetryPolicy,
}

impl Default for TmConfig {
    fn default() -> Self {
        Self {
            prepare_timeout: Duration::from_secs(3),
            commit_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

impl TmConfig {
    /// Sets the per-hop prepare deadline.
    pub fn with_prepare_timeout(mut self, timeout: Duration) -> Self {
        self.prepare_timeout = timeout;
        self
    }

    /// Sets the caller-facing commit deadline.
    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    /// Sets the broadcast retry schedule.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
