// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flow controller configuration.
//!
//! A flow controller is configured independently of the endpoints that use
//! it: a scheduling discipline (how the next queued cache is chosen) and a
//! publishing mode (whether delivery happens synchronously, asynchronously,
//! or bandwidth-limited asynchronously).

use std::time::Duration;

/// Which cache a flow controller's worker thread selects next when more
/// than one writer has pending data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SchedulingKind {
    /// Plain arrival order, ignoring which writer produced the cache.
    #[default]
    Fifo,
    /// Cycle across writers with pending data, one cache per writer per turn.
    RoundRobin,
    /// Always drain the highest-priority non-empty bucket first.
    HighPriority,
    /// Priority buckets, but every writer with an unmet minimum-bandwidth
    /// reservation in the current period is served before priority order
    /// is consulted.
    PriorityWithReservation,
}

/// Per-writer scheduling parameters used by [`SchedulingKind::HighPriority`]
/// and [`SchedulingKind::PriorityWithReservation`].
#[derive(Clone, Copy, Debug, Default)]
pub struct WriterSchedule {
    /// Higher values are served first. Ties fall back to FIFO order.
    pub priority: i32,
    /// Minimum bytes this writer is guaranteed to deliver per period under
    /// `PriorityWithReservation`. Ignored by the other disciplines.
    pub reserved_bytes_per_period: u64,
}

/// Publishing mode: how a flow controller moves a cache from the user
/// thread to the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishMode {
    /// The caller thread delivers synchronously over the "general" locator
    /// list. No queue, no worker thread.
    PureSync,
    /// The caller thread attempts synchronous delivery first; on
    /// `NOT_DELIVERED` the cache is enqueued and later drained by the
    /// controller thread over the "async" locator list.
    Sync,
    /// Every delivery goes through the queue and worker thread. A bandwidth
    /// cap of `max_bytes_per_period` bytes every `period` is enforced across
    /// all writers sharing this controller.
    LimitedAsync { max_bytes_per_period: u64, period: Duration },
}

impl Default for PublishMode {
    fn default() -> Self {
        PublishMode::PureSync
    }
}

/// Flow controller configuration.
#[derive(Clone, Debug, Default)]
pub struct FlowControllerConfig {
    pub scheduling: SchedulingKind,
    pub publish_mode: PublishMode,
    /// Upper bound on cache bytes held in the controller's queue at once.
    /// `0` means unbounded.
    pub max_queue_bytes: usize,
}

impl FlowControllerConfig {
    #[must_use]
    pub fn new(scheduling: SchedulingKind, publish_mode: PublishMode) -> Self {
        Self { scheduling, publish_mode, max_queue_bytes: 0 }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let PublishMode::LimitedAsync { max_bytes_per_period, period } = &self.publish_mode {
            if *max_bytes_per_period == 0 {
                return Err(ConfigError::InvalidRange("max_bytes_per_period must be > 0"));
            }
            if period.is_zero() {
                return Err(ConfigError::InvalidRange("period must be > 0"));
            }
        }
        Ok(())
    }
}

/// Configuration validation error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    InvalidRange(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidRange(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
