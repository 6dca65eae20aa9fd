// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flow control for asynchronous sample delivery -- RTPS Sec.8.4.7.2.
//!
//! A [`FlowController`] paces the writers that share it according to a
//! configured [`SchedulingKind`] (which queued cache goes out next) and
//! [`PublishMode`] (synchronous, best-effort-then-async, or bandwidth-capped
//! async). `PureSync` writers never touch the queue; `Sync` and
//! `LimitedAsync` writers enqueue and a worker thread drains them by
//! calling back into the writer's `deliver_sample_nts`.
//!
//! # Architecture
//!
//! ```text
//! +-----------------------------------------------------------------+
//! |                       FlowController                             |
//! |  +------------------+  +------------------------------------+   |
//! |  | Queue             |  | SchedulingKind                     |   |
//! |  | (prev,next) chain |  | Fifo / RoundRobin / HighPriority /  |   |
//! |  | per-writer index  |  | PriorityWithReservation             |   |
//! |  +------------------+  +------------------------------------+   |
//! |  +------------------+  +------------------------------------+   |
//! |  | TokenBucket        |  | PublishMode                       |   |
//! |  | (LimitedAsync cap) |  | PureSync / Sync / LimitedAsync    |   |
//! |  +------------------+  +------------------------------------+   |
//! +-----------------------------------------------------------------+
//! ```

pub mod config;
pub mod controller;
pub mod token_bucket;

pub use config::{ConfigError, FlowControllerConfig, PublishMode, SchedulingKind, WriterSchedule};
pub use controller::{DeliverOutcome, FlowController, QueueHandle, SampleDeliverer};
pub use token_bucket::TokenBucket;
