// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reliable Reader State Machine -- RTPS Sec.8.4.9
//!
//! This module tracks per-matched-writer state for reliable data
//! reception: the [`WriterProxy`] state machine, and a thread-safe
//! registry of proxies keyed by writer GUID.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |  WriterProxyRegistry (thread-safe, shared)                  |
//! |  +---------------------------------------------------------+|
//! |  |  DashMap<WriterGUID, WriterProxy>                       ||
//! |  +---------------------------------------------------------+|
//! |                                                             |
//! |  Used by:                                                   |
//! |  - Receive threads: process_heartbeat/process_data          |
//! |  - Event thread pool: heartbeat-response timer fire         |
//! +-------------------------------------------------------------+
//! ```
//!
//! # Thread Safety
//!
//! Uses DashMap for lock-free concurrent access from multiple threads.

mod endpoint;
mod proxy;

pub use endpoint::{DataAvailableListener, Reader};
pub use proxy::{AcknackDecision, HeartbeatOutcome, LivelinessKind, WriterProxy};

use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe registry of [`WriterProxy`] instances, shared between the
/// receive threads (HEARTBEAT/DATA handling) and the event thread pool
/// (heartbeat-response timer, liveliness sweep).
#[derive(Debug, Clone)]
pub struct WriterProxyRegistry {
    proxies: Arc<DashMap<[u8; 16], WriterProxy>>,
}

impl Default for WriterProxyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterProxyRegistry {
    pub fn new() -> Self {
        Self {
            proxies: Arc::new(DashMap::new()),
        }
    }

    /// Pair with a newly matched writer, installing a proxy active from
    /// `initial_sn` (the last-notified registry baseline for late joiners).
    pub fn matched_writer_add(&self, writer_guid: [u8; 16], initial_sn: i64) {
        let mut proxy = WriterProxy::new(writer_guid);
        proxy.start(initial_sn);
        self.proxies.insert(writer_guid, proxy);
    }

    /// Unpair a writer; stops the proxy's pending response and drops it.
    pub fn matched_writer_remove(&self, writer_guid: &[u8; 16]) -> Option<WriterProxy> {
        self.proxies.remove(writer_guid).map(|(_, mut p)| {
            p.stop();
            p
        })
    }

    /// Process a HEARTBEAT from a remote writer, creating the proxy (active
    /// from SN 0) if this writer was never explicitly matched.
    pub fn on_heartbeat(
        &self,
        writer_guid: [u8; 16],
        count: u32,
        first_sn: i64,
        last_sn: i64,
        final_flag: bool,
        liveliness_flag: bool,
    ) -> HeartbeatOutcome {
        let mut proxy = self.proxies.entry(writer_guid).or_insert_with(|| {
            let mut p = WriterProxy::new(writer_guid);
            p.start(0);
            p
        });
        proxy.process_heartbeat(count, first_sn, last_sn, final_flag, liveliness_flag)
    }

    /// Record that DATA with the given SN was received from a writer.
    pub fn on_data(&self, writer_guid: [u8; 16], sn: i64) {
        let mut proxy = self.proxies.entry(writer_guid).or_insert_with(|| {
            let mut p = WriterProxy::new(writer_guid);
            p.start(0);
            p
        });
        proxy.received_change_set(sn);
    }

    pub fn mark_heartbeat_response_sent(&self, writer_guid: &[u8; 16]) {
        if let Some(mut proxy) = self.proxies.get_mut(writer_guid) {
            proxy.mark_heartbeat_response_sent();
        }
    }

    /// Mark a change irrelevant (GAP'd, content-filtered, or rejected by a
    /// resource limit), creating the proxy (active from SN 0) if this
    /// writer was never explicitly matched.
    pub fn mark_irrelevant(&self, writer_guid: [u8; 16], sn: i64) {
        let mut proxy = self.proxies.entry(writer_guid).or_insert_with(|| {
            let mut p = WriterProxy::new(writer_guid);
            p.start(0);
            p
        });
        proxy.irrelevant_change_set(sn);
    }

    /// Advance the notification cursor for a writer (caller has just
    /// notified the user up through `sn`).
    pub fn advance_notified(&self, writer_guid: [u8; 16], sn: i64) {
        if let Some(mut proxy) = self.proxies.get_mut(&writer_guid) {
            proxy.advance_notified(sn);
        }
    }

    #[must_use]
    pub fn get_proxy(&self, writer_guid: &[u8; 16]) -> Option<WriterProxy> {
        self.proxies.get(writer_guid).map(|p| p.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn remove(&self, writer_guid: &[u8; 16]) -> Option<WriterProxy> {
        self.proxies.remove(writer_guid).map(|(_, p)| p)
    }

    pub fn clear(&self) {
        self.proxies.clear();
    }
}
