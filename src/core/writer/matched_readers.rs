// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MatchedReadersRegistry - Thread-safe registry of matched readers for a Writer
//!
//! Provides concurrent access to [`ReaderProxy`] instances, allowing:
//! - Control thread: ACKNACK/NACKFRAG handling, HEARTBEAT scheduling
//! - Data thread: Unicast address lookup for DATA delivery
//!
//! Uses DashMap for lock-free concurrent access.

use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use super::proxy::ReaderProxy;

/// Thread-safe registry of [`ReaderProxy`] instances for a Writer endpoint.
///
/// Shared between control thread (ACKNACK handling) and data thread (DATA sending).
pub struct MatchedReadersRegistry {
    /// Map from reader GUID to proxy state
    proxies: Arc<DashMap<[u8; 16], ReaderProxy>>,
}

impl Default for MatchedReadersRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchedReadersRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            proxies: Arc::new(DashMap::new()),
        }
    }

    /// Add or update a matched reader
    ///
    /// Called when SEDP discovers a new reader or updates an existing one.
    pub fn add_reader(
        &self,
        reader_guid: [u8; 16],
        unicast_addr: SocketAddr,
        lease_duration: Duration,
    ) {
        self.proxies
            .entry(reader_guid)
            .and_modify(|proxy| {
                proxy.set_unicast_addr(unicast_addr);
                proxy.set_lease_duration(lease_duration);
                proxy.touch();
            })
            .or_insert_with(|| ReaderProxy::new(reader_guid, unicast_addr, lease_duration));
    }

    /// Process an ACKNACK from a reader.
    ///
    /// `bitmap` lists the SNs the reader is missing (already expanded by
    /// the caller from the wire bitmap). Returns `true` if this ACKNACK
    /// was not a stale duplicate and a NACK-response drain should run.
    pub fn on_acknack(&self, reader_guid: &[u8; 16], ack_base: i64, bitmap: &[i64], count: u32) -> bool {
        self.proxies
            .get_mut(reader_guid)
            .map(|mut proxy| proxy.on_acknack(ack_base, bitmap, count))
            .unwrap_or(false)
    }

    /// Process a NACKFRAG from a reader, queuing the requested fragments.
    pub fn on_nackfrag(&self, reader_guid: &[u8; 16], sn: i64, frag_bitmap: &[u32]) {
        if let Some(mut proxy) = self.proxies.get_mut(reader_guid) {
            proxy.on_nackfrag(sn, frag_bitmap);
        }
    }

    /// Drain all SNs (whole-sample repair) currently requested across
    /// every matched reader, paired with the reader's unicast address.
    pub fn drain_requested_changes(&self) -> Vec<([u8; 16], SocketAddr, Vec<i64>)> {
        self.proxies
            .iter()
            .map(|p| (*p.reader_guid(), p.unicast_addr(), p.requested_changes()))
            .filter(|(_, _, sns)| !sns.is_empty())
            .collect()
    }

    /// Mark a repaired SN as sent for a given reader, clearing it from
    /// that reader's requested set.
    pub fn mark_change_sent(&self, reader_guid: &[u8; 16], sn: i64) {
        if let Some(mut proxy) = self.proxies.get_mut(reader_guid) {
            proxy.mark_change_sent(sn);
        }
    }

    /// Get all unicast addresses for matched readers
    ///
    /// Used for sending DATA to all readers (multicast fallback or unicast fan-out).
    pub fn get_all_addrs(&self) -> Vec<SocketAddr> {
        self.proxies.iter().map(|p| p.unicast_addr()).collect()
    }

    /// Get readers that need a HEARTBEAT
    ///
    /// # Arguments
    /// - `min_interval`: Minimum time between HEARTBEATs
    ///
    /// # Returns
    /// List of (reader_guid, unicast_addr) pairs needing HEARTBEAT
    pub fn get_needing_heartbeat(&self, min_interval: Duration) -> Vec<([u8; 16], SocketAddr)> {
        self.proxies
            .iter()
            .filter(|p| p.needs_heartbeat(min_interval))
            .map(|p| (*p.reader_guid(), p.unicast_addr()))
            .collect()
    }

    /// Get the slowest reader (lowest acked_up_to)
    ///
    /// Used to determine which samples can be discarded from history.
    ///
    /// # Returns
    /// (reader_guid, acked_up_to) of the slowest reader, or None if empty
    pub fn slowest_reader(&self) -> Option<([u8; 16], i64)> {
        self.proxies
            .iter()
            .min_by_key(|p| p.acked_up_to())
            .map(|p| (*p.reader_guid(), p.acked_up_to()))
    }

    /// Readers that have not yet acknowledged `sn` -- a GAP for `sn` must be
    /// sent to each one (the writer dropped a cache, via KEEP_LAST eviction
    /// or an explicit remove, before every matched reader acked it).
    pub fn readers_needing_gap(&self, sn: i64) -> Vec<[u8; 16]> {
        self.proxies
            .iter()
            .filter(|p| p.acked_up_to() < sn)
            .map(|p| *p.reader_guid())
            .collect()
    }

    /// Check if all readers are synchronized
    ///
    /// Returns true if all matched readers have acknowledged everything
    /// and have nothing pending repair.
    pub fn all_synchronized(&self) -> bool {
        !self.proxies.is_empty() && self.proxies.iter().all(|p| p.is_synchronized())
    }

    /// Remove a reader (e.g., when SEDP reports it gone)
    pub fn remove(&self, reader_guid: &[u8; 16]) -> bool {
        self.proxies.remove(reader_guid).is_some()
    }

    /// Cleanup expired proxies
    ///
    /// # Returns
    /// Number of proxies removed
    pub fn cleanup_expired(&self) -> usize {
        let before = self.proxies.len();
        self.proxies.retain(|_, proxy| !proxy.is_expired());
        before - self.proxies.len()
    }

    /// Number of matched readers
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Clear all proxies
    pub fn clear(&self) {
        self.proxies.clear();
    }

    /// Get proxy for a reader (for inspection/debugging)
    pub fn get_proxy(
        &self,
        reader_guid: &[u8; 16],
    ) -> Option<dashmap::mapref::one::Ref<'_, [u8; 16], ReaderProxy>> {
        self.proxies.get(reader_guid)
    }
}
