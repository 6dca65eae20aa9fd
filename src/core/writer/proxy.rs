// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ReaderProxy -- Per-matched-reader state for a reliable Writer
//!
//! Mirror of the reader-side [`crate::core::reader::WriterProxy`]: tracks
//! which sequence numbers a matched reader has acknowledged, which it has
//! explicitly NACK'd (the `requested` set repair-drains from), and
//! per-sample fragment-level NACKs.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::core::reader::LivelinessKind;

/// RTPS Writer state per matched remote reader (RTPS Sec.8.4.7 ReaderProxy).
#[derive(Debug, Clone)]
pub struct ReaderProxy {
    reader_guid: [u8; 16],
    unicast_addr: SocketAddr,

    /// Highest SN acknowledged contiguously from the start (ACKNACK's
    /// `ack_base - 1`).
    acked_up_to: i64,
    /// SNs explicitly requested via an ACKNACK bitmap bit; drained by the
    /// NACK-response repair pass.
    requested: BTreeSet<i64>,
    /// Per-SN fragment numbers requested via NACKFRAG, for partially
    /// delivered fragmented samples.
    requested_fragments: BTreeMap<i64, BTreeSet<u32>>,

    last_acknack_count: u32,

    last_heartbeat_time: Instant,
    liveliness_kind: LivelinessKind,
    lease_duration: Duration,
    last_seen: Instant,

    /// Reader asked for inline QoS on every DATA (ContentFilterProperty,
    /// ownership strength, etc.) rather than relying on SEDP-announced QoS.
    expects_inline_qos: bool,
}

impl ReaderProxy {
    pub fn new(reader_guid: [u8; 16], unicast_addr: SocketAddr, lease_duration: Duration) -> Self {
        let now = Instant::now();
        Self {
            reader_guid,
            unicast_addr,
            acked_up_to: 0,
            requested: BTreeSet::new(),
            requested_fragments: BTreeMap::new(),
            last_acknack_count: 0,
            last_heartbeat_time: now,
            liveliness_kind: LivelinessKind::Automatic,
            lease_duration,
            last_seen: now,
            expects_inline_qos: false,
        }
    }

    /// Process an incoming ACKNACK. `bitmap` lists the SNs (relative to
    /// `ack_base`, already expanded by the caller) the reader is missing.
    /// Dedups by `count`; returns `true` if this ACKNACK advanced state and
    /// a NACK-response drain should be scheduled.
    pub fn on_acknack(&mut self, ack_base: i64, bitmap: &[i64], count: u32) -> bool {
        crate::trace_fn!("ReaderProxy::on_acknack");
        if count <= self.last_acknack_count && self.last_acknack_count > 0 {
            log::trace!(
                "[READER-PROXY] ignoring stale ACKNACK count={} (last={})",
                count,
                self.last_acknack_count
            );
            return false;
        }
        self.last_acknack_count = count;
        self.last_seen = Instant::now();

        if ack_base - 1 > self.acked_up_to {
            self.acked_up_to = ack_base - 1;
        }
        self.requested.retain(|&sn| sn >= ack_base);
        for &sn in bitmap {
            self.requested.insert(sn);
        }

        log::debug!(
            "[READER-PROXY] ACKNACK base={} bitmap_len={} -> acked_up_to={}, requested={}",
            ack_base,
            bitmap.len(),
            self.acked_up_to,
            self.requested.len()
        );
        true
    }

    /// Queue specific fragments of `sn` for retransmission.
    pub fn on_nackfrag(&mut self, sn: i64, frag_bitmap: &[u32]) {
        crate::trace_fn!("ReaderProxy::on_nackfrag");
        self.last_seen = Instant::now();
        let entry = self.requested_fragments.entry(sn).or_default();
        entry.extend(frag_bitmap.iter().copied());
    }

    /// Snapshot of SNs currently requested for whole-sample repair.
    #[must_use]
    pub fn requested_changes(&self) -> Vec<i64> {
        self.requested.iter().copied().collect()
    }

    /// Snapshot of fragment-level NACKs pending repair.
    #[must_use]
    pub fn requested_fragments(&self) -> Vec<(i64, Vec<u32>)> {
        self.requested_fragments
            .iter()
            .map(|(sn, frags)| (*sn, frags.iter().copied().collect()))
            .collect()
    }

    /// Mark that `sn` has been retransmitted; drop it from the requested
    /// set (and any fragment-level NACKs for it).
    pub fn mark_change_sent(&mut self, sn: i64) {
        self.requested.remove(&sn);
        self.requested_fragments.remove(&sn);
    }

    pub fn set_liveliness(&mut self, kind: LivelinessKind) {
        self.liveliness_kind = kind;
    }

    #[must_use]
    pub fn liveliness_kind(&self) -> LivelinessKind {
        self.liveliness_kind
    }

    pub fn set_expects_inline_qos(&mut self, expects: bool) {
        self.expects_inline_qos = expects;
    }

    #[must_use]
    pub fn expects_inline_qos(&self) -> bool {
        self.expects_inline_qos
    }

    /// True once the reader has ACKed everything and nothing is pending
    /// repair.
    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        self.requested.is_empty() && self.requested_fragments.is_empty()
    }

    pub fn needs_heartbeat(&self, min_interval: Duration) -> bool {
        self.last_heartbeat_time.elapsed() >= min_interval
    }

    pub fn heartbeat_sent(&mut self) {
        self.last_heartbeat_time = Instant::now();
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.last_seen.elapsed() > self.lease_duration.mul_f32(1.5)
    }

    #[must_use]
    pub fn reader_guid(&self) -> &[u8; 16] {
        &self.reader_guid
    }

    #[must_use]
    pub fn unicast_addr(&self) -> SocketAddr {
        self.unicast_addr
    }

    #[must_use]
    pub fn acked_up_to(&self) -> i64 {
        self.acked_up_to
    }

    #[must_use]
    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    pub fn set_unicast_addr(&mut self, addr: SocketAddr) {
        self.unicast_addr = addr;
    }

    pub fn set_lease_duration(&mut self, duration: Duration) {
        self.lease_duration = duration;
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn make_guid(id: u8) -> [u8; 16] {
        let mut guid = [0u8; 16];
        guid[0] = id;
        guid
    }

    fn make_addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)), port)
    }

    #[test]
    fn new_proxy_is_synchronized_with_nothing_outstanding() {
        let proxy = ReaderProxy::new(make_guid(1), make_addr(7400), Duration::from_secs(10));
        assert_eq!(proxy.acked_up_to(), 0);
        assert!(proxy.is_synchronized());
        assert!(!proxy.is_expired());
    }

    #[test]
    fn acknack_moves_bitmap_bits_into_requested_set() {
        let mut proxy = ReaderProxy::new(make_guid(1), make_addr(7400), Duration::from_secs(10));
        let advanced = proxy.on_acknack(3, &[3, 4, 6], 1);
        assert!(advanced);
        assert_eq!(proxy.acked_up_to(), 2);
        assert_eq!(proxy.requested_changes(), vec![3, 4, 6]);
        assert!(!proxy.is_synchronized());
    }

    #[test]
    fn repair_sent_clears_requested_entry() {
        let mut proxy = ReaderProxy::new(make_guid(1), make_addr(7400), Duration::from_secs(10));
        proxy.on_acknack(1, &[1, 2], 1);
        proxy.mark_change_sent(1);
        assert_eq!(proxy.requested_changes(), vec![2]);
        proxy.mark_change_sent(2);
        assert!(proxy.is_synchronized());
    }

    #[test]
    fn stale_acknack_count_is_ignored() {
        let mut proxy = ReaderProxy::new(make_guid(1), make_addr(7400), Duration::from_secs(10));
        proxy.on_acknack(5, &[], 2);
        let advanced = proxy.on_acknack(10, &[], 2);
        assert!(!advanced);
        assert_eq!(proxy.acked_up_to(), 4);
    }

    #[test]
    fn nackfrag_queues_fragment_numbers() {
        let mut proxy = ReaderProxy::new(make_guid(1), make_addr(7400), Duration::from_secs(10));
        proxy.on_nackfrag(7, &[2, 4, 6]);
        assert_eq!(proxy.requested_fragments(), vec![(7, vec![2, 4, 6])]);
        assert!(!proxy.is_synchronized());

        proxy.mark_change_sent(7);
        assert!(proxy.requested_fragments().is_empty());
    }

    #[test]
    fn needs_heartbeat_after_interval() {
        let mut proxy = ReaderProxy::new(make_guid(1), make_addr(7400), Duration::from_secs(10));
        assert!(!proxy.needs_heartbeat(Duration::from_secs(1)));
        proxy.heartbeat_sent();
        assert!(!proxy.needs_heartbeat(Duration::from_millis(10)));
    }

    #[test]
    fn expiry_after_lease_elapses() {
        let proxy = ReaderProxy::new(make_guid(1), make_addr(7400), Duration::from_millis(1));
        assert!(!proxy.is_expired());
        std::thread::sleep(Duration::from_millis(3));
        assert!(proxy.is_expired());
    }
}
