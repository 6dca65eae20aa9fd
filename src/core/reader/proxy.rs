// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WriterProxy -- RTPS Sec.8.4.9 State Machine (reader-side)
//!
//! Tracks per-writer state for reliable data reception: which sequence
//! numbers have been received, which are missing and should be requested
//! via ACKNACK, and which have been declared irrelevant (GAP'd, filtered,
//! or superseded by a later HEARTBEAT's `firstSN`). Drives ACKNACK
//! bitmap/base/final-flag computation and the notification cursor that
//! guarantees strictly increasing per-writer delivery order.

use crate::reliability::messages::MAX_BITMAP_BITS;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Decision after processing a HEARTBEAT: whether and how to respond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcknackDecision {
    /// Duplicate or stale HEARTBEAT (count did not advance); no response.
    Ignore,
    /// Nothing missing; send ACKNACK with `final = true`.
    Synchronized { bitmap_base: i64 },
    /// `missing` is non-empty; schedule an ACKNACK after the
    /// heartbeat-response delay.
    NeedData { bitmap_base: i64 },
}

/// Result of [`WriterProxy::process_heartbeat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatOutcome {
    pub decision: AcknackDecision,
    /// Liveliness assertion should be forwarded (HEARTBEAT's liveliness
    /// flag was set, or this HEARTBEAT counts as a contact refresh).
    pub should_assert_liveliness: bool,
    /// Number of SNs moved from `missing` into the implicit-irrelevant
    /// state because they fell below the HEARTBEAT's `firstSN`.
    pub lost_count: u64,
}

/// Per-writer state for a reliable Reader (RTPS Sec.8.4.9 WriterProxy).
#[derive(Debug, Clone)]
pub struct WriterProxy {
    writer_guid: [u8; 16],
    active: bool,

    received: BTreeSet<i64>,
    missing: BTreeSet<i64>,
    irrelevant: BTreeSet<i64>,

    /// Highest SN the writer has announced existing, via HEARTBEAT `lastSN`.
    highest_known: i64,
    /// Highest SN this proxy can vouch is either received or irrelevant,
    /// contiguously from the start -- i.e. the writer's notify-able high
    /// water mark as observed by this proxy.
    available_max: i64,
    /// Last SN delivered to the user via `on_data_available`.
    next_to_notify: i64,

    last_hb_count: u32,
    heartbeat_response_due: bool,

    liveliness_kind: LivelinessKind,
    lease_duration: Duration,
    last_contact: Instant,

    ownership_strength: i32,
}

/// Mirrors [`crate::qos::LivelinessKind`] without requiring a QoS import
/// here; callers translate at the discovery boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivelinessKind {
    Automatic,
    ManualByParticipant,
    ManualByTopic,
}

impl WriterProxy {
    /// Create a proxy that is not yet active; call [`Self::start`] before
    /// processing any protocol event.
    pub fn new(writer_guid: [u8; 16]) -> Self {
        Self {
            writer_guid,
            active: false,
            received: BTreeSet::new(),
            missing: BTreeSet::new(),
            irrelevant: BTreeSet::new(),
            highest_known: 0,
            available_max: 0,
            next_to_notify: 0,
            last_hb_count: 0,
            heartbeat_response_due: false,
            liveliness_kind: LivelinessKind::Automatic,
            lease_duration: Duration::MAX,
            last_contact: Instant::now(),
            ownership_strength: 0,
        }
    }

    /// Install the proxy as active from a late-notification baseline:
    /// `available_max` and `next_to_notify` both start at `initial_sn`, so
    /// a late-joining reader does not re-request history it never needs.
    pub fn start(&mut self, initial_sn: i64) {
        crate::trace_fn!("WriterProxy::start");
        self.active = true;
        self.available_max = initial_sn;
        self.next_to_notify = initial_sn;
        self.last_contact = Instant::now();
    }

    /// Cancel any pending response; idempotent.
    pub fn stop(&mut self) {
        crate::trace_fn!("WriterProxy::stop");
        self.active = false;
        self.heartbeat_response_due = false;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn writer_guid(&self) -> &[u8; 16] {
        &self.writer_guid
    }

    #[must_use]
    pub fn available_max(&self) -> i64 {
        self.available_max
    }

    pub fn set_liveliness(&mut self, kind: LivelinessKind, lease_duration: Duration) {
        self.liveliness_kind = kind;
        self.lease_duration = lease_duration;
    }

    pub fn set_ownership_strength(&mut self, strength: i32) {
        self.ownership_strength = strength;
    }

    #[must_use]
    pub fn ownership_strength(&self) -> i32 {
        self.ownership_strength
    }

    /// Reset the liveliness clock; called on any DATA reception or an
    /// explicit liveliness assertion.
    pub fn touch_liveliness(&mut self) {
        self.last_contact = Instant::now();
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.last_contact.elapsed() <= self.lease_duration
    }

    /// Process a HEARTBEAT; update `missing`/`irrelevant`/`available_max`
    /// and decide whether an ACKNACK response is due.
    pub fn process_heartbeat(
        &mut self,
        count: u32,
        first_sn: i64,
        last_sn: i64,
        final_flag: bool,
        liveliness_flag: bool,
    ) -> HeartbeatOutcome {
        crate::trace_fn!("WriterProxy::process_heartbeat");

        if count <= self.last_hb_count && self.last_hb_count > 0 {
            log::trace!(
                "[WRITER-PROXY] ignoring stale HEARTBEAT count={} (last={})",
                count,
                self.last_hb_count
            );
            return HeartbeatOutcome {
                decision: AcknackDecision::Ignore,
                should_assert_liveliness: liveliness_flag,
                lost_count: 0,
            };
        }
        self.last_hb_count = count;
        self.touch_liveliness();

        if last_sn > self.highest_known {
            self.highest_known = last_sn;
        }

        // Everything the writer still has starts at first_sn; anything we
        // were tracking as missing below that has been superseded.
        let below_first: Vec<i64> = self
            .missing
            .range(..first_sn)
            .copied()
            .collect();
        let lost_count = below_first.len() as u64;
        for sn in below_first {
            self.missing.remove(&sn);
            self.irrelevant.insert(sn);
        }

        // Any SN in [available_max+1, last_sn] not yet accounted for is
        // newly known-missing.
        let lo = (self.available_max + 1).max(first_sn);
        for sn in lo..=last_sn {
            if !self.received.contains(&sn) && !self.irrelevant.contains(&sn) {
                self.missing.insert(sn);
            }
        }
        self.recompute_available_max();

        let bitmap_base = self.missing.iter().next().copied().unwrap_or(self.available_max + 1);

        let decision = if self.missing.is_empty() {
            AcknackDecision::Synchronized { bitmap_base }
        } else {
            self.heartbeat_response_due = !final_flag;
            AcknackDecision::NeedData { bitmap_base }
        };

        log::debug!(
            "[WRITER-PROXY] HEARTBEAT count={} first={} last={} -> {:?}, lost={}",
            count,
            first_sn,
            last_sn,
            decision,
            lost_count
        );

        HeartbeatOutcome {
            decision,
            should_assert_liveliness: liveliness_flag,
            lost_count,
        }
    }

    /// Record that a change with the given SN was received.
    pub fn received_change_set(&mut self, sn: i64) {
        crate::trace_fn!("WriterProxy::received_change_set");
        self.missing.remove(&sn);
        self.received.insert(sn);
        self.touch_liveliness();
        self.recompute_available_max();
    }

    /// Record that a change with the given SN is irrelevant (GAP'd,
    /// content-filtered, or rejected-by-limit).
    pub fn irrelevant_change_set(&mut self, sn: i64) {
        crate::trace_fn!("WriterProxy::irrelevant_change_set");
        self.missing.remove(&sn);
        self.irrelevant.insert(sn);
        self.recompute_available_max();
    }

    /// Snapshot of `missing`, truncated to what fits in one ACKNACK bitmap.
    #[must_use]
    pub fn missing_changes(&self) -> Vec<i64> {
        let Some(&base) = self.missing.iter().next() else {
            return Vec::new();
        };
        self.missing
            .range(base..base + i64::from(MAX_BITMAP_BITS))
            .copied()
            .collect()
    }

    /// Whether this SN has been accounted for (received or irrelevant).
    #[must_use]
    pub fn change_was_received(&self, sn: i64) -> bool {
        self.received.contains(&sn) || self.irrelevant.contains(&sn)
    }

    /// Smallest received SN strictly greater than the last notified SN, or
    /// `None` when caught up.
    #[must_use]
    pub fn next_cache_change_to_be_notified(&self) -> Option<i64> {
        self.received
            .range(self.next_to_notify + 1..)
            .next()
            .copied()
    }

    /// Advance the notification cursor to `sn` (caller has just notified
    /// the user up through `sn`).
    pub fn advance_notified(&mut self, sn: i64) {
        if sn > self.next_to_notify {
            self.next_to_notify = sn;
        }
    }

    #[must_use]
    pub fn next_to_notify(&self) -> i64 {
        self.next_to_notify
    }

    /// Count of SNs below `sn` not yet accounted for in any of
    /// received/irrelevant/missing -- samples the writer hasn't announced
    /// yet but that may still arrive in flight.
    #[must_use]
    pub fn unknown_missing_changes_up_to(&self, sn: i64) -> usize {
        let mut count = 0usize;
        for x in 1..sn {
            if !self.received.contains(&x) && !self.irrelevant.contains(&x) && !self.missing.contains(&x) {
                count += 1;
            }
        }
        count
    }

    #[must_use]
    pub fn heartbeat_response_due(&self) -> bool {
        self.heartbeat_response_due
    }

    pub fn mark_heartbeat_response_sent(&mut self) {
        self.heartbeat_response_due = false;
    }

    fn recompute_available_max(&mut self) {
        let mut max = self.available_max;
        loop {
            let next = max + 1;
            if self.received.contains(&next) || self.irrelevant.contains(&next) {
                max = next;
            } else {
                break;
            }
        }
        self.available_max = max;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guid(id: u8) -> [u8; 16] {
        let mut g = [0u8; 16];
        g[0] = id;
        g
    }

    #[test]
    fn fresh_proxy_needs_data_after_heartbeat() {
        let mut proxy = WriterProxy::new(guid(1));
        proxy.start(0);
        let outcome = proxy.process_heartbeat(1, 1, 1, false, false);
        assert!(matches!(
            outcome.decision,
            AcknackDecision::NeedData { bitmap_base: 1 }
        ));
        assert_eq!(proxy.missing_changes(), vec![1]);
    }

    #[test]
    fn received_change_advances_available_max_and_clears_missing() {
        let mut proxy = WriterProxy::new(guid(1));
        proxy.start(0);
        let _ = proxy.process_heartbeat(1, 1, 3, false, false);
        assert_eq!(proxy.missing_changes(), vec![1, 2, 3]);

        proxy.received_change_set(1);
        proxy.received_change_set(2);
        assert_eq!(proxy.available_max(), 2);
        assert_eq!(proxy.missing_changes(), vec![3]);

        proxy.received_change_set(3);
        assert_eq!(proxy.available_max(), 3);
        assert!(proxy.missing_changes().is_empty());
    }

    #[test]
    fn synchronized_heartbeat_reports_final_when_nothing_missing() {
        let mut proxy = WriterProxy::new(guid(1));
        proxy.start(0);
        proxy.received_change_set(1);
        let outcome = proxy.process_heartbeat(1, 1, 1, false, false);
        assert!(matches!(
            outcome.decision,
            AcknackDecision::Synchronized { bitmap_base: 2 }
        ));
    }

    #[test]
    fn stale_heartbeat_count_is_ignored() {
        let mut proxy = WriterProxy::new(guid(1));
        proxy.start(0);
        let _ = proxy.process_heartbeat(2, 1, 1, false, false);
        let outcome = proxy.process_heartbeat(2, 1, 1, false, false);
        assert_eq!(outcome.decision, AcknackDecision::Ignore);
    }

    #[test]
    fn heartbeat_first_sn_moves_stale_missing_to_irrelevant_and_reports_lost_count() {
        let mut proxy = WriterProxy::new(guid(1));
        proxy.start(0);
        let _ = proxy.process_heartbeat(1, 1, 2, false, false);
        assert_eq!(proxy.missing_changes(), vec![1, 2]);

        // Writer reports it no longer has SN 1 (e.g. KEEP_LAST eviction).
        let outcome = proxy.process_heartbeat(2, 2, 2, false, false);
        assert_eq!(outcome.lost_count, 1);
        assert!(proxy.change_was_received(1));
        assert_eq!(proxy.missing_changes(), vec![2]);
    }

    #[test]
    fn irrelevant_change_set_counts_toward_available_max() {
        let mut proxy = WriterProxy::new(guid(1));
        proxy.start(0);
        let _ = proxy.process_heartbeat(1, 1, 2, false, false);
        proxy.irrelevant_change_set(1);
        proxy.received_change_set(2);
        assert_eq!(proxy.available_max(), 2);
    }

    #[test]
    fn next_cache_change_to_be_notified_follows_received_order() {
        let mut proxy = WriterProxy::new(guid(1));
        proxy.start(0);
        proxy.received_change_set(1);
        proxy.received_change_set(3);
        assert_eq!(proxy.next_cache_change_to_be_notified(), Some(1));
        proxy.advance_notified(1);
        // SN 2 hasn't arrived yet; SN 3 is not yet notifiable in order.
        assert_eq!(proxy.next_cache_change_to_be_notified(), Some(3));
    }

    #[test]
    fn unknown_missing_changes_up_to_counts_unseen_sns() {
        let proxy = WriterProxy::new(guid(1));
        // Nothing known at all: all of 1..5 are unknown.
        assert_eq!(proxy.unknown_missing_changes_up_to(5), 4);
    }

    #[test]
    fn heartbeat_response_due_flag_tracks_final() {
        let mut proxy = WriterProxy::new(guid(1));
        proxy.start(0);
        let outcome = proxy.process_heartbeat(1, 1, 2, false, false);
        assert!(matches!(outcome.decision, AcknackDecision::NeedData { .. }));
        assert!(proxy.heartbeat_response_due());
        proxy.mark_heartbeat_response_sent();
        assert!(!proxy.heartbeat_response_due());
    }

    #[test]
    fn liveliness_alive_until_lease_elapses() {
        let mut proxy = WriterProxy::new(guid(1));
        proxy.set_liveliness(LivelinessKind::Automatic, Duration::from_millis(1));
        proxy.start(0);
        assert!(proxy.is_alive());
        std::thread::sleep(Duration::from_millis(5));
        assert!(!proxy.is_alive());
    }

    #[test]
    fn stop_clears_pending_response_and_is_idempotent() {
        let mut proxy = WriterProxy::new(guid(1));
        proxy.start(0);
        let _ = proxy.process_heartbeat(1, 1, 1, false, false);
        assert!(proxy.heartbeat_response_due());
        proxy.stop();
        assert!(!proxy.is_active());
        assert!(!proxy.heartbeat_response_due());
        proxy.stop();
        assert!(!proxy.is_active());
    }
}
