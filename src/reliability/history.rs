// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reader-side `History`: the QoS-bounded, instance-indexed collection of
//! [`Cache`] records, and the admission algorithm that governs what a
//! reader accepts from a matched writer.
//!
//! The admission algorithm in [`History::insert`] is load-bearing — it must
//! match the keyless/keyed, `KEEP_LAST`/`KEEP_ALL` rules exactly, including
//! the same-writer lower-SN substitution rule, or reader behavior diverges
//! from the wire protocol's expectations.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use crate::core::discovery::guid::GUID;
use crate::qos::ResourceLimits;
use crate::reliability::cache::{Cache, InstanceHandle, SequenceNumber};

/// History depth policy (mirrors `QosProfile::History` but kept local to
/// this module so `History` doesn't depend on the whole QoS bundle).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    KeepLast(u32),
    KeepAll,
}

/// Outcome of an admission attempt, reported to the user via the rejected-
/// sample listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    NotRejected,
    RejectedByInstancesLimit,
    RejectedBySamplesLimit,
    RejectedBySamplesPerInstanceLimit,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::NotRejected => write!(f, "not rejected"),
            RejectionReason::RejectedByInstancesLimit => write!(f, "rejected by instances limit"),
            RejectionReason::RejectedBySamplesLimit => write!(f, "rejected by samples limit"),
            RejectionReason::RejectedBySamplesPerInstanceLimit => {
                write!(f, "rejected by samples-per-instance limit")
            }
        }
    }
}

struct InstanceEntry {
    samples: VecDeque<Cache>,
}

impl InstanceEntry {
    fn new() -> Self {
        Self {
            samples: VecDeque::new(),
        }
    }
}

/// QoS-bounded ordered collection of [`Cache`] records.
///
/// Indexed by instance handle when `keyed`; keyless topics use the single
/// implicit [`InstanceHandle::NIL`] bucket.
pub struct History {
    history_kind: HistoryKind,
    resource_limits: ResourceLimits,
    keyed: bool,
    instances: BTreeMap<[u8; 16], InstanceEntry>,
    total_samples: usize,
    /// Slots held by [`History::reserve`] but not yet committed by a
    /// matching `insert`. Counted toward `max_samples` by `can_insert` so a
    /// reservation can't be starved out by a concurrent receive.
    reserved: usize,
}

impl History {
    #[must_use]
    pub fn new(history_kind: HistoryKind, resource_limits: ResourceLimits, keyed: bool) -> Self {
        Self {
            history_kind,
            resource_limits,
            keyed,
            instances: BTreeMap::new(),
            total_samples: 0,
            reserved: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.total_samples
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_samples == 0
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Admit an incoming cache per §4.1's admission algorithm.
    ///
    /// `unknown_missing_up_to` is the reader's `WriterProxy::unknown_missing_changes_up_to`
    /// count for this writer — samples already known to be in flight reserve
    /// room under `KEEP_ALL` so they are not starved by a burst that arrives
    /// out of order.
    pub fn insert(
        &mut self,
        cache: Cache,
        unknown_missing_up_to: usize,
    ) -> Result<(), RejectionReason> {
        if !self.keyed {
            return self.insert_keyless(cache, unknown_missing_up_to);
        }
        self.insert_keyed(cache, unknown_missing_up_to)
    }

    fn insert_keyless(
        &mut self,
        cache: Cache,
        unknown_missing_up_to: usize,
    ) -> Result<(), RejectionReason> {
        let entry = self
            .instances
            .entry(InstanceHandle::NIL.0)
            .or_insert_with(InstanceEntry::new);
        let cap = match self.history_kind {
            HistoryKind::KeepAll => self.resource_limits.max_samples,
            HistoryKind::KeepLast(depth) => depth as usize,
        };
        admit_into_list(
            &mut entry.samples,
            cache,
            cap,
            self.history_kind,
            unknown_missing_up_to,
        )
        .map(|_| self.total_samples += 1)
        .map_err(|_| RejectionReason::RejectedBySamplesLimit)
    }

    fn insert_keyed(
        &mut self,
        cache: Cache,
        unknown_missing_up_to: usize,
    ) -> Result<(), RejectionReason> {
        if self.total_samples >= self.resource_limits.max_samples {
            return Err(RejectionReason::RejectedBySamplesLimit);
        }

        let key = cache.instance_handle.0;
        if !self.instances.contains_key(&key) {
            if self.instances.len() >= self.resource_limits.max_instances {
                let evictable = self
                    .instances
                    .iter()
                    .find(|(_, e)| e.samples.is_empty())
                    .map(|(k, _)| *k);
                match evictable {
                    Some(k) => {
                        self.instances.remove(&k);
                    }
                    None => return Err(RejectionReason::RejectedByInstancesLimit),
                }
            }
            self.instances.insert(key, InstanceEntry::new());
        }

        let entry = self.instances.get_mut(&key).expect("just inserted");
        let cap = match self.history_kind {
            HistoryKind::KeepAll => self.resource_limits.max_samples_per_instance,
            HistoryKind::KeepLast(depth) => depth as usize,
        };
        admit_into_list(
            &mut entry.samples,
            cache,
            cap,
            self.history_kind,
            unknown_missing_up_to,
        )
        .map(|_| self.total_samples += 1)
        .map_err(|_| RejectionReason::RejectedBySamplesPerInstanceLimit)
    }

    /// Caches for a given instance, SN-ordered (keyed topics only).
    #[must_use]
    pub fn samples_for_instance(&self, handle: InstanceHandle) -> &[Cache] {
        self.instances
            .get(&handle.0)
            .map(|e| e.samples.as_slices().0)
            .unwrap_or(&[])
    }

    /// All keyless samples, SN-ordered.
    #[must_use]
    pub fn samples(&self) -> &[Cache] {
        self.instances
            .get(&InstanceHandle::NIL.0)
            .map(|e| e.samples.as_slices().0)
            .unwrap_or(&[])
    }

    /// Remove every cache produced by `writer_guid` (used on writer-unmatch
    /// per invariant I8).
    pub fn remove_writer(&mut self, writer_guid: &GUID) {
        for entry in self.instances.values_mut() {
            let before = entry.samples.len();
            entry.samples.retain(|c| &c.writer_guid != writer_guid);
            self.total_samples -= before - entry.samples.len();
        }
        self.instances.retain(|_, e| !e.samples.is_empty());
    }

    /// Remove a single cache by writer and sequence number. Returns the
    /// removed cache, if present.
    pub fn remove(&mut self, writer_guid: &GUID, sn: SequenceNumber) -> Option<Cache> {
        for entry in self.instances.values_mut() {
            if let Some(idx) = entry
                .samples
                .iter()
                .position(|c| &c.writer_guid == writer_guid && c.sequence_number == sn)
            {
                let removed = entry.samples.remove(idx);
                self.total_samples -= 1;
                return removed;
            }
        }
        None
    }

    pub fn find(&self, writer_guid: &GUID, sn: SequenceNumber) -> Option<&Cache> {
        self.instances.values().find_map(|e| {
            e.samples
                .iter()
                .find(|c| &c.writer_guid == writer_guid && c.sequence_number == sn)
        })
    }

    /// Iterate every admitted cache across all instances, SN-ordered within
    /// each instance.
    pub fn iterate(&self) -> impl Iterator<Item = &Cache> {
        self.instances.values().flat_map(|e| e.samples.iter())
    }

    /// Pre-check whether `insert` would admit a cache from `writer_guid` at
    /// `sn` into `instance`, without committing to it. Mirrors `insert`'s
    /// admission rule: `KEEP_ALL` checks the reservation-adjusted capacity,
    /// `KEEP_LAST` checks either free room or an eligible same-writer
    /// substitution candidate. Counts outstanding [`History::reserve`] slots
    /// as if already occupied.
    #[must_use]
    pub fn can_insert(&self, instance: InstanceHandle, writer_guid: &GUID, sn: SequenceNumber) -> bool {
        if self.total_samples + self.reserved >= self.resource_limits.max_samples {
            return false;
        }
        let key = if self.keyed { instance.0 } else { InstanceHandle::NIL.0 };
        if self.keyed && !self.instances.contains_key(&key) {
            return self.instances.len() < self.resource_limits.max_instances
                || self.instances.values().any(|e| e.samples.is_empty());
        }
        let Some(entry) = self.instances.get(&key) else {
            return true;
        };
        let cap = match self.history_kind {
            HistoryKind::KeepAll if self.keyed => self.resource_limits.max_samples_per_instance,
            HistoryKind::KeepAll => self.resource_limits.max_samples,
            HistoryKind::KeepLast(depth) => depth as usize,
        };
        match self.history_kind {
            HistoryKind::KeepAll => entry.samples.len() + self.reserved < cap,
            HistoryKind::KeepLast(_) => {
                entry.samples.len() < cap
                    || entry
                        .samples
                        .iter()
                        .any(|c| &c.writer_guid == writer_guid && c.sequence_number < sn)
            }
        }
    }

    /// Reserve a slot against `max_samples` ahead of a receive that hasn't
    /// landed yet (e.g. a GAP-implied sample the caller intends to commit
    /// via `insert` shortly after), so a concurrent receive from another
    /// writer can't race past `can_insert`'s promise. Must be matched by
    /// exactly one of [`History::release`] (abandoned) or `insert`
    /// (committed); `insert` does not consume a reservation automatically,
    /// callers pair a `release` with every `insert` that follows a
    /// `reserve`.
    pub fn reserve(&mut self) {
        self.reserved += 1;
    }

    /// Release a slot taken by [`History::reserve`].
    pub fn release(&mut self) {
        self.reserved = self.reserved.saturating_sub(1);
    }
}

/// Shared keyless/per-instance admission rule: `KEEP_ALL` admits while under
/// `cap` (accounting for `unknown_missing_up_to` in-flight room), `KEEP_LAST`
/// admits while under `cap`, else substitutes the oldest same-writer cache
/// with a strictly smaller SN.
fn admit_into_list(
    list: &mut VecDeque<Cache>,
    cache: Cache,
    cap: usize,
    kind: HistoryKind,
    unknown_missing_up_to: usize,
) -> Result<(), ()> {
    match kind {
        HistoryKind::KeepAll => {
            if list.len() + unknown_missing_up_to < cap {
                insert_sorted(list, cache);
                Ok(())
            } else {
                Err(())
            }
        }
        HistoryKind::KeepLast(depth) => {
            let depth = depth as usize;
            debug_assert_eq!(depth, cap);
            if list.len() < depth {
                insert_sorted(list, cache);
                return Ok(());
            }
            let substitute_idx = list
                .iter()
                .enumerate()
                .filter(|(_, c)| {
                    c.writer_guid == cache.writer_guid && c.sequence_number < cache.sequence_number
                })
                .min_by_key(|(_, c)| c.sequence_number)
                .map(|(idx, _)| idx);
            match substitute_idx {
                Some(idx) => {
                    log::debug!(
                        "[HISTORY] KEEP_LAST full, substituting oldest same-writer cache at index {idx}"
                    );
                    list.remove(idx);
                    insert_sorted(list, cache);
                    Ok(())
                }
                None => Err(()),
            }
        }
    }
}

fn insert_sorted(list: &mut VecDeque<Cache>, cache: Cache) {
    let pos = list
        .iter()
        .position(|c| c.sequence_number > cache.sequence_number)
        .unwrap_or(list.len());
    list.insert(pos, cache);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reliability::cache::ChangeKind;

    fn guid(id: u8) -> GUID {
        GUID::new([id; 12], [0, 0, 0, 1])
    }

    fn cache(writer: u8, sn: i64) -> Cache {
        Cache::new(
            guid(writer),
            SequenceNumber(sn),
            ChangeKind::Alive,
            InstanceHandle::NIL,
            vec![0; 8],
        )
    }

    fn limits(max_samples: usize, max_instances: usize, max_per_instance: usize) -> ResourceLimits {
        ResourceLimits {
            max_samples,
            max_instances,
            max_samples_per_instance: max_per_instance,
            max_quota_bytes: 1_000_000,
        }
    }

    #[test]
    fn keyless_keep_last_substitutes_older_same_writer() {
        let mut h = History::new(HistoryKind::KeepLast(2), limits(100, 1, 100), false);
        h.insert(cache(1, 1), 0).unwrap();
        h.insert(cache(1, 2), 0).unwrap();
        // full: substitute SN 1 (older, same writer, smaller SN) for SN 3
        h.insert(cache(1, 3), 0).unwrap();
        assert_eq!(h.len(), 2);
        let sns: Vec<i64> = h.samples().iter().map(|c| c.sequence_number.0).collect();
        assert_eq!(sns, vec![2, 3]);
    }

    #[test]
    fn keyless_keep_last_rejects_when_no_substitute_available() {
        let mut h = History::new(HistoryKind::KeepLast(2), limits(100, 1, 100), false);
        h.insert(cache(1, 5), 0).unwrap();
        h.insert(cache(1, 6), 0).unwrap();
        // Nothing with SN < 4 from writer 1 exists -> reject
        let result = h.insert(cache(1, 4), 0);
        assert_eq!(result, Err(RejectionReason::RejectedBySamplesLimit));
    }

    #[test]
    fn keyless_keep_all_respects_unknown_missing_reservation() {
        let mut h = History::new(HistoryKind::KeepAll, limits(3, 1, 3), false);
        h.insert(cache(1, 1), 1).unwrap();
        // size(1) + unknown_missing_up_to(1) = 2 < max_samples(3) -> still OK
        h.insert(cache(1, 2), 1).unwrap();
        // size(2) + unknown_missing_up_to(1) = 3, not < 3 -> reject
        let result = h.insert(cache(1, 3), 1);
        assert_eq!(result, Err(RejectionReason::RejectedBySamplesLimit));
    }

    #[test]
    fn keyed_instance_limit_rejects_when_no_empty_slot() {
        let mut h = History::new(HistoryKind::KeepLast(10), limits(100, 2, 10), true);
        let mut c_a = cache(1, 1);
        c_a.instance_handle = InstanceHandle([1u8; 16]);
        let mut c_b = cache(1, 2);
        c_b.instance_handle = InstanceHandle([2u8; 16]);
        let mut c_c = cache(1, 3);
        c_c.instance_handle = InstanceHandle([3u8; 16]);

        h.insert(c_a, 0).unwrap();
        h.insert(c_b, 0).unwrap();
        let result = h.insert(c_c, 0);
        assert_eq!(result, Err(RejectionReason::RejectedByInstancesLimit));
        assert_eq!(h.instance_count(), 2);
    }

    #[test]
    fn keyed_instance_limit_reclaims_empty_instance_slot() {
        let mut h = History::new(HistoryKind::KeepLast(10), limits(100, 1, 10), true);
        let mut c_a = cache(1, 1);
        c_a.instance_handle = InstanceHandle([1u8; 16]);
        h.insert(c_a, 0).unwrap();
        // Remove all samples for instance A without removing the bucket via writer-removal.
        h.remove_writer(&guid(1));
        assert_eq!(h.instance_count(), 0);

        let mut c_b = cache(2, 1);
        c_b.instance_handle = InstanceHandle([2u8; 16]);
        h.insert(c_b, 0).unwrap();
        assert_eq!(h.instance_count(), 1);
    }

    #[test]
    fn remove_writer_drops_only_that_writers_caches() {
        let mut h = History::new(HistoryKind::KeepLast(10), limits(100, 1, 10), false);
        h.insert(cache(1, 1), 0).unwrap();
        h.insert(cache(1, 2), 0).unwrap();
        h.remove_writer(&guid(1));
        assert_eq!(h.len(), 0);
    }

    #[test]
    fn remove_single_entry_drops_only_that_sample() {
        let mut h = History::new(HistoryKind::KeepLast(10), limits(100, 1, 10), false);
        h.insert(cache(1, 1), 0).unwrap();
        h.insert(cache(1, 2), 0).unwrap();
        let removed = h.remove(&guid(1), SequenceNumber(1));
        assert_eq!(removed.map(|c| c.sequence_number.0), Some(1));
        assert_eq!(h.len(), 1);
        assert!(h.remove(&guid(1), SequenceNumber(1)).is_none());
    }

    #[test]
    fn iterate_covers_every_admitted_sample() {
        let mut h = History::new(HistoryKind::KeepLast(10), limits(100, 1, 10), false);
        h.insert(cache(1, 1), 0).unwrap();
        h.insert(cache(1, 2), 0).unwrap();
        let sns: Vec<i64> = h.iterate().map(|c| c.sequence_number.0).collect();
        assert_eq!(sns, vec![1, 2]);
    }

    #[test]
    fn can_insert_reports_keep_last_full_without_substitution_candidate() {
        let mut h = History::new(HistoryKind::KeepLast(2), limits(100, 1, 100), false);
        h.insert(cache(1, 5), 0).unwrap();
        h.insert(cache(1, 6), 0).unwrap();
        assert!(!h.can_insert(InstanceHandle::NIL, &guid(1), SequenceNumber(4)));
        assert!(h.can_insert(InstanceHandle::NIL, &guid(1), SequenceNumber(7)));
    }

    #[test]
    fn can_insert_respects_samples_limit() {
        let h = History::new(HistoryKind::KeepAll, limits(0, 1, 1), false);
        assert!(!h.can_insert(InstanceHandle::NIL, &guid(1), SequenceNumber(1)));
    }

    #[test]
    fn reserve_blocks_can_insert_until_released() {
        let mut h = History::new(HistoryKind::KeepAll, limits(1, 1, 1), false);
        h.reserve();
        assert!(!h.can_insert(InstanceHandle::NIL, &guid(1), SequenceNumber(1)));
        h.release();
        assert!(h.can_insert(InstanceHandle::NIL, &guid(1), SequenceNumber(1)));
    }
}
