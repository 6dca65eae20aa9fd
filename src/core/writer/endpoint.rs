// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Writer endpoint operations -- RTPS Sec.8.4.7: change allocation, the
//! writer history, and ACKNACK/NACKFRAG-driven repair. GAPs are generated
//! whenever a cache is dropped (KEEP_LAST eviction or explicit removal)
//! before every matched reader has acknowledged it.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use crate::reliability::cache::{ChangeKind, InstanceHandle};
use crate::reliability::history_cache::HistoryCache;
use crate::Error;

use super::MatchedReadersRegistry;

/// Per-SN bookkeeping the slab-backed [`HistoryCache`] doesn't itself carry
/// (sample kind, instance handle) -- kept alongside it so `remove_change`
/// and dispose handling don't need to re-derive them from the payload.
#[derive(Debug, Clone, Copy)]
struct ChangeMeta {
    kind: ChangeKind,
    instance_handle: InstanceHandle,
}

/// A newly allocated, not-yet-published change (spec `new_change`). Not
/// inserted into the writer history until passed to [`Writer::add_change`].
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub sequence_number: i64,
    pub kind: ChangeKind,
    pub instance_handle: InstanceHandle,
    pub payload: Vec<u8>,
}

/// Outcome of a retransmit/GAP repair drain: either the payload to resend,
/// or a GAP because the writer no longer has the sample.
pub enum Repair {
    Retransmit { reader_guid: [u8; 16], addr: SocketAddr, sn: i64, payload: Vec<u8> },
    Gap { reader_guid: [u8; 16], addr: SocketAddr, sn: i64 },
}

/// Writer endpoint: allocates changes, owns the writer history, and routes
/// ACKNACK/NACKFRAG repair to matched readers.
pub struct Writer {
    next_sn: AtomicI64,
    history: HistoryCache,
    meta: Mutex<BTreeMap<u64, ChangeMeta>>,
    readers: MatchedReadersRegistry,
    /// Ownership strength this writer publishes in HEARTBEAT/DATA metadata
    /// (EXCLUSIVE_OWNERSHIP QoS snapshot); 0 for SHARED_OWNERSHIP writers.
    ownership_strength: i32,
}

impl Writer {
    #[must_use]
    pub fn new(history: HistoryCache, ownership_strength: i32) -> Self {
        Self {
            next_sn: AtomicI64::new(1),
            history,
            meta: Mutex::new(BTreeMap::new()),
            readers: MatchedReadersRegistry::new(),
            ownership_strength,
        }
    }

    #[must_use]
    pub fn readers(&self) -> &MatchedReadersRegistry {
        &self.readers
    }

    #[must_use]
    pub fn history(&self) -> &HistoryCache {
        &self.history
    }

    #[must_use]
    pub fn ownership_strength(&self) -> i32 {
        self.ownership_strength
    }

    /// Allocate the next sequence number for a new change. Does not publish
    /// it -- the caller still owns `payload` until it calls `add_change`.
    pub fn new_change(&self, kind: ChangeKind, instance_handle: InstanceHandle, payload: Vec<u8>) -> PendingChange {
        crate::trace_fn!("Writer::new_change");
        let sn = self.next_sn.fetch_add(1, Ordering::SeqCst);
        PendingChange { sequence_number: sn, kind, instance_handle, payload }
    }

    /// Append `change` to the writer history. On KEEP_LAST overflow this
    /// evicts the oldest sample; every matched reader that hadn't yet
    /// acknowledged the evicted SN is returned so the caller can send it a
    /// GAP.
    pub fn add_change(&self, change: PendingChange) -> Result<Vec<[u8; 16]>, Error> {
        crate::trace_fn!("Writer::add_change");
        let seq = change.sequence_number as u64;
        let instance_key = instance_key_from_handle(change.instance_handle);
        let oldest_before = self.history.oldest_seq();

        self.history.insert_keyed(seq, &change.payload, instance_key)?;
        self.meta.lock().unwrap().insert(
            seq,
            ChangeMeta { kind: change.kind, instance_handle: change.instance_handle },
        );

        let evicted = oldest_before.filter(|&old| old != seq && self.history.get(old).is_none());
        match evicted {
            Some(old) => {
                self.meta.lock().unwrap().remove(&old);
                Ok(self.readers.readers_needing_gap(old as i64))
            }
            None => Ok(Vec::new()),
        }
    }

    /// Remove a change from the writer history directly (explicit dispose/
    /// unregister cleanup, or a relevance-filter removal). Returns every
    /// matched reader that hadn't yet acknowledged it, for GAP delivery.
    pub fn remove_change(&self, sn: i64) -> Vec<[u8; 16]> {
        crate::trace_fn!("Writer::remove_change");
        if !self.history.remove(sn as u64) {
            return Vec::new();
        }
        self.meta.lock().unwrap().remove(&(sn as u64));
        self.readers.readers_needing_gap(sn)
    }

    /// Process an ACKNACK. Returns `true` if a repair drain should run.
    pub fn on_acknack(&self, reader_guid: [u8; 16], ack_base: i64, bitmap: &[i64], count: u32) -> bool {
        self.readers.on_acknack(&reader_guid, ack_base, bitmap, count)
    }

    /// Process a NACKFRAG, queuing the requested fragments for retransmit.
    pub fn on_nackfrag(&self, reader_guid: [u8; 16], sn: i64, frag_bitmap: &[u32]) {
        self.readers.on_nackfrag(&reader_guid, sn, frag_bitmap);
    }

    /// Drain whole-sample repairs requested via ACKNACK: the payload for
    /// SNs still in the history, or a GAP for SNs the writer has already
    /// dropped.
    pub fn drain_repairs(&self) -> Vec<Repair> {
        crate::trace_fn!("Writer::drain_repairs");
        let mut repairs = Vec::new();
        for (reader_guid, addr, sns) in self.readers.drain_requested_changes() {
            for sn in sns {
                match self.history.get(sn as u64) {
                    Some(payload) => repairs.push(Repair::Retransmit { reader_guid, addr, sn, payload }),
                    None => repairs.push(Repair::Gap { reader_guid, addr, sn }),
                }
                self.readers.mark_change_sent(&reader_guid, sn);
            }
        }
        repairs
    }
}

/// Derive the `u64` instance key [`HistoryCache`] indexes by from a 16-byte
/// instance handle (the low 8 bytes; keyless topics use [`InstanceHandle::NIL`],
/// which maps to key `0`, matching `HistoryCache`'s unkeyed convention).
fn instance_key_from_handle(handle: InstanceHandle) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&handle.0[0..8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rt::slabpool::SlabPool;
    use crate::qos::History as HistoryKind;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::time::Duration;

    fn make_writer(max_samples: usize) -> Writer {
        let pool = Arc::new(SlabPool::new());
        let history =
            HistoryCache::new_with_limits(pool, max_samples, 10_000_000, HistoryKind::KeepLast(max_samples as u32));
        Writer::new(history, 0)
    }

    fn make_addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)), port)
    }

    fn make_guid(id: u8) -> [u8; 16] {
        let mut guid = [0u8; 16];
        guid[0] = id;
        guid
    }

    #[test]
    fn new_change_assigns_increasing_sequence_numbers() {
        let writer = make_writer(10);
        let a = writer.new_change(ChangeKind::Alive, InstanceHandle::NIL, vec![1]);
        let b = writer.new_change(ChangeKind::Alive, InstanceHandle::NIL, vec![2]);
        assert_eq!(a.sequence_number, 1);
        assert_eq!(b.sequence_number, 2);
    }

    #[test]
    fn add_change_keep_last_eviction_gaps_unacked_reader() {
        let writer = make_writer(1);
        writer.readers().add_reader(make_guid(9), make_addr(7400), Duration::from_secs(10));

        let first = writer.new_change(ChangeKind::Alive, InstanceHandle::NIL, vec![1]);
        writer.add_change(first).unwrap();

        let second = writer.new_change(ChangeKind::Alive, InstanceHandle::NIL, vec![2]);
        let gapped = writer.add_change(second).unwrap();
        assert_eq!(gapped, vec![make_guid(9)]);
    }

    #[test]
    fn add_change_no_eviction_gaps_nobody() {
        let writer = make_writer(10);
        writer.readers().add_reader(make_guid(9), make_addr(7400), Duration::from_secs(10));
        let change = writer.new_change(ChangeKind::Alive, InstanceHandle::NIL, vec![1]);
        let gapped = writer.add_change(change).unwrap();
        assert!(gapped.is_empty());
    }

    #[test]
    fn remove_change_gaps_unacked_readers_only() {
        let writer = make_writer(10);
        writer.readers().add_reader(make_guid(1), make_addr(7400), Duration::from_secs(10));
        writer.readers().add_reader(make_guid(2), make_addr(7401), Duration::from_secs(10));
        writer.readers().on_acknack(&make_guid(1), 2, &[], 1);

        let change = writer.new_change(ChangeKind::Alive, InstanceHandle::NIL, vec![1]);
        let sn = change.sequence_number;
        writer.add_change(change).unwrap();

        let gapped = writer.remove_change(sn);
        assert_eq!(gapped, vec![make_guid(2)]);
        assert_eq!(writer.history().get(sn as u64), None);
    }

    #[test]
    fn drain_repairs_retransmits_present_and_gaps_dropped() {
        let writer = make_writer(1);
        writer.readers().add_reader(make_guid(1), make_addr(7400), Duration::from_secs(10));

        let first = writer.new_change(ChangeKind::Alive, InstanceHandle::NIL, vec![1]);
        let first_sn = first.sequence_number;
        writer.add_change(first).unwrap();

        writer.on_acknack(make_guid(1), first_sn, &[first_sn], 1);
        let repairs = writer.drain_repairs();
        assert_eq!(repairs.len(), 1);
        assert!(matches!(&repairs[0], Repair::Retransmit { sn, .. } if *sn == first_sn));
    }
}
