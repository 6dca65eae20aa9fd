// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The `Cache` (RTPS "change") record: one immutable sample, keyed by
//! `(writer_guid, sequence_number)`.
//!
//! A `Cache` is immutable after reception except for its two flags
//! (`is_read`, `is_relevant`) — every other field is fixed at construction.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::discovery::guid::GUID;

/// 64-bit monotonic per-writer sequence number. Zero is reserved/unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SequenceNumber(pub i64);

impl SequenceNumber {
    /// The reserved "unset" value.
    pub const UNSET: SequenceNumber = SequenceNumber(0);
    /// The first valid sequence number a writer assigns.
    pub const FIRST: SequenceNumber = SequenceNumber(1);

    #[must_use]
    pub fn value(self) -> i64 {
        self.0
    }

    #[must_use]
    pub fn next(self) -> SequenceNumber {
        SequenceNumber(self.0 + 1)
    }

    #[must_use]
    pub fn is_unset(self) -> bool {
        self.0 == 0
    }
}

impl From<i64> for SequenceNumber {
    fn from(v: i64) -> Self {
        SequenceNumber(v)
    }
}

impl From<SequenceNumber> for i64 {
    fn from(s: SequenceNumber) -> Self {
        s.0
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 16-byte hash of a sample's key fields. Keyless topics share
/// [`InstanceHandle::NIL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceHandle(pub [u8; 16]);

impl InstanceHandle {
    pub const NIL: InstanceHandle = InstanceHandle([0u8; 16]);

    #[must_use]
    pub fn from_guid(guid: &GUID) -> Self {
        InstanceHandle(guid.as_bytes())
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; 16]
    }
}

/// Sample lifecycle kind (RTPS `ChangeKind_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Alive,
    NotAliveDisposed,
    NotAliveUnregistered,
    NotAliveDisposedUnregistered,
}

impl ChangeKind {
    #[must_use]
    pub fn is_alive(self) -> bool {
        matches!(self, ChangeKind::Alive)
    }
}

/// Bookkeeping for a sample received as multiple `DATA_FRAG` submessages.
///
/// `received` tracks, per fragment number (1-based), whether that fragment's
/// bytes have been copied into `payload`. The cache is considered complete
/// once every fragment in `1..=total` is set.
#[derive(Debug, Clone)]
pub struct FragmentMap {
    /// Size in bytes of a single fragment (the last one may be shorter).
    pub fragment_size: u32,
    /// Total number of fragments making up the sample.
    pub total: u32,
    /// Which fragment numbers (1-based) have been received.
    pub received: Vec<bool>,
}

impl FragmentMap {
    #[must_use]
    pub fn new(fragment_size: u32, total: u32) -> Self {
        Self {
            fragment_size,
            total,
            received: vec![false; total as usize],
        }
    }

    pub fn mark_received(&mut self, frag_start: u32, frag_count: u32) {
        for i in 0..frag_count {
            let idx = (frag_start - 1 + i) as usize;
            if let Some(slot) = self.received.get_mut(idx) {
                *slot = true;
            }
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.received.iter().all(|&r| r)
    }

    /// Fragment numbers (1-based) still missing, for NACKFRAG composition.
    #[must_use]
    pub fn missing_fragments(&self) -> Vec<u32> {
        self.received
            .iter()
            .enumerate()
            .filter(|(_, &r)| !r)
            .map(|(i, _)| i as u32 + 1)
            .collect()
    }
}

/// One sample/change record.
#[derive(Debug, Clone)]
pub struct Cache {
    pub writer_guid: GUID,
    pub sequence_number: SequenceNumber,
    pub source_timestamp_ns: i64,
    pub reception_timestamp_ns: i64,
    pub kind: ChangeKind,
    pub instance_handle: InstanceHandle,
    /// Serialized user payload. Empty for pure dispose/unregister markers.
    pub payload: Vec<u8>,
    /// CDR encapsulation identifier (e.g. `CDR_LE`/`CDR_BE`).
    pub encapsulation: u16,
    /// Inline QoS parameters carried alongside the DATA submessage
    /// (key hash, status info, source timestamp, ...), PID -> raw bytes.
    pub inline_qos: Option<BTreeMap<u16, Vec<u8>>>,
    /// Present only while a DATA_FRAG sample is being assembled.
    pub fragments: Option<FragmentMap>,
    /// Ownership strength in effect when this cache was produced
    /// (EXCLUSIVE_OWNERSHIP QoS snapshot).
    pub ownership_strength: i32,
    is_read: bool,
    is_relevant: bool,
}

impl Cache {
    #[must_use]
    pub fn new(
        writer_guid: GUID,
        sequence_number: SequenceNumber,
        kind: ChangeKind,
        instance_handle: InstanceHandle,
        payload: Vec<u8>,
    ) -> Self {
        let now = now_ns();
        Self {
            writer_guid,
            sequence_number,
            source_timestamp_ns: now,
            reception_timestamp_ns: now,
            kind,
            instance_handle,
            payload,
            encapsulation: 0,
            inline_qos: None,
            fragments: None,
            ownership_strength: 0,
            is_read: false,
            is_relevant: true,
        }
    }

    #[must_use]
    pub fn is_read(&self) -> bool {
        self.is_read
    }

    pub fn mark_read(&mut self) {
        self.is_read = true;
    }

    #[must_use]
    pub fn is_relevant(&self) -> bool {
        self.is_relevant
    }

    pub fn mark_irrelevant(&mut self) {
        self.is_relevant = false;
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.payload.len()
    }
}

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guid(id: u8) -> GUID {
        GUID::new([id; 12], [0, 0, 0, 1])
    }

    #[test]
    fn sequence_number_ordering() {
        assert!(SequenceNumber(1) < SequenceNumber(2));
        assert_eq!(SequenceNumber(5).next(), SequenceNumber(6));
    }

    #[test]
    fn instance_handle_from_guid() {
        let g = guid(7);
        let handle = InstanceHandle::from_guid(&g);
        assert!(!handle.is_nil());
    }

    #[test]
    fn cache_new_defaults() {
        let c = Cache::new(
            guid(1),
            SequenceNumber(1),
            ChangeKind::Alive,
            InstanceHandle::NIL,
            vec![1, 2, 3],
        );
        assert!(!c.is_read());
        assert!(c.is_relevant());
        assert_eq!(c.byte_len(), 3);
    }

    #[test]
    fn cache_flags_mutate_independently() {
        let mut c = Cache::new(
            guid(1),
            SequenceNumber(1),
            ChangeKind::Alive,
            InstanceHandle::NIL,
            vec![],
        );
        c.mark_read();
        c.mark_irrelevant();
        assert!(c.is_read());
        assert!(!c.is_relevant());
    }

    #[test]
    fn fragment_map_tracks_completion() {
        let mut frags = FragmentMap::new(64_000, 4);
        assert!(!frags.is_complete());
        frags.mark_received(1, 1);
        frags.mark_received(3, 2);
        assert_eq!(frags.missing_fragments(), vec![2]);
        frags.mark_received(2, 1);
        assert!(frags.is_complete());
    }
}
