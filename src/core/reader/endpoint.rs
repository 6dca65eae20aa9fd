// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reader endpoint operations -- RTPS Sec.8.3.7/8.4.9: the writer-to-reader
//! data path that wires [`History`]'s admission algorithm to the per-writer
//! [`WriterProxy`] state machine and drives the `on_data_available`
//! notification contract.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::core::discovery::guid::GUID;
use crate::reliability::cache::{Cache, ChangeKind, FragmentMap, InstanceHandle, SequenceNumber};
use crate::reliability::history::{History, RejectionReason};

use super::WriterProxyRegistry;

/// In-flight DATA_FRAG reassembly is keyed by `(writer, sequence number)`.
type AssemblyKey = ([u8; 16], i64);

/// User callback for newly available data. Invoked by [`Reader::notify`]
/// after the last-notified registry entry has already been persisted, so a
/// crash mid-callback can never cause a re-delivery on restart (spec
/// invariant P3).
pub trait DataAvailableListener: Send + Sync {
    /// `[first, last]` became available as one contiguous, strictly
    /// increasing run for `writer_guid`.
    fn on_data_available(&self, writer_guid: [u8; 16], first: i64, last: i64);

    /// Called once per sample, in SN order, instead of `on_data_available`
    /// when per-sample notification was requested.
    fn on_sample_available(&self, writer_guid: [u8; 16], sn: i64) {
        let _ = (writer_guid, sn);
    }
}

/// Reader endpoint: owns the admitted [`History`] and the per-writer
/// [`WriterProxy`] registry, and drives notification per spec Sec.4.3.
pub struct Reader {
    proxies: WriterProxyRegistry,
    history: Mutex<History>,
    assembling: DashMap<AssemblyKey, Cache>,
    /// Highest SN already delivered to the user, per writer GUID. Acts as
    /// the last-notified registry spec Sec.4.3 requires: a late/re-matching
    /// writer's proxy baseline is read from here, not from zero.
    last_notified: DashMap<[u8; 16], i64>,
    listener: Mutex<Option<Arc<dyn DataAvailableListener>>>,
    notify_one_by_one: bool,
}

impl Reader {
    #[must_use]
    pub fn new(history: History, notify_one_by_one: bool) -> Self {
        Self {
            proxies: WriterProxyRegistry::new(),
            history: Mutex::new(history),
            assembling: DashMap::new(),
            last_notified: DashMap::new(),
            listener: Mutex::new(None),
            notify_one_by_one,
        }
    }

    #[must_use]
    pub fn proxies(&self) -> &WriterProxyRegistry {
        &self.proxies
    }

    pub fn set_listener(&self, listener: Arc<dyn DataAvailableListener>) {
        *self.listener.lock().unwrap() = Some(listener);
    }

    /// Pair with a newly matched writer. The proxy's notification baseline
    /// is read from the last-notified registry, so a writer that
    /// re-matches after a transient unmatch does not re-deliver samples the
    /// user already saw.
    pub fn matched_writer_add(&self, writer_guid: [u8; 16]) {
        crate::trace_fn!("Reader::matched_writer_add");
        let initial_sn = self.last_notified.get(&writer_guid).map(|v| *v).unwrap_or(0);
        self.proxies.matched_writer_add(writer_guid, initial_sn);
    }

    /// Unpair a writer: drops its proxy and every cache it produced.
    pub fn matched_writer_remove(&self, writer_guid: [u8; 16]) {
        crate::trace_fn!("Reader::matched_writer_remove");
        self.proxies.matched_writer_remove(&writer_guid);
        self.history.lock().unwrap().remove_writer(&GUID::from_bytes(writer_guid));
        self.assembling.retain(|(wg, _), _| *wg != writer_guid);
    }

    /// Process a HEARTBEAT: delegate to the proxy and, if it advanced, drop
    /// any in-flight DATA_FRAG assembly older than `first_sn`.
    pub fn process_heartbeat(
        &self,
        writer_guid: [u8; 16],
        count: u32,
        first_sn: i64,
        last_sn: i64,
        final_flag: bool,
        liveliness_flag: bool,
    ) -> super::HeartbeatOutcome {
        crate::trace_fn!("Reader::process_heartbeat");
        let outcome =
            self.proxies
                .on_heartbeat(writer_guid, count, first_sn, last_sn, final_flag, liveliness_flag);
        self.assembling.retain(|(wg, sn), _| *wg != writer_guid || *sn >= first_sn);
        self.notify(writer_guid);
        outcome
    }

    /// Process an ordinary (non-fragmented) DATA submessage.
    pub fn process_data(
        &self,
        writer_guid: GUID,
        sn: SequenceNumber,
        instance_handle: InstanceHandle,
        kind: ChangeKind,
        payload: Vec<u8>,
    ) -> Result<(), RejectionReason> {
        crate::trace_fn!("Reader::process_data");
        let cache = Cache::new(writer_guid, sn, kind, instance_handle, payload);
        self.admit(writer_guid, sn, cache)
    }

    /// Process one DATA_FRAG submessage: copy the fragment range into the
    /// in-flight assembly cache for `(writer, sn)` (allocating it on first
    /// fragment), then run the ordinary admission pipeline once every
    /// fragment has arrived. Returns `None` while the sample is still
    /// incomplete.
    #[allow(clippy::too_many_arguments)]
    pub fn process_data_frag(
        &self,
        writer_guid: GUID,
        sn: SequenceNumber,
        instance_handle: InstanceHandle,
        kind: ChangeKind,
        sample_size: u32,
        fragment_size: u32,
        frag_start: u32,
        frag_data: &[u8],
    ) -> Option<Result<(), RejectionReason>> {
        crate::trace_fn!("Reader::process_data_frag");
        let key = (writer_guid.as_bytes(), sn.0);
        let total = sample_size.div_ceil(fragment_size).max(1);
        let frag_count = (frag_data.len() as u32).div_ceil(fragment_size).max(1);

        let complete = {
            let mut entry = self.assembling.entry(key).or_insert_with(|| {
                let mut cache = Cache::new(
                    writer_guid,
                    sn,
                    kind,
                    instance_handle,
                    vec![0u8; sample_size as usize],
                );
                cache.fragments = Some(FragmentMap::new(fragment_size, total));
                cache
            });

            let offset = (frag_start - 1) as usize * fragment_size as usize;
            let end = (offset + frag_data.len()).min(entry.payload.len());
            if end > offset {
                entry.payload[offset..end].copy_from_slice(&frag_data[..end - offset]);
            }
            if let Some(frags) = entry.fragments.as_mut() {
                frags.mark_received(frag_start, frag_count);
            }
            entry.fragments.as_ref().is_some_and(FragmentMap::is_complete)
        };

        if !complete {
            return None;
        }
        let (_, mut cache) = self.assembling.remove(&key)?;
        cache.fragments = None;
        Some(self.admit(writer_guid, sn, cache))
    }

    /// Process a GAP: every SN in `[gap_start, gap_base) ∪ gap_set` becomes
    /// irrelevant in the proxy, and any partial DATA_FRAG assembly for those
    /// SNs is dropped.
    pub fn process_gap(&self, writer_guid: [u8; 16], gap_start: i64, gap_base: i64, gap_set: &[i64]) {
        crate::trace_fn!("Reader::process_gap");
        for sn in gap_start..gap_base {
            self.proxies.mark_irrelevant(writer_guid, sn);
            self.assembling.remove(&(writer_guid, sn));
        }
        for &sn in gap_set {
            self.proxies.mark_irrelevant(writer_guid, sn);
            self.assembling.remove(&(writer_guid, sn));
        }
        self.notify(writer_guid);
    }

    #[must_use]
    pub fn history(&self) -> &Mutex<History> {
        &self.history
    }

    fn admit(&self, writer_guid: GUID, sn: SequenceNumber, cache: Cache) -> Result<(), RejectionReason> {
        let writer_bytes = writer_guid.as_bytes();
        if self.proxies.get_proxy(&writer_bytes).is_none() {
            self.matched_writer_add(writer_bytes);
        }
        let unknown_missing = self
            .proxies
            .get_proxy(&writer_bytes)
            .map(|p| p.unknown_missing_changes_up_to(sn.0))
            .unwrap_or(0);

        let result = self.history.lock().unwrap().insert(cache, unknown_missing);
        match result {
            Ok(()) => {
                self.proxies.on_data(writer_bytes, sn.0);
            }
            Err(RejectionReason::RejectedByInstancesLimit) => {
                log::debug!(
                    "[READER] sample rejected by instances limit, writer={writer_guid:?} sn={sn}"
                );
                // Marked irrelevant, not received: the protocol must not
                // re-request an SN the local reader has decided to drop.
                self.proxies.mark_irrelevant(writer_bytes, sn.0);
            }
            Err(reason) => {
                log::debug!("[READER] sample rejected ({reason}), writer={writer_guid:?} sn={sn}");
                self.proxies.on_data(writer_bytes, sn.0);
            }
        }
        self.notify(writer_bytes);
        result
    }

    /// Drive `on_data_available`: persist the last-notified registry entry
    /// *before* invoking the listener (spec P3), then hand off one
    /// contiguous run or one callback per sample depending on
    /// `notify_one_by_one`.
    fn notify(&self, writer_guid: [u8; 16]) {
        crate::trace_fn!("Reader::notify");
        let Some(proxy) = self.proxies.get_proxy(&writer_guid) else {
            return;
        };
        let max = proxy.available_max();
        let first = proxy.next_to_notify();
        if max <= first {
            return;
        }

        self.last_notified.insert(writer_guid, max);
        self.proxies.advance_notified(writer_guid, max);

        let listener = self.listener.lock().unwrap().clone();
        let Some(listener) = listener else {
            return;
        };
        if self.notify_one_by_one {
            for sn in (first + 1)..=max {
                listener.on_sample_available(writer_guid, sn);
            }
        } else {
            listener.on_data_available(writer_guid, first + 1, max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::ResourceLimits;
    use crate::reliability::history::HistoryKind;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn guid(id: u8) -> GUID {
        GUID::new([id; 12], [0, 0, 0, 1])
    }

    fn limits() -> ResourceLimits {
        ResourceLimits {
            max_samples: 100,
            max_instances: 10,
            max_samples_per_instance: 100,
            max_quota_bytes: 1_000_000,
        }
    }

    fn reader() -> Reader {
        Reader::new(History::new(HistoryKind::KeepLast(10), limits(), false), false)
    }

    struct RecordingListener {
        last: AtomicI64,
    }

    impl DataAvailableListener for RecordingListener {
        fn on_data_available(&self, _writer_guid: [u8; 16], _first: i64, last: i64) {
            self.last.store(last, Ordering::SeqCst);
        }
    }

    #[test]
    fn process_data_admits_and_notifies() {
        let reader = reader();
        let listener = Arc::new(RecordingListener { last: AtomicI64::new(0) });
        reader.set_listener(listener.clone());

        let writer = guid(1);
        let result = reader.process_data(
            writer,
            SequenceNumber(1),
            InstanceHandle::NIL,
            ChangeKind::Alive,
            vec![1, 2, 3],
        );
        assert!(result.is_ok());
        assert_eq!(listener.last.load(Ordering::SeqCst), 1);
        assert_eq!(reader.history().lock().unwrap().len(), 1);
    }

    #[test]
    fn process_data_frag_completes_after_all_fragments() {
        let reader = reader();
        let writer = guid(1);
        let sn = SequenceNumber(1);

        let first = reader.process_data_frag(
            writer,
            sn,
            InstanceHandle::NIL,
            ChangeKind::Alive,
            20,
            10,
            1,
            &[1u8; 10],
        );
        assert!(first.is_none());

        let second = reader.process_data_frag(
            writer,
            sn,
            InstanceHandle::NIL,
            ChangeKind::Alive,
            20,
            10,
            2,
            &[2u8; 10],
        );
        assert_eq!(second, Some(Ok(())));
        assert_eq!(reader.history().lock().unwrap().len(), 1);
    }

    #[test]
    fn process_gap_marks_irrelevant_and_advances() {
        let reader = reader();
        let writer_bytes = guid(1).as_bytes();
        reader.proxies().matched_writer_add(writer_bytes, 0);
        reader.process_gap(writer_bytes, 1, 3, &[]);
        let proxy = reader.proxies().get_proxy(&writer_bytes).unwrap();
        assert_eq!(proxy.available_max(), 2);
    }

    #[test]
    fn instance_limit_rejection_marks_irrelevant_not_received() {
        let mut limits = limits();
        limits.max_instances = 1;
        let reader = Reader::new(History::new(HistoryKind::KeepLast(10), limits, true), false);
        let writer = guid(1);

        let mut handle_a = InstanceHandle::NIL;
        handle_a.0[0] = 1;
        let mut handle_b = InstanceHandle::NIL;
        handle_b.0[0] = 2;

        assert!(reader
            .process_data(writer, SequenceNumber(1), handle_a, ChangeKind::Alive, vec![0])
            .is_ok());
        let result = reader.process_data(writer, SequenceNumber(2), handle_b, ChangeKind::Alive, vec![0]);
        assert_eq!(result, Err(RejectionReason::RejectedByInstancesLimit));

        let writer_bytes = writer.as_bytes();
        let proxy = reader.proxies().get_proxy(&writer_bytes).unwrap();
        assert!(proxy.change_was_received(2));
        assert!(proxy.missing_changes().is_empty());
    }
}
