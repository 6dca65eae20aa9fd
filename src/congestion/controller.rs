// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! [`FlowController`] -- paces asynchronous delivery across the writers
//! sharing it, per the configured scheduling discipline and publishing
//! mode.
//!
//! The queue is a slab-backed doubly linked list: every queued cache is a
//! node with `(prev, next)` links into the list that gives FIFO order.
//! Removing a node (on successful delivery, or on an explicit
//! `remove_change`/I7 race) unlinks it from the chain and its writer's
//! queue in one step; the worker thread re-reads a node's links after each
//! lock reacquisition rather than caching them across a yield point, so a
//! concurrent removal is always visible before the next delivery attempt.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::config::{FlowControllerConfig, PublishMode, SchedulingKind, WriterSchedule};
use super::token_bucket::TokenBucket;

/// Opaque handle returned by [`FlowController::enqueue`]; the only valid
/// argument to [`FlowController::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueHandle(usize);

/// Result of attempting to deliver one cache over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverOutcome {
    Delivered,
    NotDelivered,
    ExceededLimit,
}

/// Caller-supplied delivery callback: the writer's `deliver_sample_nts`.
/// Invoked with the writer id and payload; never called while the
/// controller's internal queue lock is held.
pub trait SampleDeliverer: Send + Sync {
    fn deliver_sample_nts(&self, writer_id: u64, payload: &[u8]) -> DeliverOutcome;
}

struct Node {
    writer_id: u64,
    payload: Vec<u8>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Slab-backed doubly linked list of queued caches, plus the per-writer
/// index structures the scheduling disciplines read from.
struct Queue {
    slab: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    /// Per-writer FIFO of node indices, for RoundRobin's fairness cursor.
    per_writer: BTreeMap<u64, VecDeque<usize>>,
    /// RoundRobin cursor: the writer id served last.
    round_robin_cursor: Option<u64>,
    queued_bytes: usize,
}

impl Queue {
    fn new() -> Self {
        Self {
            slab: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            per_writer: BTreeMap::new(),
            round_robin_cursor: None,
            queued_bytes: 0,
        }
    }

    fn push(&mut self, writer_id: u64, payload: Vec<u8>) -> usize {
        self.queued_bytes += payload.len();
        let node = Node { writer_id, payload, prev: self.tail, next: None };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slab[idx] = Some(node);
                idx
            }
            None => {
                self.slab.push(Some(node));
                self.slab.len() - 1
            }
        };
        if let Some(tail) = self.tail {
            self.slab[tail].as_mut().unwrap().next = Some(idx);
        } else {
            self.head = Some(idx);
        }
        self.tail = Some(idx);
        self.per_writer.entry(writer_id).or_default().push_back(idx);
        idx
    }

    /// Unlink `idx` from the global chain and its writer's queue. Returns
    /// the removed node's writer id and payload.
    fn unlink(&mut self, idx: usize) -> Option<(u64, Vec<u8>)> {
        let node = self.slab.get_mut(idx)?.take()?;
        let (prev, next) = (node.prev, node.next);
        match prev {
            Some(p) => self.slab[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slab[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
        if let Some(writer_queue) = self.per_writer.get_mut(&node.writer_id) {
            writer_queue.retain(|&i| i != idx);
        }
        self.queued_bytes -= node.payload.len();
        self.free.push(idx);
        Some((node.writer_id, node.payload))
    }

    fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Choose the next node to attempt delivery for, without removing it.
    fn peek_next(&mut self, discipline: &SchedulingKind, schedule: &DashMap<u64, WriterSchedule>) -> Option<usize> {
        match discipline {
            SchedulingKind::Fifo => self.head,
            SchedulingKind::RoundRobin => self.peek_round_robin(),
            SchedulingKind::HighPriority | SchedulingKind::PriorityWithReservation => self.peek_by_priority(schedule),
        }
    }

    fn peek_round_robin(&mut self) -> Option<usize> {
        if self.per_writer.is_empty() {
            return None;
        }
        let writers: Vec<u64> = self.per_writer.keys().copied().collect();
        let start = match self.round_robin_cursor {
            Some(last) => writers.iter().position(|w| *w == last).map(|p| (p + 1) % writers.len()).unwrap_or(0),
            None => 0,
        };
        for offset in 0..writers.len() {
            let writer_id = writers[(start + offset) % writers.len()];
            if let Some(&idx) = self.per_writer.get(&writer_id).and_then(|q| q.front()) {
                self.round_robin_cursor = Some(writer_id);
                return Some(idx);
            }
        }
        None
    }

    /// Highest-priority non-empty writer bucket wins; ties favor whichever
    /// writer's head node was queued first (the chain position nearer the
    /// head, approximated here by slab index since indices below the
    /// high-water mark are assigned in arrival order and rarely reused
    /// before being revisited).
    fn peek_by_priority(&self, schedule: &DashMap<u64, WriterSchedule>) -> Option<usize> {
        self.per_writer
            .iter()
            .filter_map(|(writer_id, q)| q.front().map(|&idx| (*writer_id, idx)))
            .max_by_key(|(writer_id, idx)| {
                let priority = schedule.get(writer_id).map(|s| s.priority).unwrap_or(0);
                (priority, std::cmp::Reverse(*idx))
            })
            .map(|(_, idx)| idx)
    }
}

/// Paces asynchronous delivery for every writer that shares this
/// controller. One controller may serve many writers; a writer registers
/// its scheduling parameters via [`FlowController::register_writer`].
pub struct FlowController {
    config: FlowControllerConfig,
    queue: Mutex<Queue>,
    wake: Condvar,
    schedule: DashMap<u64, WriterSchedule>,
    reservation_used: Mutex<BTreeMap<u64, u64>>,
    bandwidth: Mutex<Option<TokenBucket>>,
    period_reset_at: Mutex<Instant>,
    running: Arc<std::sync::atomic::AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FlowController {
    #[must_use]
    pub fn new(config: FlowControllerConfig) -> Self {
        let bandwidth = match &config.publish_mode {
            PublishMode::LimitedAsync { max_bytes_per_period, period } => {
                let rate_bps = (*max_bytes_per_period as f64 * 1000.0 / period.as_millis().max(1) as f64) as u32;
                Some(TokenBucket::new(rate_bps, *max_bytes_per_period))
            }
            _ => None,
        };
        Self {
            config,
            queue: Mutex::new(Queue::new()),
            wake: Condvar::new(),
            schedule: DashMap::new(),
            reservation_used: Mutex::new(BTreeMap::new()),
            bandwidth: Mutex::new(bandwidth),
            period_reset_at: Mutex::new(Instant::now()),
            running: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &FlowControllerConfig {
        &self.config
    }

    /// Register or update a writer's scheduling parameters. A no-op under
    /// [`SchedulingKind::Fifo`]/[`SchedulingKind::RoundRobin`].
    pub fn register_writer(&self, writer_id: u64, schedule: WriterSchedule) {
        self.schedule.insert(writer_id, schedule);
    }

    pub fn unregister_writer(&self, writer_id: u64) {
        self.schedule.remove(&writer_id);
        self.reservation_used.lock().unwrap().remove(&writer_id);
    }

    /// Queue `payload` for a writer. Under [`PublishMode::Sync`] the caller
    /// is expected to have already attempted synchronous delivery and only
    /// enqueue on `NOT_DELIVERED`.
    pub fn enqueue(&self, writer_id: u64, payload: Vec<u8>) -> QueueHandle {
        crate::trace_fn!("FlowController::enqueue");
        let idx = self.queue.lock().unwrap().push(writer_id, payload);
        self.wake.notify_one();
        QueueHandle(idx)
    }

    /// Cooperative removal (spec invariant P5): unlink a still-queued cache
    /// without delivering it. Returns `false` if it was already delivered
    /// or removed.
    pub fn remove(&self, handle: QueueHandle) -> bool {
        crate::trace_fn!("FlowController::remove");
        self.queue.lock().unwrap().unlink(handle.0).is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    #[must_use]
    pub fn queued_bytes(&self) -> usize {
        self.queue.lock().unwrap().queued_bytes
    }

    /// Drive one scheduling decision: select the next cache per discipline,
    /// attempt delivery, and unlink it on `DELIVERED`. Leaves it queued on
    /// `NOT_DELIVERED`/`EXCEEDED_LIMIT` for a later retry. Returns `None`
    /// when the queue is empty or the selected cache was concurrently
    /// removed.
    pub fn drive_once(&self, deliverer: &dyn SampleDeliverer) -> Option<DeliverOutcome> {
        crate::trace_fn!("FlowController::drive_once");
        self.maybe_reset_period();

        let (idx, writer_id, payload_len) = {
            let mut queue = self.queue.lock().unwrap();
            let idx = queue.peek_next(&self.config.scheduling, &self.schedule)?;
            let idx = self.prefer_reserved(&mut queue, idx);
            let node = queue.slab[idx].as_ref()?;
            (idx, node.writer_id, node.payload.len())
        };

        if let Some(bucket) = self.bandwidth.lock().unwrap().as_mut() {
            if !bucket.try_consume(payload_len as u64) {
                return Some(DeliverOutcome::ExceededLimit);
            }
        }

        let payload = self.queue.lock().unwrap().slab[idx].as_ref()?.payload.clone();
        let outcome = deliverer.deliver_sample_nts(writer_id, &payload);
        match outcome {
            DeliverOutcome::Delivered => {
                self.queue.lock().unwrap().unlink(idx);
                if self.config.scheduling == SchedulingKind::PriorityWithReservation {
                    *self.reservation_used.lock().unwrap().entry(writer_id).or_insert(0) += payload.len() as u64;
                }
            }
            DeliverOutcome::NotDelivered | DeliverOutcome::ExceededLimit => {}
        }
        Some(outcome)
    }

    /// Under `PriorityWithReservation`, prefer any writer whose reserved
    /// minimum for this period is still unmet over the priority pick.
    fn prefer_reserved(&self, queue: &mut Queue, fallback: usize) -> usize {
        if self.config.scheduling != SchedulingKind::PriorityWithReservation {
            return fallback;
        }
        let used = self.reservation_used.lock().unwrap();
        for (writer_id, writer_queue) in &queue.per_writer {
            let Some(&idx) = writer_queue.front() else { continue };
            let reserved = self.schedule.get(writer_id).map(|s| s.reserved_bytes_per_period).unwrap_or(0);
            if reserved == 0 {
                continue;
            }
            let consumed = used.get(writer_id).copied().unwrap_or(0);
            if consumed < reserved {
                return idx;
            }
        }
        fallback
    }

    fn maybe_reset_period(&self) {
        let PublishMode::LimitedAsync { period, .. } = &self.config.publish_mode else {
            return;
        };
        let mut reset_at = self.period_reset_at.lock().unwrap();
        if reset_at.elapsed() >= *period {
            *reset_at = Instant::now();
            self.reservation_used.lock().unwrap().clear();
        }
    }

    /// Start the worker thread that drains the queue in the background.
    /// No-op under [`PublishMode::PureSync`].
    pub fn start(self: &Arc<Self>, deliverer: Arc<dyn SampleDeliverer>) {
        if self.config.publish_mode == PublishMode::PureSync {
            return;
        }
        self.running.store(true, std::sync::atomic::Ordering::SeqCst);
        let controller = Arc::clone(self);
        let running = Arc::clone(&self.running);
        let handle = std::thread::spawn(move || {
            while running.load(std::sync::atomic::Ordering::SeqCst) {
                if controller.is_empty() {
                    let guard = controller.queue.lock().unwrap();
                    let _ = controller.wake.wait_timeout(guard, Duration::from_millis(50));
                    continue;
                }
                controller.drive_once(deliverer.as_ref());
            }
        });
        *self.worker.lock().unwrap() = Some(handle);
    }

    /// Stop the worker thread and block until it has returned.
    pub fn stop(&self) {
        self.running.store(false, std::sync::atomic::Ordering::SeqCst);
        self.wake.notify_all();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysDelivers {
        count: AtomicUsize,
    }

    impl SampleDeliverer for AlwaysDelivers {
        fn deliver_sample_nts(&self, _writer_id: u64, _payload: &[u8]) -> DeliverOutcome {
            self.count.fetch_add(1, Ordering::SeqCst);
            DeliverOutcome::Delivered
        }
    }

    struct NeverDelivers;

    impl SampleDeliverer for NeverDelivers {
        fn deliver_sample_nts(&self, _writer_id: u64, _payload: &[u8]) -> DeliverOutcome {
            DeliverOutcome::NotDelivered
        }
    }

    #[test]
    fn fifo_delivers_in_arrival_order() {
        let controller = FlowController::new(FlowControllerConfig::new(SchedulingKind::Fifo, PublishMode::Sync));
        controller.enqueue(1, vec![1]);
        controller.enqueue(2, vec![2]);

        struct Recording(Mutex<Vec<u64>>);
        impl SampleDeliverer for Recording {
            fn deliver_sample_nts(&self, writer_id: u64, _payload: &[u8]) -> DeliverOutcome {
                self.0.lock().unwrap().push(writer_id);
                DeliverOutcome::Delivered
            }
        }
        let recorder = Recording(Mutex::new(Vec::new()));
        controller.drive_once(&recorder);
        controller.drive_once(&recorder);
        assert_eq!(recorder.0.lock().unwrap().as_slice(), &[1, 2]);
        assert!(controller.is_empty());
    }

    #[test]
    fn round_robin_alternates_writers() {
        let controller =
            FlowController::new(FlowControllerConfig::new(SchedulingKind::RoundRobin, PublishMode::Sync));
        controller.enqueue(1, vec![1]);
        controller.enqueue(1, vec![1]);
        controller.enqueue(2, vec![2]);

        let deliverer = AlwaysDelivers { count: AtomicUsize::new(0) };
        controller.drive_once(&deliverer);
        // writer 1 had two queued and one delivered, writer 2 untouched.
        assert_eq!(controller.queue.lock().unwrap().per_writer.get(&2).map(VecDeque::len), Some(1));
    }

    #[test]
    fn high_priority_prefers_higher_priority_writer() {
        let controller =
            FlowController::new(FlowControllerConfig::new(SchedulingKind::HighPriority, PublishMode::Sync));
        controller.register_writer(1, WriterSchedule { priority: 0, reserved_bytes_per_period: 0 });
        controller.register_writer(2, WriterSchedule { priority: 10, reserved_bytes_per_period: 0 });
        controller.enqueue(1, vec![1]);
        controller.enqueue(2, vec![2]);

        struct Recording(Mutex<Vec<u64>>);
        impl SampleDeliverer for Recording {
            fn deliver_sample_nts(&self, writer_id: u64, _payload: &[u8]) -> DeliverOutcome {
                self.0.lock().unwrap().push(writer_id);
                DeliverOutcome::Delivered
            }
        }
        let recorder = Recording(Mutex::new(Vec::new()));
        controller.drive_once(&recorder);
        assert_eq!(recorder.0.lock().unwrap().as_slice(), &[2]);
    }

    #[test]
    fn remove_unlinks_without_delivering() {
        let controller = FlowController::new(FlowControllerConfig::default());
        let handle = controller.enqueue(1, vec![1, 2, 3]);
        assert!(controller.remove(handle));
        assert!(controller.is_empty());
        assert!(!controller.remove(handle));
    }

    #[test]
    fn not_delivered_leaves_cache_queued() {
        let controller = FlowController::new(FlowControllerConfig::new(SchedulingKind::Fifo, PublishMode::Sync));
        controller.enqueue(1, vec![1]);
        let deliverer = NeverDelivers;
        let outcome = controller.drive_once(&deliverer);
        assert_eq!(outcome, Some(DeliverOutcome::NotDelivered));
        assert!(!controller.is_empty());
    }

    #[test]
    fn limited_async_exceeding_cap_reports_exceeded_limit() {
        let controller = FlowController::new(FlowControllerConfig::new(
            SchedulingKind::Fifo,
            PublishMode::LimitedAsync { max_bytes_per_period: 4, period: Duration::from_secs(60) },
        ));
        controller.enqueue(1, vec![0u8; 100]);
        let deliverer = AlwaysDelivers { count: AtomicUsize::new(0) };
        let outcome = controller.drive_once(&deliverer);
        assert_eq!(outcome, Some(DeliverOutcome::ExceededLimit));
        assert!(!controller.is_empty());
    }
}
