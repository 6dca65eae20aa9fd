// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Instance-limit rejection: a reader bounded to `max_instances` rejects a
//! sample from a brand-new instance once the limit is reached, without
//! treating the rejected sequence number as missing (no spurious NACK).

use rdds_core::core::discovery::guid::GUID;
use rdds_core::core::reader::Reader;
use rdds_core::qos::ResourceLimits;
use rdds_core::reliability::cache::{ChangeKind, InstanceHandle, SequenceNumber};
use rdds_core::reliability::history::{History, HistoryKind, RejectionReason};

fn writer_guid() -> GUID {
    GUID::new([7; 12], [0, 0, 0, 1])
}

fn instance_handle(byte: u8) -> InstanceHandle {
    let mut handle = InstanceHandle::NIL;
    handle.0[0] = byte;
    handle
}

#[test]
fn fifth_instance_rejected_marked_irrelevant_no_renack() {
    let limits = ResourceLimits {
        max_samples: 1000,
        max_instances: 4,
        max_samples_per_instance: 10,
        max_quota_bytes: 1_000_000,
    };
    let reader = Reader::new(History::new(HistoryKind::KeepAll, limits, true), false);
    let writer = writer_guid();

    for (sn, instance) in (1..=4u8).enumerate() {
        let result = reader.process_data(
            writer,
            SequenceNumber(sn as i64 + 1),
            instance_handle(instance),
            ChangeKind::Alive,
            vec![instance],
        );
        assert!(result.is_ok(), "sample {sn} should be admitted");
    }

    let fifth = reader.process_data(
        writer,
        SequenceNumber(5),
        instance_handle(5),
        ChangeKind::Alive,
        vec![5],
    );
    assert_eq!(fifth, Err(RejectionReason::RejectedByInstancesLimit));

    let writer_bytes = writer.as_bytes();
    let proxy = reader.proxies().get_proxy(&writer_bytes).unwrap();
    assert!(
        proxy.change_was_received(5),
        "rejected SN must be treated as received, not missing"
    );
    assert!(
        proxy.missing_changes().is_empty(),
        "a rejected-by-limit sample must never trigger a repair request"
    );
    assert_eq!(reader.history().lock().unwrap().instance_count(), 4);
}
