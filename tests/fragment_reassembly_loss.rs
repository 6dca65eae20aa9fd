// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Large-sample fragment reassembly with loss: a 1,048,576-byte sample sent
//! as 17 fragments of 64,000 bytes each, with every even-numbered fragment
//! dropped on the first pass. The reader must compose the right NACKFRAG
//! bitmap and only complete the sample once the missing fragments arrive.

use rdds_core::core::discovery::guid::GUID;
use rdds_core::core::reader::Reader;
use rdds_core::qos::ResourceLimits;
use rdds_core::reliability::cache::{ChangeKind, FragmentMap, InstanceHandle, SequenceNumber};
use rdds_core::reliability::history::{History, HistoryKind};

const SAMPLE_SIZE: u32 = 1_048_576;
const FRAGMENT_SIZE: u32 = 64_000;
const TOTAL_FRAGMENTS: u32 = 17; // ceil(1_048_576 / 64_000)

fn writer_guid() -> GUID {
    GUID::new([3; 12], [0, 0, 0, 1])
}

#[test]
fn missing_fragments_after_first_pass_are_the_even_numbers() {
    let mut frags = FragmentMap::new(FRAGMENT_SIZE, TOTAL_FRAGMENTS);
    for odd in (1..=TOTAL_FRAGMENTS).step_by(2) {
        frags.mark_received(odd, 1);
    }

    let expected: Vec<u32> = (2..=16).step_by(2).collect();
    assert_eq!(frags.missing_fragments(), expected);
    assert!(!frags.is_complete());
}

#[test]
fn reader_completes_only_after_nackfrag_repair_fills_the_gaps() {
    let reader = Reader::new(
        History::new(HistoryKind::KeepLast(10), ResourceLimits::default(), false),
        false,
    );
    let writer = writer_guid();
    let sn = SequenceNumber(1);

    let mut result = None;
    for odd in (1..=TOTAL_FRAGMENTS).step_by(2) {
        result = reader.process_data_frag(
            writer,
            sn,
            InstanceHandle::NIL,
            ChangeKind::Alive,
            SAMPLE_SIZE,
            FRAGMENT_SIZE,
            odd,
            &[odd as u8; FRAGMENT_SIZE as usize],
        );
        assert!(result.is_none(), "sample must stay incomplete while even fragments are missing");
    }

    // NACKFRAG-driven repair pass: the dropped even fragments arrive.
    for even in (2..=16).step_by(2) {
        result = reader.process_data_frag(
            writer,
            sn,
            InstanceHandle::NIL,
            ChangeKind::Alive,
            SAMPLE_SIZE,
            FRAGMENT_SIZE,
            even,
            &[even as u8; FRAGMENT_SIZE as usize],
        );
    }

    assert_eq!(result, Some(Ok(())));
    assert_eq!(reader.history().lock().unwrap().len(), 1);
}
