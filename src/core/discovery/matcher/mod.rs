// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint-discovery matching engine (EDP-equivalent): topic/type/QoS/
//! partition compatibility between a local and a remote endpoint
//! description, producing a reason mask rather than a bare boolean so
//! callers can drive `requested_incompatible_qos`/`offered_incompatible_qos`
//! listener callbacks.

mod qos;
mod topic;

pub use qos::{glob_match, partitions_match};
pub use topic::TopicKind;

use crate::qos::EndpointQos;

/// Topic name strings differ.
pub const DIFFERENT_TOPIC: u32 = 1 << 0;
/// Topic kind (with-key vs. no-key) differs.
pub const INCONSISTENT_TOPIC: u32 = 1 << 1;
/// Type identifiers/names are incompatible.
pub const DIFFERENT_TYPEINFO: u32 = 1 << 2;
/// One or more QoS policies are incompatible; see `incompatible_qos_mask`.
pub const INCOMPATIBLE_QOS: u32 = 1 << 3;
/// Partition sets do not intersect.
pub const PARTITIONS: u32 = 1 << 4;

/// Per-QoS-policy bit set into [`MatchResult::incompatible_qos_mask`].
pub mod qos_reason {
    pub const RELIABILITY: u32 = 1 << 0;
    pub const DURABILITY: u32 = 1 << 1;
    pub const DEADLINE: u32 = 1 << 2;
    pub const OWNERSHIP: u32 = 1 << 3;
    pub const LIVELINESS: u32 = 1 << 4;
    pub const DISABLE_POSITIVE_ACKS: u32 = 1 << 5;
    pub const DATA_REPRESENTATION: u32 = 1 << 6;
}

/// What a writer or reader announces during discovery: enough of its
/// endpoint description for [`Matcher::valid_matching`] to decide
/// compatibility.
#[derive(Debug, Clone)]
pub struct EndpointDescriptor {
    pub topic_name: String,
    pub topic_kind: TopicKind,
    pub type_name: String,
    /// Present when the type system resolved a stable type identifier
    /// (minimal or complete hash) for this endpoint's data type.
    pub type_id: Option<u32>,
    pub qos: EndpointQos,
    pub partitions: Vec<String>,
}

/// Outcome of [`Matcher::valid_matching`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchResult {
    pub matched: bool,
    pub reason_mask: u32,
    pub incompatible_qos_mask: u32,
}

/// Endpoint-discovery matcher: topic/type/QoS/partition compatibility.
pub struct Matcher;

impl Matcher {
    pub fn new() -> Self {
        crate::trace_fn!("Matcher::new");
        Self
    }

    /// Evaluate writer/reader compatibility, per DDS Sec.2.2.3's notion of
    /// `valid_matching`. Topic/type/topic-kind mismatches short-circuit
    /// before any QoS policy is examined; partition mismatch is reported but
    /// is not folded into `incompatible_qos_mask` (it is "not matched", not
    /// "incompatible").
    pub fn valid_matching(writer: &EndpointDescriptor, reader: &EndpointDescriptor) -> MatchResult {
        crate::trace_fn!("Matcher::valid_matching");
        let mut reason_mask = 0u32;

        if !topic::is_topic_match(&writer.topic_name, &reader.topic_name) {
            reason_mask |= DIFFERENT_TOPIC;
        }
        if !topic::is_topic_kind_match(writer.topic_kind, reader.topic_kind) {
            reason_mask |= INCONSISTENT_TOPIC;
        }
        if !topic::is_type_match(
            writer.type_id,
            reader.type_id,
            &writer.type_name,
            &reader.type_name,
        ) {
            reason_mask |= DIFFERENT_TYPEINFO;
        }

        let incompatible_qos_mask = Self::incompatible_qos_mask(&reader.qos, &writer.qos);
        if incompatible_qos_mask != 0 {
            reason_mask |= INCOMPATIBLE_QOS;
        }

        if !qos::partitions_match(&writer.partitions, &reader.partitions) {
            reason_mask |= PARTITIONS;
        }

        MatchResult {
            matched: reason_mask == 0,
            reason_mask,
            incompatible_qos_mask,
        }
    }

    /// Whether the offered (writer) and requested (reader) QoS are
    /// compatible, ignoring topic/type/partition. Exposed for callers that
    /// only need the QoS half (e.g. re-evaluating after a QoS update).
    pub fn is_compatible(reader_qos: &EndpointQos, writer_qos: &EndpointQos) -> bool {
        crate::trace_fn!("Matcher::is_compatible");
        qos::is_compatible(reader_qos, writer_qos)
    }

    fn incompatible_qos_mask(reader_qos: &EndpointQos, writer_qos: &EndpointQos) -> u32 {
        let mut mask = 0u32;
        if !reliability_ok(writer_qos, reader_qos) {
            mask |= qos_reason::RELIABILITY;
        }
        if writer_qos.durability.rank() < reader_qos.durability.rank() {
            mask |= qos_reason::DURABILITY;
        }
        if writer_qos.deadline.period > reader_qos.deadline.period {
            mask |= qos_reason::DEADLINE;
        }
        if writer_qos.ownership != reader_qos.ownership {
            mask |= qos_reason::OWNERSHIP;
        }
        if writer_qos.liveliness.kind.rank() < reader_qos.liveliness.kind.rank()
            || writer_qos.liveliness.lease_duration > reader_qos.liveliness.lease_duration
        {
            mask |= qos_reason::LIVELINESS;
        }
        if reader_qos.disable_positive_acks.enabled && !writer_qos.disable_positive_acks.enabled {
            mask |= qos_reason::DISABLE_POSITIVE_ACKS;
        }
        if !data_representation_ok(writer_qos, reader_qos) {
            mask |= qos_reason::DATA_REPRESENTATION;
        }
        mask
    }
}

fn reliability_ok(writer_qos: &EndpointQos, reader_qos: &EndpointQos) -> bool {
    use crate::qos::Reliability;
    !matches!(
        (&writer_qos.reliability, &reader_qos.reliability),
        (Reliability::BestEffort, Reliability::Reliable)
    )
}

/// Writer's first-choice representation (`XCDR2` if its list is empty) must
/// appear in the reader's accepted list (`[XCDR2]` if the reader's is empty).
fn data_representation_ok(writer_qos: &EndpointQos, reader_qos: &EndpointQos) -> bool {
    use crate::qos::DataRepresentation;
    let writer_choice = writer_qos
        .data_representation
        .first()
        .copied()
        .unwrap_or(DataRepresentation::Xcdr2);
    if reader_qos.data_representation.is_empty() {
        return writer_choice == DataRepresentation::Xcdr2;
    }
    reader_qos.data_representation.contains(&writer_choice)
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(topic: &str, qos: EndpointQos) -> EndpointDescriptor {
        EndpointDescriptor {
            topic_name: topic.to_string(),
            topic_kind: TopicKind::WithKey,
            type_name: "Point".to_string(),
            type_id: None,
            qos,
            partitions: vec![],
        }
    }

    #[test]
    fn matching_endpoints_match() {
        let writer = descriptor("Square", EndpointQos::default());
        let reader = descriptor("Square", EndpointQos::default());
        let result = Matcher::valid_matching(&writer, &reader);
        assert!(result.matched);
        assert_eq!(result.reason_mask, 0);
    }

    #[test]
    fn different_topic_name_reported() {
        let writer = descriptor("Square", EndpointQos::default());
        let reader = descriptor("Circle", EndpointQos::default());
        let result = Matcher::valid_matching(&writer, &reader);
        assert!(!result.matched);
        assert_eq!(result.reason_mask & DIFFERENT_TOPIC, DIFFERENT_TOPIC);
    }

    #[test]
    fn inconsistent_topic_kind_reported() {
        let mut writer = descriptor("Square", EndpointQos::default());
        writer.topic_kind = TopicKind::NoKey;
        let reader = descriptor("Square", EndpointQos::default());
        let result = Matcher::valid_matching(&writer, &reader);
        assert_eq!(result.reason_mask & INCONSISTENT_TOPIC, INCONSISTENT_TOPIC);
    }

    #[test]
    fn different_type_info_reported() {
        let writer = descriptor("Square", EndpointQos::default());
        let mut reader = descriptor("Square", EndpointQos::default());
        reader.type_name = "Circle".to_string();
        let result = Matcher::valid_matching(&writer, &reader);
        assert_eq!(result.reason_mask & DIFFERENT_TYPEINFO, DIFFERENT_TYPEINFO);
    }

    #[test]
    fn incompatible_qos_reported_with_reason_bit() {
        use crate::qos::Reliability;
        let writer = descriptor(
            "Square",
            EndpointQos { reliability: Reliability::BestEffort, ..EndpointQos::default() },
        );
        let reader = descriptor(
            "Square",
            EndpointQos { reliability: Reliability::Reliable, ..EndpointQos::default() },
        );
        let result = Matcher::valid_matching(&writer, &reader);
        assert!(!result.matched);
        assert_eq!(result.reason_mask & INCOMPATIBLE_QOS, INCOMPATIBLE_QOS);
        assert_eq!(
            result.incompatible_qos_mask & qos_reason::RELIABILITY,
            qos_reason::RELIABILITY
        );
    }

    #[test]
    fn partition_mismatch_reported_without_incompatible_qos() {
        let mut writer = descriptor("Square", EndpointQos::default());
        writer.partitions = vec!["sensor".to_string()];
        let mut reader = descriptor("Square", EndpointQos::default());
        reader.partitions = vec!["actuator".to_string()];
        let result = Matcher::valid_matching(&writer, &reader);
        assert!(!result.matched);
        assert_eq!(result.reason_mask & PARTITIONS, PARTITIONS);
        assert_eq!(result.reason_mask & INCOMPATIBLE_QOS, 0);
        assert_eq!(result.incompatible_qos_mask, 0);
    }
}
