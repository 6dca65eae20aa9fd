// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! QoS compatibility checking (RxO - Request vs Offered).
//!
//! Implements DDS v1.4 Sec.2.2.3 QoS compatibility rules to determine if
//! a DataWriter can communicate with a DataReader based on their QoS policies.
//!
//! # Compatibility Rules
//!
//! | Policy      | Rule                                              |
//! |-------------|---------------------------------------------------|
//! | Reliability | Writer >= Reader (Reliable > BestEffort)           |
//! | Durability  | Writer >= Reader (Persistent > Transient > TransientLocal > Volatile) |
//! | Deadline    | Writer period <= Reader period                     |
//! | Ownership   | Must match exactly                                |
//! | Liveliness  | Writer kind >= Reader kind, writer lease <= reader lease |
//! | DisablePositiveAcks | Reader enabled implies writer enabled      |
//! | DataRepresentation | Writer's first choice must be in reader's list |
//!
//! Partition matching is a separate, non-incompatibility check; see
//! [`partitions_match`].

use crate::qos::{DataRepresentation, Durability, EndpointQos, Reliability};

/// Check QoS compatibility between offered (writer) and requested (reader).
///
/// Implements DDS v1.4 Sec.2.2.3 Request vs Offered (RxO) QoS compatibility
/// rules. All checks must pass for the pair to be considered compatible.
/// Partition matching is intentionally not covered here; see
/// [`partitions_match`].
pub(super) fn is_compatible(reader_qos: &EndpointQos, writer_qos: &EndpointQos) -> bool {
    crate::trace_fn!("qos::is_compatible");

    let reliability_ok = match (&writer_qos.reliability, &reader_qos.reliability) {
        (Reliability::BestEffort, Reliability::Reliable) => false,
        _ => true,
    };
    if !reliability_ok {
        log::debug!(
            "[MATCH-QOS] Reliability mismatch (writer={:?}, reader={:?})",
            writer_qos.reliability,
            reader_qos.reliability
        );
        return false;
    }

    let durability_ok = writer_qos.durability.rank() >= reader_qos.durability.rank();
    if !durability_ok {
        log::debug!(
            "[MATCH-QOS] Durability mismatch (writer={:?}, reader={:?})",
            writer_qos.durability,
            reader_qos.durability
        );
        return false;
    }

    if writer_qos.deadline.period > reader_qos.deadline.period {
        log::debug!(
            "[MATCH-QOS] Deadline mismatch (writer={:?}, reader={:?})",
            writer_qos.deadline,
            reader_qos.deadline
        );
        return false;
    }

    if writer_qos.ownership != reader_qos.ownership {
        log::debug!(
            "[MATCH-QOS] Ownership mismatch (writer={:?}, reader={:?})",
            writer_qos.ownership,
            reader_qos.ownership
        );
        return false;
    }

    if writer_qos.liveliness.kind.rank() < reader_qos.liveliness.kind.rank() {
        log::debug!(
            "[MATCH-QOS] Liveliness kind mismatch (writer={:?}, reader={:?})",
            writer_qos.liveliness.kind,
            reader_qos.liveliness.kind
        );
        return false;
    }
    if writer_qos.liveliness.lease_duration > reader_qos.liveliness.lease_duration {
        log::debug!(
            "[MATCH-QOS] Liveliness lease mismatch (writer={:?}, reader={:?})",
            writer_qos.liveliness.lease_duration,
            reader_qos.liveliness.lease_duration
        );
        return false;
    }

    if reader_qos.disable_positive_acks.enabled && !writer_qos.disable_positive_acks.enabled {
        log::debug!("[MATCH-QOS] DisablePositiveAcks mismatch (reader enabled, writer not)");
        return false;
    }

    if !data_representation_ok(writer_qos, reader_qos) {
        log::debug!(
            "[MATCH-QOS] DataRepresentation mismatch (writer={:?}, reader={:?})",
            writer_qos.data_representation,
            reader_qos.data_representation
        );
        return false;
    }

    true
}

/// The writer's first-choice representation (defaulting to `XCDR2` if the
/// writer's list is empty) must appear somewhere in the reader's accepted
/// list (defaulting to `[XCDR2]` if the reader's list is empty).
fn data_representation_ok(writer_qos: &EndpointQos, reader_qos: &EndpointQos) -> bool {
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

/// Partition compatibility (not a QoS-incompatibility: callers treat a
/// negative result as "just not matched", no `offered_incompatible_qos`
/// callback).
///
/// Writer and reader partition sets match if either both are empty, one
/// contains the empty string while the other has any entry, or any pair of
/// names across the two sets matches under [`glob_match`].
#[must_use]
pub fn partitions_match(writer_names: &[String], reader_names: &[String]) -> bool {
    if writer_names.is_empty() && reader_names.is_empty() {
        return true;
    }
    if writer_names.iter().any(|n| n.is_empty()) && !reader_names.is_empty() {
        return true;
    }
    if reader_names.iter().any(|n| n.is_empty()) && !writer_names.is_empty() {
        return true;
    }
    writer_names
        .iter()
        .any(|w| reader_names.iter().any(|r| glob_match(w, r) || glob_match(r, w)))
}

/// Glob-style match of `text` against `pattern`, supporting `*` (any run of
/// characters, including none) and `?` (exactly one character).
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_inner(&p, &t)
}

fn glob_match_inner(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => {
            glob_match_inner(&pattern[1..], text)
                || (!text.is_empty() && glob_match_inner(pattern, &text[1..]))
        }
        Some('?') => !text.is_empty() && glob_match_inner(&pattern[1..], &text[1..]),
        Some(c) => text.first() == Some(c) && glob_match_inner(&pattern[1..], &text[1..]),
    }
}
