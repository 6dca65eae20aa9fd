// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-wide error taxonomy.
//!
//! One hand-rolled `Error` enum, matching the rest of this codebase's
//! convention of not pulling in `thiserror` for a handful of variants.
//! QoS-incompatible-peer and fatal conditions are deliberately absent here:
//! per the error-handling design, incompatible QoS is surfaced through
//! [`crate::core::discovery::matcher::MatchResult`] and fatal conditions
//! never propagate as a `Result` at all.

use std::fmt;

use crate::reliability::history::RejectionReason;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
///
/// Variants are grouped by the taxonomy they belong to: configuration
/// (construction-time), resource-exhausted, protocol-recoverable, timeout
/// and malformed-ingress (used internally; callers generally log-and-drop
/// rather than propagate these).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// QoS policy combination failed `validate()`.
    InvalidQos(String),
    /// `ResourceLimits` combination is internally inconsistent.
    InvalidResourceLimits(String),
    /// History admission was rejected; carries the specific reason.
    HistoryFull(RejectionReason),
    /// `FlowController` bandwidth cap for the current period was exceeded.
    BandwidthExceeded,
    /// Operation could not complete but the endpoint/proxy state is intact
    /// and a retry is meaningful (e.g. a proxy not yet matched).
    NotDelivered,
    /// A blocking wait (e.g. on history space) exceeded its deadline.
    Timeout,
    /// Ingress submessage failed structural validation.
    ///
    /// Internal use: per §7, malformed ingress is dropped and logged at the
    /// point of detection rather than unwound through the call stack. This
    /// variant exists for the few spots (fragment reassembly) that need to
    /// report the reason to an immediate caller that does the dropping.
    MalformedSubmessage(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidQos(msg) => write!(f, "invalid QoS: {msg}"),
            Error::InvalidResourceLimits(msg) => write!(f, "invalid resource limits: {msg}"),
            Error::HistoryFull(reason) => write!(f, "history admission rejected: {reason}"),
            Error::BandwidthExceeded => write!(f, "flow controller bandwidth cap exceeded"),
            Error::NotDelivered => write!(f, "sample not delivered"),
            Error::Timeout => write!(f, "operation timed out"),
            Error::MalformedSubmessage(msg) => write!(f, "malformed submessage: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<RejectionReason> for Error {
    fn from(reason: RejectionReason) -> Self {
        Error::HistoryFull(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_informative() {
        assert!(Error::InvalidQos("x".into()).to_string().contains("invalid QoS"));
        assert!(Error::Timeout.to_string().contains("timed out"));
        assert!(Error::BandwidthExceeded.to_string().contains("bandwidth"));
    }

    #[test]
    fn from_rejection_reason() {
        let err: Error = RejectionReason::RejectedBySamplesLimit.into();
        assert_eq!(err, Error::HistoryFull(RejectionReason::RejectedBySamplesLimit));
    }
}
