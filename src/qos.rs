// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

/// QoS (Quality of Service) policies for DataWriter and DataReader
///
/// # Supported Policies
///
/// - **Reliability**: BestEffort (fire-and-forget)
/// - **History**: KeepLast(n) bounded queue, KeepAll within ResourceLimits
/// - **Durability**: Volatile, TransientLocal, Persistent
/// - **ResourceLimits**: max_samples, max_instances, max_samples_per_instance
///
/// # Examples
///
/// ```no_run
/// use rdds_core::qos::{QosProfile, History, ResourceLimits};
///
/// // Default QoS (BestEffort, KeepLast(10))
/// let qos_default = QosProfile::default();
///
/// // Custom QoS
/// let qos_custom = QosProfile {
///     history: History::KeepLast(100),
///     resource_limits: ResourceLimits {
///         max_samples: 500,
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// ```
/// QoS Profile - Collection of policies for Writer/Reader
///
/// Validated at Writer/Reader creation (fail-fast on invalid config).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QosProfile {
    /// Reliability policy
    pub reliability: Reliability,
    /// History policy (KeepLast or KeepAll)
    pub history: History,
    /// Durability policy
    pub durability: Durability,
    /// Resource limits (queue sizes, instances)
    pub resource_limits: ResourceLimits,
}

impl Default for QosProfile {
    fn default() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            history: History::KeepLast(10),
            durability: Durability::Volatile,
            resource_limits: ResourceLimits::default(),
        }
    }
}

impl QosProfile {
    /// Validate QoS configuration
    ///
    /// Checks for invalid combinations and resource limits.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if valid
    /// - `Err(String)` with validation error message
    ///
    /// # Validation Rules
    ///
    /// - History::KeepLast(n) where n > 0
    /// - History::KeepAll requires ResourceLimits.max_samples > 0
    /// - max_samples >= max_samples_per_instance * max_instances
    ///
    /// # Examples
    ///
    /// ```
    /// use rdds_core::qos::{QosProfile, History};
    ///
    /// let mut qos = QosProfile::default();
    /// assert!(qos.validate().is_ok());
    ///
    /// qos.history = History::KeepLast(0); // Invalid
    /// assert!(qos.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), String> {
        // Validate History
        match self.history {
            History::KeepLast(0) => {
                return Err("History::KeepLast(n) requires n > 0".to_string());
            }
            History::KeepAll => {
                if self.resource_limits.max_samples == 0 {
                    return Err(
                        "History::KeepAll requires ResourceLimits.max_samples > 0".to_string()
                    );
                }
            }
            History::KeepLast(_) => {}
        }

        // Validate ResourceLimits
        let rl = &self.resource_limits;
        if rl.max_samples < rl.max_samples_per_instance * rl.max_instances {
            return Err(format!(
                "max_samples ({}) must be >= max_samples_per_instance ({}) * max_instances ({})",
                rl.max_samples, rl.max_samples_per_instance, rl.max_instances
            ));
        }

        // Phase 7: Reject unsupported policies
        // (Reliability::Reliable deferred to Phase T2)

        Ok(())
    }

    /// Create QoS profile for low-latency scenarios
    ///
    /// - BestEffort reliability (no retransmissions)
    /// - KeepLast(1) history (drop old samples)
    /// - Minimal resource limits
    #[must_use]
    pub fn low_latency() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            history: History::KeepLast(1),
            durability: Durability::Volatile,
            resource_limits: ResourceLimits {
                max_samples: 10,
                max_instances: 1,
                max_samples_per_instance: 10,
                max_quota_bytes: 100_000, // 100 KB for low-latency
            },
        }
    }

    /// Create QoS profile for high-throughput scenarios
    ///
    /// - BestEffort reliability
    /// - KeepLast(1000) history (large queue)
    /// - High resource limits
    #[must_use]
    pub fn high_throughput() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            history: History::KeepLast(1000),
            durability: Durability::Volatile,
            resource_limits: ResourceLimits {
                max_samples: 5000,
                max_instances: 1,
                max_samples_per_instance: 5000,
                max_quota_bytes: 50_000_000, // 50 MB for high-throughput
            },
        }
    }
}

/// Reliability policy
///
/// Determines delivery guarantees for samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Reliability {
    /// Fire-and-forget (no ACKs, no retransmission)
    ///
    /// Phase 7a supported. Low latency, may drop packets under congestion.
    #[default]
    BestEffort,
    /// Reliable delivery with NACK-driven retransmission
    ///
    /// Phase T2 (v0.4.0+). Guarantees delivery via ACK/NACK protocol.
    /// Writer caches messages in HistoryCache for retransmission.
    /// Reader tracks gaps and sends NACK for missing sequences.
    Reliable,
}

/// History policy
///
/// Determines how many samples to keep in queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum History {
    /// Keep last N samples (bounded queue, drops oldest)
    ///
    /// Phase 7a supported. Queue size = N.
    /// Uses u32 for network serialization compatibility.
    KeepLast(u32),
    /// Keep all samples within resource limits.
    ///
    /// Queue size is bounded by `ResourceLimits` (max_samples, max_quota_bytes).
    /// Inserts fail once the limits are reached.
    KeepAll,
}

impl Default for History {
    fn default() -> Self {
        Self::KeepLast(10)
    }
}

/// Durability policy
///
/// Determines sample persistence behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Durability {
    /// No persistence (samples lost on writer crash)
    ///
    /// Phase 7a supported. Writer does not cache sent samples.
    #[default]
    Volatile,
    /// Writer caches samples for late-joiners.
    ///
    /// Late-joining readers receive historical samples (up to History depth).
    /// Cache persists only during writer's lifetime (not durable to disk).
    /// Works with both BestEffort and Reliable QoS.
    TransientLocal,
    /// Like `TransientLocal`, but the cache additionally survives writer
    /// restart within the same participant lifetime (durability-service
    /// backed, not necessarily on-disk).
    Transient,
    /// Writer persists samples to disk for late-joiners, surviving process
    /// restart. Disk I/O applies to the write path.
    Persistent,
}

impl Durability {
    /// Ordering rank used by QoS compatibility checks:
    /// `VOLATILE < TRANSIENT_LOCAL < TRANSIENT < PERSISTENT`.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Durability::Volatile => 0,
            Durability::TransientLocal => 1,
            Durability::Transient => 2,
            Durability::Persistent => 3,
        }
    }
}

/// Resource limits for Writer/Reader
///
/// Controls queue sizes, instance limits, and memory quotas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum total samples across all instances
    pub max_samples: usize,
    /// Maximum instances (unkeyed topics = 1 in Phase 7)
    pub max_instances: usize,
    /// Maximum samples per instance
    pub max_samples_per_instance: usize,
    /// Maximum total payload bytes (Reliable QoS history cache quota)
    ///
    /// Used by HistoryCache to limit memory consumption. With KEEP_LAST,
    /// oldest entries are evicted (FIFO). With KEEP_ALL, inserts fail once
    /// the quota is reached. Only relevant for Reliable QoS.
    pub max_quota_bytes: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            // v208: Increased from 1000 to 100K to support RELIABLE retransmission
            // for burst workloads. With 1000, samples evicted before NACK arrives.
            max_samples: 100_000,
            max_instances: 1, // Phase 7: unkeyed topics only
            max_samples_per_instance: 100_000,
            max_quota_bytes: 100_000_000, // 100 MB for 100K samples @ 1KB each
        }
    }
}

/// Ownership policy kind (EXCLUSIVE requires matching strength-based
/// filtering at the subscriber, out of scope here).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OwnershipKind {
    #[default]
    Shared,
    Exclusive,
}

/// Liveliness assertion kind; ordering used by QoS compatibility is
/// `AUTOMATIC < MANUAL_BY_PARTICIPANT < MANUAL_BY_TOPIC`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LivelinessKind {
    #[default]
    Automatic,
    ManualByParticipant,
    ManualByTopic,
}

impl LivelinessKind {
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            LivelinessKind::Automatic => 0,
            LivelinessKind::ManualByParticipant => 1,
            LivelinessKind::ManualByTopic => 2,
        }
    }
}

/// Expected data update period; writer's `period` must be `<=` the
/// reader's for compatibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeadlineQosPolicy {
    pub period: std::time::Duration,
}

impl Default for DeadlineQosPolicy {
    fn default() -> Self {
        Self {
            period: std::time::Duration::MAX,
        }
    }
}

/// Writer liveliness assertion kind + lease; writer lease must be `<=`
/// reader lease for compatibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LivelinessQosPolicy {
    pub kind: LivelinessKind,
    pub lease_duration: std::time::Duration,
}

impl Default for LivelinessQosPolicy {
    fn default() -> Self {
        Self {
            kind: LivelinessKind::Automatic,
            lease_duration: std::time::Duration::MAX,
        }
    }
}

/// If the reader has this enabled, the writer must too.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct DisablePositiveAcksQosPolicy {
    pub enabled: bool,
}

/// Data representation identifiers (XCDR1/XCDR2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataRepresentation {
    XcdrLegacy,
    Xcdr2,
}

/// Logical partition names; glob-style (`*`/`?`) matching is performed by
/// the endpoint matcher, not here.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PartitionQosPolicy {
    pub names: Vec<String>,
}

impl PartitionQosPolicy {
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            names: vec![name.into()],
        }
    }
}

/// The full set of QoS policies consumed by the reader/writer endpoints and
/// the endpoint matcher. Assembled from the smaller per-policy structs above
/// plus the Phase-7a `QosProfile` fields (reliability/history/durability/
/// resource limits).
#[derive(Clone, Debug, PartialEq)]
pub struct EndpointQos {
    pub reliability: Reliability,
    pub history: History,
    pub durability: Durability,
    pub resource_limits: ResourceLimits,
    pub ownership: OwnershipKind,
    pub deadline: DeadlineQosPolicy,
    pub liveliness: LivelinessQosPolicy,
    pub disable_positive_acks: DisablePositiveAcksQosPolicy,
    /// Reader's accepted representations, in preference order; a writer's
    /// first-choice representation must appear in this list. An empty list
    /// (the writer side always has exactly one entry) means the reader
    /// accepts only the default, `XCDR2`.
    pub data_representation: Vec<DataRepresentation>,
    pub partition: PartitionQosPolicy,
}

impl Default for EndpointQos {
    fn default() -> Self {
        Self {
            reliability: Reliability::default(),
            history: History::default(),
            durability: Durability::default(),
            resource_limits: ResourceLimits::default(),
            ownership: OwnershipKind::default(),
            deadline: DeadlineQosPolicy::default(),
            liveliness: LivelinessQosPolicy::default(),
            disable_positive_acks: DisablePositiveAcksQosPolicy::default(),
            data_representation: vec![DataRepresentation::Xcdr2],
            partition: PartitionQosPolicy::default(),
        }
    }
}

impl EndpointQos {
    /// Construction-time validation, mirroring `QosProfile::validate`:
    /// invalid combinations surface as a `Configuration` error rather than
    /// panicking.
    pub fn validate(&self) -> crate::error::Result<()> {
        let profile = QosProfile {
            reliability: self.reliability,
            history: self.history,
            durability: self.durability,
            resource_limits: self.resource_limits,
        };
        profile
            .validate()
            .map_err(crate::error::Error::InvalidQos)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durability_rank_orders_correctly() {
        assert!(Durability::Volatile.rank() < Durability::TransientLocal.rank());
        assert!(Durability::TransientLocal.rank() < Durability::Transient.rank());
        assert!(Durability::Transient.rank() < Durability::Persistent.rank());
    }

    #[test]
    fn liveliness_rank_orders_correctly() {
        assert!(LivelinessKind::Automatic.rank() < LivelinessKind::ManualByParticipant.rank());
        assert!(LivelinessKind::ManualByParticipant.rank() < LivelinessKind::ManualByTopic.rank());
    }

    #[test]
    fn endpoint_qos_default_validates() {
        assert!(EndpointQos::default().validate().is_ok());
    }

    #[test]
    fn endpoint_qos_rejects_inconsistent_resource_limits() {
        let mut qos = EndpointQos::default();
        qos.resource_limits = ResourceLimits {
            max_samples: 1,
            max_instances: 5,
            max_samples_per_instance: 5,
            max_quota_bytes: 1000,
        };
        assert!(qos.validate().is_err());
    }

    #[test]
    fn test_qos_default() {
        let qos = QosProfile::default();

        assert_eq!(qos.reliability, Reliability::BestEffort);
        assert_eq!(qos.history, History::KeepLast(10));
        assert_eq!(qos.durability, Durability::Volatile);
        assert_eq!(qos.resource_limits.max_samples, 100_000);
    }

    #[test]
    fn test_qos_validate_valid() {
        let qos = QosProfile::default();
        assert!(qos.validate().is_ok());
    }

    #[test]
    fn test_qos_validate_invalid_history_zero() {
        let qos = QosProfile {
            history: History::KeepLast(0),
            ..Default::default()
        };

        let result = qos.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .contains("History::KeepLast(n) requires n > 0"));
    }

    #[test]
    fn test_qos_validate_keep_all_requires_limits() {
        let qos = QosProfile {
            history: History::KeepAll,
            resource_limits: ResourceLimits {
                max_samples: 0,
                max_instances: 1,
                max_samples_per_instance: 1,
                max_quota_bytes: 1000,
            },
            ..Default::default()
        };

        let result = qos.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .contains("History::KeepAll requires ResourceLimits.max_samples > 0"));
    }

    #[test]
    fn test_qos_validate_keep_all_ok() {
        let qos = QosProfile {
            history: History::KeepAll,
            ..Default::default()
        };

        assert!(qos.validate().is_ok());
    }

    #[test]
    fn test_qos_validate_resource_limits() {
        let qos = QosProfile {
            resource_limits: ResourceLimits {
                max_samples: 10,
                max_instances: 5,
                max_samples_per_instance: 10,
                max_quota_bytes: 10_000_000,
            },
            ..Default::default()
        };

        // max_samples (10) < max_instances (5) * max_samples_per_instance (10) = 50
        let result = qos.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("max_samples"));
    }

    #[test]
    fn test_qos_low_latency() {
        let qos = QosProfile::low_latency();

        assert_eq!(qos.history, History::KeepLast(1));
        assert_eq!(qos.resource_limits.max_samples, 10);
        assert!(qos.validate().is_ok());
    }

    #[test]
    fn test_qos_high_throughput() {
        let qos = QosProfile::high_throughput();

        assert_eq!(qos.history, History::KeepLast(1000));
        assert_eq!(qos.resource_limits.max_samples, 5000);
        assert!(qos.validate().is_ok());
    }

    #[test]
    fn test_reliability_default() {
        assert_eq!(Reliability::default(), Reliability::BestEffort);
    }

    #[test]
    fn test_history_default() {
        assert_eq!(History::default(), History::KeepLast(10));
    }

    #[test]
    fn test_durability_default() {
        assert_eq!(Durability::default(), Durability::Volatile);
    }

    #[test]
    fn test_durability_transient_local() {
        let qos = QosProfile {
            durability: Durability::TransientLocal,
            ..Default::default()
        };

        assert_eq!(qos.durability, Durability::TransientLocal);
        assert!(qos.validate().is_ok());
    }

    #[test]
    fn test_durability_transient_local_with_reliable() {
        let qos = QosProfile {
            reliability: Reliability::Reliable,
            durability: Durability::TransientLocal,
            history: History::KeepLast(100),
            ..Default::default()
        };

        assert_eq!(qos.durability, Durability::TransientLocal);
        assert_eq!(qos.reliability, Reliability::Reliable);
        assert!(qos.validate().is_ok());
    }

    #[test]
    fn test_resource_limits_default() {
        let rl = ResourceLimits::default();

        assert_eq!(rl.max_samples, 100_000);
        assert_eq!(rl.max_instances, 1);
        assert_eq!(rl.max_samples_per_instance, 100_000);
        assert_eq!(rl.max_quota_bytes, 100_000_000);
    }

    #[test]
    fn test_resource_limits_custom() {
        let rl = ResourceLimits {
            max_samples: 500,
            max_instances: 1,
            max_samples_per_instance: 500,
            max_quota_bytes: 5_000_000,
        };

        assert_eq!(rl.max_samples, 500);
        assert_eq!(rl.max_quota_bytes, 5_000_000);
    }

    #[test]
    fn test_qos_clone() {
        let qos1 = QosProfile::default();
        let qos2 = qos1.clone();

        assert_eq!(qos1, qos2);
    }

    #[test]
    fn test_qos_debug() {
        let qos = QosProfile::default();
        let debug_str = format!("{:?}", qos);

        assert!(debug_str.contains("QosProfile"));
        assert!(debug_str.contains("BestEffort"));
    }
}
