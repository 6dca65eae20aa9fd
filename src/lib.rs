// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # rdds-core — reliability, history, and discovery-matching subsystem
//!
//! Implements the protocol heart of a DDS/RTPS middleware: the reader-side
//! reliability state machine (`WriterProxy`), the writer-side history and
//! flow control, and the endpoint-discovery matching engine. Transport, CDR
//! encoding of user payloads, participant discovery (PDP), and the
//! IDL/dynamic-type system are external collaborators — this crate consumes
//! their contracts but does not implement them.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rdds_core::qos::EndpointQos;
//! use rdds_core::reliability::history::History;
//!
//! let qos = EndpointQos::default();
//! let history = History::new(qos.history, qos.resource_limits, true);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |  user write() / take()              user listener callbacks         |
//! +---------------------------------------------------------------------+
//! |  core::writer (Writer, ReaderProxy)  |  core::reader (Reader, WriterProxy) |
//! +---------------------------------------------------------------------+
//! |  reliability::history (Cache, History)   |  congestion (FlowController) |
//! +---------------------------------------------------------------------+
//! |  core::discovery::matcher (EndpointMatcher)                          |
//! +---------------------------------------------------------------------+
//! |         transport / CDR / PDP (external collaborators)              |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`reliability`] - Cache, History, sequence numbers, submessage shapes
//! - [`core::reader`] - reader-side `WriterProxy` and matched-writer registry
//! - [`core::writer`] - writer-side `ReaderProxy` and matched-reader registry
//! - [`core::discovery::matcher`] - QoS/topic/partition compatibility
//! - [`congestion`] - `FlowController` scheduling disciplines and publishing modes
//! - [`qos`] - Quality of Service policies
//! - [`error`] - crate-wide error taxonomy

/// Congestion control: `FlowController` scheduling disciplines, publishing
/// modes, and bandwidth-cap enforcement (C6).
pub mod congestion;
/// Core RTPS endpoint state: reader-side `WriterProxy`, writer-side
/// `ReaderProxy`, and the discovery matcher (C3, C4, C5).
pub mod core;
/// Global configuration (RTPS constants, resource-limit defaults).
pub mod config;
/// Crate-wide error taxonomy and `Result` alias.
pub mod error;
/// Compile-time configurable logging helpers (thin wrapper over `log`).
pub mod logging;
/// RTPS submessage shapes and wire constants consumed/produced by the
/// reader/writer endpoints (DATA, DATA_FRAG, HEARTBEAT, ACKNACK, GAP, NACKFRAG).
pub mod protocol;
/// Cache/History (C1, C2) and the sequence-number/range utilities that back
/// `WriterProxy` bookkeeping.
pub mod reliability;
/// `QoS` (Quality of Service) policies for DDS entities.
pub mod qos;

pub use error::{Error, Result};
pub use qos::EndpointQos;
pub use reliability::cache::{Cache, ChangeKind};
pub use reliability::history::{History, RejectionReason};

/// Crate version string.
pub const VERSION: &str = "0.1.0";
