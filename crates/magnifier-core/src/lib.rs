//! Core data model and algorithms for the Magnifier ingress-inference scheme.
//!
//! This crate is deliberately free of CLI, file-system and logging-sink
//! dependencies: it consumes iterators/slices of already-parsed records and
//! returns plain data. The `magnifier-sim` crate wraps it with CSV I/O, a
//! CLI and the iteration driver.

#![deny(unused_import_braces, unused_qualifications)]

pub mod ground_truth;
pub mod ip;
pub mod mapper;
pub mod mirror;
pub mod sampler;
pub mod sentinel;
pub mod store;

pub use ground_truth::{GroundTruth, GroundTruthEntry};
pub use ip::{Ipv4ParseError, Prefix};
pub use mapper::IngressMapper;
pub use mirror::RuleTree;
pub use sentinel::{Sentinel, SentinelSet};
pub use store::{ObservationWindow, PacketRecord};

/// Maximum number of distinct ingress routers supported.
///
/// The original implementation never exceeds 1024 border routers (see the
/// `-b` CLI bound); the sentinel search's ingress bitset is sized for this.
pub const MAX_BORDER_ROUTERS: usize = 1024;
