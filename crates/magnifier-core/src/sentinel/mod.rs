//! Sentinel search, ordering and selection.

pub mod order;
pub mod search;

use crate::ip::Prefix;

/// One accepted sentinel: a prefix whose observed ingress diversity was at
/// or below the search's tolerance, paired with the (unique) ingress it is
/// attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sentinel {
    pub prefix: Prefix,
    pub ingress: u16,
}

/// A set of sentinels. Pairwise-disjoint by construction: the search never
/// emits two sentinels one of which contains the other.
pub type SentinelSet = Vec<Sentinel>;

pub use order::{order_and_truncate, EnhancedSentinel, Ordering};
pub use search::search_sentinels;
#[cfg(feature = "parallel-search")]
pub use search::search_sentinels_parallel;
