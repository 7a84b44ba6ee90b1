//! Column-statistics-driven blob pruning (§4.8), the monotonic integer key
//! encoding it's built on (§4.9), and the process-wide LRU-K(2) statistics
//! cache that backs it (§5, §6.5).

pub mod cache;
pub mod key;
pub mod pruning;

pub use cache::StatisticsCache;
pub use key::{to_int, NULL_FLAG};
pub use pruning::{evaluate_predicate, prune_blobs, PruneReport};
