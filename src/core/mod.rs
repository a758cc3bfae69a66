//! Catalog processing components

pub mod catalog;
pub mod naming;
pub mod stats;
pub mod spatial_index;
pub mod selector;
pub mod crossmatch;
pub mod offsets;
pub mod combine;
pub mod number_counts;

// Re-export main types
pub use catalog::{Catalog, CatalogKind};
pub use naming::iau_name;
pub use stats::SummaryStats;
pub use spatial_index::{BruteForceIndex, SkyGridIndex, SpatialIndex};
pub use selector::{Comparison, SelectionRule, SelectionSummary, Selector, SelectorConfig, Verbosity};
pub use crossmatch::{CrossMatcher, IndexKind, MatchConfig, MatchRadius, MatchResult, MatchedPair};
pub use offsets::{OffsetConfig, OffsetStatistics, PairOffset};
pub use combine::{CatalogCombiner, CombineConfig, CombinedCatalog};
pub use number_counts::{
    AreaSource, CompletenessBin, CompletenessTable, FluxBin, NumberCountAnalyzer, NumberCountConfig,
    NumberCounts, RmsMap,
};
