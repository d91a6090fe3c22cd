//! Evidence aggregation: canonical identity, dedup, scoring and tiering.
//!
//! The aggregator is pure. Each writer invocation builds a fresh
//! [`AggregatedResultSet`] from the run's accumulated hits.

mod canonical;
pub mod dedup;
pub mod scoring;
mod tiers;

pub use canonical::{canonicalize_url, domain_of, source_id};
pub use tiers::{AggregatedResultSet, Citation, EvidenceBlock, ResultAggregator};
