//! Aggregation of score rows into leaderboards

pub mod aggregator;

pub use aggregator::{AggregatedResults, Aggregator, ModelSummary, TIE_TOLERANCE};
