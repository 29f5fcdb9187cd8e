//! Benchmark execution engine

pub mod executor;

pub use executor::{
    pairs_from_corpus, ConsoleProgress, ExecutorConfig, NoOpProgress, ProgressCallback,
    ScoringExecutor, ScoringOutcome, ScoringPair,
};
