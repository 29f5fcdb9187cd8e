//! Similarity Benchmark for Mental-Health Answers
//!
//! This crate scores answers written by language models against the answers
//! of human experts with a BERTScore-style precision / recall / F1 measure,
//! and ranks the models by their mean F1.
//!
//! # Features
//!
//! - JSON and JSON Lines corpus and candidate loading with strict validation
//! - Greedy token matching over hashed character n-gram embeddings
//! - Optional IDF weighting over the run's expert answers
//! - Bounded parallel scoring; blank answers are skipped, never fatal
//! - Leaderboard, score table and topic breakdown in CSV, JSON and Markdown
//!
//! # Example
//!
//! ```no_run
//! use aicb_benchmark::{config::Config, pipeline::Pipeline};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut config = Config::default();
//!     config.input.corpus = "data/corpus.jsonl".to_string();
//!     config.input.candidates = "data/candidates.jsonl".to_string();
//!
//!     let report = Pipeline::new(config).run().await.unwrap();
//!     for entry in &report.aggregated.leaderboard {
//!         println!("{}. {} {:.3}", entry.rank, entry.model, entry.mean_f1);
//!     }
//!     println!("skipped: {}", report.aggregated.skipped_rows);
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod pipeline;
pub mod records;
pub mod reporting;
pub mod runner;
pub mod scoring;

pub use config::{Config, EmbedderKind, OutputFormat};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::analysis::{AggregatedResults, Aggregator, ModelSummary};
    pub use crate::config::{Config, ConfigError, EmbedderKind, OutputFormat};
    pub use crate::pipeline::{Pipeline, PipelineError, PipelineReport};
    pub use crate::records::{
        join, load_candidates_from_file, load_corpus_from_file, CandidateSet, CorpusStats,
        JoinedCorpus, QueryRecord, RecordError,
    };
    pub use crate::reporting::{print_console_report, ReportWriteError, Reporter, RunSummary};
    pub use crate::runner::{
        ConsoleProgress, ExecutorConfig, NoOpProgress, ProgressCallback, ScoringExecutor,
        ScoringOutcome,
    };
    pub use crate::scoring::{
        HashedNgramEmbedder, IdfWeights, ScoreError, ScoreRow, ScoreTriple, Scorer, SkippedPair,
        TokenEmbedder,
    };
}
