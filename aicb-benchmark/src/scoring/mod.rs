//! Semantic similarity scoring of candidate answers against expert answers

pub mod bertscore;
pub mod embedder;
pub mod tokenizer;

pub use bertscore::{harmonic_f1, IdfWeights, ScoreError, ScoreTriple, Scorer, TextSide};
pub use embedder::{cosine_similarity, HashedNgramEmbedder, TokenEmbedder};
#[cfg(feature = "fastembed")]
pub use embedder::FastEmbedder;
pub use tokenizer::tokenize;

use serde::{Deserialize, Serialize};

/// Score of one model's answer to one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub query_id: String,
    pub model: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl ScoreRow {
    pub fn new(query_id: impl Into<String>, model: impl Into<String>, score: ScoreTriple) -> Self {
        Self {
            query_id: query_id.into(),
            model: model.into(),
            precision: score.precision,
            recall: score.recall,
            f1: score.f1,
        }
    }
}

/// A (query, model) pair that produced no score row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPair {
    pub query_id: String,
    pub model: String,
    pub reason: String,
}

impl SkippedPair {
    pub fn new(
        query_id: impl Into<String>,
        model: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            query_id: query_id.into(),
            model: model.into(),
            reason: reason.into(),
        }
    }
}
