//! Greedy-matching similarity scorer (BERTScore style)

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::embedder::{cosine_similarity, HashedNgramEmbedder, TokenEmbedder};
use super::tokenizer::tokenize;

/// Precision, recall and F1 of one candidate against one reference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreTriple {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl ScoreTriple {
    /// Clamp precision and recall into [0, 1] and derive F1 from them
    pub fn from_precision_recall(precision: f64, recall: f64) -> Self {
        let precision = precision.clamp(0.0, 1.0);
        let recall = recall.clamp(0.0, 1.0);
        Self {
            precision,
            recall,
            f1: harmonic_f1(precision, recall),
        }
    }
}

/// `2PR / (P + R)`, defined as 0 when `P + R == 0`
pub fn harmonic_f1(precision: f64, recall: f64) -> f64 {
    let sum = precision + recall;
    if sum <= 0.0 {
        0.0
    } else {
        (2.0 * precision * recall / sum).clamp(0.0, 1.0)
    }
}

/// Which input of a pair was at fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSide {
    Candidate,
    Reference,
}

impl fmt::Display for TextSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextSide::Candidate => write!(f, "candidate"),
            TextSide::Reference => write!(f, "reference"),
        }
    }
}

/// Scoring errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoreError {
    #[error("{side} text is empty")]
    EmptyInput { side: TextSide },
}

/// Inverse document frequency over a set of reference texts.
///
/// `idf(w) = ln((M + 1) / (df(w) + 1))` for `M` documents; words never seen
/// get `ln(M + 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct IdfWeights {
    weights: HashMap<String, f64>,
    unseen_weight: f64,
    documents: usize,
}

impl IdfWeights {
    pub fn from_references<'a, I>(references: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        let mut documents = 0usize;

        for text in references {
            documents += 1;
            let unique: HashSet<String> = tokenize(text).into_iter().collect();
            for token in unique {
                *document_frequency.entry(token).or_insert(0) += 1;
            }
        }

        let m = documents as f64;
        let weights = document_frequency
            .into_iter()
            .map(|(token, df)| (token, ((m + 1.0) / (df as f64 + 1.0)).ln()))
            .collect();

        Self {
            weights,
            unseen_weight: (m + 1.0).ln(),
            documents,
        }
    }

    pub fn weight(&self, token: &str) -> f64 {
        self.weights.get(token).copied().unwrap_or(self.unseen_weight)
    }

    pub fn documents(&self) -> usize {
        self.documents
    }
}

/// Semantic similarity scorer.
///
/// Every candidate token is matched to its most similar reference token
/// (precision) and every reference token to its most similar candidate token
/// (recall). Identical tokens always match with similarity 1. Per-token
/// maxima are clamped to [0, 1] and averaged, uniformly or with IDF weights.
///
/// Holds no per-call state, so one instance is shared by all workers.
pub struct Scorer {
    embedder: Arc<dyn TokenEmbedder>,
    idf: Option<IdfWeights>,
}

impl Scorer {
    pub fn new(embedder: Arc<dyn TokenEmbedder>) -> Self {
        Self { embedder, idf: None }
    }

    /// Weight tokens by inverse document frequency
    pub fn with_idf(mut self, idf: IdfWeights) -> Self {
        self.idf = Some(idf);
        self
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    pub fn uses_idf(&self) -> bool {
        self.idf.is_some()
    }

    /// Score `candidate` against `reference`
    pub fn score(&self, candidate: &str, reference: &str) -> Result<ScoreTriple, ScoreError> {
        if candidate.trim().is_empty() {
            return Err(ScoreError::EmptyInput { side: TextSide::Candidate });
        }
        if reference.trim().is_empty() {
            return Err(ScoreError::EmptyInput { side: TextSide::Reference });
        }

        let candidate_tokens = tokenize(candidate);
        let reference_tokens = tokenize(reference);
        let candidate_vectors = self.embedder.embed(&candidate_tokens);
        let reference_vectors = self.embedder.embed(&reference_tokens);

        let similarity: Vec<Vec<f64>> = candidate_tokens
            .iter()
            .enumerate()
            .map(|(i, c_tok)| {
                reference_tokens
                    .iter()
                    .enumerate()
                    .map(|(j, r_tok)| {
                        if c_tok == r_tok {
                            return 1.0;
                        }
                        match (candidate_vectors.get(i), reference_vectors.get(j)) {
                            (Some(a), Some(b)) => cosine_similarity(a, b),
                            _ => 0.0,
                        }
                    })
                    .collect()
            })
            .collect();

        let candidate_best: Vec<f64> = similarity
            .iter()
            .map(|row| best_match(row.iter().copied()))
            .collect();
        let reference_best: Vec<f64> = (0..reference_tokens.len())
            .map(|j| best_match(similarity.iter().map(|row| row[j])))
            .collect();

        let precision = self.weighted_mean(&candidate_tokens, &candidate_best);
        let recall = self.weighted_mean(&reference_tokens, &reference_best);

        Ok(ScoreTriple::from_precision_recall(precision, recall))
    }

    fn weighted_mean(&self, tokens: &[String], values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }

        if let Some(idf) = &self.idf {
            let weights: Vec<f64> = tokens.iter().map(|t| idf.weight(t)).collect();
            let total: f64 = weights.iter().sum();
            // Every token occurs in every reference: fall back to uniform weights
            if total > 1e-12 {
                let weighted: f64 = weights.iter().zip(values).map(|(w, v)| w * v).sum();
                return weighted / total;
            }
        }

        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(Arc::new(HashedNgramEmbedder::default()))
    }
}

impl fmt::Debug for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scorer")
            .field("embedder", &self.embedder.name())
            .field("idf", &self.idf.as_ref().map(|w| w.documents()))
            .finish()
    }
}

fn best_match(similarities: impl Iterator<Item = f64>) -> f64 {
    similarities.fold(0.0f64, f64::max).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-6, "expected {expected}, got {actual}");
    }

    #[test]
    fn test_identical_texts_score_one() {
        let scorer = Scorer::default();
        let s = scorer.score("Try relaxation techniques.", "Try relaxation techniques.").unwrap();
        assert_close(s.precision, 1.0);
        assert_close(s.recall, 1.0);
        assert_close(s.f1, 1.0);
    }

    #[test]
    fn test_case_and_punctuation_ignored() {
        let s = Scorer::default()
            .score("try RELAXATION techniques", "Try relaxation techniques!")
            .unwrap();
        assert_close(s.f1, 1.0);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let scorer = Scorer::default();
        assert_eq!(
            scorer.score("  \n", "reference"),
            Err(ScoreError::EmptyInput { side: TextSide::Candidate })
        );
        assert_eq!(
            scorer.score("candidate", ""),
            Err(ScoreError::EmptyInput { side: TextSide::Reference })
        );
    }

    #[test]
    fn test_subset_candidate_has_full_precision() {
        let s = Scorer::default()
            .score("relaxation techniques", "Try relaxation techniques every evening.")
            .unwrap();
        assert_close(s.precision, 1.0);
        assert!(s.recall < 1.0);
        assert_close(s.f1, harmonic_f1(s.precision, s.recall));
    }

    #[test]
    fn test_swapping_inputs_swaps_precision_and_recall() {
        let scorer = Scorer::default();
        let a = scorer.score("Call a friend tonight.", "Reach out to someone you trust.").unwrap();
        let b = scorer.score("Reach out to someone you trust.", "Call a friend tonight.").unwrap();
        assert_close(a.precision, b.recall);
        assert_close(a.recall, b.precision);
        assert_close(a.f1, b.f1);
    }

    #[test]
    fn test_paraphrase_beats_unrelated() {
        let scorer = Scorer::default();
        let reference = "Try breathing exercises and relaxation techniques to calm down.";
        let paraphrase = scorer
            .score("Relaxation and breathing exercises can help you calm down.", reference)
            .unwrap();
        let unrelated = scorer
            .score("The quarterly revenue report is due on Friday.", reference)
            .unwrap();
        assert!(paraphrase.f1 > unrelated.f1, "{} <= {}", paraphrase.f1, unrelated.f1);
    }

    #[test]
    fn test_f1_law() {
        assert_eq!(harmonic_f1(0.0, 0.0), 0.0);
        assert_close(harmonic_f1(1.0, 1.0), 1.0);
        assert_close(harmonic_f1(0.5, 1.0), 2.0 / 3.0);
        let t = ScoreTriple::from_precision_recall(1.2, -0.1);
        assert_eq!(t.precision, 1.0);
        assert_eq!(t.recall, 0.0);
        assert_eq!(t.f1, 0.0);
    }

    #[test]
    fn test_idf_weights() {
        let idf = IdfWeights::from_references(["you are not alone", "you can call us", "breathe"]);
        assert_eq!(idf.documents(), 3);
        assert_close(idf.weight("you"), (4.0f64 / 3.0).ln());
        assert_close(idf.weight("alone"), 2.0f64.ln());
        assert_close(idf.weight("never-seen"), 4.0f64.ln());
    }

    #[test]
    fn test_idf_downweights_common_words() {
        let references = ["you should rest", "you should eat", "you should sleep well"];
        let plain = Scorer::default();
        let weighted = Scorer::default().with_idf(IdfWeights::from_references(references));

        // Only the common words match; IDF should lower the score
        let p = plain.score("you should walk", "you should rest").unwrap();
        let w = weighted.score("you should walk", "you should rest").unwrap();
        assert!(w.f1 < p.f1, "{} >= {}", w.f1, p.f1);
    }

    #[test]
    fn test_idf_zero_weights_fall_back_to_uniform() {
        let weighted = Scorer::default().with_idf(IdfWeights::from_references(["rest now"]));
        let s = weighted.score("rest now", "rest now").unwrap();
        assert_close(s.f1, 1.0);
    }
}
