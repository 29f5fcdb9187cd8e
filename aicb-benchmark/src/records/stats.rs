//! Corpus statistics

use serde::{Deserialize, Serialize};

use super::JoinedCorpus;

/// Summary counts over a joined corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub total_records: usize,
    pub records_with_candidates: usize,
    pub records_without_candidates: usize,
    pub total_candidates: usize,
    /// Rounded to two decimals
    pub avg_candidates_per_record: f64,
    pub unique_topics: usize,
    pub topics: Vec<String>,
    pub models: Vec<String>,
}

impl CorpusStats {
    pub fn from_corpus(corpus: &JoinedCorpus) -> Self {
        let total_records = corpus.len();
        let records_with_candidates = corpus.iter().filter(|e| e.has_candidates()).count();
        let total_candidates: usize = corpus.iter().map(|e| e.candidates.len()).sum();
        let topics = corpus.topics();

        let avg_candidates_per_record = if total_records == 0 {
            0.0
        } else {
            round2(total_candidates as f64 / total_records as f64)
        };

        Self {
            total_records,
            records_with_candidates,
            records_without_candidates: total_records - records_with_candidates,
            total_candidates,
            avg_candidates_per_record,
            unique_topics: topics.len(),
            topics,
            models: corpus.models(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{join, CandidateSet, QueryRecord};

    #[test]
    fn test_stats_counts() {
        let corpus = join(
            vec![
                QueryRecord::new("q1", "a").with_topic("sleep"),
                QueryRecord::new("q2", "b").with_topic("sleep"),
                QueryRecord::new("q3", "c").with_topic("grief"),
            ],
            vec![
                CandidateSet::new("q1").with_candidate("gpt4", "x").with_candidate("claude", "y"),
                CandidateSet::new("q2").with_candidate("gpt4", "z"),
            ],
        )
        .unwrap();

        let stats = corpus.stats();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.records_with_candidates, 2);
        assert_eq!(stats.records_without_candidates, 1);
        assert_eq!(stats.total_candidates, 3);
        assert_eq!(stats.avg_candidates_per_record, 1.0);
        assert_eq!(stats.unique_topics, 2);
        assert_eq!(stats.topics, vec!["grief", "sleep"]);
        assert_eq!(stats.models, vec!["claude", "gpt4"]);
    }

    #[test]
    fn test_empty_corpus() {
        let stats = JoinedCorpus::default().stats();
        assert_eq!(stats.total_records, 0);
        assert_eq!(stats.avg_candidates_per_record, 0.0);
    }
}
