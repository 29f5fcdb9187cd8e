//! JSON run summary

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tables::round_score;
use crate::analysis::{AggregatedResults, ModelSummary};
use crate::records::CorpusStats;
use crate::runner::ScoringOutcome;
use crate::scoring::SkippedPair;

/// Everything needed to audit one run, including what was left out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub embedder: String,
    pub idf: bool,
    pub total_records: usize,
    pub records_without_candidates: usize,
    pub total_pairs: usize,
    pub scored_pairs: usize,
    pub skipped_pairs: usize,
    pub skipped: Vec<SkippedPair>,
    pub leaderboard: Vec<ModelSummary>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scores_by_topic: BTreeMap<String, BTreeMap<String, f64>>,
}

impl RunSummary {
    /// Create from aggregated results
    pub fn from_run(
        run_id: impl Into<String>,
        started_at: DateTime<Utc>,
        stats: &CorpusStats,
        outcome: &ScoringOutcome,
        aggregated: &AggregatedResults,
    ) -> Self {
        let leaderboard = aggregated
            .leaderboard
            .iter()
            .map(|s| ModelSummary {
                mean_f1: round_score(s.mean_f1),
                mean_precision: round_score(s.mean_precision),
                mean_recall: round_score(s.mean_recall),
                ..s.clone()
            })
            .collect();

        let scores_by_topic = aggregated
            .scores_by_topic
            .iter()
            .map(|(topic, models)| {
                let rounded = models
                    .iter()
                    .map(|(model, &f1)| (model.clone(), round_score(f1)))
                    .collect();
                (topic.clone(), rounded)
            })
            .collect();

        Self {
            run_id: run_id.into(),
            started_at,
            completed_at: Utc::now(),
            embedder: String::new(),
            idf: false,
            total_records: stats.total_records,
            records_without_candidates: stats.records_without_candidates,
            total_pairs: outcome.total_pairs(),
            scored_pairs: outcome.rows().len(),
            skipped_pairs: outcome.skipped().len(),
            skipped: outcome.skipped().to_vec(),
            leaderboard,
            scores_by_topic,
        }
    }

    /// Record which scorer produced the run
    pub fn with_scorer(mut self, embedder: impl Into<String>, idf: bool) -> Self {
        self.embedder = embedder.into();
        self.idf = idf;
        self
    }

    /// Write to JSON file
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}
