//! Per-model and per-topic aggregation of score rows

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::records::JoinedCorpus;
use crate::runner::ScoringOutcome;

/// Means closer than this are treated as equal
pub const TIE_TOLERANCE: f64 = 1e-9;

/// Leaderboard entry for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    /// Competition rank; tied models share a rank
    pub rank: usize,
    pub model: String,
    pub mean_f1: f64,
    pub mean_precision: f64,
    pub mean_recall: f64,
    /// Number of scored pairs behind the means
    pub pairs: usize,
}

/// Aggregated results across the corpus
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResults {
    pub total_rows: usize,
    pub skipped_rows: usize,
    /// Ordered by mean F1 descending, then model name
    pub leaderboard: Vec<ModelSummary>,
    /// topic -> model -> mean F1; empty unless grouping by topic
    pub scores_by_topic: BTreeMap<String, BTreeMap<String, f64>>,
}

impl AggregatedResults {
    pub fn mean_f1(&self, model: &str) -> Option<f64> {
        self.leaderboard
            .iter()
            .find(|s| s.model == model)
            .map(|s| s.mean_f1)
    }

    /// Models sharing the top rank
    pub fn leaders(&self) -> Vec<&str> {
        self.leaderboard
            .iter()
            .filter(|s| s.rank == 1)
            .map(|s| s.model.as_str())
            .collect()
    }
}

#[derive(Default)]
struct Accumulator {
    f1: f64,
    precision: f64,
    recall: f64,
    count: usize,
}

impl Accumulator {
    fn mean(total: f64, count: usize) -> f64 {
        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }
}

/// Aggregates score rows into a leaderboard
#[derive(Debug, Clone)]
pub struct Aggregator {
    by_topic: bool,
}

impl Aggregator {
    pub fn new() -> Self {
        Self { by_topic: false }
    }

    /// Also compute topic -> model -> mean F1
    pub fn with_topics(mut self, by_topic: bool) -> Self {
        self.by_topic = by_topic;
        self
    }

    /// Aggregate a finished scoring phase. Skipped pairs are counted but never
    /// enter a mean.
    pub fn aggregate(&self, outcome: &ScoringOutcome, corpus: &JoinedCorpus) -> AggregatedResults {
        let mut per_model: HashMap<&str, Accumulator> = HashMap::new();
        let mut per_topic: BTreeMap<String, BTreeMap<String, (f64, usize)>> = BTreeMap::new();

        for row in outcome.rows() {
            let acc = per_model.entry(row.model.as_str()).or_default();
            acc.f1 += row.f1;
            acc.precision += row.precision;
            acc.recall += row.recall;
            acc.count += 1;

            if self.by_topic {
                let Some(entry) = corpus.get(&row.query_id) else {
                    tracing::warn!(
                        "Score row for unknown record {} left out of topic means",
                        row.query_id
                    );
                    continue;
                };
                let slot = per_topic
                    .entry(entry.record.topic_or_default().to_string())
                    .or_default()
                    .entry(row.model.clone())
                    .or_insert((0.0, 0));
                slot.0 += row.f1;
                slot.1 += 1;
            }
        }

        let mut leaderboard: Vec<ModelSummary> = per_model
            .into_iter()
            .map(|(model, acc)| ModelSummary {
                rank: 0,
                model: model.to_string(),
                mean_f1: Accumulator::mean(acc.f1, acc.count),
                mean_precision: Accumulator::mean(acc.precision, acc.count),
                mean_recall: Accumulator::mean(acc.recall, acc.count),
                pairs: acc.count,
            })
            .collect();
        rank_models(&mut leaderboard);

        let scores_by_topic = per_topic
            .into_iter()
            .map(|(topic, models)| {
                let means = models
                    .into_iter()
                    .map(|(model, (sum, count))| (model, Accumulator::mean(sum, count)))
                    .collect();
                (topic, means)
            })
            .collect();

        AggregatedResults {
            total_rows: outcome.rows().len(),
            skipped_rows: outcome.skipped().len(),
            leaderboard,
            scores_by_topic,
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Sort by mean F1 descending and assign competition ranks (1, 1, 3).
///
/// Neighbouring means within [`TIE_TOLERANCE`] form one tie group, listed by
/// model name.
fn rank_models(leaderboard: &mut [ModelSummary]) {
    leaderboard.sort_by(|a, b| {
        b.mean_f1
            .total_cmp(&a.mean_f1)
            .then_with(|| a.model.cmp(&b.model))
    });

    let mut start = 0;
    while start < leaderboard.len() {
        let mut end = start + 1;
        while end < leaderboard.len()
            && (leaderboard[end - 1].mean_f1 - leaderboard[end].mean_f1).abs() <= TIE_TOLERANCE
        {
            end += 1;
        }

        let group = &mut leaderboard[start..end];
        group.sort_by(|a, b| a.model.cmp(&b.model));
        for summary in group.iter_mut() {
            summary.rank = start + 1;
        }
        start = end;
    }
}
