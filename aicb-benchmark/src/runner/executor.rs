//! Bounded parallel scoring of (query, model) pairs

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::records::JoinedCorpus;
use crate::scoring::{ScoreError, ScoreRow, Scorer, SkippedPair};

/// Configuration for the executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of pairs scored at the same time
    pub parallel_workers: usize,
}

impl ExecutorConfig {
    pub fn new(parallel_workers: usize) -> Self {
        Self { parallel_workers }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { parallel_workers: 4 }
    }
}

/// One unit of scoring work
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringPair {
    /// Position in corpus order, then candidate order
    pub index: usize,
    pub query_id: String,
    pub model: String,
    pub candidate: String,
    pub reference: String,
}

/// Expand a joined corpus into scoring pairs, in corpus order then candidate order.
/// Records without candidates contribute nothing.
pub fn pairs_from_corpus(corpus: &JoinedCorpus) -> Vec<ScoringPair> {
    let mut pairs = Vec::new();
    for entry in corpus.iter() {
        if !entry.has_candidates() {
            tracing::debug!("No candidates for {}, nothing to score", entry.record.id);
            continue;
        }
        for (model, answer) in &entry.candidates {
            pairs.push(ScoringPair {
                index: pairs.len(),
                query_id: entry.record.id.clone(),
                model: model.clone(),
                candidate: answer.clone(),
                reference: entry.record.expert_response.clone(),
            });
        }
    }
    pairs
}

/// Every score row and skipped pair of a finished scoring phase.
///
/// Only [`ScoringExecutor::score_pairs`] builds one, after all workers joined.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoringOutcome {
    rows: Vec<ScoreRow>,
    skipped: Vec<SkippedPair>,
}

impl ScoringOutcome {
    pub(crate) fn from_parts(rows: Vec<ScoreRow>, skipped: Vec<SkippedPair>) -> Self {
        Self { rows, skipped }
    }

    pub fn rows(&self) -> &[ScoreRow] {
        &self.rows
    }

    pub fn skipped(&self) -> &[SkippedPair] {
        &self.skipped
    }

    pub fn total_pairs(&self) -> usize {
        self.rows.len() + self.skipped.len()
    }
}

enum PairResult {
    Scored(ScoreRow),
    Skipped(SkippedPair),
}

/// Scores pairs on a fixed-size pool of blocking workers
pub struct ScoringExecutor {
    scorer: Arc<Scorer>,
    semaphore: Arc<Semaphore>,
    progress: Arc<dyn ProgressCallback>,
}

impl ScoringExecutor {
    /// Create a new executor
    pub fn new(scorer: Arc<Scorer>, config: ExecutorConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.parallel_workers.max(1)));
        Self {
            scorer,
            semaphore,
            progress: Arc::new(NoOpProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Score every pair and wait for all of them before returning.
    ///
    /// Blank texts and panicking workers become skipped pairs; the run goes on.
    pub async fn score_pairs(&self, pairs: Vec<ScoringPair>) -> ScoringOutcome {
        let total = pairs.len();
        let mut handles = Vec::with_capacity(total);
        let mut results: Vec<(usize, PairResult)> = Vec::with_capacity(total);

        for pair in pairs {
            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::error!(
                        "Worker pool unavailable for {} on {}: {}",
                        pair.query_id,
                        pair.model,
                        e
                    );
                    let reason = format!("worker pool unavailable: {}", e);
                    let skipped = SkippedPair::new(pair.query_id, pair.model, reason);
                    results.push((pair.index, PairResult::Skipped(skipped)));
                    continue;
                }
            };

            self.progress.on_pair_start(&pair.query_id, &pair.model);

            let scorer = Arc::clone(&self.scorer);
            let ScoringPair {
                index,
                query_id,
                model,
                candidate,
                reference,
            } = pair;
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                scorer.score(&candidate, &reference)
            });
            handles.push((index, query_id, model, handle));
        }

        // Barrier: nothing leaves this function until every worker is done
        for (completed, (index, query_id, model, handle)) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(Ok(score)) => {
                    tracing::debug!("Scored {} on {}: f1={:.4}", query_id, model, score.f1);
                    PairResult::Scored(ScoreRow::new(query_id, model, score))
                }
                Ok(Err(e)) => skip_empty(query_id, model, e),
                Err(e) => {
                    tracing::error!(
                        "Scoring worker for {} on {} panicked: {}",
                        query_id,
                        model,
                        e
                    );
                    let reason = format!("worker failed: {}", e);
                    PairResult::Skipped(SkippedPair::new(query_id, model, reason))
                }
            };

            let (query_id, model, scored) = match &result {
                PairResult::Scored(row) => (&row.query_id, &row.model, true),
                PairResult::Skipped(pair) => (&pair.query_id, &pair.model, false),
            };
            self.progress.on_pair_complete(query_id, model, scored);
            self.progress.on_progress(completed + 1, total);

            results.push((index, result));
        }

        results.sort_by_key(|(index, _)| *index);

        let mut rows = Vec::new();
        let mut skipped = Vec::new();
        for (_, result) in results {
            match result {
                PairResult::Scored(row) => rows.push(row),
                PairResult::Skipped(pair) => skipped.push(pair),
            }
        }

        tracing::info!("Scored {} of {} pairs ({} skipped)", rows.len(), total, skipped.len());
        ScoringOutcome::from_parts(rows, skipped)
    }
}

fn skip_empty(query_id: String, model: String, error: ScoreError) -> PairResult {
    tracing::warn!("Skipping {} on {}: {}", query_id, model, error);
    PairResult::Skipped(SkippedPair::new(query_id, model, error.to_string()))
}

/// Progress callback for tracking execution
pub trait ProgressCallback: Send + Sync {
    fn on_pair_start(&self, query_id: &str, model: &str);
    fn on_pair_complete(&self, query_id: &str, model: &str, scored: bool);
    fn on_progress(&self, completed: usize, total: usize);
}

/// Default no-op progress callback
pub struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_pair_start(&self, _query_id: &str, _model: &str) {}
    fn on_pair_complete(&self, _query_id: &str, _model: &str, _scored: bool) {}
    fn on_progress(&self, _completed: usize, _total: usize) {}
}

/// Console progress callback
pub struct ConsoleProgress;

impl ProgressCallback for ConsoleProgress {
    fn on_pair_start(&self, _query_id: &str, _model: &str) {}

    fn on_pair_complete(&self, query_id: &str, model: &str, scored: bool) {
        if !scored {
            println!("  SKIPPED {} on {}", query_id, model);
        }
    }

    fn on_progress(&self, completed: usize, total: usize) {
        if completed == total || completed % 50 == 0 {
            println!("Progress: {}/{} pairs scored", completed, total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{join, CandidateSet, QueryRecord};
    use crate::scoring::TokenEmbedder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn corpus() -> JoinedCorpus {
        join(
            vec![
                QueryRecord::new("q1", "Try relaxation techniques."),
                QueryRecord::new("q2", "Talk to someone you trust."),
                QueryRecord::new("q3", "Keep a regular sleep schedule."),
            ],
            vec![
                CandidateSet::new("q1")
                    .with_candidate("gpt4", "Try relaxation techniques.")
                    .with_candidate("claude", ""),
                CandidateSet::new("q2").with_candidate("gpt4", "Talk to a friend."),
            ],
        )
        .unwrap()
    }

    /// Records how many embed calls overlap
    struct SlowEmbedder {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl TokenEmbedder for SlowEmbedder {
        fn name(&self) -> &str {
            "slow"
        }
        fn dimension(&self) -> usize {
            1
        }
        fn embed(&self, tokens: &[String]) -> Vec<Vec<f32>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            tokens.iter().map(|_| vec![1.0]).collect()
        }
    }

    struct PanickingEmbedder;

    impl TokenEmbedder for PanickingEmbedder {
        fn name(&self) -> &str {
            "panics"
        }
        fn dimension(&self) -> usize {
            1
        }
        fn embed(&self, _tokens: &[String]) -> Vec<Vec<f32>> {
            panic!("embedding backend crashed");
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        completed: Mutex<Vec<(String, bool)>>,
        last: AtomicUsize,
    }

    impl ProgressCallback for RecordingProgress {
        fn on_pair_start(&self, _query_id: &str, _model: &str) {}
        fn on_pair_complete(&self, query_id: &str, model: &str, scored: bool) {
            self.completed.lock().unwrap().push((format!("{}/{}", query_id, model), scored));
        }
        fn on_progress(&self, completed: usize, _total: usize) {
            self.last.store(completed, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_pairs_from_corpus_order() {
        let pairs = pairs_from_corpus(&corpus());
        let labels: Vec<_> = pairs.iter().map(|p| format!("{}/{}", p.query_id, p.model)).collect();
        assert_eq!(labels, vec!["q1/gpt4", "q1/claude", "q2/gpt4"]);
        assert_eq!(pairs.iter().map(|p| p.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(pairs[2].reference, "Talk to someone you trust.");
    }

    #[tokio::test]
    async fn test_score_pairs_skips_empty_candidates() {
        let executor = ScoringExecutor::new(Arc::new(Scorer::default()), ExecutorConfig::new(2));
        let outcome = executor.score_pairs(pairs_from_corpus(&corpus())).await;

        assert_eq!(outcome.total_pairs(), 3);
        assert_eq!(outcome.rows().len(), 2);
        assert_eq!(outcome.rows()[0].query_id, "q1");
        assert!((outcome.rows()[0].f1 - 1.0).abs() < 1e-6);
        assert_eq!(outcome.rows()[1].query_id, "q2");

        assert_eq!(outcome.skipped().len(), 1);
        assert_eq!(outcome.skipped()[0].model, "claude");
        assert!(outcome.skipped()[0].reason.contains("candidate"));
    }

    #[tokio::test]
    async fn test_worker_pool_is_bounded() {
        let embedder = Arc::new(SlowEmbedder {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let scorer = Arc::new(Scorer::new(embedder.clone()));
        let executor = ScoringExecutor::new(scorer, ExecutorConfig::new(2));

        let pairs: Vec<ScoringPair> = (0..12)
            .map(|i| ScoringPair {
                index: i,
                query_id: format!("q{}", i),
                model: "m".to_string(),
                candidate: "alpha beta".to_string(),
                reference: "alpha gamma".to_string(),
            })
            .collect();

        let outcome = executor.score_pairs(pairs).await;
        assert_eq!(outcome.rows().len(), 12);
        assert!(embedder.peak.load(Ordering::SeqCst) <= 2);
        let ids: Vec<_> = outcome.rows().iter().map(|r| r.query_id.clone()).collect();
        assert_eq!(ids, (0..12).map(|i| format!("q{}", i)).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_panicking_worker_becomes_skipped_pair() {
        let progress = Arc::new(RecordingProgress::default());
        let scorer = Arc::new(Scorer::new(Arc::new(PanickingEmbedder)));
        let executor =
            ScoringExecutor::new(scorer, ExecutorConfig::new(1)).with_progress(progress.clone());

        let outcome = executor.score_pairs(pairs_from_corpus(&corpus())).await;
        assert!(outcome.rows().is_empty());
        assert_eq!(outcome.skipped().len(), 3);
        assert!(outcome.skipped()[0].reason.contains("worker failed"));
        // Blank candidate is rejected before the embedder runs
        assert!(outcome.skipped()[1].reason.contains("candidate text is empty"));

        assert_eq!(progress.last.load(Ordering::SeqCst), 3);
        assert!(progress.completed.lock().unwrap().iter().all(|(_, scored)| !scored));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let executor = ScoringExecutor::new(Arc::new(Scorer::default()), ExecutorConfig::default());
        let outcome = executor.score_pairs(Vec::new()).await;
        assert_eq!(outcome.total_pairs(), 0);
    }
}
