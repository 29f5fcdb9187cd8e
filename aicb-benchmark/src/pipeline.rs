//! One benchmark run: load, score, aggregate, report

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::analysis::{AggregatedResults, Aggregator};
use crate::config::{Config, ConfigError};
use crate::records::{self, CorpusStats, JoinedCorpus, RecordError};
use crate::reporting::{ReportWriteError, Reporter, RunSummary};
use crate::runner::{
    pairs_from_corpus, ExecutorConfig, NoOpProgress, ProgressCallback, ScoringExecutor,
    ScoringOutcome,
};
use crate::scoring::{IdfWeights, Scorer};

/// Fatal errors of a run
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Records(#[from] RecordError),

    #[error(transparent)]
    Report(#[from] ReportWriteError),
}

/// Everything a finished run produced
#[derive(Debug)]
pub struct PipelineReport {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub stats: CorpusStats,
    pub outcome: ScoringOutcome,
    pub aggregated: AggregatedResults,
    pub summary: RunSummary,
    pub written: Vec<PathBuf>,
}

/// Runs the benchmark described by a [`Config`]
pub struct Pipeline {
    config: Config,
    progress: Arc<dyn ProgressCallback>,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            progress: Arc::new(NoOpProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load, join and filter the corpus. Any malformed record aborts here,
    /// before scoring starts.
    pub fn load(&self) -> Result<JoinedCorpus, PipelineError> {
        let input = &self.config.input;
        tracing::info!("Loading corpus from {}", input.corpus);
        let corpus = records::load_corpus_from_file(&input.corpus)?;
        tracing::info!("Loading candidates from {}", input.candidates);
        let candidates = records::load_candidates_from_file(&input.candidates)?;

        let joined = records::join(corpus, candidates)?
            .filter_by_topic(&input.topics)
            .retain_models(&input.models);

        tracing::info!(
            "Loaded {} records with {} models",
            joined.len(),
            joined.models().len()
        );
        Ok(joined)
    }

    /// Scorer for this run; IDF weights come from the corpus references
    pub fn build_scorer(&self, corpus: &JoinedCorpus) -> Result<Scorer, PipelineError> {
        let scorer = Scorer::new(self.config.embedder()?);
        tracing::info!("Scoring with embedder {}", scorer.embedder_name());
        if self.config.scoring.idf {
            let idf = IdfWeights::from_references(corpus.reference_texts());
            tracing::debug!("IDF weights over {} references", idf.documents());
            Ok(scorer.with_idf(idf))
        } else {
            Ok(scorer)
        }
    }

    /// Score every (query, model) pair; returns after all workers finished
    pub async fn score(&self, corpus: &JoinedCorpus, scorer: Arc<Scorer>) -> ScoringOutcome {
        let executor = ScoringExecutor::new(
            scorer,
            ExecutorConfig::new(self.config.scoring.parallel_workers),
        )
        .with_progress(Arc::clone(&self.progress));

        executor.score_pairs(pairs_from_corpus(corpus)).await
    }

    pub fn aggregate(&self, outcome: &ScoringOutcome, corpus: &JoinedCorpus) -> AggregatedResults {
        Aggregator::new()
            .with_topics(self.config.output.by_topic)
            .aggregate(outcome, corpus)
    }

    pub fn report(
        &self,
        run_dir: &Path,
        outcome: &ScoringOutcome,
        aggregated: &AggregatedResults,
        summary: &RunSummary,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let written = Reporter::new(aggregated, outcome).write_all(
            run_dir,
            &self.config.output.formats,
            summary,
        )?;
        Ok(written)
    }

    /// Run every stage and write the reports into a fresh run directory
    pub async fn run(&self) -> Result<PipelineReport, PipelineError> {
        self.config.validate()?;
        let started_at = Utc::now();

        let corpus = self.load()?;
        let stats = corpus.stats();
        if stats.records_without_candidates > 0 {
            tracing::warn!(
                "{} records have no candidate answers",
                stats.records_without_candidates
            );
        }

        let scorer = Arc::new(self.build_scorer(&corpus)?);
        let outcome = self.score(&corpus, Arc::clone(&scorer)).await;
        let aggregated = self.aggregate(&outcome, &corpus);

        let output_dir = Path::new(&self.config.output.output_dir);
        let (run_id, run_dir) = allocate_run_dir(output_dir, started_at);
        let summary = RunSummary::from_run(&run_id, started_at, &stats, &outcome, &aggregated)
            .with_scorer(scorer.embedder_name(), scorer.uses_idf());

        let written = self.report(&run_dir, &outcome, &aggregated, &summary)?;

        tracing::info!(
            "Run {} complete: {} scored, {} skipped",
            run_id,
            outcome.rows().len(),
            outcome.skipped().len()
        );

        Ok(PipelineReport {
            run_id,
            run_dir,
            stats,
            outcome,
            aggregated,
            summary,
            written,
        })
    }
}

/// Timestamped run id whose directory does not exist yet
fn allocate_run_dir(output_dir: &Path, started_at: DateTime<Utc>) -> (String, PathBuf) {
    let base = started_at.format("%Y%m%d-%H%M%S").to_string();
    let mut run_id = base.clone();
    let mut suffix = 2;
    while output_dir.join(&run_id).exists() {
        run_id = format!("{}-{}", base, suffix);
        suffix += 1;
    }
    let run_dir = output_dir.join(&run_id);
    (run_id, run_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    /// Log sink for a scoped subscriber
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn write_inputs(dir: &Path, corpus: &str, candidates: &str) -> Config {
        std::fs::write(dir.join("corpus.jsonl"), corpus).unwrap();
        std::fs::write(dir.join("candidates.jsonl"), candidates).unwrap();

        let mut config = Config::default();
        config.input.corpus = dir.join("corpus.jsonl").to_string_lossy().into_owned();
        config.input.candidates = dir.join("candidates.jsonl").to_string_lossy().into_owned();
        config.output.output_dir = dir.join("runs").to_string_lossy().into_owned();
        config
    }

    #[test]
    fn test_allocate_run_dir_avoids_existing() {
        let dir = tempfile::tempdir().unwrap();
        let started = Utc::now();
        let (first, path) = allocate_run_dir(dir.path(), started);
        std::fs::create_dir_all(&path).unwrap();

        let (second, _) = allocate_run_dir(dir.path(), started);
        assert_ne!(first, second);
        assert_eq!(second, format!("{}-2", first));
    }

    #[tokio::test]
    async fn test_records_without_candidates_warned_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_inputs(
            dir.path(),
            "{\"id\": \"q1\", \"expert_response\": \"Breathe.\"}\n\
             {\"id\": \"q2\", \"expert_response\": \"Rest.\"}\n",
            r#"{"id": "q1", "candidates": {"gpt4": "Breathe."}}"#,
        );

        let logs = CapturedLogs::default();
        let sink = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let report = Pipeline::new(config).run().await.unwrap();
        assert_eq!(report.stats.records_without_candidates, 1);
        assert_eq!(report.outcome.skipped().len(), 0);
        assert_eq!(logs.contents().matches("no candidate answers").count(), 1);
    }

    #[cfg(not(feature = "fastembed"))]
    #[tokio::test]
    async fn test_unavailable_embedder_fails_before_scoring() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = write_inputs(
            dir.path(),
            r#"{"id": "q1", "expert_response": "Breathe."}"#,
            r#"{"id": "q1", "candidates": {"gpt4": "Breathe."}}"#,
        );
        config.scoring.embedder = crate::config::EmbedderKind::Fastembed;

        let err = Pipeline::new(config).run().await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::Invalid(_))));
        assert!(!dir.path().join("runs").exists());
    }

    #[tokio::test]
    async fn test_missing_corpus_fails_before_scoring() {
        let mut config = Config::default();
        config.input.corpus = "/nonexistent/corpus.jsonl".to_string();
        let err = Pipeline::new(config).run().await.unwrap_err();
        assert!(matches!(err, PipelineError::Records(RecordError::Io { .. })));
    }
}
