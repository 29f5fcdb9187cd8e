//! Results reporting

pub mod summary;
pub mod tables;

pub use summary::RunSummary;
pub use tables::{round_score, Cell, Table, SCORE_DECIMALS};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexSet;

use crate::analysis::AggregatedResults;
use crate::config::OutputFormat;
use crate::runner::ScoringOutcome;

pub const LEADERBOARD_STEM: &str = "leaderboard";
pub const SCORES_STEM: &str = "scores";
pub const TOPICS_FILE: &str = "topics.csv";
pub const SUMMARY_FILE: &str = "summary.json";

/// A report artifact could not be written. Files in `written` were completed
/// before the failure and are left in place.
#[derive(Debug, thiserror::Error)]
#[error(
    "failed to write {}: {source} ({} file(s) already written)",
    .path.display(),
    .written.len()
)]
pub struct ReportWriteError {
    pub path: PathBuf,
    pub written: Vec<PathBuf>,
    #[source]
    pub source: std::io::Error,
}

/// Serializes aggregated results and score rows
pub struct Reporter<'a> {
    aggregated: &'a AggregatedResults,
    outcome: &'a ScoringOutcome,
}

impl<'a> Reporter<'a> {
    pub fn new(aggregated: &'a AggregatedResults, outcome: &'a ScoringOutcome) -> Self {
        Self { aggregated, outcome }
    }

    /// `rank, model, mean_f1, mean_precision, mean_recall, pairs` in leaderboard order
    pub fn leaderboard_table(&self) -> Table {
        let mut table = Table::new(vec![
            "rank",
            "model",
            "mean_f1",
            "mean_precision",
            "mean_recall",
            "pairs",
        ]);
        for s in &self.aggregated.leaderboard {
            table.push(vec![
                Cell::Count(s.rank),
                Cell::Text(s.model.clone()),
                Cell::Score(s.mean_f1),
                Cell::Score(s.mean_precision),
                Cell::Score(s.mean_recall),
                Cell::Count(s.pairs),
            ]);
        }
        table
    }

    /// `id, model, bertscore_f1, precision, recall`, one row per scored pair
    pub fn scores_table(&self) -> Table {
        let mut table = Table::new(vec!["id", "model", "bertscore_f1", "precision", "recall"]);
        for row in self.outcome.rows() {
            table.push(vec![
                Cell::Text(row.query_id.clone()),
                Cell::Text(row.model.clone()),
                Cell::Score(row.f1),
                Cell::Score(row.precision),
                Cell::Score(row.recall),
            ]);
        }
        table
    }

    /// `topic, model, mean_f1`; topics and models in name order
    pub fn topic_table(&self) -> Table {
        let mut table = Table::new(vec!["topic", "model", "mean_f1"]);
        for (topic, models) in &self.aggregated.scores_by_topic {
            for (model, mean) in models {
                table.push(vec![
                    Cell::Text(topic.clone()),
                    Cell::Text(model.clone()),
                    Cell::Score(*mean),
                ]);
            }
        }
        table
    }

    pub fn write_leaderboard(
        &self,
        path: impl AsRef<Path>,
        format: OutputFormat,
    ) -> std::io::Result<()> {
        write_table(path.as_ref(), &self.leaderboard_table(), format)
    }

    pub fn write_scores(
        &self,
        path: impl AsRef<Path>,
        format: OutputFormat,
    ) -> std::io::Result<()> {
        write_table(path.as_ref(), &self.scores_table(), format)
    }

    pub fn write_topic_breakdown(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        write_table(path.as_ref(), &self.topic_table(), OutputFormat::Csv)
    }

    /// Write leaderboard and score tables in every format, the topic
    /// breakdown when present, and `summary.json`. Stops at the first failure.
    pub fn write_all(
        &self,
        dir: impl AsRef<Path>,
        formats: &[OutputFormat],
        summary: &RunSummary,
    ) -> Result<Vec<PathBuf>, ReportWriteError> {
        let dir = dir.as_ref();
        let mut written = Vec::new();

        std::fs::create_dir_all(dir).map_err(|source| ReportWriteError {
            path: dir.to_path_buf(),
            written: Vec::new(),
            source,
        })?;

        // Each format once, in first-mention order
        let formats: IndexSet<OutputFormat> = formats.iter().copied().collect();

        for format in formats {
            let path = dir.join(format!("{}.{}", LEADERBOARD_STEM, format.extension()));
            record(self.write_leaderboard(&path, format), path, &mut written)?;

            let path = dir.join(format!("{}.{}", SCORES_STEM, format.extension()));
            record(self.write_scores(&path, format), path, &mut written)?;
        }

        if !self.aggregated.scores_by_topic.is_empty() {
            let path = dir.join(TOPICS_FILE);
            record(self.write_topic_breakdown(&path), path, &mut written)?;
        }

        let path = dir.join(SUMMARY_FILE);
        record(summary.write_to_file(&path), path, &mut written)?;

        tracing::info!("Wrote {} report files to {}", written.len(), dir.display());
        Ok(written)
    }
}

fn write_table(path: &Path, table: &Table, format: OutputFormat) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    table.write(&mut out, format)?;
    out.flush()
}

fn record(
    result: std::io::Result<()>,
    path: PathBuf,
    written: &mut Vec<PathBuf>,
) -> Result<(), ReportWriteError> {
    match result {
        Ok(()) => {
            tracing::debug!("Wrote {}", path.display());
            written.push(path);
            Ok(())
        }
        Err(source) => {
            tracing::error!("Failed to write {}: {}", path.display(), source);
            Err(ReportWriteError {
                path,
                written: written.clone(),
                source,
            })
        }
    }
}

/// Generate a console report
pub fn print_console_report(aggregated: &AggregatedResults) {
    println!("\n=== AICB Similarity Benchmark Results ===\n");
    println!("Scored rows: {}", aggregated.total_rows);
    println!("Skipped rows: {}\n", aggregated.skipped_rows);

    println!("Leaderboard (mean BERTScore F1):");
    println!("{:-<60}", "");

    if aggregated.leaderboard.is_empty() {
        println!("  (no scored pairs)");
    }
    for s in &aggregated.leaderboard {
        println!(
            "  {:>2}. {:<24} F1: {:.4}  P: {:.4}  R: {:.4}  ({} pairs)",
            s.rank, s.model, s.mean_f1, s.mean_precision, s.mean_recall, s.pairs
        );
    }

    if !aggregated.scores_by_topic.is_empty() {
        println!("\nMean F1 by Topic:");
        println!("{:-<60}", "");

        for (topic, models) in &aggregated.scores_by_topic {
            println!("  {}:", topic);
            let mut sorted: Vec<_> = models.iter().collect();
            sorted.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (model, score) in sorted {
                println!("    {}: {:.4}", model, score);
            }
        }
    }

    println!("\n{:=<60}", "");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Aggregator;
    use crate::records::{join, CandidateSet, JoinedCorpus, QueryRecord};
    use crate::scoring::{ScoreRow, ScoreTriple, SkippedPair};

    fn fixture() -> (JoinedCorpus, ScoringOutcome) {
        let corpus = join(
            vec![
                QueryRecord::new("q1", "a").with_topic("sleep"),
                QueryRecord::new("q2", "b").with_topic("grief"),
            ],
            vec![
                CandidateSet::new("q1").with_candidate("gpt4", "x").with_candidate("claude", ""),
                CandidateSet::new("q2").with_candidate("gpt4", "y").with_candidate("claude", "z"),
            ],
        )
        .unwrap();
        let outcome = ScoringOutcome::from_parts(
            vec![
                ScoreRow::new("q1", "gpt4", ScoreTriple::from_precision_recall(1.0, 1.0)),
                ScoreRow::new("q2", "gpt4", ScoreTriple::from_precision_recall(0.8, 0.6)),
                ScoreRow::new("q2", "claude", ScoreTriple::from_precision_recall(0.5, 0.5)),
            ],
            vec![SkippedPair::new("q1", "claude", "candidate text is empty")],
        );
        (corpus, outcome)
    }

    fn summary(
        corpus: &JoinedCorpus,
        outcome: &ScoringOutcome,
        aggregated: &AggregatedResults,
    ) -> RunSummary {
        let stats = corpus.stats();
        RunSummary::from_run("test-run", chrono::Utc::now(), &stats, outcome, aggregated)
    }

    #[test]
    fn test_leaderboard_csv() {
        let (corpus, outcome) = fixture();
        let aggregated = Aggregator::new().aggregate(&outcome, &corpus);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaderboard.csv");

        Reporter::new(&aggregated, &outcome)
            .write_leaderboard(&path, OutputFormat::Csv)
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "rank,model,mean_f1,mean_precision,mean_recall,pairs");
        assert!(lines[1].starts_with("1,gpt4,"));
        assert!(lines[2].starts_with("2,claude,0.500000,"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_scores_table_rows() {
        let (corpus, outcome) = fixture();
        let aggregated = Aggregator::new().aggregate(&outcome, &corpus);
        let table = Reporter::new(&aggregated, &outcome).scores_table();
        assert_eq!(table.headers, vec!["id", "model", "bertscore_f1", "precision", "recall"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[2][0], Cell::Text("q2".into()));
        assert_eq!(table.rows[2][1], Cell::Text("claude".into()));
    }

    #[test]
    fn test_write_all_lists_every_artifact() {
        let (corpus, outcome) = fixture();
        let aggregated = Aggregator::new().with_topics(true).aggregate(&outcome, &corpus);
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path().join("run");

        let summary = summary(&corpus, &outcome, &aggregated);
        let written = Reporter::new(&aggregated, &outcome)
            .write_all(&run_dir, &OutputFormat::all(), &summary)
            .unwrap();

        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "leaderboard.csv",
                "scores.csv",
                "leaderboard.json",
                "scores.json",
                "leaderboard.md",
                "scores.md",
                "topics.csv",
                "summary.json",
            ]
        );

        let topics = std::fs::read_to_string(run_dir.join("topics.csv")).unwrap();
        assert_eq!(
            topics,
            "topic,model,mean_f1\ngrief,claude,0.500000\ngrief,gpt4,0.685714\nsleep,gpt4,1.000000\n"
        );

        let summary_json = std::fs::read_to_string(run_dir.join("summary.json")).unwrap();
        let summary: RunSummary = serde_json::from_str(&summary_json).unwrap();
        assert_eq!(summary.skipped_pairs, 1);
        assert_eq!(summary.scored_pairs, 3);
        assert_eq!(summary.skipped[0].model, "claude");
    }

    #[test]
    fn test_repeated_formats_written_once() {
        let (corpus, outcome) = fixture();
        let aggregated = Aggregator::new().aggregate(&outcome, &corpus);
        let dir = tempfile::tempdir().unwrap();
        let formats = [OutputFormat::Csv, OutputFormat::Json, OutputFormat::Csv];

        let written = Reporter::new(&aggregated, &outcome)
            .write_all(dir.path(), &formats, &summary(&corpus, &outcome, &aggregated))
            .unwrap();

        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "leaderboard.csv",
                "scores.csv",
                "leaderboard.json",
                "scores.json",
                "summary.json",
            ]
        );
    }

    #[test]
    fn test_write_failure_reports_earlier_files() {
        let (corpus, outcome) = fixture();
        let aggregated = Aggregator::new().aggregate(&outcome, &corpus);
        let dir = tempfile::tempdir().unwrap();
        // A directory where the score table should go makes that write fail
        std::fs::create_dir(dir.path().join("scores.csv")).unwrap();

        let summary = summary(&corpus, &outcome, &aggregated);
        let err = Reporter::new(&aggregated, &outcome)
            .write_all(dir.path(), &[OutputFormat::Csv], &summary)
            .unwrap_err();

        assert_eq!(err.path, dir.path().join("scores.csv"));
        assert_eq!(err.written, vec![dir.path().join("leaderboard.csv")]);
        assert!(dir.path().join("leaderboard.csv").exists());
        assert!(err.to_string().contains("1 file(s) already written"));
    }

    #[test]
    fn test_output_is_byte_identical_across_writes() {
        let (corpus, outcome) = fixture();
        let aggregated = Aggregator::new().aggregate(&outcome, &corpus);
        let reporter = Reporter::new(&aggregated, &outcome);
        let dir = tempfile::tempdir().unwrap();

        for format in OutputFormat::all() {
            let a = dir.path().join(format!("a.{}", format.extension()));
            let b = dir.path().join(format!("b.{}", format.extension()));
            reporter.write_scores(&a, format).unwrap();
            reporter.write_scores(&b, format).unwrap();
            assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
        }
    }
}
