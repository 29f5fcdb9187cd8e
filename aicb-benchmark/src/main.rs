//! AICB Benchmark CLI

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use aicb_benchmark::{
    config::{Config, EmbedderKind, OutputFormat},
    pipeline::Pipeline,
    records::{join, load_candidates_from_file, load_corpus_from_file},
    reporting::print_console_report,
    runner::ConsoleProgress,
    scoring::{IdfWeights, Scorer},
};

#[derive(Parser)]
#[command(name = "aicb-benchmark")]
#[command(about = "BERTScore-style similarity benchmark of LLM answers against expert answers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every candidate answer and write the reports
    Run {
        /// Corpus of queries with expert answers (JSON array or JSON Lines)
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Candidate answers keyed by query id
        #[arg(long)]
        candidates: Option<PathBuf>,

        /// Comma-separated models to score (default: all present)
        #[arg(short, long)]
        models: Option<String>,

        /// Comma-separated topics to keep (default: all)
        #[arg(long)]
        topics: Option<String>,

        /// Number of scoring workers
        #[arg(long)]
        parallel: Option<usize>,

        /// Output directory for run results
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Comma-separated report formats (csv, json, markdown)
        #[arg(long)]
        formats: Option<String>,

        /// Weight tokens by inverse document frequency
        #[arg(long)]
        idf: bool,

        /// Token embedding backend (hashed, fastembed)
        #[arg(long)]
        embedder: Option<EmbedderKind>,

        /// Skip the per-topic breakdown
        #[arg(long)]
        no_topics: bool,
    },

    /// Score a single candidate against a reference
    Score {
        #[arg(long)]
        candidate: String,

        #[arg(long)]
        reference: String,

        /// Corpus whose expert answers provide IDF weights
        #[arg(long)]
        idf_corpus: Option<PathBuf>,

        /// Token embedding backend (hashed, fastembed)
        #[arg(long)]
        embedder: Option<EmbedderKind>,

        /// Print the scores as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show corpus statistics
    Stats {
        #[arg(long)]
        corpus: Option<PathBuf>,

        #[arg(long)]
        candidates: Option<PathBuf>,

        /// Print the statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate sample configuration
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config/aicb.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("aicb_benchmark=debug,info")
    } else {
        EnvFilter::new("aicb_benchmark=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Commands::Run {
            corpus,
            candidates,
            models,
            topics,
            parallel,
            output,
            formats,
            idf,
            embedder,
            no_topics,
        } => {
            let mut config = config;
            if let Some(corpus) = corpus {
                config.input.corpus = corpus.to_string_lossy().into_owned();
            }
            if let Some(candidates) = candidates {
                config.input.candidates = candidates.to_string_lossy().into_owned();
            }
            if let Some(models) = models {
                config.input.models = split_list(&models);
            }
            if let Some(topics) = topics {
                config.input.topics = split_list(&topics);
            }
            if let Some(parallel) = parallel {
                config.scoring.parallel_workers = parallel;
            }
            if let Some(output) = output {
                config.output.output_dir = output.to_string_lossy().into_owned();
            }
            if let Some(formats) = formats {
                config.output.formats = split_list(&formats)
                    .iter()
                    .map(|f| f.parse::<OutputFormat>())
                    .collect::<Result<Vec<_>, _>>()?;
            }
            if idf {
                config.scoring.idf = true;
            }
            if let Some(embedder) = embedder {
                config.scoring.embedder = embedder;
            }
            if no_topics {
                config.output.by_topic = false;
            }

            run_benchmark(config).await?;
        }

        Commands::Score {
            candidate,
            reference,
            idf_corpus,
            embedder,
            json,
        } => {
            let mut config = config;
            if let Some(embedder) = embedder {
                config.scoring.embedder = embedder;
            }
            score_pair(&config, &candidate, &reference, idf_corpus, json)?;
        }

        Commands::Stats {
            corpus,
            candidates,
            json,
        } => {
            show_stats(&config, corpus, candidates, json)?;
        }

        Commands::InitConfig { output } => {
            init_config(output)?;
        }
    }

    Ok(())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

async fn run_benchmark(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    println!("=== AICB Similarity Benchmark ===");
    println!("Corpus: {}", config.input.corpus);
    println!("Candidates: {}", config.input.candidates);
    println!("Workers: {}", config.scoring.parallel_workers);
    println!(
        "Formats: {}",
        config
            .output
            .formats
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!();

    let pipeline = Pipeline::new(config).with_progress(Arc::new(ConsoleProgress));
    let report = pipeline.run().await?;

    print_console_report(&report.aggregated);

    if report.stats.records_without_candidates > 0 {
        println!(
            "Records without candidates: {}",
            report.stats.records_without_candidates
        );
    }
    println!("Run ID: {}", report.run_id);
    println!("Results written to: {}", report.run_dir.display());
    for path in &report.written {
        println!("  {}", path.display());
    }

    Ok(())
}

fn score_pair(
    config: &Config,
    candidate: &str,
    reference: &str,
    idf_corpus: Option<PathBuf>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let mut scorer = Scorer::new(config.embedder()?);
    if let Some(path) = idf_corpus {
        let records = load_corpus_from_file(&path)?;
        let idf =
            IdfWeights::from_references(records.iter().map(|r| r.expert_response.as_str()));
        scorer = scorer.with_idf(idf);
    }

    let score = scorer.score(candidate, reference)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&score)?);
    } else {
        println!("precision: {:.6}", score.precision);
        println!("recall:    {:.6}", score.recall);
        println!("f1:        {:.6}", score.f1);
    }
    Ok(())
}

fn show_stats(
    config: &Config,
    corpus: Option<PathBuf>,
    candidates: Option<PathBuf>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let corpus_path = corpus.unwrap_or_else(|| PathBuf::from(&config.input.corpus));
    let records = load_corpus_from_file(&corpus_path)?;
    let candidate_sets = match candidates {
        Some(path) => load_candidates_from_file(&path)?,
        None => Vec::new(),
    };
    let stats = join(records, candidate_sets)?.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Corpus Statistics ({}):", corpus_path.display());
    println!("{:-<60}", "");
    println!("  Records:                    {}", stats.total_records);
    println!("  Records with candidates:    {}", stats.records_with_candidates);
    println!("  Records without candidates: {}", stats.records_without_candidates);
    println!("  Candidate answers:          {}", stats.total_candidates);
    println!("  Avg candidates per record:  {:.2}", stats.avg_candidates_per_record);
    println!("  Topics ({}):", stats.unique_topics);
    for topic in &stats.topics {
        println!("    {}", topic);
    }
    if !stats.models.is_empty() {
        println!("  Models ({}):", stats.models.len());
        for model in &stats.models {
            println!("    {}", model);
        }
    }

    Ok(())
}

fn init_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    // Ensure parent directory exists
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    config.save_toml(&output)?;
    println!("Configuration written to: {}", output.display());
    Ok(())
}
