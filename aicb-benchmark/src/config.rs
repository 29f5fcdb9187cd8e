//! Configuration management for the benchmark
//!
//! Loads input, scoring and output settings from TOML files and provides
//! runtime access. Every field has a default, so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::scoring::{HashedNgramEmbedder, TokenEmbedder};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where the corpus and candidate answers come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_corpus_path")]
    pub corpus: String,
    #[serde(default = "default_candidates_path")]
    pub candidates: String,
    /// Models to score; empty means every model present in the candidates
    #[serde(default)]
    pub models: Vec<String>,
    /// Topics to keep; empty means every topic
    #[serde(default)]
    pub topics: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            corpus: default_corpus_path(),
            candidates: default_candidates_path(),
            models: Vec::new(),
            topics: Vec::new(),
        }
    }
}

/// Similarity scoring settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Size of the scoring worker pool
    #[serde(default = "default_parallel_workers")]
    pub parallel_workers: usize,
    /// Weight tokens by inverse document frequency over the reference answers
    #[serde(default)]
    pub idf: bool,
    /// Token embedding backend
    #[serde(default)]
    pub embedder: EmbedderKind,
    /// Model name for the `fastembed` backend (default: all-MiniLM-L6-v2)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default = "default_min_ngram")]
    pub min_ngram: usize,
    #[serde(default = "default_max_ngram")]
    pub max_ngram: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            parallel_workers: default_parallel_workers(),
            idf: false,
            embedder: EmbedderKind::default(),
            model: None,
            embedding_dim: default_embedding_dim(),
            min_ngram: default_min_ngram(),
            max_ngram: default_max_ngram(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_formats")]
    pub formats: Vec<OutputFormat>,
    /// Also group mean F1 by topic
    #[serde(default = "default_true")]
    pub by_topic: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            formats: default_formats(),
            by_topic: true,
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_corpus_path() -> String {
    "data/corpus.jsonl".to_string()
}

fn default_candidates_path() -> String {
    "data/candidates.jsonl".to_string()
}

fn default_parallel_workers() -> usize {
    4
}

fn default_embedding_dim() -> usize {
    256
}

fn default_min_ngram() -> usize {
    3
}

fn default_max_ngram() -> usize {
    5
}

fn default_output_dir() -> String {
    "results/runs".to_string()
}

fn default_formats() -> Vec<OutputFormat> {
    OutputFormat::all()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default config location or return defaults
    pub fn load_or_default() -> Self {
        let config_paths = [
            "config/aicb.toml",
            "../config/aicb.toml",
            "aicb-benchmark/config/aicb.toml",
        ];

        for path in &config_paths {
            if !Path::new(path).exists() {
                continue;
            }
            match Self::from_file(path) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", path);
                    return config;
                }
                Err(e) => tracing::warn!("Ignoring configuration at {}: {}", path, e),
            }
        }

        tracing::info!("Using default configuration");
        Self::default()
    }

    /// Save configuration to a TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, content)
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scoring = &self.scoring;
        if scoring.parallel_workers == 0 {
            return Err(ConfigError::Invalid(
                "scoring.parallel_workers must be at least 1".into(),
            ));
        }
        if scoring.embedding_dim == 0 {
            return Err(ConfigError::Invalid(
                "scoring.embedding_dim must be at least 1".into(),
            ));
        }
        #[cfg(not(feature = "fastembed"))]
        if scoring.embedder == EmbedderKind::Fastembed {
            return Err(fastembed_unavailable());
        }
        if scoring.min_ngram == 0 || scoring.min_ngram > scoring.max_ngram {
            return Err(ConfigError::Invalid(format!(
                "invalid n-gram range {}..={}",
                scoring.min_ngram, scoring.max_ngram
            )));
        }
        if self.output.formats.is_empty() {
            return Err(ConfigError::Invalid(
                "output.formats must name at least one format".into(),
            ));
        }
        Ok(())
    }

    /// Build the token embedder described by the scoring section
    pub fn embedder(&self) -> Result<Arc<dyn TokenEmbedder>, ConfigError> {
        let scoring = &self.scoring;
        match scoring.embedder {
            EmbedderKind::Hashed => Ok(Arc::new(HashedNgramEmbedder::new(
                scoring.embedding_dim,
                scoring.min_ngram,
                scoring.max_ngram,
            ))),
            EmbedderKind::Fastembed => fastembed_embedder(scoring.model.as_deref()),
        }
    }
}

#[cfg(feature = "fastembed")]
fn fastembed_embedder(model: Option<&str>) -> Result<Arc<dyn TokenEmbedder>, ConfigError> {
    let embedder = crate::scoring::FastEmbedder::new(model)
        .map_err(|e| ConfigError::Embedder(e.to_string()))?;
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "fastembed"))]
fn fastembed_embedder(_model: Option<&str>) -> Result<Arc<dyn TokenEmbedder>, ConfigError> {
    Err(fastembed_unavailable())
}

#[cfg(not(feature = "fastembed"))]
fn fastembed_unavailable() -> ConfigError {
    ConfigError::Invalid(
        "scoring.embedder = \"fastembed\" requires building with the `fastembed` feature".into(),
    )
}

/// Token embedding backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Hashed character n-grams; no model files needed
    #[default]
    Hashed,
    /// ONNX sentence-embedding model through the `fastembed` crate
    Fastembed,
}

impl EmbedderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedderKind::Hashed => "hashed",
            EmbedderKind::Fastembed => "fastembed",
        }
    }
}

impl std::fmt::Display for EmbedderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EmbedderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hashed" => Ok(EmbedderKind::Hashed),
            "fastembed" => Ok(EmbedderKind::Fastembed),
            other => Err(ConfigError::Invalid(format!("unknown embedder: {}", other))),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Invalid(String),
    Embedder(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {}", e),
            ConfigError::Embedder(e) => write!(f, "Embedder error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serialization format for report tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
    Markdown,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Markdown => "markdown",
        }
    }

    /// File extension used for report artifacts
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Markdown => "md",
        }
    }

    pub fn all() -> Vec<OutputFormat> {
        vec![OutputFormat::Csv, OutputFormat::Json, OutputFormat::Markdown]
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(ConfigError::Invalid(format!("unknown output format: {}", other))),
        }
    }
}
