//! Query records, candidate answers and the corpus join

pub mod loader;
pub mod stats;

pub use loader::{
    join, load_candidates_from_file, load_candidates_from_str, load_corpus_from_file,
    load_corpus_from_str, RecordError,
};
pub use stats::CorpusStats;

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Topic assigned to records that do not carry one
pub const UNSPECIFIED_TOPIC: &str = "unspecified";

/// Provenance of a query record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub timestamp: Option<DateTime<Utc>>,
    pub source: Option<String>,
}

/// A single query together with its expert (gold) answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: String,
    pub topic: Option<String>,
    pub user_message: String,
    pub expert_response: String,
    pub metadata: RecordMetadata,
}

impl QueryRecord {
    /// Create a record with only the required fields
    pub fn new(id: impl Into<String>, expert_response: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            topic: None,
            user_message: String::new(),
            expert_response: expert_response.into(),
            metadata: RecordMetadata::default(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = message.into();
        self
    }

    /// Topic used for grouping; records without one share [`UNSPECIFIED_TOPIC`]
    pub fn topic_or_default(&self) -> &str {
        match self.topic.as_deref() {
            Some(topic) if !topic.trim().is_empty() => topic,
            _ => UNSPECIFIED_TOPIC,
        }
    }
}

/// Candidate answers from different models for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    pub query_id: String,
    /// Model name to answer text, in input order
    pub candidates: IndexMap<String, String>,
}

impl CandidateSet {
    pub fn new(query_id: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            candidates: IndexMap::new(),
        }
    }

    pub fn with_candidate(mut self, model: impl Into<String>, answer: impl Into<String>) -> Self {
        self.candidates.insert(model.into(), answer.into());
        self
    }
}

/// A query record joined with the answers of every model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedRecord {
    pub record: QueryRecord,
    pub candidates: IndexMap<String, String>,
}

impl JoinedRecord {
    pub fn has_candidates(&self) -> bool {
        !self.candidates.is_empty()
    }
}

/// The joined corpus for one run, in corpus order
#[derive(Debug, Clone, Default)]
pub struct JoinedCorpus {
    entries: Vec<JoinedRecord>,
    index: HashMap<String, usize>,
}

impl JoinedCorpus {
    pub(crate) fn from_entries(entries: Vec<JoinedRecord>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (entry.record.id.clone(), pos))
            .collect();
        Self { entries, index }
    }

    pub fn entries(&self) -> &[JoinedRecord] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &JoinedRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a record by id
    pub fn get(&self, id: &str) -> Option<&JoinedRecord> {
        self.index.get(id).map(|&pos| &self.entries[pos])
    }

    /// Keep only records whose topic matches one of `topics` (case-insensitive).
    /// An empty filter keeps everything.
    pub fn filter_by_topic(self, topics: &[String]) -> Self {
        if topics.is_empty() {
            return self;
        }
        let wanted: Vec<String> = topics.iter().map(|t| t.trim().to_lowercase()).collect();
        let entries = self
            .entries
            .into_iter()
            .filter(|e| wanted.contains(&e.record.topic_or_default().to_lowercase()))
            .collect();
        Self::from_entries(entries)
    }

    /// Drop candidates of models not listed in `models`. An empty list keeps all.
    pub fn retain_models(mut self, models: &[String]) -> Self {
        if models.is_empty() {
            return self;
        }
        let present = self.models();
        for model in models {
            if !present.contains(model) {
                tracing::warn!("Requested model {} has no candidate answers", model);
            }
        }
        for entry in &mut self.entries {
            entry.candidates.retain(|model, _| models.contains(model));
        }
        self
    }

    /// Sorted, de-duplicated topics
    pub fn topics(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.record.topic_or_default().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sorted, de-duplicated model names across all candidate sets
    pub fn models(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|e| e.candidates.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Expert answers in corpus order
    pub fn reference_texts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.record.expert_response.as_str())
    }

    pub fn stats(&self) -> CorpusStats {
        CorpusStats::from_corpus(self)
    }
}
