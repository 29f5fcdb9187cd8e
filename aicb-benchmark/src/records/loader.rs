//! Record loading from JSON and JSON Lines files

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use super::{CandidateSet, JoinedCorpus, JoinedRecord, QueryRecord, RecordMetadata};

/// Error type for record loading
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Malformed record {id}: {reason}")]
    Malformed { id: String, reason: String },
}

impl RecordError {
    fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        RecordError::Malformed {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Roles whose messages make up the expert answer of a conversation
const EXPERT_ROLES: &[&str] = &["operator", "expert", "assistant"];

/// Timestamp layouts accepted besides RFC 3339
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

// ── Raw input shapes ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawQueryRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    user_message: Option<String>,
    #[serde(default)]
    expert_response: Option<String>,
    /// Conversation form: the answer is assembled from operator turns
    #[serde(default)]
    messages: Vec<RawMessage>,
    #[serde(default)]
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCandidateSet {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    candidates: IndexMap<String, Value>,
    /// Extra top-level string fields are additional model answers
    #[serde(flatten)]
    extra: IndexMap<String, Value>,
}

// ── Corpus ────────────────────────────────────────────────────────────────

/// Load query records from a JSON or JSON Lines file
pub fn load_corpus_from_file(
    path: impl AsRef<Path>,
) -> Result<Vec<QueryRecord>, RecordError> {
    let content = read_file(path.as_ref())?;
    let records = load_corpus_from_str(&content)?;
    tracing::info!(
        "Loaded {} query records from {}",
        records.len(),
        path.as_ref().display()
    );
    Ok(records)
}

/// Load query records from a JSON array, a `{"records": [...]}` object, or JSON Lines
pub fn load_corpus_from_str(content: &str) -> Result<Vec<QueryRecord>, RecordError> {
    let records = parse_json_sequence(content)?
        .into_iter()
        .enumerate()
        .map(|(position, value)| parse_query_record(value, position))
        .collect::<Result<Vec<_>, _>>()?;

    ensure_unique_ids(&records)?;
    Ok(records)
}

fn parse_query_record(value: Value, position: usize) -> Result<QueryRecord, RecordError> {
    let label = record_label(&value, position);
    let raw: RawQueryRecord = serde_json::from_value(value)
        .map_err(|e| RecordError::malformed(&label, e.to_string()))?;

    let id = match raw.id {
        Some(id) if !id.trim().is_empty() => id,
        _ => return Err(RecordError::malformed(label, "missing required field `id`")),
    };

    let expert_response = match raw.expert_response {
        Some(text) => text,
        None => join_messages(&raw.messages, |role| EXPERT_ROLES.contains(&role)).ok_or_else(
            || RecordError::malformed(&id, "missing required field `expert_response`"),
        )?,
    };
    if expert_response.trim().is_empty() {
        return Err(RecordError::malformed(&id, "`expert_response` is empty"));
    }

    let user_message = raw
        .user_message
        .or_else(|| join_messages(&raw.messages, |role| role == "user"))
        .unwrap_or_default();

    let metadata = match raw.metadata {
        Some(meta) => {
            let timestamp = match meta.timestamp.as_deref() {
                Some(ts) => Some(parse_timestamp(ts).ok_or_else(|| {
                    RecordError::malformed(&id, format!("unrecognised timestamp `{}`", ts))
                })?),
                None => None,
            };
            RecordMetadata {
                timestamp,
                source: meta.source,
            }
        }
        None => RecordMetadata::default(),
    };

    Ok(QueryRecord {
        id,
        topic: raw.topic,
        user_message,
        expert_response,
        metadata,
    })
}

/// Newline-joined contents of the messages whose lower-cased role matches
fn join_messages(messages: &[RawMessage], wanted: impl Fn(&str) -> bool) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|m| wanted(m.role.trim().to_lowercase().as_str()))
        .map(|m| m.content.trim())
        .filter(|c| !c.is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn ensure_unique_ids(records: &[QueryRecord]) -> Result<(), RecordError> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.id.as_str()) {
            return Err(RecordError::malformed(&record.id, "duplicate query id"));
        }
    }
    Ok(())
}

// ── Candidates ────────────────────────────────────────────────────────────

/// Load candidate sets from a JSON or JSON Lines file
pub fn load_candidates_from_file(
    path: impl AsRef<Path>,
) -> Result<Vec<CandidateSet>, RecordError> {
    let content = read_file(path.as_ref())?;
    let sets = load_candidates_from_str(&content)?;
    tracing::info!(
        "Loaded {} candidate sets from {}",
        sets.len(),
        path.as_ref().display()
    );
    Ok(sets)
}

/// Load candidate sets; accepts the same encodings as [`load_corpus_from_str`].
///
/// A key repeated inside one `candidates` object keeps its last answer, as
/// JSON object parsing does. A model named both there and as a top-level
/// field is rejected as malformed.
pub fn load_candidates_from_str(content: &str) -> Result<Vec<CandidateSet>, RecordError> {
    parse_json_sequence(content)?
        .into_iter()
        .enumerate()
        .map(|(position, value)| parse_candidate_set(value, position))
        .collect()
}

fn parse_candidate_set(value: Value, position: usize) -> Result<CandidateSet, RecordError> {
    let label = record_label(&value, position);
    let raw: RawCandidateSet = serde_json::from_value(value)
        .map_err(|e| RecordError::malformed(&label, e.to_string()))?;

    let query_id = match raw.id {
        Some(id) if !id.trim().is_empty() => id,
        _ => return Err(RecordError::malformed(label, "missing required field `id`")),
    };

    let mut candidates = IndexMap::with_capacity(raw.candidates.len());
    for (model, answer) in raw.candidates {
        let text = match answer {
            Value::String(text) => text,
            // A model that produced nothing is scored (and skipped) like an empty answer
            Value::Null => String::new(),
            other => {
                return Err(RecordError::malformed(
                    &query_id,
                    format!("candidate for model `{}` is not a string: {}", model, other),
                ))
            }
        };
        candidates.insert(model, text);
    }

    for (key, value) in raw.extra {
        match value {
            Value::String(text) => {
                if candidates.contains_key(&key) {
                    return Err(RecordError::malformed(
                        &query_id,
                        format!("model `{}` has more than one answer", key),
                    ));
                }
                candidates.insert(key, text);
            }
            _ => tracing::debug!(
                "Ignoring non-text field `{}` on candidates for {}",
                key,
                query_id
            ),
        }
    }

    Ok(CandidateSet { query_id, candidates })
}

// ── Join ──────────────────────────────────────────────────────────────────

/// Join candidate sets onto query records by id.
///
/// Every candidate set must reference an existing record; several sets for
/// the same record are merged, but a model may answer each query only once.
/// Records without candidates are kept with an empty mapping; callers report
/// them through [`JoinedCorpus::stats`].
pub fn join(
    records: Vec<QueryRecord>,
    candidate_sets: Vec<CandidateSet>,
) -> Result<JoinedCorpus, RecordError> {
    ensure_unique_ids(&records)?;

    let positions: HashMap<String, usize> = records
        .iter()
        .enumerate()
        .map(|(pos, r)| (r.id.clone(), pos))
        .collect();

    let mut entries: Vec<JoinedRecord> = records
        .into_iter()
        .map(|record| JoinedRecord {
            record,
            candidates: IndexMap::new(),
        })
        .collect();

    for set in candidate_sets {
        let pos = *positions.get(&set.query_id).ok_or_else(|| {
            RecordError::malformed(&set.query_id, "candidate set references an unknown query id")
        })?;
        let entry = &mut entries[pos];
        for (model, answer) in set.candidates {
            if entry.candidates.contains_key(&model) {
                return Err(RecordError::malformed(
                    &set.query_id,
                    format!("model `{}` has more than one answer", model),
                ));
            }
            entry.candidates.insert(model, answer);
        }
    }

    Ok(JoinedCorpus::from_entries(entries))
}

// ── Shared helpers ────────────────────────────────────────────────────────

fn read_file(path: &Path) -> Result<String, RecordError> {
    std::fs::read_to_string(path).map_err(|source| RecordError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// The record's own id when it has a usable one, else its `#N` position
fn record_label(value: &Value, position: usize) -> String {
    value
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{}", position + 1))
}

/// Split input into JSON values: a top-level array, an object holding a
/// `records` array, a single object, or one object per line.
fn parse_json_sequence(content: &str) -> Result<Vec<Value>, RecordError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<Value>>(trimmed).map_err(|e| RecordError::Parse {
            line: e.line(),
            message: e.to_string(),
        });
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return match value {
            Value::Object(mut obj) => match obj.remove("records") {
                Some(Value::Array(records)) => Ok(records),
                Some(other) => {
                    obj.insert("records".to_string(), other);
                    Ok(vec![Value::Object(obj)])
                }
                None => Ok(vec![Value::Object(obj)]),
            },
            other => Err(RecordError::Parse {
                line: 1,
                message: format!("expected a JSON object or array, got {}", other),
            }),
        };
    }

    let mut values = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value = serde_json::from_str::<Value>(line).map_err(|e| RecordError::Parse {
            line: idx + 1,
            message: e.to_string(),
        })?;
        values.push(value);
    }
    Ok(values)
}
