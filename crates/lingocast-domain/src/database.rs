// SPDX-License-Identifier: GPL-3.0-or-later

//! Loading and validating the text database.
//!
//! The file is a JSON object of `normalized_key -> { key, matches: [...] }`.
//! Records are validated here so that lookup code only ever sees typed values.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{DatabaseEntry, Match};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("failed to read database {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database root must be a JSON object")]
    NotAnObject,
}

/// Validated, immutable set of database entries.
#[derive(Debug, Clone, Default)]
pub struct TextDatabase {
    entries: Vec<Arc<DatabaseEntry>>,
    skipped_records: usize,
}

impl TextDatabase {
    pub fn load(path: &Path) -> Result<Self, DatabaseError> {
        let raw = std::fs::read_to_string(path).map_err(|source| DatabaseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let database = Self::from_json_str(&raw)?;
        info!(
            target: "database",
            path = %path.display(),
            entries = database.len(),
            skipped = database.skipped_records,
            "text database loaded"
        );
        Ok(database)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, DatabaseError> {
        let root: Value = serde_json::from_str(raw)?;
        let object = root.as_object().ok_or(DatabaseError::NotAnObject)?;

        let mut entries = Vec::with_capacity(object.len());
        let mut skipped_records = 0usize;

        for (bucket_key, bucket) in object {
            let Some(bucket) = bucket.as_object() else {
                warn!(target: "database", key = %bucket_key, "entry is not an object, skipping");
                skipped_records += 1;
                continue;
            };

            let key = match bucket.get("key") {
                Some(Value::String(key)) if !key.is_empty() => key.clone(),
                _ => bucket_key.clone(),
            };
            if key.trim().is_empty() {
                warn!(target: "database", "entry with empty key, skipping");
                skipped_records += 1;
                continue;
            }

            let raw_matches = match bucket.get("matches") {
                Some(Value::Array(items)) => items.as_slice(),
                _ => {
                    warn!(target: "database", key = %key, "entry has no matches array, skipping");
                    skipped_records += 1;
                    continue;
                }
            };

            let mut seen = HashSet::new();
            let mut matches = Vec::with_capacity(raw_matches.len());
            for item in raw_matches {
                match parse_match(item) {
                    Ok(record) => {
                        if seen.insert(record.identity()) {
                            matches.push(record);
                        } else {
                            debug!(target: "database", key = %key, identity = %record.identity(), "duplicate match dropped");
                        }
                    }
                    Err(reason) => {
                        warn!(target: "database", key = %key, reason, "malformed match skipped");
                        skipped_records += 1;
                    }
                }
            }

            if matches.is_empty() {
                warn!(target: "database", key = %key, "entry has no valid matches, skipping");
                continue;
            }

            entries.push(Arc::new(DatabaseEntry { key, matches }));
        }

        // Object iteration order is already sorted by key; keep it stable regardless.
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(Self {
            entries,
            skipped_records,
        })
    }

    pub fn from_entries(entries: Vec<DatabaseEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(Arc::new).collect(),
            skipped_records: 0,
        }
    }

    pub fn entries(&self) -> &[Arc<DatabaseEntry>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of records or entries dropped during validation.
    pub fn skipped_records(&self) -> usize {
        self.skipped_records
    }
}

fn parse_match(value: &Value) -> Result<Match, &'static str> {
    let object = value.as_object().ok_or("match is not an object")?;

    let text_key = required_string(object, &["text_key"])?.ok_or("missing text_key")?;
    if text_key.trim().is_empty() {
        return Err("empty text_key");
    }

    let official_translation =
        required_string(object, &["official_translation", "official_cn"])?.unwrap_or_default();
    let source_file = required_string(object, &["source_file"])?.unwrap_or_default();
    let audio_rule = required_string(object, &["audio_rule"])?.filter(|s| !s.is_empty());
    let source_text =
        required_string(object, &["source_text", "official_en"])?.filter(|s| !s.is_empty());
    let audio_event =
        required_string(object, &["audio_event", "voice_event"])?.filter(|s| !s.is_empty());

    let terms = match object.get("terms") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or("non-string term"))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err("terms is not an array"),
    };

    Ok(Match {
        text_key,
        official_translation,
        source_file,
        audio_rule,
        terms,
        source_text,
        audio_event,
    })
}

/// First present field among `names`; present but non-string is an error.
fn required_string(
    object: &Map<String, Value>,
    names: &[&str],
) -> Result<Option<String>, &'static str> {
    for name in names {
        match object.get(*name) {
            None | Some(Value::Null) => continue,
            Some(Value::String(value)) => return Ok(Some(value.clone())),
            Some(_) => return Err("non-string field"),
        }
    }
    Ok(None)
}
