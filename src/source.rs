use crate::config::SourceSpec;
use crate::text::CountrySynonyms;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// A single bookmaker's view of one fixture. Everything that is not a known
/// metadata field is collected into the odds map, keyed by outcome name
/// ("1_odd", "over_2.5_odd", ...). Records are immutable after ingestion
/// apart from the `source` tag attached while loading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub home_team: String,
    #[serde(default)]
    pub away_team: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default, deserialize_with = "de_id")]
    pub match_id: Option<String>,
    #[serde(default, deserialize_with = "de_id")]
    pub tournament_id: Option<String>,
    #[serde(default)]
    pub tournament_name: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub match_url: Option<String>,
    #[serde(flatten)]
    pub odds: BTreeMap<String, Value>,
}

impl MatchRecord {
    /// Positive decimal odd for an outcome. Feeds deliver odds as numbers
    /// or numeric strings; anything non-positive or non-numeric is treated
    /// as absent (the record stays eligible for other markets).
    pub fn odd(&self, outcome: &str) -> Option<f64> {
        let value = match self.odds.get(outcome)? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        (value > 0.0).then_some(value)
    }

    /// Whether the outcome carries any non-blank entry at all.
    pub fn has_outcome(&self, outcome: &str) -> bool {
        match self.odds.get(outcome) {
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(Value::String(s)) => !s.trim().is_empty(),
            _ => false,
        }
    }
}

/// Identifiers arrive as strings or bare numbers depending on the source.
fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// One country file from one source: the records plus the batch's
/// `updated_at` stamp when the scraper provided one.
#[derive(Debug, Clone)]
pub struct CountryBatch {
    pub records: Vec<MatchRecord>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CountryFile {
    Batch {
        #[serde(default)]
        updated_at: Option<String>,
        matches: Vec<MatchRecord>,
    },
    Records(Vec<MatchRecord>),
}

/// Accept RFC 3339 or a naive ISO timestamp (assumed UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Load one country file. Both shapes are accepted: a bare record array, or
/// an object carrying `updated_at` next to `matches`.
pub fn load_country_batch(path: &Path) -> Result<CountryBatch> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let file: CountryFile = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(match file {
        CountryFile::Batch { updated_at, matches } => CountryBatch {
            records: matches,
            updated_at: updated_at.as_deref().and_then(parse_timestamp),
        },
        CountryFile::Records(records) => CountryBatch { records, updated_at: None },
    })
}

fn json_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("json"))
            })
            .collect(),
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "source directory unreadable");
            Vec::new()
        }
    };
    files.sort();
    files
}

fn file_country(path: &Path, synonyms: &CountrySynonyms) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    Some(synonyms.resolve(stem))
}

/// Every canonical country name appearing in any source directory.
pub fn canonical_countries(
    sources: &[SourceSpec],
    synonyms: &CountrySynonyms,
) -> BTreeSet<String> {
    let mut countries = BTreeSet::new();
    for spec in sources {
        for file in json_files(&spec.path) {
            if let Some(country) = file_country(&file, synonyms) {
                countries.insert(country);
            }
        }
    }
    countries
}

/// Per source, the files whose canonical country equals `country`.
/// Sources contributing no file are omitted.
pub fn country_file_paths(
    country: &str,
    sources: &[SourceSpec],
    synonyms: &CountrySynonyms,
) -> BTreeMap<String, Vec<PathBuf>> {
    let mut paths: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for spec in sources {
        let files: Vec<PathBuf> = json_files(&spec.path)
            .into_iter()
            .filter(|f| file_country(f, synonyms).as_deref() == Some(country))
            .collect();
        if !files.is_empty() {
            paths.insert(spec.name.clone(), files);
        }
    }
    paths
}

/// Load and tag all records of one country, keyed by source, together with
/// the latest `updated_at` seen per source. Unreadable files degrade to
/// empty with a warning.
pub fn load_country_records(
    paths: &BTreeMap<String, Vec<PathBuf>>,
) -> (BTreeMap<String, Vec<MatchRecord>>, BTreeMap<String, DateTime<Utc>>) {
    let mut by_source: BTreeMap<String, Vec<MatchRecord>> = BTreeMap::new();
    let mut updated: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();

    for (source, files) in paths {
        let mut records = Vec::new();
        for file in files {
            match load_country_batch(file) {
                Ok(batch) => {
                    records.extend(batch.records);
                    if let Some(stamp) = batch.updated_at {
                        updated
                            .entry(source.clone())
                            .and_modify(|cur| *cur = (*cur).max(stamp))
                            .or_insert(stamp);
                    }
                }
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "skipping unreadable country file");
                }
            }
        }
        for record in &mut records {
            record.source = source.clone();
        }
        by_source.insert(source.clone(), records);
    }

    (by_source, updated)
}
