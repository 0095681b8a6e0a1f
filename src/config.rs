use clap::ValueEnum;
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal configuration problems. These abort the process before the first
/// cycle; everything else degrades gracefully at runtime.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("sport '{0}' not present in settings")]
    UnknownSport(String),
    #[error("mode '{mode}' not present under sport '{sport}'")]
    UnknownMode { sport: String, mode: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Prematch,
    Live,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Prematch => write!(f, "prematch"),
            Mode::Live => write!(f, "live"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CheckKind {
    /// Arbitrage across complementary market sets.
    Arb,
    /// Positive expected value against a sharp reference.
    Ev,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckKind::Arb => write!(f, "arb"),
            CheckKind::Ev => write!(f, "ev"),
        }
    }
}

/// One scraped-odds source: its name tags every record it contributes.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub path: PathBuf,
}

/// Per sport+mode grouping thresholds and directory layout.
#[derive(Debug, Clone, Deserialize)]
pub struct ModeSettings {
    pub output_dir: PathBuf,
    pub source_directories: Vec<SourceSpec>,
    pub strong_threshold: Vec<f64>,
    pub moderate_threshold: Vec<f64>,
    pub time_diff_tolerance: i64,
    pub gatekeeper_threshold: f64,
    pub day_diff_tolerance: i64,
}

/// Team-name matching tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchingHelper {
    #[serde(default)]
    pub important_terms: Vec<Vec<String>>,
    #[serde(default)]
    pub common_team_words: Vec<String>,
    #[serde(default)]
    pub location_identifiers: Vec<String>,
    #[serde(default)]
    pub team_synonyms: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SynonymsFile {
    #[serde(default)]
    pub synonyms: Vec<Vec<String>>,
}

/// Market sets keep the file's order: when two sets tie on the best
/// arbitrage, the first one encountered wins.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketsFile {
    pub market_sets: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlugRules {
    #[serde(default)]
    pub remove_digits: bool,
    #[serde(default = "default_space_replacement")]
    pub space_replacement: String,
}

fn default_space_replacement() -> String {
    "-".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct UrlTemplateConfig {
    pub template: String,
    #[serde(default)]
    pub mappings: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub slugify_fields: BTreeMap<String, SlugRules>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UrlBuilderFile {
    #[serde(default)]
    pub url_templates: BTreeMap<String, UrlTemplateConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvMethod {
    /// Remove the vig from a single sharp book.
    OneSharp,
    /// Average a group of sharp books per outcome, then remove the vig.
    MultiSharp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvSettings {
    pub method: EvMethod,
    #[serde(default)]
    pub sharp_source: String,
    #[serde(default)]
    pub sharp_group: Vec<String>,
    pub target_source: String,
    pub output_directory: PathBuf,
    pub odds_interval: (f64, f64),
    pub min_overprice: f64,
    #[serde(default)]
    pub overprice_source_logging: bool,
    #[serde(default)]
    pub appearance_investigation: bool,
    #[serde(default)]
    pub double_check: bool,
    #[serde(default = "default_investigation_timeout")]
    pub investigation_timeout_minutes: i64,
}

fn default_investigation_timeout() -> i64 {
    5
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// The on-disk settings tree: `<root>/<sport>/{settings,synonyms,
/// matching_helper,markets,url_builder,ev}.json`. Everything is loaded once
/// at startup; the resulting structs are read-only afterwards.
#[derive(Debug, Clone)]
pub struct SettingsTree {
    root: PathBuf,
    sport: String,
}

impl SettingsTree {
    pub fn new(root: impl Into<PathBuf>, sport: impl Into<String>) -> Self {
        Self { root: root.into(), sport: sport.into() }
    }

    fn sport_file(&self, name: &str) -> PathBuf {
        self.root.join(&self.sport).join(name)
    }

    pub fn mode_settings(&self, mode: Mode) -> Result<ModeSettings, ConfigError> {
        let path = self.sport_file("settings.json");
        let all: BTreeMap<String, BTreeMap<String, ModeSettings>> = read_json(&path)?;
        let per_sport = all
            .get(&self.sport)
            .ok_or_else(|| ConfigError::UnknownSport(self.sport.clone()))?;
        per_sport
            .get(&mode.to_string())
            .cloned()
            .ok_or_else(|| ConfigError::UnknownMode {
                sport: self.sport.clone(),
                mode: mode.to_string(),
            })
    }

    pub fn synonyms(&self) -> Result<SynonymsFile, ConfigError> {
        read_json(&self.sport_file("synonyms.json"))
    }

    pub fn matching_helper(&self) -> Result<MatchingHelper, ConfigError> {
        read_json(&self.sport_file("matching_helper.json"))
    }

    pub fn markets(&self) -> Result<MarketsFile, ConfigError> {
        read_json(&self.sport_file("markets.json"))
    }

    pub fn url_builder(&self) -> Result<UrlBuilderFile, ConfigError> {
        read_json(&self.sport_file("url_builder.json"))
    }

    pub fn ev(&self) -> Result<EvSettings, ConfigError> {
        read_json(&self.sport_file("ev.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_settings_parse() {
        let json = r#"
        {
          "football": {
            "prematch": {
              "output_dir": "out/prematch",
              "source_directories": [
                {"name": "alpha", "path": "data/alpha"},
                {"name": "beta", "path": "data/beta"}
              ],
              "strong_threshold": [0.85, 0.70],
              "moderate_threshold": [0.40, 0.60],
              "time_diff_tolerance": 30,
              "gatekeeper_threshold": 0.30,
              "day_diff_tolerance": 1
            }
          }
        }"#;
        let all: BTreeMap<String, BTreeMap<String, ModeSettings>> =
            serde_json::from_str(json).unwrap();
        let settings = &all["football"]["prematch"];
        assert_eq!(settings.source_directories.len(), 2);
        assert_eq!(settings.strong_threshold, vec![0.85, 0.70]);
        assert_eq!(settings.time_diff_tolerance, 30);
    }

    #[test]
    fn test_markets_preserve_order() {
        let json = r#"
        {
          "market_sets": {
            "three_way": ["1_odd", "draw_odd", "2_odd"],
            "both_score": ["both_score_odd", "both_noscore_odd"],
            "over_under_2.5": ["under_2.5_odd", "over_2.5_odd"]
          }
        }"#;
        let markets: MarketsFile = serde_json::from_str(json).unwrap();
        let names: Vec<&String> = markets.market_sets.keys().collect();
        assert_eq!(names, vec!["three_way", "both_score", "over_under_2.5"]);
    }

    #[test]
    fn test_ev_settings_defaults() {
        let json = r#"
        {
          "method": "one_sharp",
          "sharp_source": "alpha",
          "target_source": "gamma",
          "output_directory": "out",
          "odds_interval": [1.0, 10.0],
          "min_overprice": 0.02
        }"#;
        let ev: EvSettings = serde_json::from_str(json).unwrap();
        assert_eq!(ev.method, EvMethod::OneSharp);
        assert!(!ev.overprice_source_logging);
        assert!(!ev.double_check);
        assert_eq!(ev.investigation_timeout_minutes, 5);
    }

    #[test]
    fn test_settings_tree_loads_sample_tree() {
        let tree = SettingsTree::new("settings", "football");
        let settings = tree.mode_settings(Mode::Prematch).unwrap();
        assert!(settings.source_directories.len() >= 2);
        assert_eq!(settings.strong_threshold.len(), settings.moderate_threshold.len());

        let helper = tree.matching_helper().unwrap();
        assert!(!helper.important_terms.is_empty());

        let markets = tree.markets().unwrap();
        assert!(markets.market_sets.contains_key("three_way"));

        let ev = tree.ev().unwrap();
        assert!(ev.min_overprice > 0.0);

        let err = tree.mode_settings(Mode::Live).map(|_| ()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownMode { .. }));
    }

    #[test]
    fn test_unknown_sport_is_fatal() {
        let tree = SettingsTree::new("settings", "curling");
        assert!(tree.mode_settings(Mode::Prematch).is_err());
    }
}
