use crate::config::{Mode, SlugRules, UrlBuilderFile, UrlTemplateConfig};
use crate::source::MatchRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());
static SLUG_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static SLUG_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_]+").unwrap());

/// Turn a display string into a URL-friendly slug under the given rules.
pub fn slugify(text: &str, rules: &SlugRules) -> String {
    let mut text = text.to_string();
    if rules.remove_digits {
        text.retain(|c| !c.is_ascii_digit());
    }
    let text = text.to_lowercase();
    let text = SLUG_STRIP.replace_all(&text, "");
    SLUG_SPACE
        .replace_all(text.trim(), rules.space_replacement.as_str())
        .into_owned()
}

/// Builds match URLs from per-source templates. A source with no template,
/// or a template referencing a placeholder the record cannot fill, logs
/// once and yields no URL; the opportunity is still emitted.
#[derive(Debug)]
pub struct UrlBuilder {
    templates: BTreeMap<String, UrlTemplateConfig>,
    sport: String,
    mode: String,
    warned: Mutex<HashSet<String>>,
}

impl UrlBuilder {
    pub fn new(file: UrlBuilderFile, sport: &str, mode: Mode) -> Self {
        let templates = file
            .url_templates
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        Self {
            templates,
            sport: sport.to_string(),
            mode: mode.to_string(),
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// Empty builder for analyzers that never emit URLs.
    pub fn disabled() -> Self {
        Self {
            templates: BTreeMap::new(),
            sport: String::new(),
            mode: String::new(),
            warned: Mutex::new(HashSet::new()),
        }
    }

    fn warn_once(&self, source: &str, message: &str) {
        let mut warned = self.warned.lock().unwrap();
        if warned.insert(source.to_string()) {
            tracing::warn!(source, "{message}");
        }
    }

    /// Resolve a record's match URL: the scraped URL wins, otherwise the
    /// source template is filled from the record's metadata.
    pub fn build(&self, source: &str, record: &MatchRecord) -> Option<String> {
        if let Some(url) = &record.match_url {
            if !url.is_empty() {
                return Some(url.clone());
            }
        }

        let Some(config) = self.templates.get(&source.to_lowercase()) else {
            self.warn_once(source, "no URL template configured for source");
            return None;
        };

        let mode_value = config
            .mappings
            .get("mode")
            .and_then(|m| m.get(&self.mode))
            .cloned()
            .unwrap_or_else(|| self.mode.clone());
        let sport_value = config
            .mappings
            .get("sport")
            .and_then(|m| m.get(&self.sport))
            .cloned()
            .unwrap_or_else(|| self.sport.clone());

        let tournament_name = record.tournament_name.as_deref().map(|name| {
            match config.slugify_fields.get("tournament_name") {
                Some(rules) => slugify(name, rules),
                None => slugify(name, &default_slug_rules()),
            }
        });

        let mut values: BTreeMap<&str, String> = BTreeMap::new();
        values.insert("mode", mode_value);
        values.insert("sport", sport_value);
        values.insert("country_name", record.country_name.clone().unwrap_or_default());
        values.insert("tournament_id", record.tournament_id.clone().unwrap_or_default());
        values.insert("match_id", record.match_id.clone().unwrap_or_default());
        values.insert("tournament_name", tournament_name.unwrap_or_default());

        let mut missing = false;
        let url = PLACEHOLDER
            .replace_all(&config.template, |caps: &regex::Captures| {
                match values.get(&caps[1]) {
                    Some(v) if !v.is_empty() => v.clone(),
                    _ => {
                        missing = true;
                        String::new()
                    }
                }
            })
            .into_owned();

        if missing {
            self.warn_once(source, "URL template placeholder has no value, skipping URL");
            return None;
        }
        Some(url)
    }
}

fn default_slug_rules() -> SlugRules {
    SlugRules { remove_digits: false, space_replacement: "-".to_string() }
}
