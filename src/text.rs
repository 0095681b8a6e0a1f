use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").unwrap());
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]").unwrap());

// Bare V and X are left alone; they collide with initials far too often.
static ROMAN_NUMERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(XVIII|XVII|XIII|XVI|XIV|XIX|XII|VIII|XV|XI|XX|VII|III|IX|IV|VI|II)\b")
        .unwrap()
});

static NATIONALITY_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(ienne|ien|aise|ais|oise|ois|ine|in|é)$").unwrap());

/// Strip diacritics via NFD decomposition, dropping combining marks.
pub fn remove_accents(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Lowercase, strip accents, drop parenthetical content, replace non-word
/// characters with spaces, collapse whitespace and trim.
pub fn normalize(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    let n = remove_accents(&name.to_lowercase());
    let n = PARENTHETICAL.replace_all(&n, "");
    let n = NON_WORD.replace_all(&n, " ");
    let n = WHITESPACE.replace_all(&n, " ");
    n.trim().to_string()
}

/// Fully alphanumeric form of the normalized name.
/// "Al-Hilal FC (SA)" -> "alhilal fc" -> "alhilalfc".
pub fn canonical(name: &str) -> String {
    NON_ALNUM.replace_all(&normalize(name), "").into_owned()
}

static PHONETIC_SUBS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"k['`\-\s]*un").unwrap(), "kun"),
        (Regex::new(r"j['`\-\s]*in").unwrap(), "jin"),
        (Regex::new(r"zh['`\-\s]*ou").unwrap(), "zhou"),
        (Regex::new(r"([aeiou])['`]").unwrap(), "$1"),
        (Regex::new(r"saint").unwrap(), "st"),
        (Regex::new(r"fc").unwrap(), ""),
        (Regex::new(r"[\s\-]+").unwrap(), ""),
    ]
});

/// Fold transliteration variants ("K'un" / "Kun") into one representation.
/// Substitutions are applied in a fixed order on the normalized form.
pub fn phonetic(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    let mut result = normalize(name);
    for (pattern, replacement) in PHONETIC_SUBS.iter() {
        result = pattern.replace_all(&result, *replacement).into_owned();
    }
    result
}

/// Remove Roman numerals II–XX as whole words (used by name simplification).
pub fn strip_roman_numerals(normalized: &str) -> String {
    let n = ROMAN_NUMERAL.replace_all(normalized, "");
    WHITESPACE.replace_all(&n, " ").trim().to_string()
}

/// Strip terminal nationality suffixes ("lyonnaise" -> "lyonn").
pub fn strip_nationality_suffix(name: &str) -> String {
    NATIONALITY_SUFFIX.replace(name, "").trim().to_string()
}

/// Reduce a word to its alphanumeric characters only.
pub fn alnum_only(word: &str) -> String {
    NON_ALNUM.replace_all(word, "").into_owned()
}

/// Collapse runs of whitespace and trim.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// Country synonym groups: the first member of each group is the primary
/// name all other members resolve to.
#[derive(Debug, Clone, Default)]
pub struct CountrySynonyms {
    groups: Vec<Vec<String>>,
    primary: HashMap<String, String>,
}

impl CountrySynonyms {
    pub fn new(groups: Vec<Vec<String>>) -> Self {
        let mut primary = HashMap::new();
        for group in &groups {
            if let Some(first) = group.first() {
                for syn in group {
                    primary.insert(syn.clone(), first.clone());
                }
            }
        }
        Self { groups, primary }
    }

    /// Resolve a country file base name (optionally ".json"-suffixed) to the
    /// primary name of its synonym group. Exact match wins, then substring
    /// match, then the base itself.
    pub fn resolve(&self, base_name: &str) -> String {
        let base = if base_name.to_lowercase().ends_with(".json") {
            &base_name[..base_name.len() - 5]
        } else {
            base_name
        };

        if let Some(primary) = self.primary.get(base) {
            return primary.clone();
        }

        let base_lower = base.to_lowercase();
        for group in &self.groups {
            for syn in group {
                if base_lower.contains(&syn.to_lowercase()) {
                    return group[0].clone();
                }
            }
        }

        base.to_string()
    }
}
