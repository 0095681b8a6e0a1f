use crate::config::MatchingHelper;
use crate::matching::similarity::{fuzzy_match, jaccard, similarity_ratio, FUZZY_THRESHOLD};
use crate::text;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};

/// Precomputed core form of a team name: the word set drives Jaccard
/// scoring, the joined string drives the fuzzy fallback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreName {
    pub words: BTreeSet<String>,
    pub joined: String,
}

/// Team-name matcher. All lookup tables (important-term groups, common
/// words, location identifiers, team synonyms) and their compiled regexes
/// are built once at startup; per-call work is set and regex operations.
#[derive(Debug)]
pub struct TeamMatcher {
    important_term_groups: Vec<Vec<String>>,
    term_strip: Vec<Regex>,
    term_strip_word: Vec<Regex>,
    common_words: HashSet<String>,
    location_identifiers: HashSet<String>,
    team_synonyms: Vec<Vec<String>>,
}

impl TeamMatcher {
    pub fn new(helper: &MatchingHelper) -> Self {
        let important_term_groups: Vec<Vec<String>> = helper
            .important_terms
            .iter()
            .map(|group| group.iter().map(|t| t.to_lowercase()).collect())
            .collect();

        let all_terms: Vec<&String> = important_term_groups.iter().flatten().collect();
        let term_strip = all_terms
            .iter()
            .map(|t| Regex::new(&format!("(?i){}", regex::escape(t))).unwrap())
            .collect();
        let term_strip_word = all_terms
            .iter()
            .map(|t| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(t))).unwrap())
            .collect();

        Self {
            important_term_groups,
            term_strip,
            term_strip_word,
            common_words: helper.common_team_words.iter().map(|w| w.to_lowercase()).collect(),
            location_identifiers: helper
                .location_identifiers
                .iter()
                .map(|w| w.to_lowercase())
                .collect(),
            team_synonyms: helper
                .team_synonyms
                .iter()
                .map(|group| group.iter().map(|t| t.to_lowercase()).collect())
                .collect(),
        }
    }

    /// Indices of the important-term groups whose terms occur in the text.
    /// The text must already be lowercased.
    pub fn term_groups_present(&self, text_lower: &str) -> BTreeSet<usize> {
        self.important_term_groups
            .iter()
            .enumerate()
            .filter(|(_, group)| group.iter().any(|term| text_lower.contains(term.as_str())))
            .map(|(i, _)| i)
            .collect()
    }

    /// Remove every important term (substring, case-insensitive) so string
    /// comparisons work on the part of the name that identifies the club.
    fn strip_important_terms(&self, name: &str) -> String {
        let mut out = name.to_string();
        for re in &self.term_strip {
            out = re.replace_all(&out, "").into_owned();
        }
        out
    }

    /// Remove important terms as whole words only; used for core names where
    /// "reserve" must not eat the "rese" in "Varese".
    fn strip_important_terms_words(&self, name: &str) -> String {
        let mut out = name.to_string();
        for re in &self.term_strip_word {
            out = re.replace_all(&out, "").into_owned();
        }
        out
    }

    /// Normalized name with Roman numerals, common team words, location
    /// identifiers and nationality suffixes removed.
    pub fn simplify(&self, name: &str) -> String {
        if name.is_empty() {
            return String::new();
        }
        let n = text::strip_roman_numerals(&text::normalize(name));
        let filtered: Vec<&str> = n
            .split_whitespace()
            .filter(|w| !self.common_words.contains(*w) && !self.location_identifiers.contains(*w))
            .collect();
        text::strip_nationality_suffix(&filtered.join(" "))
    }

    /// Core identifier of a team: simplified name with important terms gone.
    /// "America Mineiro U20" -> "america mineiro".
    pub fn core_name(&self, name: &str) -> String {
        if name.is_empty() {
            return String::new();
        }
        let simplified = self.simplify(name);
        text::collapse_whitespace(&self.strip_important_terms_words(&simplified))
    }

    /// Core name split into its word set plus the joined form.
    pub fn core_parts(&self, name: &str) -> CoreName {
        let joined = self.core_name(name);
        CoreName {
            words: joined.split_whitespace().map(|w| w.to_string()).collect(),
            joined,
        }
    }

    /// Words of the normalized name longer than 2 characters that are not
    /// common team words or location identifiers.
    pub fn significant_words(&self, name: &str) -> BTreeSet<String> {
        text::normalize(name)
            .split_whitespace()
            .filter(|w| {
                w.len() > 2
                    && !self.common_words.contains(*w)
                    && !self.location_identifiers.contains(*w)
            })
            .map(|w| w.to_string())
            .collect()
    }

    /// True when both normalized names contain a member of the same
    /// configured synonym group.
    pub fn synonyms_overlap(&self, t1: &str, t2: &str) -> bool {
        let n1 = text::normalize(t1);
        let n2 = text::normalize(t2);
        self.team_synonyms.iter().any(|group| {
            group.iter().any(|syn| n1.contains(syn.as_str()))
                && group.iter().any(|syn| n2.contains(syn.as_str()))
        })
    }

    /// Cross-source pairing score used by the fixture grouper: synonym hits
    /// are a certain match, otherwise the better of Jaccard on core words
    /// and the fuzzy ratio on the joined core names.
    pub fn score_cores(&self, a: &CoreName, b: &CoreName, synonym_hit: bool) -> f64 {
        if synonym_hit {
            return 1.0;
        }
        if a.joined.is_empty() || b.joined.is_empty() {
            return 0.0;
        }
        jaccard(&a.words, &b.words).max(similarity_ratio(&a.joined, &b.joined))
    }

    /// Decide whether two raw team names denote the same team. Returns true
    /// on the first check that succeeds.
    pub fn teams_match(&self, t1: &str, t2: &str) -> bool {
        if t1.is_empty() || t2.is_empty() {
            return false;
        }

        // Important-term presence gate: an under-21 side never matches the
        // senior side, a women's team never matches the men's.
        let groups1 = self.term_groups_present(&t1.to_lowercase());
        let groups2 = self.term_groups_present(&t2.to_lowercase());
        if groups1 != groups2 {
            return false;
        }

        // All string comparisons below run on term-stripped names.
        let comp1 = self.strip_important_terms(t1);
        let comp2 = self.strip_important_terms(t2);

        let n1 = text::normalize(&comp1);
        let n2 = text::normalize(&comp2);
        if n1 == n2 {
            return true;
        }

        let c1 = text::canonical(&comp1);
        let c2 = text::canonical(&comp2);
        if !c1.is_empty() && c1 == c2 {
            return true;
        }

        let p1 = text::phonetic(&comp1);
        let p2 = text::phonetic(&comp2);
        if !p1.is_empty() && p1 == p2 {
            return true;
        }

        if fuzzy_match(&n1, &n2, FUZZY_THRESHOLD) {
            return true;
        }
        if p1.chars().count() > 5 && p2.chars().count() > 5 && fuzzy_match(&p1, &p2, FUZZY_THRESHOLD)
        {
            return true;
        }

        // A single-word name may be an abbreviation of one of the words on
        // the other side.
        let w1: Vec<&str> = n1.split_whitespace().collect();
        let w2: Vec<&str> = n2.split_whitespace().collect();
        if w1.len() == 1 && w2.len() > 1 && self.single_word_hits(w1[0], &w2) {
            return true;
        }
        if w2.len() == 1 && w1.len() > 1 && self.single_word_hits(w2[0], &w1) {
            return true;
        }

        if (n1.chars().count() <= 5 || n2.chars().count() <= 5)
            && fuzzy_match(&n1, &n2, FUZZY_THRESHOLD)
        {
            return true;
        }

        if self.synonyms_overlap(t1, t2) {
            return true;
        }

        let s1 = self.simplify(&comp1);
        let s2 = self.simplify(&comp2);
        if !s1.is_empty() && !s2.is_empty() && (s1 == s2 || fuzzy_match(&s1, &s2, FUZZY_THRESHOLD)) {
            return true;
        }

        self.significant_word_overlap(&comp1, &comp2)
    }

    fn single_word_hits(&self, word: &str, others: &[&str]) -> bool {
        others.iter().any(|other| {
            fuzzy_match(word, other, FUZZY_THRESHOLD)
                || fuzzy_match(&text::phonetic(word), &text::phonetic(other), FUZZY_THRESHOLD)
        })
    }

    fn significant_word_overlap(&self, comp1: &str, comp2: &str) -> bool {
        let sig1 = self.significant_words(comp1);
        let sig2 = self.significant_words(comp2);
        if sig1.is_empty() || sig2.is_empty() {
            return false;
        }

        if sig1.len() == 1 && sig2.len() == 1 {
            let w1 = text::alnum_only(sig1.iter().next().unwrap());
            let w2 = text::alnum_only(sig2.iter().next().unwrap());
            if w1 == w2 || fuzzy_match(&w1, &w2, 0.8) {
                return true;
            }
            if text::phonetic(&w1) == text::phonetic(&w2) {
                return true;
            }
        }

        let norm1: BTreeSet<String> = sig1.iter().map(|w| text::alnum_only(w)).collect();
        let norm2: BTreeSet<String> = sig2.iter().map(|w| text::alnum_only(w)).collect();
        let shared = norm1.intersection(&norm2).count();
        if shared > 0 && shared as f64 / norm1.len().min(norm2.len()) as f64 > 0.5 {
            return true;
        }

        let ph1: BTreeSet<String> = sig1.iter().map(|w| text::phonetic(w)).collect();
        let ph2: BTreeSet<String> = sig2.iter().map(|w| text::phonetic(w)).collect();
        let shared_ph = ph1.intersection(&ph2).count();
        shared_ph > 0 && shared_ph as f64 / ph1.len().min(ph2.len()) as f64 > 0.5
    }
}
