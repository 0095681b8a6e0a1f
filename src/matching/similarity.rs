use std::collections::BTreeSet;

/// Default threshold for fuzzy name comparisons.
pub const FUZZY_THRESHOLD: f64 = 0.5;

/// Similarity ratio in [0, 1] between two strings, computed as
/// `2 * LCS(a, b) / (|a| + |b|)` over characters. Equal strings score 1.0,
/// disjoint strings 0.0.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let lcs = lcs_length(&a_chars, &b_chars);
    (2.0 * lcs as f64) / (a_chars.len() + b_chars.len()) as f64
}

/// Longest common subsequence length, single-row dynamic programming.
fn lcs_length(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut prev_diag = 0;
        for (j, &cb) in b.iter().enumerate() {
            let cur = row[j + 1];
            row[j + 1] = if ca == cb {
                prev_diag + 1
            } else {
                row[j + 1].max(row[j])
            };
            prev_diag = cur;
        }
    }
    row[b.len()]
}

/// True when the case-folded similarity ratio reaches the threshold.
pub fn fuzzy_match(a: &str, b: &str, threshold: f64) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    similarity_ratio(&a.to_lowercase(), &b.to_lowercase()) >= threshold
}

/// Jaccard index of two word sets.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ratio_bounds() {
        assert_relative_eq!(similarity_ratio("liverpool", "liverpool"), 1.0);
        assert_relative_eq!(similarity_ratio("abc", "xyz"), 0.0);
        assert_relative_eq!(similarity_ratio("", ""), 1.0);
        assert_relative_eq!(similarity_ratio("abc", ""), 0.0);
    }

    #[test]
    fn test_ratio_subsequence() {
        // "man utd" is a full subsequence of "manchester united"
        let r = similarity_ratio("manchester united", "man utd");
        assert_relative_eq!(r, 14.0 / 24.0, epsilon = 1e-9);
        assert!(r >= FUZZY_THRESHOLD);
    }

    #[test]
    fn test_ratio_symmetric() {
        let pairs = [("kristianstad", "kristianstads"), ("inter", "internazionale")];
        for (a, b) in pairs {
            assert_relative_eq!(similarity_ratio(a, b), similarity_ratio(b, a));
        }
    }

    #[test]
    fn test_fuzzy_match_case_folds() {
        assert!(fuzzy_match("Liverpool", "liverpool", FUZZY_THRESHOLD));
        assert!(!fuzzy_match("", "liverpool", FUZZY_THRESHOLD));
        assert!(fuzzy_match("kristianstad", "kristianstads", 0.8));
    }

    #[test]
    fn test_jaccard() {
        let a: BTreeSet<String> = ["america", "mineiro"].iter().map(|s| s.to_string()).collect();
        let b: BTreeSet<String> = ["america", "mg"].iter().map(|s| s.to_string()).collect();
        assert_relative_eq!(jaccard(&a, &b), 1.0 / 3.0);
        let empty = BTreeSet::new();
        assert_relative_eq!(jaccard(&empty, &empty), 0.0);
    }
}
