use crate::matching::teams::{CoreName, TeamMatcher};
use crate::source::MatchRecord;
use crate::text;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Thresholds steering the fuzzy grouping pass. `strong` and `moderate` are
/// parallel vectors: a pair of team scores passes when some index satisfies
/// either arrangement of (strong, moderate).
#[derive(Debug, Clone)]
pub struct GroupingParams {
    pub strong_threshold: Vec<f64>,
    pub moderate_threshold: Vec<f64>,
    pub gatekeeper_threshold: f64,
    pub time_diff_tolerance: i64,
    pub day_diff_tolerance: i64,
}

/// Records from distinct sources judged to describe the same fixture.
#[derive(Debug, Clone)]
pub struct MatchGroup<'a> {
    pub id: String,
    pub records: Vec<&'a MatchRecord>,
}

impl<'a> MatchGroup<'a> {
    /// Record lookup by source name.
    pub fn by_source(&self) -> BTreeMap<&str, &'a MatchRecord> {
        self.records.iter().map(|r| (r.source.as_str(), *r)).collect()
    }
}

const DATE_FORMATS: [&str; 5] = ["%d/%m/%Y", "%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y", "%d.%m.%Y"];

/// Parse a record date; several civil formats are accepted, day-first wins
/// for ambiguous inputs.
pub fn parse_record_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Parse "HH:MM" into minutes since midnight.
pub fn parse_record_time(s: &str) -> Option<i64> {
    let (h, m) = s.trim().split_once(':')?;
    let h: i64 = h.parse().ok()?;
    let m: i64 = m.parse().ok()?;
    if (0..24).contains(&h) && (0..60).contains(&m) {
        Some(h * 60 + m)
    } else {
        None
    }
}

/// Stable group identifier: member match ids sorted by length descending
/// then lexicographically, joined with '-'.
fn group_id(records: &[&MatchRecord]) -> String {
    let mut ids: Vec<String> = records
        .iter()
        .map(|r| r.match_id.clone().unwrap_or_else(|| "none".to_string()))
        .collect();
    ids.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    ids.join("-")
}

struct Enriched<'a> {
    rec: &'a MatchRecord,
    date: Option<NaiveDate>,
    minutes: Option<i64>,
    time_raw: String,
    term_groups: BTreeSet<usize>,
    core_home: CoreName,
    core_away: CoreName,
}

impl<'a> Enriched<'a> {
    fn new(rec: &'a MatchRecord, matcher: &TeamMatcher) -> Self {
        let combined = format!("{} {}", rec.home_team, rec.away_team).to_lowercase();
        Self {
            rec,
            date: parse_record_date(&rec.date),
            minutes: parse_record_time(&rec.time),
            time_raw: rec.time.trim().to_string(),
            term_groups: matcher.term_groups_present(&combined),
            core_home: matcher.core_parts(&rec.home_team),
            core_away: matcher.core_parts(&rec.away_team),
        }
    }
}

/// Group fixtures across sources. Two passes: an exact-signature pass on
/// (normalized home, normalized away, date, time), then a fuzzy pass that
/// pairs each remaining record with at most one best candidate per other
/// source. Records that never join a group are dropped from analysis.
pub fn group_fixtures<'a>(
    by_source: &'a BTreeMap<String, Vec<MatchRecord>>,
    matcher: &TeamMatcher,
    params: &GroupingParams,
) -> Vec<MatchGroup<'a>> {
    let sources: Vec<&String> = by_source.keys().collect();
    let enriched: Vec<Vec<Enriched<'a>>> = sources
        .iter()
        .map(|src| by_source[*src].iter().map(|r| Enriched::new(r, matcher)).collect())
        .collect();

    let mut processed: Vec<Vec<bool>> = enriched.iter().map(|v| vec![false; v.len()]).collect();
    let mut groups: Vec<MatchGroup<'a>> = Vec::new();

    // Exact-signature pass across all sources.
    let mut buckets: HashMap<(String, String, String, String), Vec<(usize, usize)>> =
        HashMap::new();
    let mut bucket_order: Vec<(String, String, String, String)> = Vec::new();
    for (si, recs) in enriched.iter().enumerate() {
        for (ri, e) in recs.iter().enumerate() {
            let key = (
                text::normalize(&e.rec.home_team),
                text::normalize(&e.rec.away_team),
                e.rec.date.trim().to_string(),
                e.time_raw.clone(),
            );
            let entry = buckets.entry(key.clone()).or_default();
            if entry.is_empty() {
                bucket_order.push(key);
            }
            entry.push((si, ri));
        }
    }
    for key in &bucket_order {
        let members = &buckets[key];
        let distinct: BTreeSet<usize> = members.iter().map(|(si, _)| *si).collect();
        if distinct.len() < 2 {
            continue;
        }
        // One record per source: keep the first seen, consume the rest.
        let mut taken: BTreeSet<usize> = BTreeSet::new();
        let mut records: Vec<&MatchRecord> = Vec::new();
        for &(si, ri) in members {
            processed[si][ri] = true;
            if taken.insert(si) {
                records.push(enriched[si][ri].rec);
            }
        }
        groups.push(MatchGroup { id: group_id(&records), records });
    }

    // Fuzzy pass: each unprocessed record seeds a group and claims the best
    // surviving candidate from every other source.
    for s1 in 0..sources.len() {
        for i1 in 0..enriched[s1].len() {
            if processed[s1][i1] {
                continue;
            }
            processed[s1][i1] = true;
            let base = &enriched[s1][i1];
            let mut members: Vec<(usize, usize)> = vec![(s1, i1)];

            for s2 in 0..sources.len() {
                if s2 == s1 {
                    continue;
                }
                let mut best: Option<(usize, f64)> = None;
                for (i2, cand) in enriched[s2].iter().enumerate() {
                    if processed[s2][i2] {
                        continue;
                    }
                    if let Some(score) = pair_score(base, cand, matcher, params) {
                        if best.map_or(true, |(_, s)| score > s) {
                            best = Some((i2, score));
                        }
                    }
                }
                if let Some((i2, _)) = best {
                    processed[s2][i2] = true;
                    members.push((s2, i2));
                }
            }

            if members.len() > 1 {
                let records: Vec<&MatchRecord> =
                    members.iter().map(|&(si, ri)| enriched[si][ri].rec).collect();
                groups.push(MatchGroup { id: group_id(&records), records });
            }
        }
    }

    groups
}

/// Mean team score for a candidate pair, or None when any grouping
/// constraint fails.
fn pair_score(
    a: &Enriched,
    b: &Enriched,
    matcher: &TeamMatcher,
    params: &GroupingParams,
) -> Option<f64> {
    let (d1, d2) = (a.date?, b.date?);
    if (d1 - d2).num_days().abs() > params.day_diff_tolerance {
        return None;
    }

    match (a.minutes, b.minutes) {
        (Some(m1), Some(m2)) => {
            if (m1 - m2).abs() > params.time_diff_tolerance {
                return None;
            }
        }
        // Unparseable wall times fall back to strict string equality.
        _ => {
            if a.time_raw != b.time_raw {
                return None;
            }
        }
    }

    if a.term_groups != b.term_groups {
        return None;
    }

    let home_syn = matcher.synonyms_overlap(&a.rec.home_team, &b.rec.home_team);
    let away_syn = matcher.synonyms_overlap(&a.rec.away_team, &b.rec.away_team);
    let home_score = matcher.score_cores(&a.core_home, &b.core_home, home_syn);
    let away_score = matcher.score_cores(&a.core_away, &b.core_away, away_syn);

    if home_score.min(away_score) < params.gatekeeper_threshold {
        return None;
    }

    let passed = params
        .strong_threshold
        .iter()
        .zip(params.moderate_threshold.iter())
        .any(|(&strong, &moderate)| {
            (home_score >= strong && away_score >= moderate)
                || (away_score >= strong && home_score >= moderate)
        });
    if !passed {
        return None;
    }

    Some((home_score + away_score) / 2.0)
}
