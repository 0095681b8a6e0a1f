pub mod activity;
pub mod arbitrage;
pub mod confirm;
pub mod dedupe;
pub mod ev;
pub mod fair_odds;
pub mod lifecycle;

use crate::source::MatchRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Round to four decimals; all emitted odds and margins use this.
pub fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// A winning per-outcome pick: the best odd and the book offering it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsPick {
    pub value: f64,
    pub source: String,
}

/// Identifying metadata of one source's record, carried on opportunities so
/// downstream consumers can locate the match at that book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tournament_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tournament_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_url: Option<String>,
}

impl SourceRef {
    pub fn from_record(record: &MatchRecord, match_url: Option<String>) -> Self {
        Self {
            country_name: record.country_name.clone(),
            tournament_name: record.tournament_name.clone(),
            tournament_id: record.tournament_id.clone(),
            match_id: record.match_id.clone(),
            match_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbOpportunity {
    pub complementary_set: String,
    pub best_odds: BTreeMap<String, OddsPick>,
    pub arbitrage_percentage: f64,
    /// Comma-joined sorted list of the books forming the arbitrage.
    pub arbitrage_sources: String,
    pub unique_id: String,
    pub sources: BTreeMap<String, SourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_duration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvOpportunity {
    pub source: String,
    pub odd_name: String,
    pub overpriced_odd_value: f64,
    pub fair_odd_value: f64,
    pub overprice: f64,
    pub unique_id: String,
    pub source_info: SourceRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_duration: Option<String>,
}

/// Either kind of pricing opportunity. Serialized untagged: the field set
/// tells the two apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Opportunity {
    Arb(ArbOpportunity),
    Ev(EvOpportunity),
}

impl Opportunity {
    pub fn unique_id(&self) -> &str {
        match self {
            Opportunity::Arb(o) => &o.unique_id,
            Opportunity::Ev(o) => &o.unique_id,
        }
    }

    /// Books whose odds the opportunity depends on.
    pub fn involved_sources(&self) -> Vec<String> {
        match self {
            Opportunity::Arb(o) => {
                o.arbitrage_sources.split(", ").map(|s| s.to_string()).collect()
            }
            Opportunity::Ev(o) => vec![o.source.clone()],
        }
    }

    pub fn attach_group(&mut self, group_id: &str, home_team: &str, away_team: &str) {
        let (gid, home, away) = (
            Some(group_id.to_string()),
            Some(home_team.to_string()),
            Some(away_team.to_string()),
        );
        match self {
            Opportunity::Arb(o) => {
                o.group_id = gid;
                o.home_team = home;
                o.away_team = away;
            }
            Opportunity::Ev(o) => {
                o.group_id = gid;
                o.home_team = home;
                o.away_team = away;
            }
        }
    }

    pub fn set_activity_duration(&mut self, duration: String) {
        match self {
            Opportunity::Arb(o) => o.activity_duration = Some(duration),
            Opportunity::Ev(o) => o.activity_duration = Some(duration),
        }
    }

    /// Margin over the break-even line, as a percentage.
    pub fn margin_pct(&self) -> f64 {
        match self {
            Opportunity::Arb(o) => (1.0 - o.arbitrage_percentage) * 100.0,
            Opportunity::Ev(o) => o.overprice * 100.0,
        }
    }
}

/// Per-country output unit: one matched fixture and the opportunities
/// found on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupReport {
    pub group_id: String,
    pub home_team: String,
    pub away_team: String,
    pub date: String,
    pub time: String,
    pub country: String,
    pub all_sources: Vec<String>,
    pub opportunities: Vec<Opportunity>,
}

/// Representative country label for a matched group: the shortest valid
/// label across the records, falling back to the first available, then
/// "unknown".
pub fn group_country(records: &[&MatchRecord]) -> String {
    let valid: Vec<&str> = records
        .iter()
        .filter_map(|r| r.country_name.as_deref())
        .map(str::trim)
        .filter(|c| !c.is_empty() && !matches!(c.to_lowercase().as_str(), "null" | "unknown"))
        .collect();
    if let Some(shortest) = valid.iter().min_by_key(|c| c.len()) {
        return shortest.to_string();
    }
    records
        .iter()
        .find_map(|r| r.country_name.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.75301234), 0.753);
        assert_eq!(round4(1.0263157), 1.0263);
        assert_eq!(round4(2.0), 2.0);
    }

    #[test]
    fn test_opportunity_untagged_roundtrip() {
        let arb = Opportunity::Arb(ArbOpportunity {
            complementary_set: "three_way".into(),
            best_odds: BTreeMap::new(),
            arbitrage_percentage: 0.953,
            arbitrage_sources: "alpha, beta".into(),
            unique_id: "a1-b1".into(),
            sources: BTreeMap::new(),
            group_id: None,
            home_team: None,
            away_team: None,
            activity_duration: None,
        });
        let json = serde_json::to_string(&arb).unwrap();
        let back: Opportunity = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, Opportunity::Arb(_)));

        let ev = Opportunity::Ev(EvOpportunity {
            source: "gamma".into(),
            odd_name: "over_2.5_odd".into(),
            overpriced_odd_value: 2.2,
            fair_odd_value: 2.0526,
            overprice: 0.0718,
            unique_id: "48213-over_2.5_odd".into(),
            source_info: SourceRef::default(),
            group_id: None,
            home_team: None,
            away_team: None,
            activity_duration: None,
        });
        let json = serde_json::to_string(&ev).unwrap();
        let back: Opportunity = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, Opportunity::Ev(_)));
    }

    #[test]
    fn test_involved_sources() {
        let arb = Opportunity::Arb(ArbOpportunity {
            complementary_set: "three_way".into(),
            best_odds: BTreeMap::new(),
            arbitrage_percentage: 0.95,
            arbitrage_sources: "alpha, beta, gamma".into(),
            unique_id: "x".into(),
            sources: BTreeMap::new(),
            group_id: None,
            home_team: None,
            away_team: None,
            activity_duration: None,
        });
        assert_eq!(arb.involved_sources(), vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_group_country_picks_shortest_valid() {
        let mk = |country: Option<&str>| MatchRecord {
            country_name: country.map(|c| c.to_string()),
            ..Default::default()
        };
        let a = mk(Some("England Premier League"));
        let b = mk(Some("England"));
        let c = mk(Some("unknown"));
        let records: Vec<&MatchRecord> = vec![&a, &b, &c];
        assert_eq!(group_country(&records), "England");

        let d = mk(Some("unknown"));
        let records: Vec<&MatchRecord> = vec![&d];
        assert_eq!(group_country(&records), "unknown");

        let e = mk(None);
        let records: Vec<&MatchRecord> = vec![&e];
        assert_eq!(group_country(&records), "unknown");
    }
}
