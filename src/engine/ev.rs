use super::{fair_odds, round4, EvOpportunity, GroupReport, Opportunity, SourceRef};
use crate::config::{EvMethod, EvSettings};
use crate::matching::grouper::MatchGroup;
use crate::source::MatchRecord;
use crate::url_builder::UrlBuilder;
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Fair odds for one market set under the configured sharping method.
pub fn fair_for_market(
    settings: &EvSettings,
    market_set: &[String],
    by_source: &BTreeMap<&str, &MatchRecord>,
) -> Option<BTreeMap<String, f64>> {
    match settings.method {
        EvMethod::OneSharp => {
            let sharp = by_source.get(settings.sharp_source.as_str())?;
            fair_odds::one_sharp(market_set, sharp)
        }
        EvMethod::MultiSharp => {
            fair_odds::multi_sharp(market_set, by_source, &settings.sharp_group)
        }
    }
}

/// Per-group +EV analysis: infer fair odds from the sharp side, then flag
/// every target-book outcome priced above them by at least the configured
/// overprice.
pub struct EvAnalyzer<'a> {
    pub settings: &'a EvSettings,
    pub market_sets: &'a IndexMap<String, Vec<String>>,
    pub urls: &'a UrlBuilder,
}

impl<'a> EvAnalyzer<'a> {
    pub fn new(
        settings: &'a EvSettings,
        market_sets: &'a IndexMap<String, Vec<String>>,
        urls: &'a UrlBuilder,
    ) -> Self {
        Self { settings, market_sets, urls }
    }

    /// Fair odds for one market set under the configured method.
    pub fn fair_for_market(
        &self,
        market_set: &[String],
        by_source: &BTreeMap<&str, &MatchRecord>,
    ) -> Option<BTreeMap<String, f64>> {
        fair_for_market(self.settings, market_set, by_source)
    }

    pub fn analyze(&self, group: &MatchGroup) -> Option<GroupReport> {
        let by_source = group.by_source();
        let target = *by_source.get(self.settings.target_source.as_str())?;

        match self.settings.method {
            EvMethod::OneSharp => {
                by_source.get(self.settings.sharp_source.as_str())?;
            }
            EvMethod::MultiSharp => {
                if !self
                    .settings
                    .sharp_group
                    .iter()
                    .any(|s| by_source.contains_key(s.as_str()))
                {
                    return None;
                }
            }
        }

        let (lo, hi) = self.settings.odds_interval;
        let mut opportunities = Vec::new();

        for outcomes in self.market_sets.values() {
            let Some(fair) = self.fair_for_market(outcomes, &by_source) else {
                continue;
            };
            for outcome in outcomes {
                let Some(&fair_value) = fair.get(outcome) else { continue };
                if fair_value < lo || fair_value > hi {
                    continue;
                }
                let Some(target_odd) = target.odd(outcome) else { continue };
                if target_odd <= fair_value {
                    continue;
                }
                let overprice = target_odd / fair_value - 1.0;
                if overprice < self.settings.min_overprice {
                    continue;
                }

                let match_id = target.match_id.as_deref().unwrap_or("none");
                let url = self.urls.build(&self.settings.target_source, target);
                opportunities.push(Opportunity::Ev(EvOpportunity {
                    source: self.settings.target_source.clone(),
                    odd_name: outcome.clone(),
                    overpriced_odd_value: target_odd,
                    fair_odd_value: round4(fair_value),
                    overprice: round4(overprice),
                    unique_id: format!("{match_id}-{outcome}"),
                    source_info: SourceRef::from_record(target, url),
                    group_id: None,
                    home_team: None,
                    away_team: None,
                    activity_duration: None,
                }));
            }
        }

        if opportunities.is_empty() {
            return None;
        }

        let country = target
            .country_name
            .clone()
            .or_else(|| group.records.first().and_then(|r| r.country_name.clone()))
            .unwrap_or_else(|| "unknown".to_string());
        let mut all_sources: Vec<String> =
            group.records.iter().map(|r| r.source.clone()).collect();
        all_sources.sort();

        Some(GroupReport {
            group_id: group.id.clone(),
            home_team: target.home_team.clone(),
            away_team: target.away_team.clone(),
            date: target.date.clone(),
            time: target.time.clone(),
            country,
            all_sources,
            opportunities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn record(source: &str, id: &str, odds: &[(&str, f64)]) -> MatchRecord {
        MatchRecord {
            source: source.to_string(),
            match_id: Some(id.to_string()),
            home_team: "Arsenal".to_string(),
            away_team: "Chelsea".to_string(),
            date: "07/03/2026".to_string(),
            time: "18:30".to_string(),
            country_name: Some("england".to_string()),
            odds: odds.iter().map(|(k, v)| (k.to_string(), json!(v))).collect(),
            ..Default::default()
        }
    }

    fn settings() -> EvSettings {
        EvSettings {
            method: EvMethod::OneSharp,
            sharp_source: "sharp".to_string(),
            sharp_group: vec![],
            target_source: "soft".to_string(),
            output_directory: "out".into(),
            odds_interval: (1.0, 10.0),
            min_overprice: 0.02,
            overprice_source_logging: false,
            appearance_investigation: false,
            double_check: false,
            investigation_timeout_minutes: 5,
        }
    }

    fn over_under() -> IndexMap<String, Vec<String>> {
        IndexMap::from([(
            "over_under_2.5".to_string(),
            vec!["under_2.5_odd".to_string(), "over_2.5_odd".to_string()],
        )])
    }

    fn group<'a>(records: &'a [MatchRecord]) -> MatchGroup<'a> {
        MatchGroup { id: "g1".to_string(), records: records.iter().collect() }
    }

    #[test]
    fn test_overpriced_outcome_emitted() {
        let records = vec![
            record("sharp", "s1", &[("under_2.5_odd", 1.90), ("over_2.5_odd", 2.00)]),
            record("soft", "t1", &[("under_2.5_odd", 1.85), ("over_2.5_odd", 2.20)]),
        ];
        let cfg = settings();
        let markets = over_under();
        let urls = UrlBuilder::disabled();
        let report = EvAnalyzer::new(&cfg, &markets, &urls).analyze(&group(&records)).unwrap();

        assert_eq!(report.opportunities.len(), 1);
        let Opportunity::Ev(opp) = &report.opportunities[0] else { panic!("expected ev") };
        assert_eq!(opp.odd_name, "over_2.5_odd");
        // fair over = 2.0 * (1/1.9 + 1/2) = 2.0526; overprice = 2.2/2.0526 - 1
        assert_relative_eq!(opp.fair_odd_value, 2.0526, epsilon = 1e-4);
        assert_relative_eq!(opp.overprice, 0.0718, epsilon = 1e-4);
        assert_eq!(opp.unique_id, "t1-over_2.5_odd");
        assert_eq!(report.all_sources, vec!["sharp", "soft"]);
    }

    #[test]
    fn test_below_min_overprice_rejected() {
        let records = vec![
            record("sharp", "s1", &[("under_2.5_odd", 1.90), ("over_2.5_odd", 2.00)]),
            record("soft", "t1", &[("under_2.5_odd", 1.85), ("over_2.5_odd", 2.06)]),
        ];
        let cfg = settings();
        let markets = over_under();
        let urls = UrlBuilder::disabled();
        // overprice = 2.06/2.0526 - 1 = 0.0036 < 0.02
        assert!(EvAnalyzer::new(&cfg, &markets, &urls).analyze(&group(&records)).is_none());
    }

    #[test]
    fn test_fair_outside_interval_rejected() {
        let mut cfg = settings();
        cfg.odds_interval = (1.0, 2.0);
        let records = vec![
            record("sharp", "s1", &[("under_2.5_odd", 1.90), ("over_2.5_odd", 2.00)]),
            record("soft", "t1", &[("over_2.5_odd", 2.40)]),
        ];
        let markets = over_under();
        let urls = UrlBuilder::disabled();
        // fair over = 2.0526 > hi
        assert!(EvAnalyzer::new(&cfg, &markets, &urls).analyze(&group(&records)).is_none());
    }

    #[test]
    fn test_target_missing_from_group() {
        let records =
            vec![record("sharp", "s1", &[("under_2.5_odd", 1.90), ("over_2.5_odd", 2.00)])];
        let cfg = settings();
        let markets = over_under();
        let urls = UrlBuilder::disabled();
        assert!(EvAnalyzer::new(&cfg, &markets, &urls).analyze(&group(&records)).is_none());
    }

    #[test]
    fn test_multi_sharp_method() {
        let mut cfg = settings();
        cfg.method = EvMethod::MultiSharp;
        cfg.sharp_group = vec!["sharp_a".to_string(), "sharp_b".to_string()];
        let records = vec![
            record("sharp_a", "s1", &[("under_2.5_odd", 1.80), ("over_2.5_odd", 2.00)]),
            record("sharp_b", "s2", &[("under_2.5_odd", 2.00), ("over_2.5_odd", 2.00)]),
            record("soft", "t1", &[("over_2.5_odd", 2.20)]),
        ];
        let markets = over_under();
        let urls = UrlBuilder::disabled();
        let report = EvAnalyzer::new(&cfg, &markets, &urls).analyze(&group(&records)).unwrap();
        let Opportunity::Ev(opp) = &report.opportunities[0] else { panic!("expected ev") };
        assert_relative_eq!(opp.fair_odd_value, 2.0526, epsilon = 1e-4);
    }

    #[test]
    fn test_under_target_odds_never_flagged() {
        let records = vec![
            record("sharp", "s1", &[("under_2.5_odd", 1.90), ("over_2.5_odd", 2.00)]),
            record("soft", "t1", &[("under_2.5_odd", 1.60), ("over_2.5_odd", 1.95)]),
        ];
        let cfg = settings();
        let markets = over_under();
        let urls = UrlBuilder::disabled();
        assert!(EvAnalyzer::new(&cfg, &markets, &urls).analyze(&group(&records)).is_none());
    }
}
