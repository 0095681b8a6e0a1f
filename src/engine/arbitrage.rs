use super::{group_country, round4, ArbOpportunity, GroupReport, OddsPick, Opportunity, SourceRef};
use crate::matching::grouper::MatchGroup;
use crate::source::MatchRecord;
use crate::url_builder::UrlBuilder;
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};

/// Per-group arbitrage analysis: pick the best odd per outcome across all
/// books, evaluate every configured market set, emit the single best
/// profitable combination.
pub struct ArbAnalyzer<'a> {
    pub market_sets: &'a IndexMap<String, Vec<String>>,
    pub urls: &'a UrlBuilder,
}

struct Pick<'a> {
    value: f64,
    record: &'a MatchRecord,
}

impl<'a> ArbAnalyzer<'a> {
    pub fn new(market_sets: &'a IndexMap<String, Vec<String>>, urls: &'a UrlBuilder) -> Self {
        Self { market_sets, urls }
    }

    /// Best odd for one outcome across the group, input order breaking ties
    /// (strictly-greater wins keep the first book seen).
    fn pick_best<'g>(&self, records: &[&'g MatchRecord], outcome: &str) -> Option<Pick<'g>> {
        let mut best: Option<Pick<'g>> = None;
        for &record in records {
            if let Some(value) = record.odd(outcome) {
                if best.as_ref().map_or(true, |b| value > b.value) {
                    best = Some(Pick { value, record });
                }
            }
        }
        best
    }

    pub fn analyze(&self, group: &MatchGroup) -> Option<GroupReport> {
        if group.records.len() < 2 {
            return None;
        }

        let mut best_opportunity: Option<ArbOpportunity> = None;
        let mut best_arb = 1.0;

        for (set_name, outcomes) in self.market_sets {
            // Skip the set when some outcome is blank in every record.
            if outcomes
                .iter()
                .any(|o| group.records.iter().all(|r| !r.has_outcome(o)))
            {
                continue;
            }

            let picks: Vec<(&String, Pick)> = outcomes
                .iter()
                .filter_map(|o| self.pick_best(&group.records, o).map(|p| (o, p)))
                .collect();
            if picks.len() != outcomes.len() {
                continue;
            }

            let winning_sources: BTreeSet<&str> =
                picks.iter().map(|(_, p)| p.record.source.as_str()).collect();
            if winning_sources.len() < 2 {
                continue;
            }

            let arb: f64 = picks.iter().map(|(_, p)| 1.0 / p.value).sum();
            if arb >= 1.0 || arb >= best_arb {
                continue;
            }

            let best_odds: BTreeMap<String, OddsPick> = picks
                .iter()
                .map(|(outcome, p)| {
                    ((*outcome).clone(), OddsPick { value: p.value, source: p.record.source.clone() })
                })
                .collect();

            let mut match_ids: Vec<String> = picks
                .iter()
                .filter_map(|(_, p)| p.record.match_id.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            match_ids.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

            let mut sources: BTreeMap<String, SourceRef> = BTreeMap::new();
            for (_, pick) in &picks {
                let source = &pick.record.source;
                if !sources.contains_key(source) {
                    let url = self.urls.build(source, pick.record);
                    sources.insert(source.clone(), SourceRef::from_record(pick.record, url));
                }
            }

            best_arb = arb;
            best_opportunity = Some(ArbOpportunity {
                complementary_set: set_name.clone(),
                best_odds,
                arbitrage_percentage: round4(arb),
                arbitrage_sources: winning_sources
                    .iter()
                    .copied()
                    .collect::<Vec<_>>()
                    .join(", "),
                unique_id: match_ids.join("-"),
                sources,
                group_id: None,
                home_team: None,
                away_team: None,
                activity_duration: None,
            });
        }

        let opportunity = best_opportunity?;
        tracing::debug!(
            set = %opportunity.complementary_set,
            arb = opportunity.arbitrage_percentage,
            sources = %opportunity.arbitrage_sources,
            "arbitrage found"
        );
        Some(build_report(group, vec![Opportunity::Arb(opportunity)]))
    }
}

/// Group header for the per-country output: the most detailed team names,
/// the first record's schedule, the shortest valid country label.
fn build_report(group: &MatchGroup, opportunities: Vec<Opportunity>) -> GroupReport {
    let longest = |pick: fn(&MatchRecord) -> &str| {
        group
            .records
            .iter()
            .map(|&r| pick(r))
            .filter(|s| !s.is_empty())
            .max_by_key(|s| s.len())
            .unwrap_or("")
            .to_string()
    };
    let first = group.records[0];
    let mut all_sources: Vec<String> =
        group.records.iter().map(|r| r.source.clone()).collect();
    all_sources.sort();

    GroupReport {
        group_id: group.id.clone(),
        home_team: longest(|r| &r.home_team),
        away_team: longest(|r| &r.away_team),
        date: first.date.clone(),
        time: first.time.clone(),
        country: group_country(&group.records),
        all_sources,
        opportunities,
    }
}
