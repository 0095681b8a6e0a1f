use super::{GroupReport, Opportunity};
use std::collections::HashSet;

/// Signature identifying an opportunity regardless of which group emitted
/// it. Odds are compared by bit pattern; they come straight from the same
/// parse, so equal picks are bit-equal.
#[derive(Hash, PartialEq, Eq)]
enum Signature {
    Arb(String, u64, String),
    Ev(String, String, u64, u64),
}

fn signature(opportunity: &Opportunity) -> Signature {
    match opportunity {
        Opportunity::Arb(o) => Signature::Arb(
            o.complementary_set.clone(),
            o.arbitrage_percentage.to_bits(),
            o.arbitrage_sources.clone(),
        ),
        Opportunity::Ev(o) => Signature::Ev(
            o.source.clone(),
            o.odd_name.clone(),
            o.overpriced_odd_value.to_bits(),
            o.fair_odd_value.to_bits(),
        ),
    }
}

/// Drop opportunities that restate the same underlying event+market across
/// a country's groups, keeping the first occurrence. Surviving opportunities
/// are re-sorted within their group (arbitrage ascending by percentage, +EV
/// descending by overprice) and emptied groups are removed. Returns how
/// many duplicates were dropped.
pub fn dedupe_country_groups(groups: &mut Vec<GroupReport>) -> usize {
    let mut seen: HashSet<Signature> = HashSet::new();
    let mut removed = 0;

    for group in groups.iter_mut() {
        group.opportunities.retain(|opp| {
            if seen.insert(signature(opp)) {
                true
            } else {
                removed += 1;
                false
            }
        });
        group.opportunities.sort_by(|a, b| {
            let (ka, kb) = match (a, b) {
                (Opportunity::Arb(x), Opportunity::Arb(y)) => {
                    (x.arbitrage_percentage, y.arbitrage_percentage)
                }
                // Higher overprice first.
                (Opportunity::Ev(x), Opportunity::Ev(y)) => (y.overprice, x.overprice),
                _ => return std::cmp::Ordering::Equal,
            };
            ka.partial_cmp(&kb).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    groups.retain(|g| !g.opportunities.is_empty());
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ArbOpportunity, EvOpportunity, SourceRef};
    use std::collections::BTreeMap;

    fn arb_opp(set: &str, pct: f64) -> Opportunity {
        Opportunity::Arb(ArbOpportunity {
            complementary_set: set.to_string(),
            best_odds: BTreeMap::new(),
            arbitrage_percentage: pct,
            arbitrage_sources: "alpha, beta".to_string(),
            unique_id: format!("{set}-{pct}"),
            sources: BTreeMap::new(),
            group_id: None,
            home_team: None,
            away_team: None,
            activity_duration: None,
        })
    }

    fn ev_opp(odd: &str, overprice: f64) -> Opportunity {
        Opportunity::Ev(EvOpportunity {
            source: "soft".to_string(),
            odd_name: odd.to_string(),
            overpriced_odd_value: 2.2,
            fair_odd_value: 2.0,
            overprice,
            unique_id: format!("x-{odd}"),
            source_info: SourceRef::default(),
            group_id: None,
            home_team: None,
            away_team: None,
            activity_duration: None,
        })
    }

    fn group(id: &str, opportunities: Vec<Opportunity>) -> GroupReport {
        GroupReport {
            group_id: id.to_string(),
            home_team: "A".to_string(),
            away_team: "B".to_string(),
            date: "07/03/2026".to_string(),
            time: "18:30".to_string(),
            country: "england".to_string(),
            all_sources: vec!["alpha".to_string(), "beta".to_string()],
            opportunities,
        }
    }

    #[test]
    fn test_duplicates_across_groups_removed() {
        let mut groups = vec![
            group("g1", vec![arb_opp("three_way", 0.95)]),
            group("g2", vec![arb_opp("three_way", 0.95)]),
        ];
        let removed = dedupe_country_groups(&mut groups);
        assert_eq!(removed, 1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group_id, "g1");
    }

    #[test]
    fn test_distinct_opportunities_survive() {
        let mut groups = vec![
            group("g1", vec![arb_opp("three_way", 0.95)]),
            group("g2", vec![arb_opp("three_way", 0.93)]),
        ];
        assert_eq!(dedupe_country_groups(&mut groups), 0);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_arb_sorted_ascending_ev_descending() {
        let mut groups = vec![group(
            "g1",
            vec![arb_opp("a", 0.97), arb_opp("b", 0.93), arb_opp("c", 0.95)],
        )];
        dedupe_country_groups(&mut groups);
        let pcts: Vec<f64> = groups[0]
            .opportunities
            .iter()
            .map(|o| match o {
                Opportunity::Arb(a) => a.arbitrage_percentage,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(pcts, vec![0.93, 0.95, 0.97]);

        let mut groups = vec![group(
            "g1",
            vec![ev_opp("a_odd", 0.03), ev_opp("b_odd", 0.09), ev_opp("c_odd", 0.05)],
        )];
        dedupe_country_groups(&mut groups);
        let overs: Vec<f64> = groups[0]
            .opportunities
            .iter()
            .map(|o| match o {
                Opportunity::Ev(e) => e.overprice,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(overs, vec![0.09, 0.05, 0.03]);
    }

    #[test]
    fn test_dedupe_idempotent() {
        let mut groups = vec![
            group("g1", vec![arb_opp("three_way", 0.95), arb_opp("ou", 0.96)]),
            group("g2", vec![arb_opp("three_way", 0.95)]),
        ];
        dedupe_country_groups(&mut groups);
        let snapshot = serde_json::to_string(&groups).unwrap();
        let removed = dedupe_country_groups(&mut groups);
        assert_eq!(removed, 0);
        assert_eq!(serde_json::to_string(&groups).unwrap(), snapshot);
    }

    #[test]
    fn test_emptied_groups_dropped() {
        let mut groups = vec![
            group("g1", vec![arb_opp("three_way", 0.95)]),
            group("g2", vec![]),
        ];
        dedupe_country_groups(&mut groups);
        assert_eq!(groups.len(), 1);
    }
}
