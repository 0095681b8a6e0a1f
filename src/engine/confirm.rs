use super::Opportunity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An arbitrage opportunity withheld until every book it draws on has
/// refreshed since its birth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnconfirmedEntry {
    pub birth_time: DateTime<Utc>,
    pub opportunity_data: Opportunity,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    Confirmed { birth: DateTime<Utc> },
    Withheld,
}

/// Arbitrage confirmation gate. An opportunity's birth is the latest
/// `updated_at` among its books when first seen (falling back to now); it
/// is released only once every contributing book has refreshed at or after
/// that birth. Unreleased opportunities carry their original birth forward.
#[derive(Debug, Default)]
pub struct ConfirmationGate {
    carried: BTreeMap<String, UnconfirmedEntry>,
    withheld: BTreeMap<String, UnconfirmedEntry>,
}

impl ConfirmationGate {
    pub fn new(carried: BTreeMap<String, UnconfirmedEntry>) -> Self {
        Self { carried, withheld: BTreeMap::new() }
    }

    pub fn assess(
        &mut self,
        opportunity: &Opportunity,
        first_seen: Option<DateTime<Utc>>,
        last_updated: &BTreeMap<String, DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> GateDecision {
        let unique_id = opportunity.unique_id().to_string();
        let sources = opportunity.involved_sources();

        let birth = if let Some(entry) = self.carried.get(&unique_id) {
            entry.birth_time
        } else if let Some(first_seen) = first_seen {
            first_seen
        } else {
            sources
                .iter()
                .filter_map(|src| last_updated.get(src))
                .max()
                .copied()
                .unwrap_or(now)
        };

        let all_refreshed = sources
            .iter()
            .all(|src| last_updated.get(src).is_some_and(|stamp| *stamp >= birth));

        if all_refreshed {
            GateDecision::Confirmed { birth }
        } else {
            self.withheld.insert(
                unique_id,
                UnconfirmedEntry { birth_time: birth, opportunity_data: opportunity.clone() },
            );
            GateDecision::Withheld
        }
    }

    /// Entries to persist for the next cycle.
    pub fn into_withheld(self) -> BTreeMap<String, UnconfirmedEntry> {
        self.withheld
    }

    pub fn withheld_count(&self) -> usize {
        self.withheld.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ArbOpportunity;
    use chrono::TimeZone;

    fn arb(uid: &str, sources: &str) -> Opportunity {
        Opportunity::Arb(ArbOpportunity {
            complementary_set: "three_way".into(),
            best_odds: BTreeMap::new(),
            arbitrage_percentage: 0.95,
            arbitrage_sources: sources.to_string(),
            unique_id: uid.to_string(),
            sources: BTreeMap::new(),
            group_id: None,
            home_team: None,
            away_team: None,
            activity_duration: None,
        })
    }

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 7, 12, minute, 0).unwrap()
    }

    #[test]
    fn test_new_opportunity_with_fresh_sources_confirms() {
        let mut gate = ConfirmationGate::default();
        let updated: BTreeMap<String, DateTime<Utc>> =
            [("alpha".to_string(), t(10)), ("beta".to_string(), t(12))].into_iter().collect();
        // Birth = max(updated) = t(12); both sources are at or past it.
        let decision = gate.assess(&arb("u1", "alpha, beta"), None, &updated, t(20));
        assert_eq!(decision, GateDecision::Confirmed { birth: t(12) });
        assert_eq!(gate.withheld_count(), 0);
    }

    #[test]
    fn test_withheld_until_every_source_refreshes() {
        let updated: BTreeMap<String, DateTime<Utc>> =
            [("alpha".to_string(), t(10)), ("beta".to_string(), t(12))].into_iter().collect();
        let opp = arb("u1", "alpha, beta");

        // Carried entry born at t(15): alpha (t10) and beta (t12) are stale.
        let carried: BTreeMap<String, UnconfirmedEntry> = [(
            "u1".to_string(),
            UnconfirmedEntry { birth_time: t(15), opportunity_data: opp.clone() },
        )]
        .into_iter()
        .collect();
        let mut gate2 = ConfirmationGate::new(carried);
        assert_eq!(gate2.assess(&opp, None, &updated, t(20)), GateDecision::Withheld);
        let withheld = gate2.into_withheld();
        assert_eq!(withheld["u1"].birth_time, t(15));

        // Next cycle both books refreshed past the carried birth.
        let updated: BTreeMap<String, DateTime<Utc>> =
            [("alpha".to_string(), t(16)), ("beta".to_string(), t(18))].into_iter().collect();
        let mut gate3 = ConfirmationGate::new(withheld);
        assert_eq!(
            gate3.assess(&opp, None, &updated, t(20)),
            GateDecision::Confirmed { birth: t(15) }
        );
    }

    #[test]
    fn test_missing_updated_at_falls_back_to_now() {
        let mut gate = ConfirmationGate::default();
        let updated = BTreeMap::new();
        // Birth falls back to now; with no update stamps the sources can
        // never be proven fresh, so the opportunity is withheld.
        assert_eq!(
            gate.assess(&arb("u1", "alpha, beta"), None, &updated, t(20)),
            GateDecision::Withheld
        );
        assert_eq!(gate.withheld_count(), 1);
    }

    #[test]
    fn test_previously_confirmed_uses_first_seen() {
        let mut gate = ConfirmationGate::default();
        let updated: BTreeMap<String, DateTime<Utc>> =
            [("alpha".to_string(), t(10)), ("beta".to_string(), t(12))].into_iter().collect();
        // Known opportunity first seen at t(5): everything refreshed since.
        assert_eq!(
            gate.assess(&arb("u1", "alpha, beta"), Some(t(5)), &updated, t(20)),
            GateDecision::Confirmed { birth: t(5) }
        );
    }
}
