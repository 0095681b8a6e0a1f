use super::round4;
use crate::source::MatchRecord;
use std::collections::BTreeMap;

/// Vig-free odds from a single sharp book: each odd is scaled by the
/// overround so implied probabilities sum to one. Returns None when any
/// outcome is missing or non-positive.
pub fn one_sharp(market_set: &[String], sharp: &MatchRecord) -> Option<BTreeMap<String, f64>> {
    let odds: Vec<f64> = market_set
        .iter()
        .map(|outcome| sharp.odd(outcome))
        .collect::<Option<Vec<_>>>()?;

    let vig: f64 = odds.iter().map(|o| 1.0 / o).sum();
    if vig <= 0.0 {
        return None;
    }

    Some(
        market_set
            .iter()
            .zip(&odds)
            .map(|(outcome, odd)| (outcome.clone(), round4(odd * vig)))
            .collect(),
    )
}

/// Vig-free odds from a sharp group: per-outcome arithmetic mean over the
/// group members that quote a positive odd, then the same vig removal. A
/// single outcome with zero contributors aborts the whole market.
pub fn multi_sharp(
    market_set: &[String],
    by_source: &BTreeMap<&str, &MatchRecord>,
    sharp_group: &[String],
) -> Option<BTreeMap<String, f64>> {
    let mut averaged = Vec::with_capacity(market_set.len());
    for outcome in market_set {
        let quotes: Vec<f64> = sharp_group
            .iter()
            .filter_map(|src| by_source.get(src.as_str()))
            .filter_map(|rec| rec.odd(outcome))
            .collect();
        if quotes.is_empty() {
            return None;
        }
        averaged.push(quotes.iter().sum::<f64>() / quotes.len() as f64);
    }

    let vig: f64 = averaged.iter().map(|o| 1.0 / o).sum();
    if vig <= 0.0 {
        return None;
    }

    Some(
        market_set
            .iter()
            .zip(&averaged)
            .map(|(outcome, odd)| (outcome.clone(), round4(odd * vig)))
            .collect(),
    )
}
