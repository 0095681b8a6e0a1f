use super::activity::ActivityTracker;
use super::ev::fair_for_market;
use super::EvOpportunity;
use crate::config::{EvSettings, Mode};
use crate::output;
use crate::source::MatchRecord;
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One attribution record, written when an opportunity's appearance or
/// disappearance could be pinned on a side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationLog {
    pub overprice: f64,
    /// The target book's name, or "fair_source" for the sharp side.
    pub overprice_source: String,
    pub odd_name: String,
    pub old_fair_odd: f64,
    pub old_target_odd: f64,
    pub new_fair_odd: f64,
    pub new_target_odd: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity_duration: Option<String>,
    pub group_id: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appeared_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disappeared_at: Option<DateTime<Utc>>,
}

/// A confirmed disappearance waiting for resolution or timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingInvestigation {
    pub disappeared_at: DateTime<Utc>,
    pub last_known_opp: EvOpportunity,
}

/// Counts reported after a lifecycle pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct LifecycleStats {
    pub active: usize,
    pub purgatory: usize,
    pub pending: usize,
    pub resolved: usize,
    pub timed_out: usize,
}

enum Resolution {
    /// Investigation closed; a log may have been written.
    Resolved,
    /// Could not be resolved this cycle; keep waiting.
    StillPending,
}

/// Multi-cycle bookkeeping for +EV opportunities. An opportunity missing
/// for one cycle sits in purgatory; missing again it becomes a pending
/// investigation, resolved by re-pricing its market or purged after the
/// configured timeout. Reappearing opportunities leave purgatory silently.
pub struct LifecycleManager<'a> {
    settings: &'a EvSettings,
    market_sets: &'a IndexMap<String, Vec<String>>,
    mode: Mode,
    sport: String,
    cache_dir: PathBuf,
    log_root: PathBuf,
}

impl<'a> LifecycleManager<'a> {
    pub fn new(
        settings: &'a EvSettings,
        market_sets: &'a IndexMap<String, Vec<String>>,
        mode: Mode,
        sport: &str,
        cache_dir: PathBuf,
        log_root: PathBuf,
    ) -> Self {
        Self { settings, market_sets, mode, sport: sport.to_string(), cache_dir, log_root }
    }

    fn active_path(&self) -> PathBuf {
        self.cache_dir.join("ev_opportunity_cache.json")
    }

    fn purgatory_path(&self) -> PathBuf {
        self.cache_dir.join("purgatory_cache.json")
    }

    fn pending_path(&self) -> PathBuf {
        self.cache_dir.join("pending_investigations.json")
    }

    /// Run one lifecycle pass against this cycle's opportunity set and the
    /// current match groups, then persist the three caches.
    pub fn run(
        &self,
        current: &BTreeMap<String, EvOpportunity>,
        groups_by_id: &BTreeMap<String, Vec<MatchRecord>>,
        activity: &mut ActivityTracker,
        now: DateTime<Utc>,
    ) -> LifecycleStats {
        if !self.settings.overprice_source_logging {
            return LifecycleStats::default();
        }

        let previous: BTreeMap<String, EvOpportunity> =
            output::load_json_or_default(&self.active_path());
        let purgatory: BTreeMap<String, EvOpportunity> =
            output::load_json_or_default(&self.purgatory_path());
        let pending: BTreeMap<String, PendingInvestigation> =
            output::load_json_or_default(&self.pending_path());
        tracing::debug!(
            previous = previous.len(),
            purgatory = purgatory.len(),
            pending = pending.len(),
            "lifecycle caches loaded"
        );

        // Purgatory entries still absent are confirmed disappearances.
        let mut to_process: BTreeMap<String, PendingInvestigation> = pending;
        for (uid, opp) in &purgatory {
            if !current.contains_key(uid) {
                to_process.insert(
                    uid.clone(),
                    PendingInvestigation { disappeared_at: now, last_known_opp: opp.clone() },
                );
            }
        }

        // Anything active last cycle but missing now waits one cycle in
        // purgatory before investigation.
        let next_purgatory: BTreeMap<String, EvOpportunity> = previous
            .iter()
            .filter(|(uid, _)| !current.contains_key(*uid))
            .map(|(uid, opp)| (uid.clone(), opp.clone()))
            .collect();

        let mut stats = LifecycleStats {
            active: current.len(),
            purgatory: next_purgatory.len(),
            ..Default::default()
        };

        let timeout = Duration::minutes(self.settings.investigation_timeout_minutes);
        let mut still_pending: BTreeMap<String, PendingInvestigation> = BTreeMap::new();
        for (uid, investigation) in to_process {
            if now - investigation.disappeared_at > timeout {
                tracing::debug!(uid = %uid, "investigation timed out, dropping");
                stats.timed_out += 1;
                continue;
            }
            match self.resolve(&uid, &investigation, groups_by_id, activity, now) {
                Resolution::Resolved => stats.resolved += 1,
                Resolution::StillPending => {
                    still_pending.insert(uid, investigation);
                }
            }
        }
        stats.pending = still_pending.len();

        let _ = output::write_json_atomic(&self.active_path(), current);
        let _ = output::write_json_atomic(&self.purgatory_path(), &next_purgatory);
        let _ = output::write_json_atomic(&self.pending_path(), &still_pending);
        tracing::debug!(
            active = stats.active,
            purgatory = stats.purgatory,
            pending = stats.pending,
            resolved = stats.resolved,
            timed_out = stats.timed_out,
            "lifecycle caches saved"
        );
        stats
    }

    fn resolve(
        &self,
        uid: &str,
        investigation: &PendingInvestigation,
        groups_by_id: &BTreeMap<String, Vec<MatchRecord>>,
        activity: &mut ActivityTracker,
        now: DateTime<Utc>,
    ) -> Resolution {
        let opp = &investigation.last_known_opp;

        // A stored appearance log short-circuits the disappearance: the
        // appearance investigation is finalized instead, unless double
        // checking asks for a fresh attribution anyway.
        if !self.settings.double_check {
            if let Some(log) = activity.appearance_log(uid) {
                let mut final_log = log.clone();
                final_log.opportunity_duration = opp
                    .activity_duration
                    .clone()
                    .or_else(|| Some("unknown".to_string()));
                self.write_log(&final_log, "appearance_investigations", now);
                activity.remove(uid);
                tracing::debug!(uid = %uid, "finalized appearance investigation");
                return Resolution::Resolved;
            }
        }

        let Some(group_id) = opp.group_id.as_deref() else {
            return Resolution::StillPending;
        };
        let Some(group) = groups_by_id.get(group_id) else {
            return Resolution::StillPending;
        };
        let by_source: BTreeMap<&str, &MatchRecord> =
            group.iter().map(|r| (r.source.as_str(), r)).collect();

        let Some(market_set) =
            self.market_sets.values().find(|ms| ms.contains(&opp.odd_name))
        else {
            return Resolution::StillPending;
        };

        let new_fair = fair_for_market(self.settings, market_set, &by_source)
            .and_then(|fair| fair.get(&opp.odd_name).copied());
        let new_target = by_source
            .get(self.settings.target_source.as_str())
            .and_then(|rec| rec.odd(&opp.odd_name));
        let (Some(new_fair), Some(new_target)) = (new_fair, new_target) else {
            return Resolution::StillPending;
        };

        // Re-priced above threshold: a false disappearance, drop silently.
        if new_target > new_fair
            && new_target / new_fair - 1.0 >= self.settings.min_overprice
        {
            tracing::debug!(uid = %uid, "opportunity re-priced above threshold, cancelling investigation");
            return Resolution::Resolved;
        }

        let old_fair = opp.fair_odd_value;
        let old_target = opp.overpriced_odd_value;
        if old_fair <= 0.0 || old_target <= 0.0 {
            return Resolution::StillPending;
        }

        let fair_change = ((new_fair - old_fair) / old_fair).abs();
        let target_change = ((new_target - old_target) / old_target).abs();
        let overprice_source = if target_change > fair_change {
            self.settings.target_source.clone()
        } else {
            "fair_source".to_string()
        };

        let log = InvestigationLog {
            overprice: opp.overprice,
            overprice_source,
            odd_name: opp.odd_name.clone(),
            old_fair_odd: old_fair,
            old_target_odd: old_target,
            new_fair_odd: super::round4(new_fair),
            new_target_odd: new_target,
            opportunity_duration: opp
                .activity_duration
                .clone()
                .or_else(|| Some("unknown".to_string())),
            group_id: group_id.to_string(),
            home_team: opp.home_team.clone().unwrap_or_default(),
            away_team: opp.away_team.clone().unwrap_or_default(),
            appeared_at: None,
            disappeared_at: Some(now),
        };
        self.write_log(&log, "disappearance_investigations", now);
        tracing::debug!(uid = %uid, source = %log.overprice_source, "disappearance attributed");
        Resolution::Resolved
    }

    /// Append a log entry to its file inside the deterministic directory
    /// tree: mode/target/sport/date/overprice-source/group-id/kind.
    fn write_log(&self, log: &InvestigationLog, investigation_type: &str, now: DateTime<Utc>) {
        let dir = self
            .log_root
            .join(self.mode.to_string())
            .join(&self.settings.target_source)
            .join(&self.sport)
            .join(now.format("%d-%m-%Y").to_string())
            .join(&log.overprice_source)
            .join(&log.group_id)
            .join(investigation_type);
        let file = dir.join(format!("{}.json", log.odd_name.replace('/', "_")));

        let mut logs: Vec<InvestigationLog> = output::load_json_or_default(&file);
        logs.push(log.clone());
        let _ = output::write_json_atomic(&file, &logs);
    }
}

/// Attribute a brand-new opportunity by comparing this cycle's odds with
/// the previous cycle's. Attributable only when exactly one side moved, in
/// the direction that created the overprice: a fallen fair odd points at
/// the target book, a risen target odd points at the fair side.
pub fn analyze_appearance(
    settings: &EvSettings,
    market_sets: &IndexMap<String, Vec<String>>,
    current_group: &[MatchRecord],
    previous_group: &[MatchRecord],
    opportunity: &EvOpportunity,
    now: DateTime<Utc>,
) -> Option<InvestigationLog> {
    let market_set = market_sets.values().find(|ms| ms.contains(&opportunity.odd_name))?;

    let current: BTreeMap<&str, &MatchRecord> =
        current_group.iter().map(|r| (r.source.as_str(), r)).collect();
    let previous: BTreeMap<&str, &MatchRecord> =
        previous_group.iter().map(|r| (r.source.as_str(), r)).collect();

    let target_now = current.get(settings.target_source.as_str())?;
    let target_before = previous.get(settings.target_source.as_str())?;
    let sharp_now = current.get(settings.sharp_source.as_str())?;
    let sharp_before = previous.get(settings.sharp_source.as_str())?;

    let odd_name = &opportunity.odd_name;
    let new_fair = super::fair_odds::one_sharp(market_set, sharp_now)?
        .get(odd_name)
        .copied()?;
    let old_fair = super::fair_odds::one_sharp(market_set, sharp_before)?
        .get(odd_name)
        .copied()?;
    let new_target = target_now.odd(odd_name)?;
    let old_target = target_before.odd(odd_name)?;

    let fair_changed = new_fair != old_fair;
    let target_changed = new_target != old_target;

    let overprice_source = match (fair_changed, target_changed) {
        (true, false) if new_fair < old_fair => settings.target_source.clone(),
        (false, true) if new_target > old_target => "fair_source".to_string(),
        _ => return None,
    };

    Some(InvestigationLog {
        overprice: opportunity.overprice,
        overprice_source,
        odd_name: odd_name.clone(),
        old_fair_odd: old_fair,
        old_target_odd: old_target,
        new_fair_odd: new_fair,
        new_target_odd: new_target,
        opportunity_duration: None,
        group_id: opportunity.group_id.clone().unwrap_or_default(),
        home_team: opportunity.home_team.clone().unwrap_or_default(),
        away_team: opportunity.away_team.clone().unwrap_or_default(),
        appeared_at: Some(now),
        disappeared_at: None,
    })
}
