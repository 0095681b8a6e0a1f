use crate::config::{
    CheckKind, ConfigError, EvSettings, Mode, ModeSettings, SettingsTree,
};
use crate::engine::activity::{format_duration, ActivityTracker};
use crate::engine::arbitrage::ArbAnalyzer;
use crate::engine::confirm::{ConfirmationGate, GateDecision};
use crate::engine::dedupe::dedupe_country_groups;
use crate::engine::ev::EvAnalyzer;
use crate::engine::lifecycle::{analyze_appearance, LifecycleManager};
use crate::engine::{EvOpportunity, GroupReport, Opportunity};
use crate::matching::grouper::{group_fixtures, GroupingParams, MatchGroup};
use crate::matching::teams::TeamMatcher;
use crate::output;
use crate::source::{self, MatchRecord};
use crate::text::CountrySynonyms;
use crate::url_builder::UrlBuilder;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Everything one full pass needs, assembled once at startup from the
/// settings tree and treated as read-only afterwards.
pub struct Pipeline {
    pub mode: Mode,
    pub sport: String,
    pub check: CheckKind,
    pub show_only_confirmed: bool,
    pub settings: ModeSettings,
    pub matcher: TeamMatcher,
    pub grouping: GroupingParams,
    pub country_synonyms: CountrySynonyms,
    pub market_sets: IndexMap<String, Vec<String>>,
    pub urls: UrlBuilder,
    pub ev: Option<EvSettings>,
    pub output_dir: PathBuf,
}

#[derive(Debug, Default, Clone)]
pub struct CycleSummary {
    pub matching_groups: usize,
    pub opportunity_groups: usize,
    pub opportunities: usize,
    pub withheld: usize,
    pub duplicates_removed: usize,
    pub avg_margin_pct: Option<f64>,
    pub max_margin_pct: Option<f64>,
}

impl Pipeline {
    pub fn from_settings(
        tree: &SettingsTree,
        mode: Mode,
        sport: &str,
        check: CheckKind,
        show_only_confirmed: bool,
    ) -> Result<Self, ConfigError> {
        let settings = tree.mode_settings(mode)?;
        let synonyms = tree.synonyms()?;
        let helper = tree.matching_helper()?;
        let markets = tree.markets()?;
        let urls_file = match tree.url_builder() {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(error = %e, "url_builder config unavailable, match URLs disabled");
                Default::default()
            }
        };
        let ev = match check {
            CheckKind::Ev => Some(tree.ev()?),
            CheckKind::Arb => None,
        };

        let output_dir = match (&check, &ev) {
            (CheckKind::Ev, Some(ev)) => ev
                .output_directory
                .join("ev_opportunities")
                .join(mode.to_string())
                .join(&ev.target_source)
                .join(sport),
            _ => settings.output_dir.join(mode.to_string()).join(sport),
        };

        let grouping = GroupingParams {
            strong_threshold: settings.strong_threshold.clone(),
            moderate_threshold: settings.moderate_threshold.clone(),
            gatekeeper_threshold: settings.gatekeeper_threshold,
            time_diff_tolerance: settings.time_diff_tolerance,
            day_diff_tolerance: settings.day_diff_tolerance,
        };

        Ok(Self {
            mode,
            sport: sport.to_string(),
            check,
            show_only_confirmed,
            matcher: TeamMatcher::new(&helper),
            grouping,
            country_synonyms: CountrySynonyms::new(synonyms.synonyms),
            market_sets: markets.market_sets,
            urls: UrlBuilder::new(urls_file, sport, mode),
            ev,
            settings,
            output_dir,
        })
    }

    fn analyze(&self, group: &MatchGroup) -> Option<GroupReport> {
        match self.check {
            CheckKind::Arb => ArbAnalyzer::new(&self.market_sets, &self.urls).analyze(group),
            CheckKind::Ev => {
                EvAnalyzer::new(self.ev.as_ref()?, &self.market_sets, &self.urls).analyze(group)
            }
        }
    }

    pub fn run_cycle(&self) -> Result<CycleSummary> {
        self.run_cycle_at(Utc::now())
    }

    /// One full pass: ingest every country, group fixtures, analyze, gate,
    /// deduplicate and write per-country results, then roll the lifecycle
    /// and activity state forward.
    pub fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleSummary> {
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("creating {}", self.output_dir.display()))?;
        let activity_path = self.output_dir.join("activity_tracker.json");
        let unconfirmed_path = self.output_dir.join("unconfirmed_opportunities.json");
        let cache_dir = self.output_dir.join("_cache");

        let mut activity = ActivityTracker::load(&activity_path);
        let gate_enabled = self.show_only_confirmed && self.check == CheckKind::Arb;
        let mut gate = gate_enabled
            .then(|| ConfirmationGate::new(output::load_json_or_default(&unconfirmed_path)));

        let lifecycle_enabled = self
            .ev
            .as_ref()
            .is_some_and(|ev| ev.overprice_source_logging && self.check == CheckKind::Ev);
        let appearance_enabled = self
            .ev
            .as_ref()
            .is_some_and(|ev| ev.appearance_investigation && self.check == CheckKind::Ev);
        let snapshot_path = cache_dir.join("previous_match_data_cache.json");
        let previous_groups: BTreeMap<String, Vec<MatchRecord>> = if appearance_enabled {
            output::load_json_or_default(&snapshot_path)
        } else {
            BTreeMap::new()
        };

        let mut summary = CycleSummary::default();
        let mut margins: Vec<f64> = Vec::new();
        let mut last_updated: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
        let mut results_by_country: BTreeMap<String, Vec<GroupReport>> = BTreeMap::new();
        let mut seen_ids: BTreeSet<String> = BTreeSet::new();
        let mut current_ev_opps: BTreeMap<String, EvOpportunity> = BTreeMap::new();
        let mut groups_snapshot: BTreeMap<String, Vec<MatchRecord>> = BTreeMap::new();

        let countries =
            source::canonical_countries(&self.settings.source_directories, &self.country_synonyms);
        for country in &countries {
            let paths = source::country_file_paths(
                country,
                &self.settings.source_directories,
                &self.country_synonyms,
            );
            if paths.len() < 2 {
                continue;
            }
            let (by_source, updated) = source::load_country_records(&paths);
            for (src, stamp) in updated {
                last_updated
                    .entry(src)
                    .and_modify(|cur| *cur = (*cur).max(stamp))
                    .or_insert(stamp);
            }

            let groups = group_fixtures(&by_source, &self.matcher, &self.grouping);
            tracing::debug!(country = %country, groups = groups.len(), "fixtures grouped");
            summary.matching_groups += groups.len();

            for group in &groups {
                if lifecycle_enabled || appearance_enabled {
                    groups_snapshot.insert(
                        group.id.clone(),
                        group.records.iter().map(|r| (*r).clone()).collect(),
                    );
                }

                let Some(mut report) = self.analyze(group) else { continue };
                let analyzed: Vec<Opportunity> = std::mem::take(&mut report.opportunities);
                let mut confirmed: Vec<Opportunity> = Vec::new();

                for mut opp in analyzed {
                    let uid = opp.unique_id().to_string();
                    if uid.is_empty() {
                        continue;
                    }

                    let decision = match gate.as_mut() {
                        Some(g) => g.assess(&opp, activity.first_seen(&uid), &last_updated, now),
                        None => GateDecision::Confirmed { birth: now },
                    };
                    let GateDecision::Confirmed { birth } = decision else { continue };

                    opp.attach_group(&report.group_id, &report.home_team, &report.away_team);
                    let newly_seen = activity.first_seen(&uid).is_none();
                    let first_seen = activity.record_seen(&uid, birth);
                    opp.set_activity_duration(format_duration(
                        (now - first_seen).num_seconds() as f64,
                    ));
                    seen_ids.insert(uid.clone());
                    margins.push(opp.margin_pct());

                    if let Opportunity::Ev(ev_opp) = &opp {
                        if appearance_enabled && newly_seen {
                            self.investigate_appearance(
                                &mut activity,
                                &previous_groups,
                                &groups_snapshot,
                                ev_opp,
                                now,
                            );
                        }
                        if lifecycle_enabled {
                            current_ev_opps.insert(uid.clone(), ev_opp.clone());
                        }
                    }
                    confirmed.push(opp);
                }

                if !confirmed.is_empty() {
                    summary.opportunity_groups += 1;
                    summary.opportunities += confirmed.len();
                    report.opportunities = confirmed;
                    results_by_country.entry(report.country.clone()).or_default().push(report);
                }
            }
        }

        if let Some(gate) = gate {
            summary.withheld = gate.withheld_count();
            if summary.withheld > 0 {
                tracing::info!(
                    withheld = summary.withheld,
                    "opportunities waiting for source confirmation"
                );
            }
            let _ = output::write_json_atomic(&unconfirmed_path, &gate.into_withheld());
        }

        if lifecycle_enabled {
            let ev = self.ev.as_ref().expect("lifecycle requires ev settings");
            let manager = LifecycleManager::new(
                ev,
                &self.market_sets,
                self.mode,
                &self.sport,
                cache_dir.clone(),
                ev.output_directory.join("ev_source_log"),
            );
            manager.run(&current_ev_opps, &groups_snapshot, &mut activity, now);
        }

        let mut generated: BTreeSet<String> = BTreeSet::new();
        for (country, mut groups) in results_by_country {
            summary.duplicates_removed += dedupe_country_groups(&mut groups);
            if groups.is_empty() {
                continue;
            }
            let filename = format!("{}.json", country.replace('/', "_"));
            let path = self.output_dir.join(&filename);
            if output::write_json_atomic(&path, &groups).is_ok() {
                generated.insert(filename);
            }
        }

        if appearance_enabled {
            let _ = output::write_json_atomic(&snapshot_path, &groups_snapshot);
        }

        output::cleanup_stale_outputs(&self.output_dir, &generated);

        activity.prune(&seen_ids);
        let _ = activity.save(&activity_path);

        if !margins.is_empty() {
            summary.avg_margin_pct =
                Some(margins.iter().sum::<f64>() / margins.len() as f64);
            summary.max_margin_pct = margins.iter().cloned().fold(None, |acc: Option<f64>, m| {
                Some(acc.map_or(m, |a| a.max(m)))
            });
        }

        tracing::info!(
            check = %self.check,
            matching_groups = summary.matching_groups,
            opportunity_groups = summary.opportunity_groups,
            opportunities = summary.opportunities,
            avg_margin = summary.avg_margin_pct.unwrap_or(0.0),
            max_margin = summary.max_margin_pct.unwrap_or(0.0),
            "cycle complete"
        );
        Ok(summary)
    }

    fn investigate_appearance(
        &self,
        activity: &mut ActivityTracker,
        previous_groups: &BTreeMap<String, Vec<MatchRecord>>,
        groups_snapshot: &BTreeMap<String, Vec<MatchRecord>>,
        opportunity: &EvOpportunity,
        now: DateTime<Utc>,
    ) {
        let Some(ev) = self.ev.as_ref() else { return };
        let Some(group_id) = opportunity.group_id.as_deref() else { return };
        let (Some(current), Some(previous)) =
            (groups_snapshot.get(group_id), previous_groups.get(group_id))
        else {
            return;
        };
        if let Some(log) =
            analyze_appearance(ev, &self.market_sets, current, previous, opportunity, now)
        {
            tracing::debug!(
                uid = %opportunity.unique_id,
                source = %log.overprice_source,
                "appearance attributed"
            );
            activity.set_appearance_log(&opportunity.unique_id, log);
        }
    }
}
