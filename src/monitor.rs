//! Periodic maintenance: the tournament-wide no-show sweep and the read-only
//! health report.

use crate::config::CoreConfig;
use crate::error::CoreResult;
use crate::lifecycle::{check_for_no_shows, ActionContext};
use crate::store::TournamentRecords;
use crate::types::*;
use chrono::{DateTime, Utc};
use tracing::info;

/// Run the no-show check over every waiting match in the tournament. Safe to
/// call on a timer or from concurrent triggers: each per-match check is
/// re-entrant and flags a side at most once. Returns every team penalized by
/// this pass.
pub fn run_no_show_sweep(
    records: &mut TournamentRecords,
    config: &CoreConfig,
    ctx: &ActionContext,
) -> CoreResult<Vec<TeamId>> {
    let mut penalized = Vec::new();
    for idx in 0..records.matches.len() {
        penalized.extend(check_for_no_shows(records, idx, config, ctx)?);
    }
    if !penalized.is_empty() {
        info!(count = penalized.len(), "no-show sweep penalized teams");
    }
    Ok(penalized)
}

/// Aggregate a read-only health report for one tournament. Has no
/// state-machine effect; every number is recomputed from the current records.
pub fn tournament_health(
    records: &TournamentRecords,
    tournament_id: &str,
    config: &CoreConfig,
    now: DateTime<Utc>,
) -> TournamentHealth {
    let total_matches = records.matches.len();
    let completed_matches = records
        .matches
        .iter()
        .filter(|m| m.status == MatchStatus::Completed)
        .count();
    let completion_rate = if total_matches == 0 {
        0.0
    } else {
        completed_matches as f64 / total_matches as f64
    };

    let durations: Vec<f64> = records
        .matches
        .iter()
        .filter_map(|m| match (m.started_at, m.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds() as f64),
            _ => None,
        })
        .collect();
    let average_match_duration_secs = if durations.is_empty() {
        None
    } else {
        Some(durations.iter().sum::<f64>() / durations.len() as f64)
    };

    let delayed_matches = records
        .matches
        .iter()
        .filter(|m| {
            m.status == MatchStatus::Pending
                && m.scheduled_at.map(|at| at < now).unwrap_or(false)
        })
        .count();
    let paused_matches = records
        .matches
        .iter()
        .filter(|m| m.status == MatchStatus::Paused)
        .count();

    let unresolved_issues = records
        .issues
        .iter()
        .filter(|i| matches!(i.status, IssueStatus::Open | IssueStatus::Investigating))
        .count();
    let open_critical = records
        .issues
        .iter()
        .filter(|i| i.status == IssueStatus::Open && i.severity == IssueSeverity::Critical)
        .count();
    let open_disputes = records
        .disputes
        .iter()
        .filter(|d| matches!(d.status, DisputeStatus::Pending | DisputeStatus::UnderReview))
        .count();
    let banned_teams = records
        .team_status
        .values()
        .filter(|s| s.is_banned(now))
        .count();

    let mut alerts = Vec::new();
    if open_critical > 0 {
        alerts.push(format!("{open_critical} open critical technical issue(s)"));
    }
    if delayed_matches > 0 {
        alerts.push(format!("{delayed_matches} match(es) behind schedule"));
    }
    if paused_matches > 0 {
        alerts.push(format!("{paused_matches} match(es) currently paused"));
    }
    if unresolved_issues > 0 {
        alerts.push(format!("{unresolved_issues} unresolved technical issue(s)"));
    }
    if open_disputes > 0 {
        alerts.push(format!("{open_disputes} open dispute(s)"));
    }
    if banned_teams > 0 {
        alerts.push(format!("{banned_teams} team(s) currently banned"));
    }

    let status = if open_critical > 0
        || delayed_matches > config.delayed_critical_threshold
        || paused_matches > config.paused_critical_threshold
    {
        HealthStatus::Critical
    } else if alerts.len() > config.alert_warning_threshold
        || delayed_matches > 0
        || unresolved_issues > config.unresolved_issue_warning_threshold
    {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    };

    TournamentHealth {
        tournament_id: tournament_id.to_string(),
        total_matches,
        completed_matches,
        completion_rate,
        average_match_duration_secs,
        delayed_matches,
        paused_matches,
        unresolved_issues,
        open_disputes,
        banned_teams,
        alerts,
        status,
    }
}
