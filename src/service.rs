//! Public operation surface. `TournamentService` owns the store, the config,
//! and the notification sink; admin-only operations are reached through the
//! `admin()` guard so the authorization check lives in exactly one place
//! instead of being repeated per handler.

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::{self, ActionContext};
use crate::monitor;
use crate::notify::{LogNotifier, Notifier};
use crate::store::TournamentStore;
use crate::types::*;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Team,
}

/// The caller's identity, resolved by the surrounding application before it
/// reaches the core.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn admin(id: impl Into<String>) -> Self {
        Actor { id: id.into(), role: Role::Admin }
    }

    pub fn team(id: impl Into<String>) -> Self {
        Actor { id: id.into(), role: Role::Team }
    }
}

pub struct TournamentService {
    store: Arc<TournamentStore>,
    config: CoreConfig,
    notifier: Arc<dyn Notifier>,
}

impl TournamentService {
    pub fn new(config: CoreConfig) -> Self {
        TournamentService::with_notifier(config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(config: CoreConfig, notifier: Arc<dyn Notifier>) -> Self {
        TournamentService {
            store: Arc::new(TournamentStore::new()),
            config,
            notifier,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Single authorization gate for the admin surface. Every admin-only
    /// operation is a method on the returned guard, so there is no way to
    /// reach one without passing this check.
    pub fn admin(&self, actor: &Actor) -> CoreResult<AdminOps<'_>> {
        if actor.role != Role::Admin {
            return Err(CoreError::unauthorized(format!(
                "{} is not a tournament admin",
                actor.id
            )));
        }
        Ok(AdminOps { service: self, performed_by: actor.id.clone() })
    }

    // ── Team surface ───────────────────────────────────────────────────

    pub fn check_in(&self, match_id: MatchId, team_id: TeamId) -> CoreResult<MatchRecord> {
        let check_in_required = self.config.check_in_required;
        self.store.with_match(match_id, |records, idx| {
            let ctx = ActionContext::team(team_id, Utc::now(), self.notifier.as_ref());
            lifecycle::check_in(records, idx, team_id, check_in_required, &ctx)
        })
    }

    pub fn submit_team_result(
        &self,
        match_id: MatchId,
        team_id: TeamId,
        team_score: i64,
        opponent_score: i64,
        claimed_winner_id: TeamId,
    ) -> CoreResult<MatchRecord> {
        self.store.with_match(match_id, |records, idx| {
            let ctx = ActionContext::team(team_id, Utc::now(), self.notifier.as_ref());
            lifecycle::submit_team_result(
                records,
                idx,
                team_id,
                team_score,
                opponent_score,
                claimed_winner_id,
                &ctx,
            )
        })
    }

    pub fn request_postponement(
        &self,
        match_id: MatchId,
        team_id: TeamId,
        reason: &str,
    ) -> CoreResult<MatchRecord> {
        self.store.with_match(match_id, |records, idx| {
            let ctx = ActionContext::team(team_id, Utc::now(), self.notifier.as_ref());
            lifecycle::request_postponement(records, idx, team_id, reason, &ctx)
        })
    }

    pub fn file_dispute(
        &self,
        match_id: MatchId,
        reported_by: TeamId,
        category: &str,
        description: &str,
        evidence: Vec<String>,
    ) -> CoreResult<Dispute> {
        let dispute_id = self.store.next_dispute_id();
        let (dispute, tournament_id) = self.store.with_match(match_id, |records, idx| {
            let ctx = ActionContext::team(reported_by, Utc::now(), self.notifier.as_ref());
            let dispute = lifecycle::file_dispute(
                records,
                idx,
                dispute_id,
                reported_by,
                category,
                description,
                evidence,
                &ctx,
            )?;
            Ok((dispute, records.matches[idx].tournament_id.clone()))
        })?;
        self.store.register_dispute(dispute_id, &tournament_id);
        Ok(dispute)
    }

    pub fn report_issue(
        &self,
        match_id: MatchId,
        reported_by: Option<TeamId>,
        severity: IssueSeverity,
        category: &str,
        description: &str,
    ) -> CoreResult<TechnicalIssue> {
        let issue_id = self.store.next_issue_id();
        let (issue, tournament_id) = self.store.with_match(match_id, |records, idx| {
            let ctx = match reported_by {
                Some(team_id) => ActionContext::team(team_id, Utc::now(), self.notifier.as_ref()),
                None => ActionContext::system(Utc::now(), self.notifier.as_ref()),
            };
            let issue = lifecycle::report_issue(
                records,
                idx,
                issue_id,
                reported_by,
                severity,
                category,
                description,
                &ctx,
            )?;
            Ok((issue, records.matches[idx].tournament_id.clone()))
        })?;
        self.store.register_issue(issue_id, &tournament_id);
        Ok(issue)
    }

    pub fn report_team_status(
        &self,
        tournament_id: &str,
        team_id: TeamId,
        presence: TeamPresence,
    ) -> CoreResult<TeamStatusRecord> {
        self.store.with_tournament(tournament_id, |records| {
            Ok(lifecycle::report_team_status(records, team_id, presence))
        })
    }

    // ── Read surface ───────────────────────────────────────────────────

    pub fn get_match(&self, match_id: MatchId) -> CoreResult<MatchRecord> {
        self.store
            .with_match(match_id, |records, idx| Ok(records.matches[idx].clone()))
    }

    pub fn list_matches(&self, tournament_id: &str) -> CoreResult<Vec<MatchRecord>> {
        self.store
            .with_tournament(tournament_id, |records| Ok(records.matches.clone()))
    }

    pub fn get_bracket(&self, tournament_id: &str) -> CoreResult<BracketRecord> {
        self.store.with_tournament(tournament_id, |records| {
            records
                .bracket
                .clone()
                .ok_or_else(|| CoreError::not_found(format!(
                    "tournament {tournament_id} has no generated bracket"
                )))
        })
    }

    pub fn get_team_status(
        &self,
        tournament_id: &str,
        team_id: TeamId,
    ) -> CoreResult<Option<TeamStatusRecord>> {
        self.store.with_tournament(tournament_id, |records| {
            Ok(records.team_status.get(&team_id).cloned())
        })
    }

    pub fn get_match_history(&self, match_id: MatchId) -> CoreResult<Vec<MatchHistoryEntry>> {
        self.store.with_match(match_id, |records, idx| {
            let id = records.matches[idx].id;
            Ok(records
                .history
                .iter()
                .filter(|h| h.match_id == id)
                .cloned()
                .collect())
        })
    }

    pub fn get_tournament_health(&self, tournament_id: &str) -> CoreResult<TournamentHealth> {
        self.get_tournament_health_at(tournament_id, Utc::now())
    }

    pub fn get_tournament_health_at(
        &self,
        tournament_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<TournamentHealth> {
        self.store.with_tournament(tournament_id, |records| {
            Ok(monitor::tournament_health(records, tournament_id, &self.config, now))
        })
    }
}

/// Admin-only operations, obtainable only via [`TournamentService::admin`].
pub struct AdminOps<'a> {
    service: &'a TournamentService,
    performed_by: String,
}

impl AdminOps<'_> {
    fn ctx<'n>(&self, now: DateTime<Utc>, notifier: &'n dyn Notifier) -> ActionContext<'n> {
        ActionContext::admin(self.performed_by.clone(), now, notifier)
    }

    /// Destructive regenerate-in-place: any existing bracket and matches for
    /// the tournament are replaced wholesale.
    pub fn generate_bracket(
        &self,
        tournament_id: &str,
        teams: &[Team],
        format: BracketFormat,
        randomize: bool,
    ) -> CoreResult<usize> {
        if teams.len() < 2 {
            return Err(CoreError::validation(
                "a bracket needs at least 2 teams",
            ));
        }
        let mut seen = HashSet::new();
        for team in teams {
            if !seen.insert(team.id) {
                return Err(CoreError::validation(format!(
                    "duplicate team id {} in team list",
                    team.id
                )));
            }
        }
        let mut rng = rand::rng();
        self.service
            .store
            .generate_bracket(tournament_id, teams, format, randomize, Utc::now(), &mut rng)
    }

    /// Complete every match that can no longer receive a second team (round-1
    /// byes and their downstream cascade). Returns how many were resolved.
    pub fn resolve_byes(&self, tournament_id: &str) -> CoreResult<usize> {
        self.service.store.with_tournament(tournament_id, |records| {
            let ctx = self.ctx(Utc::now(), self.service.notifier.as_ref());
            lifecycle::resolve_byes(records, &ctx)
        })
    }

    pub fn submit_score(
        &self,
        match_id: MatchId,
        team1_score: i64,
        team2_score: i64,
    ) -> CoreResult<MatchRecord> {
        self.service.store.with_match(match_id, |records, idx| {
            let ctx = self.ctx(Utc::now(), self.service.notifier.as_ref());
            lifecycle::submit_score(records, idx, team1_score, team2_score, &ctx)
        })
    }

    pub fn start_match(&self, match_id: MatchId) -> CoreResult<MatchRecord> {
        self.service.store.with_match(match_id, |records, idx| {
            let ctx = self.ctx(Utc::now(), self.service.notifier.as_ref());
            lifecycle::start_match(records, idx, &ctx)
        })
    }

    pub fn pause_match(&self, match_id: MatchId, reason: &str) -> CoreResult<MatchRecord> {
        self.service.store.with_match(match_id, |records, idx| {
            let ctx = self.ctx(Utc::now(), self.service.notifier.as_ref());
            lifecycle::pause_match(records, idx, reason, &ctx)
        })
    }

    pub fn resume_match(&self, match_id: MatchId) -> CoreResult<MatchRecord> {
        self.service.store.with_match(match_id, |records, idx| {
            let ctx = self.ctx(Utc::now(), self.service.notifier.as_ref());
            lifecycle::resume_match(records, idx, &ctx)
        })
    }

    pub fn rollback_match(&self, match_id: MatchId, reason: &str) -> CoreResult<MatchRecord> {
        self.service.store.with_match(match_id, |records, idx| {
            let ctx = self.ctx(Utc::now(), self.service.notifier.as_ref());
            lifecycle::rollback_match(records, idx, reason, &ctx)
        })
    }

    pub fn disqualify_team(
        &self,
        match_id: MatchId,
        team_id: TeamId,
        reason: &str,
    ) -> CoreResult<(String, MatchRecord)> {
        self.service.store.with_match(match_id, |records, idx| {
            let ctx = self.ctx(Utc::now(), self.service.notifier.as_ref());
            lifecycle::disqualify_team(records, idx, team_id, reason, &ctx)
        })
    }

    pub fn swap_teams(&self, match_id: MatchId) -> CoreResult<MatchRecord> {
        self.service.store.with_match(match_id, |records, idx| {
            let ctx = self.ctx(Utc::now(), self.service.notifier.as_ref());
            lifecycle::swap_teams(records, idx, &ctx)
        })
    }

    pub fn replace_team(
        &self,
        match_id: MatchId,
        slot: TeamSlot,
        new_team_id: Option<TeamId>,
    ) -> CoreResult<MatchRecord> {
        let check_in_required = self.service.config.check_in_required;
        self.service.store.with_match(match_id, |records, idx| {
            let ctx = self.ctx(Utc::now(), self.service.notifier.as_ref());
            lifecycle::replace_team(records, idx, slot, new_team_id, check_in_required, &ctx)
        })
    }

    pub fn schedule_match(
        &self,
        match_id: MatchId,
        scheduled_at: Option<DateTime<Utc>>,
        check_in_deadline: Option<DateTime<Utc>>,
    ) -> CoreResult<MatchRecord> {
        self.service.store.with_match(match_id, |records, idx| {
            let ctx = self.ctx(Utc::now(), self.service.notifier.as_ref());
            lifecycle::schedule_match(records, idx, scheduled_at, check_in_deadline, &ctx)
        })
    }

    pub fn resolve_postponement(
        &self,
        match_id: MatchId,
        approved: bool,
        reason: Option<String>,
    ) -> CoreResult<MatchRecord> {
        self.service.store.with_match(match_id, |records, idx| {
            let ctx = self.ctx(Utc::now(), self.service.notifier.as_ref());
            lifecycle::resolve_postponement(records, idx, approved, reason, &ctx)
        })
    }

    pub fn resolve_dispute(
        &self,
        dispute_id: DisputeId,
        status: DisputeStatus,
        action: Option<String>,
        resolution: Option<String>,
    ) -> CoreResult<Dispute> {
        self.service.store.with_dispute_tournament(dispute_id, |records| {
            let ctx = self.ctx(Utc::now(), self.service.notifier.as_ref());
            lifecycle::resolve_dispute(records, dispute_id, status, action, resolution, &ctx)
        })
    }

    pub fn resolve_issue(&self, issue_id: IssueId, status: IssueStatus) -> CoreResult<TechnicalIssue> {
        self.service.store.with_issue_tournament(issue_id, |records| {
            let ctx = self.ctx(Utc::now(), self.service.notifier.as_ref());
            lifecycle::resolve_issue(records, issue_id, status, &ctx)
        })
    }

    pub fn run_no_show_sweep(&self, tournament_id: &str) -> CoreResult<Vec<TeamId>> {
        self.run_no_show_sweep_at(tournament_id, Utc::now())
    }

    pub fn run_no_show_sweep_at(
        &self,
        tournament_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<TeamId>> {
        self.service.store.with_tournament(tournament_id, |records| {
            let ctx = self.ctx(now, self.service.notifier.as_ref());
            monitor::run_no_show_sweep(records, &self.service.config, &ctx)
        })
    }
}
