//! Record store. Brackets, matches, history, issues, disputes, and team
//! status live together under one mutex per tournament, so every state
//! transition (including the advancement write it triggers) runs as a single
//! tournament-scoped critical section. Match-keyed operations resolve their
//! tournament through a global index first, then take that tournament's lock.

use crate::bracket::build_bracket;
use crate::error::{CoreError, CoreResult};
use crate::types::*;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Everything the core persists for one tournament.
#[derive(Debug, Default)]
pub struct TournamentRecords {
    pub bracket: Option<BracketRecord>,
    pub matches: Vec<MatchRecord>,
    pub history: Vec<MatchHistoryEntry>,
    pub issues: Vec<TechnicalIssue>,
    pub disputes: Vec<Dispute>,
    pub team_status: HashMap<TeamId, TeamStatusRecord>,
    pub teams: HashMap<TeamId, Team>,
}

impl TournamentRecords {
    pub fn match_index_by_id(&self, id: MatchId) -> Option<usize> {
        self.matches.iter().position(|m| m.id == id)
    }

    pub fn match_index_by_number(&self, number: MatchNumber) -> Option<usize> {
        self.matches.iter().position(|m| m.match_number == number)
    }

    pub fn team_name(&self, id: TeamId) -> String {
        self.teams
            .get(&id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| format!("Team {id}"))
    }

    pub fn push_history(&mut self, entry: MatchHistoryEntry) {
        self.history.push(entry);
    }
}

pub struct TournamentStore {
    tournaments: Mutex<HashMap<TournamentId, Arc<Mutex<TournamentRecords>>>>,
    match_index: Mutex<HashMap<MatchId, TournamentId>>,
    dispute_index: Mutex<HashMap<DisputeId, TournamentId>>,
    issue_index: Mutex<HashMap<IssueId, TournamentId>>,
    next_match_id: AtomicU64,
    next_dispute_id: AtomicU64,
    next_issue_id: AtomicU64,
}

impl Default for TournamentStore {
    fn default() -> Self {
        TournamentStore {
            tournaments: Mutex::new(HashMap::new()),
            match_index: Mutex::new(HashMap::new()),
            dispute_index: Mutex::new(HashMap::new()),
            issue_index: Mutex::new(HashMap::new()),
            next_match_id: AtomicU64::new(1),
            next_dispute_id: AtomicU64::new(1),
            next_issue_id: AtomicU64::new(1),
        }
    }
}

impl TournamentStore {
    pub fn new() -> Self {
        TournamentStore::default()
    }

    pub fn next_match_id(&self) -> MatchId {
        self.next_match_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_dispute_id(&self) -> DisputeId {
        self.next_dispute_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_issue_id(&self) -> IssueId {
        self.next_issue_id.fetch_add(1, Ordering::Relaxed)
    }

    fn existing(&self, tournament_id: &str) -> CoreResult<Arc<Mutex<TournamentRecords>>> {
        let guard = self.tournaments.lock().expect("tournament map poisoned");
        guard
            .get(tournament_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("tournament {tournament_id} does not exist")))
    }

    fn get_or_create(&self, tournament_id: &str) -> Arc<Mutex<TournamentRecords>> {
        let mut guard = self.tournaments.lock().expect("tournament map poisoned");
        guard
            .entry(tournament_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TournamentRecords::default())))
            .clone()
    }

    /// Run `f` inside the tournament's critical section.
    pub fn with_tournament<R>(
        &self,
        tournament_id: &str,
        f: impl FnOnce(&mut TournamentRecords) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let records = self.existing(tournament_id)?;
        let mut guard = records.lock().expect("tournament records poisoned");
        f(&mut guard)
    }

    /// Resolve the match's tournament, then run `f` inside that tournament's
    /// critical section with the match's index.
    pub fn with_match<R>(
        &self,
        match_id: MatchId,
        f: impl FnOnce(&mut TournamentRecords, usize) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let tournament_id = {
            let index = self.match_index.lock().expect("match index poisoned");
            index
                .get(&match_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found(format!("match {match_id} does not exist")))?
        };
        self.with_tournament(&tournament_id, |records| {
            let idx = records
                .match_index_by_id(match_id)
                .ok_or_else(|| CoreError::not_found(format!("match {match_id} does not exist")))?;
            f(records, idx)
        })
    }

    /// Same resolution for dispute-keyed operations.
    pub fn with_dispute_tournament<R>(
        &self,
        dispute_id: DisputeId,
        f: impl FnOnce(&mut TournamentRecords) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let tournament_id = {
            let index = self.dispute_index.lock().expect("dispute index poisoned");
            index
                .get(&dispute_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found(format!("dispute {dispute_id} does not exist")))?
        };
        self.with_tournament(&tournament_id, f)
    }

    /// Same resolution for issue-keyed operations.
    pub fn with_issue_tournament<R>(
        &self,
        issue_id: IssueId,
        f: impl FnOnce(&mut TournamentRecords) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let tournament_id = {
            let index = self.issue_index.lock().expect("issue index poisoned");
            index
                .get(&issue_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found(format!("issue {issue_id} does not exist")))?
        };
        self.with_tournament(&tournament_id, f)
    }

    pub fn register_dispute(&self, dispute_id: DisputeId, tournament_id: &str) {
        self.dispute_index
            .lock()
            .expect("dispute index poisoned")
            .insert(dispute_id, tournament_id.to_string());
    }

    pub fn register_issue(&self, issue_id: IssueId, tournament_id: &str) {
        self.issue_index
            .lock()
            .expect("issue index poisoned")
            .insert(issue_id, tournament_id.to_string());
    }

    /// Generate (or destructively regenerate) the bracket for a tournament:
    /// delete every existing match row, rebuild the structural document, and
    /// insert fresh match rows — all under the tournament lock, so no match
    /// mutation can interleave. Idempotent by replacement. Returns the new
    /// match count.
    pub fn generate_bracket(
        &self,
        tournament_id: &str,
        teams: &[Team],
        format: BracketFormat,
        randomize: bool,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> CoreResult<usize> {
        let data = build_bracket(teams, format, randomize, rng);
        let records = self.get_or_create(tournament_id);
        let mut guard = records.lock().expect("tournament records poisoned");

        let old_ids: Vec<MatchId> = guard.matches.iter().map(|m| m.id).collect();
        guard.matches.clear();
        guard.teams = teams.iter().map(|t| (t.id, t.clone())).collect();

        let mut new_rows = Vec::with_capacity(data.structure.len());
        for desc in &data.structure {
            new_rows.push(MatchRecord {
                id: self.next_match_id(),
                tournament_id: tournament_id.to_string(),
                match_number: desc.match_number,
                round: desc.round_number,
                position: desc.position,
                team1_id: desc.team1_id,
                team2_id: desc.team2_id,
                // Reference rule, reproduced verbatim: both slots filled means
                // "pending", anything else (including a bye) means "ready".
                status: if desc.team1_id.is_some() && desc.team2_id.is_some() {
                    MatchStatus::Pending
                } else {
                    MatchStatus::Ready
                },
                team1_score: None,
                team2_score: None,
                winner_id: None,
                team1_checked_in: false,
                team2_checked_in: false,
                team1_no_show: false,
                team2_no_show: false,
                scheduled_at: None,
                check_in_deadline: None,
                started_at: None,
                completed_at: None,
                paused_at: None,
                pause_reason: None,
                status_before_dispute: None,
                postponement: None,
                postponement_approved: false,
                team1_submission: None,
                team2_submission: None,
                results_match: None,
                rollback_count: 0,
                previous_winner_id: None,
                note: None,
            });
        }

        {
            let mut index = self.match_index.lock().expect("match index poisoned");
            for id in old_ids {
                index.remove(&id);
            }
            for row in &new_rows {
                index.insert(row.id, tournament_id.to_string());
            }
        }

        let match_count = new_rows.len();
        guard.matches = new_rows;
        guard.bracket = Some(BracketRecord {
            tournament_id: tournament_id.to_string(),
            format,
            bracket_data: data,
            generated_at: now,
        });
        Ok(match_count)
    }
}
