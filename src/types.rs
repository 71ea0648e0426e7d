use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Constants ──────────────────────────────────────────────────────────

/// No-shows before a team is automatically banned.
pub const NO_SHOW_BAN_THRESHOLD: u32 = 3;
/// Length of an automatic no-show ban, in days.
pub const NO_SHOW_BAN_DAYS: i64 = 30;
/// Delayed matches before a tournament is classified critical.
pub const DELAYED_CRITICAL_THRESHOLD: usize = 5;
/// Paused matches before a tournament is classified critical.
pub const PAUSED_CRITICAL_THRESHOLD: usize = 3;
/// Active alerts before a tournament is classified warning.
pub const ALERT_WARNING_THRESHOLD: usize = 2;
/// Unresolved technical issues before a tournament is classified warning.
pub const UNRESOLVED_ISSUE_WARNING_THRESHOLD: usize = 5;

// ── Id aliases ─────────────────────────────────────────────────────────

pub type TournamentId = String;
pub type TeamId = u32;
pub type MatchId = u64;
pub type MatchNumber = u32;
pub type IssueId = u64;
pub type DisputeId = u64;

// ── Teams ──────────────────────────────────────────────────────────────

/// External team identity. Referenced, never owned: once a bracket is
/// generated the id/name pair is frozen for bracket purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
}

/// Which side of a match a team occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TeamSlot {
    Team1,
    Team2,
}

impl TeamSlot {
    pub fn other(self) -> TeamSlot {
        match self {
            TeamSlot::Team1 => TeamSlot::Team2,
            TeamSlot::Team2 => TeamSlot::Team1,
        }
    }
}

// ── Bracket structure ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BracketFormat {
    SingleElimination,
    DoubleElimination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BracketPosition {
    Winners,
    Losers,
    GrandFinal,
}

/// One node of the generated match graph. `match_number` is dense, 1-based,
/// assigned in generation order, and never renumbered; `next_match_number`
/// (winner) and `loser_next_match_number` (double elimination drop-down) are
/// the advancement pointers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDescriptor {
    pub match_number: MatchNumber,
    pub round_number: u32,
    pub team1_id: Option<TeamId>,
    pub team2_id: Option<TeamId>,
    pub next_match_number: Option<MatchNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loser_next_match_number: Option<MatchNumber>,
    pub position: BracketPosition,
}

/// The structural document persisted on the bracket record. This is the
/// generation-time source of truth for advancement; match records are a
/// mutable projection of it and never feed back into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketData {
    pub structure: Vec<MatchDescriptor>,
    pub total_rounds: u32,
    pub bye_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winners_rounds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub losers_rounds: Option<u32>,
}

impl BracketData {
    pub fn descriptor(&self, match_number: MatchNumber) -> Option<&MatchDescriptor> {
        self.structure.iter().find(|d| d.match_number == match_number)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketRecord {
    pub tournament_id: TournamentId,
    pub format: BracketFormat,
    pub bracket_data: BracketData,
    pub generated_at: DateTime<Utc>,
}

// ── Match lifecycle ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchStatus {
    Pending,
    Ready,
    Live,
    Paused,
    Disputed,
    Completed,
}

impl MatchStatus {
    pub fn is_terminal(self) -> bool {
        self == MatchStatus::Completed
    }
}

/// A pending team-side postponement request. Only one may be outstanding
/// per match at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostponementRequest {
    pub requested_by: TeamId,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

/// One side's independently submitted result, held until the opposing side
/// submits and the pair is reconciled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSubmission {
    pub team_id: TeamId,
    pub own_score: u32,
    pub opponent_score: u32,
    pub claimed_winner_id: TeamId,
    pub submitted_at: DateTime<Utc>,
}

/// One row per bracket node. The live, mutable projection of a
/// `MatchDescriptor`; joined back to the structure by `match_number`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub match_number: MatchNumber,
    pub round: u32,
    pub position: BracketPosition,
    pub team1_id: Option<TeamId>,
    pub team2_id: Option<TeamId>,
    pub status: MatchStatus,
    pub team1_score: Option<u32>,
    pub team2_score: Option<u32>,
    pub winner_id: Option<TeamId>,
    pub team1_checked_in: bool,
    pub team2_checked_in: bool,
    pub team1_no_show: bool,
    pub team2_no_show: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub check_in_deadline: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub pause_reason: Option<String>,
    pub status_before_dispute: Option<MatchStatus>,
    pub postponement: Option<PostponementRequest>,
    pub postponement_approved: bool,
    pub team1_submission: Option<ResultSubmission>,
    pub team2_submission: Option<ResultSubmission>,
    pub results_match: Option<bool>,
    pub rollback_count: u32,
    pub previous_winner_id: Option<TeamId>,
    pub note: Option<String>,
}

impl MatchRecord {
    pub fn team_in_slot(&self, slot: TeamSlot) -> Option<TeamId> {
        match slot {
            TeamSlot::Team1 => self.team1_id,
            TeamSlot::Team2 => self.team2_id,
        }
    }

    /// Which slot `team_id` occupies, if it is a participant at all.
    pub fn slot_of(&self, team_id: TeamId) -> Option<TeamSlot> {
        if self.team1_id == Some(team_id) {
            Some(TeamSlot::Team1)
        } else if self.team2_id == Some(team_id) {
            Some(TeamSlot::Team2)
        } else {
            None
        }
    }

    pub fn both_slots_filled(&self) -> bool {
        self.team1_id.is_some() && self.team2_id.is_some()
    }
}

// ── Audit log ──────────────────────────────────────────────────────────

/// Append-only audit record; written for every state-changing action,
/// never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchHistoryEntry {
    pub match_id: MatchId,
    pub action: String,
    pub performed_by: String,
    pub performed_by_role: String,
    pub previous_state: serde_json::Value,
    pub new_state: serde_json::Value,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ── Technical issues ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueStatus {
    Open,
    Investigating,
    Resolved,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalIssue {
    pub id: IssueId,
    pub match_id: MatchId,
    pub reported_by: Option<TeamId>,
    pub severity: IssueSeverity,
    pub status: IssueStatus,
    pub category: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

// ── Disputes ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Pending,
    UnderReview,
    Resolved,
    Dismissed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispute {
    pub id: DisputeId,
    pub match_id: MatchId,
    pub reported_by: TeamId,
    pub category: String,
    pub description: String,
    pub evidence: Vec<String>,
    pub status: DisputeStatus,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ── Team status ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamPresence {
    Offline,
    Online,
    Ready,
    InMatch,
    Away,
}

/// Per-team mutable record. Created on first presence report or first
/// no-show; `no_show_count` only ever increments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStatusRecord {
    pub team_id: TeamId,
    pub presence: TeamPresence,
    pub no_show_count: u32,
    pub warning_count: u32,
    pub banned_until: Option<DateTime<Utc>>,
}

impl TeamStatusRecord {
    pub fn new(team_id: TeamId) -> Self {
        TeamStatusRecord {
            team_id,
            presence: TeamPresence::Offline,
            no_show_count: 0,
            warning_count: 0,
            banned_until: None,
        }
    }

    pub fn is_banned(&self, now: DateTime<Utc>) -> bool {
        self.banned_until.is_some_and(|until| until > now)
    }
}

// ── Health report ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentHealth {
    pub tournament_id: TournamentId,
    pub total_matches: usize,
    pub completed_matches: usize,
    pub completion_rate: f64,
    pub average_match_duration_secs: Option<f64>,
    pub delayed_matches: usize,
    pub paused_matches: usize,
    pub unresolved_issues: usize,
    pub open_disputes: usize,
    pub banned_teams: usize,
    pub alerts: Vec<String>,
    pub status: HealthStatus,
}
