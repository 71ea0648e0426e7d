//! Match state machine. Every operation here is a guarded transition on one
//! match row: validation errors reject bad input before any mutation, state
//! errors reject transitions that are not legal right now, and every
//! state-changing action appends a history entry with before/after snapshots.
//! Terminal transitions hand off to the advancement engine inside the same
//! tournament critical section.

use crate::advance;
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::notify::{send_best_effort, Notification, NotificationPriority, Notifier, RecipientType};
use crate::store::TournamentRecords;
use crate::types::*;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

/// Who is performing a transition, when, and where best-effort notifications
/// go. Mirrors how timestamps flow through the rest of the crate: the caller
/// stamps `now` once and every mutation in the transition shares it.
pub struct ActionContext<'a> {
    pub performed_by: String,
    pub role: String,
    pub now: DateTime<Utc>,
    pub notifier: &'a dyn Notifier,
}

impl<'a> ActionContext<'a> {
    pub fn admin(performed_by: impl Into<String>, now: DateTime<Utc>, notifier: &'a dyn Notifier) -> Self {
        ActionContext { performed_by: performed_by.into(), role: "admin".to_string(), now, notifier }
    }

    pub fn team(team_id: TeamId, now: DateTime<Utc>, notifier: &'a dyn Notifier) -> Self {
        ActionContext {
            performed_by: format!("team:{team_id}"),
            role: "team".to_string(),
            now,
            notifier,
        }
    }

    pub fn system(now: DateTime<Utc>, notifier: &'a dyn Notifier) -> Self {
        ActionContext {
            performed_by: "system".to_string(),
            role: "system".to_string(),
            now,
            notifier,
        }
    }
}

/// Audit snapshot of the fields an admin could need to reconstruct a change.
pub fn match_snapshot(m: &MatchRecord) -> serde_json::Value {
    json!({
        "status": m.status,
        "team1Id": m.team1_id,
        "team2Id": m.team2_id,
        "team1Score": m.team1_score,
        "team2Score": m.team2_score,
        "winnerId": m.winner_id,
        "team1CheckedIn": m.team1_checked_in,
        "team2CheckedIn": m.team2_checked_in,
        "team1Submission": m.team1_submission,
        "team2Submission": m.team2_submission,
        "resultsMatch": m.results_match,
        "rollbackCount": m.rollback_count,
    })
}

fn record_history(
    records: &mut TournamentRecords,
    match_id: MatchId,
    action: &str,
    previous_state: serde_json::Value,
    new_state: serde_json::Value,
    reason: Option<String>,
    ctx: &ActionContext,
) {
    records.push_history(MatchHistoryEntry {
        match_id,
        action: action.to_string(),
        performed_by: ctx.performed_by.clone(),
        performed_by_role: ctx.role.clone(),
        previous_state,
        new_state,
        reason,
        created_at: ctx.now,
    });
}

fn validate_scores(team1_score: i64, team2_score: i64) -> CoreResult<(u32, u32)> {
    if team1_score < 0 || team2_score < 0 {
        return Err(CoreError::validation("scores must be non-negative integers"));
    }
    if team1_score == team2_score {
        return Err(CoreError::validation(
            "scores must not be equal; a match cannot end in a draw",
        ));
    }
    match (u32::try_from(team1_score), u32::try_from(team2_score)) {
        (Ok(s1), Ok(s2)) => Ok((s1, s2)),
        _ => Err(CoreError::validation("scores are out of range")),
    }
}

/// Shared terminal transition: record the result, stamp completion, append
/// history, then advance winner (and loser, in double elimination) into the
/// downstream matches.
#[allow(clippy::too_many_arguments)]
fn complete_and_advance(
    records: &mut TournamentRecords,
    idx: usize,
    winner_id: TeamId,
    team1_score: u32,
    team2_score: u32,
    action: &str,
    note: Option<String>,
    reason: Option<String>,
    ctx: &ActionContext,
) -> CoreResult<MatchRecord> {
    let (match_id, match_number, loser_id, prev, new) = {
        let m = &mut records.matches[idx];
        let prev = match_snapshot(m);
        m.team1_score = Some(team1_score);
        m.team2_score = Some(team2_score);
        m.winner_id = Some(winner_id);
        m.status = MatchStatus::Completed;
        m.completed_at = Some(ctx.now);
        if m.started_at.is_none() {
            m.started_at = Some(ctx.now);
        }
        m.paused_at = None;
        m.pause_reason = None;
        if note.is_some() {
            m.note = note;
        }
        let loser_id = if m.team1_id == Some(winner_id) { m.team2_id } else { m.team1_id };
        (m.id, m.match_number, loser_id, prev, match_snapshot(m))
    };
    record_history(records, match_id, action, prev, new, reason, ctx);
    advance::apply_advancement(records, match_number, winner_id, loser_id, ctx)?;
    Ok(records.matches[idx].clone())
}

/// Terminal transition with nobody advancing (double forfeit, empty bracket
/// slots). Downstream matches starve deliberately; `resolve_byes` will walk
/// them once their other feeders finish.
fn complete_without_winner(
    records: &mut TournamentRecords,
    idx: usize,
    action: &str,
    note: String,
    ctx: &ActionContext,
) {
    let (match_id, prev, new) = {
        let m = &mut records.matches[idx];
        let prev = match_snapshot(m);
        m.status = MatchStatus::Completed;
        m.completed_at = Some(ctx.now);
        m.note = Some(note);
        (m.id, prev, match_snapshot(m))
    };
    record_history(records, match_id, action, prev, new, None, ctx);
}

// ── Score entry ────────────────────────────────────────────────────────

/// Admin-authoritative completion. Overwrites any outstanding team
/// submissions, including a conflicting pair flagged for arbitration.
pub fn submit_score(
    records: &mut TournamentRecords,
    idx: usize,
    team1_score: i64,
    team2_score: i64,
    ctx: &ActionContext,
) -> CoreResult<MatchRecord> {
    let (s1, s2) = validate_scores(team1_score, team2_score)?;
    let winner_id = {
        let m = &records.matches[idx];
        match m.status {
            MatchStatus::Completed => {
                return Err(CoreError::invalid_state(
                    "match is already completed; roll it back before re-scoring",
                ))
            }
            MatchStatus::Disputed => {
                return Err(CoreError::invalid_state(
                    "match is under dispute; resolve the dispute first",
                ))
            }
            MatchStatus::Paused => {
                return Err(CoreError::invalid_state(
                    "match is paused; resume it before entering a score",
                ))
            }
            _ => {}
        }
        let (Some(team1), Some(team2)) = (m.team1_id, m.team2_id) else {
            return Err(CoreError::validation(
                "match does not have two teams assigned; a score needs both sides",
            ));
        };
        if s1 > s2 { team1 } else { team2 }
    };

    {
        let m = &mut records.matches[idx];
        m.team1_submission = None;
        m.team2_submission = None;
        m.results_match = None;
    }
    complete_and_advance(records, idx, winner_id, s1, s2, "score_submitted", None, None, ctx)
}

/// Team-initiated result path. Each side reports independently; the second
/// report triggers reconciliation: agreement auto-completes exactly like the
/// admin path, disagreement flags the match for admin arbitration and leaves
/// it non-terminal.
pub fn submit_team_result(
    records: &mut TournamentRecords,
    idx: usize,
    team_id: TeamId,
    team_score: i64,
    opponent_score: i64,
    claimed_winner_id: TeamId,
    ctx: &ActionContext,
) -> CoreResult<MatchRecord> {
    let (own, opp) = validate_scores(team_score, opponent_score)?;
    {
        let m = &records.matches[idx];
        match m.status {
            MatchStatus::Completed => {
                return Err(CoreError::invalid_state("match is already completed"))
            }
            MatchStatus::Disputed => {
                return Err(CoreError::invalid_state(
                    "match is under dispute; resolve the dispute first",
                ))
            }
            _ => {}
        }
        if !m.both_slots_filled() {
            return Err(CoreError::validation(
                "match does not have two teams assigned; results need both sides",
            ));
        }
        if m.slot_of(claimed_winner_id).is_none() {
            return Err(CoreError::validation(format!(
                "declared winner {claimed_winner_id} is not a participant in this match"
            )));
        }
    }
    let slot = records.matches[idx].slot_of(team_id).ok_or_else(|| {
        CoreError::validation(format!("team {team_id} is not a participant in this match"))
    })?;

    let prev = match_snapshot(&records.matches[idx]);
    let both_submitted = {
        let m = &mut records.matches[idx];
        let submission = ResultSubmission {
            team_id,
            own_score: own,
            opponent_score: opp,
            claimed_winner_id,
            submitted_at: ctx.now,
        };
        match slot {
            TeamSlot::Team1 => m.team1_submission = Some(submission),
            TeamSlot::Team2 => m.team2_submission = Some(submission),
        }
        m.team1_submission.is_some() && m.team2_submission.is_some()
    };

    if both_submitted {
        return reconcile_submissions(records, idx, ctx);
    }

    let new = match_snapshot(&records.matches[idx]);
    let match_id = records.matches[idx].id;
    record_history(records, match_id, "team_result_submitted", prev, new, None, ctx);
    Ok(records.matches[idx].clone())
}

fn reconcile_submissions(
    records: &mut TournamentRecords,
    idx: usize,
    ctx: &ActionContext,
) -> CoreResult<MatchRecord> {
    let (agreed, winner_id, s1, s2, match_id, tournament_id) = {
        let m = &records.matches[idx];
        let (Some(sub1), Some(sub2)) = (&m.team1_submission, &m.team2_submission) else {
            return Err(CoreError::consistency(format!(
                "match #{} reconciled without both submissions present",
                m.match_number
            )));
        };
        let agreed = sub1.own_score == sub2.opponent_score
            && sub1.opponent_score == sub2.own_score
            && sub1.claimed_winner_id == sub2.claimed_winner_id;
        (
            agreed,
            sub1.claimed_winner_id,
            sub1.own_score,
            sub1.opponent_score,
            m.id,
            m.tournament_id.clone(),
        )
    };

    if agreed {
        records.matches[idx].results_match = Some(true);
        let result =
            complete_and_advance(records, idx, winner_id, s1, s2, "team_results_reconciled", None, None, ctx)?;
        send_best_effort(
            ctx.notifier,
            Notification {
                recipient_type: RecipientType::Admin,
                recipient_id: None,
                kind: "match_completed".to_string(),
                title: "Match result confirmed".to_string(),
                message: format!("Both teams reported matching results for match #{}", result.match_number),
                priority: NotificationPriority::Low,
                tournament_id: Some(tournament_id),
                match_id: Some(match_id),
            },
        );
        return Ok(result);
    }

    let (prev, new, match_number) = {
        let m = &mut records.matches[idx];
        let prev = match_snapshot(m);
        m.results_match = Some(false);
        (prev, match_snapshot(m), m.match_number)
    };
    record_history(records, match_id, "team_results_conflict", prev, new, None, ctx);
    send_best_effort(
        ctx.notifier,
        Notification {
            recipient_type: RecipientType::Admin,
            recipient_id: None,
            kind: "results_conflict".to_string(),
            title: "Conflicting match results".to_string(),
            message: format!(
                "Teams submitted conflicting results for match #{match_number}; admin arbitration required"
            ),
            priority: NotificationPriority::High,
            tournament_id: Some(tournament_id),
            match_id: Some(match_id),
        },
    );
    Ok(records.matches[idx].clone())
}

// ── Admin transitions ──────────────────────────────────────────────────

pub fn start_match(records: &mut TournamentRecords, idx: usize, ctx: &ActionContext) -> CoreResult<MatchRecord> {
    let (match_id, prev, new) = {
        let m = &mut records.matches[idx];
        if m.status != MatchStatus::Ready {
            return Err(CoreError::invalid_state(format!(
                "only a ready match can be started; this one is {:?}",
                m.status
            )));
        }
        if !m.both_slots_filled() {
            return Err(CoreError::invalid_state(
                "match cannot start without both teams assigned",
            ));
        }
        let prev = match_snapshot(m);
        m.status = MatchStatus::Live;
        m.started_at = Some(ctx.now);
        (m.id, prev, match_snapshot(m))
    };
    record_history(records, match_id, "match_started", prev, new, None, ctx);
    Ok(records.matches[idx].clone())
}

pub fn pause_match(
    records: &mut TournamentRecords,
    idx: usize,
    reason: &str,
    ctx: &ActionContext,
) -> CoreResult<MatchRecord> {
    let (match_id, prev, new) = {
        let m = &mut records.matches[idx];
        if m.status != MatchStatus::Live {
            return Err(CoreError::invalid_state(format!(
                "only a live match can be paused; this one is {:?}",
                m.status
            )));
        }
        let prev = match_snapshot(m);
        m.status = MatchStatus::Paused;
        m.paused_at = Some(ctx.now);
        m.pause_reason = Some(reason.to_string());
        (m.id, prev, match_snapshot(m))
    };
    record_history(records, match_id, "match_paused", prev, new, Some(reason.to_string()), ctx);
    Ok(records.matches[idx].clone())
}

pub fn resume_match(records: &mut TournamentRecords, idx: usize, ctx: &ActionContext) -> CoreResult<MatchRecord> {
    let (match_id, prev, new) = {
        let m = &mut records.matches[idx];
        if m.status != MatchStatus::Paused {
            return Err(CoreError::invalid_state(format!(
                "only a paused match can be resumed; this one is {:?}",
                m.status
            )));
        }
        let prev = match_snapshot(m);
        m.status = MatchStatus::Live;
        m.paused_at = None;
        m.pause_reason = None;
        (m.id, prev, match_snapshot(m))
    };
    record_history(records, match_id, "match_resumed", prev, new, None, ctx);
    Ok(records.matches[idx].clone())
}

/// Revert a completed match to live, discarding its result. The advancement
/// already performed is unwound from the downstream slots, which is only
/// legal while those matches are still waiting; once a downstream match has
/// itself progressed the rollback is rejected wholesale.
pub fn rollback_match(
    records: &mut TournamentRecords,
    idx: usize,
    reason: &str,
    ctx: &ActionContext,
) -> CoreResult<MatchRecord> {
    let (match_number, winner_id, loser_id) = {
        let m = &records.matches[idx];
        if m.status != MatchStatus::Completed {
            return Err(CoreError::invalid_state(
                "only a completed match can be rolled back",
            ));
        }
        let loser_id = match m.winner_id {
            Some(winner) if m.team1_id == Some(winner) => m.team2_id,
            Some(_) => m.team1_id,
            None => None,
        };
        (m.match_number, m.winner_id, loser_id)
    };

    let (next, loser_next) = {
        let bracket = records.bracket.as_ref().ok_or_else(|| {
            CoreError::consistency(format!(
                "match #{match_number} completed but no bracket has been generated"
            ))
        })?;
        let desc = bracket.bracket_data.descriptor(match_number).ok_or_else(|| {
            CoreError::consistency(format!(
                "match #{match_number} is not part of the bracket structure"
            ))
        })?;
        (desc.next_match_number, desc.loser_next_match_number)
    };

    // Validate every downstream target before touching anything.
    if winner_id.is_some() {
        if let Some(next) = next {
            advance::check_unwindable(records, next)?;
        }
        if let (Some(loser_next), Some(_)) = (loser_next, loser_id) {
            advance::check_unwindable(records, loser_next)?;
        }
    }

    if let (Some(next), Some(winner)) = (next, winner_id) {
        advance::unwind_slot(records, next, winner)?;
    }
    if let (Some(loser_next), Some(loser)) = (loser_next, loser_id) {
        advance::unwind_slot(records, loser_next, loser)?;
    }

    let (match_id, prev, new) = {
        let m = &mut records.matches[idx];
        let prev = match_snapshot(m);
        if m.rollback_count == 0 {
            m.previous_winner_id = m.winner_id;
        }
        m.team1_score = None;
        m.team2_score = None;
        m.winner_id = None;
        m.completed_at = None;
        m.status = MatchStatus::Live;
        m.rollback_count += 1;
        (m.id, prev, match_snapshot(m))
    };
    record_history(records, match_id, "match_rolled_back", prev, new, Some(reason.to_string()), ctx);
    Ok(records.matches[idx].clone())
}

/// Award the match against `team_id`. The surviving side wins 1-0 and goes
/// through the normal advancement path.
pub fn disqualify_team(
    records: &mut TournamentRecords,
    idx: usize,
    team_id: TeamId,
    reason: &str,
    ctx: &ActionContext,
) -> CoreResult<(String, MatchRecord)> {
    let (winner_id, dq_slot) = {
        let m = &records.matches[idx];
        if m.status == MatchStatus::Completed {
            return Err(CoreError::invalid_state("match is already completed"));
        }
        let dq_slot = m.slot_of(team_id).ok_or_else(|| {
            CoreError::validation(format!("team {team_id} is not a participant in this match"))
        })?;
        let winner_id = m.team_in_slot(dq_slot.other()).ok_or_else(|| {
            CoreError::invalid_state("no opposing team to award the win to")
        })?;
        (winner_id, dq_slot)
    };

    let (s1, s2) = match dq_slot {
        TeamSlot::Team1 => (0, 1),
        TeamSlot::Team2 => (1, 0),
    };
    let note = format!("{} disqualified: {reason}", records.team_name(team_id));
    let result = complete_and_advance(
        records,
        idx,
        winner_id,
        s1,
        s2,
        "team_disqualified",
        Some(note),
        Some(reason.to_string()),
        ctx,
    )?;
    Ok((records.team_name(winner_id), result))
}

// ── Structural edits ───────────────────────────────────────────────────

pub fn swap_teams(records: &mut TournamentRecords, idx: usize, ctx: &ActionContext) -> CoreResult<MatchRecord> {
    let (match_id, prev, new) = {
        let m = &mut records.matches[idx];
        if m.status == MatchStatus::Completed {
            return Err(CoreError::invalid_state("cannot swap teams on a completed match"));
        }
        let prev = match_snapshot(m);
        std::mem::swap(&mut m.team1_id, &mut m.team2_id);
        std::mem::swap(&mut m.team1_checked_in, &mut m.team2_checked_in);
        std::mem::swap(&mut m.team1_no_show, &mut m.team2_no_show);
        std::mem::swap(&mut m.team1_submission, &mut m.team2_submission);
        (m.id, prev, match_snapshot(m))
    };
    record_history(records, match_id, "teams_swapped", prev, new, None, ctx);
    Ok(records.matches[idx].clone())
}

pub fn replace_team(
    records: &mut TournamentRecords,
    idx: usize,
    slot: TeamSlot,
    new_team_id: Option<TeamId>,
    check_in_required: bool,
    ctx: &ActionContext,
) -> CoreResult<MatchRecord> {
    let (match_id, prev, new) = {
        let m = &mut records.matches[idx];
        if m.status == MatchStatus::Completed {
            return Err(CoreError::invalid_state("cannot replace a team on a completed match"));
        }
        let prev = match_snapshot(m);
        match slot {
            TeamSlot::Team1 => {
                m.team1_id = new_team_id;
                m.team1_checked_in = false;
                m.team1_submission = None;
            }
            TeamSlot::Team2 => {
                m.team2_id = new_team_id;
                m.team2_checked_in = false;
                m.team2_submission = None;
            }
        }
        refresh_readiness(m, check_in_required);
        (m.id, prev, match_snapshot(m))
    };
    record_history(records, match_id, "team_replaced", prev, new, None, ctx);
    Ok(records.matches[idx].clone())
}

pub fn schedule_match(
    records: &mut TournamentRecords,
    idx: usize,
    scheduled_at: Option<DateTime<Utc>>,
    check_in_deadline: Option<DateTime<Utc>>,
    ctx: &ActionContext,
) -> CoreResult<MatchRecord> {
    let (match_id, prev, new) = {
        let m = &mut records.matches[idx];
        if m.status == MatchStatus::Completed {
            return Err(CoreError::invalid_state("cannot schedule a completed match"));
        }
        let prev = match_snapshot(m);
        m.scheduled_at = scheduled_at;
        m.check_in_deadline = check_in_deadline;
        (m.id, prev, match_snapshot(m))
    };
    record_history(records, match_id, "match_scheduled", prev, new, None, ctx);
    Ok(records.matches[idx].clone())
}

/// Live-edit readiness rule: a pending match with both slots filled (and both
/// sides checked in, where check-in is enforced) becomes ready; a ready match
/// that loses a team goes back to pending.
fn refresh_readiness(m: &mut MatchRecord, check_in_required: bool) {
    match m.status {
        MatchStatus::Pending => {
            let checked = !check_in_required || (m.team1_checked_in && m.team2_checked_in);
            if m.both_slots_filled() && checked {
                m.status = MatchStatus::Ready;
            }
        }
        MatchStatus::Ready => {
            if !m.both_slots_filled() {
                m.status = MatchStatus::Pending;
            }
        }
        _ => {}
    }
}

// ── Check-in & postponement ────────────────────────────────────────────

pub fn check_in(
    records: &mut TournamentRecords,
    idx: usize,
    team_id: TeamId,
    check_in_required: bool,
    ctx: &ActionContext,
) -> CoreResult<MatchRecord> {
    let (match_id, prev, new) = {
        let m = &mut records.matches[idx];
        if !matches!(m.status, MatchStatus::Pending | MatchStatus::Ready) {
            return Err(CoreError::invalid_state(
                "check-in is only possible before the match starts",
            ));
        }
        let slot = m.slot_of(team_id).ok_or_else(|| {
            CoreError::validation(format!("team {team_id} is not a participant in this match"))
        })?;
        let prev = match_snapshot(m);
        match slot {
            TeamSlot::Team1 => m.team1_checked_in = true,
            TeamSlot::Team2 => m.team2_checked_in = true,
        }
        refresh_readiness(m, check_in_required);
        (m.id, prev, match_snapshot(m))
    };
    record_history(records, match_id, "team_checked_in", prev, new, None, ctx);
    Ok(records.matches[idx].clone())
}

pub fn request_postponement(
    records: &mut TournamentRecords,
    idx: usize,
    team_id: TeamId,
    reason: &str,
    ctx: &ActionContext,
) -> CoreResult<MatchRecord> {
    let (match_id, tournament_id, match_number, prev, new) = {
        let m = &mut records.matches[idx];
        if m.status == MatchStatus::Completed {
            return Err(CoreError::invalid_state("cannot postpone a completed match"));
        }
        if m.slot_of(team_id).is_none() {
            return Err(CoreError::validation(format!(
                "team {team_id} is not a participant in this match"
            )));
        }
        if m.postponement.is_some() {
            return Err(CoreError::invalid_state(
                "a postponement request is already pending for this match",
            ));
        }
        let prev = match_snapshot(m);
        m.postponement = Some(PostponementRequest {
            requested_by: team_id,
            reason: reason.to_string(),
            requested_at: ctx.now,
        });
        (m.id, m.tournament_id.clone(), m.match_number, prev, match_snapshot(m))
    };
    record_history(records, match_id, "postponement_requested", prev, new, Some(reason.to_string()), ctx);
    send_best_effort(
        ctx.notifier,
        Notification {
            recipient_type: RecipientType::Admin,
            recipient_id: None,
            kind: "postponement_requested".to_string(),
            title: "Postponement requested".to_string(),
            message: format!("Team {team_id} requested to postpone match #{match_number}: {reason}"),
            priority: NotificationPriority::Normal,
            tournament_id: Some(tournament_id),
            match_id: Some(match_id),
        },
    );
    Ok(records.matches[idx].clone())
}

pub fn resolve_postponement(
    records: &mut TournamentRecords,
    idx: usize,
    approved: bool,
    reason: Option<String>,
    ctx: &ActionContext,
) -> CoreResult<MatchRecord> {
    let (match_id, requested_by, tournament_id, prev, new) = {
        let m = &mut records.matches[idx];
        let Some(request) = m.postponement.take() else {
            return Err(CoreError::invalid_state(
                "no postponement request is pending for this match",
            ));
        };
        let prev = match_snapshot(m);
        if approved {
            m.status = MatchStatus::Pending;
            m.postponement_approved = true;
            m.started_at = None;
            m.paused_at = None;
            m.pause_reason = None;
        }
        (m.id, request.requested_by, m.tournament_id.clone(), prev, match_snapshot(m))
    };
    let action = if approved { "postponement_approved" } else { "postponement_denied" };
    record_history(records, match_id, action, prev, new, reason.clone(), ctx);
    send_best_effort(
        ctx.notifier,
        Notification {
            recipient_type: RecipientType::Team,
            recipient_id: Some(requested_by),
            kind: action.to_string(),
            title: if approved { "Postponement approved" } else { "Postponement denied" }.to_string(),
            message: reason.unwrap_or_else(|| "Your postponement request was reviewed".to_string()),
            priority: NotificationPriority::Normal,
            tournament_id: Some(tournament_id),
            match_id: Some(match_id),
        },
    );
    Ok(records.matches[idx].clone())
}

// ── Disputes & technical issues ────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn file_dispute(
    records: &mut TournamentRecords,
    idx: usize,
    dispute_id: DisputeId,
    reported_by: TeamId,
    category: &str,
    description: &str,
    evidence: Vec<String>,
    ctx: &ActionContext,
) -> CoreResult<Dispute> {
    let (match_id, tournament_id, match_number, prev, new) = {
        let m = &mut records.matches[idx];
        if m.status == MatchStatus::Completed {
            return Err(CoreError::invalid_state("cannot dispute a completed match"));
        }
        if m.status == MatchStatus::Disputed {
            return Err(CoreError::invalid_state("match is already under dispute"));
        }
        if m.slot_of(reported_by).is_none() {
            return Err(CoreError::validation(format!(
                "team {reported_by} is not a participant in this match"
            )));
        }
        let prev = match_snapshot(m);
        m.status_before_dispute = Some(m.status);
        m.status = MatchStatus::Disputed;
        (m.id, m.tournament_id.clone(), m.match_number, prev, match_snapshot(m))
    };

    let dispute = Dispute {
        id: dispute_id,
        match_id,
        reported_by,
        category: category.to_string(),
        description: description.to_string(),
        evidence,
        status: DisputeStatus::Pending,
        resolution: None,
        created_at: ctx.now,
    };
    records.disputes.push(dispute.clone());
    record_history(records, match_id, "dispute_filed", prev, new, Some(description.to_string()), ctx);
    send_best_effort(
        ctx.notifier,
        Notification {
            recipient_type: RecipientType::Admin,
            recipient_id: None,
            kind: "dispute_filed".to_string(),
            title: "Dispute filed".to_string(),
            message: format!("Team {reported_by} disputed match #{match_number}: {category}"),
            priority: NotificationPriority::High,
            tournament_id: Some(tournament_id),
            match_id: Some(match_id),
        },
    );
    Ok(dispute)
}

pub fn resolve_dispute(
    records: &mut TournamentRecords,
    dispute_id: DisputeId,
    status: DisputeStatus,
    action: Option<String>,
    resolution: Option<String>,
    ctx: &ActionContext,
) -> CoreResult<Dispute> {
    if status == DisputeStatus::Pending {
        return Err(CoreError::validation(
            "a dispute cannot be resolved back to pending",
        ));
    }
    let (match_id, reported_by, tournament_id, dispute) = {
        let d = records
            .disputes
            .iter_mut()
            .find(|d| d.id == dispute_id)
            .ok_or_else(|| CoreError::not_found(format!("dispute {dispute_id} does not exist")))?;
        if matches!(d.status, DisputeStatus::Resolved | DisputeStatus::Dismissed) {
            return Err(CoreError::invalid_state("dispute has already been resolved"));
        }
        d.status = status;
        if resolution.is_some() {
            d.resolution = resolution;
        }
        (d.match_id, d.reported_by, records.matches.first().map(|m| m.tournament_id.clone()), d.clone())
    };

    if matches!(status, DisputeStatus::Resolved | DisputeStatus::Dismissed) {
        if let Some(idx) = records.match_index_by_id(match_id) {
            let (prev, new) = {
                let m = &mut records.matches[idx];
                let prev = match_snapshot(m);
                if m.status == MatchStatus::Disputed {
                    m.status = m.status_before_dispute.take().unwrap_or(MatchStatus::Ready);
                }
                (prev, match_snapshot(m))
            };
            record_history(records, match_id, "dispute_resolved", prev, new, action, ctx);
        }
        send_best_effort(
            ctx.notifier,
            Notification {
                recipient_type: RecipientType::Team,
                recipient_id: Some(reported_by),
                kind: "dispute_resolved".to_string(),
                title: "Dispute reviewed".to_string(),
                message: dispute
                    .resolution
                    .clone()
                    .unwrap_or_else(|| "Your dispute has been reviewed".to_string()),
                priority: NotificationPriority::Normal,
                tournament_id,
                match_id: Some(match_id),
            },
        );
    }
    Ok(dispute)
}

#[allow(clippy::too_many_arguments)]
pub fn report_issue(
    records: &mut TournamentRecords,
    idx: usize,
    issue_id: IssueId,
    reported_by: Option<TeamId>,
    severity: IssueSeverity,
    category: &str,
    description: &str,
    ctx: &ActionContext,
) -> CoreResult<TechnicalIssue> {
    let (match_id, tournament_id, match_number) = {
        let m = &records.matches[idx];
        (m.id, m.tournament_id.clone(), m.match_number)
    };
    let issue = TechnicalIssue {
        id: issue_id,
        match_id,
        reported_by,
        severity,
        status: IssueStatus::Open,
        category: category.to_string(),
        description: description.to_string(),
        created_at: ctx.now,
        resolved_at: None,
    };
    records.issues.push(issue.clone());

    // A critical report on a live match pauses it immediately.
    let auto_paused = severity == IssueSeverity::Critical
        && records.matches[idx].status == MatchStatus::Live;
    if auto_paused {
        let (prev, new) = {
            let m = &mut records.matches[idx];
            let prev = match_snapshot(m);
            m.status = MatchStatus::Paused;
            m.paused_at = Some(ctx.now);
            m.pause_reason = Some(format!("Critical technical issue: {category}"));
            (prev, match_snapshot(m))
        };
        record_history(records, match_id, "match_auto_paused", prev, new, Some(description.to_string()), ctx);
    }

    send_best_effort(
        ctx.notifier,
        Notification {
            recipient_type: RecipientType::Admin,
            recipient_id: None,
            kind: "technical_issue".to_string(),
            title: "Technical issue reported".to_string(),
            message: format!("Match #{match_number}: [{severity:?}] {description}"),
            priority: if auto_paused {
                NotificationPriority::Urgent
            } else if severity == IssueSeverity::High {
                NotificationPriority::High
            } else {
                NotificationPriority::Normal
            },
            tournament_id: Some(tournament_id),
            match_id: Some(match_id),
        },
    );
    Ok(issue)
}

pub fn resolve_issue(
    records: &mut TournamentRecords,
    issue_id: IssueId,
    status: IssueStatus,
    ctx: &ActionContext,
) -> CoreResult<TechnicalIssue> {
    if status == IssueStatus::Open {
        return Err(CoreError::validation("an issue cannot be moved back to open"));
    }
    let issue = records
        .issues
        .iter_mut()
        .find(|i| i.id == issue_id)
        .ok_or_else(|| CoreError::not_found(format!("issue {issue_id} does not exist")))?;
    if matches!(issue.status, IssueStatus::Resolved | IssueStatus::Closed) {
        return Err(CoreError::invalid_state("issue has already been resolved"));
    }
    issue.status = status;
    if matches!(status, IssueStatus::Resolved | IssueStatus::Closed) {
        issue.resolved_at = Some(ctx.now);
    }
    Ok(issue.clone())
}

// ── Team presence ──────────────────────────────────────────────────────

pub fn report_team_status(
    records: &mut TournamentRecords,
    team_id: TeamId,
    presence: TeamPresence,
) -> TeamStatusRecord {
    let entry = records
        .team_status
        .entry(team_id)
        .or_insert_with(|| TeamStatusRecord::new(team_id));
    entry.presence = presence;
    entry.clone()
}

// ── No-show forfeiture ─────────────────────────────────────────────────

/// Evaluate the check-in deadline for one match. Idempotent and side-effect
/// free when no deadline has passed or every missed side is already flagged;
/// otherwise flags the new no-shows, penalizes their team records (banning at
/// the threshold), and forces the forfeiture result. Returns the newly
/// penalized team ids.
pub fn check_for_no_shows(
    records: &mut TournamentRecords,
    idx: usize,
    config: &CoreConfig,
    ctx: &ActionContext,
) -> CoreResult<Vec<TeamId>> {
    let (newly_flagged, tournament_id, match_id) = {
        let m = &mut records.matches[idx];
        if !matches!(m.status, MatchStatus::Pending | MatchStatus::Ready) {
            return Ok(Vec::new());
        }
        let Some(deadline) = m.check_in_deadline else {
            return Ok(Vec::new());
        };
        if deadline > ctx.now {
            return Ok(Vec::new());
        }

        let mut newly_flagged = Vec::new();
        if let Some(team1) = m.team1_id {
            if !m.team1_checked_in && !m.team1_no_show {
                m.team1_no_show = true;
                newly_flagged.push(team1);
            }
        }
        if let Some(team2) = m.team2_id {
            if !m.team2_checked_in && !m.team2_no_show {
                m.team2_no_show = true;
                newly_flagged.push(team2);
            }
        }
        (newly_flagged, m.tournament_id.clone(), m.id)
    };
    if newly_flagged.is_empty() {
        return Ok(Vec::new());
    }

    for &team_id in &newly_flagged {
        let status = records
            .team_status
            .entry(team_id)
            .or_insert_with(|| TeamStatusRecord::new(team_id));
        status.no_show_count += 1;
        status.warning_count += 1;
        let banned = status.no_show_count >= config.no_show_ban_threshold && !status.is_banned(ctx.now);
        if banned {
            status.banned_until = Some(ctx.now + Duration::days(config.no_show_ban_days));
        }
        send_best_effort(
            ctx.notifier,
            Notification {
                recipient_type: RecipientType::Team,
                recipient_id: Some(team_id),
                kind: if banned { "team_banned" } else { "no_show_recorded" }.to_string(),
                title: if banned { "Temporary ban" } else { "No-show recorded" }.to_string(),
                message: if banned {
                    format!(
                        "Repeated no-shows: you are banned for {} days",
                        config.no_show_ban_days
                    )
                } else {
                    "You missed a check-in deadline and forfeited the match".to_string()
                },
                priority: if banned { NotificationPriority::Urgent } else { NotificationPriority::High },
                tournament_id: Some(tournament_id.clone()),
                match_id: Some(match_id),
            },
        );
    }

    // Forfeiture outcome for the match itself.
    let (team1_ns, team2_ns, team1, team2) = {
        let m = &records.matches[idx];
        (m.team1_no_show, m.team2_no_show, m.team1_id, m.team2_id)
    };
    match (team1_ns, team2_ns) {
        (true, true) => {
            complete_without_winner(
                records,
                idx,
                "no_show_forfeit",
                "Double forfeit: neither team checked in before the deadline".to_string(),
                ctx,
            );
        }
        (true, false) => {
            if let (Some(winner), Some(flagged)) = (team2, team1) {
                let note = format!("{} forfeited (no-show)", records.team_name(flagged));
                complete_and_advance(records, idx, winner, 0, 1, "no_show_forfeit", Some(note), None, ctx)?;
            } else {
                complete_without_winner(
                    records,
                    idx,
                    "no_show_forfeit",
                    "Forfeit: the only assigned team missed the check-in deadline".to_string(),
                    ctx,
                );
            }
        }
        (false, true) => {
            if let (Some(winner), Some(flagged)) = (team1, team2) {
                let note = format!("{} forfeited (no-show)", records.team_name(flagged));
                complete_and_advance(records, idx, winner, 1, 0, "no_show_forfeit", Some(note), None, ctx)?;
            } else {
                complete_without_winner(
                    records,
                    idx,
                    "no_show_forfeit",
                    "Forfeit: the only assigned team missed the check-in deadline".to_string(),
                    ctx,
                );
            }
        }
        (false, false) => {}
    }
    Ok(newly_flagged)
}

// ── Bye resolution ─────────────────────────────────────────────────────

/// Walk the bracket and complete every match that can no longer receive a
/// second team: all of its feeder matches are finished and one slot (or both)
/// is still empty. A one-team match completes 1-0 for the present team and
/// advances it; an empty match completes with no winner. Runs to a fixpoint
/// so cascaded byes (double-elimination losers rounds) resolve in one call.
pub fn resolve_byes(records: &mut TournamentRecords, ctx: &ActionContext) -> CoreResult<usize> {
    let structure = records
        .bracket
        .as_ref()
        .ok_or_else(|| CoreError::invalid_state("no bracket has been generated yet"))?
        .bracket_data
        .structure
        .clone();

    let mut resolved = 0usize;
    let mut safety = 0;
    loop {
        safety += 1;
        if safety > 1000 {
            break;
        }
        let mut progressed = false;

        for desc in &structure {
            let Some(idx) = records.match_index_by_number(desc.match_number) else {
                return Err(CoreError::consistency(format!(
                    "match #{} has no match row",
                    desc.match_number
                )));
            };
            {
                let m = &records.matches[idx];
                if m.status.is_terminal() || m.both_slots_filled() {
                    continue;
                }
            }

            let feeders_done = structure
                .iter()
                .filter(|f| {
                    f.next_match_number == Some(desc.match_number)
                        || f.loser_next_match_number == Some(desc.match_number)
                })
                .all(|f| {
                    records
                        .match_index_by_number(f.match_number)
                        .map(|i| records.matches[i].status.is_terminal())
                        .unwrap_or(false)
                });
            if !feeders_done {
                continue;
            }

            let (team1, team2) = {
                let m = &records.matches[idx];
                (m.team1_id, m.team2_id)
            };
            match (team1, team2) {
                (Some(winner), None) => {
                    complete_and_advance(records, idx, winner, 1, 0, "bye_advanced", Some("Advanced on a bye".to_string()), None, ctx)?;
                }
                (None, Some(winner)) => {
                    complete_and_advance(records, idx, winner, 0, 1, "bye_advanced", Some("Advanced on a bye".to_string()), None, ctx)?;
                }
                (None, None) => {
                    complete_without_winner(
                        records,
                        idx,
                        "bye_skipped",
                        "No participants; both feeder slots were byes".to_string(),
                        ctx,
                    );
                }
                (Some(_), Some(_)) => continue,
            }
            resolved += 1;
            progressed = true;
        }

        if !progressed {
            break;
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::test_support::RecordingNotifier;
    use crate::store::TournamentStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn make_teams(n: u32) -> Vec<Team> {
        (1..=n).map(|i| Team { id: i, name: format!("Team {i}") }).collect()
    }

    fn setup(n: u32, format: BracketFormat) -> TournamentStore {
        let store = TournamentStore::new();
        let mut rng = StdRng::seed_from_u64(1);
        store
            .generate_bracket("t1", &make_teams(n), format, false, Utc::now(), &mut rng)
            .unwrap();
        store
    }

    fn idx(records: &TournamentRecords, number: MatchNumber) -> usize {
        records.match_index_by_number(number).unwrap()
    }

    fn actx(notifier: &RecordingNotifier) -> ActionContext<'_> {
        ActionContext::admin("admin", Utc::now(), notifier)
    }

    #[test]
    fn test_submit_score_rejects_draws() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        let err = store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                submit_score(r, i, 2, 2, &actx(&notifier))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_submit_score_rejects_negative_scores() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        let err = store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                submit_score(r, i, -1, 2, &actx(&notifier))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_submit_score_rejects_scores_beyond_u32() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                let err = submit_score(r, i, u32::MAX as i64 + 1, 0, &actx(&notifier)).unwrap_err();
                assert!(matches!(err, CoreError::Validation(_)));
                // The match is untouched rather than completed with wrapped scores.
                let m = &r.matches[i];
                assert_eq!(m.status, MatchStatus::Pending);
                assert!(m.winner_id.is_none());
                assert!(m.team1_score.is_none());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_submit_score_completes_and_advances() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                let m = submit_score(r, i, 2, 0, &actx(&notifier))?;
                assert_eq!(m.status, MatchStatus::Completed);
                assert_eq!(m.winner_id, Some(1));
                assert!(m.completed_at.is_some());

                let final_idx = idx(r, 3);
                assert_eq!(r.matches[final_idx].team1_id, Some(1));
                assert_eq!(r.matches[final_idx].status, MatchStatus::Pending);

                submit_score(r, idx(r, 2), 0, 3, &actx(&notifier))?;
                let final_idx = idx(r, 3);
                assert_eq!(r.matches[final_idx].team2_id, Some(4));
                assert_eq!(r.matches[final_idx].status, MatchStatus::Ready);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_submit_score_requires_two_teams() {
        // With 5 entrants three round-1 matches are byes with one team each.
        let store = setup(5, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        let err = store
            .with_tournament("t1", |r| {
                let bye = r
                    .matches
                    .iter()
                    .position(|m| m.round == 1 && !m.both_slots_filled())
                    .unwrap();
                submit_score(r, bye, 1, 0, &actx(&notifier))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_submit_score_rejects_completed_match() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        let err = store
            .with_tournament("t1", |r| {
                submit_score(r, idx(r, 1), 2, 0, &actx(&notifier))?;
                submit_score(r, idx(r, 1), 0, 2, &actx(&notifier))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn test_team_submissions_agree_auto_complete() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                let team_ctx = ActionContext::team(1, Utc::now(), &notifier);
                let m = submit_team_result(r, i, 1, 3, 1, 1, &team_ctx)?;
                assert_eq!(m.status, MatchStatus::Pending);
                assert!(m.results_match.is_none());

                let team_ctx = ActionContext::team(2, Utc::now(), &notifier);
                let m = submit_team_result(r, i, 2, 1, 3, 1, &team_ctx)?;
                assert_eq!(m.status, MatchStatus::Completed);
                assert_eq!(m.results_match, Some(true));
                assert_eq!(m.winner_id, Some(1));
                assert_eq!(m.team1_score, Some(3));
                assert_eq!(m.team2_score, Some(1));

                let final_idx = idx(r, 3);
                assert_eq!(r.matches[final_idx].team1_id, Some(1));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_first_team_submission_recorded_in_history() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                submit_team_result(r, i, 1, 3, 1, 1, &ActionContext::team(1, Utc::now(), &notifier))?;
                let entry = r.history.last().unwrap();
                assert_eq!(entry.action, "team_result_submitted");
                assert!(entry.previous_state["team1Submission"].is_null());
                assert_eq!(entry.new_state["team1Submission"]["ownScore"], 3);
                assert_eq!(entry.new_state["team1Submission"]["opponentScore"], 1);
                assert_eq!(entry.new_state["team1Submission"]["claimedWinnerId"], 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_team_submissions_conflict_flags_for_arbitration() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                submit_team_result(r, i, 1, 3, 1, 1, &ActionContext::team(1, Utc::now(), &notifier))?;
                let m = submit_team_result(r, i, 2, 3, 1, 2, &ActionContext::team(2, Utc::now(), &notifier))?;
                assert_ne!(m.status, MatchStatus::Completed);
                assert_eq!(m.results_match, Some(false));
                assert!(m.winner_id.is_none());

                // Downstream untouched.
                let final_idx = idx(r, 3);
                assert!(r.matches[final_idx].team1_id.is_none());
                Ok(())
            })
            .unwrap();
        let sent = notifier.sent.lock().unwrap();
        assert!(sent.iter().any(|n| n.kind == "results_conflict"
            && n.priority == NotificationPriority::High));
    }

    #[test]
    fn test_start_requires_ready() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                assert!(matches!(
                    start_match(r, i, &actx(&notifier)),
                    Err(CoreError::InvalidState(_))
                ));
                check_in(r, i, 1, false, &actx(&notifier))?;
                assert_eq!(r.matches[i].status, MatchStatus::Ready);
                let m = start_match(r, i, &actx(&notifier))?;
                assert_eq!(m.status, MatchStatus::Live);
                assert!(m.started_at.is_some());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_pause_resume_guards() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                assert!(matches!(
                    pause_match(r, i, "stream down", &actx(&notifier)),
                    Err(CoreError::InvalidState(_))
                ));
                check_in(r, i, 1, false, &actx(&notifier))?;
                start_match(r, i, &actx(&notifier))?;
                let m = pause_match(r, i, "stream down", &actx(&notifier))?;
                assert_eq!(m.status, MatchStatus::Paused);
                assert_eq!(m.pause_reason.as_deref(), Some("stream down"));
                assert!(matches!(
                    resume_match(r, idx(r, 2), &actx(&notifier)),
                    Err(CoreError::InvalidState(_))
                ));
                let m = resume_match(r, i, &actx(&notifier))?;
                assert_eq!(m.status, MatchStatus::Live);
                assert!(m.paused_at.is_none());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_disqualify_awards_opponent() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                let (winner_name, m) = disqualify_team(r, i, 1, "rule violation", &actx(&notifier))?;
                assert_eq!(winner_name, "Team 2");
                assert_eq!(m.status, MatchStatus::Completed);
                assert_eq!(m.winner_id, Some(2));
                assert_eq!(m.team1_score, Some(0));
                assert_eq!(m.team2_score, Some(1));
                assert!(m.note.as_deref().unwrap().contains("disqualified"));

                let final_idx = idx(r, 3);
                assert_eq!(r.matches[final_idx].team1_id, Some(2));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_disqualify_requires_opponent() {
        let store = setup(5, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        let err = store
            .with_tournament("t1", |r| {
                let bye = r
                    .matches
                    .iter()
                    .position(|m| m.round == 1 && !m.both_slots_filled())
                    .unwrap();
                let team = r.matches[bye].team1_id.or(r.matches[bye].team2_id).unwrap();
                disqualify_team(r, bye, team, "afk", &actx(&notifier))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn test_rollback_restores_live_and_unwinds() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                submit_score(r, idx(r, 1), 2, 0, &actx(&notifier))?;
                assert_eq!(r.matches[idx(r, 3)].team1_id, Some(1));

                let m = rollback_match(r, idx(r, 1), "scorekeeping error", &actx(&notifier))?;
                assert_eq!(m.status, MatchStatus::Live);
                assert!(m.team1_score.is_none());
                assert!(m.team2_score.is_none());
                assert!(m.winner_id.is_none());
                assert!(m.completed_at.is_none());
                assert_eq!(m.rollback_count, 1);
                assert_eq!(m.previous_winner_id, Some(1));

                let final_idx = idx(r, 3);
                assert!(r.matches[final_idx].team1_id.is_none());
                assert_eq!(r.matches[final_idx].status, MatchStatus::Pending);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_rollback_requires_completed() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        let err = store
            .with_tournament("t1", |r| rollback_match(r, idx(r, 1), "oops", &actx(&notifier)))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn test_rollback_blocked_once_downstream_progressed() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                submit_score(r, idx(r, 1), 2, 0, &actx(&notifier))?;
                submit_score(r, idx(r, 2), 2, 0, &actx(&notifier))?;
                let f = idx(r, 3);
                start_match(r, f, &actx(&notifier))?;

                let err = rollback_match(r, idx(r, 1), "oops", &actx(&notifier)).unwrap_err();
                assert!(matches!(err, CoreError::InvalidState(_)));
                // Nothing was unwound.
                assert_eq!(r.matches[f].team1_id, Some(1));
                assert_eq!(r.matches[idx(r, 1)].status, MatchStatus::Completed);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_advancement_is_idempotent() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                submit_score(r, idx(r, 1), 2, 0, &actx(&notifier))?;
                let before = r.matches[idx(r, 3)].clone();
                advance::apply_advancement(r, 1, 1, Some(2), &actx(&notifier))?;
                let after = &r.matches[idx(r, 3)];
                assert_eq!(after.team1_id, before.team1_id);
                assert_eq!(after.team2_id, before.team2_id);
                assert_eq!(after.status, before.status);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_swap_blocked_after_completion() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                let m = swap_teams(r, i, &actx(&notifier))?;
                assert_eq!(m.team1_id, Some(2));
                assert_eq!(m.team2_id, Some(1));
                submit_score(r, i, 2, 0, &actx(&notifier))?;
                assert!(matches!(
                    swap_teams(r, i, &actx(&notifier)),
                    Err(CoreError::InvalidState(_))
                ));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_replace_team_resets_check_in() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                check_in(r, i, 1, true, &actx(&notifier))?;
                assert!(r.matches[i].team1_checked_in);
                let m = replace_team(r, i, TeamSlot::Team1, Some(4), true, &actx(&notifier))?;
                assert_eq!(m.team1_id, Some(4));
                assert!(!m.team1_checked_in);
                assert_eq!(m.status, MatchStatus::Pending);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_check_in_gates_readiness() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                check_in(r, i, 1, true, &actx(&notifier))?;
                assert_eq!(r.matches[i].status, MatchStatus::Pending);
                let m = check_in(r, i, 2, true, &actx(&notifier))?;
                assert_eq!(m.status, MatchStatus::Ready);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_postponement_flow() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                let team_ctx = ActionContext::team(1, Utc::now(), &notifier);
                request_postponement(r, i, 1, "travel delay", &team_ctx)?;
                assert!(matches!(
                    request_postponement(r, i, 2, "me too", &team_ctx),
                    Err(CoreError::InvalidState(_))
                ));
                let m = resolve_postponement(r, i, true, None, &actx(&notifier))?;
                assert!(m.postponement.is_none());
                assert!(m.postponement_approved);
                assert_eq!(m.status, MatchStatus::Pending);

                // A denied request just clears the flag.
                request_postponement(r, i, 1, "again", &team_ctx)?;
                let m = resolve_postponement(r, i, false, Some("schedule is locked".into()), &actx(&notifier))?;
                assert!(m.postponement.is_none());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_dispute_freezes_and_restores_match() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                let team_ctx = ActionContext::team(2, Utc::now(), &notifier);
                let dispute = file_dispute(r, i, 1, 2, "score", "wrong score entered", vec![], &team_ctx)?;
                assert_eq!(dispute.status, DisputeStatus::Pending);
                assert_eq!(r.matches[i].status, MatchStatus::Disputed);
                assert_eq!(r.matches[i].status_before_dispute, Some(MatchStatus::Pending));

                assert!(matches!(
                    submit_score(r, i, 2, 0, &actx(&notifier)),
                    Err(CoreError::InvalidState(_))
                ));

                let resolved = resolve_dispute(
                    r,
                    1,
                    DisputeStatus::Resolved,
                    Some("score corrected".into()),
                    Some("verified from VOD".into()),
                    &actx(&notifier),
                )?;
                assert_eq!(resolved.status, DisputeStatus::Resolved);
                assert_eq!(r.matches[i].status, MatchStatus::Pending);
                assert!(r.matches[i].status_before_dispute.is_none());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_resolve_dispute_rejects_pending_status() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        let err = store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                file_dispute(r, i, 1, 1, "other", "x", vec![], &actx(&notifier))?;
                resolve_dispute(r, 1, DisputeStatus::Pending, None, None, &actx(&notifier))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_critical_issue_auto_pauses_live_match() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                check_in(r, i, 1, false, &actx(&notifier))?;
                start_match(r, i, &actx(&notifier))?;
                let issue = report_issue(
                    r,
                    i,
                    1,
                    Some(1),
                    IssueSeverity::Critical,
                    "server",
                    "game server crashed",
                    &actx(&notifier),
                )?;
                assert_eq!(issue.status, IssueStatus::Open);
                assert_eq!(r.matches[i].status, MatchStatus::Paused);
                assert!(r.matches[i].pause_reason.as_deref().unwrap().contains("Critical"));
                assert!(r.history.iter().any(|h| h.action == "match_auto_paused"));
                Ok(())
            })
            .unwrap();
        let sent = notifier.sent.lock().unwrap();
        assert!(sent.iter().any(|n| n.priority == NotificationPriority::Urgent));
    }

    #[test]
    fn test_low_issue_does_not_pause() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                check_in(r, i, 1, false, &actx(&notifier))?;
                start_match(r, i, &actx(&notifier))?;
                report_issue(r, i, 1, None, IssueSeverity::Low, "audio", "crackle", &actx(&notifier))?;
                assert_eq!(r.matches[i].status, MatchStatus::Live);
                let issue = resolve_issue(r, 1, IssueStatus::Resolved, &actx(&notifier))?;
                assert!(issue.resolved_at.is_some());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_no_show_forfeits_to_present_team() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        let config = CoreConfig::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                let ctx = actx(&notifier);
                schedule_match(r, i, None, Some(ctx.now - Duration::minutes(5)), &ctx)?;
                check_in(r, i, 1, true, &ctx)?;

                let flagged = check_for_no_shows(r, i, &config, &ctx)?;
                assert_eq!(flagged, vec![2]);
                let m = &r.matches[i];
                assert_eq!(m.status, MatchStatus::Completed);
                assert_eq!(m.winner_id, Some(1));
                assert_eq!((m.team1_score, m.team2_score), (Some(1), Some(0)));
                assert!(m.team2_no_show);
                assert_eq!(r.team_status.get(&2).unwrap().no_show_count, 1);

                // Second sweep is a no-op.
                let again = check_for_no_shows(r, i, &config, &ctx)?;
                assert!(again.is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_double_no_show_is_double_forfeit() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        let config = CoreConfig::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                let ctx = actx(&notifier);
                schedule_match(r, i, None, Some(ctx.now - Duration::minutes(5)), &ctx)?;
                let flagged = check_for_no_shows(r, i, &config, &ctx)?;
                assert_eq!(flagged, vec![1, 2]);
                let m = &r.matches[i];
                assert_eq!(m.status, MatchStatus::Completed);
                assert!(m.winner_id.is_none());
                assert!(m.note.as_deref().unwrap().contains("Double forfeit"));

                // Nobody advances into the next round slot.
                assert!(r.matches[idx(r, 3)].team1_id.is_none());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_repeated_no_shows_trigger_temporary_ban() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        let config = CoreConfig::default();
        store
            .with_tournament("t1", |r| {
                let ctx = actx(&notifier);
                r.team_status.insert(2, {
                    let mut s = TeamStatusRecord::new(2);
                    s.no_show_count = config.no_show_ban_threshold - 1;
                    s
                });
                let i = idx(r, 1);
                schedule_match(r, i, None, Some(ctx.now - Duration::minutes(5)), &ctx)?;
                check_in(r, i, 1, true, &ctx)?;
                check_for_no_shows(r, i, &config, &ctx)?;

                let status = r.team_status.get(&2).unwrap();
                assert_eq!(status.no_show_count, config.no_show_ban_threshold);
                assert!(status.is_banned(ctx.now));
                assert!(status.banned_until.unwrap() > ctx.now + Duration::days(config.no_show_ban_days - 1));
                Ok(())
            })
            .unwrap();
        let sent = notifier.sent.lock().unwrap();
        assert!(sent.iter().any(|n| n.kind == "team_banned"));
    }

    #[test]
    fn test_resolve_byes_advances_lone_teams() {
        let store = setup(5, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let ctx = actx(&notifier);
                let resolved = resolve_byes(r, &ctx)?;
                assert_eq!(resolved, 3);
                for m in &r.matches {
                    if m.round == 1 && m.status == MatchStatus::Completed {
                        assert!(m.winner_id.is_some());
                        assert!(m.note.as_deref().unwrap().contains("bye"));
                    }
                }
                // Round 2 now has three of its four slots filled.
                let seated: usize = r
                    .matches
                    .iter()
                    .filter(|m| m.round == 2)
                    .map(|m| m.team1_id.iter().count() + m.team2_id.iter().count())
                    .sum();
                assert_eq!(seated, 3);
                // Idempotent once everything fillable is filled.
                assert_eq!(resolve_byes(r, &ctx)?, 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_report_team_status_upserts() {
        let store = setup(4, BracketFormat::SingleElimination);
        store
            .with_tournament("t1", |r| {
                let s = report_team_status(r, 3, TeamPresence::Online);
                assert_eq!(s.presence, TeamPresence::Online);
                let s = report_team_status(r, 3, TeamPresence::InMatch);
                assert_eq!(s.presence, TeamPresence::InMatch);
                assert_eq!(r.team_status.len(), 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_history_records_transitions() {
        let store = setup(4, BracketFormat::SingleElimination);
        let notifier = RecordingNotifier::default();
        store
            .with_tournament("t1", |r| {
                let i = idx(r, 1);
                check_in(r, i, 1, false, &actx(&notifier))?;
                start_match(r, i, &actx(&notifier))?;
                submit_score(r, i, 2, 1, &actx(&notifier))?;
                let actions: Vec<&str> = r.history.iter().map(|h| h.action.as_str()).collect();
                assert_eq!(actions, vec!["team_checked_in", "match_started", "score_submitted"]);
                let last = r.history.last().unwrap();
                assert_eq!(last.performed_by, "admin");
                assert_eq!(last.previous_state["status"], "live");
                assert_eq!(last.new_state["status"], "completed");
                Ok(())
            })
            .unwrap();
    }
}
